//! The business-logic registry: one handler per transaction
//! functionality, consulted for pure checks, key gathering, fee
//! calculation, and execution.

use crate::{context::HandleContext, fees::Fees, fees::FeeContext, keys::KeyGatheringContext};
use anyhow::Result;
use std::collections::BTreeMap;
use tessera_types::{Functionality, ResponseCode, TransactionBody};
use thiserror::Error;

/// A business-rule rejection raised before execution begins. Carries
/// the response code recorded on the receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("transaction rejected: {code:?}")]
pub struct PreCheckError {
    pub code: ResponseCode,
}

impl From<ResponseCode> for PreCheckError {
    fn from(code: ResponseCode) -> Self {
        Self { code }
    }
}

/// A failure raised while executing a dispatch. Business failures
/// carry a response code and resolve the dispatch through the reverted
/// path; fatal failures indicate broken infrastructure (an unreadable
/// base store) and propagate out of the engine.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("dispatch failed: {0:?}")]
    Business(ResponseCode),
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl From<ResponseCode> for HandleError {
    fn from(code: ResponseCode) -> Self {
        Self::Business(code)
    }
}

/// The callbacks a transaction functionality plugs into the engine.
pub trait TransactionHandler {
    /// Stateless structural validation of the body, independent of
    /// ledger state.
    fn pure_checks(&self, body: &TransactionBody) -> Result<(), PreCheckError>;

    /// Declare the non-payer keys that must (or may) authorize `body`
    /// by calling back into `keys`. Errors are coerced by the caller;
    /// see [`crate::keys::all_keys_for_transaction`].
    fn pre_handle(&self, body: &TransactionBody, keys: &mut KeyGatheringContext<'_, '_>)
        -> Result<()>;

    /// Price one dispatch of `body`.
    fn calculate_fees(&self, context: &FeeContext<'_>) -> Fees;

    /// Execute business logic against the dispatch's own savepoint.
    fn handle(&self, context: &mut HandleContext<'_, '_, '_>) -> Result<(), HandleError>;
}

/// Maps each functionality to its handler. Built by explicit
/// registration; there are no process-wide singletons.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<Functionality, Box<dyn TransactionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, functionality: Functionality, handler: Box<dyn TransactionHandler>) {
        self.handlers.insert(functionality, handler);
    }

    pub fn get(&self, functionality: Functionality) -> Option<&dyn TransactionHandler> {
        self.handlers.get(&functionality).map(Box::as_ref)
    }
}
