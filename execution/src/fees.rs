//! Fee dispatch: pricing one dispatch of a transaction body, honoring
//! waiver rules before the handler's calculator is ever consulted.

use crate::registry::{HandlerRegistry, PreCheckError};
use tessera_types::{AccountId, ResponseCode, TransactionBody};

/// The three-part fee owed for one dispatch, in ledger units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fees {
    pub node: u64,
    pub network: u64,
    pub service: u64,
}

impl Fees {
    /// The legitimate zero-cost outcome of a waived fee.
    pub const FREE: Self = Self {
        node: 0,
        network: 0,
        service: 0,
    };

    pub fn total(&self) -> u64 {
        self.node + self.network + self.service
    }
}

/// Active conversion rate between fee-schedule cents and ledger units.
/// Supplied read-only by the surrounding node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExchangeRate {
    pub cent_equiv: u64,
    pub unit_equiv: u64,
}

impl ExchangeRate {
    pub fn in_units(&self, cents: u64) -> u64 {
        cents * self.unit_equiv / self.cent_equiv
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self {
            cent_equiv: 1,
            unit_equiv: 1,
        }
    }
}

/// Ephemeral binding of one fee computation: body, payer, whether the
/// dispatch is top-level, and the active rate. Never persisted.
pub struct FeeContext<'a> {
    pub body: &'a TransactionBody,
    pub payer: AccountId,
    pub top_level: bool,
    pub rate: &'a ExchangeRate,
}

/// Fee-waiver and privileged-operation policy, consulted synchronously
/// and read-only.
pub trait Authorizer {
    fn has_waived_fees(&self, payer: AccountId, body: &TransactionBody) -> bool;
}

/// Charges everyone.
pub struct NoWaivers;

impl Authorizer for NoWaivers {
    fn has_waived_fees(&self, _: AccountId, _: &TransactionBody) -> bool {
        false
    }
}

/// Price one dispatch of `body` with `payer`. A waived payer gets
/// [`Fees::FREE`] without the handler's calculator running; a body with
/// no registered functionality is a malformed-input failure, distinct
/// from a zero fee.
pub fn compute_dispatch_fees(
    registry: &HandlerRegistry,
    authorizer: &dyn Authorizer,
    rate: &ExchangeRate,
    body: &TransactionBody,
    payer: AccountId,
    top_level: bool,
) -> Result<Fees, PreCheckError> {
    if authorizer.has_waived_fees(payer, body) {
        return Ok(Fees::FREE);
    }
    let handler = registry
        .get(body.functionality())
        .ok_or(PreCheckError::from(ResponseCode::NotSupported))?;
    Ok(handler.calculate_fees(&FeeContext {
        body,
        payer,
        top_level,
        rate,
    }))
}
