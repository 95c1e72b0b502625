//! The dispatch processor: one transaction's execution attempt, from
//! pure checks through authorization and execution to commit or
//! revert, recursing for every dispatch it spawns.

use crate::context::HandleContext;
use crate::fees::{Authorizer, ExchangeRate};
use crate::keys::{all_keys_for_transaction, KeyVerifier};
use crate::record::{RecordBuilder, RecordHandle, RecordListBuilder};
use crate::registry::{HandleError, HandlerRegistry};
use crate::savepoint::SavepointStack;
use crate::state::{State, Status};
use crate::throttle::UtilizationManager;
use anyhow::{Context as _, Result};
use std::collections::BTreeMap;
use tessera_types::{
    AccountId, ConsensusTime, Key, ResponseCode, Transaction, TransactionBody, TransactionRecord,
};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchCategory {
    User,
    Preceding,
    Child,
    Scheduled,
}

/// One transaction's execution attempt. Spawned dispatches inherit the
/// verification results of the transaction that caused them; only
/// preceding and child dispatches come in removable variants.
pub struct Dispatch {
    pub(crate) body: TransactionBody,
    pub(crate) payer: AccountId,
    pub(crate) category: DispatchCategory,
    pub(crate) removable: bool,
    pub(crate) verifier: KeyVerifier,
}

impl Dispatch {
    pub fn user(transaction: &Transaction) -> Self {
        Self {
            body: transaction.body.clone(),
            payer: transaction.body.payer(),
            category: DispatchCategory::User,
            removable: false,
            verifier: KeyVerifier::from_transaction(transaction),
        }
    }

    fn spawned(
        body: TransactionBody,
        category: DispatchCategory,
        removable: bool,
        verifier: KeyVerifier,
    ) -> Self {
        Self {
            payer: body.payer(),
            body,
            category,
            removable,
            verifier,
        }
    }

    pub(crate) fn preceding(body: TransactionBody, verifier: KeyVerifier) -> Self {
        Self::spawned(body, DispatchCategory::Preceding, false, verifier)
    }

    pub(crate) fn removable_preceding(body: TransactionBody, verifier: KeyVerifier) -> Self {
        Self::spawned(body, DispatchCategory::Preceding, true, verifier)
    }

    pub(crate) fn child(body: TransactionBody, verifier: KeyVerifier) -> Self {
        Self::spawned(body, DispatchCategory::Child, false, verifier)
    }

    pub(crate) fn removable_child(body: TransactionBody, verifier: KeyVerifier) -> Self {
        Self::spawned(body, DispatchCategory::Child, true, verifier)
    }

    pub(crate) fn scheduled(body: TransactionBody, verifier: KeyVerifier) -> Self {
        Self::spawned(body, DispatchCategory::Scheduled, false, verifier)
    }
}

/// Everything one top-level transaction resolved to: the user status,
/// every surviving record in causal order, and the state changes for
/// the durable store.
pub struct DispatchOutcome {
    pub status: ResponseCode,
    pub records: Vec<TransactionRecord>,
    pub changes: Vec<(Key, Status)>,
    /// Times the savepoint stack was irrevocably committed while
    /// handling the transaction.
    pub full_commits: u32,
}

/// Runs the dispatch state machine. Built by explicit construction
/// from its collaborators; holds no global state.
pub struct DispatchProcessor<'c> {
    pub(crate) registry: &'c HandlerRegistry,
    pub(crate) authorizer: &'c dyn Authorizer,
    pub(crate) rate: ExchangeRate,
    pub(crate) throttle: UtilizationManager,
    pub(crate) now: ConsensusTime,
}

impl<'c> DispatchProcessor<'c> {
    pub fn new(
        registry: &'c HandlerRegistry,
        authorizer: &'c dyn Authorizer,
        rate: ExchangeRate,
        throttle: UtilizationManager,
        now: ConsensusTime,
    ) -> Self {
        Self {
            registry,
            authorizer,
            rate,
            throttle,
            now,
        }
    }

    /// Apply one consensus-ordered transaction against `base`. Always
    /// resolves to a terminal status; an `Err` here means the base
    /// store itself failed, not that the transaction was rejected.
    pub fn handle_transaction(
        &mut self,
        base: &dyn State,
        transaction: &Transaction,
    ) -> Result<DispatchOutcome> {
        let mut stack = SavepointStack::new(base);
        let user = RecordBuilder::new(transaction.body.clone(), self.now, false);
        let mut records = RecordListBuilder::new(user);
        let mut paid_rewards = BTreeMap::new();

        let functionality = transaction.body.functionality();
        let status = if self
            .throttle
            .should_throttle_n_of_unscaled(1, functionality, self.now)
        {
            debug!(?functionality, "transaction throttled at admission");
            records.get_mut(RecordHandle::User).set_status(ResponseCode::Busy);
            ResponseCode::Busy
        } else {
            self.process_dispatch(
                &mut stack,
                &mut records,
                Dispatch::user(transaction),
                &mut paid_rewards,
            )?
        };

        Ok(DispatchOutcome {
            status,
            records: records.build(),
            full_commits: stack.full_commits(),
            changes: stack.take_durable(),
        })
    }

    /// CREATED → PRE_CHECKED → KEYS_RESOLVED → EXECUTED →
    /// {COMMITTED, REVERTED}. Successful non-user savepoints fold into
    /// the parent; a successful non-removable preceding dispatch
    /// additionally commits the full stack, making it irrevocable the
    /// instant it succeeds.
    pub(crate) fn process_dispatch(
        &mut self,
        stack: &mut SavepointStack<'_>,
        records: &mut RecordListBuilder,
        dispatch: Dispatch,
        paid_rewards: &mut BTreeMap<AccountId, u64>,
    ) -> Result<ResponseCode> {
        let registry = self.registry;
        let functionality = dispatch.body.functionality();
        let category = dispatch.category;
        let user = matches!(category, DispatchCategory::User);

        // A failed pure check appends nothing to the record list. An
        // unregistered functionality fails the same way.
        let pre_check = registry
            .get(functionality)
            .ok_or(ResponseCode::NotSupported)
            .and_then(|handler| {
                handler
                    .pure_checks(&dispatch.body)
                    .map(|()| handler)
                    .map_err(|err| err.code)
            });
        let handler = match pre_check {
            Ok(handler) => handler,
            Err(code) => {
                debug!(?category, ?code, "dispatch failed pure checks");
                if user {
                    records.get_mut(RecordHandle::User).set_status(code);
                }
                return Ok(code);
            }
        };

        // The checkpoint predates this dispatch's own record, so the
        // reverted path can erase a removable dispatch entirely.
        let checkpoint = records.checkpoint();
        let builder = RecordBuilder::new(dispatch.body.clone(), self.now, dispatch.removable);
        let handle = match category {
            DispatchCategory::User => RecordHandle::User,
            DispatchCategory::Preceding => records.add_preceding(builder),
            DispatchCategory::Child | DispatchCategory::Scheduled => records.add_child(builder),
        };

        let authorization = all_keys_for_transaction(registry, stack, &dispatch.body, dispatch.payer)
            .map_err(|err| err.code)
            .and_then(|keys| dispatch.verifier.verify_authorization(&keys));
        if let Err(code) = authorization {
            debug!(?category, ?code, "dispatch failed authorization");
            records.get_mut(handle).set_status(code);
            if user {
                // Fatal for the top level; nothing has executed.
                return Ok(code);
            }
            // The caller decided to spawn this dispatch, so it still
            // resolves to a terminal status through the reverted path.
            records.revert_from(checkpoint);
            return Ok(code);
        }

        stack.create_savepoint();
        let mut context = HandleContext::new(self, stack, records, handle, &dispatch);
        let executed = handler.handle(&mut context);
        drop(context);

        match executed {
            Ok(()) => {
                stack.commit();
                if matches!(category, DispatchCategory::Preceding) && !dispatch.removable {
                    stack.commit_full_stack();
                }
                for (account, amount) in records.get(handle).paid_staking_rewards() {
                    *paid_rewards.entry(*account).or_insert(0) += *amount;
                }
                let status = records.get(handle).status();
                debug!(?category, payer = %dispatch.payer, "dispatch committed");
                Ok(status)
            }
            Err(HandleError::Business(code)) => {
                stack.rollback();
                records.get_mut(handle).set_status(code);
                records.revert_from(checkpoint);
                debug!(?category, ?code, "dispatch reverted");
                Ok(code)
            }
            Err(HandleError::Fatal(err)) => {
                stack.rollback();
                Err(err).context("dispatch execution failed")
            }
        }
    }
}
