//! The façade handed to business logic: typed state stores scoped to
//! the dispatch's own savepoint, its record builder, nested dispatch,
//! fee computation, key resolution, and throttle checks.

use crate::dispatch::{Dispatch, DispatchCategory, DispatchProcessor};
use crate::fees::{compute_dispatch_fees, Fees};
use crate::keys::{all_keys_for_transaction, KeyVerifier, TransactionKeys};
use crate::record::{RecordBuilder, RecordHandle, RecordListBuilder};
use crate::registry::PreCheckError;
use crate::savepoint::SavepointStack;
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tessera_types::{
    Account, AccountId, ConsensusTime, Functionality, Key, ResponseCode, Token, TokenId,
    TransactionBody, Value,
};

/// First entity number handed out for newly created entities.
const FIRST_USER_ENTITY: u64 = 1000;

/// Read-only view of accounts through the dispatch's savepoint.
pub struct ReadableAccounts<'x, 's> {
    stack: &'x SavepointStack<'s>,
}

impl ReadableAccounts<'_, '_> {
    pub fn get(&self, account: AccountId) -> Result<Option<Account>> {
        match self.stack.get(&Key::Account(account))? {
            None => Ok(None),
            Some(Value::Account(state)) => Ok(Some(state)),
            Some(_) => bail!("corrupt state: account key holds a non-account value"),
        }
    }
}

/// Mutable view of accounts; writes land in the dispatch's savepoint.
pub struct WritableAccounts<'x, 's> {
    stack: &'x mut SavepointStack<'s>,
}

impl WritableAccounts<'_, '_> {
    pub fn get(&self, account: AccountId) -> Result<Option<Account>> {
        match self.stack.get(&Key::Account(account))? {
            None => Ok(None),
            Some(Value::Account(state)) => Ok(Some(state)),
            Some(_) => bail!("corrupt state: account key holds a non-account value"),
        }
    }

    pub fn put(&mut self, account: AccountId, state: Account) {
        self.stack.insert(Key::Account(account), Value::Account(state));
    }
}

/// Mutable view of tokens.
pub struct WritableTokens<'x, 's> {
    stack: &'x mut SavepointStack<'s>,
}

impl WritableTokens<'_, '_> {
    pub fn get(&self, token: TokenId) -> Result<Option<Token>> {
        match self.stack.get(&Key::Token(token))? {
            None => Ok(None),
            Some(Value::Token(state)) => Ok(Some(state)),
            Some(_) => bail!("corrupt state: token key holds a non-token value"),
        }
    }

    pub fn put(&mut self, token: TokenId, state: Token) {
        self.stack.insert(Key::Token(token), Value::Token(state));
    }
}

/// The entity number allocator, backed by a counter in state so that
/// allocation participates in savepoint rollback like any other write.
pub struct EntityIds<'x, 's> {
    stack: &'x mut SavepointStack<'s>,
}

impl EntityIds<'_, '_> {
    fn counter(&self) -> Result<u64> {
        match self.stack.get(&Key::EntityCounter)? {
            None => Ok(FIRST_USER_ENTITY),
            Some(Value::EntityCounter(next)) => Ok(next),
            Some(_) => bail!("corrupt state: entity counter key holds a non-counter value"),
        }
    }

    /// The number the next allocation will return, without allocating.
    pub fn peek(&self) -> Result<u64> {
        self.counter()
    }

    /// Allocate the next entity number.
    pub fn next(&mut self) -> Result<u64> {
        let next = self.counter()?;
        self.stack
            .insert(Key::EntityCounter, Value::EntityCounter(next + 1));
        Ok(next)
    }
}

/// One dispatch's window onto the engine while its handler runs.
pub struct HandleContext<'a, 's, 'c> {
    processor: &'a mut DispatchProcessor<'c>,
    stack: &'a mut SavepointStack<'s>,
    records: &'a mut RecordListBuilder,
    handle: RecordHandle,
    payer: AccountId,
    category: DispatchCategory,
    verifier: &'a KeyVerifier,
    paid_rewards: BTreeMap<AccountId, u64>,
}

impl<'a, 's, 'c> HandleContext<'a, 's, 'c> {
    pub(crate) fn new(
        processor: &'a mut DispatchProcessor<'c>,
        stack: &'a mut SavepointStack<'s>,
        records: &'a mut RecordListBuilder,
        handle: RecordHandle,
        dispatch: &'a Dispatch,
    ) -> Self {
        Self {
            processor,
            stack,
            records,
            handle,
            payer: dispatch.payer,
            category: dispatch.category,
            verifier: &dispatch.verifier,
            paid_rewards: BTreeMap::new(),
        }
    }

    pub fn payer(&self) -> AccountId {
        self.payer
    }

    /// The body this dispatch is executing.
    pub fn body(&self) -> &TransactionBody {
        self.records.get(self.handle).body()
    }

    pub fn category(&self) -> DispatchCategory {
        self.category
    }

    pub fn consensus_time(&self) -> ConsensusTime {
        self.processor.now
    }

    pub fn verifier(&self) -> &KeyVerifier {
        self.verifier
    }

    /// This dispatch's own record builder.
    pub fn record(&mut self) -> &mut RecordBuilder {
        self.records.get_mut(self.handle)
    }

    pub fn readable_accounts(&self) -> ReadableAccounts<'_, 's> {
        ReadableAccounts { stack: self.stack }
    }

    pub fn writable_accounts(&mut self) -> WritableAccounts<'_, 's> {
        WritableAccounts { stack: self.stack }
    }

    pub fn writable_tokens(&mut self) -> WritableTokens<'_, 's> {
        WritableTokens { stack: self.stack }
    }

    pub fn entity_ids(&mut self) -> EntityIds<'_, 's> {
        EntityIds { stack: self.stack }
    }

    #[cfg(any(test, feature = "mocks"))]
    pub(crate) fn savepoints(&mut self) -> &mut SavepointStack<'s> {
        self.stack
    }

    /// Resolve the authorization requirements of a prospective
    /// dispatch without running it.
    pub fn all_keys_for_transaction(
        &self,
        body: &TransactionBody,
        payer: AccountId,
    ) -> Result<TransactionKeys, PreCheckError> {
        all_keys_for_transaction(self.processor.registry, self.stack, body, payer)
    }

    /// Price a prospective dispatch of `body`.
    pub fn compute_dispatch_fees(
        &self,
        body: &TransactionBody,
        payer: AccountId,
        top_level: bool,
    ) -> Result<Fees, PreCheckError> {
        compute_dispatch_fees(
            self.processor.registry,
            self.processor.authorizer,
            &self.processor.rate,
            body,
            payer,
            top_level,
        )
    }

    /// Consume admission budget for `n` unscaled units at the current
    /// consensus time.
    pub fn should_throttle_n_of_unscaled(&mut self, n: u32, functionality: Functionality) -> bool {
        let now = self.processor.now;
        self.processor
            .throttle
            .should_throttle_n_of_unscaled(n, functionality, now)
    }

    /// Pre-flight whether every non-reverted child recorded so far
    /// still fits the admission budget. Vacuously true with no
    /// children. Peeks only; no budget is consumed.
    pub fn has_throttle_capacity_for_child_transactions(&self) -> bool {
        let now = self.processor.now;
        self.records
            .child_builders()
            .iter()
            .filter(|builder| builder.status() != ResponseCode::RevertedSuccess)
            .all(|builder| {
                !self
                    .processor
                    .throttle
                    .would_throttle(1, builder.functionality(), now)
            })
    }

    /// Staking rewards paid by this dispatch's children, accumulated
    /// additively per payer. Empty when no child paid anything.
    pub fn dispatch_paid_rewards(&self) -> &BTreeMap<AccountId, u64> {
        &self.paid_rewards
    }

    pub fn dispatch_preceding_transaction(
        &mut self,
        body: TransactionBody,
    ) -> Result<ResponseCode> {
        self.run(Dispatch::preceding(body, self.verifier.clone()))
    }

    pub fn dispatch_removable_preceding_transaction(
        &mut self,
        body: TransactionBody,
    ) -> Result<ResponseCode> {
        self.run(Dispatch::removable_preceding(body, self.verifier.clone()))
    }

    pub fn dispatch_child_transaction(&mut self, body: TransactionBody) -> Result<ResponseCode> {
        self.run(Dispatch::child(body, self.verifier.clone()))
    }

    pub fn dispatch_removable_child_transaction(
        &mut self,
        body: TransactionBody,
    ) -> Result<ResponseCode> {
        self.run(Dispatch::removable_child(body, self.verifier.clone()))
    }

    pub fn dispatch_scheduled_transaction(
        &mut self,
        body: TransactionBody,
    ) -> Result<ResponseCode> {
        self.run(Dispatch::scheduled(body, self.verifier.clone()))
    }

    fn run(&mut self, dispatch: Dispatch) -> Result<ResponseCode> {
        self.processor
            .process_dispatch(self.stack, self.records, dispatch, &mut self.paid_rewards)
    }
}
