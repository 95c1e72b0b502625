//! Nested overlays of pending state mutation.
//!
//! Every dispatch works against its own savepoint: an overlay of
//! key/value changes layered on whatever its parent has already done.
//! Reads fall through frame by frame down to the durable base; writes
//! land only in the top frame. Committing folds the top frame into its
//! parent, rolling back discards it. `commit_full_stack` folds every
//! frame into the durable changeset, which the outer workflow drains
//! and applies to storage once the top-level transaction resolves.

use crate::state::{State, Status};
use anyhow::Result;
use std::collections::BTreeMap;
use tessera_types::{Key, Value};

pub struct SavepointStack<'a> {
    base: &'a dyn State,
    /// Mutations already made irrevocable by `commit_full_stack`,
    /// awaiting application to the durable store.
    durable: BTreeMap<Key, Status>,
    frames: Vec<BTreeMap<Key, Status>>,
    full_commits: u32,
}

impl<'a> SavepointStack<'a> {
    pub fn new(base: &'a dyn State) -> Self {
        Self {
            base,
            durable: BTreeMap::new(),
            frames: Vec::new(),
            full_commits: 0,
        }
    }

    /// Number of open savepoints.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// How many times the full stack has been irrevocably committed.
    pub fn full_commits(&self) -> u32 {
        self.full_commits
    }

    /// Push a fresh overlay. The new savepoint is exclusively owned by
    /// the dispatch that requested it; nothing below is writable until
    /// it resolves.
    pub fn create_savepoint(&mut self) {
        self.frames.push(BTreeMap::new());
    }

    /// Read through the overlays, newest first, then the durable
    /// changeset, then the base state.
    pub fn get(&self, key: &Key) -> Result<Option<Value>> {
        for frame in self.frames.iter().rev() {
            match frame.get(key) {
                Some(Status::Update(value)) => return Ok(Some(value.clone())),
                Some(Status::Delete) => return Ok(None),
                None => {}
            }
        }
        match self.durable.get(key) {
            Some(Status::Update(value)) => Ok(Some(value.clone())),
            Some(Status::Delete) => Ok(None),
            None => self.base.get(key),
        }
    }

    pub fn insert(&mut self, key: Key, value: Value) {
        let frame = self
            .frames
            .last_mut()
            .expect("state mutation outside a savepoint");
        frame.insert(key, Status::Update(value));
    }

    pub fn delete(&mut self, key: Key) {
        let frame = self
            .frames
            .last_mut()
            .expect("state mutation outside a savepoint");
        frame.insert(key, Status::Delete);
    }

    /// Fold the top savepoint into its parent (or, for the outermost
    /// savepoint, into the durable changeset).
    pub fn commit(&mut self) {
        let top = self.frames.pop().expect("commit on an empty stack");
        let target = self.frames.last_mut().unwrap_or(&mut self.durable);
        target.extend(top);
    }

    /// Discard every mutation made in the top savepoint.
    pub fn rollback(&mut self) {
        self.frames.pop().expect("rollback on an empty stack");
    }

    /// Fold every open savepoint down into the durable changeset,
    /// making all pending mutation irrevocable, then reopen empty
    /// savepoints at the same depth so suspended enclosing dispatches
    /// keep a writable top when control returns to them.
    pub fn commit_full_stack(&mut self) {
        let depth = self.frames.len();
        while !self.frames.is_empty() {
            self.commit();
        }
        self.full_commits += 1;
        for _ in 0..depth {
            self.frames.push(BTreeMap::new());
        }
    }

    /// Drain the irrevocable changeset for application to storage, in
    /// key order.
    pub fn take_durable(&mut self) -> Vec<(Key, Status)> {
        std::mem::take(&mut self.durable).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Memory;
    use commonware_cryptography::{ed25519::PrivateKey, Signer as _};
    use tessera_types::{Account, AccountId};

    fn account(seed: u64, balance: u64) -> Account {
        Account {
            key: PrivateKey::from_seed(seed).public_key(),
            balance,
            deleted: false,
            pending_reward: 0,
        }
    }

    #[test]
    fn test_reads_fall_through_to_base() {
        let mut base = Memory::default();
        base.insert(Key::Account(AccountId(1)), Value::Account(account(1, 50)))
            .unwrap();
        let stack = SavepointStack::new(&base);

        let got = stack.get(&Key::Account(AccountId(1))).unwrap();
        assert_eq!(got, Some(Value::Account(account(1, 50))));
        assert_eq!(stack.get(&Key::Account(AccountId(2))).unwrap(), None);
    }

    #[test]
    fn test_rollback_discards_only_top_frame() {
        let base = Memory::default();
        let mut stack = SavepointStack::new(&base);

        stack.create_savepoint();
        stack.insert(Key::Account(AccountId(1)), Value::Account(account(1, 10)));
        stack.create_savepoint();
        stack.insert(Key::Account(AccountId(1)), Value::Account(account(1, 99)));
        stack.insert(Key::Account(AccountId(2)), Value::Account(account(2, 7)));

        stack.rollback();

        assert_eq!(
            stack.get(&Key::Account(AccountId(1))).unwrap(),
            Some(Value::Account(account(1, 10)))
        );
        assert_eq!(stack.get(&Key::Account(AccountId(2))).unwrap(), None);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_commit_folds_into_parent() {
        let base = Memory::default();
        let mut stack = SavepointStack::new(&base);

        stack.create_savepoint();
        stack.create_savepoint();
        stack.insert(Key::Account(AccountId(1)), Value::Account(account(1, 10)));
        stack.commit();

        assert_eq!(stack.depth(), 1);
        assert_eq!(
            stack.get(&Key::Account(AccountId(1))).unwrap(),
            Some(Value::Account(account(1, 10)))
        );
        // Nothing durable yet.
        assert!(stack.take_durable().is_empty());
    }

    #[test]
    fn test_commit_full_stack_is_irrevocable() {
        let base = Memory::default();
        let mut stack = SavepointStack::new(&base);

        stack.create_savepoint();
        stack.insert(Key::Account(AccountId(1)), Value::Account(account(1, 10)));
        stack.create_savepoint();
        stack.insert(Key::Account(AccountId(2)), Value::Account(account(2, 20)));

        stack.commit_full_stack();

        // Depth is preserved with fresh frames so enclosing dispatches
        // can keep mutating, but everything written so far is durable.
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.full_commits(), 1);
        assert_eq!(
            stack.get(&Key::Account(AccountId(2))).unwrap(),
            Some(Value::Account(account(2, 20)))
        );
        let durable = stack.take_durable();
        assert_eq!(durable.len(), 2);

        // Mutations after the full commit are revocable again.
        stack.insert(Key::Account(AccountId(3)), Value::Account(account(3, 30)));
        stack.rollback();
        assert_eq!(stack.get(&Key::Account(AccountId(3))).unwrap(), None);
    }

    #[test]
    fn test_delete_shadows_base() {
        let mut base = Memory::default();
        base.insert(Key::Account(AccountId(1)), Value::Account(account(1, 50)))
            .unwrap();
        let mut stack = SavepointStack::new(&base);

        stack.create_savepoint();
        stack.delete(Key::Account(AccountId(1)));
        assert_eq!(stack.get(&Key::Account(AccountId(1))).unwrap(), None);

        stack.rollback();
        assert!(stack.get(&Key::Account(AccountId(1))).unwrap().is_some());
    }

    #[test]
    #[should_panic(expected = "rollback on an empty stack")]
    fn test_rollback_on_empty_stack_is_a_contract_violation() {
        let base = Memory::default();
        let mut stack = SavepointStack::new(&base);
        stack.rollback();
    }

    #[test]
    #[should_panic(expected = "mutation outside a savepoint")]
    fn test_mutation_outside_savepoint_is_a_contract_violation() {
        let base = Memory::default();
        let mut stack = SavepointStack::new(&base);
        stack.insert(Key::EntityCounter, Value::EntityCounter(1));
    }
}
