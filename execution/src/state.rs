use anyhow::Result;
#[cfg(any(test, feature = "mocks"))]
use std::collections::BTreeMap;
use tessera_types::{Key, Value};

/// A mutation pending against the durable store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Update(Value),
    Delete,
}

/// Read/write access to ledger state.
///
/// The engine itself only reads through this trait (its writes stay in
/// savepoint overlays until the outer workflow applies the drained
/// changeset); `insert`/`delete`/`apply` exist for the durable store and
/// for in-memory state used in tests.
pub trait State {
    fn get(&self, key: &Key) -> Result<Option<Value>>;
    fn insert(&mut self, key: Key, value: Value) -> Result<()>;
    fn delete(&mut self, key: &Key) -> Result<()>;

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        for (key, status) in changes {
            match status {
                Status::Update(value) => self.insert(key, value)?,
                Status::Delete => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

/// In-memory state for tests and simulation.
#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct Memory {
    // BTreeMap so iteration order can never leak nondeterminism.
    state: BTreeMap<Key, Value>,
}

#[cfg(any(test, feature = "mocks"))]
impl State for Memory {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.state.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.state.remove(key);
        Ok(())
    }
}
