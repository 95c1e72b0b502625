//! Per-dispatch records and the ordered record list.
//!
//! Every dispatch accumulates its receipt in a [`RecordBuilder`]. The
//! [`RecordListBuilder`] owns all builders produced under one top-level
//! transaction, in causal order, and hands out positional handles
//! rather than aliases. A [`RecordListCheckpoint`] bounds a later
//! revert: builders appended after the checkpoint are removed if their
//! dispatch was removable, or kept and marked reverted so the receipt
//! stays auditable.

use tessera_types::{
    AccountId, ConsensusTime, Functionality, ResponseCode, TransactionBody, TransactionId,
    TransactionRecord,
};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordBuilder {
    body: TransactionBody,
    consensus_time: ConsensusTime,
    removable: bool,
    status: ResponseCode,
    transfers: Vec<(AccountId, i64)>,
    created_account: Option<AccountId>,
    new_total_supply: Option<u64>,
    paid_staking_rewards: Vec<(AccountId, u64)>,
}

impl RecordBuilder {
    pub fn new(body: TransactionBody, consensus_time: ConsensusTime, removable: bool) -> Self {
        Self {
            body,
            consensus_time,
            removable,
            status: ResponseCode::Success,
            transfers: Vec::new(),
            created_account: None,
            new_total_supply: None,
            paid_staking_rewards: Vec::new(),
        }
    }

    pub fn body(&self) -> &TransactionBody {
        &self.body
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.body.transaction_id
    }

    pub fn functionality(&self) -> Functionality {
        self.body.functionality()
    }

    pub fn payer(&self) -> AccountId {
        self.body.payer()
    }

    pub fn removable(&self) -> bool {
        self.removable
    }

    pub fn status(&self) -> ResponseCode {
        self.status
    }

    pub fn set_status(&mut self, status: ResponseCode) {
        self.status = status;
    }

    pub fn add_transfer(&mut self, account: AccountId, amount: i64) {
        self.transfers.push((account, amount));
    }

    pub fn set_created_account(&mut self, account: AccountId) {
        self.created_account = Some(account);
    }

    pub fn set_new_total_supply(&mut self, supply: u64) {
        self.new_total_supply = Some(supply);
    }

    pub fn add_paid_staking_reward(&mut self, account: AccountId, amount: u64) {
        self.paid_staking_rewards.push((account, amount));
    }

    pub fn paid_staking_rewards(&self) -> &[(AccountId, u64)] {
        &self.paid_staking_rewards
    }

    /// Undo this record's visible side effects while keeping the
    /// receipt. A success becomes a reverted success and its reported
    /// effects are cleared; a failure code stays as it was.
    pub fn mark_reverted(&mut self) {
        if self.status == ResponseCode::Success {
            self.status = ResponseCode::RevertedSuccess;
        }
        self.transfers.clear();
        self.created_account = None;
        self.new_total_supply = None;
        self.paid_staking_rewards.clear();
    }

    pub fn build(&self) -> TransactionRecord {
        TransactionRecord {
            transaction_id: self.transaction_id(),
            functionality: self.functionality(),
            status: self.status,
            consensus_time: self.consensus_time,
            transfers: self.transfers.clone(),
            created_account: self.created_account,
            new_total_supply: self.new_total_supply,
            paid_staking_rewards: self.paid_staking_rewards.clone(),
        }
    }
}

/// Position of a record builder inside its list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordHandle {
    User,
    Preceding(usize),
    Child(usize),
}

/// Snapshot of list lengths; bounds a later revert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordListCheckpoint {
    precedings: usize,
    children: usize,
}

/// Owns every record builder produced under one top-level transaction.
/// Insertion order is causal order and never changes for surviving
/// builders.
pub struct RecordListBuilder {
    user: RecordBuilder,
    precedings: Vec<RecordBuilder>,
    children: Vec<RecordBuilder>,
}

impl RecordListBuilder {
    pub fn new(user: RecordBuilder) -> Self {
        Self {
            user,
            precedings: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn user(&self) -> &RecordBuilder {
        &self.user
    }

    pub fn preceding_builders(&self) -> &[RecordBuilder] {
        &self.precedings
    }

    pub fn child_builders(&self) -> &[RecordBuilder] {
        &self.children
    }

    pub fn add_preceding(&mut self, builder: RecordBuilder) -> RecordHandle {
        self.precedings.push(builder);
        RecordHandle::Preceding(self.precedings.len() - 1)
    }

    pub fn add_child(&mut self, builder: RecordBuilder) -> RecordHandle {
        self.children.push(builder);
        RecordHandle::Child(self.children.len() - 1)
    }

    pub fn get(&self, handle: RecordHandle) -> &RecordBuilder {
        match handle {
            RecordHandle::User => &self.user,
            RecordHandle::Preceding(i) => &self.precedings[i],
            RecordHandle::Child(i) => &self.children[i],
        }
    }

    pub fn get_mut(&mut self, handle: RecordHandle) -> &mut RecordBuilder {
        match handle {
            RecordHandle::User => &mut self.user,
            RecordHandle::Preceding(i) => &mut self.precedings[i],
            RecordHandle::Child(i) => &mut self.children[i],
        }
    }

    /// Capture the current end of both lists.
    pub fn checkpoint(&self) -> RecordListCheckpoint {
        RecordListCheckpoint {
            precedings: self.precedings.len(),
            children: self.children.len(),
        }
    }

    /// Undo everything appended after `checkpoint`: removable builders
    /// vanish as if they never happened, non-removable builders stay in
    /// place marked reverted. Everything at or before the checkpoint is
    /// untouched, order and identity preserved.
    pub fn revert_from(&mut self, checkpoint: RecordListCheckpoint) {
        assert!(
            checkpoint.precedings <= self.precedings.len()
                && checkpoint.children <= self.children.len(),
            "checkpoint does not belong to this record list"
        );
        let removed_precedings = Self::revert_suffix(&mut self.precedings, checkpoint.precedings);
        let removed_children = Self::revert_suffix(&mut self.children, checkpoint.children);
        if removed_precedings + removed_children > 0 {
            debug!(
                removed_precedings,
                removed_children, "removed records while reverting to checkpoint"
            );
        }
    }

    fn revert_suffix(builders: &mut Vec<RecordBuilder>, from: usize) -> usize {
        let mut kept = Vec::new();
        let mut removed = 0;
        for mut builder in builders.drain(from..) {
            if builder.removable() {
                removed += 1;
            } else {
                builder.mark_reverted();
                kept.push(builder);
            }
        }
        builders.extend(kept);
        removed
    }

    /// Finalize every surviving builder in causal order: precedings,
    /// then the user record, then children.
    pub fn build(&self) -> Vec<TransactionRecord> {
        let mut records = Vec::with_capacity(1 + self.precedings.len() + self.children.len());
        records.extend(self.precedings.iter().map(RecordBuilder::build));
        records.push(self.user.build());
        records.extend(self.children.iter().map(RecordBuilder::build));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{Operation, TokenId};

    fn body(payer: u64) -> TransactionBody {
        TransactionBody {
            transaction_id: TransactionId {
                payer: AccountId(payer),
                valid_start: ConsensusTime::new(1_000, 0),
            },
            memo: String::new(),
            operation: Operation::TokenMint {
                token: TokenId(1),
                amount: 1,
            },
        }
    }

    fn list() -> RecordListBuilder {
        RecordListBuilder::new(RecordBuilder::new(body(2), ConsensusTime::new(1_000, 0), false))
    }

    fn builder(payer: u64, removable: bool) -> RecordBuilder {
        RecordBuilder::new(body(payer), ConsensusTime::new(1_000, 0), removable)
    }

    #[test]
    fn test_revert_removes_removable_suffix() {
        let mut records = list();
        records.add_child(builder(10, false));
        let checkpoint = records.checkpoint();
        records.add_child(builder(11, true));
        records.add_child(builder(12, true));

        records.revert_from(checkpoint);

        assert_eq!(records.child_builders().len(), 1);
        assert_eq!(records.child_builders()[0].payer(), AccountId(10));
        assert_eq!(records.child_builders()[0].status(), ResponseCode::Success);
    }

    #[test]
    fn test_revert_marks_non_removable_in_place() {
        let mut records = list();
        let checkpoint = records.checkpoint();
        records.add_child(builder(10, false));
        records.add_child(builder(11, true));
        records.add_child(builder(12, false));

        records.revert_from(checkpoint);

        let children = records.child_builders();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].payer(), AccountId(10));
        assert_eq!(children[0].status(), ResponseCode::RevertedSuccess);
        assert_eq!(children[1].payer(), AccountId(12));
        assert_eq!(children[1].status(), ResponseCode::RevertedSuccess);
    }

    #[test]
    fn test_revert_keeps_failure_codes() {
        let mut records = list();
        let checkpoint = records.checkpoint();
        let handle = records.add_child(builder(10, false));
        records
            .get_mut(handle)
            .set_status(ResponseCode::InsufficientAccountBalance);

        records.revert_from(checkpoint);

        assert_eq!(
            records.child_builders()[0].status(),
            ResponseCode::InsufficientAccountBalance
        );
    }

    #[test]
    fn test_revert_covers_precedings_too() {
        let mut records = list();
        let checkpoint = records.checkpoint();
        records.add_preceding(builder(10, true));
        records.add_preceding(builder(11, false));

        records.revert_from(checkpoint);

        let precedings = records.preceding_builders();
        assert_eq!(precedings.len(), 1);
        assert_eq!(precedings[0].payer(), AccountId(11));
        assert_eq!(precedings[0].status(), ResponseCode::RevertedSuccess);
    }

    #[test]
    fn test_mark_reverted_clears_side_effects() {
        let mut builder = builder(10, false);
        builder.add_transfer(AccountId(10), -5);
        builder.add_transfer(AccountId(11), 5);
        builder.set_created_account(AccountId(99));
        builder.add_paid_staking_reward(AccountId(10), 3);

        builder.mark_reverted();

        let record = builder.build();
        assert_eq!(record.status, ResponseCode::RevertedSuccess);
        assert!(record.transfers.is_empty());
        assert_eq!(record.created_account, None);
        assert!(record.paid_staking_rewards.is_empty());
    }

    #[test]
    fn test_build_orders_precedings_user_children() {
        let mut records = list();
        records.add_preceding(builder(10, false));
        records.add_child(builder(11, false));

        let built = records.build();
        assert_eq!(built.len(), 3);
        assert_eq!(built[0].transaction_id.payer, AccountId(10));
        assert_eq!(built[1].transaction_id.payer, AccountId(2));
        assert_eq!(built[2].transaction_id.payer, AccountId(11));
    }

    #[test]
    #[should_panic(expected = "checkpoint does not belong")]
    fn test_foreign_checkpoint_is_a_contract_violation() {
        let mut bigger = list();
        bigger.add_child(builder(10, false));
        let checkpoint = bigger.checkpoint();

        let mut records = list();
        records.revert_from(checkpoint);
    }
}
