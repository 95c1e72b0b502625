//! Multi-party balance adjustments. Settles any pending staking reward
//! of a touched account before applying its adjustment, reporting the
//! payout on the record.

use super::check_memo;
use crate::context::HandleContext;
use crate::fees::{FeeContext, Fees};
use crate::keys::KeyGatheringContext;
use crate::registry::{HandleError, PreCheckError, TransactionHandler};
use anyhow::Result;
use std::collections::BTreeSet;
use tessera_types::{Operation, ResponseCode, TransactionBody, MAX_TRANSFER_ENTRIES};

pub struct CryptoTransferHandler;

impl TransactionHandler for CryptoTransferHandler {
    fn pure_checks(&self, body: &TransactionBody) -> Result<(), PreCheckError> {
        check_memo(body)?;
        let Operation::CryptoTransfer { transfers } = &body.operation else {
            return Err(ResponseCode::InvalidTransactionBody.into());
        };
        if transfers.is_empty() || transfers.len() > MAX_TRANSFER_ENTRIES {
            return Err(ResponseCode::InvalidTransactionBody.into());
        }
        let mut seen = BTreeSet::new();
        let mut sum: i128 = 0;
        for (account, amount) in transfers {
            if !seen.insert(*account) {
                return Err(ResponseCode::InvalidAccountAmounts.into());
            }
            sum += i128::from(*amount);
        }
        if sum != 0 {
            return Err(ResponseCode::InvalidAccountAmounts.into());
        }
        Ok(())
    }

    fn pre_handle(
        &self,
        body: &TransactionBody,
        keys: &mut KeyGatheringContext<'_, '_>,
    ) -> Result<()> {
        let Operation::CryptoTransfer { transfers } = &body.operation else {
            return Ok(());
        };
        // Every debited account other than the payer must sign.
        for (account, amount) in transfers {
            if *amount < 0 && *account != keys.payer() {
                let key = keys.account_key(*account)?;
                keys.require_key(key);
            }
        }
        Ok(())
    }

    fn calculate_fees(&self, context: &FeeContext<'_>) -> Fees {
        let entries = match &context.body.operation {
            Operation::CryptoTransfer { transfers } => transfers.len() as u64,
            _ => 0,
        };
        Fees {
            node: context.rate.in_units(1),
            network: context.rate.in_units(2 * entries),
            service: context.rate.in_units(5),
        }
    }

    fn handle(&self, context: &mut HandleContext<'_, '_, '_>) -> Result<(), HandleError> {
        let Operation::CryptoTransfer { transfers } = context.body().operation.clone() else {
            return Err(ResponseCode::InvalidTransactionBody.into());
        };

        for (account_id, amount) in transfers {
            let mut accounts = context.writable_accounts();
            let mut account = accounts
                .get(account_id)?
                .ok_or(ResponseCode::AccountNotFound)?;
            if account.deleted {
                return Err(ResponseCode::AccountDeleted.into());
            }

            // Settle the earned reward before the adjustment so a debit
            // can spend it.
            let reward = account.pending_reward;
            if reward > 0 {
                account.balance = account
                    .balance
                    .checked_add(reward)
                    .ok_or(ResponseCode::InvalidAccountAmounts)?;
                account.pending_reward = 0;
            }

            if amount < 0 {
                account.balance = account
                    .balance
                    .checked_sub(amount.unsigned_abs())
                    .ok_or(ResponseCode::InsufficientAccountBalance)?;
            } else {
                account.balance = account
                    .balance
                    .checked_add(amount as u64)
                    .ok_or(ResponseCode::InvalidAccountAmounts)?;
            }
            accounts.put(account_id, account);

            let record = context.record();
            record.add_transfer(account_id, amount);
            if reward > 0 {
                record.add_paid_staking_reward(account_id, reward);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::NoWaivers;
    use crate::handlers::production_registry;
    use crate::mocks;
    use crate::state::State as _;
    use tessera_types::{Account, AccountId, Key, Value};

    const PAYER: AccountId = AccountId(2);

    #[test]
    fn test_pure_checks_reject_unbalanced_transfers() {
        let body = mocks::transfer_body(PAYER, vec![(PAYER, -5), (AccountId(9), 6)]);
        let err = CryptoTransferHandler.pure_checks(&body).unwrap_err();
        assert_eq!(err.code, ResponseCode::InvalidAccountAmounts);
    }

    #[test]
    fn test_pure_checks_reject_duplicate_accounts() {
        let body = mocks::transfer_body(PAYER, vec![(PAYER, -5), (PAYER, 5)]);
        let err = CryptoTransferHandler.pure_checks(&body).unwrap_err();
        assert_eq!(err.code, ResponseCode::InvalidAccountAmounts);
    }

    #[test]
    fn test_transfer_moves_balances_and_pays_pending_rewards() {
        let mut state = mocks::genesis(&[(2, 1_000)]);
        state
            .insert(
                Key::Account(AccountId(3)),
                Value::Account(Account {
                    pending_reward: 7,
                    ..mocks::account(3, 100)
                }),
            )
            .unwrap();
        let registry = production_registry();
        let mut processor = mocks::processor(&registry, &NoWaivers, 1_000);

        let body = mocks::transfer_body(PAYER, vec![(PAYER, -5), (AccountId(3), 5)]);
        let outcome = processor
            .handle_transaction(&state, &mocks::signed(body, &[2]))
            .unwrap();

        assert_eq!(outcome.status, ResponseCode::Success);
        assert_eq!(outcome.records[0].paid_staking_rewards, vec![(AccountId(3), 7)]);
        state.apply(outcome.changes).unwrap();

        let recipient = match state.get(&Key::Account(AccountId(3))).unwrap() {
            Some(Value::Account(account)) => account,
            other => panic!("unexpected recipient state: {other:?}"),
        };
        assert_eq!(recipient.balance, 112);
        assert_eq!(recipient.pending_reward, 0);
    }

    #[test]
    fn test_debit_from_non_signer_fails_authorization() {
        let state = mocks::genesis(&[(2, 1_000), (3, 1_000)]);
        let registry = production_registry();
        let mut processor = mocks::processor(&registry, &NoWaivers, 1_000);

        // Account 3 is debited but only the payer signed.
        let body = mocks::transfer_body(PAYER, vec![(AccountId(3), -5), (PAYER, 5)]);
        let outcome = processor
            .handle_transaction(&state, &mocks::signed(body.clone(), &[2]))
            .unwrap();
        assert_eq!(outcome.status, ResponseCode::InvalidSignature);
        assert!(outcome.changes.is_empty());

        // With account 3's signature attached it goes through.
        let outcome = processor
            .handle_transaction(&state, &mocks::signed(body, &[2, 3]))
            .unwrap();
        assert_eq!(outcome.status, ResponseCode::Success);
    }

    #[test]
    fn test_overdraft_reverts_everything() {
        let state = mocks::genesis(&[(2, 3)]);
        let registry = production_registry();
        let mut processor = mocks::processor(&registry, &NoWaivers, 1_000);

        let body = mocks::transfer_body(PAYER, vec![(PAYER, -5), (AccountId(9), 5)]);
        let outcome = processor
            .handle_transaction(&state, &mocks::signed(body, &[2]))
            .unwrap();

        assert_eq!(outcome.status, ResponseCode::InsufficientAccountBalance);
        assert!(outcome.changes.is_empty());
        // The receipt survives with the failure code.
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].status,
            ResponseCode::InsufficientAccountBalance
        );
    }
}
