//! Creates an account with an initial balance funded from the payer.

use super::check_memo;
use crate::context::HandleContext;
use crate::fees::{FeeContext, Fees};
use crate::keys::KeyGatheringContext;
use crate::registry::{HandleError, PreCheckError, TransactionHandler};
use anyhow::Result;
use tessera_types::{Account, AccountId, Operation, ResponseCode, TransactionBody};

pub struct AccountCreateHandler;

impl TransactionHandler for AccountCreateHandler {
    fn pure_checks(&self, body: &TransactionBody) -> Result<(), PreCheckError> {
        check_memo(body)?;
        let Operation::AccountCreate {
            initial_balance, ..
        } = &body.operation
        else {
            return Err(ResponseCode::InvalidTransactionBody.into());
        };
        // Transfer entries are signed, so balances above i64::MAX are
        // unrepresentable on a record.
        if *initial_balance > i64::MAX as u64 {
            return Err(ResponseCode::InvalidTransactionBody.into());
        }
        Ok(())
    }

    fn pre_handle(
        &self,
        body: &TransactionBody,
        keys: &mut KeyGatheringContext<'_, '_>,
    ) -> Result<()> {
        if let Operation::AccountCreate { key, .. } = &body.operation {
            // The new account's key may sign but does not have to; the
            // payer alone vouches for the creation.
            keys.optional_key(key.clone());
        }
        Ok(())
    }

    fn calculate_fees(&self, context: &FeeContext<'_>) -> Fees {
        Fees {
            node: context.rate.in_units(10),
            network: context.rate.in_units(40),
            service: context.rate.in_units(50),
        }
    }

    fn handle(&self, context: &mut HandleContext<'_, '_, '_>) -> Result<(), HandleError> {
        let Operation::AccountCreate {
            key,
            initial_balance,
        } = context.body().operation.clone()
        else {
            return Err(ResponseCode::InvalidTransactionBody.into());
        };

        let payer = context.payer();
        let accounts = context.writable_accounts();
        let mut payer_state = accounts
            .get(payer)?
            .ok_or(ResponseCode::AccountNotFound)?;
        if payer_state.deleted {
            return Err(ResponseCode::AccountDeleted.into());
        }
        if payer_state.balance < initial_balance {
            return Err(ResponseCode::InsufficientPayerBalance.into());
        }

        let number = context.entity_ids().next()?;
        let created = AccountId(number);

        payer_state.balance -= initial_balance;
        let mut accounts = context.writable_accounts();
        accounts.put(payer, payer_state);
        accounts.put(
            created,
            Account {
                key,
                balance: initial_balance,
                deleted: false,
                pending_reward: 0,
            },
        );

        let record = context.record();
        record.set_created_account(created);
        if initial_balance > 0 {
            record.add_transfer(payer, -(initial_balance as i64));
            record.add_transfer(created, initial_balance as i64);
        }
        Ok(())
    }
}
