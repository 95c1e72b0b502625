//! Mints supply to a token's treasury, gated on the token admin key.

use super::check_memo;
use crate::context::HandleContext;
use crate::fees::{FeeContext, Fees};
use crate::keys::KeyGatheringContext;
use crate::registry::{HandleError, PreCheckError, TransactionHandler};
use anyhow::Result;
use tessera_types::{Operation, ResponseCode, TransactionBody};

pub struct TokenMintHandler;

impl TransactionHandler for TokenMintHandler {
    fn pure_checks(&self, body: &TransactionBody) -> Result<(), PreCheckError> {
        check_memo(body)?;
        let Operation::TokenMint { amount, .. } = &body.operation else {
            return Err(ResponseCode::InvalidTransactionBody.into());
        };
        if *amount == 0 {
            return Err(ResponseCode::InvalidTransactionBody.into());
        }
        Ok(())
    }

    fn pre_handle(
        &self,
        body: &TransactionBody,
        keys: &mut KeyGatheringContext<'_, '_>,
    ) -> Result<()> {
        if let Operation::TokenMint { token, .. } = &body.operation {
            let admin = keys.token_admin_key(*token)?;
            keys.require_key(admin);
        }
        Ok(())
    }

    fn calculate_fees(&self, context: &FeeContext<'_>) -> Fees {
        Fees {
            node: context.rate.in_units(2),
            network: context.rate.in_units(8),
            service: context.rate.in_units(20),
        }
    }

    fn handle(&self, context: &mut HandleContext<'_, '_, '_>) -> Result<(), HandleError> {
        let Operation::TokenMint { token, amount } = context.body().operation.clone() else {
            return Err(ResponseCode::InvalidTransactionBody.into());
        };

        let mut tokens = context.writable_tokens();
        let mut state = tokens.get(token)?.ok_or(ResponseCode::TokenNotFound)?;
        let new_supply = state
            .total_supply
            .checked_add(amount)
            .filter(|supply| *supply <= state.max_supply)
            .ok_or(ResponseCode::TokenMaxSupplyReached)?;
        state.total_supply = new_supply;
        tokens.put(token, state);

        context.record().set_new_total_supply(new_supply);
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
    use commonware_cryptography::Signer as _;
    use tessera_types::{AccountId, Key, Token, TokenId, Value};

    const PAYER: AccountId = AccountId(2);
    const TOKEN: TokenId = TokenId(500);

    fn state_with_token(total: u64, max: u64) -> crate::state::Memory {
        let mut state = mocks::genesis(&[(2, 1_000)]);
        state
            .insert(
                Key::Token(TOKEN),
                Value::Token(Token {
                    admin_key: mocks::keypair(4).public_key(),
                    treasury: PAYER,
                    total_supply: total,
                    max_supply: max,
                }),
            )
            .unwrap();
        state
    }

    #[test]
    fn test_pure_checks_reject_zero_mint() {
        let body = mocks::mint_body(PAYER, TOKEN, 0);
        let err = TokenMintHandler.pure_checks(&body).unwrap_err();
        assert_eq!(err.code, ResponseCode::InvalidTransactionBody);
    }

    #[test]
    fn test_mint_requires_admin_signature() {
        let state = state_with_token(50, 100);
        let registry = production_registry();
        let mut processor = mocks::processor(&registry, &NoWaivers, 1_000);

        let body = mocks::mint_body(PAYER, TOKEN, 10);
        let outcome = processor
            .handle_transaction(&state, &mocks::signed(body, &[2]))
            .unwrap();
        assert_eq!(outcome.status, ResponseCode::InvalidSignature);
    }

    #[test]
    fn test_mint_raises_total_supply_to_the_cap() {
        let mut state = state_with_token(50, 100);
        let registry = production_registry();
        let mut processor = mocks::processor(&registry, &NoWaivers, 1_000);

        let body = mocks::mint_body(PAYER, TOKEN, 50);
        let outcome = processor
            .handle_transaction(&state, &mocks::signed(body, &[2, 4]))
            .unwrap();

        assert_eq!(outcome.status, ResponseCode::Success);
        assert_eq!(outcome.records[0].new_total_supply, Some(100));
        state.apply(outcome.changes).unwrap();
        let token = match state.get(&Key::Token(TOKEN)).unwrap() {
            Some(Value::Token(token)) => token,
            other => panic!("unexpected token state: {other:?}"),
        };
        assert_eq!(token.total_supply, 100);
    }

    #[test]
    fn test_mint_beyond_max_supply_fails() {
        let state = state_with_token(50, 100);
        let registry = production_registry();
        let mut processor = mocks::processor(&registry, &NoWaivers, 1_000);

        let body = mocks::mint_body(PAYER, TOKEN, 51);
        let outcome = processor
            .handle_transaction(&state, &mocks::signed(body, &[2, 4]))
            .unwrap();
        assert_eq!(outcome.status, ResponseCode::TokenMaxSupplyReached);
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn test_mint_on_unknown_token_cannot_resolve_signers() {
        let state = mocks::genesis(&[(2, 1_000)]);
        let registry = production_registry();
        let mut processor = mocks::processor(&registry, &NoWaivers, 1_000);

        let body = mocks::mint_body(PAYER, TokenId(999), 10);
        let outcome = processor
            .handle_transaction(&state, &mocks::signed(body, &[2]))
            .unwrap();
        assert_eq!(outcome.status, ResponseCode::UnresolvableRequiredSigners);
    }
}
