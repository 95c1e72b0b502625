//! Shared test doubles: seeded keys and accounts, transaction body
//! builders, and an instrumented handler with scriptable behavior.

use crate::context::HandleContext;
use crate::dispatch::DispatchProcessor;
use crate::fees::{Authorizer, ExchangeRate, FeeContext, Fees};
use crate::keys::KeyGatheringContext;
use crate::registry::{HandleError, HandlerRegistry, PreCheckError, TransactionHandler};
use crate::state::{Memory, State as _};
use crate::throttle::UtilizationManager;
use anyhow::{bail, Result};
use commonware_cryptography::{ed25519::PrivateKey, ed25519::PublicKey, Signer as _};
use std::cell::Cell;
use std::rc::Rc;
use tessera_types::{
    Account, AccountId, ConsensusTime, Functionality, Key, Operation, ResponseCode, TokenId,
    Transaction, TransactionBody, TransactionId, Value,
};

pub fn keypair(seed: u64) -> PrivateKey {
    PrivateKey::from_seed(seed)
}

pub fn account(seed: u64, balance: u64) -> Account {
    Account {
        key: keypair(seed).public_key(),
        balance,
        deleted: false,
        pending_reward: 0,
    }
}

/// In-memory state holding one account per `(number, balance)` entry,
/// keyed by `AccountId(number)` with the key seeded from `number`.
pub fn genesis(accounts: &[(u64, u64)]) -> Memory {
    let mut state = Memory::default();
    for (number, balance) in accounts {
        state
            .insert(
                Key::Account(AccountId(*number)),
                Value::Account(account(*number, *balance)),
            )
            .unwrap();
    }
    state
}

pub fn now() -> ConsensusTime {
    ConsensusTime::new(1_000, 0)
}

fn body(payer: AccountId, operation: Operation) -> TransactionBody {
    TransactionBody {
        transaction_id: TransactionId {
            payer,
            valid_start: now(),
        },
        memo: String::new(),
        operation,
    }
}

pub fn transfer_body(payer: AccountId, transfers: Vec<(AccountId, i64)>) -> TransactionBody {
    body(payer, Operation::CryptoTransfer { transfers })
}

pub fn create_body(payer: AccountId, key_seed: u64, initial_balance: u64) -> TransactionBody {
    body(
        payer,
        Operation::AccountCreate {
            key: keypair(key_seed).public_key(),
            initial_balance,
        },
    )
}

pub fn mint_body(payer: AccountId, token: TokenId, amount: u64) -> TransactionBody {
    body(payer, Operation::TokenMint { token, amount })
}

/// Sign `body` with each seed, first seed first.
pub fn signed(body: TransactionBody, seeds: &[u64]) -> Transaction {
    let (first, rest) = seeds.split_first().expect("at least one signer");
    let mut transaction = Transaction::sign(&keypair(*first), body);
    for seed in rest {
        transaction.also_sign(&keypair(*seed));
    }
    transaction
}

pub fn processor<'c>(
    registry: &'c HandlerRegistry,
    authorizer: &'c dyn Authorizer,
    now_seconds: u64,
) -> DispatchProcessor<'c> {
    DispatchProcessor::new(
        registry,
        authorizer,
        ExchangeRate::default(),
        UtilizationManager::unthrottled(),
        ConsensusTime::new(now_seconds, 0),
    )
}

pub fn registry_with(functionality: Functionality, handler: Rc<MockHandler>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(functionality, Box::new(handler));
    registry
}

/// Waives fees for every payer.
pub struct WaiveAll;

impl Authorizer for WaiveAll {
    fn has_waived_fees(&self, _: AccountId, _: &TransactionBody) -> bool {
        true
    }
}

type OnHandle = Box<dyn Fn(&mut HandleContext<'_, '_, '_>) -> Result<(), HandleError>>;

/// Scriptable handler counting every callback invocation. Register it
/// through an `Rc` so tests keep a handle on the counters.
#[derive(Default)]
pub struct MockHandler {
    pub pure_check_failure: Option<ResponseCode>,
    /// Report an unreadable collaborator from pre-handle.
    pub pre_handle_failure: bool,
    pub required_keys: Vec<PublicKey>,
    pub optional_keys: Vec<PublicKey>,
    pub fees: Fees,
    /// State written on every successful handle call.
    pub writes: Vec<(Key, Value)>,
    /// Staking rewards reported on the record builder.
    pub rewards: Vec<(AccountId, u64)>,
    pub handle_failure: Option<ResponseCode>,
    /// Arbitrary extra behavior, run after `writes` and `rewards`.
    pub on_handle: Option<OnHandle>,
    pub pure_checks_calls: Cell<u32>,
    pub pre_handle_calls: Cell<u32>,
    pub fee_calls: Cell<u32>,
    pub handle_calls: Cell<u32>,
}

impl TransactionHandler for Rc<MockHandler> {
    fn pure_checks(&self, _: &TransactionBody) -> Result<(), PreCheckError> {
        self.pure_checks_calls.set(self.pure_checks_calls.get() + 1);
        match self.pure_check_failure {
            Some(code) => Err(code.into()),
            None => Ok(()),
        }
    }

    fn pre_handle(
        &self,
        _: &TransactionBody,
        keys: &mut KeyGatheringContext<'_, '_>,
    ) -> Result<()> {
        self.pre_handle_calls.set(self.pre_handle_calls.get() + 1);
        if self.pre_handle_failure {
            bail!("collaborator unreadable");
        }
        for key in &self.required_keys {
            keys.require_key(key.clone());
        }
        for key in &self.optional_keys {
            keys.optional_key(key.clone());
        }
        Ok(())
    }

    fn calculate_fees(&self, _: &FeeContext<'_>) -> Fees {
        self.fee_calls.set(self.fee_calls.get() + 1);
        self.fees
    }

    fn handle(&self, context: &mut HandleContext<'_, '_, '_>) -> Result<(), HandleError> {
        self.handle_calls.set(self.handle_calls.get() + 1);
        for (key, value) in &self.writes {
            context.savepoints().insert(key.clone(), value.clone());
        }
        for (account, amount) in &self.rewards {
            context.record().add_paid_staking_reward(*account, *amount);
        }
        if let Some(hook) = &self.on_handle {
            hook(context)?;
        }
        if let Some(code) = self.handle_failure {
            return Err(code.into());
        }
        Ok(())
    }
}
