//! Key resolution: which keys must (or may) authorize a dispatch, and
//! verification of those requirements against pre-computed signature
//! results.
//!
//! Gathering runs the handler's pure checks first, then its pre-handle
//! callback. A pure-check failure propagates its own response code; any
//! other gathering failure is coerced to a single canonical code,
//! because "could not determine the signers" is the only thing the
//! authorization stage is allowed to learn.

use crate::registry::{HandlerRegistry, PreCheckError};
use crate::savepoint::SavepointStack;
use anyhow::{bail, Context, Result};
use commonware_cryptography::ed25519::PublicKey;
use std::collections::BTreeSet;
use tessera_types::{
    AccountId, Key, ResponseCode, TokenId, Transaction, TransactionBody, Value,
};

/// The resolved authorization requirements of one dispatch. The payer
/// key is always present and never appears in either set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionKeys {
    pub payer_key: PublicKey,
    pub required: BTreeSet<PublicKey>,
    pub optional: BTreeSet<PublicKey>,
}

/// Scoped view handed to a handler's pre-handle callback: read access
/// to the current state plus collectors for the keys it names.
pub struct KeyGatheringContext<'a, 's> {
    stack: &'a SavepointStack<'s>,
    payer: AccountId,
    required: BTreeSet<PublicKey>,
    optional: BTreeSet<PublicKey>,
}

impl<'a, 's> KeyGatheringContext<'a, 's> {
    fn new(stack: &'a SavepointStack<'s>, payer: AccountId) -> Self {
        Self {
            stack,
            payer,
            required: BTreeSet::new(),
            optional: BTreeSet::new(),
        }
    }

    pub fn payer(&self) -> AccountId {
        self.payer
    }

    /// The key of an existing, live account.
    pub fn account_key(&self, account: AccountId) -> Result<PublicKey> {
        let value = self
            .stack
            .get(&Key::Account(account))
            .context("failed to read account during key gathering")?;
        match value {
            Some(Value::Account(state)) if !state.deleted => Ok(state.key),
            _ => bail!("account {account} is missing or deleted"),
        }
    }

    /// The admin key of an existing token.
    pub fn token_admin_key(&self, token: TokenId) -> Result<PublicKey> {
        let value = self
            .stack
            .get(&Key::Token(token))
            .context("failed to read token during key gathering")?;
        match value {
            Some(Value::Token(state)) => Ok(state.admin_key),
            _ => bail!("token is missing"),
        }
    }

    pub fn require_key(&mut self, key: PublicKey) {
        self.required.insert(key);
    }

    pub fn optional_key(&mut self, key: PublicKey) {
        self.optional.insert(key);
    }
}

/// Resolve the full authorization requirements for `body` dispatched
/// with `payer`.
pub fn all_keys_for_transaction(
    registry: &HandlerRegistry,
    stack: &SavepointStack<'_>,
    body: &TransactionBody,
    payer: AccountId,
) -> Result<TransactionKeys, PreCheckError> {
    let handler = registry
        .get(body.functionality())
        .ok_or(PreCheckError::from(ResponseCode::NotSupported))?;
    handler.pure_checks(body)?;

    // An absent, deleted, or unreadable payer means the signers cannot
    // be determined, nothing more specific.
    let payer_key = match stack.get(&Key::Account(payer)) {
        Ok(Some(Value::Account(account))) if !account.deleted => account.key,
        _ => return Err(ResponseCode::UnresolvableRequiredSigners.into()),
    };

    let mut keys = KeyGatheringContext::new(stack, payer);
    if handler.pre_handle(body, &mut keys).is_err() {
        return Err(ResponseCode::UnresolvableRequiredSigners.into());
    }

    let mut required = keys.required;
    let mut optional = keys.optional;
    required.remove(&payer_key);
    optional.remove(&payer_key);

    Ok(TransactionKeys {
        payer_key,
        required,
        optional,
    })
}

/// Pure lookup against signature verification results computed ahead
/// of execution. The engine never triggers cryptographic work itself.
#[derive(Clone, Debug)]
pub struct KeyVerifier {
    verified: BTreeSet<PublicKey>,
}

impl KeyVerifier {
    pub fn new(verified: BTreeSet<PublicKey>) -> Self {
        Self { verified }
    }

    pub fn from_transaction(transaction: &Transaction) -> Self {
        Self::new(transaction.verified_keys())
    }

    pub fn verified(&self, key: &PublicKey) -> bool {
        self.verified.contains(key)
    }

    /// The payer key and every required key must have verified.
    pub fn verify_authorization(&self, keys: &TransactionKeys) -> Result<(), ResponseCode> {
        if !self.verified(&keys.payer_key) {
            return Err(ResponseCode::InvalidSignature);
        }
        for key in &keys.required {
            if !self.verified(key) {
                return Err(ResponseCode::InvalidSignature);
            }
        }
        Ok(())
    }
}
