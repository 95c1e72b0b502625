//! Common types for the tessera ledger.
//!
//! Everything the execution engine and its callers exchange lives here:
//! entity identifiers, transaction bodies and their operations, response
//! codes, consensus time, the signed transaction envelope, and the
//! finalized transaction record handed to the record sink.
//!
//! All wire encodings are canonical: a value always encodes to the same
//! bytes on every replica, so digests and signatures are stable.

pub mod execution;

pub use execution::{
    transaction_namespace, Account, AccountId, ConsensusTime, Functionality, Key, Operation,
    ResponseCode, SignaturePair, Token, TokenId, Transaction, TransactionBody, TransactionId,
    TransactionRecord, Value, MAX_MEMO_LENGTH, MAX_SIGNATURES, MAX_TRANSFER_ENTRIES, NAMESPACE,
};
