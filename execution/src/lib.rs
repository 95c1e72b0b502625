//! Tessera execution layer: the nested dispatch and savepoint engine.
//!
//! Applies one consensus-ordered transaction at a time. Business logic
//! runs against an exclusively-owned savepoint layered on the durable
//! state, may spawn preceding/child/scheduled dispatches that recurse
//! through the same state machine, and resolves to a terminal status
//! on its record builder. Commit folds a savepoint into its parent;
//! a successful non-removable preceding dispatch commits the whole
//! stack irrevocably.
//!
//! ## Determinism requirements
//! - Do not read wall-clock time inside execution; the consensus
//!   timestamp is the only time source.
//! - Signature verification results are computed ahead of execution
//!   and consumed as pure lookups.
//! - Avoid iteration order of hash-based collections influencing
//!   outputs; state and accumulators use ordered maps.
//!
//! The primary entrypoint is [`DispatchProcessor`].

pub mod context;
pub mod dispatch;
pub mod fees;
pub mod handlers;
pub mod keys;
pub mod record;
pub mod registry;
pub mod savepoint;
pub mod state;
pub mod throttle;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;


pub use context::{EntityIds, HandleContext, ReadableAccounts, WritableAccounts, WritableTokens};
pub use dispatch::{Dispatch, DispatchCategory, DispatchOutcome, DispatchProcessor};
pub use fees::{compute_dispatch_fees, Authorizer, ExchangeRate, FeeContext, Fees, NoWaivers};
pub use keys::{all_keys_for_transaction, KeyGatheringContext, KeyVerifier, TransactionKeys};
pub use record::{RecordBuilder, RecordHandle, RecordListBuilder, RecordListCheckpoint};
pub use registry::{HandleError, HandlerRegistry, PreCheckError, TransactionHandler};
pub use savepoint::SavepointStack;
pub use state::{State, Status};
pub use throttle::UtilizationManager;
