//! Pending Transaction Reconciler.
//!
//! External egg purchases arrive as a hash on BSC or Solana; this module
//! records them, verifies them on chain, credits the eggs through the Action
//! Library, and dead-letters anything that keeps failing.

pub mod db;
pub mod service;
pub mod types;
pub mod worker;

pub use db::ReconcilerDb;
pub use service::ReconcilerService;
pub use types::{
    DeadLetterTransaction, PendingStatus, PendingTransaction, ProcessOutcome, SubmitPendingParams,
};
pub use worker::{FallbackPoller, Heartbeat, ReconcilerHandle, ReconcilerWorker};
