//! Nige Nest Ledger - multi-asset double-entry ledger engine.
//!
//! Three assets (coins, eggs, gems) move between a few system accounts and
//! many user accounts, with every movement recorded as an immutable
//! double-entry row.
//!
//! # Modules
//!
//! - [`types`] - Asset, action and status enums
//! - [`account`] - Balance store (accounts and nest accounts)
//! - [`ledger`] - Transfer Engine: the single write path for balances
//! - [`actions`] - Action Library: named operations built on the engine
//! - [`reconciler`] - Pending external payments and the dead letter queue
//! - [`chain`] - On-chain payment verification (BSC, Solana)
//! - [`nest`] - Nest campaigns and their lifecycle state machine
//! - [`db`] - PostgreSQL pool and schema

pub mod account;
pub mod actions;
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod nest;
pub mod reconciler;
pub mod types;

// Convenient re-exports at crate root
pub use account::{Account, AccountRepository, NestAccount, SystemAccounts};
pub use actions::ActionService;
pub use chain::{ChainVerifier, RpcVerifier, VerifiedTransfer, VerifyRequest};
pub use config::AppConfig;
pub use db::Database;
pub use error::LedgerError;
pub use ledger::{ContextRefs, TransferOutcome, TransferSpec, record_transfer};
pub use nest::NestService;
pub use reconciler::{ProcessOutcome, ReconcilerService, SubmitPendingParams};
pub use types::{AccountType, AssetId, Chain, IntentStatus, LedgerAction, PaidMarker};
