//! Ledger log and the atomic Transfer Engine.

pub mod log;
pub mod transfer;
pub mod types;

pub use log::AssetLedgerLog;
pub use transfer::{burn, mint, record_transfer};
pub use types::{AssetLedgerRow, ContextRefs, TransferOutcome, TransferSpec};
