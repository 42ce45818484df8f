//! Domain error taxonomy for the ledger core.
//!
//! Validation and invariant errors abort the enclosing transaction; nothing
//! partial persists. Chain verification failures live in [`crate::chain`] and
//! are always treated as retryable by the reconciler.

use crate::types::{AssetId, LedgerAction, RefKind};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Insufficient {asset} balance on account {account}")]
    InsufficientBalance { account: i64, asset: AssetId },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("Nest account not found for account {0}")]
    NestAccountNotFound(i64),

    #[error("Transaction already processed: {0}")]
    DuplicateTransactionHash(String),

    #[error("Action {action} requires contextual ref {field:?}")]
    MissingContextRef {
        action: LedgerAction,
        field: RefKind,
    },

    #[error("Action {action} moves {expected}, got {got}")]
    AssetMismatch {
        action: LedgerAction,
        expected: AssetId,
        got: AssetId,
    },

    #[error("Amount {amount} exceeds per-call cap {cap} for {action}")]
    CapExceeded {
        action: LedgerAction,
        amount: Decimal,
        cap: Decimal,
    },

    #[error("Operation forbidden on system account {0}")]
    SystemAccountForbidden(i64),

    #[error("Sell-gem intent {0} not found")]
    IntentNotFound(i64),

    #[error("Sell-gem intent {0} already resolved")]
    AlreadyResolved(i64),

    #[error("Nest not found: {0}")]
    NestNotFound(i64),

    #[error("Nest {0} is archived")]
    NestArchived(i64),

    #[error("Nest {nest_id} is in the wrong phase: {detail}")]
    WrongNestPhase { nest_id: i64, detail: &'static str },

    #[error("Pool is short {shortfall} {asset} to settle nest {nest_id}")]
    PoolShort {
        nest_id: i64,
        asset: AssetId,
        shortfall: Decimal,
    },

    #[error("Nest entry not found: {0}")]
    EntryNotFound(i64),

    #[error("Nest entry {0} already paid for this phase")]
    AlreadyPaid(i64),

    #[error("Nest {0} already unlocked by this account")]
    AlreadyUnlocked(i64),

    #[error("Nest {0} is not unlocked by this account")]
    NotUnlocked(i64),

    #[error("Egg commitment would exceed the per-person limit of {0}")]
    EggLimitExceeded(i64),

    #[error("Egg commitment would exceed the nest pool capacity of {0}")]
    PoolCapacityExceeded(i64),

    #[error("Signup bonus already addressed for account {0}")]
    AlreadyAddressed(i64),

    #[error("Transaction issue {0} not found or already resolved")]
    IssueNotFound(i64),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for LedgerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        LedgerError::Validation(errors.to_string())
    }
}

/// True when `err` is a Postgres unique violation on the named constraint.
/// Used to surface duplicate transaction hashes as domain errors.
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.constraint() == Some(constraint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_user_facing() {
        let e = LedgerError::InsufficientBalance {
            account: 7,
            asset: AssetId::Egg,
        };
        assert!(e.to_string().contains("EGG"));

        let e = LedgerError::DuplicateTransactionHash("0xabc".into());
        assert!(e.to_string().contains("0xabc"));
    }

    #[test]
    fn test_unique_violation_matcher_ignores_other_errors() {
        let e = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&e, "any_constraint"));
    }
}
