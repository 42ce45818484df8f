//! Pending-transaction FSM state and row types.
//!
//! State IDs are designed for PostgreSQL storage as SMALLINT.

use crate::types::Chain;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use validator::Validate;

/// Pending transaction states.
///
/// Terminal states: COMPLETED (40), FAILED (-10). A FAILED row always has a
/// companion dead-letter row awaiting manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum PendingStatus {
    /// Recorded, awaiting verification and credit.
    Pending = 0,

    /// Claimed by a worker (persist-before-call). A row stuck here past the
    /// cool-off is re-claimable: its worker died mid-flight.
    Processing = 10,

    /// Terminal: verified and credited.
    Completed = 40,

    /// Terminal: exhausted its attempts, dead-lettered.
    Failed = -10,
}

impl PendingStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PendingStatus::Completed | PendingStatus::Failed)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(PendingStatus::Pending),
            10 => Some(PendingStatus::Processing),
            40 => Some(PendingStatus::Completed),
            -10 => Some(PendingStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "PENDING",
            PendingStatus::Processing => "PROCESSING",
            PendingStatus::Completed => "COMPLETED",
            PendingStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded egg purchase awaiting on-chain verification.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub id: i64,
    pub account_id: i64,
    pub transaction_hash: String,
    pub chain: Chain,
    pub num_eggs: i64,
    /// USDT the purchase is expected to pay, num_eggs x egg rate at submit
    /// time.
    pub amount: Decimal,
    pub status: PendingStatus,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Dead-lettered purchase awaiting manual review.
#[derive(Debug, Clone)]
pub struct DeadLetterTransaction {
    pub id: i64,
    pub pending_id: i64,
    pub account_id: i64,
    pub transaction_hash: String,
    pub chain: Chain,
    pub num_eggs: i64,
    pub amount: Decimal,
    pub original_attempts: i32,
    pub last_error: Option<String>,
    pub needs_manual_review: bool,
    pub is_resolved: bool,
}

/// Client submission of an external payment.
#[derive(Debug, Clone, Validate)]
pub struct SubmitPendingParams {
    #[validate(range(min = 1))]
    pub num_eggs: i64,
    #[validate(length(min = 10, max = 128))]
    pub transaction_hash: String,
    pub chain: Chain,
}

/// What a single processing pass did with a pending row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Credited (or found already credited) and marked completed.
    Completed,
    /// Retryable failure; the row went back to pending.
    Retrying,
    /// Attempts exhausted or permanent failure; dead-lettered.
    DeadLettered(i64),
    /// Another worker holds the row, or it is already terminal.
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PendingStatus::Completed.is_terminal());
        assert!(PendingStatus::Failed.is_terminal());
        assert!(!PendingStatus::Pending.is_terminal());
        assert!(!PendingStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_roundtrip() {
        for st in [
            PendingStatus::Pending,
            PendingStatus::Processing,
            PendingStatus::Completed,
            PendingStatus::Failed,
        ] {
            assert_eq!(PendingStatus::from_id(st.id()), Some(st));
        }
        assert_eq!(PendingStatus::from_id(99), None);
    }
}
