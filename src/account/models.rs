//! Data models for the balance store.

use crate::types::{AccountType, PaidMarker};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Primary account: holds the coin balance and identity flags.
///
/// Never hard-deleted; `archived_at` marks removal.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub balance: Decimal,
    pub is_system: bool,
    pub is_internal: bool,
    pub wallet_id: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One-to-one companion of [`Account`] holding egg and gem balances.
///
/// Eggs are whole numbers; gems carry at most two decimal places,
/// enforced at write time by the transfer engine.
#[derive(Debug, Clone)]
pub struct NestAccount {
    pub id: i64,
    pub account_id: i64,
    pub eggs: i64,
    pub gems: Decimal,
    pub account_type: AccountType,
    pub signup_bonus_egg: BonusMarker,
    pub signup_bonus_gem: BonusMarker,
    pub signup_bonus_coin: BonusMarker,
}

/// Signup bonus idempotency state.
///
/// `addressed` flips true the first time the bonus is attempted, even when
/// the exchange could not fund it (a TransactionIssue is filed instead);
/// `paid` carries the ledger row id once the bonus actually lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusMarker {
    pub addressed: bool,
    pub paid: PaidMarker,
}

impl BonusMarker {
    pub fn from_columns(addressed: bool, ledger_id: Option<i64>) -> Self {
        Self {
            addressed,
            paid: PaidMarker::from_column(ledger_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bonus_marker_addressed_but_unpaid() {
        // The dual-flag semantic: addressed without a ledger id means the
        // bonus was deferred to the issue queue, not paid.
        let m = BonusMarker::from_columns(true, None);
        assert!(m.addressed);
        assert!(!m.paid.is_paid());

        let m = BonusMarker::from_columns(true, Some(12));
        assert_eq!(m.paid, PaidMarker::Paid(12));
    }
}
