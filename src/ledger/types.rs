//! Transfer engine request/response types and ledger row models.

use crate::types::{AssetId, IntentStatus, LedgerAction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Contextual foreign keys attached to a ledger row.
///
/// Which field must be present is dictated by the row's action
/// (`LedgerAction::required_refs`). Coexistence of several refs is allowed.
#[derive(Debug, Clone, Default)]
pub struct ContextRefs {
    pub transaction_hash: Option<String>,
    pub nest_investment_id: Option<i64>,
    pub linked_ledger_id: Option<i64>,
    pub unlock_nest_id: Option<i64>,
    pub quiz_attempt_id: Option<i64>,
    /// Only sell-gem intent rows carry a status.
    pub status: Option<IntentStatus>,
}

impl ContextRefs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn tx_hash(hash: impl Into<String>) -> Self {
        Self {
            transaction_hash: Some(hash.into()),
            ..Self::default()
        }
    }

    pub fn nest_investment(entry_id: i64) -> Self {
        Self {
            nest_investment_id: Some(entry_id),
            ..Self::default()
        }
    }

    pub fn linked(ledger_id: i64) -> Self {
        Self {
            linked_ledger_id: Some(ledger_id),
            ..Self::default()
        }
    }

    pub fn unlock(nest_id: i64) -> Self {
        Self {
            unlock_nest_id: Some(nest_id),
            ..Self::default()
        }
    }

    pub fn quiz_attempt(attempt_id: i64) -> Self {
        Self {
            quiz_attempt_id: Some(attempt_id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: IntentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_tx_hash(mut self, hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(hash.into());
        self
    }
}

/// One atomic balance movement request.
///
/// `debit = None` mints against the void; `credit = None` burns to it.
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub asset: AssetId,
    pub action: LedgerAction,
    pub debit: Option<i64>,
    pub credit: Option<i64>,
    pub amount: Decimal,
    pub refs: ContextRefs,
}

impl TransferSpec {
    pub fn new(
        action: LedgerAction,
        debit: Option<i64>,
        credit: Option<i64>,
        amount: Decimal,
        refs: ContextRefs,
    ) -> Self {
        Self {
            asset: action.asset(),
            action,
            debit,
            credit,
            amount,
            refs,
        }
    }
}

/// Ids of the ledger rows a transfer persisted.
#[derive(Debug, Clone, Copy)]
pub struct TransferOutcome {
    pub asset_ledger_id: i64,
    /// Set only for coin transfers (the parallel `ledger` row).
    pub coin_ledger_id: Option<i64>,
}

/// A persisted `asset_ledger` row.
#[derive(Debug, Clone)]
pub struct AssetLedgerRow {
    pub id: i64,
    pub asset_id: AssetId,
    pub action: String,
    pub debit_account: Option<i64>,
    pub credit_account: Option<i64>,
    pub amount: Decimal,
    pub transaction_hash: Option<String>,
    pub nest_investment_id: Option<i64>,
    pub linked_ledger_id: Option<i64>,
    pub unlock_nest_id: Option<i64>,
    pub quiz_attempt_id: Option<i64>,
    pub status: Option<IntentStatus>,
    pub created_at: DateTime<Utc>,
}
