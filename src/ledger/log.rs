//! Read helpers over the append-only ledger log, plus the single sanctioned
//! update: the sell-gem intent status transition.

use super::types::AssetLedgerRow;
use crate::error::LedgerError;
use crate::types::{AssetId, IntentStatus};
use sqlx::{PgConnection, Row};

pub struct AssetLedgerLog;

impl AssetLedgerLog {
    /// Find the ledger row carrying the given external transaction hash.
    /// Used by the reconciler to detect a credit that already committed.
    pub async fn find_by_tx_hash(
        conn: &mut PgConnection,
        tx_hash: &str,
    ) -> Result<Option<i64>, LedgerError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM asset_ledger WHERE transaction_hash = $1",
        )
        .bind(tx_hash)
        .fetch_optional(conn)
        .await?;
        Ok(id)
    }

    pub async fn get(
        conn: &mut PgConnection,
        ledger_id: i64,
    ) -> Result<Option<AssetLedgerRow>, LedgerError> {
        let row = sqlx::query(
            r#"SELECT id, asset_id, action, debit_account, credit_account, amount,
                      transaction_hash, nest_investment_id, linked_ledger_id,
                      unlock_nest_id, quiz_attempt_id, status, created_at
               FROM asset_ledger WHERE id = $1"#,
        )
        .bind(ledger_id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(|r| AssetLedgerRow {
            id: r.get("id"),
            asset_id: AssetId::from_id(r.get::<i16, _>("asset_id")).unwrap_or(AssetId::Coin),
            action: r.get("action"),
            debit_account: r.get("debit_account"),
            credit_account: r.get("credit_account"),
            amount: r.get("amount"),
            transaction_hash: r.get("transaction_hash"),
            nest_investment_id: r.get("nest_investment_id"),
            linked_ledger_id: r.get("linked_ledger_id"),
            unlock_nest_id: r.get("unlock_nest_id"),
            quiz_attempt_id: r.get("quiz_attempt_id"),
            status: r
                .get::<Option<i16>, _>("status")
                .and_then(IntentStatus::from_id),
            created_at: r.get("created_at"),
        }))
    }

    /// Atomic CAS: pending -> {approved, rejected} exactly once.
    ///
    /// Returns false when the intent was already resolved (or never pending),
    /// letting a second concurrent resolver fail cleanly.
    pub async fn resolve_intent_status(
        conn: &mut PgConnection,
        intent_id: i64,
        new_status: IntentStatus,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "UPDATE asset_ledger SET status = $1 WHERE id = $2 AND status = $3",
        )
        .bind(new_status.id())
        .bind(intent_id)
        .bind(IntentStatus::Pending.id())
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
