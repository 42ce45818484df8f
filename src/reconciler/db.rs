//! Persistence for pending transactions and the dead letter queue.
//!
//! Claiming is a CAS update so concurrent workers (the channel consumer and
//! the fallback poller) never process the same row twice.

use super::types::{DeadLetterTransaction, PendingStatus, PendingTransaction};
use crate::db::schema::constraints;
use crate::error::{LedgerError, is_unique_violation};
use crate::types::Chain;
use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};

pub struct ReconcilerDb;

const PENDING_COLUMNS: &str = r#"id, account_id, transaction_hash, chain, num_eggs, amount,
    status, attempts, last_attempt_at, completed_at, error_message, created_at"#;

fn row_to_pending(r: &sqlx::postgres::PgRow) -> Result<PendingTransaction, LedgerError> {
    let chain_id: i16 = r.get("chain");
    let status_id: i16 = r.get("status");
    Ok(PendingTransaction {
        id: r.get("id"),
        account_id: r.get("account_id"),
        transaction_hash: r.get("transaction_hash"),
        chain: Chain::from_id(chain_id)
            .ok_or_else(|| LedgerError::Validation(format!("unknown chain id {chain_id}")))?,
        num_eggs: r.get("num_eggs"),
        amount: r.get("amount"),
        status: PendingStatus::from_id(status_id)
            .ok_or_else(|| LedgerError::Validation(format!("unknown status id {status_id}")))?,
        attempts: r.get("attempts"),
        last_attempt_at: r.get("last_attempt_at"),
        completed_at: r.get("completed_at"),
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
    })
}

impl ReconcilerDb {
    /// Record a submitted payment. The unique constraint on the transaction
    /// hash makes a second submission surface as a duplicate.
    pub async fn create(
        conn: &mut PgConnection,
        account_id: i64,
        transaction_hash: &str,
        chain: Chain,
        num_eggs: i64,
        amount: Decimal,
    ) -> Result<i64, LedgerError> {
        let result = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO pending_transactions
                   (account_id, transaction_hash, chain, num_eggs, amount)
               VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
        )
        .bind(account_id)
        .bind(transaction_hash)
        .bind(chain.id())
        .bind(num_eggs)
        .bind(amount)
        .fetch_one(conn)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) if is_unique_violation(&e, constraints::PENDING_TX_HASH) => Err(
                LedgerError::DuplicateTransactionHash(transaction_hash.to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(
        conn: &mut PgConnection,
        pending_id: i64,
    ) -> Result<Option<PendingTransaction>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_transactions WHERE id = $1"
        ))
        .bind(pending_id)
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(row_to_pending).transpose()
    }

    pub async fn find_by_hash(
        conn: &mut PgConnection,
        transaction_hash: &str,
    ) -> Result<Option<PendingTransaction>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_transactions WHERE transaction_hash = $1"
        ))
        .bind(transaction_hash)
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(row_to_pending).transpose()
    }

    /// Claim a row for processing. Succeeds for a pending row or a
    /// processing row whose claim has gone stale (worker died mid-flight).
    /// Returns the claimed row with the attempt already counted, or None
    /// when another worker holds it or it is terminal.
    pub async fn claim(
        conn: &mut PgConnection,
        pending_id: i64,
        cooloff_secs: i64,
    ) -> Result<Option<PendingTransaction>, LedgerError> {
        let row = sqlx::query(&format!(
            r#"UPDATE pending_transactions
               SET status = $1, attempts = attempts + 1, last_attempt_at = NOW()
               WHERE id = $2
                 AND (status = $3
                      OR (status = $1
                          AND last_attempt_at < NOW() - make_interval(secs => $4)))
               RETURNING {PENDING_COLUMNS}"#
        ))
        .bind(PendingStatus::Processing.id())
        .bind(pending_id)
        .bind(PendingStatus::Pending.id())
        .bind(cooloff_secs as f64)
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(row_to_pending).transpose()
    }

    /// Processing -> Completed.
    pub async fn mark_completed(
        conn: &mut PgConnection,
        pending_id: i64,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"UPDATE pending_transactions
               SET status = $1, completed_at = NOW(), error_message = NULL
               WHERE id = $2 AND status = $3"#,
        )
        .bind(PendingStatus::Completed.id())
        .bind(pending_id)
        .bind(PendingStatus::Processing.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Processing -> Pending, recording the failure for the next sweep.
    pub async fn release_for_retry(
        conn: &mut PgConnection,
        pending_id: i64,
        error: &str,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"UPDATE pending_transactions
               SET status = $1, error_message = $2
               WHERE id = $3 AND status = $4"#,
        )
        .bind(PendingStatus::Pending.id())
        .bind(error)
        .bind(pending_id)
        .bind(PendingStatus::Processing.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Processing -> Failed, inserting the dead-letter companion row in the
    /// same transaction. Returns the dead letter id.
    pub async fn mark_failed(
        conn: &mut PgConnection,
        record: &PendingTransaction,
        error: &str,
    ) -> Result<i64, LedgerError> {
        sqlx::query(
            r#"UPDATE pending_transactions
               SET status = $1, error_message = $2
               WHERE id = $3 AND status = $4"#,
        )
        .bind(PendingStatus::Failed.id())
        .bind(error)
        .bind(record.id)
        .bind(PendingStatus::Processing.id())
        .execute(&mut *conn)
        .await?;

        let dead_letter_id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO dead_letter_transactions
                   (pending_id, account_id, transaction_hash, chain, num_eggs,
                    amount, original_attempts, last_error)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id"#,
        )
        .bind(record.id)
        .bind(record.account_id)
        .bind(&record.transaction_hash)
        .bind(record.chain.id())
        .bind(record.num_eggs)
        .bind(record.amount)
        .bind(record.attempts)
        .bind(error)
        .fetch_one(conn)
        .await?;

        Ok(dead_letter_id)
    }

    /// Rows the fallback sweep should retry: pending rows past the cool-off,
    /// plus processing rows whose claim went stale, all below the attempt
    /// ceiling. Oldest first.
    pub async fn find_retryable(
        conn: &mut PgConnection,
        batch_size: i64,
        cooloff_secs: i64,
        max_attempts: i32,
    ) -> Result<Vec<PendingTransaction>, LedgerError> {
        let rows = sqlx::query(&format!(
            r#"SELECT {PENDING_COLUMNS} FROM pending_transactions
               WHERE status IN ($1, $2)
                 AND attempts < $3
                 AND (last_attempt_at IS NULL
                      OR last_attempt_at < NOW() - make_interval(secs => $4))
               ORDER BY id
               LIMIT $5"#
        ))
        .bind(PendingStatus::Pending.id())
        .bind(PendingStatus::Processing.id())
        .bind(max_attempts)
        .bind(cooloff_secs as f64)
        .bind(batch_size)
        .fetch_all(conn)
        .await?;
        rows.iter().map(row_to_pending).collect()
    }

    pub async fn get_dead_letter(
        conn: &mut PgConnection,
        dead_letter_id: i64,
    ) -> Result<Option<DeadLetterTransaction>, LedgerError> {
        let row = sqlx::query(
            r#"SELECT id, pending_id, account_id, transaction_hash, chain, num_eggs,
                      amount, original_attempts, last_error, needs_manual_review, is_resolved
               FROM dead_letter_transactions WHERE id = $1"#,
        )
        .bind(dead_letter_id)
        .fetch_optional(conn)
        .await?;

        row.map(|r| {
            let chain_id: i16 = r.get("chain");
            Ok(DeadLetterTransaction {
                id: r.get("id"),
                pending_id: r.get("pending_id"),
                account_id: r.get("account_id"),
                transaction_hash: r.get("transaction_hash"),
                chain: Chain::from_id(chain_id).ok_or_else(|| {
                    LedgerError::Validation(format!("unknown chain id {chain_id}"))
                })?,
                num_eggs: r.get("num_eggs"),
                amount: r.get("amount"),
                original_attempts: r.get("original_attempts"),
                last_error: r.get("last_error"),
                needs_manual_review: r.get("needs_manual_review"),
                is_resolved: r.get("is_resolved"),
            })
        })
        .transpose()
    }

    /// Record the outcome of a manual review.
    pub async fn mark_reviewed(
        conn: &mut PgConnection,
        dead_letter_id: i64,
        reviewed_by: &str,
        notes: &str,
        resolved: bool,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"UPDATE dead_letter_transactions
               SET needs_manual_review = FALSE, is_resolved = $1,
                   reviewed_by = $2, review_notes = $3, reviewed_at = NOW()
               WHERE id = $4"#,
        )
        .bind(resolved)
        .bind(reviewed_by)
        .bind(notes)
        .bind(dead_letter_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Failed -> Completed, for a manual override that credited the payment
    /// outside the normal verification path.
    pub async fn complete_forced(
        conn: &mut PgConnection,
        pending_id: i64,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"UPDATE pending_transactions
               SET status = $1, completed_at = NOW(), error_message = NULL
               WHERE id = $2 AND status = $3"#,
        )
        .bind(PendingStatus::Completed.id())
        .bind(pending_id)
        .bind(PendingStatus::Failed.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Current USDT rate of an egg, from the asset table.
    pub async fn egg_rate(conn: &mut PgConnection) -> Result<Decimal, LedgerError> {
        let rate = sqlx::query_scalar::<_, Decimal>(
            "SELECT rate_in_usdt FROM assets WHERE asset_id = $1",
        )
        .bind(crate::types::AssetId::Egg.id())
        .fetch_one(conn)
        .await?;
        Ok(rate)
    }
}
