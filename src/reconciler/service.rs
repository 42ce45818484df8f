//! Reconciler orchestration: submit, verify, credit.
//!
//! The FSM is deliberately small: claim (CAS) -> verify on chain -> credit
//! eggs -> complete. The ledger's unique transaction-hash index is the
//! ultimate idempotency backstop: even if a row is processed twice, only one
//! credit can ever commit.

use super::db::ReconcilerDb;
use super::types::{PendingTransaction, ProcessOutcome, SubmitPendingParams};
use super::worker::ReconcilerHandle;
use crate::actions::ActionService;
use crate::actions::buy::BuyEggsParams;
use crate::chain::{ChainVerifier, VerifyRequest};
use crate::config::ReconcilerConfig;
use crate::db::Database;
use crate::error::LedgerError;
use crate::ledger::AssetLedgerLog;
use rust_decimal::Decimal;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};
use validator::Validate;

pub struct ReconcilerService {
    db: Arc<Database>,
    actions: Arc<ActionService>,
    verifier: Arc<dyn ChainVerifier>,
    config: ReconcilerConfig,
    /// Channel to the worker, attached once the worker exists. Unattached
    /// (tests, tools), submissions are left to the fallback sweep.
    handle: OnceLock<ReconcilerHandle>,
}

impl ReconcilerService {
    pub fn new(
        db: Arc<Database>,
        actions: Arc<ActionService>,
        verifier: Arc<dyn ChainVerifier>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            db,
            actions,
            verifier,
            config,
            handle: OnceLock::new(),
        }
    }

    /// Wire the channel worker's handle in, so submissions are processed
    /// promptly instead of waiting for the next sweep. First call wins.
    pub fn attach_handle(&self, handle: ReconcilerHandle) {
        let _ = self.handle.set(handle);
    }

    pub(crate) fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Record a submitted payment and return the pending id.
    ///
    /// The expected USDT amount is frozen at submit time from the current
    /// egg rate, so a later rate change cannot retroactively reprice an
    /// already-submitted purchase.
    pub async fn submit(
        &self,
        account_id: i64,
        params: SubmitPendingParams,
    ) -> Result<i64, LedgerError> {
        params.validate()?;

        if self.actions.system_accounts().contains(account_id) {
            return Err(LedgerError::SystemAccountForbidden(account_id));
        }

        let mut tx = self.db.pool().begin().await?;

        let rate = ReconcilerDb::egg_rate(&mut tx).await?;
        let amount = rate * Decimal::from(params.num_eggs);

        let pending_id = ReconcilerDb::create(
            &mut tx,
            account_id,
            &params.transaction_hash,
            params.chain,
            params.num_eggs,
            amount,
        )
        .await?;

        tx.commit().await?;

        info!(
            pending_id,
            account_id,
            chain = %params.chain,
            num_eggs = params.num_eggs,
            %amount,
            "Payment submitted for reconciliation"
        );

        if let Some(handle) = self.handle.get() {
            handle.enqueue(pending_id);
        }

        Ok(pending_id)
    }

    /// Run one processing pass over a pending row.
    pub async fn process(&self, pending_id: i64) -> Result<ProcessOutcome, LedgerError> {
        let mut conn = self.db.pool().acquire().await?;
        let claimed =
            ReconcilerDb::claim(&mut conn, pending_id, self.config.retry_cooloff_secs).await?;

        let record = match claimed {
            Some(r) => r,
            None => return Ok(ProcessOutcome::Skipped),
        };
        drop(conn);

        match self.verify_and_credit(&record).await {
            Ok(()) => {
                let mut conn = self.db.pool().acquire().await?;
                ReconcilerDb::mark_completed(&mut conn, record.id).await?;
                info!(
                    pending_id = record.id,
                    tx_hash = %record.transaction_hash,
                    attempts = record.attempts,
                    "Pending transaction completed"
                );
                Ok(ProcessOutcome::Completed)
            }
            Err(e) if is_retryable(&e) && record.attempts < self.config.max_attempts => {
                let mut conn = self.db.pool().acquire().await?;
                ReconcilerDb::release_for_retry(&mut conn, record.id, &e.to_string()).await?;
                warn!(
                    pending_id = record.id,
                    attempts = record.attempts,
                    error = %e,
                    "Pending transaction failed, will retry"
                );
                Ok(ProcessOutcome::Retrying)
            }
            Err(e) => {
                let mut tx = self.db.pool().begin().await?;
                let dead_letter_id =
                    ReconcilerDb::mark_failed(&mut tx, &record, &e.to_string()).await?;
                tx.commit().await?;
                error!(
                    pending_id = record.id,
                    dead_letter_id,
                    attempts = record.attempts,
                    error = %e,
                    "Pending transaction dead-lettered"
                );
                Ok(ProcessOutcome::DeadLettered(dead_letter_id))
            }
        }
    }

    /// Verify the payment on chain, then credit the eggs.
    ///
    /// A credit that already committed (crash between credit and completion,
    /// or a concurrent worker) short-circuits to success both ways: the
    /// ledger lookup before, and the duplicate-hash error after.
    async fn verify_and_credit(&self, record: &PendingTransaction) -> Result<(), LedgerError> {
        let mut conn = self.db.pool().acquire().await?;
        if let Some(ledger_id) =
            AssetLedgerLog::find_by_tx_hash(&mut conn, &record.transaction_hash).await?
        {
            info!(
                pending_id = record.id,
                ledger_id, "Credit already in ledger, completing"
            );
            return Ok(());
        }
        drop(conn);

        let req = VerifyRequest {
            transaction_hash: record.transaction_hash.clone(),
            chain: record.chain,
            num_eggs: record.num_eggs,
            min_amount: record.amount,
        };
        let verified = self
            .verifier
            .verify(&req)
            .await
            .map_err(|e| LedgerError::Validation(format!("chain verification: {e}")))?;

        let credit = self
            .actions
            .buy_eggs(
                record.account_id,
                BuyEggsParams {
                    num_eggs: record.num_eggs,
                    transaction_hash: record.transaction_hash.clone(),
                },
            )
            .await;

        match credit {
            Ok(ledger_id) => {
                info!(
                    pending_id = record.id,
                    ledger_id,
                    block_number = verified.block_number,
                    "Payment verified and eggs credited"
                );
                Ok(())
            }
            Err(LedgerError::DuplicateTransactionHash(_)) => {
                info!(
                    pending_id = record.id,
                    "Concurrent credit won the race, completing"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Sweep retryable rows and process each. Returns how many completed.
    pub async fn sweep(&self) -> Result<usize, LedgerError> {
        let mut conn = self.db.pool().acquire().await?;
        let batch = ReconcilerDb::find_retryable(
            &mut conn,
            self.config.batch_size,
            self.config.retry_cooloff_secs,
            self.config.max_attempts,
        )
        .await?;
        drop(conn);

        if batch.is_empty() {
            return Ok(0);
        }

        info!(count = batch.len(), "Sweeping retryable pending transactions");

        let mut completed = 0;
        for record in &batch {
            match self.process(record.id).await {
                Ok(ProcessOutcome::Completed) => completed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(pending_id = record.id, error = %e, "Sweep processing failed");
                }
            }
        }
        Ok(completed)
    }

    /// Manual override for a dead-lettered payment an admin has confirmed
    /// out of band: credit the eggs directly, skipping chain verification
    /// and the attempt counter. A credit that already landed (duplicate
    /// hash) counts as success. Returns the crediting ledger row id.
    pub async fn force_process(
        &self,
        dead_letter_id: i64,
        reviewed_by: &str,
        notes: &str,
    ) -> Result<i64, LedgerError> {
        let mut conn = self.db.pool().acquire().await?;
        let dead = ReconcilerDb::get_dead_letter(&mut conn, dead_letter_id)
            .await?
            .ok_or(LedgerError::IssueNotFound(dead_letter_id))?;
        drop(conn);

        let credit = self
            .actions
            .buy_eggs(
                dead.account_id,
                BuyEggsParams {
                    num_eggs: dead.num_eggs,
                    transaction_hash: dead.transaction_hash.clone(),
                },
            )
            .await;

        let ledger_id = match credit {
            Ok(id) => id,
            Err(LedgerError::DuplicateTransactionHash(_)) => {
                let mut conn = self.db.pool().acquire().await?;
                AssetLedgerLog::find_by_tx_hash(&mut conn, &dead.transaction_hash)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::Validation(format!(
                            "hash {} is taken but has no ledger row",
                            dead.transaction_hash
                        ))
                    })?
            }
            Err(e) => return Err(e),
        };

        let mut tx = self.db.pool().begin().await?;
        ReconcilerDb::complete_forced(&mut tx, dead.pending_id).await?;
        ReconcilerDb::mark_reviewed(&mut tx, dead_letter_id, reviewed_by, notes, true).await?;
        tx.commit().await?;

        info!(
            dead_letter_id,
            pending_id = dead.pending_id,
            ledger_id,
            reviewed_by,
            "Dead-lettered payment force-credited"
        );
        Ok(ledger_id)
    }

    /// Record a manual review verdict without reprocessing.
    pub async fn mark_reviewed(
        &self,
        dead_letter_id: i64,
        reviewed_by: &str,
        notes: &str,
        resolved: bool,
    ) -> Result<(), LedgerError> {
        let mut conn = self.db.pool().acquire().await?;
        if !ReconcilerDb::mark_reviewed(&mut conn, dead_letter_id, reviewed_by, notes, resolved)
            .await?
        {
            return Err(LedgerError::IssueNotFound(dead_letter_id));
        }
        Ok(())
    }
}

/// Chain verification and infrastructure failures are worth another attempt;
/// domain rejections (bad account, cap violations) never heal on their own.
fn is_retryable(err: &LedgerError) -> bool {
    matches!(
        err,
        LedgerError::Database(_) | LedgerError::Validation(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_split() {
        assert!(is_retryable(&LedgerError::Validation(
            "chain verification: Transaction not found or not yet mined".into()
        )));
        assert!(is_retryable(&LedgerError::Database(sqlx::Error::PoolTimedOut)));
        assert!(!is_retryable(&LedgerError::AccountNotFound(9)));
        assert!(!is_retryable(&LedgerError::SystemAccountForbidden(1)));
    }
}
