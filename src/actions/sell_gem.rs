//! Sell-gem three-phase workflow: intent, then admin approve or reject.
//!
//! The intent row is the only ledger row that ever mutates, and only its
//! `status` field, pending -> {approved, rejected}, exactly once. The CAS on
//! that transition is what makes a second concurrent resolution fail.

use super::ActionService;
use crate::error::LedgerError;
use crate::ledger::{AssetLedgerLog, ContextRefs, TransferSpec, record_transfer};
use crate::types::{IntentStatus, LedgerAction};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use validator::Validate;

#[derive(Debug, Validate)]
pub struct ApproveSellGemParams {
    pub intent_ledger_id: i64,
    /// Off-chain payout transaction hash supplied by the admin.
    #[validate(length(min = 10, max = 128))]
    pub payout_tx_hash: String,
}

impl ActionService {
    /// Phase 1: user escrows gems to the exchange, status = pending.
    pub async fn sell_gem_intent(
        &self,
        account_id: i64,
        amount: Decimal,
    ) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        if self.system_accounts().contains(account_id) {
            return Err(LedgerError::SystemAccountForbidden(account_id));
        }

        let outcome = record_transfer(
            &mut tx,
            TransferSpec::new(
                LedgerAction::SellGemIntent,
                Some(account_id),
                Some(self.system_accounts().exchange),
                amount,
                ContextRefs::none().with_status(IntentStatus::Pending),
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(outcome.asset_ledger_id)
    }

    /// Phase 2a: admin approves; escrowed gems move exchange -> treasury.
    ///
    /// Fails with `AlreadyResolved` if the intent was approved or rejected
    /// before, including by a racing resolver.
    pub async fn approve_sell_gem(
        &self,
        params: ApproveSellGemParams,
    ) -> Result<i64, LedgerError> {
        params.validate()?;
        let mut tx = self.db().pool().begin().await?;

        let intent = self
            .load_intent(&mut tx, params.intent_ledger_id)
            .await?;

        if !AssetLedgerLog::resolve_intent_status(
            &mut tx,
            params.intent_ledger_id,
            IntentStatus::Approved,
        )
        .await?
        {
            return Err(LedgerError::AlreadyResolved(params.intent_ledger_id));
        }

        let outcome = record_transfer(
            &mut tx,
            TransferSpec::new(
                LedgerAction::SellGemApprove,
                Some(self.system_accounts().exchange),
                Some(self.system_accounts().treasury),
                intent.amount,
                ContextRefs::linked(params.intent_ledger_id)
                    .with_tx_hash(params.payout_tx_hash),
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            intent_id = params.intent_ledger_id,
            ledger_id = outcome.asset_ledger_id,
            "Sell-gem intent approved"
        );

        Ok(outcome.asset_ledger_id)
    }

    /// Phase 2b: admin rejects; escrowed gems are refunded exchange -> user.
    pub async fn reject_sell_gem(&self, intent_ledger_id: i64) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        let intent = self.load_intent(&mut tx, intent_ledger_id).await?;
        let user = intent
            .debit_account
            .ok_or(LedgerError::IntentNotFound(intent_ledger_id))?;

        if !AssetLedgerLog::resolve_intent_status(&mut tx, intent_ledger_id, IntentStatus::Rejected)
            .await?
        {
            return Err(LedgerError::AlreadyResolved(intent_ledger_id));
        }

        let outcome = record_transfer(
            &mut tx,
            TransferSpec::new(
                LedgerAction::SellGemReject,
                Some(self.system_accounts().exchange),
                Some(user),
                intent.amount,
                ContextRefs::linked(intent_ledger_id),
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(outcome.asset_ledger_id)
    }

    async fn load_intent(
        &self,
        conn: &mut PgConnection,
        intent_ledger_id: i64,
    ) -> Result<crate::ledger::AssetLedgerRow, LedgerError> {
        let row = AssetLedgerLog::get(conn, intent_ledger_id)
            .await?
            .ok_or(LedgerError::IntentNotFound(intent_ledger_id))?;

        if row.action != LedgerAction::SellGemIntent.as_str() {
            return Err(LedgerError::IntentNotFound(intent_ledger_id));
        }

        Ok(row)
    }
}
