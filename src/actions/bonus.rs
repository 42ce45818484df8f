//! Signup bonuses with the deferred-issue path.
//!
//! If the exchange cannot fund a bonus, a `TransactionIssue` is filed and the
//! bonus is still marked addressed, so the triggering signup never blocks and
//! never loops. Resolving the issue re-attempts the same transfer.

use super::ActionService;
use crate::account::AccountRepository;
use crate::error::LedgerError;
use crate::ledger::{ContextRefs, TransferSpec, record_transfer};
use crate::types::{AssetId, LedgerAction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};

/// A bonus the exchange could not fund, queued for an admin.
#[derive(Debug, Clone)]
pub struct TransactionIssue {
    pub id: i64,
    pub account_id: i64,
    pub action: String,
    pub asset_id: AssetId,
    pub amount: Decimal,
    pub reason: String,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// What a bonus attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusOutcome {
    Paid(i64),
    /// Exchange balance was short; issue filed, bonus addressed but unpaid.
    Deferred(i64),
}

impl ActionService {
    pub async fn signup_bonus_eggs(&self, account_id: i64) -> Result<BonusOutcome, LedgerError> {
        self.signup_bonus(account_id, AssetId::Egg).await
    }

    pub async fn signup_bonus_gems(&self, account_id: i64) -> Result<BonusOutcome, LedgerError> {
        self.signup_bonus(account_id, AssetId::Gem).await
    }

    pub async fn signup_bonus_coins(&self, account_id: i64) -> Result<BonusOutcome, LedgerError> {
        self.signup_bonus(account_id, AssetId::Coin).await
    }

    async fn signup_bonus(
        &self,
        account_id: i64,
        asset: AssetId,
    ) -> Result<BonusOutcome, LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        if self.system_accounts().contains(account_id) {
            return Err(LedgerError::SystemAccountForbidden(account_id));
        }

        let marker =
            AccountRepository::bonus_marker_for_update(&mut tx, account_id, asset).await?;
        if marker.addressed {
            return Err(LedgerError::AlreadyAddressed(account_id));
        }

        let outcome = self.attempt_bonus(&mut tx, account_id, asset).await;
        let result = match outcome {
            Ok(ledger_id) => {
                AccountRepository::set_bonus_marker(&mut tx, account_id, asset, Some(ledger_id))
                    .await?;
                BonusOutcome::Paid(ledger_id)
            }
            Err(LedgerError::InsufficientBalance { .. }) => {
                // Mark addressed anyway; the issue queue owns the retry.
                AccountRepository::set_bonus_marker(&mut tx, account_id, asset, None).await?;
                let issue_id = self
                    .file_issue(&mut tx, account_id, asset, "exchange balance insufficient")
                    .await?;
                tracing::warn!(account_id, %asset, issue_id, "Signup bonus deferred to issue queue");
                BonusOutcome::Deferred(issue_id)
            }
            Err(e) => return Err(e),
        };

        tx.commit().await?;
        Ok(result)
    }

    /// Admin resolution: re-attempt the deferred bonus transfer.
    pub async fn resolve_transaction_issue(
        &self,
        issue_id: i64,
        resolved_by: &str,
    ) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        let row = sqlx::query(
            r#"SELECT account_id, asset_id FROM transaction_issues
               WHERE id = $1 AND is_resolved = FALSE FOR UPDATE"#,
        )
        .bind(issue_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::IssueNotFound(issue_id))?;

        let account_id: i64 = row.get("account_id");
        let asset = AssetId::from_id(row.get::<i16, _>("asset_id"))
            .ok_or(LedgerError::IssueNotFound(issue_id))?;

        let ledger_id = self.attempt_bonus(&mut tx, account_id, asset).await?;
        AccountRepository::set_bonus_marker(&mut tx, account_id, asset, Some(ledger_id)).await?;

        sqlx::query(
            r#"UPDATE transaction_issues
               SET is_resolved = TRUE, resolved_by = $2, resolved_at = NOW()
               WHERE id = $1"#,
        )
        .bind(issue_id)
        .bind(resolved_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ledger_id)
    }

    async fn attempt_bonus(
        &self,
        conn: &mut PgConnection,
        account_id: i64,
        asset: AssetId,
    ) -> Result<i64, LedgerError> {
        let (action, amount) = match asset {
            AssetId::Egg => (
                LedgerAction::SignupBonusEgg,
                Decimal::from(self.caps().signup_bonus_eggs),
            ),
            AssetId::Gem => (LedgerAction::SignupBonusGem, self.caps().signup_bonus_gems),
            AssetId::Coin => (LedgerAction::SignupBonusCoin, self.caps().signup_bonus_coins),
        };

        let outcome = record_transfer(
            conn,
            TransferSpec::new(
                action,
                Some(self.system_accounts().exchange),
                Some(account_id),
                amount,
                ContextRefs::none(),
            ),
        )
        .await?;

        Ok(outcome.asset_ledger_id)
    }

    async fn file_issue(
        &self,
        conn: &mut PgConnection,
        account_id: i64,
        asset: AssetId,
        reason: &str,
    ) -> Result<i64, LedgerError> {
        let (action, amount) = match asset {
            AssetId::Egg => (
                LedgerAction::SignupBonusEgg,
                Decimal::from(self.caps().signup_bonus_eggs),
            ),
            AssetId::Gem => (LedgerAction::SignupBonusGem, self.caps().signup_bonus_gems),
            AssetId::Coin => (LedgerAction::SignupBonusCoin, self.caps().signup_bonus_coins),
        };

        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO transaction_issues (account_id, action, asset_id, amount, reason)
               VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
        )
        .bind(account_id)
        .bind(action.as_str())
        .bind(asset.id())
        .bind(amount)
        .bind(reason)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }
}
