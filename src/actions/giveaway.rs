//! Giveaways and quiz rewards: capped credits to user accounts.

use super::ActionService;
use crate::error::LedgerError;
use crate::ledger::{ContextRefs, TransferSpec, record_transfer};
use crate::types::{AssetId, LedgerAction};
use rust_decimal::Decimal;

impl ActionService {
    /// Credit a giveaway from the exchange. Refuses the system accounts as
    /// recipients and enforces the per-call cap for the asset.
    pub async fn giveaway(
        &self,
        account_id: i64,
        asset: AssetId,
        amount: Decimal,
    ) -> Result<i64, LedgerError> {
        if self.system_accounts().contains(account_id) {
            return Err(LedgerError::SystemAccountForbidden(account_id));
        }

        let (action, cap) = match asset {
            AssetId::Coin => (LedgerAction::GiveawayCoin, self.caps().max_giveaway_coins),
            AssetId::Egg => (
                LedgerAction::GiveawayEgg,
                Decimal::from(self.caps().max_giveaway_eggs),
            ),
            AssetId::Gem => (LedgerAction::GiveawayGem, self.caps().max_giveaway_gems),
        };

        if amount > cap {
            return Err(LedgerError::CapExceeded { action, amount, cap });
        }

        let mut tx = self.db().pool().begin().await?;
        let outcome = record_transfer(
            &mut tx,
            TransferSpec::new(
                action,
                Some(self.system_accounts().exchange),
                Some(account_id),
                amount,
                ContextRefs::none(),
            ),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(account_id, %asset, %amount, "Giveaway credited");
        Ok(outcome.asset_ledger_id)
    }

    /// Egg reward for a completed quiz attempt, tagged with the attempt id.
    pub async fn quiz_reward(
        &self,
        account_id: i64,
        quiz_attempt_id: i64,
        num_eggs: i64,
    ) -> Result<i64, LedgerError> {
        if self.system_accounts().contains(account_id) {
            return Err(LedgerError::SystemAccountForbidden(account_id));
        }

        let mut tx = self.db().pool().begin().await?;
        let outcome = record_transfer(
            &mut tx,
            TransferSpec::new(
                LedgerAction::QuizReward,
                Some(self.system_accounts().exchange),
                Some(account_id),
                Decimal::from(num_eggs),
                ContextRefs::quiz_attempt(quiz_attempt_id),
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(outcome.asset_ledger_id)
    }
}
