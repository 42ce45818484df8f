//! Break eggs into gems and convert gems back into eggs.
//!
//! Each is two Transfer Engine calls in one transaction; the second leg's
//! `linked_ledger_id` carries the first leg's ledger row id, so the pair is
//! recoverable and both legs commit or neither does.

use super::ActionService;
use crate::error::LedgerError;
use crate::ledger::{ContextRefs, TransferSpec, record_transfer};
use crate::types::LedgerAction;
use rust_decimal::Decimal;
use sqlx::PgConnection;

/// Ids of the two legs of a break/convert operation.
#[derive(Debug, Clone, Copy)]
pub struct TwoLegOutcome {
    pub first_leg: i64,
    pub second_leg: i64,
}

impl ActionService {
    /// Break `egg_count` of the user's eggs into gems at the configured rate.
    ///
    /// Leg 1: user -> treasury (eggs). Leg 2: exchange -> user (gems).
    pub async fn break_eggs(
        &self,
        account_id: i64,
        egg_count: i64,
    ) -> Result<TwoLegOutcome, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let outcome = self.break_eggs_in(&mut tx, account_id, egg_count).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn break_eggs_in(
        &self,
        conn: &mut PgConnection,
        account_id: i64,
        egg_count: i64,
    ) -> Result<TwoLegOutcome, LedgerError> {
        if egg_count <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "egg count must be positive, got {egg_count}"
            )));
        }
        if self.system_accounts().contains(account_id) {
            return Err(LedgerError::SystemAccountForbidden(account_id));
        }

        let gems = (Decimal::from(egg_count) * self.caps().break_gems_per_egg).round_dp(2);
        if gems <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "breaking {egg_count} eggs yields no gems at the configured rate"
            )));
        }

        let first = record_transfer(
            conn,
            TransferSpec::new(
                LedgerAction::BreakEgg,
                Some(account_id),
                Some(self.system_accounts().treasury),
                Decimal::from(egg_count),
                ContextRefs::none(),
            ),
        )
        .await?;

        let second = record_transfer(
            conn,
            TransferSpec::new(
                LedgerAction::BreakEggGem,
                Some(self.system_accounts().exchange),
                Some(account_id),
                gems,
                ContextRefs::linked(first.asset_ledger_id),
            ),
        )
        .await?;

        tracing::info!(
            account_id,
            egg_count,
            gems = %gems,
            "Broke eggs into gems"
        );

        Ok(TwoLegOutcome {
            first_leg: first.asset_ledger_id,
            second_leg: second.asset_ledger_id,
        })
    }

    /// Convert `gem_amount` of the user's gems back into eggs.
    ///
    /// Leg 1: user -> exchange (gems). Leg 2: treasury -> user (eggs).
    pub async fn convert_gems(
        &self,
        account_id: i64,
        gem_amount: Decimal,
    ) -> Result<TwoLegOutcome, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let outcome = self.convert_gems_in(&mut tx, account_id, gem_amount).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn convert_gems_in(
        &self,
        conn: &mut PgConnection,
        account_id: i64,
        gem_amount: Decimal,
    ) -> Result<TwoLegOutcome, LedgerError> {
        if self.system_accounts().contains(account_id) {
            return Err(LedgerError::SystemAccountForbidden(account_id));
        }

        // Whole eggs only: the gem amount must convert without remainder.
        let eggs = gem_amount * Decimal::from(self.caps().convert_eggs_per_gem);
        if eggs.fract() != Decimal::ZERO || eggs <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "{gem_amount} gems does not convert to a whole egg count"
            )));
        }

        let first = record_transfer(
            conn,
            TransferSpec::new(
                LedgerAction::ConvertGem,
                Some(account_id),
                Some(self.system_accounts().exchange),
                gem_amount,
                ContextRefs::none(),
            ),
        )
        .await?;

        let second = record_transfer(
            conn,
            TransferSpec::new(
                LedgerAction::ConvertGemEgg,
                Some(self.system_accounts().treasury),
                Some(account_id),
                eggs,
                ContextRefs::linked(first.asset_ledger_id),
            ),
        )
        .await?;

        Ok(TwoLegOutcome {
            first_leg: first.asset_ledger_id,
            second_leg: second.asset_ledger_id,
        })
    }
}
