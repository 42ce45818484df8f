//! Mint and burn: treasury-only counterparty, capped per call.

use super::ActionService;
use crate::error::LedgerError;
use crate::ledger::{self, record_transfer};
use crate::types::LedgerAction;
use rust_decimal::Decimal;
use sqlx::PgConnection;

impl ActionService {
    /// Mint eggs into the treasury from the void.
    pub async fn mint_eggs(&self, amount: i64) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let id = self.mint_eggs_in(&mut tx, amount).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn mint_eggs_in(
        &self,
        conn: &mut PgConnection,
        amount: i64,
    ) -> Result<i64, LedgerError> {
        self.check_egg_cap(LedgerAction::MintEgg, amount)?;
        let outcome = record_transfer(
            conn,
            ledger::mint(
                LedgerAction::MintEgg,
                self.system_accounts().treasury,
                Decimal::from(amount),
            ),
        )
        .await?;
        Ok(outcome.asset_ledger_id)
    }

    /// Burn eggs from the treasury into the void.
    pub async fn burn_eggs(&self, amount: i64) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        self.check_egg_cap(LedgerAction::BurnEgg, amount)?;
        let outcome = record_transfer(
            &mut tx,
            ledger::burn(
                LedgerAction::BurnEgg,
                self.system_accounts().treasury,
                Decimal::from(amount),
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(outcome.asset_ledger_id)
    }

    pub async fn mint_gems(&self, amount: Decimal) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        self.check_gem_cap(LedgerAction::MintGem, amount)?;
        let outcome = record_transfer(
            &mut tx,
            ledger::mint(LedgerAction::MintGem, self.system_accounts().treasury, amount),
        )
        .await?;
        tx.commit().await?;
        Ok(outcome.asset_ledger_id)
    }

    pub async fn burn_gems(&self, amount: Decimal) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        self.check_gem_cap(LedgerAction::BurnGem, amount)?;
        let outcome = record_transfer(
            &mut tx,
            ledger::burn(LedgerAction::BurnGem, self.system_accounts().treasury, amount),
        )
        .await?;
        tx.commit().await?;
        Ok(outcome.asset_ledger_id)
    }

    fn check_egg_cap(&self, action: LedgerAction, amount: i64) -> Result<(), LedgerError> {
        if amount > self.caps().max_mint_eggs {
            return Err(LedgerError::CapExceeded {
                action,
                amount: Decimal::from(amount),
                cap: Decimal::from(self.caps().max_mint_eggs),
            });
        }
        Ok(())
    }

    fn check_gem_cap(&self, action: LedgerAction, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.caps().max_mint_gems {
            return Err(LedgerError::CapExceeded {
                action,
                amount,
                cap: self.caps().max_mint_gems,
            });
        }
        Ok(())
    }
}
