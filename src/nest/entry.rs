//! Per-user nest actions: unlock, commit eggs, and the three per-entry
//! settlement payouts.
//!
//! Each payout checks its idempotency marker before transferring and stores
//! the paying ledger row id into it afterwards, all in one transaction; a
//! second caller either sees the marker set or serializes behind the first.

use super::db::{MarkerColumn, NestDb};
use super::models::{InNestEntry, Nest};
use super::NestService;
use crate::error::LedgerError;
use crate::ledger::{ContextRefs, TransferSpec, record_transfer};
use crate::types::LedgerAction;
use rust_decimal::Decimal;
use sqlx::PgConnection;

impl NestService {
    /// Pay the nest's unlock price (coin, user -> treasury) and record the
    /// unlock. Existence of the unlock row alone gates `in_nest`.
    pub async fn unlock_nest(&self, account_id: i64, nest_id: i64) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        let nest = NestDb::get(&mut tx, nest_id).await?;
        if nest.is_archived() {
            return Err(LedgerError::NestArchived(nest_id));
        }
        if NestDb::has_unlock(&mut tx, nest_id, account_id).await? {
            return Err(LedgerError::AlreadyUnlocked(nest_id));
        }

        // Free nests skip the coin transfer entirely.
        let ledger_id = if nest.unlock_coins > Decimal::ZERO {
            let outcome = record_transfer(
                &mut tx,
                TransferSpec::new(
                    LedgerAction::UnlockNest,
                    Some(account_id),
                    Some(self.system().treasury),
                    nest.unlock_coins,
                    ContextRefs::unlock(nest_id),
                ),
            )
            .await?;
            Some(outcome.asset_ledger_id)
        } else {
            None
        };

        let unlock_id = NestDb::insert_unlock(&mut tx, nest_id, account_id, ledger_id).await?;

        tx.commit().await?;
        Ok(unlock_id)
    }

    /// Commit eggs to a launched nest: entry row and user -> pool transfer
    /// are created in the same transaction, so neither exists without the
    /// other.
    pub async fn in_nest(
        &self,
        account_id: i64,
        nest_id: i64,
        egg_count: i64,
    ) -> Result<i64, LedgerError> {
        if egg_count <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "egg count must be positive, got {egg_count}"
            )));
        }

        let mut tx = self.db().pool().begin().await?;

        let nest = NestDb::get_for_update(&mut tx, nest_id).await?;
        if nest.is_archived() {
            return Err(LedgerError::NestArchived(nest_id));
        }
        if !nest.is_launched || nest.is_nest_ended {
            return Err(LedgerError::WrongNestPhase {
                nest_id,
                detail: "nest must be launched and not yet ended",
            });
        }
        if !NestDb::has_unlock(&mut tx, nest_id, account_id).await? {
            return Err(LedgerError::NotUnlocked(nest_id));
        }

        let mine = NestDb::committed_by_user(&mut tx, nest_id, account_id).await?;
        if mine + egg_count > nest.egg_limit_per_person {
            return Err(LedgerError::EggLimitExceeded(nest.egg_limit_per_person));
        }

        let total = NestDb::committed_total(&mut tx, nest_id).await?;
        if total + egg_count > nest.egg_pool {
            return Err(LedgerError::PoolCapacityExceeded(nest.egg_pool));
        }

        let entry_id = NestDb::insert_entry(&mut tx, nest_id, account_id, egg_count).await?;

        record_transfer(
            &mut tx,
            TransferSpec::new(
                LedgerAction::InNest,
                Some(account_id),
                Some(self.system().pool),
                Decimal::from(egg_count),
                ContextRefs::nest_investment(entry_id),
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(account_id, nest_id, egg_count, entry_id, "Eggs committed to nest");
        Ok(entry_id)
    }

    /// Cooldown payout for a single entry (straggler/retry path).
    pub async fn egging(&self, entry_id: i64) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let entry = NestDb::get_entry_for_update(&mut tx, entry_id).await?;
        let nest = NestDb::get(&mut tx, entry.nest_id).await?;
        if !nest.is_cool_down_ended {
            return Err(LedgerError::WrongNestPhase {
                nest_id: nest.id,
                detail: "cooldown has not ended",
            });
        }
        let ledger_id = self.egging_in(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(ledger_id)
    }

    /// End-of-nest gem payout for a single entry.
    pub async fn egging_gem(&self, entry_id: i64) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let entry = NestDb::get_entry_for_update(&mut tx, entry_id).await?;
        let nest = NestDb::get(&mut tx, entry.nest_id).await?;
        if !nest.is_nest_ended {
            return Err(LedgerError::WrongNestPhase {
                nest_id: nest.id,
                detail: "nest has not ended",
            });
        }
        let ledger_id = self.egging_gem_in(&mut tx, &nest, &entry).await?;
        tx.commit().await?;
        Ok(ledger_id)
    }

    /// Archive refund for a single entry.
    pub async fn return_nest_egg(&self, entry_id: i64) -> Result<i64, LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let entry = NestDb::get_entry_for_update(&mut tx, entry_id).await?;
        let nest = NestDb::get(&mut tx, entry.nest_id).await?;
        if !nest.is_archived() {
            return Err(LedgerError::WrongNestPhase {
                nest_id: nest.id,
                detail: "nest is not archived",
            });
        }
        let ledger_id = self.return_nest_egg_in(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(ledger_id)
    }

    /// Cooldown payout: pool -> user, `egg_count` eggs, marks `are_cooled`.
    pub(super) async fn egging_in(
        &self,
        conn: &mut PgConnection,
        entry: &InNestEntry,
    ) -> Result<i64, LedgerError> {
        if entry.are_cooled.is_paid() || entry.got_cancelled.is_paid() {
            return Err(LedgerError::AlreadyPaid(entry.id));
        }

        let outcome = record_transfer(
            conn,
            TransferSpec::new(
                LedgerAction::Egging,
                Some(self.system().pool),
                Some(entry.account_id),
                Decimal::from(entry.egg_count),
                ContextRefs::nest_investment(entry.id),
            ),
        )
        .await?;

        NestDb::set_entry_marker(conn, entry.id, MarkerColumn::AreCooled, outcome.asset_ledger_id)
            .await?;
        Ok(outcome.asset_ledger_id)
    }

    /// End-of-nest payout: pool -> user, eggs x return factor in gems,
    /// marks `are_gems_distributed`.
    pub(super) async fn egging_gem_in(
        &self,
        conn: &mut PgConnection,
        nest: &Nest,
        entry: &InNestEntry,
    ) -> Result<i64, LedgerError> {
        if entry.are_gems_distributed.is_paid() || entry.got_cancelled.is_paid() {
            return Err(LedgerError::AlreadyPaid(entry.id));
        }

        let gems = nest.gem_return_for(entry.egg_count);
        let outcome = record_transfer(
            conn,
            TransferSpec::new(
                LedgerAction::EggingGem,
                Some(self.system().pool),
                Some(entry.account_id),
                gems,
                ContextRefs::nest_investment(entry.id),
            ),
        )
        .await?;

        NestDb::set_entry_marker(
            conn,
            entry.id,
            MarkerColumn::AreGemsDistributed,
            outcome.asset_ledger_id,
        )
        .await?;
        Ok(outcome.asset_ledger_id)
    }

    /// Archive refund: pool -> user, `egg_count` eggs, marks `got_cancelled`.
    pub(super) async fn return_nest_egg_in(
        &self,
        conn: &mut PgConnection,
        entry: &InNestEntry,
    ) -> Result<i64, LedgerError> {
        if entry.got_cancelled.is_paid() {
            return Err(LedgerError::AlreadyPaid(entry.id));
        }

        let outcome = record_transfer(
            conn,
            TransferSpec::new(
                LedgerAction::ReturnNestEgg,
                Some(self.system().pool),
                Some(entry.account_id),
                Decimal::from(entry.egg_count),
                ContextRefs::nest_investment(entry.id),
            ),
        )
        .await?;

        NestDb::set_entry_marker(
            conn,
            entry.id,
            MarkerColumn::GotCancelled,
            outcome.asset_ledger_id,
        )
        .await?;
        Ok(outcome.asset_ledger_id)
    }
}
