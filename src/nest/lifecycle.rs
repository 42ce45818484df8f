//! Nest lifecycle state machine.
//!
//! Strict forward-only: draft --launch--> launched --end--> ended
//! --cooldown--> cooldown-ended. Archive is only legal before end.
//! Settling transitions first compute the aggregate liability, check the pool
//! can cover it, and only then run the per-entry payout loop and flip the
//! nest flag, all in one transaction. A short pool refuses the transition and
//! files a `NestIssue`; a later successful run resolves it.

use super::db::NestDb;
use super::models::{InNestEntry, Nest, NestPhase};
use super::NestService;
use crate::error::LedgerError;
use crate::types::AssetId;
use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};

impl NestService {
    /// draft -> launched.
    pub async fn launch_nest(&self, nest_id: i64) -> Result<(), LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        let nest = NestDb::get_for_update(&mut tx, nest_id).await?;
        if nest.is_archived() {
            return Err(LedgerError::NestArchived(nest_id));
        }
        if nest.is_launched {
            return Err(LedgerError::WrongNestPhase {
                nest_id,
                detail: "nest is already launched",
            });
        }

        sqlx::query("UPDATE nests SET is_launched = TRUE WHERE id = $1")
            .bind(nest_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(nest_id, "Nest launched");
        Ok(())
    }

    /// launched -> ended, distributing gem returns to every open entry.
    pub async fn end_nest(&self, nest_id: i64) -> Result<usize, LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        let nest = NestDb::get_for_update(&mut tx, nest_id).await?;
        if nest.is_archived() {
            return Err(LedgerError::NestArchived(nest_id));
        }
        if !nest.is_launched {
            return Err(LedgerError::WrongNestPhase {
                nest_id,
                detail: "nest was never launched",
            });
        }
        if nest.is_nest_ended {
            return Err(LedgerError::WrongNestPhase {
                nest_id,
                detail: "nest already ended",
            });
        }

        let entries = NestDb::entries_for_update(&mut tx, nest_id).await?;
        let open: Vec<&InNestEntry> = entries
            .iter()
            .filter(|e| !e.are_gems_distributed.is_paid() && !e.got_cancelled.is_paid())
            .collect();

        let liability: Decimal = open.iter().map(|e| nest.gem_return_for(e.egg_count)).sum();
        self.check_pool_gems(&mut tx, &nest, liability, NestPhase::End)
            .await?;

        let mut paid = 0;
        for entry in &open {
            self.egging_gem_in(&mut tx, &nest, entry).await?;
            paid += 1;
        }

        sqlx::query("UPDATE nests SET is_nest_ended = TRUE WHERE id = $1")
            .bind(nest_id)
            .execute(&mut *tx)
            .await?;
        NestDb::resolve_issues(&mut tx, nest_id, NestPhase::End).await?;
        tx.commit().await?;

        tracing::info!(nest_id, paid, liability = %liability, "Nest ended, gems distributed");
        Ok(paid)
    }

    /// ended -> cooldown-ended, returning committed eggs to every open entry.
    pub async fn nest_cooldown(&self, nest_id: i64) -> Result<usize, LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        let nest = NestDb::get_for_update(&mut tx, nest_id).await?;
        if !nest.is_nest_ended {
            return Err(LedgerError::WrongNestPhase {
                nest_id,
                detail: "nest has not ended",
            });
        }
        if nest.is_cool_down_ended {
            return Err(LedgerError::WrongNestPhase {
                nest_id,
                detail: "cooldown already ended",
            });
        }

        let entries = NestDb::entries_for_update(&mut tx, nest_id).await?;
        let open: Vec<&InNestEntry> = entries
            .iter()
            .filter(|e| !e.are_cooled.is_paid() && !e.got_cancelled.is_paid())
            .collect();

        let liability: i64 = open.iter().map(|e| e.egg_count).sum();
        self.check_pool_eggs(&mut tx, nest_id, liability, NestPhase::Cooldown)
            .await?;

        let mut paid = 0;
        for entry in &open {
            self.egging_in(&mut tx, entry).await?;
            paid += 1;
        }

        sqlx::query("UPDATE nests SET is_cool_down_ended = TRUE WHERE id = $1")
            .bind(nest_id)
            .execute(&mut *tx)
            .await?;
        NestDb::resolve_issues(&mut tx, nest_id, NestPhase::Cooldown).await?;
        tx.commit().await?;

        tracing::info!(nest_id, paid, "Nest cooldown ended, eggs returned");
        Ok(paid)
    }

    /// Archive: legal only before end. Refunds every un-cancelled entry.
    pub async fn archive_nest(&self, nest_id: i64) -> Result<usize, LedgerError> {
        let mut tx = self.db().pool().begin().await?;

        let nest = NestDb::get_for_update(&mut tx, nest_id).await?;
        if nest.is_archived() {
            return Err(LedgerError::NestArchived(nest_id));
        }
        if nest.is_nest_ended {
            return Err(LedgerError::WrongNestPhase {
                nest_id,
                detail: "nest already ended; archive is only legal before end",
            });
        }

        let entries = NestDb::entries_for_update(&mut tx, nest_id).await?;
        let open: Vec<&InNestEntry> = entries
            .iter()
            .filter(|e| !e.got_cancelled.is_paid())
            .collect();

        let liability: i64 = open.iter().map(|e| e.egg_count).sum();
        self.check_pool_eggs(&mut tx, nest_id, liability, NestPhase::Archiving)
            .await?;

        let mut refunded = 0;
        for entry in &open {
            self.return_nest_egg_in(&mut tx, entry).await?;
            refunded += 1;
        }

        sqlx::query("UPDATE nests SET archived_at = NOW() WHERE id = $1")
            .bind(nest_id)
            .execute(&mut *tx)
            .await?;
        NestDb::resolve_issues(&mut tx, nest_id, NestPhase::Archiving).await?;
        tx.commit().await?;

        tracing::info!(nest_id, refunded, "Nest archived, entries refunded");
        Ok(refunded)
    }

    /// Refuse the transition and file an issue when the pool cannot cover
    /// the gem liability. The issue is filed in its own transaction so it
    /// survives the refused transition's rollback.
    async fn check_pool_gems(
        &self,
        conn: &mut PgConnection,
        nest: &Nest,
        liability: Decimal,
        phase: NestPhase,
    ) -> Result<(), LedgerError> {
        let pool_gems = sqlx::query(
            "SELECT gems FROM nest_accounts WHERE account_id = $1",
        )
        .bind(self.system().pool)
        .fetch_one(&mut *conn)
        .await?
        .get::<Decimal, _>("gems");

        if pool_gems < liability {
            let shortfall = liability - pool_gems;
            self.file_issue_standalone(nest.id, phase, AssetId::Gem, shortfall)
                .await?;
            return Err(LedgerError::PoolShort {
                nest_id: nest.id,
                asset: AssetId::Gem,
                shortfall,
            });
        }
        Ok(())
    }

    async fn check_pool_eggs(
        &self,
        conn: &mut PgConnection,
        nest_id: i64,
        liability: i64,
        phase: NestPhase,
    ) -> Result<(), LedgerError> {
        let pool_eggs = sqlx::query(
            "SELECT eggs FROM nest_accounts WHERE account_id = $1",
        )
        .bind(self.system().pool)
        .fetch_one(&mut *conn)
        .await?
        .get::<i64, _>("eggs");

        if pool_eggs < liability {
            let shortfall = Decimal::from(liability - pool_eggs);
            self.file_issue_standalone(nest_id, phase, AssetId::Egg, shortfall)
                .await?;
            return Err(LedgerError::PoolShort {
                nest_id,
                asset: AssetId::Egg,
                shortfall,
            });
        }
        Ok(())
    }

    async fn file_issue_standalone(
        &self,
        nest_id: i64,
        phase: NestPhase,
        asset: AssetId,
        shortfall: Decimal,
    ) -> Result<(), LedgerError> {
        let mut tx = self.db().pool().begin().await?;
        let issue_id = NestDb::file_issue(&mut tx, nest_id, phase, asset, shortfall).await?;
        tx.commit().await?;
        tracing::warn!(
            nest_id,
            phase = phase.as_str(),
            %shortfall,
            issue_id,
            "Pool short for nest settlement; issue filed"
        );
        Ok(())
    }
}
