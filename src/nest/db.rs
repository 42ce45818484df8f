//! Persistence for nests, entries, unlocks and nest issues.

use super::models::{CreateNestParams, InNestEntry, Nest, NestPhase};
use crate::error::LedgerError;
use crate::types::{AssetId, PaidMarker};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};

pub struct NestDb;

const NEST_COLUMNS: &str = r#"id, name, egg_pool, egg_limit_per_person, unlock_coins,
    scheduled_launch_at, scheduled_nest_end, scheduled_cool_down_end,
    gem_return_min_factor, gem_return_max_factor, gem_return_factor,
    nest_risk, is_launched, is_nest_ended, is_cool_down_ended, archived_at"#;

fn row_to_nest(r: &sqlx::postgres::PgRow) -> Nest {
    Nest {
        id: r.get("id"),
        name: r.get("name"),
        egg_pool: r.get("egg_pool"),
        egg_limit_per_person: r.get("egg_limit_per_person"),
        unlock_coins: r.get("unlock_coins"),
        scheduled_launch_at: r.get("scheduled_launch_at"),
        scheduled_nest_end: r.get("scheduled_nest_end"),
        scheduled_cool_down_end: r.get("scheduled_cool_down_end"),
        gem_return_min_factor: r.get("gem_return_min_factor"),
        gem_return_max_factor: r.get("gem_return_max_factor"),
        gem_return_factor: r.get("gem_return_factor"),
        nest_risk: r.get("nest_risk"),
        is_launched: r.get("is_launched"),
        is_nest_ended: r.get("is_nest_ended"),
        is_cool_down_ended: r.get("is_cool_down_ended"),
        archived_at: r.get("archived_at"),
    }
}

fn row_to_entry(r: &sqlx::postgres::PgRow) -> InNestEntry {
    InNestEntry {
        id: r.get("id"),
        nest_id: r.get("nest_id"),
        account_id: r.get("account_id"),
        egg_count: r.get("egg_count"),
        are_cooled: PaidMarker::from_column(r.get("are_cooled")),
        are_gems_distributed: PaidMarker::from_column(r.get("are_gems_distributed")),
        got_cancelled: PaidMarker::from_column(r.get("got_cancelled")),
    }
}

impl NestDb {
    pub async fn create(
        conn: &mut PgConnection,
        params: &CreateNestParams,
    ) -> Result<i64, LedgerError> {
        params.validate()?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO nests
                   (name, egg_pool, egg_limit_per_person, unlock_coins,
                    scheduled_launch_at, scheduled_nest_end, scheduled_cool_down_end,
                    gem_return_min_factor, gem_return_max_factor, gem_return_factor, nest_risk)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               RETURNING id"#,
        )
        .bind(&params.name)
        .bind(params.egg_pool)
        .bind(params.egg_limit_per_person)
        .bind(params.unlock_coins)
        .bind(params.scheduled_launch_at)
        .bind(params.scheduled_nest_end)
        .bind(params.scheduled_cool_down_end)
        .bind(params.gem_return_min_factor)
        .bind(params.gem_return_max_factor)
        .bind(params.gem_return_factor)
        .bind(params.nest_risk)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    pub async fn get(conn: &mut PgConnection, nest_id: i64) -> Result<Nest, LedgerError> {
        let row = sqlx::query(&format!("SELECT {NEST_COLUMNS} FROM nests WHERE id = $1"))
            .bind(nest_id)
            .fetch_optional(conn)
            .await?
            .ok_or(LedgerError::NestNotFound(nest_id))?;
        Ok(row_to_nest(&row))
    }

    /// Load a nest holding its row lock for a lifecycle transition.
    pub async fn get_for_update(
        conn: &mut PgConnection,
        nest_id: i64,
    ) -> Result<Nest, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {NEST_COLUMNS} FROM nests WHERE id = $1 FOR UPDATE"
        ))
        .bind(nest_id)
        .fetch_optional(conn)
        .await?
        .ok_or(LedgerError::NestNotFound(nest_id))?;
        Ok(row_to_nest(&row))
    }

    pub async fn get_entry_for_update(
        conn: &mut PgConnection,
        entry_id: i64,
    ) -> Result<InNestEntry, LedgerError> {
        let row = sqlx::query(
            r#"SELECT id, nest_id, account_id, egg_count, are_cooled,
                      are_gems_distributed, got_cancelled
               FROM in_nest_entries WHERE id = $1 FOR UPDATE"#,
        )
        .bind(entry_id)
        .fetch_optional(conn)
        .await?
        .ok_or(LedgerError::EntryNotFound(entry_id))?;
        Ok(row_to_entry(&row))
    }

    /// All of a nest's entries, locked for a settlement loop.
    pub async fn entries_for_update(
        conn: &mut PgConnection,
        nest_id: i64,
    ) -> Result<Vec<InNestEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT id, nest_id, account_id, egg_count, are_cooled,
                      are_gems_distributed, got_cancelled
               FROM in_nest_entries WHERE nest_id = $1
               ORDER BY id FOR UPDATE"#,
        )
        .bind(nest_id)
        .fetch_all(conn)
        .await?;
        Ok(rows.iter().map(row_to_entry).collect())
    }

    pub async fn insert_entry(
        conn: &mut PgConnection,
        nest_id: i64,
        account_id: i64,
        egg_count: i64,
    ) -> Result<i64, LedgerError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO in_nest_entries (nest_id, account_id, egg_count)
               VALUES ($1, $2, $3) RETURNING id"#,
        )
        .bind(nest_id)
        .bind(account_id)
        .bind(egg_count)
        .fetch_one(conn)
        .await?;
        Ok(id)
    }

    pub async fn set_entry_marker(
        conn: &mut PgConnection,
        entry_id: i64,
        column: MarkerColumn,
        ledger_id: i64,
    ) -> Result<(), LedgerError> {
        let sql = match column {
            MarkerColumn::AreCooled => {
                "UPDATE in_nest_entries SET are_cooled = $1 WHERE id = $2"
            }
            MarkerColumn::AreGemsDistributed => {
                "UPDATE in_nest_entries SET are_gems_distributed = $1 WHERE id = $2"
            }
            MarkerColumn::GotCancelled => {
                "UPDATE in_nest_entries SET got_cancelled = $1 WHERE id = $2"
            }
        };
        sqlx::query(sql)
            .bind(ledger_id)
            .bind(entry_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Eggs a user has already committed to this nest.
    pub async fn committed_by_user(
        conn: &mut PgConnection,
        nest_id: i64,
        account_id: i64,
    ) -> Result<i64, LedgerError> {
        let total = sqlx::query_scalar::<_, Option<i64>>(
            r#"SELECT SUM(egg_count)::BIGINT FROM in_nest_entries
               WHERE nest_id = $1 AND account_id = $2 AND got_cancelled IS NULL"#,
        )
        .bind(nest_id)
        .bind(account_id)
        .fetch_one(conn)
        .await?;
        Ok(total.unwrap_or(0))
    }

    /// Total eggs committed to the nest.
    pub async fn committed_total(
        conn: &mut PgConnection,
        nest_id: i64,
    ) -> Result<i64, LedgerError> {
        let total = sqlx::query_scalar::<_, Option<i64>>(
            r#"SELECT SUM(egg_count)::BIGINT FROM in_nest_entries
               WHERE nest_id = $1 AND got_cancelled IS NULL"#,
        )
        .bind(nest_id)
        .fetch_one(conn)
        .await?;
        Ok(total.unwrap_or(0))
    }

    pub async fn has_unlock(
        conn: &mut PgConnection,
        nest_id: i64,
        account_id: i64,
    ) -> Result<bool, LedgerError> {
        let row = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM user_nest_unlocks WHERE nest_id = $1 AND account_id = $2",
        )
        .bind(nest_id)
        .bind(account_id)
        .fetch_optional(conn)
        .await?;
        Ok(row.is_some())
    }

    /// `ledger_id` is None for free nests, where no coins moved.
    pub async fn insert_unlock(
        conn: &mut PgConnection,
        nest_id: i64,
        account_id: i64,
        ledger_id: Option<i64>,
    ) -> Result<i64, LedgerError> {
        use crate::db::schema::constraints;
        use crate::error::is_unique_violation;

        let result = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO user_nest_unlocks (nest_id, account_id, ledger_id)
               VALUES ($1, $2, $3) RETURNING id"#,
        )
        .bind(nest_id)
        .bind(account_id)
        .bind(ledger_id)
        .fetch_one(conn)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) if is_unique_violation(&e, constraints::NEST_UNLOCK) => {
                Err(LedgerError::AlreadyUnlocked(nest_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn file_issue(
        conn: &mut PgConnection,
        nest_id: i64,
        phase: NestPhase,
        asset: AssetId,
        shortfall: Decimal,
    ) -> Result<i64, LedgerError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO nest_issues (nest_id, phase, asset_id, shortfall)
               VALUES ($1, $2, $3, $4) RETURNING id"#,
        )
        .bind(nest_id)
        .bind(phase.as_str())
        .bind(asset.id())
        .bind(shortfall)
        .fetch_one(conn)
        .await?;
        Ok(id)
    }

    /// Close any open issues of the given phase once the transition succeeds.
    pub async fn resolve_issues(
        conn: &mut PgConnection,
        nest_id: i64,
        phase: NestPhase,
    ) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"UPDATE nest_issues SET is_resolved = TRUE
               WHERE nest_id = $1 AND phase = $2 AND is_resolved = FALSE"#,
        )
        .bind(nest_id)
        .bind(phase.as_str())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Which settlement marker a payout sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColumn {
    AreCooled,
    AreGemsDistributed,
    GotCancelled,
}
