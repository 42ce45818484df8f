//! Nest campaigns: unlocks, egg commitments, and the lifecycle state machine
//! that settles entries across launch/end/cooldown/archive transitions.

pub mod db;
pub mod entry;
pub mod lifecycle;
pub mod models;

pub use db::{MarkerColumn, NestDb};
pub use models::{CreateNestParams, InNestEntry, Nest, NestPhase};

use crate::account::SystemAccounts;
use crate::db::Database;
use crate::error::LedgerError;
use std::sync::Arc;

/// Nest operations: per-entry actions and lifecycle transitions.
pub struct NestService {
    db: Arc<Database>,
    system: SystemAccounts,
}

impl NestService {
    pub fn new(db: Arc<Database>, system: SystemAccounts) -> Self {
        Self { db, system }
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn system(&self) -> SystemAccounts {
        self.system
    }

    /// Create a nest in draft state.
    pub async fn create_nest(&self, params: CreateNestParams) -> Result<i64, LedgerError> {
        let mut tx = self.db.pool().begin().await?;
        let id = NestDb::create(&mut tx, &params).await?;
        tx.commit().await?;
        tracing::info!(nest_id = id, name = %params.name, "Nest created");
        Ok(id)
    }
}
