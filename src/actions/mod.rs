//! Action Library: named higher-level operations composed from Transfer
//! Engine calls, each validated before touching the database and wrapped in
//! one transaction boundary.
//!
//! Every operation also has an `_in` variant taking `&mut PgConnection`, so
//! callers holding a transaction can compose actions atomically; the public
//! variant begins and commits its own transaction on the pool.

pub mod bonus;
pub mod buy;
pub mod convert;
pub mod funding;
pub mod giveaway;
pub mod mint_burn;
pub mod sell_gem;

use crate::account::SystemAccounts;
use crate::config::ActionCaps;
use crate::db::Database;
use std::sync::Arc;

pub use bonus::{BonusOutcome, TransactionIssue};

/// The Action Library entry point.
///
/// Holds the resolved system account ids (treasury, exchange, pool) and the
/// configured per-call policy caps.
pub struct ActionService {
    db: Arc<Database>,
    system: SystemAccounts,
    caps: ActionCaps,
}

impl ActionService {
    pub fn new(db: Arc<Database>, system: SystemAccounts, caps: ActionCaps) -> Self {
        Self { db, system, caps }
    }

    pub fn system_accounts(&self) -> SystemAccounts {
        self.system
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn caps(&self) -> &ActionCaps {
        &self.caps
    }
}
