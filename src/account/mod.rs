//! Balance store: accounts (coin) and nest accounts (eggs, gems).

pub mod models;
pub mod repository;

pub use models::{Account, BonusMarker, NestAccount};
pub use repository::{AccountRepository, SystemAccounts};
