//! Nest campaign and commitment models.

use crate::error::LedgerError;
use crate::types::PaidMarker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A time-boxed egg-pooling campaign.
///
/// The three boolean flags gate a strict forward-only state machine:
/// draft -> launched -> ended -> cooldown-ended. `archived_at` is terminal
/// and only legal before the nest ends.
#[derive(Debug, Clone)]
pub struct Nest {
    pub id: i64,
    pub name: String,
    pub egg_pool: i64,
    pub egg_limit_per_person: i64,
    pub unlock_coins: Decimal,
    pub scheduled_launch_at: DateTime<Utc>,
    pub scheduled_nest_end: DateTime<Utc>,
    pub scheduled_cool_down_end: DateTime<Utc>,
    pub gem_return_min_factor: Decimal,
    pub gem_return_max_factor: Decimal,
    pub gem_return_factor: Decimal,
    pub nest_risk: i16,
    pub is_launched: bool,
    pub is_nest_ended: bool,
    pub is_cool_down_ended: bool,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Nest {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Gems owed for one entry at end-of-nest settlement.
    pub fn gem_return_for(&self, egg_count: i64) -> Decimal {
        (Decimal::from(egg_count) * self.gem_return_factor).round_dp(2)
    }
}

/// One user's egg commitment to a nest, with per-phase settlement markers.
///
/// Each marker holds the ledger row id that paid that phase; checking the
/// marker before transferring is the exactly-once guard.
#[derive(Debug, Clone)]
pub struct InNestEntry {
    pub id: i64,
    pub nest_id: i64,
    pub account_id: i64,
    pub egg_count: i64,
    pub are_cooled: PaidMarker,
    pub are_gems_distributed: PaidMarker,
    pub got_cancelled: PaidMarker,
}

/// Settlement phase names used on `nest_issues` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestPhase {
    End,
    Cooldown,
    Archiving,
}

impl NestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            NestPhase::End => "end",
            NestPhase::Cooldown => "cooldown",
            NestPhase::Archiving => "archiving",
        }
    }
}

/// Parameters for creating a nest in draft state.
#[derive(Debug, Clone)]
pub struct CreateNestParams {
    pub name: String,
    pub egg_pool: i64,
    pub egg_limit_per_person: i64,
    pub unlock_coins: Decimal,
    pub scheduled_launch_at: DateTime<Utc>,
    pub scheduled_nest_end: DateTime<Utc>,
    pub scheduled_cool_down_end: DateTime<Utc>,
    pub gem_return_min_factor: Decimal,
    pub gem_return_max_factor: Decimal,
    pub gem_return_factor: Decimal,
    pub nest_risk: i16,
}

impl CreateNestParams {
    /// Schedule must be strictly increasing; the return factor must sit
    /// inside its configured band.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.egg_pool <= 0 || self.egg_limit_per_person <= 0 {
            return Err(LedgerError::Validation(
                "egg_pool and egg_limit_per_person must be positive".into(),
            ));
        }
        if self.scheduled_launch_at >= self.scheduled_nest_end
            || self.scheduled_nest_end >= self.scheduled_cool_down_end
        {
            return Err(LedgerError::Validation(
                "schedule must satisfy launch < end < cooldown-end".into(),
            ));
        }
        if self.gem_return_min_factor > self.gem_return_factor
            || self.gem_return_factor > self.gem_return_max_factor
        {
            return Err(LedgerError::Validation(
                "gem return factor must lie within [min, max]".into(),
            ));
        }
        if self.unlock_coins < Decimal::ZERO {
            return Err(LedgerError::Validation("unlock_coins must be >= 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params() -> CreateNestParams {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        CreateNestParams {
            name: "spring".into(),
            egg_pool: 10_000,
            egg_limit_per_person: 100,
            unlock_coins: Decimal::new(50, 0),
            scheduled_launch_at: base,
            scheduled_nest_end: base + chrono::Duration::days(30),
            scheduled_cool_down_end: base + chrono::Duration::days(45),
            gem_return_min_factor: Decimal::new(1, 1),  // 0.1
            gem_return_max_factor: Decimal::new(20, 1), // 2.0
            gem_return_factor: Decimal::new(5, 1),      // 0.5
            nest_risk: 1,
        }
    }

    #[test]
    fn test_valid_params() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_increasing_schedule() {
        let mut p = params();
        p.scheduled_nest_end = p.scheduled_launch_at;
        assert!(p.validate().is_err());

        let mut p = params();
        p.scheduled_cool_down_end = p.scheduled_nest_end;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_rejects_factor_outside_band() {
        let mut p = params();
        p.gem_return_factor = Decimal::new(30, 1); // 3.0 > max 2.0
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_gem_return_rounds_to_two_decimals() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let nest = Nest {
            id: 1,
            name: "n".into(),
            egg_pool: 100,
            egg_limit_per_person: 10,
            unlock_coins: Decimal::ZERO,
            scheduled_launch_at: base,
            scheduled_nest_end: base,
            scheduled_cool_down_end: base,
            gem_return_min_factor: Decimal::new(1, 1),
            gem_return_max_factor: Decimal::new(10, 1),
            gem_return_factor: Decimal::new(333, 3), // 0.333
            nest_risk: 0,
            is_launched: true,
            is_nest_ended: false,
            is_cool_down_ended: false,
            archived_at: None,
        };
        // 7 * 0.333 = 2.331 -> 2.33
        assert_eq!(nest.gem_return_for(7), Decimal::new(233, 2));
    }
}
