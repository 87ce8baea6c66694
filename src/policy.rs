//! Scheduling parameters. One validated `Policy` value is passed into every
//! engine call; there is no global lookup.

use chrono::{Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::limits::{MAX_ADVANCE_BOOKING_DAYS, MAX_LEAD_MINUTES};
use crate::model::{Minute, ResourceSelector};

/// Which idle windows the gap-block engine closes, and how short they must be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapBlockPolicy {
    pub enabled: bool,
    /// Gaps of `1..=min_gap_minutes` are blocked.
    pub min_gap_minutes: Minute,
    pub block_before_open: bool,
    pub block_between: bool,
    pub block_after_close: bool,
}

impl Default for GapBlockPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_gap_minutes: 90,
            block_before_open: true,
            block_between: true,
            block_after_close: true,
        }
    }
}

impl GapBlockPolicy {
    pub fn blocks(&self, gap: Minute) -> bool {
        gap > 0 && gap <= self.min_gap_minutes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Step between candidate start times.
    pub slot_interval_minutes: Minute,
    /// Idle time after each treatment before the same resource can start again.
    pub buffer_minutes: Minute,
    pub advance_booking_days: u32,
    /// From this time on, same-day bookings are no longer accepted.
    pub same_day_cutoff: NaiveTime,
    /// Same-day only.
    pub min_lead_minutes: Minute,
    pub default_duration_minutes: Minute,
    /// When false every appointment shares one timeline regardless of resource.
    pub allow_concurrent_same_time: bool,
    pub enable_resource_selection: bool,
    /// New appointments start as pending instead of confirmed.
    pub requires_approval: bool,
    /// Bookings one customer may create per civil day. `None` disables the check.
    pub daily_booking_limit: Option<u32>,
    pub gap_blocks: GapBlockPolicy,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            slot_interval_minutes: 30,
            buffer_minutes: 15,
            advance_booking_days: 90,
            same_day_cutoff: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN),
            min_lead_minutes: 20,
            default_duration_minutes: 90,
            allow_concurrent_same_time: false,
            enable_resource_selection: true,
            requires_approval: true,
            daily_booking_limit: Some(2),
            gap_blocks: GapBlockPolicy::default(),
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_interval_minutes == 0 {
            return Err(ConfigError::InvalidPolicy("slot_interval_minutes must be at least 1"));
        }
        if self.slot_interval_minutes > 24 * 60 {
            return Err(ConfigError::InvalidPolicy("slot_interval_minutes exceeds one day"));
        }
        if self.advance_booking_days == 0 {
            return Err(ConfigError::InvalidPolicy("advance_booking_days must be at least 1"));
        }
        if self.advance_booking_days > MAX_ADVANCE_BOOKING_DAYS {
            return Err(ConfigError::InvalidPolicy("advance_booking_days exceeds 365"));
        }
        if self.min_lead_minutes > MAX_LEAD_MINUTES {
            return Err(ConfigError::InvalidPolicy("min_lead_minutes exceeds 120"));
        }
        if self.default_duration_minutes == 0 {
            return Err(ConfigError::InvalidPolicy("default_duration_minutes must be at least 1"));
        }
        if self.buffer_minutes > 24 * 60 {
            return Err(ConfigError::InvalidPolicy("buffer_minutes exceeds one day"));
        }
        if self.daily_booking_limit == Some(0) {
            return Err(ConfigError::InvalidPolicy("daily_booking_limit must be at least 1"));
        }
        Ok(())
    }

    /// Last bookable date, inclusive.
    pub fn horizon_end(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_days(Days::new(u64::from(self.advance_booking_days)))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Whether appointments in buckets `a` and `b` compete for the same time.
    pub fn shares_timeline(&self, a: ResourceSelector, b: ResourceSelector) -> bool {
        !self.allow_concurrent_same_time || a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn defaults_are_valid() {
        assert!(Policy::default().validate().is_ok());
    }

    #[test]
    fn zero_interval_rejected() {
        let p = Policy {
            slot_interval_minutes: 0,
            ..Policy::default()
        };
        assert!(matches!(p.validate(), Err(ConfigError::InvalidPolicy(_))));
    }

    #[test]
    fn zero_horizon_rejected() {
        let p = Policy {
            advance_booking_days: 0,
            ..Policy::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn upper_bounds_enforced() {
        let far = Policy {
            advance_booking_days: MAX_ADVANCE_BOOKING_DAYS + 1,
            ..Policy::default()
        };
        assert!(matches!(far.validate(), Err(ConfigError::InvalidPolicy(_))));
        let year = Policy {
            advance_booking_days: MAX_ADVANCE_BOOKING_DAYS,
            ..Policy::default()
        };
        assert!(year.validate().is_ok());

        let slow = Policy {
            min_lead_minutes: 80_000_000,
            ..Policy::default()
        };
        assert!(matches!(slow.validate(), Err(ConfigError::InvalidPolicy(_))));
        let two_hours = Policy {
            min_lead_minutes: MAX_LEAD_MINUTES,
            ..Policy::default()
        };
        assert!(two_hours.validate().is_ok());
    }

    #[test]
    fn horizon_is_inclusive_day_count() {
        let p = Policy {
            advance_booking_days: 3,
            ..Policy::default()
        };
        let today = NaiveDate::from_ymd_opt(2026, 12, 30).unwrap();
        assert_eq!(p.horizon_end(today), NaiveDate::from_ymd_opt(2027, 1, 2).unwrap());
    }

    #[test]
    fn gap_threshold_is_inclusive_and_excludes_zero() {
        let g = GapBlockPolicy::default();
        assert!(!g.blocks(0));
        assert!(g.blocks(1));
        assert!(g.blocks(90));
        assert!(!g.blocks(91));
    }

    #[test]
    fn timeline_partition_follows_concurrency_flag() {
        let r1 = ResourceSelector::Specific(Ulid::new());
        let r2 = ResourceSelector::Specific(Ulid::new());
        let shared = Policy::default();
        assert!(shared.shares_timeline(r1, r2));
        assert!(shared.shares_timeline(ResourceSelector::Any, r1));

        let split = Policy {
            allow_concurrent_same_time: true,
            ..Policy::default()
        };
        assert!(split.shares_timeline(r1, r1));
        assert!(!split.shares_timeline(r1, r2));
        assert!(!split.shares_timeline(ResourceSelector::Any, r1));
        assert!(split.shares_timeline(ResourceSelector::Any, ResourceSelector::Any));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p: Policy = serde_json::from_str(r#"{"buffer_minutes": 0, "gap_blocks": {"min_gap_minutes": 45}}"#).unwrap();
        assert_eq!(p.buffer_minutes, 0);
        assert_eq!(p.slot_interval_minutes, 30);
        assert_eq!(p.gap_blocks.min_gap_minutes, 45);
        assert!(p.gap_blocks.enabled);
    }
}
