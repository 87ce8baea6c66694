use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Why a date, time or request cannot be booked. Returned as data, both as
/// the per-slot reason from availability queries and as the rejection from
/// reservations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("time is in the past")]
    PastTime,
    #[error("minimum lead time not met")]
    LeadTimeViolation,
    #[error("outside business hours")]
    OutsideBusinessHours,
    #[error("closed on this day")]
    DayClosed,
    #[error("resource already booked")]
    ResourceConflict,
    #[error("blocked by a scheduled event")]
    BlackoutConflict,
    #[error("date is beyond the advance booking window")]
    AdvanceWindowExceeded,
    #[error("same-day booking cutoff has passed")]
    SameDayCutoffPassed,
    #[error("start must be before end")]
    InvalidRange,
    #[error("unknown or inactive service")]
    UnknownService,
    #[error("unknown resource")]
    UnknownResource,
    #[error("resource is not taking bookings")]
    InactiveResource,
    #[error("resource selection is disabled")]
    ResourceSelectionDisabled,
    #[error("daily booking limit reached for this customer")]
    DailyLimitExceeded,
    #[error("status change not allowed")]
    InvalidTransition,
}

impl Rejection {
    /// Short label for metrics and logs.
    pub fn code(self) -> &'static str {
        match self {
            Rejection::PastTime => "past",
            Rejection::LeadTimeViolation => "lead_time",
            Rejection::OutsideBusinessHours => "outside_hours",
            Rejection::DayClosed => "day_closed",
            Rejection::ResourceConflict => "resource_conflict",
            Rejection::BlackoutConflict => "blackout_conflict",
            Rejection::AdvanceWindowExceeded => "advance_window",
            Rejection::SameDayCutoffPassed => "same_day_cutoff",
            Rejection::InvalidRange => "invalid_range",
            Rejection::UnknownService => "unknown_service",
            Rejection::UnknownResource => "unknown_resource",
            Rejection::InactiveResource => "inactive_resource",
            Rejection::ResourceSelectionDisabled => "selection_disabled",
            Rejection::DailyLimitExceeded => "daily_limit",
            Rejection::InvalidTransition => "invalid_transition",
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("gap block {0} is auto-generated and owned by the gap-block engine")]
    DerivedBlock(Ulid),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            EngineError::Rejected(r) => Some(*r),
            _ => None,
        }
    }
}
