use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarEntry;
use crate::model::*;
use crate::policy::Policy;

use super::conflict::{appointment_conflict, blackout_conflict, gap_block_conflict};
use super::error::Rejection;
use super::slots::generate;

/// One candidate start time and whether it can be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub time: NaiveTime,
    pub available: bool,
    /// First failing rule when unavailable.
    pub reason: Option<Rejection>,
}

/// Borrowed snapshot of one date's stored intervals.
#[derive(Debug, Clone, Copy)]
pub struct DayView<'a> {
    pub appointments: &'a [Appointment],
    pub blackouts: &'a [BlackoutEvent],
    pub gap_blocks: &'a [GapBlock],
    /// Manual blocks always apply; auto blocks only when this is set.
    pub include_auto_blocks: bool,
}

impl<'a> DayView<'a> {
    pub fn of(day: &'a DayState, include_auto_blocks: bool) -> Self {
        Self {
            appointments: &day.appointments,
            blackouts: &day.blackouts,
            gap_blocks: &day.gap_blocks,
            include_auto_blocks,
        }
    }

    pub fn empty() -> DayView<'static> {
        DayView {
            appointments: &[],
            blackouts: &[],
            gap_blocks: &[],
            include_auto_blocks: false,
        }
    }
}

/// The parameters every candidate on a date is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct SlotContext<'a> {
    pub date: NaiveDate,
    pub duration: Minute,
    pub resource: ResourceSelector,
    pub policy: &'a Policy,
    pub now: NaiveDateTime,
}

impl SlotContext<'_> {
    fn is_today(&self) -> bool {
        self.date == self.now.date()
    }

    fn lead_seconds(&self) -> u32 {
        self.policy.min_lead_minutes.saturating_mul(60)
    }

    /// Evaluate one start time. Rules run in a fixed order and the first
    /// failure is returned.
    pub fn check(&self, t: NaiveTime, view: &DayView<'_>) -> Result<(), Rejection> {
        if self.is_today() {
            let now_secs = self.now.time().num_seconds_from_midnight();
            let t_secs = t.num_seconds_from_midnight();
            if t_secs <= now_secs {
                return Err(Rejection::PastTime);
            }
            if t_secs < now_secs.saturating_add(self.lead_seconds()) {
                return Err(Rejection::LeadTimeViolation);
            }
        }

        let start = minute_of(t);
        let candidate = Span::new(start, start.saturating_add(self.duration));

        if appointment_conflict(view.appointments, self.resource, &candidate, self.policy).is_some() {
            return Err(Rejection::ResourceConflict);
        }
        if blackout_conflict(view.blackouts, self.resource, &candidate)
            || gap_block_conflict(view.gap_blocks, self.resource, &candidate, view.include_auto_blocks)
        {
            return Err(Rejection::BlackoutConflict);
        }
        Ok(())
    }
}

/// Date-level gate shared by queries and reservations.
pub fn check_date(date: NaiveDate, policy: &Policy, now: NaiveDateTime) -> Result<(), Rejection> {
    let today = now.date();
    if date < today {
        return Err(Rejection::PastTime);
    }
    if date > policy.horizon_end(today) {
        return Err(Rejection::AdvanceWindowExceeded);
    }
    if date == today && now.time() >= policy.same_day_cutoff {
        return Err(Rejection::SameDayCutoffPassed);
    }
    Ok(())
}

/// Every candidate start time of the day with its status, ascending.
///
/// Closed days, and same-day queries where `max(open, now + lead)` is already
/// past the last booking time, produce an empty list.
pub fn availability(entry: &CalendarEntry, ctx: &SlotContext<'_>, view: &DayView<'_>) -> Vec<SlotStatus> {
    if !entry.is_open {
        return Vec::new();
    }
    if ctx.is_today() {
        let earliest = entry
            .open_time
            .num_seconds_from_midnight()
            .max(ctx.now.time().num_seconds_from_midnight().saturating_add(ctx.lead_seconds()));
        if earliest > entry.last_booking_time.num_seconds_from_midnight() {
            return Vec::new();
        }
    }

    generate(entry, ctx.policy)
        .map(|time| match ctx.check(time, view) {
            Ok(()) => SlotStatus {
                time,
                available: true,
                reason: None,
            },
            Err(reason) => SlotStatus {
                time,
                available: false,
                reason: Some(reason),
            },
        })
        .collect()
}
