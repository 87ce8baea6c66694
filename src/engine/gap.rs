use chrono::NaiveDate;
use ulid::Ulid;

use crate::calendar::CalendarEntry;
use crate::model::*;
use crate::policy::Policy;

/// Auto gap blocks for one (date, bucket).
///
/// Only active appointments of `bucket` on `date` are considered. A gap is
/// blocked when `0 < gap <= min_gap_minutes`. The "between" and "after close"
/// gaps start after the previous appointment's buffer. Closed days, disabled
/// gap blocking and empty days yield nothing.
pub fn compute_gap_blocks(
    date: NaiveDate,
    bucket: ResourceSelector,
    entry: &CalendarEntry,
    policy: &Policy,
    appointments: &[Appointment],
) -> Vec<GapBlock> {
    let gp = &policy.gap_blocks;
    if !gp.enabled || !entry.is_open {
        return Vec::new();
    }

    let mut booked: Vec<&Appointment> = appointments
        .iter()
        .filter(|a| a.status.is_active() && a.resource == bucket && a.date == date)
        .collect();
    if booked.is_empty() {
        return Vec::new();
    }
    booked.sort_by_key(|a| a.start_time);

    let free_from = |a: &Appointment| a.start_minute() + a.duration_minutes + policy.buffer_minutes;

    let mut blocks = Vec::new();
    let mut push = |start: Minute, end: Minute, category: GapCategory| {
        if end <= start || !gp.blocks(end - start) {
            return;
        }
        let (Some(start_time), Some(end_time)) = (time_of(start), time_of(end)) else {
            return;
        };
        blocks.push(GapBlock {
            id: Ulid::new(),
            date,
            start_time,
            end_time,
            resource: bucket,
            category,
            auto_generated: true,
            active: true,
            reason: describe(category, end - start),
        });
    };

    if gp.block_before_open {
        push(entry.open_minute(), booked[0].start_minute(), GapCategory::BeforeOpen);
    }
    if gp.block_between {
        for pair in booked.windows(2) {
            push(free_from(pair[0]), pair[1].start_minute(), GapCategory::Between);
        }
    }
    if gp.block_after_close
        && let Some(last) = booked.last().copied()
    {
        push(free_from(last), entry.last_booking_minute(), GapCategory::AfterClose);
    }

    blocks
}

fn describe(category: GapCategory, gap: Minute) -> String {
    match category {
        GapCategory::BeforeOpen => format!("{gap}-minute gap between opening and the first booking"),
        GapCategory::Between => format!("{gap}-minute gap between bookings"),
        GapCategory::AfterClose => format!("{gap}-minute gap between the last booking and last booking time"),
        GapCategory::Manual => format!("{gap}-minute manual block"),
    }
}
