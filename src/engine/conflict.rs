use chrono::NaiveTime;

use crate::model::*;
use crate::policy::Policy;

use super::error::Rejection;

/// Half-open overlap test. Touching intervals (`a_end == b_start`) do not overlap.
pub fn overlaps(a_start: Minute, a_end: Minute, b_start: Minute, b_end: Minute) -> bool {
    a_start < b_end && a_end > b_start
}

pub(crate) fn validate_range(start: NaiveTime, end: NaiveTime) -> Result<(), Rejection> {
    if start >= end {
        return Err(Rejection::InvalidRange);
    }
    Ok(())
}

/// First active appointment sharing `bucket`'s timeline whose busy span
/// (service + buffer) overlaps `candidate`.
pub(crate) fn appointment_conflict<'a>(
    appointments: &'a [Appointment],
    bucket: ResourceSelector,
    candidate: &Span,
    policy: &Policy,
) -> Option<&'a Appointment> {
    // Sorted by start: nothing starting at or after candidate.end can overlap.
    let right_bound = appointments.partition_point(|a| a.start_minute() < candidate.end);
    appointments[..right_bound].iter().find(|a| {
        a.status.is_active()
            && policy.shares_timeline(bucket, a.resource)
            && a.busy_span(policy.buffer_minutes).overlaps(candidate)
    })
}

/// Blackouts add no buffer: the candidate's raw span against the event's span.
pub(crate) fn blackout_conflict(blackouts: &[BlackoutEvent], bucket: ResourceSelector, candidate: &Span) -> bool {
    blackouts
        .iter()
        .any(|b| b.active && b.applies_to(bucket) && b.span().overlaps(candidate))
}

/// Manual blocks always count; auto blocks only when `include_auto` is set.
pub(crate) fn gap_block_conflict(
    blocks: &[GapBlock],
    bucket: ResourceSelector,
    candidate: &Span,
    include_auto: bool,
) -> bool {
    blocks.iter().any(|b| {
        b.active
            && (include_auto || !b.auto_generated)
            && b.applies_to(bucket)
            && b.span().overlaps(candidate)
    })
}
