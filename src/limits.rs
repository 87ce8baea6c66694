use crate::model::Minute;

pub const MAX_RESOURCES: usize = 1_000;
pub const MAX_SERVICES: usize = 1_000;
pub const MAX_APPOINTMENTS_PER_DAY: usize = 10_000;
pub const MAX_BLOCKS_PER_DAY: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 4_096;
pub const MAX_CONTACT_LEN: usize = 320;
/// A treatment must fit in one civil day.
pub const MAX_DURATION_MINUTES: Minute = 24 * 60;
/// Longest same-day lead time a policy may ask for.
pub const MAX_LEAD_MINUTES: Minute = 120;
/// Furthest a policy may open the booking window. Always well inside
/// `MAX_RECOMPUTE_DAYS` so a horizon recompute is never refused.
pub const MAX_ADVANCE_BOOKING_DAYS: u32 = 365;
/// Upper bound for a single recompute call, in dates.
pub const MAX_RECOMPUTE_DAYS: u32 = 3_660;
