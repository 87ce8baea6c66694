use chrono::NaiveTime;

use crate::calendar::CalendarEntry;
use crate::model::{time_of, Minute};
use crate::policy::Policy;

/// Candidate start times for one day: `open_time` through `last_booking_time`
/// inclusive, every `slot_interval_minutes`. Empty on closed days.
///
/// Pure in its inputs; build a fresh one to restart.
#[derive(Debug, Clone)]
pub struct SlotGenerator {
    next: Minute,
    last: Minute,
    step: Minute,
    done: bool,
}

impl SlotGenerator {
    pub fn new(entry: &CalendarEntry, interval: Minute) -> Self {
        Self {
            next: entry.open_minute(),
            last: entry.last_booking_minute(),
            step: interval.max(1),
            done: !entry.is_open,
        }
    }
}

impl Iterator for SlotGenerator {
    type Item = NaiveTime;

    fn next(&mut self) -> Option<NaiveTime> {
        if self.done || self.next > self.last {
            self.done = true;
            return None;
        }
        let current = self.next;
        self.next += self.step;
        time_of(current)
    }
}

pub fn generate(entry: &CalendarEntry, policy: &Policy) -> SlotGenerator {
    SlotGenerator::new(entry, policy.slot_interval_minutes)
}
