//! The single civil-time boundary. Everything past this point works in the
//! salon's local date and time-of-day; UTC never leaks into slot math.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy)]
pub enum Clock {
    /// Wall clock converted to the salon's timezone.
    System(Tz),
    /// Frozen civil time.
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::System(tz) => Utc::now().with_timezone(tz).naive_local(),
            Clock::Fixed(at) => *at,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}
