//! Per-weekday operating hours.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::model::{minute_of, Minute};

/// Operating hours for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// 0 = Monday … 6 = Sunday.
    pub weekday: u8,
    pub is_open: bool,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    /// Latest start time a booking may have.
    pub last_booking_time: NaiveTime,
}

impl CalendarEntry {
    pub fn open(weekday: u8, open_time: NaiveTime, close_time: NaiveTime, last_booking_time: NaiveTime) -> Self {
        Self {
            weekday,
            is_open: true,
            open_time,
            close_time,
            last_booking_time,
        }
    }

    pub fn closed(weekday: u8) -> Self {
        Self {
            weekday,
            is_open: false,
            open_time: NaiveTime::MIN,
            close_time: NaiveTime::MIN,
            last_booking_time: NaiveTime::MIN,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weekday > 6 {
            return Err(ConfigError::InvalidCalendar(format!(
                "weekday {} out of range 0..=6",
                self.weekday
            )));
        }
        if !self.is_open {
            return Ok(());
        }
        if self.open_time >= self.close_time {
            return Err(ConfigError::InvalidCalendar(format!(
                "weekday {}: open {} is not before close {}",
                self.weekday, self.open_time, self.close_time
            )));
        }
        if self.last_booking_time > self.close_time || self.last_booking_time < self.open_time {
            return Err(ConfigError::InvalidCalendar(format!(
                "weekday {}: last booking {} outside {}-{}",
                self.weekday, self.last_booking_time, self.open_time, self.close_time
            )));
        }
        Ok(())
    }

    pub fn open_minute(&self) -> Minute {
        minute_of(self.open_time)
    }

    pub fn last_booking_minute(&self) -> Minute {
        minute_of(self.last_booking_time)
    }
}

/// One entry per weekday. Weekdays without an entry are treated as closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CalendarEntry>", into = "Vec<CalendarEntry>")]
pub struct WeeklyCalendar {
    entries: [Option<CalendarEntry>; 7],
}

impl WeeklyCalendar {
    pub fn from_entries(entries: impl IntoIterator<Item = CalendarEntry>) -> Result<Self, ConfigError> {
        let mut slots = [None; 7];
        for entry in entries {
            entry.validate()?;
            let slot = &mut slots[entry.weekday as usize];
            if slot.is_some() {
                return Err(ConfigError::InvalidCalendar(format!(
                    "duplicate entry for weekday {}",
                    entry.weekday
                )));
            }
            *slot = Some(entry);
        }
        Ok(Self { entries: slots })
    }

    /// Entry for `weekday`, falling back to a closed day when none is configured.
    pub fn entry(&self, weekday: Weekday) -> CalendarEntry {
        let idx = weekday.num_days_from_monday() as u8;
        match self.entries[idx as usize] {
            Some(entry) => entry,
            None => {
                tracing::warn!("no operating hours configured for {weekday}, treating it as closed");
                CalendarEntry::closed(idx)
            }
        }
    }

    pub fn entry_for(&self, date: NaiveDate) -> CalendarEntry {
        self.entry(date.weekday())
    }

    pub fn entries(&self) -> impl Iterator<Item = &CalendarEntry> {
        self.entries.iter().flatten()
    }
}

/// Monday–Saturday 09:00–20:00 with last booking at 19:00; Sunday closed.
impl Default for WeeklyCalendar {
    fn default() -> Self {
        let hm = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
        let mut entries = [None; 7];
        for (weekday, slot) in entries.iter_mut().enumerate().take(6) {
            *slot = Some(CalendarEntry::open(weekday as u8, hm(9), hm(20), hm(19)));
        }
        entries[6] = Some(CalendarEntry::closed(6));
        Self { entries }
    }
}

impl TryFrom<Vec<CalendarEntry>> for WeeklyCalendar {
    type Error = ConfigError;

    fn try_from(entries: Vec<CalendarEntry>) -> Result<Self, Self::Error> {
        Self::from_entries(entries)
    }
}

impl From<WeeklyCalendar> for Vec<CalendarEntry> {
    fn from(calendar: WeeklyCalendar) -> Self {
        calendar.entries.into_iter().flatten().collect()
    }
}
