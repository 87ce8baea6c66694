use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minute of the civil day, 0 = midnight. Busy spans may run past 1440
/// when a buffer crosses midnight; they are never wrapped.
pub type Minute = u32;

pub fn minute_of(t: NaiveTime) -> Minute {
    t.hour() * 60 + t.minute()
}

/// `None` when `m` falls on or after midnight of the next day.
pub fn time_of(m: Minute) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(m / 60, m % 60, 0)
}

/// Half-open interval `[start, end)` in minutes of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        crate::engine::overlaps(self.start, self.end, other.start, other.end)
    }
}

/// Which resource bucket an appointment, query or block belongs to.
/// `Any` is the "no preference" bucket and is a bucket in its own right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceSelector {
    Any,
    Specific(Ulid),
}

impl ResourceSelector {
    pub fn from_option(id: Option<Ulid>) -> Self {
        id.map_or(Self::Any, Self::Specific)
    }

    pub fn resource_id(&self) -> Option<Ulid> {
        match self {
            Self::Any => None,
            Self::Specific(id) => Some(*id),
        }
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Specific(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Only pending and confirmed appointments occupy time.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Cancelled | Completed) | (Confirmed, Completed | Cancelled)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub email: String,
    pub phone: Option<String>,
}

impl CustomerRef {
    pub fn new(email: impl Into<String>, phone: Option<String>) -> Self {
        Self {
            email: email.into(),
            phone,
        }
    }

    /// Same person for rate-limiting purposes: same e-mail (case-insensitive) or same phone.
    pub fn same_contact(&self, other: &CustomerRef) -> bool {
        if self.email.eq_ignore_ascii_case(&other.email) {
            return true;
        }
        matches!((&self.phone, &other.phone), (Some(a), Some(b)) if a == b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub customer: CustomerRef,
    pub service_id: Ulid,
    pub duration_minutes: Minute,
    pub resource: ResourceSelector,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub status: AppointmentStatus,
    /// Civil date the booking was made, used by the daily per-customer limit.
    pub created_on: NaiveDate,
    pub notes: Option<String>,
}

impl Appointment {
    pub fn start_minute(&self) -> Minute {
        minute_of(self.start_time)
    }

    /// The treatment itself, without buffer.
    pub fn service_span(&self) -> Span {
        let start = self.start_minute();
        Span::new(start, start + self.duration_minutes)
    }

    /// Time the resource is unavailable to the next appointment.
    pub fn busy_span(&self, buffer: Minute) -> Span {
        let start = self.start_minute();
        Span::new(start, start + self.duration_minutes + buffer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackoutKind {
    Break,
    Meeting,
    Training,
    Maintenance,
    Preparation,
    Admin,
    Other,
}

/// Operator-declared non-bookable interval. `resource: None` closes every bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutEvent {
    pub id: Ulid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub resource: Option<Ulid>,
    pub kind: BlackoutKind,
    pub title: Option<String>,
    pub active: bool,
}

impl BlackoutEvent {
    pub fn span(&self) -> Span {
        Span::new(minute_of(self.start_time), minute_of(self.end_time))
    }

    pub fn applies_to(&self, bucket: ResourceSelector) -> bool {
        match self.resource {
            None => true,
            Some(id) => bucket == ResourceSelector::Specific(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapCategory {
    BeforeOpen,
    Between,
    AfterClose,
    Manual,
}

impl GapCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::BeforeOpen => "before_open",
            Self::Between => "between",
            Self::AfterClose => "after_close",
            Self::Manual => "manual",
        }
    }
}

/// An idle window closed to bookings. A block on `Any`, auto or manual,
/// closes every bucket; a therapist's block closes only that therapist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapBlock {
    pub id: Ulid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub resource: ResourceSelector,
    pub category: GapCategory,
    pub auto_generated: bool,
    pub active: bool,
    pub reason: String,
}

impl GapBlock {
    pub fn span(&self) -> Span {
        Span::new(minute_of(self.start_time), minute_of(self.end_time))
    }

    pub fn applies_to(&self, bucket: ResourceSelector) -> bool {
        self.resource == bucket || self.resource == ResourceSelector::Any
    }

    /// Identity ignoring the generated id, for comparing recompute results.
    pub fn placement(&self) -> (ResourceSelector, NaiveTime, NaiveTime, GapCategory) {
        (self.resource, self.start_time, self.end_time, self.category)
    }
}

/// A therapist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub name: Option<String>,
    pub active: bool,
}

/// A bookable treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: Option<String>,
    pub duration_minutes: Minute,
    pub active: bool,
}

/// Everything booked or blocked on one civil date, across all buckets.
#[derive(Debug, Clone)]
pub struct DayState {
    pub date: NaiveDate,
    /// Sorted by `start_time`.
    pub appointments: Vec<Appointment>,
    /// Sorted by `start_time`.
    pub blackouts: Vec<BlackoutEvent>,
    /// Sorted by `start_time`. Auto and manual blocks together.
    pub gap_blocks: Vec<GapBlock>,
    /// Unique index over active appointments: one start per bucket and minute.
    active_slots: HashSet<(ResourceSelector, Minute)>,
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            appointments: Vec::new(),
            blackouts: Vec::new(),
            gap_blocks: Vec::new(),
            active_slots: HashSet::new(),
        }
    }

    pub fn slot_taken(&self, bucket: ResourceSelector, start: Minute) -> bool {
        self.active_slots.contains(&(bucket, start))
    }

    /// Insert maintaining sort order. Returns false (and inserts nothing) when an
    /// active appointment already starts at the same bucket and minute.
    pub fn insert_appointment(&mut self, appt: Appointment) -> bool {
        if appt.status.is_active() && !self.active_slots.insert((appt.resource, appt.start_minute())) {
            return false;
        }
        let pos = self
            .appointments
            .partition_point(|a| a.start_time <= appt.start_time);
        self.appointments.insert(pos, appt);
        true
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    /// Update status and keep the unique index in step.
    pub fn set_status(&mut self, id: Ulid, status: AppointmentStatus) -> Option<&Appointment> {
        let appt = self.appointments.iter_mut().find(|a| a.id == id)?;
        let key = (appt.resource, minute_of(appt.start_time));
        match (appt.status.is_active(), status.is_active()) {
            (true, false) => {
                self.active_slots.remove(&key);
            }
            (false, true) => {
                self.active_slots.insert(key);
            }
            _ => {}
        }
        appt.status = status;
        Some(&*appt)
    }

    pub fn active_appointments(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.iter().filter(|a| a.status.is_active())
    }

    pub fn insert_blackout(&mut self, blackout: BlackoutEvent) {
        let pos = self
            .blackouts
            .partition_point(|b| b.start_time <= blackout.start_time);
        self.blackouts.insert(pos, blackout);
    }

    pub fn remove_blackout(&mut self, id: Ulid) -> Option<BlackoutEvent> {
        let pos = self.blackouts.iter().position(|b| b.id == id)?;
        Some(self.blackouts.remove(pos))
    }

    pub fn insert_gap_block(&mut self, block: GapBlock) {
        let pos = self
            .gap_blocks
            .partition_point(|b| b.start_time <= block.start_time);
        self.gap_blocks.insert(pos, block);
    }

    pub fn remove_gap_block(&mut self, id: Ulid) -> Option<GapBlock> {
        let pos = self.gap_blocks.iter().position(|b| b.id == id)?;
        Some(self.gap_blocks.remove(pos))
    }

    pub fn auto_blocks(&self, bucket: ResourceSelector) -> impl Iterator<Item = &GapBlock> {
        self.gap_blocks
            .iter()
            .filter(move |b| b.auto_generated && b.resource == bucket)
    }

    /// Delete every auto block of `bucket`, then insert `blocks`. Returns the
    /// removed blocks. Manual blocks are left alone.
    pub fn replace_auto_blocks(&mut self, bucket: ResourceSelector, blocks: Vec<GapBlock>) -> Vec<GapBlock> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.gap_blocks)
            .into_iter()
            .partition(|b| b.auto_generated && b.resource == bucket);
        self.gap_blocks = kept;
        for block in blocks {
            self.insert_gap_block(block);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty() && self.blackouts.is_empty() && self.gap_blocks.is_empty()
    }
}

/// Flat event records. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Upsert of a therapist record.
    ResourceRegistered {
        id: Ulid,
        name: Option<String>,
        active: bool,
    },
    /// Upsert of a service record.
    ServiceRegistered {
        id: Ulid,
        name: Option<String>,
        duration_minutes: Minute,
        active: bool,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        id: Ulid,
        date: NaiveDate,
        status: AppointmentStatus,
    },
    BlackoutAdded {
        blackout: BlackoutEvent,
    },
    BlackoutUpdated {
        blackout: BlackoutEvent,
    },
    BlackoutRemoved {
        id: Ulid,
        date: NaiveDate,
    },
    ManualBlockAdded {
        block: GapBlock,
    },
    ManualBlockRemoved {
        id: Ulid,
        date: NaiveDate,
    },
    AutoBlocksReplaced {
        date: NaiveDate,
        resource: ResourceSelector,
        blocks: Vec<GapBlock>,
    },
}

impl Event {
    /// The civil date a day-scoped event belongs to.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Event::AppointmentBooked { appointment } => Some(appointment.date),
            Event::BlackoutAdded { blackout } | Event::BlackoutUpdated { blackout } => {
                Some(blackout.date)
            }
            Event::ManualBlockAdded { block } => Some(block.date),
            Event::AppointmentStatusChanged { date, .. }
            | Event::BlackoutRemoved { date, .. }
            | Event::ManualBlockRemoved { date, .. }
            | Event::AutoBlocksReplaced { date, .. } => Some(*date),
            Event::ResourceRegistered { .. } | Event::ServiceRegistered { .. } => None,
        }
    }
}
