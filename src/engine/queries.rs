use chrono::NaiveDate;
use ulid::Ulid;

use crate::config::Rules;
use crate::limits::*;
use crate::model::*;
use crate::policy::Policy;

use super::availability::{availability, check_date, DayView, SlotContext, SlotStatus};
use super::error::Rejection;
use super::{Engine, EngineError};

/// A request for the slot list of one date and bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    /// Falls back to the policy's default duration.
    pub duration_minutes: Option<Minute>,
    pub resource: ResourceSelector,
    /// Treat auto gap blocks as blackouts. Manual blocks always apply.
    pub include_gap_blocks: bool,
}

impl AvailabilityQuery {
    pub fn new(date: NaiveDate, resource: ResourceSelector) -> Self {
        Self {
            date,
            duration_minutes: None,
            resource,
            include_gap_blocks: true,
        }
    }

    pub fn with_duration(mut self, minutes: Minute) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn without_gap_blocks(mut self) -> Self {
        self.include_gap_blocks = false;
        self
    }
}

impl Engine {
    /// Every candidate start time on the date with availability and reason.
    ///
    /// Date-level failures (past date, beyond the horizon, same-day cutoff
    /// passed) are returned as errors; a closed day is an empty list.
    pub async fn get_availability(
        &self,
        rules: &Rules,
        query: AvailabilityQuery,
    ) -> Result<Vec<SlotStatus>, EngineError> {
        metrics::counter!(crate::observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        let policy = &rules.policy;
        let duration = query.duration_minutes.unwrap_or(policy.default_duration_minutes);
        if duration == 0 || duration > MAX_DURATION_MINUTES {
            return Err(Rejection::InvalidRange.into());
        }
        self.check_bucket(policy, query.resource)?;

        let now = self.now();
        check_date(query.date, policy, now)?;

        let entry = rules.calendar.entry_for(query.date);
        let ctx = SlotContext {
            date: query.date,
            duration,
            resource: query.resource,
            policy,
            now,
        };

        let slots = match self.store.get_day(query.date) {
            Some(day) => {
                let guard = day.read().await;
                availability(&entry, &ctx, &DayView::of(&guard, query.include_gap_blocks))
            }
            None => availability(&entry, &ctx, &DayView::empty()),
        };
        Ok(slots)
    }

    /// Whether `bucket` may be queried or booked under `policy`.
    pub(super) fn check_bucket(&self, policy: &Policy, bucket: ResourceSelector) -> Result<(), Rejection> {
        let ResourceSelector::Specific(id) = bucket else {
            return Ok(());
        };
        if !policy.enable_resource_selection {
            return Err(Rejection::ResourceSelectionDisabled);
        }
        match self.store.resource(&id) {
            None => Err(Rejection::UnknownResource),
            Some(r) if !r.active => Err(Rejection::InactiveResource),
            Some(_) => Ok(()),
        }
    }

    pub async fn appointment(&self, id: Ulid) -> Option<Appointment> {
        let date = self.store.date_for_entity(&id)?;
        let day = self.store.get_day(date)?;
        let guard = day.read().await;
        guard.appointment(id).cloned()
    }

    /// Appointments on `date` in any status, ordered by start. `bucket`
    /// narrows to one bucket.
    pub async fn appointments_on(&self, date: NaiveDate, bucket: Option<ResourceSelector>) -> Vec<Appointment> {
        let Some(day) = self.store.get_day(date) else {
            return Vec::new();
        };
        let guard = day.read().await;
        guard
            .appointments
            .iter()
            .filter(|a| bucket.is_none_or(|b| a.resource == b))
            .cloned()
            .collect()
    }

    pub async fn blackouts_on(&self, date: NaiveDate) -> Vec<BlackoutEvent> {
        match self.store.get_day(date) {
            Some(day) => day.read().await.blackouts.clone(),
            None => Vec::new(),
        }
    }

    /// Active gap blocks that close time for `bucket` on `date`: its own
    /// blocks plus every block on `Any`. Ordered by start.
    pub async fn gap_blocks_for(&self, date: NaiveDate, bucket: ResourceSelector) -> Vec<GapBlock> {
        let Some(day) = self.store.get_day(date) else {
            return Vec::new();
        };
        let guard = day.read().await;
        guard
            .gap_blocks
            .iter()
            .filter(|b| b.active && b.applies_to(bucket))
            .cloned()
            .collect()
    }

    /// Active appointments whose treatment overlaps the blackout, so an
    /// operator can see who is affected before or after adding it.
    pub async fn conflicting_appointments(&self, blackout_id: Ulid) -> Result<Vec<Appointment>, EngineError> {
        let date = self
            .store
            .date_for_entity(&blackout_id)
            .ok_or(EngineError::NotFound(blackout_id))?;
        let day = self.store.get_day(date).ok_or(EngineError::NotFound(blackout_id))?;
        let guard = day.read().await;
        let blackout = guard
            .blackouts
            .iter()
            .find(|b| b.id == blackout_id)
            .ok_or(EngineError::NotFound(blackout_id))?;
        let span = blackout.span();
        Ok(guard
            .active_appointments()
            .filter(|a| blackout.applies_to(a.resource) && a.service_span().overlaps(&span))
            .cloned()
            .collect())
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        self.store.resources()
    }

    pub fn list_services(&self) -> Vec<Service> {
        self.store.services()
    }
}
