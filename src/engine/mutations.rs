use chrono::{NaiveDate, NaiveTime};
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::Rules;
use crate::limits::*;
use crate::model::*;

use super::availability::{check_date, DayView, SlotContext};
use super::conflict::validate_range;
use super::error::Rejection;
use super::{Engine, EngineError};

/// A customer's request for one appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub customer: CustomerRef,
    pub service_id: Ulid,
    pub resource: ResourceSelector,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
}

fn check_len(value: Option<&str>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

impl Engine {
    // ── Registry ─────────────────────────────────────────────

    /// Create or replace a therapist record.
    pub async fn register_resource(&self, id: Ulid, name: Option<String>, active: bool) -> Result<(), EngineError> {
        check_len(name.as_deref(), MAX_NAME_LEN, "resource name too long")?;
        if self.store.resource(&id).is_none() && self.store.resource_count() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        self.persist_registry(&Event::ResourceRegistered { id, name, active }).await
    }

    pub async fn set_resource_active(&self, id: Ulid, active: bool) -> Result<(), EngineError> {
        let current = self.store.resource(&id).ok_or(EngineError::NotFound(id))?;
        if current.active == active {
            return Ok(());
        }
        self.persist_registry(&Event::ResourceRegistered {
            id,
            name: current.name,
            active,
        })
        .await
    }

    /// Create or replace a service record.
    pub async fn register_service(
        &self,
        id: Ulid,
        name: Option<String>,
        duration_minutes: Minute,
        active: bool,
    ) -> Result<(), EngineError> {
        check_len(name.as_deref(), MAX_NAME_LEN, "service name too long")?;
        if duration_minutes == 0 || duration_minutes > MAX_DURATION_MINUTES {
            return Err(Rejection::InvalidRange.into());
        }
        if self.store.service(&id).is_none() && self.store.service_count() >= MAX_SERVICES {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        self.persist_registry(&Event::ServiceRegistered {
            id,
            name,
            duration_minutes,
            active,
        })
        .await
    }

    // ── Appointments ─────────────────────────────────────────

    /// Book one appointment. The full slot check is repeated under the
    /// date's write lock, so of N concurrent requests for the same bucket and
    /// time exactly one succeeds. Auto gap blocks are not consulted here.
    pub async fn reserve(&self, rules: &Rules, request: ReservationRequest) -> Result<Appointment, EngineError> {
        let result = self.try_reserve(rules, request).await;
        let outcome = match &result {
            Ok(_) => "booked",
            Err(EngineError::Rejected(r)) => r.code(),
            Err(_) => "error",
        };
        metrics::counter!(crate::observability::RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);

        if let Ok(appt) = &result {
            info!("booked {} on {} at {} for {}", appt.id, appt.date, appt.start_time, appt.resource);
            self.refresh_gaps_after_write(rules, appt.date, appt.resource).await;
        }
        result
    }

    async fn try_reserve(&self, rules: &Rules, req: ReservationRequest) -> Result<Appointment, EngineError> {
        let policy = &rules.policy;
        check_len(Some(req.customer.email.as_str()), MAX_CONTACT_LEN, "email too long")?;
        check_len(req.customer.phone.as_deref(), MAX_CONTACT_LEN, "phone too long")?;
        check_len(req.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;

        let service = self
            .store
            .service(&req.service_id)
            .filter(|s| s.active)
            .ok_or(Rejection::UnknownService)?;
        self.check_bucket(policy, req.resource)?;

        let now = self.now();
        check_date(req.date, policy, now)?;

        let entry = rules.calendar.entry_for(req.date);
        if !entry.is_open {
            return Err(Rejection::DayClosed.into());
        }
        let start = minute_of(req.time);
        if start < entry.open_minute() || start > entry.last_booking_minute() {
            return Err(Rejection::OutsideBusinessHours.into());
        }
        let start_time = time_of(start).ok_or(Rejection::OutsideBusinessHours)?;

        if let Some(limit) = policy.daily_booking_limit
            && self.store.bookings_created_by(now.date(), &req.customer) >= limit as usize
        {
            return Err(Rejection::DailyLimitExceeded.into());
        }

        let mut day = self.day_write(req.date).await;
        if day.appointments.len() >= MAX_APPOINTMENTS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many appointments on date"));
        }

        let ctx = SlotContext {
            date: req.date,
            duration: service.duration_minutes,
            resource: req.resource,
            policy,
            now,
        };
        ctx.check(start_time, &DayView::of(&day, false))?;
        if day.slot_taken(req.resource, start) {
            return Err(Rejection::ResourceConflict.into());
        }

        let appointment = Appointment {
            id: Ulid::new(),
            customer: req.customer,
            service_id: service.id,
            duration_minutes: service.duration_minutes,
            resource: req.resource,
            date: req.date,
            start_time,
            status: if policy.requires_approval {
                AppointmentStatus::Pending
            } else {
                AppointmentStatus::Confirmed
            },
            created_on: now.date(),
            notes: req.notes,
        };
        let event = Event::AppointmentBooked {
            appointment: appointment.clone(),
        };
        self.persist_and_apply(Some(req.resource), &mut day, &event).await?;
        Ok(appointment)
    }

    pub async fn cancel(&self, rules: &Rules, id: Ulid) -> Result<Appointment, EngineError> {
        self.change_status(rules, id, AppointmentStatus::Cancelled).await
    }

    /// Move an appointment along its lifecycle. Setting the current status
    /// again is a no-op.
    pub async fn change_status(
        &self,
        rules: &Rules,
        id: Ulid,
        status: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let mut day = self.resolve_entity_write(&id).await?;
        let current = day.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        if current.status == status {
            return Ok(current);
        }
        if !current.status.can_transition_to(status) {
            return Err(Rejection::InvalidTransition.into());
        }

        let event = Event::AppointmentStatusChanged {
            id,
            date: current.date,
            status,
        };
        self.persist_and_apply(Some(current.resource), &mut day, &event).await?;
        let updated = day.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(day);

        info!("appointment {id}: {} -> {}", current.status.label(), status.label());
        self.refresh_gaps_after_write(rules, updated.date, updated.resource).await;
        Ok(updated)
    }

    /// Best-effort: the appointment write already succeeded, so a failure
    /// here is logged and left to the next horizon refresh.
    async fn refresh_gaps_after_write(&self, rules: &Rules, date: NaiveDate, bucket: ResourceSelector) {
        if let Err(e) = self.recompute_bucket(rules, date, bucket).await {
            warn!("gap-block recompute for {date}/{bucket} failed: {e}");
        }
    }

    // ── Blackouts ────────────────────────────────────────────

    pub async fn add_blackout(&self, blackout: BlackoutEvent) -> Result<(), EngineError> {
        validate_range(blackout.start_time, blackout.end_time)?;
        check_len(blackout.title.as_deref(), MAX_NAME_LEN, "blackout title too long")?;
        if let Some(rid) = blackout.resource
            && self.store.resource(&rid).is_none()
        {
            return Err(Rejection::UnknownResource.into());
        }
        if self.store.date_for_entity(&blackout.id).is_some() {
            return Err(EngineError::AlreadyExists(blackout.id));
        }

        let mut day = self.day_write(blackout.date).await;
        if day.blackouts.len() >= MAX_BLOCKS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many blackouts on date"));
        }
        let bucket = blackout.resource.map(ResourceSelector::Specific);
        self.persist_and_apply(bucket, &mut day, &Event::BlackoutAdded { blackout })
            .await
    }

    /// Replace a blackout. Moving it to another date removes it from the old
    /// date and adds it to the new one.
    pub async fn update_blackout(&self, blackout: BlackoutEvent) -> Result<(), EngineError> {
        validate_range(blackout.start_time, blackout.end_time)?;
        check_len(blackout.title.as_deref(), MAX_NAME_LEN, "blackout title too long")?;
        if let Some(rid) = blackout.resource
            && self.store.resource(&rid).is_none()
        {
            return Err(Rejection::UnknownResource.into());
        }

        let mut day = self.resolve_entity_write(&blackout.id).await?;
        let old_bucket = day
            .blackouts
            .iter()
            .find(|b| b.id == blackout.id)
            .map(|b| b.resource.map(ResourceSelector::Specific))
            .ok_or(EngineError::NotFound(blackout.id))?;
        let new_bucket = blackout.resource.map(ResourceSelector::Specific);
        let notify_bucket = if old_bucket == new_bucket { new_bucket } else { None };

        if day.date == blackout.date {
            return self
                .persist_and_apply(notify_bucket, &mut day, &Event::BlackoutUpdated { blackout })
                .await;
        }

        let removed = Event::BlackoutRemoved {
            id: blackout.id,
            date: day.date,
        };
        self.persist_and_apply(old_bucket, &mut day, &removed).await?;
        drop(day);

        let mut day = self.day_write(blackout.date).await;
        self.persist_and_apply(new_bucket, &mut day, &Event::BlackoutAdded { blackout })
            .await
    }

    pub async fn remove_blackout(&self, id: Ulid) -> Result<BlackoutEvent, EngineError> {
        let mut day = self.resolve_entity_write(&id).await?;
        let blackout = day
            .blackouts
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        let event = Event::BlackoutRemoved { id, date: day.date };
        self.persist_and_apply(blackout.resource.map(ResourceSelector::Specific), &mut day, &event)
            .await?;
        Ok(blackout)
    }

    // ── Manual gap blocks ────────────────────────────────────

    /// Close time by hand. A block on `Any` closes every bucket.
    pub async fn add_manual_block(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        resource: ResourceSelector,
        reason: String,
    ) -> Result<GapBlock, EngineError> {
        validate_range(start_time, end_time)?;
        check_len(Some(reason.as_str()), MAX_NOTES_LEN, "reason too long")?;
        if let ResourceSelector::Specific(rid) = resource
            && self.store.resource(&rid).is_none()
        {
            return Err(Rejection::UnknownResource.into());
        }

        let mut day = self.day_write(date).await;
        if day.gap_blocks.len() >= MAX_BLOCKS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many gap blocks on date"));
        }
        let block = GapBlock {
            id: Ulid::new(),
            date,
            start_time,
            end_time,
            resource,
            category: GapCategory::Manual,
            auto_generated: false,
            active: true,
            reason,
        };
        let bucket = match resource {
            ResourceSelector::Any => None,
            specific => Some(specific),
        };
        let event = Event::ManualBlockAdded { block: block.clone() };
        self.persist_and_apply(bucket, &mut day, &event).await?;
        Ok(block)
    }

    /// Remove a manual block. Auto blocks belong to the gap-block engine and
    /// are refused with `DerivedBlock`.
    pub async fn remove_manual_block(&self, id: Ulid) -> Result<GapBlock, EngineError> {
        let mut day = self.resolve_entity_write(&id).await?;
        let block = day
            .gap_blocks
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        if block.auto_generated {
            return Err(EngineError::DerivedBlock(id));
        }
        let bucket = match block.resource {
            ResourceSelector::Any => None,
            specific => Some(specific),
        };
        let event = Event::ManualBlockRemoved { id, date: day.date };
        self.persist_and_apply(bucket, &mut day, &event).await?;
        Ok(block)
    }
}
