use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedDayState;

/// Everything the engine holds in memory, rebuilt from the WAL on start.
pub struct InMemoryStore {
    days: DashMap<NaiveDate, SharedDayState>,
    /// appointment / blackout / gap block id → the date it lives on.
    entity_to_date: DashMap<Ulid, NaiveDate>,
    resources: DashMap<Ulid, Resource>,
    services: DashMap<Ulid, Service>,
    /// Civil booking date → who booked, for the daily per-customer limit.
    created_on: DashMap<NaiveDate, Vec<CustomerRef>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
            entity_to_date: DashMap::new(),
            resources: DashMap::new(),
            services: DashMap::new(),
            created_on: DashMap::new(),
        }
    }

    // ── Days ─────────────────────────────────────────────────

    pub fn get_day(&self, date: NaiveDate) -> Option<SharedDayState> {
        self.days.get(&date).map(|e| e.value().clone())
    }

    pub fn get_or_create_day(&self, date: NaiveDate) -> SharedDayState {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(date))))
            .value()
            .clone()
    }

    /// Stored dates, ascending.
    pub fn day_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.days.iter().map(|e| *e.key()).collect();
        dates.sort();
        dates
    }

    // ── Entity index ─────────────────────────────────────────

    pub fn date_for_entity(&self, id: &Ulid) -> Option<NaiveDate> {
        self.entity_to_date.get(id).map(|e| *e.value())
    }

    fn map_entity(&self, id: Ulid, date: NaiveDate) {
        self.entity_to_date.insert(id, date);
    }

    fn unmap_entity(&self, id: &Ulid) {
        self.entity_to_date.remove(id);
    }

    // ── Registry ─────────────────────────────────────────────

    pub fn resource(&self, id: &Ulid) -> Option<Resource> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// All resources ordered by id (registration order, since ids are ULIDs).
    pub fn resources(&self) -> Vec<Resource> {
        let mut all: Vec<Resource> = self.resources.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }

    pub fn service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn services(&self) -> Vec<Service> {
        let mut all: Vec<Service> = self.services.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Bookings made on `date` by the same e-mail or phone as `customer`,
    /// whatever their current status.
    pub fn bookings_created_by(&self, date: NaiveDate, customer: &CustomerRef) -> usize {
        self.created_on
            .get(&date)
            .map(|e| e.value().iter().filter(|c| c.same_contact(customer)).count())
            .unwrap_or(0)
    }

    // ── Event application ────────────────────────────────────

    /// Registry events. Day-scoped events are ignored here.
    pub fn apply_registry(&self, event: &Event) {
        match event {
            Event::ResourceRegistered { id, name, active } => {
                self.resources.insert(
                    *id,
                    Resource {
                        id: *id,
                        name: name.clone(),
                        active: *active,
                    },
                );
            }
            Event::ServiceRegistered {
                id,
                name,
                duration_minutes,
                active,
            } => {
                self.services.insert(
                    *id,
                    Service {
                        id: *id,
                        name: name.clone(),
                        duration_minutes: *duration_minutes,
                        active: *active,
                    },
                );
            }
            _ => {}
        }
    }

    /// Day-scoped events. The caller holds the write lock on `day`.
    pub fn apply_event(&self, day: &mut DayState, event: &Event) {
        match event {
            Event::AppointmentBooked { appointment } => {
                let id = appointment.id;
                let customer = appointment.customer.clone();
                let created_on = appointment.created_on;
                if !day.insert_appointment(appointment.clone()) {
                    tracing::warn!("appointment {id} collides with an active appointment on {}", day.date);
                    return;
                }
                self.map_entity(id, day.date);
                self.created_on.entry(created_on).or_default().push(customer);
            }
            Event::AppointmentStatusChanged { id, status, .. } => {
                day.set_status(*id, *status);
            }
            Event::BlackoutAdded { blackout } => {
                day.insert_blackout(blackout.clone());
                self.map_entity(blackout.id, day.date);
            }
            Event::BlackoutUpdated { blackout } => {
                day.remove_blackout(blackout.id);
                day.insert_blackout(blackout.clone());
                self.map_entity(blackout.id, day.date);
            }
            Event::BlackoutRemoved { id, .. } => {
                day.remove_blackout(*id);
                self.unmap_entity(id);
            }
            Event::ManualBlockAdded { block } => {
                day.insert_gap_block(block.clone());
                self.map_entity(block.id, day.date);
            }
            Event::ManualBlockRemoved { id, .. } => {
                day.remove_gap_block(*id);
                self.unmap_entity(id);
            }
            Event::AutoBlocksReplaced { resource, blocks, .. } => {
                for old in day.replace_auto_blocks(*resource, blocks.clone()) {
                    self.unmap_entity(&old.id);
                }
                for block in blocks {
                    self.map_entity(block.id, day.date);
                }
            }
            Event::ResourceRegistered { .. } | Event::ServiceRegistered { .. } => {}
        }
    }
}
