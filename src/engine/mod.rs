mod availability;
mod conflict;
mod error;
mod gap;
mod maintenance;
mod mutations;
mod queries;
mod slots;
mod store;

pub use availability::{availability, check_date, DayView, SlotContext, SlotStatus};
pub use conflict::overlaps;
pub use error::{EngineError, Rejection};
pub use gap::compute_gap_blocks;
pub use maintenance::{DateRange, RecomputeOptions, RecomputeReport};
pub use mutations::ReservationRequest;
pub use queries::AvailabilityQuery;
pub use slots::{generate, SlotGenerator};

use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use store::InMemoryStore;

pub type SharedDayState = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partial bytes don't leak into the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Booking engine: per-date state behind async locks, persisted through the WAL.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    clock: Clock,
    /// Held shared by every mutation, exclusively by compaction, so a
    /// snapshot never misses an event that is already in the WAL.
    pub(super) commit_gate: RwLock<()>,
}

/// Write access to one date. Holds the commit gate for as long as the day lock.
pub(super) struct DayWrite<'a> {
    _gate: RwLockReadGuard<'a, ()>,
    day: OwnedRwLockWriteGuard<DayState>,
}

impl Deref for DayWrite<'_> {
    type Target = DayState;

    fn deref(&self) -> &DayState {
        &self.day
    }
}

impl DerefMut for DayWrite<'_> {
    fn deref_mut(&mut self) -> &mut DayState {
        &mut self.day
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, clock: Clock) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            notify,
            clock,
            commit_gate: RwLock::new(()),
        };

        // Sole owner of every day lock during replay, so try_write never
        // contends. blocking_write would panic inside the runtime.
        for event in &events {
            match event.date() {
                None => engine.store.apply_registry(event),
                Some(date) => {
                    let day = engine.store.get_or_create_day(date);
                    let mut guard = day.try_write().expect("replay: uncontended write");
                    engine.store.apply_event(&mut guard, event);
                }
            }
        }
        tracing::info!("replayed {} events from {}", events.len(), wal_path.display());

        Ok(engine)
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_day(&self, date: NaiveDate) -> Option<SharedDayState> {
        self.store.get_day(date)
    }

    /// Gate first, then the day lock. Never nest two of these.
    pub(super) async fn day_write(&self, date: NaiveDate) -> DayWrite<'_> {
        let gate = self.commit_gate.read().await;
        let day = self.store.get_or_create_day(date).write_owned().await;
        DayWrite { _gate: gate, day }
    }

    /// Lookup entity → date, acquire that date's write lock.
    pub(super) async fn resolve_entity_write(&self, entity_id: &Ulid) -> Result<DayWrite<'_>, EngineError> {
        let date = self
            .store
            .date_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        Ok(self.day_write(date).await)
    }

    /// WAL-append + apply + notify. `bucket: None` notifies every subscriber.
    pub(super) async fn persist_and_apply(
        &self,
        bucket: Option<ResourceSelector>,
        day: &mut DayState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(day, event);
        match bucket {
            Some(bucket) => self.notify.send(bucket, event),
            None => self.notify.send_all(event),
        }
        Ok(())
    }

    /// Same as `persist_and_apply` for resource/service registry events.
    pub(super) async fn persist_registry(&self, event: &Event) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(event).await?;
        self.store.apply_registry(event);
        self.notify.send_all(event);
        Ok(())
    }
}
