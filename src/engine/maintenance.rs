use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::Rules;
use crate::limits::*;
use crate::model::*;

use super::error::Rejection;
use super::gap::compute_gap_blocks;
use super::{Engine, EngineError, WalCommand};

/// Inclusive range of civil dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, Rejection> {
        if end < start {
            return Err(Rejection::InvalidRange);
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn len_days(self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeOptions {
    /// Horizon length override; `None` uses `advance_booking_days`.
    pub days: Option<u32>,
    /// Compute and report without writing anything.
    pub dry_run: bool,
    /// Delete every auto block on every stored date before regenerating,
    /// including dates outside the range.
    pub clear_all: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    pub dates_processed: u32,
    /// (date, bucket) pairs whose auto blocks changed.
    pub buckets_changed: u32,
    pub blocks_written: u32,
    pub blocks_removed: u32,
    /// Auto blocks deleted up front by `clear_all`.
    pub blocks_cleared: u32,
    /// Resume point: the last date fully processed.
    pub last_date: Option<NaiveDate>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct BucketOutcome {
    written: u32,
    removed: u32,
}

impl Engine {
    /// Recompute auto gap blocks for one (date, bucket) and replace the
    /// stored set when it differs.
    pub(super) async fn recompute_bucket(
        &self,
        rules: &Rules,
        date: NaiveDate,
        bucket: ResourceSelector,
    ) -> Result<(), EngineError> {
        let mut day = self.day_write(date).await;
        let outcome = self.recompute_locked(rules, &mut day, bucket, false).await?;
        if outcome.written + outcome.removed > 0 {
            debug!(
                "gap blocks {date}/{bucket}: {} written, {} removed",
                outcome.written, outcome.removed
            );
        }
        Ok(())
    }

    /// Caller holds the day's write lock.
    async fn recompute_locked(
        &self,
        rules: &Rules,
        day: &mut DayState,
        bucket: ResourceSelector,
        dry_run: bool,
    ) -> Result<BucketOutcome, EngineError> {
        let entry = rules.calendar.entry_for(day.date);
        let fresh = compute_gap_blocks(day.date, bucket, &entry, &rules.policy, &day.appointments);

        // Both sides are ordered by start, and auto blocks of one bucket never overlap.
        let unchanged = day
            .auto_blocks(bucket)
            .map(GapBlock::placement)
            .eq(fresh.iter().map(GapBlock::placement));
        if unchanged {
            return Ok(BucketOutcome::default());
        }

        let outcome = BucketOutcome {
            written: fresh.len() as u32,
            removed: day.auto_blocks(bucket).count() as u32,
        };
        if !dry_run {
            let event = Event::AutoBlocksReplaced {
                date: day.date,
                resource: bucket,
                blocks: fresh,
            };
            self.persist_and_apply(Some(bucket), day, &event).await?;
            metrics::counter!(crate::observability::GAP_BLOCKS_WRITTEN_TOTAL).increment(u64::from(outcome.written));
        }
        Ok(outcome)
    }

    /// Buckets to recompute on a stored date: `Any`, every active resource,
    /// and any bucket still holding auto blocks (so deactivated resources get
    /// cleaned up).
    fn buckets_for(&self, day: &DayState) -> BTreeSet<ResourceSelector> {
        let mut buckets = BTreeSet::from([ResourceSelector::Any]);
        buckets.extend(
            self.store
                .resources()
                .into_iter()
                .filter(|r| r.active)
                .map(|r| ResourceSelector::Specific(r.id)),
        );
        buckets.extend(day.gap_blocks.iter().filter(|b| b.auto_generated).map(|b| b.resource));
        buckets
    }

    /// Drop the auto blocks of every bucket on every stored date.
    async fn clear_auto_blocks(&self, dry_run: bool) -> Result<u32, EngineError> {
        let mut cleared = 0;
        for date in self.store.day_dates() {
            let mut day = self.day_write(date).await;
            let buckets: BTreeSet<ResourceSelector> = day
                .gap_blocks
                .iter()
                .filter(|b| b.auto_generated)
                .map(|b| b.resource)
                .collect();
            for bucket in buckets {
                cleared += day.auto_blocks(bucket).count() as u32;
                if !dry_run {
                    let event = Event::AutoBlocksReplaced {
                        date,
                        resource: bucket,
                        blocks: Vec::new(),
                    };
                    self.persist_and_apply(Some(bucket), &mut day, &event).await?;
                }
            }
            tokio::task::yield_now().await;
        }
        Ok(cleared)
    }

    /// Recompute auto gap blocks over `range`, one date lock at a time.
    /// `bucket: None` covers every bucket. Dates with no stored state have
    /// nothing to block and are counted as processed.
    pub async fn recompute_gap_blocks(
        &self,
        rules: &Rules,
        range: DateRange,
        bucket: Option<ResourceSelector>,
        options: RecomputeOptions,
    ) -> Result<RecomputeReport, EngineError> {
        if range.len_days() > i64::from(MAX_RECOMPUTE_DAYS) {
            return Err(EngineError::LimitExceeded("recompute range too long"));
        }
        let started = Instant::now();
        let mut report = RecomputeReport {
            dry_run: options.dry_run,
            ..RecomputeReport::default()
        };
        if options.clear_all {
            report.blocks_cleared = self.clear_auto_blocks(options.dry_run).await?;
        }

        for date in range.days() {
            if self.store.get_day(date).is_some() {
                let mut day = self.day_write(date).await;
                let buckets = match bucket {
                    Some(b) => BTreeSet::from([b]),
                    None => self.buckets_for(&day),
                };
                for b in buckets {
                    let outcome = self.recompute_locked(rules, &mut day, b, options.dry_run).await?;
                    if outcome.written + outcome.removed > 0 {
                        report.buckets_changed += 1;
                        report.blocks_written += outcome.written;
                        report.blocks_removed += outcome.removed;
                    }
                }
            }
            report.dates_processed += 1;
            report.last_date = Some(date);
            tokio::task::yield_now().await;
        }

        metrics::histogram!(crate::observability::GAP_RECOMPUTE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        info!(
            "gap-block recompute {}..={}: {} dates, {} buckets changed, {} written, {} removed, {} cleared{}",
            range.start,
            range.end,
            report.dates_processed,
            report.buckets_changed,
            report.blocks_written,
            report.blocks_removed,
            report.blocks_cleared,
            if options.dry_run { " (dry run)" } else { "" }
        );
        Ok(report)
    }

    /// Recompute from today through the booking horizon (or `options.days`).
    pub async fn recompute_horizon(
        &self,
        rules: &Rules,
        options: RecomputeOptions,
    ) -> Result<RecomputeReport, EngineError> {
        let today = self.today();
        let days = options.days.unwrap_or(rules.policy.advance_booking_days);
        let end = today
            .checked_add_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MAX);
        self.recompute_gap_blocks(rules, DateRange { start: today, end }, None, options)
            .await
    }

    // ── WAL compaction ───────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // No mutation can commit while this is held.
        let _gate = self.commit_gate.write().await;

        let mut events = Vec::new();
        for r in self.store.resources() {
            events.push(Event::ResourceRegistered {
                id: r.id,
                name: r.name,
                active: r.active,
            });
        }
        for s in self.store.services() {
            events.push(Event::ServiceRegistered {
                id: s.id,
                name: s.name,
                duration_minutes: s.duration_minutes,
                active: s.active,
            });
        }

        for date in self.store.day_dates() {
            let Some(day) = self.store.get_day(date) else {
                continue;
            };
            let guard = day.read().await;
            if guard.is_empty() {
                continue;
            }
            for appointment in &guard.appointments {
                events.push(Event::AppointmentBooked {
                    appointment: appointment.clone(),
                });
            }
            for blackout in &guard.blackouts {
                events.push(Event::BlackoutAdded {
                    blackout: blackout.clone(),
                });
            }
            let mut auto: BTreeMap<ResourceSelector, Vec<GapBlock>> = BTreeMap::new();
            for block in &guard.gap_blocks {
                if block.auto_generated {
                    auto.entry(block.resource).or_default().push(block.clone());
                } else {
                    events.push(Event::ManualBlockAdded { block: block.clone() });
                }
            }
            for (resource, blocks) in auto {
                events.push(Event::AutoBlocksReplaced { date, resource, blocks });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
