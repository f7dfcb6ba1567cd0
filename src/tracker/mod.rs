//! Event-logging and aggregation engine.
//!
//! Every public operation runs inside the store's critical section:
//! 1. load and decode the persisted partitions
//! 2. roll the logical day forward if the clock moved past it
//! 3. apply the operation
//! 4. write the rollover and operation writes as one batch
//!
//! Reads go through the same path because a read may be the first call of a
//! new day and therefore owe a rollover.

mod events;
mod history;
mod rollover;
mod state;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use chrono::{NaiveDate, NaiveDateTime};

pub use history::DayRecord;
pub use rollover::DayStatus;
pub use state::EngineState;

use crate::{
    analytics::{self, RangeSummary},
    error::{TrackerError, TrackerResult},
    snapshot::{ImportSummary, Snapshot},
    store::{PersistentStore, WriteBatch},
    traits::Clock,
};

/// Largest range accepted by [`Tracker::range_buckets`], about a century.
pub const MAX_RANGE_DAYS: u32 = 36_600;

/// Handle onto the tracker state held by a [`PersistentStore`].
///
/// Cloning is cheap and clones share the store, so a foreground flow and a
/// background refresh flow can each hold one and stay serialized.
pub struct Tracker<S, C> {
    store: Arc<S>,
    clock: C,
    skipped: Arc<AtomicUsize>,
}

impl<S, C: Clone> Clone for Tracker<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: self.clock.clone(),
            skipped: Arc::clone(&self.skipped),
        }
    }
}

impl<S: PersistentStore, C: Clock> Tracker<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self::with_shared_store(Arc::new(store), clock)
    }

    pub fn with_shared_store(store: Arc<S>, clock: C) -> Self {
        Self {
            store,
            clock,
            skipped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Malformed persisted entries skipped by the most recent load.
    pub fn skipped_entries(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Run `op` against freshly loaded, rolled-over state and persist its
    /// writes together with the rollover writes.
    fn session<R>(
        &self,
        op: impl FnOnce(&mut EngineState, NaiveDateTime) -> (R, WriteBatch),
    ) -> TrackerResult<R> {
        let _guard = self.store.exclusive()?;

        let raw = self.store.load()?;
        let (mut state, skipped) = EngineState::decode(&raw);
        self.skipped.store(skipped, Ordering::Relaxed);

        let now = self.clock.now();
        let (status, mut batch) = state.roll_over(now.date());
        match status {
            DayStatus::Current => {}
            DayStatus::RolledOver {
                archived: Some((day, count)),
            } => {
                tracing::info!("New day {}: archived {} events for {}", now.date(), count, day);
            }
            DayStatus::RolledOver { archived: None } => {
                tracing::info!("New day {}: nothing to archive", now.date());
            }
            DayStatus::AheadOfClock { stored } => {
                tracing::warn!(
                    "Stored day {} is ahead of the clock ({}); keeping the stored day",
                    stored,
                    now.date()
                );
            }
        }

        let (result, writes) = op(&mut state, now);
        batch.append(writes);

        if !batch.is_empty() {
            self.store.apply(&batch)?;
        }

        Ok(result)
    }

    /// Read-only view of the rolled-over state.
    fn read<R>(&self, view: impl FnOnce(&EngineState, NaiveDateTime) -> R) -> TrackerResult<R> {
        self.session(|state, now| (view(state, now), WriteBatch::new()))
    }

    /// Archive the previous day if the clock has moved past it.
    pub fn ensure_current_day(&self) -> TrackerResult<()> {
        self.read(|_, _| ())
    }

    /// Log an event at the current time.
    pub fn log_event(&self) -> TrackerResult<NaiveDateTime> {
        let event = self.session(|state, now| (now, state.log(now)))?;
        tracing::info!("Logged event at {}", event.format("%H:%M:%S"));
        Ok(event)
    }

    /// Undo the latest event of today. Returns the last event time afterwards,
    /// which is kept even when no events remain.
    pub fn remove_last_event(&self) -> TrackerResult<Option<NaiveDateTime>> {
        self.session(|state, now| {
            let (removed, batch) = state.remove_latest(now.date());
            match removed {
                Some(event) => tracing::info!("Removed event at {}", event.format("%H:%M:%S")),
                None => tracing::debug!("No events today to remove"),
            }
            (state.last_event_time, batch)
        })
    }

    /// Remove the first event of today equal to `target`. Returns whether an
    /// event was removed.
    pub fn remove_event(&self, target: NaiveDateTime) -> TrackerResult<bool> {
        self.session(|state, now| {
            let (removed, batch) = state.remove_matching(target, now.date());
            if removed {
                tracing::info!("Removed event at {}", target);
            } else {
                tracing::debug!("No event at {} to remove", target);
            }
            (removed, batch)
        })
    }

    pub fn today_count(&self) -> TrackerResult<u32> {
        self.read(|state, _| state.today_count)
    }

    pub fn last_event_time(&self) -> TrackerResult<Option<NaiveDateTime>> {
        self.read(|state, _| state.last_event_time)
    }

    /// Today's events in logging order.
    pub fn list_today(&self) -> TrackerResult<Vec<NaiveDateTime>> {
        self.read(|state, _| state.today_events.clone())
    }

    pub fn history_all(&self) -> TrackerResult<Vec<DayRecord>> {
        self.read(|state, _| state.history_all())
    }

    pub fn history_in_range(&self, start: NaiveDate, end: NaiveDate) -> TrackerResult<Vec<DayRecord>> {
        self.read(|state, _| state.history_in_range(start, end))
    }

    /// Dense per-day counts for the last `days` days, oldest first.
    pub fn range_buckets(&self, days: u32) -> TrackerResult<Vec<DayRecord>> {
        if days > MAX_RANGE_DAYS {
            return Err(TrackerError::Range(format!(
                "{} days requested, at most {} supported",
                days, MAX_RANGE_DAYS
            )));
        }
        self.read(|state, now| state.range_buckets(now.date(), days))
    }

    /// Minutes between today's consecutive events.
    pub fn intervals_today(&self) -> TrackerResult<Vec<i64>> {
        self.read(|state, _| analytics::intervals_minutes(&state.today_events))
    }

    /// Totals, average and extremes over the last `days` days.
    pub fn range_summary(&self, days: u32) -> TrackerResult<RangeSummary> {
        let buckets = self.range_buckets(days)?;
        Ok(RangeSummary::from_buckets(&buckets))
    }

    pub fn export_snapshot(&self) -> TrackerResult<Snapshot> {
        self.read(|state, _| Snapshot::capture(state))
    }

    /// Replace the whole state with `snapshot`.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> TrackerResult<ImportSummary> {
        let summary = self.session(|state, now| {
            let (restored, batch, summary) = snapshot.restore(now.date());
            *state = restored;
            (summary, batch)
        })?;
        tracing::info!(
            "Imported {} days of history and {} events for today",
            summary.days,
            summary.events
        );
        Ok(summary)
    }

    /// Validate `json` as a snapshot and import it. Nothing is written when
    /// validation fails.
    pub fn import_json(&self, json: &str) -> TrackerResult<ImportSummary> {
        let snapshot = Snapshot::from_json(json).inspect_err(|e| {
            tracing::warn!("Rejected snapshot: {}", e);
        })?;
        self.import_snapshot(&snapshot)
    }

    /// Wipe all persisted state.
    pub fn reset(&self) -> TrackerResult<()> {
        let _guard = self.store.exclusive()?;
        self.store.clear()?;
        self.skipped.store(0, Ordering::Relaxed);
        tracing::info!("Cleared all tracker state");
        Ok(())
    }
}
