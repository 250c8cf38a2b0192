use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::SampleError;
use crate::guess::GuessEngine;
use crate::models::day::local_day;
use crate::models::{Category, CategorySource, Coordinate, EventPayload, SmartGuess, TimeSlot};
use crate::pipeline::{
    align_day_start, apply_motion_hints, collapse_mini_commutes, detect_motion_windows,
    merge_batches, MotionWindow,
};
use crate::settings::SettingsStore;
use crate::sources::{EventCollector, SourceHandle};
use crate::timeline::{DayTimeline, TimelineStore, WorkingSet};
use crate::tracking::{FixResolution, FixTracker, TrackCursor, TrackOutcome};
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A slot whose category or its provenance changed during a write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryChange {
    pub day: NaiveDate,
    pub slot_id: String,
    pub category: Category,
    pub source: CategorySource,
}

/// Counters from one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub merged_events: usize,
    pub dropped_late: usize,
    pub deduped: usize,
    pub fixes_applied: usize,
    pub fixes_discarded: usize,
    pub motion_marked: usize,
    pub collapsed: usize,
    pub days_persisted: usize,
    pub days_failed: usize,
}

/// Mutable engine state behind the single writer lock.
struct EngineCore {
    store: TimelineStore,
    collector: EventCollector,
    guesses: GuessEngine,
    cursor: Option<TrackCursor>,
}

struct PersistOutcome {
    persisted: usize,
    failed: usize,
    first_error: Option<anyhow::Error>,
}

/// The timeline engine: event intake, tracking, pipeline runs, and reads,
/// all against one persistent store.
///
/// One writer mutates the timeline at a time; every write goes through a
/// [`WorkingSet`], is persisted day-atomically, and only then committed to
/// the in-memory store. Reads snapshot committed state and never block on
/// pipeline runs beyond the core lock.
pub struct TimelineEngine {
    config: EngineConfig,
    tracker: FixTracker,
    db: Database,
    settings: SettingsStore,
    core: Mutex<EngineCore>,
    changes: broadcast::Sender<CategoryChange>,
}

impl TimelineEngine {
    /// Opens the engine over `data_dir`, warming the store with the recent
    /// day window and the guess table from disk.
    pub async fn new(config: EngineConfig, data_dir: &Path) -> Result<Self> {
        let db = Database::new(data_dir.join("dayline.db"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;

        let mut store = TimelineStore::new(config.utc_offset_secs);
        let today = local_day(Utc::now(), config.utc_offset_secs);
        let first_day = today - Duration::days(i64::from(config.hydrate_days));
        for (day, slots) in db.load_days_since(first_day).await? {
            store.hydrate_day(day, slots)?;
        }

        let mut guesses = GuessEngine::new(&config);
        guesses.hydrate(db.load_smart_guesses().await?);

        let mut collector = EventCollector::new(config.source_queue_depth);
        collector.restore_cursors(settings.source_cursors());

        let cursor = settings.cursor();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        log_info!(
            "Engine ready: {} days hydrated, {} smart guesses",
            store.days_with_slots().len(),
            guesses.len()
        );

        Ok(Self {
            tracker: FixTracker::new(config.clone()),
            config,
            db,
            settings,
            core: Mutex::new(EngineCore {
                store,
                collector,
                guesses,
                cursor,
            }),
            changes,
        })
    }

    /// Registers (or re-registers) an event source and hands back its push
    /// handle. Re-registering drops any undrained events of the old handle.
    pub async fn register_source(&self, source_id: &str) -> SourceHandle {
        let mut core = self.core.lock().await;
        core.collector.register(source_id)
    }

    /// Feeds one location fix straight into the tracker, outside the batch
    /// pipeline. The touched days are persisted and committed before the
    /// call returns.
    pub async fn handle_fix(
        &self,
        at: DateTime<Utc>,
        coordinate: Coordinate,
    ) -> Result<FixResolution> {
        if !coordinate.is_valid() {
            return Err(SampleError::MalformedLocation(format!(
                "({}, {})",
                coordinate.latitude, coordinate.longitude
            ))
            .into());
        }

        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        let mut used_guess = None;
        let mut working = WorkingSet::new(&core.store);
        let guesses = &mut core.guesses;
        let resolution = self.tracker.handle_fix(
            &mut working,
            core.cursor.as_ref(),
            at,
            coordinate,
            |coordinate: &Coordinate| {
                let category = guesses.suggest(coordinate)?;
                used_guess = guesses.touch(coordinate, &category, at);
                Some(category)
            },
        )?;

        let touched = working.touched_days();
        self.refine_days(&mut working, &touched, &[])?;

        let timelines = working.into_days();
        let outcome = self.persist_and_commit(core, timelines).await?;
        if let Some(err) = outcome.first_error {
            return Err(err.context("fix discarded: its day could not be persisted"));
        }

        if !matches!(resolution.outcome, TrackOutcome::DiscardedStale) {
            core.cursor = Some(resolution.cursor);
            self.settings.update_cursor(resolution.cursor)?;
        }

        if let Some(guess) = used_guess {
            if let Err(err) = self.db.upsert_smart_guess(guess).await {
                log_warn!("Failed to persist smart guess usage: {err:#}");
            }
        }

        Ok(resolution)
    }

    /// Drains queued events from every source and runs the full pipeline:
    /// merge, tracker replay, motion hints, mini-commute collapse, and day
    /// alignment, then persists and commits each touched day.
    ///
    /// Days persist independently; on the first storage failure the rest of
    /// the run is abandoned and the in-memory store keeps its previous state
    /// for those days, so store and disk never drift apart.
    pub async fn run_pipeline(&self) -> Result<RunSummary> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        let batches = core.collector.drain_batches();
        let late_floor = core.store.latest_slot_start().map(|start| {
            start - Duration::seconds(self.config.clock_skew_tolerance_secs as i64)
        });
        let merged = merge_batches(batches, late_floor);

        let mut summary = RunSummary {
            merged_events: merged.events.len(),
            dropped_late: merged.dropped_late,
            deduped: merged.deduped,
            ..RunSummary::default()
        };

        let mut cursor = core.cursor;
        let mut used_guesses: Vec<SmartGuess> = Vec::new();
        let mut working = WorkingSet::new(&core.store);
        {
            let guesses = &mut core.guesses;
            for event in &merged.events {
                let EventPayload::Location(reading) = &event.payload else {
                    continue;
                };
                let at = event.timestamp;
                let resolution = self.tracker.handle_fix(
                    &mut working,
                    cursor.as_ref(),
                    at,
                    reading.coordinate,
                    |coordinate: &Coordinate| {
                        let category = guesses.suggest(coordinate)?;
                        if let Some(guess) = guesses.touch(coordinate, &category, at) {
                            used_guesses.push(guess);
                        }
                        Some(category)
                    },
                )?;
                match resolution.outcome {
                    TrackOutcome::DiscardedStale => summary.fixes_discarded += 1,
                    _ => summary.fixes_applied += 1,
                }
                cursor = Some(resolution.cursor);
            }
        }

        let windows = detect_motion_windows(&merged.events, &self.config);
        let days = self.days_to_refine(core, &working, &windows);
        let (collapsed, marked) = self.refine_days(&mut working, &days, &windows)?;
        summary.collapsed = collapsed;
        summary.motion_marked = marked;

        let timelines = working.into_days();
        let outcome = self.persist_and_commit(core, timelines).await?;
        summary.days_persisted = outcome.persisted;
        summary.days_failed = outcome.failed;

        if outcome.failed == 0 {
            core.cursor = cursor;
        }
        let source_cursors = core.collector.cursors().clone();
        self.settings.update_tracking(core.cursor, source_cursors)?;

        for guess in used_guesses {
            if let Err(err) = self.db.upsert_smart_guess(guess).await {
                log_warn!("Failed to persist smart guess usage: {err:#}");
            }
        }

        log_info!(
            "Pipeline run: {} events in, {} fixes applied, {} days persisted, {} failed",
            summary.merged_events,
            summary.fixes_applied,
            summary.days_persisted,
            summary.days_failed
        );

        Ok(summary)
    }

    /// A day's slots: the committed in-memory copy when the day is warm,
    /// otherwise straight from storage.
    pub async fn slots_for_day(&self, day: NaiveDate) -> Result<Vec<TimeSlot>> {
        {
            let core = self.core.lock().await;
            if let Some(timeline) = core.store.day_timeline(day) {
                return Ok(timeline.slots().to_vec());
            }
        }
        self.db.slots_for_day(day).await
    }

    /// Applies a user's category choice to a slot and teaches the guess
    /// engine when the slot has a location anchor.
    pub async fn confirm_category(
        &self,
        day: NaiveDate,
        slot_id: &str,
        category: Category,
        now: DateTime<Utc>,
    ) -> Result<TimeSlot> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        if core.store.day_timeline(day).is_none() {
            let slots = self.db.slots_for_day(day).await?;
            if !slots.is_empty() {
                core.store.hydrate_day(day, slots)?;
            }
        }

        let mut working = WorkingSet::new(&core.store);
        let updated =
            working
                .day_mut(day)
                .update_category(slot_id, category, CategorySource::UserConfirmed)?;

        let timelines = working.into_days();
        let outcome = self.persist_and_commit(core, timelines).await?;
        if let Some(err) = outcome.first_error {
            return Err(err.context("category confirmation could not be persisted"));
        }

        if let Some(anchor) = updated.anchor {
            let guess = core.guesses.learn(&anchor, updated.category.clone(), now);
            if let Err(err) = self.db.upsert_smart_guess(guess).await {
                log_warn!("Failed to persist learned guess: {err:#}");
            }
        }

        Ok(updated)
    }

    /// Forgets guesses not used since `older_than`. Purging nothing is a
    /// successful no-op.
    pub async fn purge_smart_guesses(
        &self,
        older_than: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut guard = self.core.lock().await;
        let removed = guard.guesses.purge(older_than);
        if !removed.is_empty() {
            self.db.delete_smart_guesses(removed.clone()).await?;
        }
        self.settings.record_guess_purge(now)?;
        Ok(removed.len())
    }

    /// Category changes as they commit; late subscribers miss earlier ones.
    pub fn subscribe(&self) -> broadcast::Receiver<CategoryChange> {
        self.changes.subscribe()
    }

    /// Days the post-tracking stages should revisit: everything the working
    /// set touched, plus materialized days a motion window overlaps.
    fn days_to_refine(
        &self,
        core: &EngineCore,
        working: &WorkingSet<'_>,
        windows: &[MotionWindow],
    ) -> Vec<NaiveDate> {
        let offset = self.config.utc_offset_secs;
        let mut days: BTreeSet<NaiveDate> = working.touched_days().into_iter().collect();
        for window in windows {
            let mut day = local_day(window.start, offset);
            let last = local_day(window.end, offset);
            loop {
                if core.store.day_timeline(day).is_some() {
                    days.insert(day);
                }
                if day >= last {
                    break;
                }
                let Some(next) = day.succ_opt() else { break };
                day = next;
            }
        }
        days.into_iter().collect()
    }

    /// Runs motion hints, mini-commute collapse, and midnight alignment over
    /// each listed day of the working set. Returns (collapsed, marked).
    fn refine_days(
        &self,
        working: &mut WorkingSet<'_>,
        days: &[NaiveDate],
        windows: &[MotionWindow],
    ) -> Result<(usize, usize)> {
        let offset = self.config.utc_offset_secs;
        let mut collapsed_total = 0;
        let mut marked_total = 0;
        for &day in days {
            let timeline = working.day_mut(day);
            let mut slots = timeline.slots().to_vec();
            let mut marked = 0;
            if !windows.is_empty() {
                let motion = apply_motion_hints(slots, windows);
                slots = motion.slots;
                marked = motion.marked;
            }
            let collapsed = collapse_mini_commutes(slots, &self.config);
            let aligned = align_day_start(day, offset, collapsed.slots);
            *timeline = DayTimeline::from_slots(day, offset, aligned.slots)?;
            collapsed_total += collapsed.removed;
            marked_total += marked;
        }
        Ok((collapsed_total, marked_total))
    }

    /// Persists each changed day, then commits it to the store and emits its
    /// category changes. Stops at the first storage failure so the store
    /// never gets ahead of disk; unchanged days are skipped.
    async fn persist_and_commit(
        &self,
        core: &mut EngineCore,
        timelines: Vec<DayTimeline>,
    ) -> Result<PersistOutcome> {
        let mut outcome = PersistOutcome {
            persisted: 0,
            failed: 0,
            first_error: None,
        };
        let total = timelines.len();
        for (index, timeline) in timelines.into_iter().enumerate() {
            let day = timeline.day();
            let before = core.store.slots_for_day(day);
            if before.as_slice() == timeline.slots() {
                continue;
            }
            match self
                .db
                .replace_day_slots(day, timeline.slots().to_vec())
                .await
            {
                Ok(()) => {
                    let changes = category_changes(day, &before, timeline.slots());
                    core.store.commit_day(timeline)?;
                    for change in changes {
                        let _ = self.changes.send(change);
                    }
                    outcome.persisted += 1;
                }
                Err(err) => {
                    log_error!("Failed to persist day {day}: {err:#}");
                    outcome.failed = total - index;
                    outcome.first_error = Some(err);
                    break;
                }
            }
        }
        Ok(outcome)
    }
}

/// Slots whose category or source moved, plus new slots opened on a smart
/// guess (those want a confirmation prompt downstream).
fn category_changes(
    day: NaiveDate,
    before: &[TimeSlot],
    after: &[TimeSlot],
) -> Vec<CategoryChange> {
    let previous: HashMap<&str, (&Category, CategorySource)> = before
        .iter()
        .map(|slot| (slot.id.as_str(), (&slot.category, slot.source)))
        .collect();

    after
        .iter()
        .filter_map(|slot| {
            let changed = match previous.get(slot.id.as_str()) {
                Some((category, source)) => **category != slot.category || *source != slot.source,
                None => slot.source == CategorySource::SmartGuess,
            };
            if !changed {
                return None;
            }
            Some(CategoryChange {
                day,
                slot_id: slot.id.clone(),
                category: slot.category.clone(),
                source: slot.source,
            })
        })
        .collect()
}
