use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::TimelineError;
use crate::models::day::{local_day, next_day_start};
use crate::models::{Category, CategorySource, Coordinate, TimeSlot};
use crate::timeline::WorkingSet;

/// Where tracking left off: the last accepted fix.
///
/// Persisted by the caller between steps; there is no ambient cursor state
/// inside the tracker itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCursor {
    pub last_fix_at: DateTime<Utc>,
    pub last_coordinate: Option<Coordinate>,
}

/// What a tracking step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// First fix ever: the cursor is armed, no slot is touched.
    Bootstrapped,
    /// Fix at or before the cursor, dropped.
    DiscardedStale,
    /// Continuous presence, cursor advanced.
    Extended,
    /// Medium gap: the open slot became a commute in place.
    Reclassified,
    /// Long gap: the open slot was sealed and a new one opened at the fix.
    Split {
        /// Unknown filler slots created to cover the silent stretch.
        fillers: usize,
    },
}

impl TrackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackOutcome::Bootstrapped => "bootstrapped",
            TrackOutcome::DiscardedStale => "discardedStale",
            TrackOutcome::Extended => "extended",
            TrackOutcome::Reclassified => "reclassified",
            TrackOutcome::Split { .. } => "split",
        }
    }
}

/// Result of one tracking step: the outcome plus the cursor to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct FixResolution {
    pub outcome: TrackOutcome,
    pub cursor: TrackCursor,
    /// True when the open slot was carried across local midnight.
    pub rolled_over: bool,
}

/// The online gap state machine.
///
/// One call per accepted location fix, mutating a [`WorkingSet`] the caller
/// later commits. Gap thresholds come from [`EngineConfig`]: below
/// `short_gap_secs` presence is continuous, between the thresholds the open
/// slot turns into a commute in place, at or above `long_gap_secs` the slot
/// is sealed at the previous fix and a fresh slot opens at the new one.
///
/// Steps maintain two cross-call invariants: after any step that leaves an
/// open slot, the cursor lies inside that slot's day at or after its start,
/// and no produced slot ever crosses local midnight (extends roll the slot
/// over instead, splits cover multi-day silence with whole-day fillers).
pub struct FixTracker {
    config: EngineConfig,
}

impl FixTracker {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// One tracking step for the fix at `at`.
    ///
    /// `suggest` is consulted whenever a new slot opens; a returned category
    /// is applied with source `SmartGuess`.
    pub fn handle_fix(
        &self,
        working: &mut WorkingSet<'_>,
        cursor: Option<&TrackCursor>,
        at: DateTime<Utc>,
        coordinate: Coordinate,
        mut suggest: impl FnMut(&Coordinate) -> Option<Category>,
    ) -> Result<FixResolution, TimelineError> {
        let Some(cursor) = cursor else {
            return Ok(FixResolution {
                outcome: TrackOutcome::Bootstrapped,
                cursor: TrackCursor {
                    last_fix_at: at,
                    last_coordinate: Some(coordinate),
                },
                rolled_over: false,
            });
        };

        if at <= cursor.last_fix_at {
            return Ok(FixResolution {
                outcome: TrackOutcome::DiscardedStale,
                cursor: *cursor,
                rolled_over: false,
            });
        }

        let advanced = TrackCursor {
            last_fix_at: at,
            last_coordinate: Some(coordinate),
        };

        let Some(open) = working.open_slot() else {
            // Nothing is running (fresh store or all days sealed); any
            // accepted fix starts a new slot.
            let fillers = self.open_after_seal(working, at, coordinate, &mut suggest)?;
            return Ok(FixResolution {
                outcome: TrackOutcome::Split { fillers },
                cursor: advanced,
                rolled_over: false,
            });
        };

        let gap = at - cursor.last_fix_at;

        if gap < Duration::seconds(self.config.short_gap_secs as i64) {
            let rolled_over = self.roll_over_midnights(working, &open, at)?;
            return Ok(FixResolution {
                outcome: TrackOutcome::Extended,
                cursor: advanced,
                rolled_over,
            });
        }

        if gap < Duration::seconds(self.config.long_gap_secs as i64) {
            let rolled_over = self.roll_over_midnights(working, &open, at)?;
            let open = match working.open_slot() {
                Some(slot) => slot,
                None => open,
            };
            if open.source != CategorySource::Automatic {
                return Ok(FixResolution {
                    outcome: TrackOutcome::Extended,
                    cursor: advanced,
                    rolled_over,
                });
            }
            working.day_mut(open.day).update_category(
                &open.id,
                Category::Commute,
                CategorySource::Automatic,
            )?;
            return Ok(FixResolution {
                outcome: TrackOutcome::Reclassified,
                cursor: advanced,
                rolled_over,
            });
        }

        let fillers = self.split(working, &open, cursor, at, coordinate, &mut suggest)?;
        Ok(FixResolution {
            outcome: TrackOutcome::Split { fillers },
            cursor: advanced,
            rolled_over: false,
        })
    }

    /// Carries the open slot across every local midnight between its day and
    /// `at`'s day, closing at each midnight and re-opening a continuation
    /// with the same category, source, and anchor.
    fn roll_over_midnights(
        &self,
        working: &mut WorkingSet<'_>,
        open: &TimeSlot,
        at: DateTime<Utc>,
    ) -> Result<bool, TimelineError> {
        let offset = self.config.utc_offset_secs;
        let target_day = local_day(at, offset);
        let mut day = open.day;
        let mut rolled = false;
        while day < target_day {
            let midnight = next_day_start(day, offset);
            working.day_mut(day).close_open_slot(midnight)?;
            let next = local_day(midnight, offset);
            let continuation = TimeSlot::open(
                next,
                midnight,
                open.category.clone(),
                open.source,
                open.anchor,
            );
            working.day_mut(next).append_slot(continuation)?;
            day = next;
            rolled = true;
        }
        Ok(rolled)
    }

    /// Long-gap transition: seal the open slot, cover the silence with
    /// Unknown fillers, open a fresh slot at the fix. Returns the filler
    /// count.
    fn split(
        &self,
        working: &mut WorkingSet<'_>,
        open: &TimeSlot,
        cursor: &TrackCursor,
        at: DateTime<Utc>,
        coordinate: Coordinate,
        suggest: &mut dyn FnMut(&Coordinate) -> Option<Category>,
    ) -> Result<usize, TimelineError> {
        let offset = self.config.utc_offset_secs;
        let fillers = if open.start_time < cursor.last_fix_at {
            working
                .day_mut(open.day)
                .close_open_slot(cursor.last_fix_at)?;
            fill_absence(working, offset, cursor.last_fix_at, at)?
        } else {
            // The slot was opened by the previous fix itself; sealing it at
            // that instant would make it empty, so it absorbs the silence
            // up to the fix (or to its day's end, with fillers beyond).
            let close_at = at.min(next_day_start(open.day, offset));
            working.day_mut(open.day).close_open_slot(close_at)?;
            fill_absence(working, offset, close_at, at)?
        };
        self.open_slot_at(working, at, coordinate, suggest)?;
        Ok(fillers)
    }

    /// Opens a slot at `at` when no open slot exists anywhere, backfilling
    /// to the target day's sealed frontier when there is one.
    fn open_after_seal(
        &self,
        working: &mut WorkingSet<'_>,
        at: DateTime<Utc>,
        coordinate: Coordinate,
        suggest: &mut dyn FnMut(&Coordinate) -> Option<Category>,
    ) -> Result<usize, TimelineError> {
        let offset = self.config.utc_offset_secs;
        let day = local_day(at, offset);
        let frontier = working
            .day(day)
            .last_slot()
            .and_then(|slot| slot.end_time)
            .filter(|end| *end < at);
        let fillers = match frontier {
            Some(end) => fill_absence(working, offset, end, at)?,
            None => 0,
        };
        self.open_slot_at(working, at, coordinate, suggest)?;
        Ok(fillers)
    }

    fn open_slot_at(
        &self,
        working: &mut WorkingSet<'_>,
        at: DateTime<Utc>,
        coordinate: Coordinate,
        suggest: &mut dyn FnMut(&Coordinate) -> Option<Category>,
    ) -> Result<(), TimelineError> {
        let day = local_day(at, self.config.utc_offset_secs);
        let (category, source) = match suggest(&coordinate) {
            Some(category) => (category, CategorySource::SmartGuess),
            None => (Category::Unknown, CategorySource::Automatic),
        };
        let slot = TimeSlot::open(day, at, category, source, Some(coordinate));
        working.day_mut(day).append_slot(slot)
    }
}

/// Covers `[from, to)` with closed Unknown slots, one per local day touched.
fn fill_absence(
    working: &mut WorkingSet<'_>,
    offset_secs: i32,
    mut from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<usize, TimelineError> {
    let mut created = 0;
    while from < to {
        let day = local_day(from, offset_secs);
        let end = to.min(next_day_start(day, offset_secs));
        let filler = TimeSlot::closed(
            day,
            from,
            end,
            Category::Unknown,
            CategorySource::Automatic,
            None,
        );
        working.day_mut(day).append_slot(filler)?;
        created += 1;
        from = end;
    }
    Ok(created)
}
