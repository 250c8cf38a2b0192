use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::EngineConfig;
use crate::models::{BiometricKind, Category, CategorySource, EventPayload, TimeSlot, TrackEvent};

/// A stretch of sustained movement derived from biometric distance samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MotionWindow {
    fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// Scans the merged event sequence for windows of sustained walking or
/// running pace.
///
/// A distance sample's value is the meters covered since the same source's
/// previous sample; the hop counts as movement when the samples are close
/// enough together and the implied pace clears `motion_min_pace`. Maximal
/// runs of such hops become windows, kept when they span at least
/// `motion_min_span_secs`.
pub fn detect_motion_windows(events: &[TrackEvent], config: &EngineConfig) -> Vec<MotionWindow> {
    let max_gap = Duration::seconds(config.motion_max_sample_gap_secs as i64);
    let min_span = Duration::seconds(config.motion_min_span_secs as i64);

    let mut per_source: BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
    for event in events {
        if let EventPayload::Biometric(reading) = &event.payload {
            if reading.kind == BiometricKind::DistanceWalkingRunning {
                per_source
                    .entry(event.source_id.as_str())
                    .or_default()
                    .push((event.timestamp, reading.value));
            }
        }
    }

    let mut windows = Vec::new();
    for samples in per_source.values() {
        let mut current: Option<MotionWindow> = None;
        for pair in samples.windows(2) {
            let (previous_at, _) = pair[0];
            let (at, meters) = pair[1];
            let gap = at - previous_at;
            let fast = gap > Duration::zero()
                && gap <= max_gap
                && meters / gap.num_seconds() as f64 >= config.motion_min_pace;

            if fast {
                current = Some(match current {
                    Some(window) => MotionWindow {
                        start: window.start,
                        end: at,
                    },
                    None => MotionWindow {
                        start: previous_at,
                        end: at,
                    },
                });
            } else if let Some(window) = current.take() {
                if window.span() >= min_span {
                    windows.push(window);
                }
            }
        }
        if let Some(window) = current {
            if window.span() >= min_span {
                windows.push(window);
            }
        }
    }

    windows.sort_by_key(|window| window.start);
    windows
}

/// Day slots after motion hints, plus how many slots were marked.
#[derive(Debug, PartialEq)]
pub struct MotionApplyResult {
    pub slots: Vec<TimeSlot>,
    pub marked: usize,
}

/// Marks closed Unknown slots as commutes when motion windows cover at
/// least half of them.
///
/// Only automatically categorized slots are touched; smart guesses, user
/// confirmations, and the open slot stay as they are.
pub fn apply_motion_hints(slots: Vec<TimeSlot>, windows: &[MotionWindow]) -> MotionApplyResult {
    let mut marked = 0;
    let slots = slots
        .into_iter()
        .map(|mut slot| {
            let Some(end) = slot.end_time else {
                return slot;
            };
            if slot.category != Category::Unknown || slot.source != CategorySource::Automatic {
                return slot;
            }

            let covered = windows.iter().fold(Duration::zero(), |acc, window| {
                let overlap_start = slot.start_time.max(window.start);
                let overlap_end = end.min(window.end);
                acc + (overlap_end - overlap_start).max(Duration::zero())
            });

            if covered * 2 >= end - slot.start_time {
                slot.category = Category::Commute;
                marked += 1;
            }
            slot
        })
        .collect();

    MotionApplyResult { slots, marked }
}
