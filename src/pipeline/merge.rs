use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::TrackEvent;

/// Events collected from one source since the last pipeline run, in the
/// order the source delivered them (each source is individually
/// time-ordered). Ephemeral: consumed by the merge stage, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineBatch {
    pub source_id: String,
    pub events: Vec<TrackEvent>,
}

impl PipelineBatch {
    pub fn new(source_id: impl Into<String>, events: Vec<TrackEvent>) -> Self {
        Self {
            source_id: source_id.into(),
            events,
        }
    }
}

/// Merged sequence plus the skip counters the run report carries.
#[derive(Debug, Default, PartialEq)]
pub struct MergeOutcome {
    pub events: Vec<TrackEvent>,
    pub dropped_late: usize,
    pub deduped: usize,
}

/// K-way merges per-source batches into one time-ordered sequence.
///
/// Ties on timestamp resolve by source id, so the result does not depend on
/// the order batches arrive in. Exact (timestamp, kind, source) duplicates
/// keep their first occurrence. Events older than `late_floor` are dropped
/// and counted; they arrived after their day was already persisted.
pub fn merge_batches(
    mut batches: Vec<PipelineBatch>,
    late_floor: Option<DateTime<Utc>>,
) -> MergeOutcome {
    batches.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    let mut outcome = MergeOutcome::default();
    let mut seen: HashSet<(DateTime<Utc>, &'static str, String)> = HashSet::new();

    // Heap of (timestamp, batch index) over each batch's next event.
    let mut heap = BinaryHeap::new();
    let mut positions = vec![0usize; batches.len()];
    for (index, batch) in batches.iter().enumerate() {
        if let Some(event) = batch.events.first() {
            heap.push(Reverse((event.timestamp, index)));
        }
    }

    while let Some(Reverse((_, index))) = heap.pop() {
        let position = positions[index];
        let event = batches[index].events[position].clone();
        positions[index] += 1;
        if let Some(next) = batches[index].events.get(positions[index]) {
            heap.push(Reverse((next.timestamp, index)));
        }

        if let Some(floor) = late_floor {
            if event.timestamp < floor {
                outcome.dropped_late += 1;
                continue;
            }
        }

        let key = (
            event.timestamp,
            event.payload.kind_tag(),
            event.source_id.clone(),
        );
        if !seen.insert(key) {
            outcome.deduped += 1;
            continue;
        }

        outcome.events.push(event);
    }

    outcome
}
