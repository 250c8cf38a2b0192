use chrono::Duration;

use crate::config::EngineConfig;
use crate::models::{Category, CategorySource, TimeSlot};

/// Result of the mini-commute collapse: the day's slots and how many
/// commute slivers were removed.
#[derive(Debug, PartialEq)]
pub struct CollapseResult {
    pub slots: Vec<TimeSlot>,
    pub removed: usize,
}

/// Detects A→commute→A patterns where the commute is shorter than the
/// threshold and both flanks share a non-commute category, then merges the
/// flanks into one slot. Repeats until no pattern is left; a merge can
/// expose a new eligible pattern around the merged slot.
///
/// The merged slot keeps the earlier flank's identity and anchor, spans to
/// the later flank's end (staying open when the later flank was open), and
/// keeps a user confirmation when either flank carried one. Confirmed
/// commute slots are never removed, however short.
pub fn collapse_mini_commutes(mut slots: Vec<TimeSlot>, config: &EngineConfig) -> CollapseResult {
    let threshold = Duration::seconds(config.short_commute_max_secs as i64);
    let mut removed = 0;

    // Keep collapsing until a pass changes nothing.
    loop {
        let mut collapsed = false;
        let mut result = Vec::new();
        let mut i = 0;

        while i < slots.len() {
            if i + 2 < slots.len() {
                let a = &slots[i];
                let b = &slots[i + 1];
                let c = &slots[i + 2];

                if is_mini_commute(b, threshold)
                    && a.category == c.category
                    && a.category != Category::Commute
                {
                    let mut merged = a.clone();
                    merged.end_time = c.end_time;
                    if c.source == CategorySource::UserConfirmed {
                        merged.source = CategorySource::UserConfirmed;
                    }

                    result.push(merged);
                    removed += 1;
                    i += 3;
                    collapsed = true;
                    continue;
                }
            }

            result.push(slots[i].clone());
            i += 1;
        }

        slots = result;

        if !collapsed {
            break;
        }
    }

    CollapseResult { slots, removed }
}

fn is_mini_commute(slot: &TimeSlot, threshold: Duration) -> bool {
    slot.category == Category::Commute
        && slot.source != CategorySource::UserConfirmed
        && slot
            .duration()
            .map(|length| length < threshold)
            .unwrap_or(false)
}
