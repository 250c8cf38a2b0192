use chrono::NaiveDate;

use crate::models::day::day_start;
use crate::models::{Category, CategorySource, TimeSlot};

/// Day's slots after alignment, with a flag telling whether a leading slot
/// was inserted.
#[derive(Debug, PartialEq)]
pub struct AlignResult {
    pub slots: Vec<TimeSlot>,
    pub inserted: bool,
}

/// Guarantees the first slot of a non-empty day starts at local midnight.
///
/// When the earliest slot starts later, an Unknown slot covering
/// `[midnight, first.start)` is prepended. Empty days are left empty, and a
/// day already starting at midnight passes through untouched, so the stage
/// is idempotent.
pub fn align_day_start(day: NaiveDate, utc_offset_secs: i32, slots: Vec<TimeSlot>) -> AlignResult {
    let Some(first) = slots.first() else {
        return AlignResult {
            slots,
            inserted: false,
        };
    };

    let midnight = day_start(day, utc_offset_secs);
    if first.start_time <= midnight {
        return AlignResult {
            slots,
            inserted: false,
        };
    }

    let lead_in = TimeSlot::closed(
        day,
        midnight,
        first.start_time,
        Category::Unknown,
        CategorySource::Automatic,
        None,
    );
    let mut aligned = Vec::with_capacity(slots.len() + 1);
    aligned.push(lead_in);
    aligned.extend(slots);
    AlignResult {
        slots: aligned,
        inserted: true,
    }
}
