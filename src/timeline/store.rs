use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::TimelineError;
use crate::models::day::{day_start, next_day_start};
use crate::models::{Category, CategorySource, TimeSlot};

/// Ordered, validated slot sequence for one local day.
///
/// All slot mutations go through the command methods here; each command
/// either applies fully or returns a [`TimelineError`] and leaves the
/// sequence untouched. By construction a `DayTimeline` always satisfies the
/// day invariants: slots sorted and contiguous, closed slots non-empty,
/// nothing crossing local midnight, at most the final slot open.
#[derive(Debug, Clone, PartialEq)]
pub struct DayTimeline {
    day: NaiveDate,
    utc_offset_secs: i32,
    slots: Vec<TimeSlot>,
}

impl DayTimeline {
    pub fn new(day: NaiveDate, utc_offset_secs: i32) -> Self {
        Self {
            day,
            utc_offset_secs,
            slots: Vec::new(),
        }
    }

    /// Builds a timeline from an already-ordered slot sequence, validating
    /// every invariant on the way in.
    pub fn from_slots(
        day: NaiveDate,
        utc_offset_secs: i32,
        slots: Vec<TimeSlot>,
    ) -> Result<Self, TimelineError> {
        let mut timeline = Self::new(day, utc_offset_secs);
        for slot in slots {
            timeline.append_slot(slot)?;
        }
        Ok(timeline)
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn first_slot(&self) -> Option<&TimeSlot> {
        self.slots.first()
    }

    pub fn last_slot(&self) -> Option<&TimeSlot> {
        self.slots.last()
    }

    pub fn slot(&self, slot_id: &str) -> Option<&TimeSlot> {
        self.slots.iter().find(|slot| slot.id == slot_id)
    }

    /// The trailing open slot, when the day has one.
    pub fn open_slot(&self) -> Option<&TimeSlot> {
        self.slots.last().filter(|slot| slot.is_open())
    }

    fn day_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            day_start(self.day, self.utc_offset_secs),
            next_day_start(self.day, self.utc_offset_secs),
        )
    }

    /// Appends a slot at the end of the day.
    ///
    /// The slot must belong to this day, start exactly where the previous
    /// slot ended (any start inside the day is accepted for the first slot;
    /// the day-boundary stage backfills to midnight), stay inside the day,
    /// and be non-empty when closed. Only one open slot is allowed and it
    /// must be the last.
    pub fn append_slot(&mut self, slot: TimeSlot) -> Result<(), TimelineError> {
        if slot.day != self.day {
            return Err(TimelineError::WrongDay {
                slot_id: slot.id.clone(),
                day: self.day.to_string(),
            });
        }
        if self.slots.iter().any(|existing| existing.id == slot.id) {
            return Err(TimelineError::InvalidSequence(format!(
                "duplicate slot id {}",
                slot.id
            )));
        }

        let (start_of_day, end_of_day) = self.day_bounds();
        if slot.start_time < start_of_day || slot.start_time >= end_of_day {
            return Err(TimelineError::CrossesMidnight(format!(
                "start {} outside day {}",
                slot.start_time, self.day
            )));
        }
        if let Some(end) = slot.end_time {
            if end <= slot.start_time {
                return Err(TimelineError::EmptySlot(format!(
                    "[{}, {})",
                    slot.start_time, end
                )));
            }
            if end > end_of_day {
                return Err(TimelineError::CrossesMidnight(format!(
                    "end {} outside day {}",
                    end, self.day
                )));
            }
        }

        if let Some(last) = self.slots.last() {
            let Some(last_end) = last.end_time else {
                return Err(TimelineError::SecondOpenSlot);
            };
            if slot.start_time > last_end {
                return Err(TimelineError::Gap(format!(
                    "{} does not meet previous end {}",
                    slot.start_time, last_end
                )));
            }
            if slot.start_time < last_end {
                return Err(TimelineError::Overlap(format!(
                    "{} starts before previous end {}",
                    slot.start_time, last_end
                )));
            }
        }

        self.slots.push(slot);
        Ok(())
    }

    /// Closes the trailing open slot at `at` and returns the closed copy.
    pub fn close_open_slot(&mut self, at: DateTime<Utc>) -> Result<TimeSlot, TimelineError> {
        let (_, end_of_day) = self.day_bounds();
        let Some(last) = self.slots.last_mut() else {
            return Err(TimelineError::NoOpenSlot);
        };
        if !last.is_open() {
            return Err(TimelineError::NoOpenSlot);
        }
        if at <= last.start_time {
            return Err(TimelineError::CloseOutOfRange(at.to_string()));
        }
        if at > end_of_day {
            return Err(TimelineError::CrossesMidnight(format!(
                "close {} outside day {}",
                at, self.day
            )));
        }
        last.end_time = Some(at);
        Ok(last.clone())
    }

    /// Recategorizes a slot.
    ///
    /// A user-confirmed slot is immutable to automatic sources; only another
    /// user confirmation may change it.
    pub fn update_category(
        &mut self,
        slot_id: &str,
        category: Category,
        source: CategorySource,
    ) -> Result<TimeSlot, TimelineError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.id == slot_id)
            .ok_or_else(|| TimelineError::UnknownSlot(slot_id.to_string()))?;
        if slot.source == CategorySource::UserConfirmed && source != CategorySource::UserConfirmed
        {
            return Err(TimelineError::ConfirmedSlotImmutable(slot_id.to_string()));
        }
        slot.category = category;
        slot.source = source;
        Ok(slot.clone())
    }
}

/// Authoritative in-memory timeline: one validated [`DayTimeline`] per day.
///
/// Writers operate on working copies (see [`WorkingSet`]) and commit whole
/// days back after the change has been persisted; commits re-check the
/// cross-day constraints (a single open slot, and only on the latest day).
/// Reads clone slots out, so they always observe a consistent snapshot.
#[derive(Debug)]
pub struct TimelineStore {
    utc_offset_secs: i32,
    days: BTreeMap<NaiveDate, DayTimeline>,
}

impl TimelineStore {
    pub fn new(utc_offset_secs: i32) -> Self {
        Self {
            utc_offset_secs,
            days: BTreeMap::new(),
        }
    }

    pub fn utc_offset_secs(&self) -> i32 {
        self.utc_offset_secs
    }

    /// Loads one day from persistence, validating it like any other commit.
    pub fn hydrate_day(
        &mut self,
        day: NaiveDate,
        slots: Vec<TimeSlot>,
    ) -> Result<(), TimelineError> {
        let timeline = DayTimeline::from_slots(day, self.utc_offset_secs, slots)?;
        self.commit_day(timeline)
    }

    /// Snapshot of a day's slots; empty when the day has none.
    pub fn slots_for_day(&self, day: NaiveDate) -> Vec<TimeSlot> {
        self.days
            .get(&day)
            .map(|timeline| timeline.slots().to_vec())
            .unwrap_or_default()
    }

    pub fn day_timeline(&self, day: NaiveDate) -> Option<&DayTimeline> {
        self.days.get(&day)
    }

    /// Mutable working copy of a day, detached from the store.
    pub fn working_copy(&self, day: NaiveDate) -> DayTimeline {
        self.days
            .get(&day)
            .cloned()
            .unwrap_or_else(|| DayTimeline::new(day, self.utc_offset_secs))
    }

    /// Replaces one day with an already-validated timeline.
    ///
    /// Rejects commits that would leave an open slot anywhere but the
    /// chronological end of the store.
    pub fn commit_day(&mut self, timeline: DayTimeline) -> Result<(), TimelineError> {
        let day = timeline.day();
        if timeline.open_slot().is_some() {
            let later_day_has_slots = self
                .days
                .range((
                    std::ops::Bound::Excluded(day),
                    std::ops::Bound::Unbounded,
                ))
                .any(|(_, other)| !other.is_empty());
            if later_day_has_slots {
                return Err(TimelineError::InvalidSequence(format!(
                    "open slot on {day} but later days already have slots"
                )));
            }
            let other_open = self
                .days
                .iter()
                .any(|(other_day, other)| *other_day != day && other.open_slot().is_some());
            if other_open {
                return Err(TimelineError::SecondOpenSlot);
            }
        }

        if timeline.is_empty() {
            self.days.remove(&day);
        } else {
            self.days.insert(day, timeline);
        }
        Ok(())
    }

    /// The single open slot across all days, when one exists.
    pub fn open_slot(&self) -> Option<&TimeSlot> {
        self.days
            .values()
            .rev()
            .find_map(|timeline| timeline.open_slot())
    }

    /// Start of the newest slot anywhere in the store; the merge stage's
    /// late-event floor.
    pub fn latest_slot_start(&self) -> Option<DateTime<Utc>> {
        self.days
            .values()
            .rev()
            .find_map(|timeline| timeline.last_slot().map(|slot| slot.start_time))
    }

    pub fn days_with_slots(&self) -> Vec<NaiveDate> {
        self.days
            .iter()
            .filter(|(_, timeline)| !timeline.is_empty())
            .map(|(day, _)| *day)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.days.values().all(DayTimeline::is_empty)
    }
}

/// Copy-on-write view over the store for one mutation.
///
/// Writers pull per-day working copies, mutate them through the
/// [`DayTimeline`] commands, persist the touched days, then commit all of
/// them back. Abandoning a working set leaves the store untouched.
#[derive(Debug)]
pub struct WorkingSet<'a> {
    store: &'a TimelineStore,
    days: BTreeMap<NaiveDate, DayTimeline>,
}

impl<'a> WorkingSet<'a> {
    pub fn new(store: &'a TimelineStore) -> Self {
        Self {
            store,
            days: BTreeMap::new(),
        }
    }

    pub fn day_mut(&mut self, day: NaiveDate) -> &mut DayTimeline {
        self.days
            .entry(day)
            .or_insert_with(|| self.store.working_copy(day))
    }

    pub fn day(&mut self, day: NaiveDate) -> &DayTimeline {
        self.day_mut(day)
    }

    /// The open slot as this working set sees it: shadowed days first, then
    /// the underlying store.
    pub fn open_slot(&self) -> Option<TimeSlot> {
        if let Some(slot) = self
            .days
            .values()
            .rev()
            .find_map(|timeline| timeline.open_slot())
        {
            return Some(slot.clone());
        }
        self.store.open_slot().and_then(|slot| {
            if self.days.contains_key(&slot.day) {
                // Shadowed day no longer has it open.
                None
            } else {
                Some(slot.clone())
            }
        })
    }

    pub fn touched_days(&self) -> Vec<NaiveDate> {
        self.days.keys().copied().collect()
    }

    pub fn into_days(self) -> Vec<DayTimeline> {
        self.days.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, hour, minute, 0).unwrap()
    }

    fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeSlot {
        TimeSlot::closed(
            day(),
            start,
            end,
            Category::Unknown,
            CategorySource::Automatic,
            None,
        )
    }

    fn open(start: DateTime<Utc>) -> TimeSlot {
        TimeSlot::open(day(), start, Category::Unknown, CategorySource::Automatic, None)
    }

    #[test]
    fn appends_must_be_contiguous() {
        let mut timeline = DayTimeline::new(day(), 0);
        timeline.append_slot(closed(at(9, 0), at(10, 0))).unwrap();

        let gap = timeline.append_slot(closed(at(10, 5), at(11, 0)));
        assert!(matches!(gap, Err(TimelineError::Gap(_))));

        let overlap = timeline.append_slot(closed(at(9, 30), at(11, 0)));
        assert!(matches!(overlap, Err(TimelineError::Overlap(_))));

        timeline.append_slot(closed(at(10, 0), at(11, 0))).unwrap();
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn only_the_last_slot_may_be_open() {
        let mut timeline = DayTimeline::new(day(), 0);
        timeline.append_slot(open(at(9, 0))).unwrap();
        let second = timeline.append_slot(open(at(10, 0)));
        assert_eq!(second, Err(TimelineError::SecondOpenSlot));
    }

    #[test]
    fn rejects_empty_and_inverted_slots() {
        let mut timeline = DayTimeline::new(day(), 0);
        let empty = timeline.append_slot(closed(at(9, 0), at(9, 0)));
        assert!(matches!(empty, Err(TimelineError::EmptySlot(_))));
    }

    #[test]
    fn rejects_slots_crossing_midnight() {
        let mut timeline = DayTimeline::new(day(), 0);
        let end_next_day = Utc.with_ymd_and_hms(2024, 3, 6, 0, 30, 0).unwrap();
        let crossing = timeline.append_slot(closed(at(23, 0), end_next_day));
        assert!(matches!(crossing, Err(TimelineError::CrossesMidnight(_))));

        // Ending exactly at next midnight is the day's legal edge.
        let midnight = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        timeline.append_slot(closed(at(23, 0), midnight)).unwrap();
    }

    #[test]
    fn close_open_slot_validates_the_instant() {
        let mut timeline = DayTimeline::new(day(), 0);
        assert_eq!(
            timeline.close_open_slot(at(10, 0)),
            Err(TimelineError::NoOpenSlot)
        );

        timeline.append_slot(open(at(9, 0))).unwrap();
        let too_early = timeline.close_open_slot(at(9, 0));
        assert!(matches!(too_early, Err(TimelineError::CloseOutOfRange(_))));

        let closed_slot = timeline.close_open_slot(at(9, 45)).unwrap();
        assert_eq!(closed_slot.end_time, Some(at(9, 45)));
        assert_eq!(
            timeline.close_open_slot(at(10, 0)),
            Err(TimelineError::NoOpenSlot)
        );
    }

    #[test]
    fn user_confirmed_slots_resist_automatic_updates() {
        let mut timeline = DayTimeline::new(day(), 0);
        timeline.append_slot(open(at(9, 0))).unwrap();
        let id = timeline.last_slot().unwrap().id.clone();

        timeline
            .update_category(&id, Category::Work, CategorySource::UserConfirmed)
            .unwrap();

        let refused =
            timeline.update_category(&id, Category::Commute, CategorySource::Automatic);
        assert_eq!(
            refused,
            Err(TimelineError::ConfirmedSlotImmutable(id.clone()))
        );

        // Another confirmation is allowed.
        timeline
            .update_category(&id, Category::Leisure, CategorySource::UserConfirmed)
            .unwrap();
        assert_eq!(timeline.slot(&id).unwrap().category, Category::Leisure);
    }

    #[test]
    fn from_slots_validates_wholesale() {
        let slots = vec![closed(at(9, 0), at(10, 0)), closed(at(10, 30), at(11, 0))];
        let result = DayTimeline::from_slots(day(), 0, slots);
        assert!(matches!(result, Err(TimelineError::Gap(_))));
    }

    #[test]
    fn store_allows_one_open_slot_at_the_frontier_only() {
        let mut store = TimelineStore::new(0);
        let mut first_day = DayTimeline::new(day(), 0);
        first_day.append_slot(open(at(9, 0))).unwrap();
        store.commit_day(first_day).unwrap();

        // A second open slot on the following day must be refused.
        let next = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let next_start = Utc.with_ymd_and_hms(2024, 3, 6, 8, 0, 0).unwrap();
        let mut next_timeline = DayTimeline::new(next, 0);
        next_timeline
            .append_slot(TimeSlot::open(
                next,
                next_start,
                Category::Unknown,
                CategorySource::Automatic,
                None,
            ))
            .unwrap();
        assert_eq!(
            store.commit_day(next_timeline),
            Err(TimelineError::SecondOpenSlot)
        );

        // Sealing the first day makes the same commit legal.
        let mut first_day_fixed = store.working_copy(day());
        first_day_fixed.close_open_slot(at(17, 0)).unwrap();
        store.commit_day(first_day_fixed).unwrap();

        let mut next_timeline = DayTimeline::new(next, 0);
        next_timeline
            .append_slot(TimeSlot::open(
                next,
                next_start,
                Category::Unknown,
                CategorySource::Automatic,
                None,
            ))
            .unwrap();
        store.commit_day(next_timeline).unwrap();
        assert_eq!(store.open_slot().unwrap().start_time, next_start);
    }

    #[test]
    fn working_set_shadows_the_store() {
        let mut store = TimelineStore::new(0);
        let mut first_day = DayTimeline::new(day(), 0);
        first_day.append_slot(open(at(9, 0))).unwrap();
        store.commit_day(first_day).unwrap();

        let mut working = WorkingSet::new(&store);
        assert_eq!(working.open_slot().unwrap().start_time, at(9, 0));

        working.day_mut(day()).close_open_slot(at(10, 0)).unwrap();
        assert_eq!(working.open_slot(), None);

        // The store itself is untouched until commit.
        assert!(store.open_slot().is_some());
    }
}
