use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::track_event::Coordinate;

/// Activity category assigned to a time slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Unknown,
    Commute,
    Work,
    Leisure,
    Sleep,
    /// User-defined category, keyed by its name.
    Custom(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Unknown => "unknown",
            Category::Commute => "commute",
            Category::Work => "work",
            Category::Leisure => "leisure",
            Category::Sleep => "sleep",
            Category::Custom(name) => name,
        }
    }

    /// Inverse of `as_str`. Unrecognized names round-trip as `Custom`.
    pub fn from_name(value: &str) -> Category {
        match value {
            "unknown" => Category::Unknown,
            "commute" => Category::Commute,
            "work" => Category::Work,
            "leisure" => Category::Leisure,
            "sleep" => Category::Sleep,
            other => Category::Custom(other.to_string()),
        }
    }
}

/// How a slot came to carry its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategorySource {
    Automatic,
    SmartGuess,
    UserConfirmed,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategorySource::Automatic => "automatic",
            CategorySource::SmartGuess => "smartGuess",
            CategorySource::UserConfirmed => "userConfirmed",
        }
    }
}

/// One interval of a day's timeline.
///
/// `start_time` is inclusive, `end_time` exclusive; `end_time == None` marks
/// the open slot (the ongoing activity). A slot belongs to exactly one local
/// day and never crosses its midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: String,
    pub day: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub category: Category,
    pub source: CategorySource,
    /// Coordinate of the fix that opened the slot, when one exists.
    pub anchor: Option<Coordinate>,
}

impl TimeSlot {
    /// A freshly opened slot with a new id.
    pub fn open(
        day: NaiveDate,
        start_time: DateTime<Utc>,
        category: Category,
        source: CategorySource,
        anchor: Option<Coordinate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            day,
            start_time,
            end_time: None,
            category,
            source,
            anchor,
        }
    }

    /// A closed slot over `[start_time, end_time)` with a new id.
    pub fn closed(
        day: NaiveDate,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        category: Category,
        source: CategorySource,
        anchor: Option<Coordinate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            day,
            start_time,
            end_time: Some(end_time),
            category,
            source,
            anchor,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Duration of a closed slot; `None` while the slot is open.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}
