use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::time_slot::Category;
use crate::models::track_event::Coordinate;

/// A learned (location cell → category) association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartGuess {
    pub id: String,
    /// Quantized grid cell, see [`location_signature`].
    pub signature: String,
    pub category: Category,
    pub hit_count: u32,
    pub last_used: DateTime<Utc>,
}

impl SmartGuess {
    pub fn new(signature: String, category: Category, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            signature,
            category,
            hit_count: 1,
            last_used: now,
        }
    }
}

/// Buckets a coordinate into a fixed-size grid cell.
///
/// `cell_size_deg` is the cell edge in degrees; 0.001° is roughly 110 m of
/// latitude. Cells are floor-aligned so nearby fixes land in the same bucket
/// regardless of jitter sign.
pub fn location_signature(coordinate: &Coordinate, cell_size_deg: f64) -> String {
    let lat_cell = (coordinate.latitude / cell_size_deg).floor() as i64;
    let lon_cell = (coordinate.longitude / cell_size_deg).floor() as i64;
    format!("{lat_cell}:{lon_cell}")
}
