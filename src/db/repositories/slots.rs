use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_day, parse_optional_datetime, parse_source},
};
use crate::models::{Category, Coordinate, TimeSlot};

fn row_to_slot(row: &Row) -> Result<TimeSlot> {
    let day: String = row.get("day")?;
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let category: String = row.get("category")?;
    let source: String = row.get("category_source")?;
    let anchor_lat: Option<f64> = row.get("anchor_lat")?;
    let anchor_lon: Option<f64> = row.get("anchor_lon")?;

    let anchor = match (anchor_lat, anchor_lon) {
        (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
        _ => None,
    };

    Ok(TimeSlot {
        id: row.get("id")?,
        day: parse_day(&day, "day")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        category: Category::from_name(&category),
        source: parse_source(&source)?,
        anchor,
    })
}

impl Database {
    /// Replaces every stored slot of `day` with `slots` in one transaction.
    ///
    /// A day either updates wholesale or stays untouched, so an interrupted
    /// pipeline run never leaves a half-written timeline behind.
    pub async fn replace_day_slots(&self, day: NaiveDate, slots: Vec<TimeSlot>) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM time_slots WHERE day = ?1",
                params![day.to_string()],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO time_slots (id, day, start_time, end_time, category, category_source, anchor_lat, anchor_lon)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for slot in &slots {
                    stmt.execute(params![
                        slot.id,
                        slot.day.to_string(),
                        slot.start_time.to_rfc3339(),
                        slot.end_time.map(|dt| dt.to_rfc3339()),
                        slot.category.as_str(),
                        slot.source.as_str(),
                        slot.anchor.map(|anchor| anchor.latitude),
                        slot.anchor.map(|anchor| anchor.longitude),
                    ])?;
                }
            }
            tx.commit()
                .with_context(|| format!("failed to commit slots for {day}"))?;
            Ok(())
        })
        .await
    }

    pub async fn slots_for_day(&self, day: NaiveDate) -> Result<Vec<TimeSlot>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, day, start_time, end_time, category, category_source, anchor_lat, anchor_lon
                 FROM time_slots
                 WHERE day = ?1
                 ORDER BY start_time",
            )?;
            let mut rows = stmt.query(params![day.to_string()])?;
            let mut slots = Vec::new();
            while let Some(row) = rows.next()? {
                slots.push(row_to_slot(row)?);
            }
            Ok(slots)
        })
        .await
    }

    /// Loads every slot from `first_day` onward, grouped per day in order.
    /// Used to warm the in-memory store on startup.
    pub async fn load_days_since(
        &self,
        first_day: NaiveDate,
    ) -> Result<Vec<(NaiveDate, Vec<TimeSlot>)>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, day, start_time, end_time, category, category_source, anchor_lat, anchor_lon
                 FROM time_slots
                 WHERE day >= ?1
                 ORDER BY day, start_time",
            )?;
            let mut rows = stmt.query(params![first_day.to_string()])?;
            let mut days: Vec<(NaiveDate, Vec<TimeSlot>)> = Vec::new();
            while let Some(row) = rows.next()? {
                let slot = row_to_slot(row)?;
                match days.last_mut() {
                    Some((day, slots)) if *day == slot.day => slots.push(slot),
                    _ => days.push((slot.day, vec![slot])),
                }
            }
            Ok(days)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::day::day_start;
    use crate::models::CategorySource;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn open_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("dayline.db")).unwrap();
        (dir, db)
    }

    fn sample_day(day: NaiveDate) -> Vec<TimeSlot> {
        let midnight = day_start(day, 0);
        let closed = TimeSlot::closed(
            day,
            midnight,
            midnight + Duration::hours(9),
            Category::Sleep,
            CategorySource::UserConfirmed,
            None,
        );
        let open = TimeSlot::open(
            day,
            midnight + Duration::hours(9),
            Category::Work,
            CategorySource::SmartGuess,
            Some(Coordinate::new(40.7128, -74.0060)),
        );
        vec![closed, open]
    }

    #[tokio::test]
    async fn day_slots_round_trip() {
        let (_dir, db) = open_db();
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let slots = sample_day(day);

        db.replace_day_slots(day, slots.clone()).await.unwrap();
        let loaded = db.slots_for_day(day).await.unwrap();

        assert_eq!(loaded, slots);
    }

    #[tokio::test]
    async fn replacing_a_day_drops_stale_rows() {
        let (_dir, db) = open_db();
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        db.replace_day_slots(day, sample_day(day)).await.unwrap();

        let midnight = day_start(day, 0);
        let rewritten = vec![TimeSlot::closed(
            day,
            midnight,
            midnight + Duration::hours(24),
            Category::Unknown,
            CategorySource::Automatic,
            None,
        )];
        db.replace_day_slots(day, rewritten.clone()).await.unwrap();

        assert_eq!(db.slots_for_day(day).await.unwrap(), rewritten);
    }

    #[tokio::test]
    async fn load_days_since_skips_older_days() {
        let (_dir, db) = open_db();
        let old_day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let first_day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();

        for day in [old_day, first_day, next_day] {
            db.replace_day_slots(day, sample_day(day)).await.unwrap();
        }

        let loaded = db.load_days_since(first_day).await.unwrap();
        let days: Vec<NaiveDate> = loaded.iter().map(|(day, _)| *day).collect();

        assert_eq!(days, vec![first_day, next_day]);
        assert_eq!(loaded[0].1.len(), 2);
    }

    #[tokio::test]
    async fn slots_survive_a_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dayline.db");
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let slots = sample_day(day);

        {
            let db = Database::new(path.clone()).unwrap();
            db.replace_day_slots(day, slots.clone()).await.unwrap();
        }

        let reopened = Database::new(path).unwrap();
        assert_eq!(reopened.slots_for_day(day).await.unwrap(), slots);
    }
}
