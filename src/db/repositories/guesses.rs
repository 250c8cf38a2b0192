use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u32},
};
use crate::models::{Category, SmartGuess};

fn row_to_guess(row: &Row) -> Result<SmartGuess> {
    let category: String = row.get("category")?;
    let hit_count: i64 = row.get("hit_count")?;
    let last_used: String = row.get("last_used")?;

    Ok(SmartGuess {
        id: row.get("id")?,
        signature: row.get("signature")?,
        category: Category::from_name(&category),
        hit_count: to_u32(hit_count, "hit_count")?,
        last_used: parse_datetime(&last_used, "last_used")?,
    })
}

impl Database {
    /// Inserts a guess or refreshes the stored row for its cell and category.
    pub async fn upsert_smart_guess(&self, guess: SmartGuess) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO smart_guesses (id, signature, category, hit_count, last_used)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (signature, category)
                 DO UPDATE SET hit_count = excluded.hit_count, last_used = excluded.last_used",
                params![
                    guess.id,
                    guess.signature,
                    guess.category.as_str(),
                    i64::from(guess.hit_count),
                    guess.last_used.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_smart_guesses(&self) -> Result<Vec<SmartGuess>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, signature, category, hit_count, last_used FROM smart_guesses",
            )?;
            let mut rows = stmt.query([])?;
            let mut guesses = Vec::new();
            while let Some(row) = rows.next()? {
                guesses.push(row_to_guess(row)?);
            }
            Ok(guesses)
        })
        .await
    }

    /// Deletes the listed guesses, returning how many rows were removed.
    pub async fn delete_smart_guesses(&self, ids: Vec<String>) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0usize;
            {
                let mut stmt = tx.prepare("DELETE FROM smart_guesses WHERE id = ?1")?;
                for id in &ids {
                    removed += stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::location_signature;
    use crate::models::Coordinate;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn open_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("dayline.db")).unwrap();
        (dir, db)
    }

    fn office_guess() -> SmartGuess {
        let office = Coordinate::new(40.7128, -74.0060);
        SmartGuess::new(
            location_signature(&office, 0.001),
            Category::Work,
            Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn guesses_round_trip() {
        let (_dir, db) = open_db();
        let guess = office_guess();

        db.upsert_smart_guess(guess.clone()).await.unwrap();
        let loaded = db.load_smart_guesses().await.unwrap();

        assert_eq!(loaded, vec![guess]);
    }

    #[tokio::test]
    async fn upsert_refreshes_the_existing_row() {
        let (_dir, db) = open_db();
        let mut guess = office_guess();
        db.upsert_smart_guess(guess.clone()).await.unwrap();

        guess.hit_count = 3;
        guess.last_used = guess.last_used + Duration::days(2);
        db.upsert_smart_guess(guess.clone()).await.unwrap();

        let loaded = db.load_smart_guesses().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hit_count, 3);
        assert_eq!(loaded[0].last_used, guess.last_used);
    }

    #[tokio::test]
    async fn delete_removes_only_the_listed_ids() {
        let (_dir, db) = open_db();
        let office = office_guess();
        let home = SmartGuess::new(
            location_signature(&Coordinate::new(40.7831, -73.9712), 0.001),
            Category::Leisure,
            Utc.with_ymd_and_hms(2024, 3, 5, 20, 0, 0).unwrap(),
        );
        db.upsert_smart_guess(office.clone()).await.unwrap();
        db.upsert_smart_guess(home.clone()).await.unwrap();

        let removed = db
            .delete_smart_guesses(vec![office.id.clone()])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(db.load_smart_guesses().await.unwrap(), vec![home]);
    }

    #[tokio::test]
    async fn deleting_unknown_ids_is_a_no_op() {
        let (_dir, db) = open_db();
        let removed = db
            .delete_smart_guesses(vec!["missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
