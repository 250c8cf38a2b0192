use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::models::{location_signature, Category, Coordinate, SmartGuess};

/// Learned (location cell → category) associations.
///
/// Lives in memory, hydrated from persistence at startup; every mutation
/// returns the touched records so the caller can write them back. Guesses
/// are advisory: losing one degrades a suggestion, never the timeline.
pub struct GuessEngine {
    min_hits: u32,
    cell_size_deg: f64,
    by_signature: HashMap<String, Vec<SmartGuess>>,
}

impl GuessEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_hits: config.guess_min_hits,
            cell_size_deg: config.guess_cell_size_deg,
            by_signature: HashMap::new(),
        }
    }

    /// Loads previously learned guesses, replacing the in-memory table.
    pub fn hydrate(&mut self, guesses: Vec<SmartGuess>) {
        self.by_signature.clear();
        for guess in guesses {
            self.by_signature
                .entry(guess.signature.clone())
                .or_default()
                .push(guess);
        }
    }

    pub fn len(&self) -> usize {
        self.by_signature.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }

    /// Category of the most recently used confident guess for the
    /// coordinate's cell; ties fall to the higher hit count.
    pub fn suggest(&self, coordinate: &Coordinate) -> Option<Category> {
        let signature = location_signature(coordinate, self.cell_size_deg);
        self.by_signature
            .get(&signature)?
            .iter()
            .filter(|guess| guess.hit_count >= self.min_hits)
            .max_by_key(|guess| (guess.last_used, guess.hit_count))
            .map(|guess| guess.category.clone())
    }

    /// Records one (coordinate, category) observation.
    ///
    /// An existing guess for the same cell and category gains a hit and a
    /// fresh `last_used`; otherwise a new record starts at one hit. Returns
    /// the upserted record for persistence.
    pub fn learn(
        &mut self,
        coordinate: &Coordinate,
        category: Category,
        now: DateTime<Utc>,
    ) -> SmartGuess {
        let signature = location_signature(coordinate, self.cell_size_deg);
        let guesses = self.by_signature.entry(signature.clone()).or_default();

        if let Some(guess) = guesses.iter_mut().find(|guess| guess.category == category) {
            guess.hit_count += 1;
            guess.last_used = now;
            return guess.clone();
        }

        let guess = SmartGuess::new(signature, category, now);
        guesses.push(guess.clone());
        guess
    }

    /// Refreshes `last_used` of the guess whose suggestion was applied, so
    /// live associations do not age out. Returns the touched record.
    pub fn touch(
        &mut self,
        coordinate: &Coordinate,
        category: &Category,
        now: DateTime<Utc>,
    ) -> Option<SmartGuess> {
        let signature = location_signature(coordinate, self.cell_size_deg);
        let guess = self
            .by_signature
            .get_mut(&signature)?
            .iter_mut()
            .find(|guess| guess.category == *category)?;
        guess.last_used = now;
        Some(guess.clone())
    }

    /// Drops guesses not used since the cutoff; returns the removed ids.
    /// An empty purge is a successful no-op.
    pub fn purge(&mut self, older_than: DateTime<Utc>) -> Vec<String> {
        let mut removed = Vec::new();
        self.by_signature.retain(|_, guesses| {
            guesses.retain(|guess| {
                if guess.last_used < older_than {
                    removed.push(guess.id.clone());
                    false
                } else {
                    true
                }
            });
            !guesses.is_empty()
        });
        removed
    }
}
