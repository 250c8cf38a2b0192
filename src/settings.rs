use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, sync::RwLock};

use crate::tracking::TrackCursor;

/// Durable engine state that lives outside the timeline tables: the tracking
/// cursor, per-source drain positions, and housekeeping timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// `None` until the first accepted fix arms the tracker.
    pub cursor: Option<TrackCursor>,
    /// Newest drained event timestamp per registered source.
    pub source_cursors: HashMap<String, DateTime<Utc>>,
    pub last_guess_purge_at: Option<DateTime<Utc>>,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn cursor(&self) -> Option<TrackCursor> {
        self.data.read().unwrap().cursor
    }

    pub fn source_cursors(&self) -> HashMap<String, DateTime<Utc>> {
        self.data.read().unwrap().source_cursors.clone()
    }

    pub fn last_guess_purge_at(&self) -> Option<DateTime<Utc>> {
        self.data.read().unwrap().last_guess_purge_at
    }

    pub fn update_cursor(&self, cursor: TrackCursor) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.cursor = Some(cursor);
            self.persist(&guard)?;
        }
        Ok(())
    }

    /// Stores the post-run tracking state in one write.
    pub fn update_tracking(
        &self,
        cursor: Option<TrackCursor>,
        source_cursors: HashMap<String, DateTime<Utc>>,
    ) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.cursor = cursor;
            guard.source_cursors = source_cursors;
            self.persist(&guard)?;
        }
        Ok(())
    }

    pub fn record_guess_purge(&self, at: DateTime<Utc>) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.last_guess_purge_at = Some(at);
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
