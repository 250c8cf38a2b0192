use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::SampleError;
use crate::models::TrackEvent;
use crate::pipeline::PipelineBatch;
use crate::sources::normalizer::{
    normalize_biometric, normalize_location, RawBiometricSample, RawLocationFix,
};
use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;

/// Push half of a registered source.
///
/// Providers keep one of these and feed raw samples through it; samples are
/// validated here, so nothing malformed ever sits in a queue. Cloneable so
/// a provider can fan out across tasks.
#[derive(Clone)]
pub struct SourceHandle {
    source_id: String,
    sender: mpsc::Sender<TrackEvent>,
}

impl SourceHandle {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Validates and queues a location fix, waiting for queue capacity.
    pub async fn push_location(&self, raw: RawLocationFix) -> Result<(), SampleError> {
        let event = normalize_location(&self.source_id, raw)?;
        self.forward(event).await;
        Ok(())
    }

    /// Validates and queues a biometric sample, waiting for queue capacity.
    pub async fn push_biometric(&self, raw: RawBiometricSample) -> Result<(), SampleError> {
        let event = normalize_biometric(&self.source_id, raw)?;
        self.forward(event).await;
        Ok(())
    }

    async fn forward(&self, event: TrackEvent) {
        if self.sender.send(event).await.is_err() {
            log_warn!(
                "source {} pushed a sample after the collector shut down",
                self.source_id
            );
        }
    }
}

/// Buffers normalized events per source until a pipeline run drains them.
///
/// Each registered source gets its own bounded queue; `drain_batches` turns
/// whatever has accumulated into one time-ordered batch per source and
/// advances that source's high-water cursor.
pub struct EventCollector {
    queue_depth: usize,
    buffers: HashMap<String, mpsc::Receiver<TrackEvent>>,
    cursors: HashMap<String, DateTime<Utc>>,
}

impl EventCollector {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            queue_depth,
            buffers: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    /// Registers a source, replacing any previous queue under the same id.
    pub fn register(&mut self, source_id: &str) -> SourceHandle {
        let (sender, receiver) = mpsc::channel(self.queue_depth);
        self.buffers.insert(source_id.to_string(), receiver);
        SourceHandle {
            source_id: source_id.to_string(),
            sender,
        }
    }

    /// Drains every queue into one batch per source.
    ///
    /// Sources are expected to deliver in timestamp order; a batch is
    /// re-sorted anyway so one misbehaving provider cannot poison the
    /// merge. Sources with nothing queued produce no batch.
    pub fn drain_batches(&mut self) -> Vec<PipelineBatch> {
        let mut batches = Vec::new();
        for (source_id, receiver) in self.buffers.iter_mut() {
            let mut events = Vec::new();
            while let Ok(event) = receiver.try_recv() {
                events.push(event);
            }
            if events.is_empty() {
                continue;
            }
            events.sort_by_key(|event| event.timestamp);
            if let Some(last) = events.last() {
                let cursor = self
                    .cursors
                    .get(source_id)
                    .map_or(last.timestamp, |cursor| (*cursor).max(last.timestamp));
                self.cursors.insert(source_id.clone(), cursor);
            }
            batches.push(PipelineBatch::new(source_id.clone(), events));
        }
        batches.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        if !batches.is_empty() {
            let total: usize = batches.iter().map(|batch| batch.events.len()).sum();
            log_debug!("drained {} events from {} sources", total, batches.len());
        }
        batches
    }

    /// Newest drained event timestamp per source, for resuming providers
    /// after a restart.
    pub fn cursors(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.cursors
    }

    /// Restores cursors persisted by an earlier run.
    pub fn restore_cursors(&mut self, cursors: HashMap<String, DateTime<Utc>>) {
        self.cursors = cursors;
    }
}
