//! Passive daily-timeline engine.
//!
//! Noisy location fixes and biometric samples go in; clean, contiguous,
//! categorized per-day timelines come out. Sources push events through
//! [`SourceHandle`]s, an online tracker keeps the current slot honest
//! between runs, and [`TimelineEngine::run_pipeline`] replays the queued
//! batches through merge, motion hints, mini-commute collapse, and day
//! alignment before persisting each touched day atomically.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod guess;
pub mod models;
pub mod pipeline;
pub mod runner;
pub mod settings;
pub mod sources;
pub mod timeline;
pub mod tracking;
mod utils;

pub use config::EngineConfig;
pub use engine::{CategoryChange, RunSummary, TimelineEngine};
pub use error::{SampleError, TimelineError};
pub use models::{Category, CategorySource, Coordinate, TimeSlot};
pub use runner::PipelineRunner;
pub use sources::{RawBiometricSample, RawLocationFix, SourceHandle};
pub use tracking::{FixResolution, TrackCursor, TrackOutcome};
