pub mod tracker;

pub use tracker::{FixResolution, FixTracker, TrackCursor, TrackOutcome};
