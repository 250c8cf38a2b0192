pub mod collapse;
pub mod day_boundary;
pub mod merge;
pub mod motion;

pub use collapse::{collapse_mini_commutes, CollapseResult};
pub use day_boundary::{align_day_start, AlignResult};
pub use merge::{merge_batches, MergeOutcome, PipelineBatch};
pub use motion::{apply_motion_hints, detect_motion_windows, MotionApplyResult, MotionWindow};
