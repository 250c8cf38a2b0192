pub mod store;

pub use store::{DayTimeline, TimelineStore, WorkingSet};
