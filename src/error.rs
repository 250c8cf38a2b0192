//! Typed errors for the timeline core.

use thiserror::Error;

/// A raw sample the normalizer refuses to turn into a track event.
///
/// Malformed samples are dropped and logged at the edge; they never reach
/// the merge stage or the tracker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("malformed location fix: {0}")]
    MalformedLocation(String),

    #[error("malformed biometric sample: {0}")]
    MalformedBiometric(String),
}

/// A store command that would break a day's invariants.
///
/// The store refuses the mutation and stays unchanged; callers surface these
/// as logic faults rather than swallowing them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error("slot {slot_id} does not belong to day {day}")]
    WrongDay { slot_id: String, day: String },

    #[error("slot would overlap its predecessor: {0}")]
    Overlap(String),

    #[error("slot would leave a gap after its predecessor: {0}")]
    Gap(String),

    #[error("day already has an open slot")]
    SecondOpenSlot,

    #[error("slot would be empty or inverted: {0}")]
    EmptySlot(String),

    #[error("slot would cross local midnight: {0}")]
    CrossesMidnight(String),

    #[error("no open slot to close")]
    NoOpenSlot,

    #[error("close instant {0} is outside the open slot")]
    CloseOutOfRange(String),

    #[error("unknown slot id {0}")]
    UnknownSlot(String),

    #[error("slot {0} is user-confirmed and cannot be recategorized automatically")]
    ConfirmedSlotImmutable(String),

    #[error("day sequence invalid: {0}")]
    InvalidSequence(String),
}
