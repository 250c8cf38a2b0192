pub mod day;
pub mod smart_guess;
pub mod time_slot;
pub mod track_event;

pub use smart_guess::{location_signature, SmartGuess};
pub use time_slot::{Category, CategorySource, TimeSlot};
pub use track_event::{
    BiometricKind, BiometricReading, Coordinate, EventPayload, LocationReading, TrackEvent,
};
