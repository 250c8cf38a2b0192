pub mod collector;
pub mod normalizer;

pub use collector::{EventCollector, SourceHandle};
pub use normalizer::{
    normalize_biometric, normalize_location, RawBiometricSample, RawLocationFix,
};
