use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SampleError;
use crate::models::{BiometricKind, Coordinate, TrackEvent};

/// A location fix as a provider delivers it, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

/// A biometric sample as a provider delivers it, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBiometricSample {
    pub kind: BiometricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Validates a raw fix and shapes it into a track event.
///
/// The single translation point between the location provider's shape and
/// the pipeline; rejected fixes never mutate anything downstream.
pub fn normalize_location(
    source_id: &str,
    raw: RawLocationFix,
) -> Result<TrackEvent, SampleError> {
    let coordinate = Coordinate::new(raw.latitude, raw.longitude);
    if !coordinate.is_valid() {
        return Err(SampleError::MalformedLocation(format!(
            "coordinate ({}, {})",
            raw.latitude, raw.longitude
        )));
    }
    if !raw.accuracy_m.is_finite() || raw.accuracy_m < 0.0 {
        return Err(SampleError::MalformedLocation(format!(
            "accuracy {}",
            raw.accuracy_m
        )));
    }
    Ok(TrackEvent::location(
        raw.timestamp,
        source_id,
        coordinate,
        raw.accuracy_m,
    ))
}

/// Validates a raw biometric sample and shapes it into a track event.
pub fn normalize_biometric(
    source_id: &str,
    raw: RawBiometricSample,
) -> Result<TrackEvent, SampleError> {
    if !raw.value.is_finite() || raw.value < 0.0 {
        return Err(SampleError::MalformedBiometric(format!(
            "{} value {}",
            raw.kind.as_str(),
            raw.value
        )));
    }
    Ok(TrackEvent::biometric(
        raw.timestamp,
        source_id,
        raw.kind,
        raw.value,
    ))
}
