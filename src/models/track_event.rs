use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and inside the WGS84 envelope.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Biometric sample types the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BiometricKind {
    HeartRate,
    StepCount,
    DistanceWalkingRunning,
    SleepAnalysis,
}

impl BiometricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiometricKind::HeartRate => "heartRate",
            BiometricKind::StepCount => "stepCount",
            BiometricKind::DistanceWalkingRunning => "distanceWalkingRunning",
            BiometricKind::SleepAnalysis => "sleepAnalysis",
        }
    }
}

/// A location fix after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReading {
    pub coordinate: Coordinate,
    pub accuracy_m: f64,
}

/// A biometric sample after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricReading {
    pub kind: BiometricKind,
    pub value: f64,
}

/// Payload of a track event; the single tagged union both providers feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventPayload {
    Location(LocationReading),
    Biometric(BiometricReading),
}

impl EventPayload {
    /// Coarse payload kind, used for merge ordering and duplicate detection.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            EventPayload::Location(_) => "location",
            EventPayload::Biometric(_) => "biometric",
        }
    }
}

/// One normalized sensor observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub payload: EventPayload,
}

impl TrackEvent {
    pub fn location(
        timestamp: DateTime<Utc>,
        source_id: impl Into<String>,
        coordinate: Coordinate,
        accuracy_m: f64,
    ) -> Self {
        Self {
            timestamp,
            source_id: source_id.into(),
            payload: EventPayload::Location(LocationReading {
                coordinate,
                accuracy_m,
            }),
        }
    }

    pub fn biometric(
        timestamp: DateTime<Utc>,
        source_id: impl Into<String>,
        kind: BiometricKind,
        value: f64,
    ) -> Self {
        Self {
            timestamp,
            source_id: source_id.into(),
            payload: EventPayload::Biometric(BiometricReading { kind, value }),
        }
    }

    pub fn as_location(&self) -> Option<&LocationReading> {
        match &self.payload {
            EventPayload::Location(reading) => Some(reading),
            EventPayload::Biometric(_) => None,
        }
    }

    pub fn as_biometric(&self) -> Option<&BiometricReading> {
        match &self.payload {
            EventPayload::Biometric(reading) => Some(reading),
            EventPayload::Location(_) => None,
        }
    }
}
