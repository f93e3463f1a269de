//! Time-to-event labels.
//!
//! A sample's time-to-event (seconds until the crossing starts) may be
//! unknown. Unknown values pass through every transformation untouched;
//! known values are rounded to centiseconds and bucketed.

use serde::{Deserialize, Serialize};

/// Lower edges of buckets 1..=5. Bucket 0 is everything below the first edge.
pub const BUCKET_EDGES: [f64; 5] = [0.45, 0.85, 1.25, 1.65, 2.05];

/// Tag used where a numeric bucket is required but the value is unknown.
pub const MISSING_TAG: f32 = -1.0;

/// Seconds until the event, if known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeToEvent(Option<f64>);

impl TimeToEvent {
    /// NaN is treated as unknown.
    pub fn new(seconds: f64) -> Self {
        if seconds.is_nan() {
            Self(None)
        } else {
            Self(Some(seconds))
        }
    }

    pub fn unknown() -> Self {
        Self(None)
    }

    pub fn seconds(&self) -> Option<f64> {
        self.0
    }

    pub fn is_known(&self) -> bool {
        self.0.is_some()
    }

    /// Round to two decimals, halves to even.
    pub fn rounded(&self) -> Self {
        Self(self.0.map(|s| (s * 100.0).round_ties_even() / 100.0))
    }

    /// Bucket id in `0..=5` of the rounded value.
    pub fn bucket(&self) -> Option<u8> {
        self.rounded()
            .0
            .map(|s| BUCKET_EDGES.iter().take_while(|&&edge| s >= edge).count() as u8)
    }

    /// Bucket as a float label, `-1` when unknown.
    pub fn tag(&self) -> f32 {
        self.bucket().map_or(MISSING_TAG, f32::from)
    }
}

impl From<Option<f64>> for TimeToEvent {
    fn from(value: Option<f64>) -> Self {
        value.map_or_else(Self::unknown, Self::new)
    }
}
