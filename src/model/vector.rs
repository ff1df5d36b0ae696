//! Time-series samples.

use serde::{Deserialize, Serialize};

/// One sample of a metrics series.
///
/// `timestamp` is in unix seconds, exactly as the metrics backend reports it
/// (fractional seconds are preserved).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub value: f64,
    pub timestamp: f64,
}

impl Vector {
    pub fn new(value: f64, timestamp: f64) -> Self {
        Self { value, timestamp }
    }

    /// Same timestamp, value multiplied by `rate`.
    pub fn scaled(&self, rate: f64) -> Self {
        Self {
            value: self.value * rate,
            timestamp: self.timestamp,
        }
    }
}

impl From<(f64, f64)> for Vector {
    fn from((value, timestamp): (f64, f64)) -> Self {
        Self { value, timestamp }
    }
}
