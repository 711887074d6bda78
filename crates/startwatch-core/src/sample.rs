//! Measured start durations and the labels attached to them.

use std::fmt::Display;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

/// The static labels attached to every reported sample.
///
/// These never change within a process and are registered once together with
/// the metric instead of being attached per sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels {
    /// The operating system this monitor runs on.
    pub os: String,

    /// The driver the profile is started with.
    pub driver: String,
}

impl Labels {
    /// Creates the labels for the given driver on the current operating
    /// system.
    pub fn new<D: Into<String>>(driver: D) -> Self {
        Self {
            os: std::env::consts::OS.into(),
            driver: driver.into(),
        }
    }

    /// Returns the labels as key-value pairs in a stable order.
    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        [("os", &self.os), ("driver", &self.driver)]
    }
}

/// A single measured start duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    elapsed: Duration,
    recorded_at: DateTime<Utc>,
}

impl Sample {
    /// Creates a new sample recorded now.
    pub fn new(elapsed: Duration) -> Self {
        Self::with_timestamp(elapsed, Utc::now())
    }

    /// Creates a new sample with an explicit timestamp.
    pub fn with_timestamp(elapsed: Duration, recorded_at: DateTime<Utc>) -> Self {
        Self {
            elapsed,
            recorded_at,
        }
    }
}

impl Sample {
    /// The measured duration.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The measured duration in fractional seconds, this is never negative.
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// When this sample was taken.
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Latency: {:.6}", self.seconds())
    }
}
