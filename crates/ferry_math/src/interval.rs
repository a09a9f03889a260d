use serde::{Deserialize, Serialize};

/// A closed range of time codes or frames.
///
/// An interval with infinite bounds means "whatever range the source
/// declares"; an interval with `min > max` is inverted and rejected by the
/// importer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub min: f64,
    pub max: f64,
}

impl TimeInterval {
    /// Create a new interval given min and max values.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Returns the length of the interval (max - min).
    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    /// Returns true if both bounds are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Returns true if min > max.
    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }

    /// Returns true if t is within the interval [min, max] (inclusive).
    pub fn contains(&self, t: f64) -> bool {
        self.min <= t && t <= self.max
    }

    /// Multiplies both bounds, e.g. to convert time codes into frames.
    pub fn scaled(&self, factor: f64) -> TimeInterval {
        TimeInterval::new(self.min * factor, self.max * factor)
    }

    /// Creates an interval that surrounds two other intervals.
    pub fn surrounding(a: &TimeInterval, b: &TimeInterval) -> TimeInterval {
        TimeInterval::new(a.min.min(b.min), a.max.max(b.max))
    }

    /// The unbounded interval: import the source's whole authored range.
    pub const UNIVERSE: TimeInterval = TimeInterval {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };
}

impl Default for TimeInterval {
    fn default() -> Self {
        Self::UNIVERSE
    }
}
