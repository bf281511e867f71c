//! Positions and motion requests

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default feed rate in units per minute
pub const DEFAULT_FEED_RATE: f64 = 1000.0;

/// Machine position reported by the controller (three linear axes)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MachinePosition {
    /// X position in machine coordinates
    pub x: f64,
    /// Y position in machine coordinates
    pub y: f64,
    /// Z position in machine coordinates
    pub z: f64,
}

impl MachinePosition {
    /// Create a position from three coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for MachinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

/// Target of an absolute move
///
/// Axes left as `None` are not moved and are omitted from the command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionRequest {
    /// Target X coordinate
    pub x: Option<f64>,
    /// Target Y coordinate
    pub y: Option<f64>,
    /// Target Z coordinate
    pub z: Option<f64>,
    /// Feed rate in units per minute
    pub feed_rate: f64,
}

impl Default for MotionRequest {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            z: None,
            feed_rate: DEFAULT_FEED_RATE,
        }
    }
}

impl MotionRequest {
    /// Create a request with the given axes and the default feed rate
    pub fn new(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::default()
        }
    }

    /// Set the feed rate
    pub fn with_feed_rate(mut self, feed_rate: f64) -> Self {
        self.feed_rate = feed_rate;
        self
    }

    /// True when no axis is set
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }

    /// Largest absolute displacement across the requested axes
    pub fn dominant_distance(&self, from: &MachinePosition) -> f64 {
        [
            self.x.map(|x| (x - from.x).abs()),
            self.y.map(|y| (y - from.y).abs()),
            self.z.map(|z| (z - from.z).abs()),
        ]
        .into_iter()
        .flatten()
        .fold(0.0, f64::max)
    }

    /// Estimated travel time from `from`, used as a polling deadline hint
    ///
    /// Feed rate is per minute, so `distance / feed * 60` seconds. A
    /// non-positive feed rate yields zero.
    pub fn estimated_duration(&self, from: &MachinePosition) -> Duration {
        if self.feed_rate <= 0.0 || !self.feed_rate.is_finite() {
            return Duration::ZERO;
        }
        let secs = self.dominant_distance(from) / self.feed_rate * 60.0;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    /// Absolute linear move command, e.g. `G90 G0 X10.000 F600`
    pub fn to_gcode(&self) -> String {
        let mut parts = vec!["G90".to_string(), "G0".to_string()];
        if let Some(x) = self.x {
            parts.push(format!("X{:.3}", x));
        }
        if let Some(y) = self.y {
            parts.push(format!("Y{:.3}", y));
        }
        if let Some(z) = self.z {
            parts.push(format!("Z{:.3}", z));
        }
        parts.push(format!("F{}", self.feed_rate));
        parts.join(" ")
    }
}
