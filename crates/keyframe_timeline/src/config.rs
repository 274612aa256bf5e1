// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline configuration.

use crate::error::{Result, TimelineError};
use crate::track::{DEFAULT_TRACK_CAPACITY, MAX_TRACK_CAPACITY};
use serde::{Deserialize, Serialize};

/// Default playback frame rate
pub const DEFAULT_FRAME_RATE: f32 = 30.0;

/// Extra range added past the last keyframe when sizing precomputed buffers
pub const DEFAULT_PRECOMPUTE_MARGIN: f64 = 1.1;

/// Settings shared by every track of a timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Frames per second used for precomputation
    pub frame_rate: f32,
    /// Initial buffer capacity of new tracks
    pub track_capacity: usize,
    /// Multiplier applied to the timeline duration when precomputing
    pub precompute_margin: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            track_capacity: DEFAULT_TRACK_CAPACITY,
            precompute_margin: DEFAULT_PRECOMPUTE_MARGIN,
        }
    }
}

impl TimelineConfig {
    /// Set the frame rate
    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Set the initial track capacity
    pub fn with_track_capacity(mut self, capacity: usize) -> Self {
        self.track_capacity = capacity;
        self
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(TimelineError::InvalidFrameRate(self.frame_rate));
        }
        if !(self.precompute_margin.is_finite() && self.precompute_margin >= 1.0) {
            return Err(TimelineError::InvalidConfig(format!(
                "precompute margin must be >= 1, got {}",
                self.precompute_margin
            )));
        }
        if self.track_capacity == 0 || self.track_capacity > MAX_TRACK_CAPACITY {
            return Err(TimelineError::InvalidConfig(format!(
                "track capacity must be within 1..={MAX_TRACK_CAPACITY}, got {}",
                self.track_capacity
            )));
        }
        Ok(())
    }

    /// Serialize to RON
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Parse and validate from RON; missing fields take their defaults
    pub fn from_ron(s: &str) -> Result<Self> {
        let config: Self = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
