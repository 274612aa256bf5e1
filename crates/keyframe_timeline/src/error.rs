// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for track and timeline operations.

use crate::keyframe::Vec3;
use thiserror::Error;

/// Rejection reasons for keyframe mutations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    /// Value has a non-finite component
    #[error("Invalid keyframe value: {0:?}")]
    InvalidValue(Vec3),

    /// Time is not a finite number
    #[error("Invalid keyframe time: {0}")]
    InvalidTime(f32),

    /// Another keyframe already sits within the time tolerance
    #[error("Keyframe already exists near time {time} (existing at {existing})")]
    DuplicateTime {
        /// Requested time
        time: f32,
        /// Time of the colliding keyframe
        existing: f32,
    },

    /// Index outside the active keyframe range
    #[error("Keyframe index {index} out of range (count {count})")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Active keyframe count
        count: usize,
    },

    /// Track is full at the hard ceiling
    #[error("Track capacity exceeded ({max} keyframes)")]
    CapacityExceeded {
        /// Hard per-track ceiling
        max: usize,
    },

    /// No keyframe at the requested time
    #[error("No keyframe at time {0}")]
    KeyframeNotFound(f32),
}

/// Errors raised by timeline-wide operations
#[derive(Debug, Error)]
pub enum TimelineError {
    /// Serialized timeline data has the wrong shape
    #[error("Malformed serialized data: {0}")]
    MalformedSerializedData(String),

    /// Frame rate must be positive and finite
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f32),

    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// RON serialization error
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    /// RON parse error
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// Backup encoding error
    #[error("Backup error: {0}")]
    Backup(#[from] bincode::Error),

    /// Track-level rejection
    #[error(transparent)]
    Track(#[from] TrackError),
}

/// Result type for timeline operations
pub type Result<T> = std::result::Result<T, TimelineError>;
