// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe animation track engine.
//!
//! This crate stores and evaluates the animation authored in an editor:
//! - Per-property tracks of time-sorted keyframes
//! - Linear, step, and eased bezier interpolation
//! - A timeline registry keyed by object UUID, with scene id lookup
//! - Dense per-frame buffers precomputed for playback
//! - Change events from tracks, re-emitted by the owning timeline
//!
//! ## Architecture
//!
//! The engine is built on:
//! - Struct-of-arrays keyframe storage (`times`, flat xyz `values`, mode codes)
//! - A single track store with a secondary scene id index
//! - Dirty tracking so precomputation only runs after edits
//! - Lenient JSON loading, RON project files, and bincode backups

pub mod binding;
pub mod config;
pub mod error;
pub mod events;
pub mod keyframe;
pub mod precompute;
pub mod snapshot;
pub mod timeline;
pub mod track;

pub use binding::{ObjectUuid, SceneId, TrackKey};
pub use config::TimelineConfig;
pub use error::{Result, TimelineError, TrackError};
pub use events::{EventBus, ListenerId, TimelineEvent, TrackEvent, TrackEventKind};
pub use keyframe::{Interpolation, InterpolationMode, Keyframe, Vec3};
pub use precompute::PrecomputedData;
pub use snapshot::{LoadReport, TimelineSnapshot, TrackBackup, TrackSnapshot};
pub use timeline::{CleanupReport, MergeReport, TimelineData, TimelineIssue, TimelineStats};
pub use track::{MemoryUsage, TrackData, TrackIssue};
