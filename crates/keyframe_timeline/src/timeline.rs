// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of all tracks in an editing session.
//!
//! Tracks live in a single store keyed by object UUID, then property. Scene
//! ids are a secondary lookup into that store, so a track can be reached
//! either way but only exists once.

use crate::binding::{ObjectUuid, SceneId, TrackKey};
use crate::config::TimelineConfig;
use crate::error::{Result, TimelineError};
use crate::events::{ListenerId, SharedHub, TimelineEvent, TimelineHub, TrackLink};
use crate::keyframe::Vec3;
use crate::precompute::{frame_count, PrecomputedData};
use crate::snapshot::{self, DecodedSnapshot, LoadReport, TimelineSnapshot, TrackBackup};
use crate::track::{TrackData, TrackIssue};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Structural problem reported by [`TimelineData::validate`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineIssue {
    /// A track failed its own validation
    #[error("{key}: {issue}")]
    Track {
        /// Track with the problem
        key: TrackKey,
        /// Track-level problem
        issue: TrackIssue,
    },
    /// A scene id points at an object with no tracks
    #[error("scene id {id} points at object {object}, which has no tracks")]
    DanglingSceneId {
        /// Scene id
        id: SceneId,
        /// Object it points at
        object: ObjectUuid,
    },
    /// A track ends after the timeline's max time
    #[error("{key} ends at {last_time}, after max time {max_time}")]
    MaxTimeBehind {
        /// Track that ends late
        key: TrackKey,
        /// Time of its last keyframe
        last_time: f32,
        /// Timeline max time
        max_time: f32,
    },
}

/// Counts describing a timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimelineStats {
    /// Objects with at least one track
    pub object_count: usize,
    /// Tracks across all objects
    pub track_count: usize,
    /// Keyframes across all tracks
    pub keyframe_count: usize,
    /// Timeline max time
    pub max_time: f32,
    /// Bytes held by track buffers
    pub track_bytes: usize,
    /// Bytes held by precomputed buffers
    pub precomputed_bytes: usize,
}

/// Outcome of [`TimelineData::merge_tracks`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Keyframes copied in
    pub merged_count: usize,
    /// Keyframes skipped because this timeline already had one at that time
    pub conflict_count: usize,
    /// Tracks that did not exist before the merge
    pub tracks_created: usize,
}

/// Outcome of [`TimelineData::cleanup_tracks`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    /// Statistics before cleanup
    pub before: TimelineStats,
    /// Statistics after cleanup
    pub after: TimelineStats,
    /// Empty tracks removed
    pub removed_tracks: usize,
    /// Tracks whose buffers shrank
    pub optimized_tracks: usize,
    /// Problems still present after cleanup
    #[serde(skip)]
    pub issues: Vec<TimelineIssue>,
    /// Whether precomputed buffers were rebuilt
    pub recomputed: bool,
}

/// All animation tracks of an editing session
#[derive(Debug)]
pub struct TimelineData {
    config: TimelineConfig,
    tracks: IndexMap<ObjectUuid, IndexMap<String, TrackData>>,
    scene_ids: HashMap<SceneId, ObjectUuid>,
    hub: SharedHub,
    precomputed: PrecomputedData,
}

impl TimelineData {
    /// Create an empty timeline with default settings
    pub fn new() -> Self {
        Self::build(TimelineConfig::default())
    }

    /// Create an empty timeline with validated settings
    pub fn with_config(config: TimelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: TimelineConfig) -> Self {
        Self {
            config,
            tracks: IndexMap::new(),
            scene_ids: HashMap::new(),
            hub: TimelineHub::shared(),
            precomputed: PrecomputedData::default(),
        }
    }

    /// Active settings
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Frames per second used for precomputation
    pub fn frame_rate(&self) -> f32 {
        self.config.frame_rate
    }

    /// Change the frame rate; marks the timeline dirty
    pub fn set_frame_rate(&mut self, frame_rate: f32) -> Result<()> {
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(TimelineError::InvalidFrameRate(frame_rate));
        }
        self.config.frame_rate = frame_rate;
        self.mark_dirty();
        Ok(())
    }

    /// Convert time to frame number
    pub fn time_to_frame(&self, time: f32) -> usize {
        (time * self.config.frame_rate).max(0.0) as usize
    }

    /// Convert frame number to time
    pub fn frame_to_time(&self, frame: usize) -> f32 {
        frame as f32 / self.config.frame_rate
    }

    /// Latest keyframe time seen by any track
    pub fn max_time(&self) -> f32 {
        self.hub.lock().max_time
    }

    /// Raise max time to `time` if it is later; marks the timeline dirty
    pub fn update_max_time(&mut self, time: f32) {
        if !time.is_finite() {
            return;
        }
        let mut hub = self.hub.lock();
        hub.max_time = hub.max_time.max(time);
        hub.dirty = true;
    }

    /// Whether precomputed buffers are stale
    pub fn is_dirty(&self) -> bool {
        self.hub.lock().dirty
    }

    /// Force the next precompute to rebuild
    pub fn mark_dirty(&mut self) {
        self.hub.lock().dirty = true;
    }

    /// Get the track for an object property, creating it if needed.
    ///
    /// Repeated calls return the same track. A supplied scene id is bound to
    /// the object either way.
    pub fn add_track(
        &mut self,
        object: ObjectUuid,
        property: &str,
        scene_id: Option<SceneId>,
    ) -> &mut TrackData {
        if let Some(id) = scene_id {
            self.register_scene_id(id, object);
        }

        let capacity = self.config.track_capacity;
        let hub = &self.hub;
        match self.tracks.entry(object).or_default().entry(property.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let key = TrackKey::new(object, property);
                let mut track = TrackData::with_capacity(capacity);
                track.attach(TrackLink {
                    key: key.clone(),
                    hub: hub.clone(),
                });
                hub.lock().publish(TimelineEvent::TrackCreated(key));
                entry.insert(track)
            }
        }
    }

    /// Bind a scene id to an object; returns the previous object if it differed
    pub fn register_scene_id(&mut self, id: SceneId, object: ObjectUuid) -> Option<ObjectUuid> {
        self.scene_ids.insert(id, object).filter(|previous| *previous != object)
    }

    /// Object a scene id is bound to
    pub fn object_for_scene_id(&self, id: SceneId) -> Option<ObjectUuid> {
        self.scene_ids.get(&id).copied()
    }

    /// Track of an object property
    pub fn track(&self, object: ObjectUuid, property: &str) -> Option<&TrackData> {
        self.tracks.get(&object)?.get(property)
    }

    /// Mutable track of an object property
    pub fn track_mut(&mut self, object: ObjectUuid, property: &str) -> Option<&mut TrackData> {
        self.tracks.get_mut(&object)?.get_mut(property)
    }

    /// Track of an object property, looked up by scene id
    pub fn track_by_id(&self, id: SceneId, property: &str) -> Option<&TrackData> {
        self.track(self.object_for_scene_id(id)?, property)
    }

    /// Mutable track of an object property, looked up by scene id
    pub fn track_by_id_mut(&mut self, id: SceneId, property: &str) -> Option<&mut TrackData> {
        let object = self.object_for_scene_id(id)?;
        self.track_mut(object, property)
    }

    /// Tracks of one object by property; empty if the object has none
    pub fn object_tracks(&self, object: ObjectUuid) -> impl Iterator<Item = (&str, &TrackData)> {
        self.tracks
            .get(&object)
            .into_iter()
            .flat_map(|properties| properties.iter().map(|(p, t)| (p.as_str(), t)))
    }

    /// Tracks of one object, looked up by scene id
    pub fn object_tracks_by_id(&self, id: SceneId) -> impl Iterator<Item = (&str, &TrackData)> {
        self.object_for_scene_id(id)
            .and_then(|object| self.tracks.get(&object))
            .into_iter()
            .flat_map(|properties| properties.iter().map(|(p, t)| (p.as_str(), t)))
    }

    /// Every track with its object and property
    pub fn tracks(&self) -> impl Iterator<Item = (ObjectUuid, &str, &TrackData)> {
        self.tracks.iter().flat_map(|(object, properties)| {
            properties
                .iter()
                .map(move |(property, track)| (*object, property.as_str(), track))
        })
    }

    /// Keys of every track
    pub fn track_keys(&self) -> Vec<TrackKey> {
        self.tracks()
            .map(|(object, property, _)| TrackKey::new(object, property))
            .collect()
    }

    /// Number of tracks
    pub fn track_count(&self) -> usize {
        self.tracks.values().map(IndexMap::len).sum()
    }

    /// Number of objects with tracks
    pub fn object_count(&self) -> usize {
        self.tracks.len()
    }

    /// Remove one property track.
    ///
    /// Removing an object's last track drops the object and every scene id
    /// bound to it.
    pub fn remove_track(&mut self, object: ObjectUuid, property: &str) -> Option<TrackData> {
        let properties = self.tracks.get_mut(&object)?;
        let mut track = properties.shift_remove(property)?;
        track.detach();
        if properties.is_empty() {
            self.tracks.shift_remove(&object);
            self.scene_ids.retain(|_, bound| *bound != object);
        }
        self.hub
            .lock()
            .publish(TimelineEvent::TrackRemoved(TrackKey::new(object, property)));
        Some(track)
    }

    /// Remove one property track, looked up by scene id
    pub fn remove_track_by_id(&mut self, id: SceneId, property: &str) -> Option<TrackData> {
        let object = self.object_for_scene_id(id)?;
        self.remove_track(object, property)
    }

    /// Remove every track of an object; returns how many were removed
    pub fn remove_object(&mut self, object: ObjectUuid) -> usize {
        let properties: Vec<String> = match self.tracks.get(&object) {
            Some(properties) => properties.keys().cloned().collect(),
            None => return 0,
        };
        properties
            .iter()
            .filter(|property| self.remove_track(object, property).is_some())
            .count()
    }

    /// Remove every track and reset max time
    pub fn clear(&mut self) {
        for key in self.track_keys() {
            self.remove_track(key.object, &key.property);
        }
        self.scene_ids.clear();
        self.precomputed = PrecomputedData::default();
        let mut hub = self.hub.lock();
        hub.max_time = 0.0;
        hub.dirty = true;
    }

    /// Interpolated value of one track at `time`
    pub fn value_at_time(&self, object: ObjectUuid, property: &str, time: f32) -> Option<Vec3> {
        self.track(object, property)?.value_at_time(time)
    }

    /// Frames the next precompute will cover
    pub fn total_frames(&self) -> usize {
        frame_count(
            self.max_time(),
            self.config.frame_rate,
            self.config.precompute_margin,
        )
    }

    /// Rebuild the dense playback buffers if anything changed.
    ///
    /// Blocks until every track is sampled; call it before playback starts,
    /// not per frame. Returns false when the buffers were already current.
    pub fn precompute_animation_data(&mut self) -> bool {
        if !self.is_dirty() {
            return false;
        }
        let total_frames = self.total_frames();
        let precomputed =
            PrecomputedData::build(self.tracks(), total_frames, self.config.frame_rate);
        tracing::debug!(
            "Precomputed {} frames for {} tracks ({} bytes)",
            total_frames,
            precomputed.buffer_count(),
            precomputed.memory_bytes()
        );
        self.precomputed = precomputed;
        self.hub.lock().dirty = false;
        true
    }

    /// Buffers from the last precompute
    pub fn precomputed(&self) -> &PrecomputedData {
        &self.precomputed
    }

    /// Plain-data copy of the authored keyframes
    pub fn to_snapshot(&self) -> TimelineSnapshot {
        let mut tracks: IndexMap<ObjectUuid, IndexMap<String, _>> = IndexMap::new();
        for (object, property, track) in self.tracks() {
            tracks
                .entry(object)
                .or_default()
                .insert(property.to_string(), track.snapshot());
        }
        TimelineSnapshot {
            tracks,
            max_time: self.max_time(),
            frame_rate: self.config.frame_rate,
        }
    }

    /// Snapshot as a JSON value
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.to_snapshot())?)
    }

    /// Snapshot as a pretty JSON string
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_snapshot())?)
    }

    /// Snapshot as RON
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            &self.to_snapshot(),
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Build a timeline from a JSON snapshot
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut timeline = Self::new();
        timeline.load_json(value)?;
        Ok(timeline)
    }

    /// Build a timeline from a JSON string
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_json(&value)
    }

    /// Build a timeline from a RON snapshot
    pub fn from_ron(s: &str) -> Result<Self> {
        let snapshot: TimelineSnapshot = ron::from_str(s)?;
        let mut timeline = Self::new();
        timeline.load_snapshot(snapshot);
        Ok(timeline)
    }

    /// Replace all tracks with those of a JSON snapshot.
    ///
    /// Malformed objects and tracks are skipped and counted in the report.
    /// Only a non-object root fails, in which case nothing is changed.
    pub fn load_json(&mut self, value: &Value) -> Result<LoadReport> {
        let decoded = snapshot::decode_json(value)?;
        Ok(self.apply(decoded))
    }

    /// Replace all tracks with those of a typed snapshot
    pub fn load_snapshot(&mut self, snapshot: TimelineSnapshot) -> LoadReport {
        self.apply(DecodedSnapshot::from(snapshot))
    }

    fn apply(&mut self, decoded: DecodedSnapshot) -> LoadReport {
        self.clear();
        if let Some(frame_rate) = decoded.frame_rate {
            if self.set_frame_rate(frame_rate).is_err() {
                tracing::warn!("Ignoring invalid frame rate {} in snapshot", frame_rate);
            }
        }

        let mut report = LoadReport {
            tracks_skipped: decoded.skipped,
            ..Default::default()
        };
        for (object, property, snapshot) in decoded.tracks {
            let track = self.add_track(object, &property, None);
            for keyframe in snapshot.keyframes() {
                match track.add_keyframe(keyframe.time, keyframe.value, keyframe.interpolation) {
                    Ok(_) => report.keyframes_loaded += 1,
                    Err(_) => report.keyframes_skipped += 1,
                }
            }
            report.tracks_loaded += 1;
        }
        if let Some(max_time) = decoded.max_time {
            self.update_max_time(max_time);
        }
        self.mark_dirty();

        tracing::info!(
            "Loaded {} tracks ({} keyframes); skipped {} tracks, {} keyframes",
            report.tracks_loaded,
            report.keyframes_loaded,
            report.tracks_skipped,
            report.keyframes_skipped
        );
        report
    }

    /// Binary copy of every track, for restoring after a failed edit
    pub fn backup_tracks(&self) -> Result<TrackBackup> {
        TrackBackup::from_snapshot(&self.to_snapshot())
    }

    /// Replace every track with the contents of a backup
    ///
    /// Scene ids survive the restore when their object still has tracks.
    pub fn restore_tracks(&mut self, backup: &TrackBackup) -> Result<LoadReport> {
        let snapshot = backup.to_snapshot()?;
        tracing::info!("Restoring {} tracks from backup", backup.track_count);
        let scene_ids = std::mem::take(&mut self.scene_ids);
        let report = self.load_snapshot(snapshot);
        self.scene_ids = scene_ids;
        self.scene_ids
            .retain(|_, object| self.tracks.contains_key(object));
        Ok(report)
    }

    /// Copy keyframes from another timeline.
    ///
    /// Keyframes at times this timeline already has are counted as
    /// conflicts and skipped; existing keyframes are never overwritten.
    /// Scene ids of the other timeline are adopted where unbound here.
    pub fn merge_tracks(&mut self, other: &TimelineData) -> MergeReport {
        let mut report = MergeReport::default();

        for (id, object) in &other.scene_ids {
            self.scene_ids.entry(*id).or_insert(*object);
        }

        for (object, property, source) in other.tracks() {
            if self.track(object, property).is_none() {
                report.tracks_created += 1;
            }
            let target = self.add_track(object, property, None);
            for keyframe in source.keyframes() {
                if target.find_keyframe_index(keyframe.time).is_some() {
                    report.conflict_count += 1;
                    continue;
                }
                match target.add_keyframe(keyframe.time, keyframe.value, keyframe.interpolation) {
                    Ok(_) => report.merged_count += 1,
                    Err(e) => {
                        tracing::warn!("Could not merge keyframe into {}.{}: {}", object, property, e);
                        report.conflict_count += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Merged {} keyframes ({} conflicts, {} new tracks)",
            report.merged_count,
            report.conflict_count,
            report.tracks_created
        );
        report
    }

    /// Check every track and the scene id table; returns every problem found
    pub fn validate(&self) -> Vec<TimelineIssue> {
        let max_time = self.max_time();
        let mut issues = Vec::new();

        for (object, property, track) in self.tracks() {
            for issue in track.validate() {
                issues.push(TimelineIssue::Track {
                    key: TrackKey::new(object, property),
                    issue,
                });
            }
            if let Some(last_time) = track.last_time().filter(|t| *t > max_time) {
                issues.push(TimelineIssue::MaxTimeBehind {
                    key: TrackKey::new(object, property),
                    last_time,
                    max_time,
                });
            }
        }

        for (id, object) in &self.scene_ids {
            if !self.tracks.contains_key(object) {
                issues.push(TimelineIssue::DanglingSceneId {
                    id: *id,
                    object: *object,
                });
            }
        }

        issues
    }

    /// Drop empty tracks, shrink oversized buffers, validate, and recompute if needed
    pub fn cleanup_tracks(&mut self) -> CleanupReport {
        let before = self.stats();

        let empty: Vec<TrackKey> = self
            .tracks()
            .filter(|(_, _, track)| track.is_empty())
            .map(|(object, property, _)| TrackKey::new(object, property))
            .collect();
        for key in &empty {
            self.remove_track(key.object, &key.property);
        }

        let optimized_tracks = self
            .tracks
            .values_mut()
            .flat_map(IndexMap::values_mut)
            .map(TrackData::optimize_memory)
            .filter(|shrunk| *shrunk)
            .count();

        let issues = self.validate();
        for issue in &issues {
            tracing::warn!("Timeline validation: {}", issue);
        }

        let recomputed = self.precompute_animation_data();
        let after = self.stats();
        tracing::info!(
            "Cleanup removed {} empty tracks, optimized {}",
            empty.len(),
            optimized_tracks
        );

        CleanupReport {
            before,
            after,
            removed_tracks: empty.len(),
            optimized_tracks,
            issues,
            recomputed,
        }
    }

    /// Counts and memory use
    pub fn stats(&self) -> TimelineStats {
        let mut stats = TimelineStats {
            object_count: self.tracks.len(),
            max_time: self.max_time(),
            precomputed_bytes: self.precomputed.memory_bytes(),
            ..Default::default()
        };
        for (_, _, track) in self.tracks() {
            stats.track_count += 1;
            stats.keyframe_count += track.keyframe_count();
            stats.track_bytes += track.memory_usage().total_bytes;
        }
        stats
    }

    /// Register a listener for timeline events, including every track's keyframe events
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&TimelineEvent) + Send + 'static,
    {
        self.hub.lock().bus.subscribe(listener)
    }

    /// Remove a listener registered with [`Self::subscribe`]
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.hub.lock().bus.unsubscribe(id)
    }
}

impl Default for TimelineData {
    fn default() -> Self {
        Self::new()
    }
}

// Deep copy of tracks and state; listeners are not carried over.
impl Clone for TimelineData {
    fn clone(&self) -> Self {
        let hub = TimelineHub::shared();
        {
            let source = self.hub.lock();
            let mut target = hub.lock();
            target.dirty = source.dirty;
            target.max_time = source.max_time;
        }

        let tracks = self
            .tracks
            .iter()
            .map(|(object, properties)| {
                let properties = properties
                    .iter()
                    .map(|(property, track)| {
                        let mut copy = track.clone();
                        copy.attach(TrackLink {
                            key: TrackKey::new(*object, property.as_str()),
                            hub: hub.clone(),
                        });
                        (property.clone(), copy)
                    })
                    .collect();
                (*object, properties)
            })
            .collect();

        Self {
            config: self.config.clone(),
            tracks,
            scene_ids: self.scene_ids.clone(),
            hub,
            precomputed: self.precomputed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackError;
    use crate::events::TrackEvent;
    use crate::keyframe::InterpolationMode;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    const LINEAR: InterpolationMode = InterpolationMode::Linear;

    fn object(n: u128) -> ObjectUuid {
        ObjectUuid(uuid::Uuid::from_u128(n))
    }

    fn assert_vec3_near(actual: Vec3, expected: Vec3, tolerance: f32) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() <= tolerance, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_add_track_is_idempotent() {
        let mut timeline = TimelineData::new();
        let first: *const TrackData = timeline.add_track(object(1), "position", None);
        let second: *const TrackData = timeline.add_track(object(1), "position", Some(SceneId(7)));
        assert_eq!(first, second);
        assert_eq!(timeline.track_count(), 1);
        assert!(timeline.track_by_id(SceneId(7), "position").is_some());
    }

    #[test]
    fn test_lookups_return_none_or_empty() {
        let timeline = TimelineData::new();
        assert!(timeline.track(object(1), "position").is_none());
        assert!(timeline.track_by_id(SceneId(3), "position").is_none());
        assert_eq!(timeline.object_tracks(object(1)).count(), 0);
        assert_eq!(timeline.object_tracks_by_id(SceneId(3)).count(), 0);
        assert_eq!(timeline.value_at_time(object(1), "position", 0.0), None);
    }

    #[test]
    fn test_keyframe_edits_update_max_time_and_dirty() {
        let mut timeline = TimelineData::new();
        let track = timeline.add_track(object(1), "position", None);
        track.add_keyframe(0.0, [0.0; 3], LINEAR).unwrap();
        track.add_keyframe(2.5, [1.0; 3], LINEAR).unwrap();
        assert_eq!(timeline.max_time(), 2.5);

        timeline.precompute_animation_data();
        assert!(!timeline.is_dirty());

        let track = timeline.track_mut(object(1), "position").unwrap();
        track.update_keyframe_value(0, [5.0; 3]).unwrap();
        assert!(timeline.is_dirty());

        // Removing the last keyframe leaves max time where it was
        let track = timeline.track_mut(object(1), "position").unwrap();
        track.remove_keyframe(2.5).unwrap();
        assert_eq!(timeline.max_time(), 2.5);

        timeline.update_max_time(1.0);
        assert_eq!(timeline.max_time(), 2.5);
        timeline.update_max_time(4.0);
        assert_eq!(timeline.max_time(), 4.0);
    }

    #[test]
    fn test_track_events_forwarded() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let mut timeline = TimelineData::new();
        let sink = names.clone();
        timeline.subscribe(move |event| sink.lock().push(event.name()));

        let track = timeline.add_track(object(1), "position", None);
        track.add_keyframe(0.0, [0.0; 3], LINEAR).unwrap();
        track.update_keyframe_time(0, 1.0).unwrap();
        track.update_keyframe_value(0, [1.0; 3]).unwrap();
        track.remove_keyframe_by_index(0).unwrap();
        timeline.remove_track(object(1), "position");

        assert_eq!(
            *names.lock(),
            vec![
                "track_created",
                "track_added",
                "track_moved",
                "track_updated",
                "track_removed",
                "track_deleted",
            ]
        );
    }

    #[test]
    fn test_track_listener_and_timeline_listener_both_fire() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut timeline = TimelineData::new();
        let timeline_sink = seen.clone();
        timeline.subscribe(move |event| {
            if let TimelineEvent::Track { key, event } = event {
                timeline_sink.lock().push(format!("{}:{}", key.property, event.kind().name()));
            }
        });
        let track_sink = seen.clone();
        let track = timeline.add_track(object(1), "scale", None);
        track.subscribe(move |event: &TrackEvent| {
            track_sink.lock().push(format!("track:{}", event.kind().name()));
        });
        track.add_keyframe(0.0, [1.0; 3], LINEAR).unwrap();

        assert_eq!(*seen.lock(), vec!["track:added", "scale:added"]);
    }

    #[test]
    fn test_scene_id_removal_keeps_indices_in_sync() {
        let mut timeline = TimelineData::new();
        timeline.add_track(object(1), "position", Some(SceneId(10)));
        timeline.add_track(object(1), "rotation", None);

        assert!(timeline.remove_track_by_id(SceneId(10), "position").is_some());
        assert!(timeline.track(object(1), "position").is_none());
        assert!(timeline.track_by_id(SceneId(10), "rotation").is_some());

        // Last property gone: the object and its scene id go with it
        assert!(timeline.remove_track(object(1), "rotation").is_some());
        assert_eq!(timeline.object_for_scene_id(SceneId(10)), None);
        assert!(timeline.track_by_id(SceneId(10), "rotation").is_none());
        assert_eq!(timeline.object_count(), 0);
        assert!(timeline.remove_track_by_id(SceneId(10), "rotation").is_none());
    }

    #[test]
    fn test_removed_track_stops_forwarding() {
        let mut timeline = TimelineData::new();
        timeline.add_track(object(1), "position", None);
        let mut track = timeline.remove_track(object(1), "position").unwrap();
        timeline.precompute_animation_data();

        track.add_keyframe(9.0, [0.0; 3], LINEAR).unwrap();
        assert!(!timeline.is_dirty());
        assert_eq!(timeline.max_time(), 0.0);
    }

    #[test]
    fn test_precompute_buffers() {
        let mut timeline = TimelineData::new();
        let track = timeline.add_track(object(1), "position", None);
        track.add_keyframe(0.0, [0.0, 0.0, 0.0], LINEAR).unwrap();
        track.add_keyframe(1.0, [10.0, 0.0, 0.0], LINEAR).unwrap();
        track.add_keyframe(2.0, [10.0, 20.0, 0.0], InterpolationMode::Step).unwrap();
        timeline.add_track(object(2), "scale", None);

        assert!(timeline.precompute_animation_data());
        let total_frames = timeline.precomputed().total_frames();
        assert_eq!(total_frames, 66);
        assert_eq!(timeline.total_frames(), 66);

        let buffer = timeline.precomputed().buffer(&object(1), "position").unwrap();
        assert_eq!(buffer.len(), 198);
        for frame in [0, 7, 15, 30, 44, 60, total_frames - 1] {
            let expected = timeline
                .value_at_time(object(1), "position", timeline.frame_to_time(frame))
                .unwrap();
            let sampled = timeline.precomputed().frame(&object(1), "position", frame).unwrap();
            assert_vec3_near(sampled, expected, 1e-4);
        }

        // Empty tracks precompute to zeros
        let empty = timeline.precomputed().buffer(&object(2), "scale").unwrap();
        assert!(empty.iter().all(|v| *v == 0.0));

        assert!(!timeline.precompute_animation_data());
        timeline.set_frame_rate(60.0).unwrap();
        assert!(timeline.precompute_animation_data());
        assert_eq!(timeline.precomputed().total_frames(), 132);
    }

    #[test]
    fn test_precompute_length_at_default_frame_rate() {
        let mut timeline = TimelineData::new();
        let track = timeline.add_track(object(1), "position", None);
        track.add_keyframe(0.0, [0.0; 3], LINEAR).unwrap();
        track.add_keyframe(1.0, [1.0; 3], LINEAR).unwrap();

        timeline.precompute_animation_data();
        assert_eq!(timeline.precomputed().total_frames(), 33);
        assert_eq!(timeline.precomputed().buffer(&object(1), "position").unwrap().len(), 99);
    }

    #[test]
    fn test_json_round_trip() {
        let mut timeline = TimelineData::new();
        let track = timeline.add_track(object(1), "position", Some(SceneId(4)));
        track.add_keyframe(1.5, [1.0, 2.0, 3.0], InterpolationMode::Bezier).unwrap();
        track.add_keyframe(0.25, [-1.0, 0.5, 8.0], InterpolationMode::Step).unwrap();
        let track = timeline.add_track(object(2), "scale", None);
        track.add_keyframe(3.0, [2.0, 2.0, 2.0], LINEAR).unwrap();

        let json = timeline.to_json().unwrap();
        let restored = TimelineData::from_json(&json).unwrap();

        assert!(restored.is_dirty());
        assert_eq!(restored.track_count(), 2);
        assert!((restored.max_time() - 3.0).abs() < 1e-3);
        for (object, property, track) in timeline.tracks() {
            let original = track.keyframes();
            let loaded = restored.track(object, property).unwrap().keyframes();
            assert_eq!(original.len(), loaded.len());
            for (a, b) in original.iter().zip(&loaded) {
                assert!((a.time - b.time).abs() < 1e-3);
                assert_vec3_near(a.value, b.value, 1e-3);
                assert_eq!(a.interpolation, b.interpolation);
            }
        }
        // Scene ids are ephemeral and not persisted
        assert!(restored.track_by_id(SceneId(4), "position").is_none());
    }

    #[test]
    fn test_json_string_and_ron_round_trip() {
        let mut timeline = TimelineData::with_config(TimelineConfig::default().with_frame_rate(24.0)).unwrap();
        let track = timeline.add_track(object(3), "position", None);
        track.add_keyframe(0.0, [0.0; 3], LINEAR).unwrap();
        track.add_keyframe(1.0, [1.0; 3], LINEAR).unwrap();

        let from_str = TimelineData::from_json_str(&timeline.to_json_string().unwrap()).unwrap();
        assert_eq!(from_str.frame_rate(), 24.0);
        assert_eq!(from_str.to_snapshot(), timeline.to_snapshot());

        let from_ron = TimelineData::from_ron(&timeline.to_ron().unwrap()).unwrap();
        assert_eq!(from_ron.to_snapshot(), timeline.to_snapshot());
    }

    #[test]
    fn test_load_json_skips_malformed_tracks() {
        let good = object(1).to_string();
        let data = json!({
            "tracks": {
                good: {
                    "position": {
                        "times": [1.0, 0.0, 1.0],
                        "values": [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0],
                        "interpolations": [0, 0, 0]
                    },
                    "rotation": { "times": [0.0], "values": [] }
                },
                "garbage": { "position": {} }
            },
            "maxTime": 5.0,
            "frameRate": -3.0
        });

        let mut timeline = TimelineData::new();
        timeline.add_track(object(9), "position", None);
        let report = timeline.load_json(&data).unwrap();

        assert_eq!(report.tracks_loaded, 1);
        assert_eq!(report.tracks_skipped, 2);
        assert_eq!(report.keyframes_loaded, 2);
        assert_eq!(report.keyframes_skipped, 1);
        assert!(timeline.track(object(9), "position").is_none());
        assert_eq!(timeline.track(object(1), "position").unwrap().times(), &[0.0, 1.0]);
        assert_eq!(timeline.max_time(), 5.0);
        assert_eq!(timeline.frame_rate(), 30.0);
        assert!(timeline.is_dirty());

        assert!(matches!(
            timeline.load_json(&json!("timeline")),
            Err(TimelineError::MalformedSerializedData(_))
        ));
        assert_eq!(timeline.track_count(), 1);
    }

    #[test]
    fn test_merge_counts_conflicts() {
        let mut base = TimelineData::new();
        base.add_track(object(1), "position", None)
            .add_keyframe(1.0, [1.0; 3], LINEAR)
            .unwrap();

        let mut other = TimelineData::new();
        let track = other.add_track(object(1), "position", Some(SceneId(2)));
        track.add_keyframe(1.0, [9.0; 3], LINEAR).unwrap();
        track.add_keyframe(2.0, [2.0; 3], LINEAR).unwrap();

        let report = base.merge_tracks(&other);
        assert_eq!(report.merged_count, 1);
        assert_eq!(report.conflict_count, 1);
        assert_eq!(report.tracks_created, 0);

        let merged = base.track(object(1), "position").unwrap();
        assert_eq!(merged.times(), &[1.0, 2.0]);
        assert_eq!(merged.keyframe(0).unwrap().value, [1.0; 3]);
        assert_eq!(base.max_time(), 2.0);
        assert_eq!(base.object_for_scene_id(SceneId(2)), Some(object(1)));
    }

    #[test]
    fn test_merge_creates_missing_tracks() {
        let mut base = TimelineData::new();
        let mut other = TimelineData::new();
        other
            .add_track(object(5), "scale", None)
            .add_keyframe(0.5, [1.0; 3], LINEAR)
            .unwrap();

        let report = base.merge_tracks(&other);
        assert_eq!(report.tracks_created, 1);
        assert_eq!(report.merged_count, 1);
        assert!(base.track(object(5), "scale").is_some());
    }

    #[test]
    fn test_backup_and_restore() {
        let mut timeline = TimelineData::new();
        timeline
            .add_track(object(1), "position", None)
            .add_keyframe(0.5, [1.0; 3], LINEAR)
            .unwrap();
        let backup = timeline.backup_tracks().unwrap();
        assert_eq!(backup.track_count, 1);

        timeline.track_mut(object(1), "position").unwrap().clear();
        timeline.add_track(object(2), "scale", None);
        assert_eq!(timeline.track_count(), 2);

        let report = timeline.restore_tracks(&backup).unwrap();
        assert_eq!(report.tracks_loaded, 1);
        assert_eq!(timeline.track_count(), 1);
        assert_eq!(timeline.track(object(1), "position").unwrap().keyframe_count(), 1);
    }

    #[test]
    fn test_restore_keeps_scene_ids_of_restored_objects() {
        let mut timeline = TimelineData::new();
        timeline
            .add_track(object(1), "position", Some(SceneId(7)))
            .add_keyframe(0.5, [1.0; 3], LINEAR)
            .unwrap();
        let backup = timeline.backup_tracks().unwrap();

        timeline
            .track_mut(object(1), "position")
            .unwrap()
            .add_keyframe(2.0, [0.0; 3], LINEAR)
            .unwrap();
        timeline.add_track(object(2), "scale", Some(SceneId(8)));

        timeline.restore_tracks(&backup).unwrap();
        let restored = timeline.track_by_id(SceneId(7), "position").unwrap();
        assert_eq!(restored.keyframe_count(), 1);
        assert_eq!(timeline.object_tracks_by_id(SceneId(7)).count(), 1);
        // Object 2 has no tracks after the restore, so its id is dropped
        assert_eq!(timeline.object_for_scene_id(SceneId(8)), None);
        assert!(timeline.validate().is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut timeline = TimelineData::new();
        timeline
            .add_track(object(1), "position", Some(SceneId(1)))
            .add_keyframe(1.0, [1.0; 3], LINEAR)
            .unwrap();
        timeline.precompute_animation_data();

        let mut copy = timeline.clone();
        assert!(!copy.is_dirty());
        copy.track_mut(object(1), "position")
            .unwrap()
            .add_keyframe(6.0, [0.0; 3], LINEAR)
            .unwrap();

        assert!(copy.is_dirty());
        assert_eq!(copy.max_time(), 6.0);
        assert!(!timeline.is_dirty());
        assert_eq!(timeline.max_time(), 1.0);
        assert_eq!(timeline.track(object(1), "position").unwrap().keyframe_count(), 1);
        assert!(copy.track_by_id(SceneId(1), "position").is_some());
    }

    #[test]
    fn test_cleanup_removes_empty_tracks() {
        let mut timeline = TimelineData::new();
        timeline.add_track(object(1), "position", Some(SceneId(1)));
        let track = timeline.add_track(object(2), "scale", None);
        track.expand_capacity(8000);
        track.add_keyframe(1.0, [1.0; 3], LINEAR).unwrap();

        let report = timeline.cleanup_tracks();
        assert_eq!(report.before.track_count, 2);
        assert_eq!(report.after.track_count, 1);
        assert_eq!(report.removed_tracks, 1);
        assert_eq!(report.optimized_tracks, 1);
        assert!(report.issues.is_empty());
        assert!(report.recomputed);
        assert!(report.after.track_bytes < report.before.track_bytes);
        assert_eq!(timeline.object_for_scene_id(SceneId(1)), None);
    }

    #[test]
    fn test_validate_reports_dangling_scene_id() {
        let mut timeline = TimelineData::new();
        assert!(timeline.validate().is_empty());
        timeline.register_scene_id(SceneId(3), object(8));
        assert_eq!(
            timeline.validate(),
            vec![TimelineIssue::DanglingSceneId {
                id: SceneId(3),
                object: object(8)
            }]
        );
    }

    #[test]
    fn test_frame_rate_validation() {
        let mut timeline = TimelineData::new();
        assert!(matches!(
            timeline.set_frame_rate(0.0),
            Err(TimelineError::InvalidFrameRate(_))
        ));
        assert!(TimelineData::with_config(TimelineConfig::default().with_frame_rate(-1.0)).is_err());
        assert_eq!(timeline.time_to_frame(1.5), 45);
        assert_eq!(timeline.frame_to_time(15), 0.5);
    }

    #[test]
    fn test_track_errors_pass_through() {
        let mut timeline = TimelineData::new();
        let track = timeline.add_track(object(1), "position", None);
        track.add_keyframe(0.0, [0.0; 3], LINEAR).unwrap();
        assert!(matches!(
            track.add_keyframe(0.0, [1.0; 3], LINEAR),
            Err(TrackError::DuplicateTime { .. })
        ));
        let stats = timeline.stats();
        assert_eq!(stats.keyframe_count, 1);
        assert_eq!(stats.object_count, 1);
    }

    #[test]
    fn test_remove_object_and_clear() {
        let mut timeline = TimelineData::new();
        timeline.add_track(object(1), "position", None);
        timeline.add_track(object(1), "scale", None);
        timeline
            .add_track(object(2), "position", None)
            .add_keyframe(3.0, [0.0; 3], LINEAR)
            .unwrap();

        assert_eq!(timeline.remove_object(object(1)), 2);
        assert_eq!(timeline.remove_object(object(1)), 0);
        assert_eq!(timeline.track_count(), 1);

        timeline.clear();
        assert_eq!(timeline.track_count(), 0);
        assert_eq!(timeline.max_time(), 0.0);
    }
}
