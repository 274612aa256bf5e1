// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe storage for one animated property.
//!
//! A [`TrackData`] keeps its keyframes in three parallel buffers (times,
//! xyz values, interpolation codes) sized to the track capacity. Entries
//! `[0, keyframe_count)` are always sorted by strictly ascending time with
//! no two keyframes closer than `TIME_EPSILON`; anything past the active
//! range is scratch space.

use crate::error::TrackError;
use crate::events::{EventBus, ListenerId, TrackEvent, TrackLink};
use crate::keyframe::{
    same_time, validate_time, validate_value, Interpolation, InterpolationMode, Keyframe, Vec3,
};
use crate::snapshot::TrackSnapshot;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Initial buffer capacity of a new track
pub const DEFAULT_TRACK_CAPACITY: usize = 1000;

/// Hard ceiling on keyframes per track
pub const MAX_TRACK_CAPACITY: usize = 10_000;

/// Structural problem reported by [`TrackData::validate`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackIssue {
    /// More active keyframes than buffer slots
    #[error("keyframe count {count} exceeds capacity {capacity}")]
    CountExceedsCapacity {
        /// Active keyframes
        count: usize,
        /// Buffer slots
        capacity: usize,
    },
    /// Capacity above the per-track ceiling
    #[error("capacity {0} exceeds the {MAX_TRACK_CAPACITY} keyframe limit")]
    CapacityExceedsLimit(usize),
    /// A buffer is not sized to the capacity
    #[error("{buffer} buffer holds {actual} slots, expected {expected}")]
    BufferSizeMismatch {
        /// Buffer name
        buffer: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },
    /// Times are not strictly ascending
    #[error("time {time} at index {index} does not follow {previous}")]
    NonAscendingTime {
        /// Offending index
        index: usize,
        /// Time at `index - 1`
        previous: f32,
        /// Time at `index`
        time: f32,
    },
    /// Time or value component is NaN or infinite
    #[error("non-finite data at index {0}")]
    NonFinite(usize),
    /// Interpolation code with no matching mode
    #[error("unknown interpolation code {code} at index {index}")]
    UnknownInterpolation {
        /// Offending index
        index: usize,
        /// Stored code
        code: u8,
    },
}

/// Buffer sizes of a track, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    /// Bytes held by the time buffer
    pub times_bytes: usize,
    /// Bytes held by the value buffer
    pub values_bytes: usize,
    /// Bytes held by the interpolation buffer
    pub interpolations_bytes: usize,
    /// Sum of all buffers
    pub total_bytes: usize,
    /// Buffer slots
    pub capacity: usize,
    /// Active keyframes
    pub keyframe_count: usize,
    /// `keyframe_count / capacity`
    pub utilization: f32,
}

/// Sorted keyframe buffer for one (object, property) pair
#[derive(Debug)]
pub struct TrackData {
    capacity: usize,
    base_capacity: usize,
    keyframe_count: usize,
    times: Vec<f32>,
    values: Vec<f32>,
    interpolations: Vec<u8>,
    events: EventBus<TrackEvent>,
    link: Option<TrackLink>,
}

impl TrackData {
    /// Create an empty track with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRACK_CAPACITY)
    }

    /// Create an empty track; capacity is clamped to `1..=MAX_TRACK_CAPACITY`
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_TRACK_CAPACITY);
        Self {
            capacity,
            base_capacity: capacity,
            keyframe_count: 0,
            times: vec![0.0; capacity],
            values: vec![0.0; capacity * 3],
            interpolations: vec![0; capacity],
            events: EventBus::new(),
            link: None,
        }
    }

    /// Buffer slots currently allocated
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of active keyframes
    pub fn keyframe_count(&self) -> usize {
        self.keyframe_count
    }

    /// Whether the track has no keyframes
    pub fn is_empty(&self) -> bool {
        self.keyframe_count == 0
    }

    /// Sorted times of the active keyframes
    pub fn times(&self) -> &[f32] {
        &self.times[..self.keyframe_count]
    }

    /// Keyframe at `index`
    pub fn keyframe(&self, index: usize) -> Option<Keyframe> {
        (index < self.keyframe_count).then(|| self.read(index))
    }

    /// All keyframes in time order
    pub fn keyframes(&self) -> Vec<Keyframe> {
        (0..self.keyframe_count).map(|i| self.read(i)).collect()
    }

    /// Keyframes with `start <= time <= end`
    pub fn keyframes_in_range(&self, start: f32, end: f32) -> Vec<Keyframe> {
        let times = self.times();
        let from = times.partition_point(|&t| t < start);
        let to = times.partition_point(|&t| t <= end);
        (from..to.max(from)).map(|i| self.read(i)).collect()
    }

    /// Time of the first keyframe
    pub fn first_time(&self) -> Option<f32> {
        self.times().first().copied()
    }

    /// Time of the last keyframe
    pub fn last_time(&self) -> Option<f32> {
        self.times().last().copied()
    }

    /// Time of the last keyframe, or zero for an empty track
    pub fn duration(&self) -> f32 {
        self.last_time().unwrap_or(0.0)
    }

    /// Insert a keyframe, keeping time order; returns its index.
    ///
    /// Fails if a keyframe already exists within `TIME_EPSILON` of `time`
    /// (existing keyframes are never overwritten) or if the track is full
    /// at [`MAX_TRACK_CAPACITY`].
    pub fn add_keyframe(
        &mut self,
        time: f32,
        value: Vec3,
        interpolation: InterpolationMode,
    ) -> Result<usize, TrackError> {
        let result = self.try_add(Keyframe {
            time,
            value,
            interpolation,
        });
        if let Err(e) = &result {
            tracing::debug!("Rejected keyframe at {}: {}", time, e);
        }
        result
    }

    fn try_add(&mut self, keyframe: Keyframe) -> Result<usize, TrackError> {
        validate_time(keyframe.time)?;
        validate_value(keyframe.value)?;

        if let Some(existing) = self.find_keyframe_index(keyframe.time) {
            return Err(TrackError::DuplicateTime {
                time: keyframe.time,
                existing: self.times[existing],
            });
        }

        if self.keyframe_count == self.capacity {
            if self.capacity >= MAX_TRACK_CAPACITY {
                return Err(TrackError::CapacityExceeded {
                    max: MAX_TRACK_CAPACITY,
                });
            }
            self.expand_capacity(self.capacity * 2);
        }

        let index = self.insertion_point(keyframe.time);
        self.insert_at(index, keyframe);
        self.emit(TrackEvent::Added { index, keyframe });
        Ok(index)
    }

    /// Remove the keyframe at `index`
    pub fn remove_keyframe_by_index(&mut self, index: usize) -> Result<Keyframe, TrackError> {
        self.check_index(index)?;
        let keyframe = self.take_at(index);
        self.emit(TrackEvent::Removed { index, keyframe });
        Ok(keyframe)
    }

    /// Remove the keyframe within `TIME_EPSILON` of `time`
    pub fn remove_keyframe(&mut self, time: f32) -> Result<Keyframe, TrackError> {
        let index = self
            .find_keyframe_index(time)
            .ok_or(TrackError::KeyframeNotFound(time))?;
        self.remove_keyframe_by_index(index)
    }

    /// Move the keyframe at `index` to `new_time`; returns its new index.
    ///
    /// Moving onto the keyframe's own time is a successful no-op. Moving onto
    /// another keyframe's time fails.
    pub fn update_keyframe_time(&mut self, index: usize, new_time: f32) -> Result<usize, TrackError> {
        self.check_index(index)?;
        validate_time(new_time)?;

        let from_time = self.times[index];
        if same_time(from_time, new_time) {
            return Ok(index);
        }
        if let Some(other) = self.find_keyframe_index(new_time).filter(|&i| i != index) {
            let err = TrackError::DuplicateTime {
                time: new_time,
                existing: self.times[other],
            };
            tracing::debug!("Rejected keyframe move {} -> {}: {}", from_time, new_time, err);
            return Err(err);
        }

        let mut keyframe = self.take_at(index);
        keyframe.time = new_time;
        let new_index = self.insertion_point(new_time);
        self.insert_at(new_index, keyframe);
        self.emit(TrackEvent::Moved {
            from_time,
            index: new_index,
            keyframe,
        });
        Ok(new_index)
    }

    /// Replace the value of the keyframe at `index`
    pub fn update_keyframe_value(&mut self, index: usize, value: Vec3) -> Result<(), TrackError> {
        self.check_index(index)?;
        validate_value(value)?;

        let previous = self.read(index);
        self.values[index * 3..index * 3 + 3].copy_from_slice(&value);
        let keyframe = self.read(index);
        self.emit(TrackEvent::Updated {
            index,
            previous: previous.value,
            previous_interpolation: previous.interpolation,
            keyframe,
        });
        Ok(())
    }

    /// Change the interpolation mode of the keyframe at `index`
    pub fn update_keyframe_interpolation(
        &mut self,
        index: usize,
        interpolation: InterpolationMode,
    ) -> Result<(), TrackError> {
        self.check_index(index)?;
        let previous_interpolation = self.mode_at(index);
        self.interpolations[index] = interpolation.code();
        let keyframe = self.read(index);
        self.emit(TrackEvent::Updated {
            index,
            previous: keyframe.value,
            previous_interpolation,
            keyframe,
        });
        Ok(())
    }

    /// Remove every keyframe, last to first
    pub fn clear(&mut self) {
        while self.keyframe_count > 0 {
            let index = self.keyframe_count - 1;
            let keyframe = self.take_at(index);
            self.emit(TrackEvent::Removed { index, keyframe });
        }
    }

    /// Index of the keyframe within `TIME_EPSILON` of `time`
    pub fn find_keyframe_index(&self, time: f32) -> Option<usize> {
        self.find_closest_keyframe_index(time)
            .filter(|&i| same_time(self.times[i], time))
    }

    /// Index of the keyframe nearest to `time`; ties go to the earlier one
    pub fn find_closest_keyframe_index(&self, time: f32) -> Option<usize> {
        if self.keyframe_count == 0 || time.is_nan() {
            return None;
        }
        let times = self.times();
        let next = times.partition_point(|&t| t < time);
        if next == 0 {
            return Some(0);
        }
        if next == times.len() {
            return Some(next - 1);
        }
        let prev = next - 1;
        if (time - times[prev]).abs() <= (times[next] - time).abs() {
            Some(prev)
        } else {
            Some(next)
        }
    }

    /// Interpolated value at `time`.
    ///
    /// Times at or before the first keyframe return its value exactly, times
    /// at or after the last return the last value. In between, the earlier
    /// keyframe's mode decides how the bracketing pair is blended.
    pub fn value_at_time(&self, time: f32) -> Option<Vec3> {
        let count = self.keyframe_count;
        match count {
            0 => return None,
            1 => return Some(self.value_at(0)),
            _ => {}
        }

        let times = self.times();
        if time.is_nan() || time <= times[0] {
            return Some(self.value_at(0));
        }
        if time >= times[count - 1] {
            return Some(self.value_at(count - 1));
        }

        let next = times.partition_point(|&t| t <= time);
        let prev = next - 1;
        let (t0, t1) = (times[prev], times[next]);
        let t = (time - t0) / (t1 - t0);
        Some(Interpolation::blend(
            self.value_at(prev),
            self.value_at(next),
            t,
            self.mode_at(prev),
        ))
    }

    /// Fill `out` with one xyz sample per frame; frames are `i / frame_rate` seconds.
    ///
    /// An empty track fills zeros.
    pub fn sample_frames(&self, frame_rate: f32, out: &mut [f32]) {
        if self.keyframe_count == 0 {
            out.fill(0.0);
            return;
        }
        for (frame, slot) in out.chunks_exact_mut(3).enumerate() {
            if let Some(value) = self.value_at_time(frame as f32 / frame_rate) {
                slot.copy_from_slice(&value);
            }
        }
    }

    /// Grow the buffers to `new_capacity` slots (clamped to the ceiling); returns the capacity.
    ///
    /// Active keyframes are preserved. Shrinking is left to [`Self::optimize_memory`].
    pub fn expand_capacity(&mut self, new_capacity: usize) -> usize {
        let new_capacity = new_capacity.min(MAX_TRACK_CAPACITY);
        if new_capacity <= self.capacity {
            return self.capacity;
        }
        self.resize_buffers(new_capacity);
        tracing::debug!("Track capacity expanded to {}", new_capacity);
        self.capacity
    }

    /// Shrink over-provisioned buffers back toward the creation capacity.
    ///
    /// An empty track returns to its creation capacity; a track using less
    /// than a quarter of its slots shrinks to twice its keyframe count (never
    /// below the creation capacity). Returns true if the buffers shrank.
    pub fn optimize_memory(&mut self) -> bool {
        let target = if self.keyframe_count == 0 {
            self.base_capacity
        } else if self.keyframe_count < self.capacity / 4 {
            (self.keyframe_count * 2).max(self.base_capacity)
        } else {
            self.capacity
        };
        if target >= self.capacity {
            return false;
        }
        self.resize_buffers(target);
        self.times.shrink_to_fit();
        self.values.shrink_to_fit();
        self.interpolations.shrink_to_fit();
        tracing::debug!("Track capacity reduced to {}", target);
        true
    }

    /// Check buffer sizes and ordering; returns every problem found
    pub fn validate(&self) -> Vec<TrackIssue> {
        let mut issues = Vec::new();

        if self.keyframe_count > self.capacity {
            issues.push(TrackIssue::CountExceedsCapacity {
                count: self.keyframe_count,
                capacity: self.capacity,
            });
        }
        if self.capacity > MAX_TRACK_CAPACITY {
            issues.push(TrackIssue::CapacityExceedsLimit(self.capacity));
        }
        for (buffer, expected, actual) in [
            ("times", self.capacity, self.times.len()),
            ("values", self.capacity * 3, self.values.len()),
            ("interpolations", self.capacity, self.interpolations.len()),
        ] {
            if expected != actual {
                issues.push(TrackIssue::BufferSizeMismatch {
                    buffer,
                    expected,
                    actual,
                });
            }
        }

        let checkable = self
            .keyframe_count
            .min(self.times.len())
            .min(self.values.len() / 3)
            .min(self.interpolations.len());
        for index in 0..checkable {
            let time = self.times[index];
            let value = &self.values[index * 3..index * 3 + 3];
            if !time.is_finite() || value.iter().any(|c| !c.is_finite()) {
                issues.push(TrackIssue::NonFinite(index));
            }
            let code = self.interpolations[index];
            if InterpolationMode::from_code(code).is_none() {
                issues.push(TrackIssue::UnknownInterpolation { index, code });
            }
            if index > 0 {
                let previous = self.times[index - 1];
                if time.partial_cmp(&previous) != Some(Ordering::Greater) {
                    issues.push(TrackIssue::NonAscendingTime {
                        index,
                        previous,
                        time,
                    });
                }
            }
        }

        issues
    }

    /// Byte sizes of the buffers and slot utilization
    pub fn memory_usage(&self) -> MemoryUsage {
        let times_bytes = self.times.len() * size_of::<f32>();
        let values_bytes = self.values.len() * size_of::<f32>();
        let interpolations_bytes = self.interpolations.len() * size_of::<u8>();
        MemoryUsage {
            times_bytes,
            values_bytes,
            interpolations_bytes,
            total_bytes: times_bytes + values_bytes + interpolations_bytes,
            capacity: self.capacity,
            keyframe_count: self.keyframe_count,
            utilization: self.keyframe_count as f32 / self.capacity as f32,
        }
    }

    /// Register a listener for this track's keyframe events
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&TrackEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Remove a listener registered with [`Self::subscribe`]
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Sparse record of the active keyframes
    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            times: self.times().to_vec(),
            values: self.values[..self.keyframe_count * 3].to_vec(),
            interpolations: self.interpolations[..self.keyframe_count].to_vec(),
        }
    }

    /// Rebuild a standalone track from a sparse record.
    ///
    /// Unlike the lenient timeline loader this fails on the first keyframe
    /// that cannot be inserted.
    pub fn from_snapshot(snapshot: &TrackSnapshot) -> crate::error::Result<Self> {
        snapshot.check_shape()?;
        let mut track = Self::with_capacity(snapshot.len().max(DEFAULT_TRACK_CAPACITY));
        for keyframe in snapshot.keyframes() {
            track.add_keyframe(keyframe.time, keyframe.value, keyframe.interpolation)?;
        }
        Ok(track)
    }

    pub(crate) fn attach(&mut self, link: TrackLink) {
        self.link = Some(link);
    }

    pub(crate) fn detach(&mut self) {
        self.link = None;
    }

    fn emit(&mut self, event: TrackEvent) {
        self.events.emit(&event);
        if let Some(link) = &self.link {
            link.forward(&event);
        }
    }

    fn check_index(&self, index: usize) -> Result<(), TrackError> {
        if index < self.keyframe_count {
            Ok(())
        } else {
            Err(TrackError::OutOfRange {
                index,
                count: self.keyframe_count,
            })
        }
    }

    fn insertion_point(&self, time: f32) -> usize {
        self.times().partition_point(|&t| t < time)
    }

    fn insert_at(&mut self, index: usize, keyframe: Keyframe) {
        let count = self.keyframe_count;
        self.times.copy_within(index..count, index + 1);
        self.values.copy_within(index * 3..count * 3, index * 3 + 3);
        self.interpolations.copy_within(index..count, index + 1);
        self.write(index, keyframe);
        self.keyframe_count += 1;
    }

    fn take_at(&mut self, index: usize) -> Keyframe {
        let keyframe = self.read(index);
        let count = self.keyframe_count;
        self.times.copy_within(index + 1..count, index);
        self.values.copy_within((index + 1) * 3..count * 3, index * 3);
        self.interpolations.copy_within(index + 1..count, index);
        self.keyframe_count -= 1;
        keyframe
    }

    fn read(&self, index: usize) -> Keyframe {
        Keyframe {
            time: self.times[index],
            value: self.value_at(index),
            interpolation: self.mode_at(index),
        }
    }

    fn write(&mut self, index: usize, keyframe: Keyframe) {
        self.times[index] = keyframe.time;
        self.values[index * 3..index * 3 + 3].copy_from_slice(&keyframe.value);
        self.interpolations[index] = keyframe.interpolation.code();
    }

    fn value_at(&self, index: usize) -> Vec3 {
        let base = index * 3;
        [self.values[base], self.values[base + 1], self.values[base + 2]]
    }

    fn mode_at(&self, index: usize) -> InterpolationMode {
        InterpolationMode::from_code(self.interpolations[index]).unwrap_or_default()
    }

    fn resize_buffers(&mut self, capacity: usize) {
        self.times.resize(capacity, 0.0);
        self.values.resize(capacity * 3, 0.0);
        self.interpolations.resize(capacity, 0);
        self.capacity = capacity;
    }
}

impl Default for TrackData {
    fn default() -> Self {
        Self::new()
    }
}

// Copies the keyframes only: the clone has no listeners and no owning timeline.
impl Clone for TrackData {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            base_capacity: self.base_capacity,
            keyframe_count: self.keyframe_count,
            times: self.times.clone(),
            values: self.values.clone(),
            interpolations: self.interpolations.clone(),
            events: EventBus::new(),
            link: None,
        }
    }
}
