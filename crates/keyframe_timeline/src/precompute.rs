// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dense per-frame sample buffers for playback.
//!
//! Precomputation trades memory for latency: every track is sampled once per
//! frame across the whole timeline so playback reads three floats per tick
//! instead of interpolating.

use crate::binding::ObjectUuid;
use crate::keyframe::Vec3;
use crate::track::TrackData;
use indexmap::IndexMap;

/// Number of frames needed to cover `max_time` plus the safety margin.
///
/// Evaluated in f64 as `ceil(max_time * frame_rate * margin)`.
pub fn frame_count(max_time: f32, frame_rate: f32, margin: f64) -> usize {
    let frames = (f64::from(max_time) * f64::from(frame_rate) * margin).ceil();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        0
    }
}

/// Per-(object, property) buffers of `total_frames * 3` floats
#[derive(Debug, Clone, Default)]
pub struct PrecomputedData {
    frame_rate: f32,
    total_frames: usize,
    buffers: IndexMap<ObjectUuid, IndexMap<String, Vec<f32>>>,
}

impl PrecomputedData {
    /// Sample every track into fresh buffers
    pub(crate) fn build<'a>(
        tracks: impl Iterator<Item = (ObjectUuid, &'a str, &'a TrackData)>,
        total_frames: usize,
        frame_rate: f32,
    ) -> Self {
        let mut buffers: IndexMap<ObjectUuid, IndexMap<String, Vec<f32>>> = IndexMap::new();
        for (object, property, track) in tracks {
            let mut buffer = vec![0.0; total_frames * 3];
            track.sample_frames(frame_rate, &mut buffer);
            buffers
                .entry(object)
                .or_default()
                .insert(property.to_string(), buffer);
        }
        Self {
            frame_rate,
            total_frames,
            buffers,
        }
    }

    /// Frame rate the buffers were sampled at
    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    /// Frames per buffer
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Whether no buffer has been built
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Buffers of one object, by property
    pub fn get(&self, object: &ObjectUuid) -> Option<&IndexMap<String, Vec<f32>>> {
        self.buffers.get(object)
    }

    /// Buffer of one track
    pub fn buffer(&self, object: &ObjectUuid, property: &str) -> Option<&[f32]> {
        self.buffers
            .get(object)
            .and_then(|properties| properties.get(property))
            .map(Vec::as_slice)
    }

    /// Sampled value of one track at `frame`
    pub fn frame(&self, object: &ObjectUuid, property: &str, frame: usize) -> Option<Vec3> {
        let buffer = self.buffer(object, property)?;
        let start = frame.checked_mul(3)?;
        let slot = buffer.get(start..start.checked_add(3)?)?;
        Some([slot[0], slot[1], slot[2]])
    }

    /// Bytes held by all buffers
    pub fn memory_bytes(&self) -> usize {
        self.buffers
            .values()
            .flat_map(IndexMap::values)
            .map(|buffer| buffer.len() * size_of::<f32>())
            .sum()
    }

    /// Number of track buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.values().map(IndexMap::len).sum()
    }
}
