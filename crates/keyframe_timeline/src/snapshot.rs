// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plain-data timeline snapshots for project save/load.
//!
//! A snapshot holds authored keyframes only, never precomputed buffers:
//!
//! ```json
//! {
//!   "tracks": { "<object uuid>": { "<property>": { "times": [], "values": [], "interpolations": [] } } },
//!   "maxTime": 2.0,
//!   "frameRate": 30.0
//! }
//! ```
//!
//! `values` is flat xyz triples and `interpolations` holds mode codes. The
//! JSON decoder is lenient about shape: maps may also arrive as
//! `[[key, value], ...]` pair lists, values as `[[x, y, z], ...]` or
//! `[{x, y, z}, ...]`, numeric buffers as index-keyed objects, and modes as
//! names. A track or object that cannot be decoded is skipped.

use crate::binding::ObjectUuid;
use crate::error::{Result, TimelineError};
use crate::keyframe::{InterpolationMode, Keyframe};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sparse keyframe record of one track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    /// Keyframe times
    pub times: Vec<f32>,
    /// Flat xyz values, three per keyframe
    pub values: Vec<f32>,
    /// Interpolation mode codes, one per keyframe
    pub interpolations: Vec<u8>,
}

impl TrackSnapshot {
    /// Number of keyframes recorded
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether no keyframe is recorded
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Check that the buffers describe the same number of keyframes
    pub fn check_shape(&self) -> Result<()> {
        let count = self.times.len();
        if self.values.len() != count * 3 {
            return Err(TimelineError::MalformedSerializedData(format!(
                "{} values for {} keyframes",
                self.values.len(),
                count
            )));
        }
        if !self.interpolations.is_empty() && self.interpolations.len() != count {
            return Err(TimelineError::MalformedSerializedData(format!(
                "{} interpolation codes for {} keyframes",
                self.interpolations.len(),
                count
            )));
        }
        if let Some(code) = self
            .interpolations
            .iter()
            .find(|code| InterpolationMode::from_code(**code).is_none())
        {
            return Err(TimelineError::MalformedSerializedData(format!(
                "unknown interpolation code {code}"
            )));
        }
        Ok(())
    }

    /// Keyframes in recorded order; missing modes read as linear
    pub fn keyframes(&self) -> impl Iterator<Item = Keyframe> + '_ {
        self.times
            .iter()
            .zip(self.values.chunks_exact(3))
            .enumerate()
            .map(|(i, (&time, xyz))| Keyframe {
                time,
                value: [xyz[0], xyz[1], xyz[2]],
                interpolation: self
                    .interpolations
                    .get(i)
                    .and_then(|code| InterpolationMode::from_code(*code))
                    .unwrap_or_default(),
            })
    }
}

/// Plain-data form of a whole timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSnapshot {
    /// Tracks by object, then by property
    pub tracks: IndexMap<ObjectUuid, IndexMap<String, TrackSnapshot>>,
    /// Latest keyframe time seen by the timeline
    pub max_time: f32,
    /// Frames per second
    pub frame_rate: f32,
}

impl TimelineSnapshot {
    /// Total number of tracks
    pub fn track_count(&self) -> usize {
        self.tracks.values().map(IndexMap::len).sum()
    }
}

/// Binary copy of a timeline's tracks, taken before a transactional edit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackBackup {
    /// Encoded [`TimelineSnapshot`]
    pub data: Vec<u8>,
    /// Size in bytes
    pub size: usize,
    /// Tracks captured
    pub track_count: usize,
    /// Seconds since the Unix epoch when the backup was taken
    pub timestamp: u64,
}

impl TrackBackup {
    /// Encode a snapshot
    pub fn from_snapshot(snapshot: &TimelineSnapshot) -> Result<Self> {
        let data = bincode::serialize(snapshot)?;
        Ok(Self {
            size: data.len(),
            track_count: snapshot.track_count(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            data,
        })
    }

    /// Decode the snapshot
    pub fn to_snapshot(&self) -> Result<TimelineSnapshot> {
        Ok(bincode::deserialize(&self.data)?)
    }
}

/// Outcome of loading a snapshot into a timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Tracks created
    pub tracks_loaded: usize,
    /// Tracks or objects dropped because their data was malformed
    pub tracks_skipped: usize,
    /// Keyframes inserted
    pub keyframes_loaded: usize,
    /// Keyframes rejected on insert (duplicate time, non-finite data)
    pub keyframes_skipped: usize,
}

/// Snapshot contents after lenient decoding
#[derive(Debug, Default)]
pub(crate) struct DecodedSnapshot {
    pub(crate) tracks: Vec<(ObjectUuid, String, TrackSnapshot)>,
    pub(crate) max_time: Option<f32>,
    pub(crate) frame_rate: Option<f32>,
    pub(crate) skipped: usize,
}

impl From<TimelineSnapshot> for DecodedSnapshot {
    fn from(snapshot: TimelineSnapshot) -> Self {
        let mut decoded = DecodedSnapshot {
            max_time: Some(snapshot.max_time),
            frame_rate: Some(snapshot.frame_rate),
            ..Default::default()
        };
        for (object, properties) in snapshot.tracks {
            for (property, track) in properties {
                match track.check_shape() {
                    Ok(()) => decoded.tracks.push((object, property, track)),
                    Err(e) => {
                        tracing::warn!("Skipping track {}.{}: {}", object, property, e);
                        decoded.skipped += 1;
                    }
                }
            }
        }
        decoded
    }
}

/// Either a JSON object or a list of `[key, value]` pairs
#[derive(Deserialize)]
#[serde(untagged)]
enum Entries<T> {
    Map(IndexMap<String, T>),
    Pairs(Vec<(String, T)>),
}

impl<T> Entries<T> {
    fn into_pairs(self) -> Vec<(String, T)> {
        match self {
            Entries::Map(map) => map.into_iter().collect(),
            Entries::Pairs(pairs) => pairs,
        }
    }
}

/// Numeric buffer as a list or as an index-keyed object
#[derive(Deserialize)]
#[serde(untagged)]
enum Numbers {
    List(Vec<f32>),
    Indexed(IndexMap<String, f32>),
}

impl Numbers {
    fn into_vec(self) -> std::result::Result<Vec<f32>, String> {
        match self {
            Numbers::List(list) => Ok(list),
            Numbers::Indexed(map) => {
                let mut indexed = map
                    .into_iter()
                    .map(|(k, v)| k.parse::<usize>().map(|i| (i, v)))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| format!("bad buffer index: {e}"))?;
                indexed.sort_by_key(|(i, _)| *i);
                if indexed.iter().enumerate().any(|(pos, (i, _))| pos != *i) {
                    return Err("buffer indices are not contiguous".to_string());
                }
                Ok(indexed.into_iter().map(|(_, v)| v).collect())
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVec3 {
    Array([f32; 3]),
    Object { x: f32, y: f32, z: f32 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValues {
    Vectors(Vec<RawVec3>),
    Flat(Numbers),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMode {
    Code(u8),
    Name(String),
}

#[derive(Deserialize)]
struct RawTrack {
    times: Numbers,
    values: RawValues,
    #[serde(default)]
    interpolations: Option<Vec<RawMode>>,
}

impl RawTrack {
    fn into_snapshot(self) -> std::result::Result<TrackSnapshot, String> {
        let times = self.times.into_vec()?;
        let values = match self.values {
            RawValues::Vectors(vectors) => vectors
                .into_iter()
                .flat_map(|v| match v {
                    RawVec3::Array(xyz) => xyz,
                    RawVec3::Object { x, y, z } => [x, y, z],
                })
                .collect(),
            RawValues::Flat(numbers) => numbers.into_vec()?,
        };
        let interpolations = self
            .interpolations
            .unwrap_or_default()
            .into_iter()
            .map(|mode| match mode {
                RawMode::Code(code) => InterpolationMode::from_code(code)
                    .map(InterpolationMode::code)
                    .ok_or_else(|| format!("unknown interpolation code {code}")),
                RawMode::Name(name) => InterpolationMode::from_name(&name)
                    .map(InterpolationMode::code)
                    .ok_or_else(|| format!("unknown interpolation {name:?}")),
            })
            .collect::<std::result::Result<Vec<u8>, String>>()?;

        let snapshot = TrackSnapshot {
            times,
            values,
            interpolations,
        };
        snapshot.check_shape().map_err(|e| e.to_string())?;
        Ok(snapshot)
    }
}

fn entries(value: Value) -> std::result::Result<Vec<(String, Value)>, serde_json::Error> {
    serde_json::from_value::<Entries<Value>>(value).map(Entries::into_pairs)
}

fn number_field(root: &serde_json::Map<String, Value>, field: &str) -> Option<f32> {
    match root.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => {
            let number = value.as_f64().map(|v| v as f32);
            if number.is_none() {
                tracing::warn!("Ignoring non-numeric {}: {}", field, value);
            }
            number
        }
    }
}

/// Decode a JSON snapshot, skipping objects and tracks that do not parse.
///
/// Only a root that is not a JSON object is an error.
pub(crate) fn decode_json(value: &Value) -> Result<DecodedSnapshot> {
    let root = value.as_object().ok_or_else(|| {
        TimelineError::MalformedSerializedData("timeline snapshot must be an object".to_string())
    })?;

    let mut decoded = DecodedSnapshot {
        max_time: number_field(root, "maxTime"),
        frame_rate: number_field(root, "frameRate"),
        ..Default::default()
    };

    let objects = match root.get("tracks") {
        None | Some(Value::Null) => Vec::new(),
        Some(tracks) => match entries(tracks.clone()) {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!("Ignoring malformed tracks field: {}", e);
                return Ok(decoded);
            }
        },
    };

    for (object_key, properties) in objects {
        let object = match object_key.parse::<ObjectUuid>() {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!("Skipping object {:?}: {}", object_key, e);
                decoded.skipped += 1;
                continue;
            }
        };
        let properties = match entries(properties) {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!("Skipping object {}: {}", object, e);
                decoded.skipped += 1;
                continue;
            }
        };
        for (property, raw) in properties {
            let track = serde_json::from_value::<RawTrack>(raw)
                .map_err(|e| e.to_string())
                .and_then(RawTrack::into_snapshot);
            match track {
                Ok(track) => decoded.tracks.push((object, property, track)),
                Err(e) => {
                    tracing::warn!("Skipping track {}.{}: {}", object, property, e);
                    decoded.skipped += 1;
                }
            }
        }
    }

    Ok(decoded)
}
