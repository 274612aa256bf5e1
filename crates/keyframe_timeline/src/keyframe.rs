// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe definitions and interpolation math.

use crate::error::TrackError;
use serde::{Deserialize, Serialize};

/// Two keyframe times closer than this are treated as the same time
pub const TIME_EPSILON: f32 = 0.001;

/// Three-component keyframe value (x, y, z)
pub type Vec3 = [f32; 3];

/// Control points of the ease-in-out timing curve used by [`InterpolationMode::Bezier`]
pub const BEZIER_EASE_IN_OUT: [f32; 4] = [0.42, 0.0, 0.58, 1.0];

/// Interpolation mode from a keyframe to the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterpolationMode {
    /// Component-wise linear blend
    #[default]
    Linear,
    /// Hold the earlier value until the next keyframe
    Step,
    /// Linear blend on an ease-in-out cubic Bezier timing curve
    Bezier,
}

impl InterpolationMode {
    /// Every mode, in code order
    pub const ALL: [InterpolationMode; 3] = [Self::Linear, Self::Step, Self::Bezier];

    /// Compact code stored in track buffers and snapshots
    pub fn code(self) -> u8 {
        match self {
            Self::Linear => 0,
            Self::Step => 1,
            Self::Bezier => 2,
        }
    }

    /// Decode a buffer code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Linear),
            1 => Some(Self::Step),
            2 => Some(Self::Bezier),
            _ => None,
        }
    }

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "LINEAR",
            Self::Step => "STEP",
            Self::Bezier => "BEZIER",
        }
    }

    /// Parse a mode name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }
}

/// One authored sample on a track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Time in seconds
    pub time: f32,
    /// Value at this keyframe
    pub value: Vec3,
    /// Interpolation mode to the next keyframe
    pub interpolation: InterpolationMode,
}

impl Keyframe {
    /// Create a linear keyframe
    pub fn new(time: f32, value: Vec3) -> Self {
        Self {
            time,
            value,
            interpolation: InterpolationMode::Linear,
        }
    }

    /// Set interpolation mode
    pub fn with_interpolation(mut self, mode: InterpolationMode) -> Self {
        self.interpolation = mode;
        self
    }
}

/// Check that a value can be stored in a track
pub fn validate_value(value: Vec3) -> Result<(), TrackError> {
    if value.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(TrackError::InvalidValue(value))
    }
}

/// Check that a time can be stored in a track
pub fn validate_time(time: f32) -> Result<(), TrackError> {
    if time.is_finite() {
        Ok(())
    } else {
        Err(TrackError::InvalidTime(time))
    }
}

/// Whether two times fall within [`TIME_EPSILON`] of each other
pub fn same_time(a: f32, b: f32) -> bool {
    (a - b).abs() < TIME_EPSILON
}

/// Interpolation utilities
pub struct Interpolation;

impl Interpolation {
    /// Linear interpolation between two floats
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Interpolate Vec3
    pub fn lerp_vec3(a: Vec3, b: Vec3, t: f32) -> Vec3 {
        [
            Self::lerp(a[0], b[0], t),
            Self::lerp(a[1], b[1], t),
            Self::lerp(a[2], b[2], t),
        ]
    }

    /// Cubic bezier interpolation
    pub fn bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
        let t2 = t * t;
        let t3 = t2 * t;
        let mt = 1.0 - t;
        let mt2 = mt * mt;
        let mt3 = mt2 * mt;

        p0 * mt3 + 3.0 * p1 * mt2 * t + 3.0 * p2 * mt * t2 + p3 * t3
    }

    /// Ease `t` through a timing curve with control points `(x1, y1, x2, y2)`.
    ///
    /// The curve runs from (0, 0) to (1, 1). `x` is inverted by bisection,
    /// which assumes `x1` and `x2` lie in `[0, 1]` so `x(s)` is monotonic.
    pub fn ease(t: f32, [x1, y1, x2, y2]: [f32; 4]) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let mut lo = 0.0f32;
        let mut hi = 1.0f32;
        let mut s = t;
        for _ in 0..32 {
            let x = Self::bezier(0.0, x1, x2, 1.0, s);
            if (x - t).abs() < 1e-6 {
                break;
            }
            if x < t {
                lo = s;
            } else {
                hi = s;
            }
            s = 0.5 * (lo + hi);
        }
        Self::bezier(0.0, y1, y2, 1.0, s)
    }

    /// Blend two keyframe values with the earlier keyframe's mode
    pub fn blend(a: Vec3, b: Vec3, t: f32, mode: InterpolationMode) -> Vec3 {
        match mode {
            InterpolationMode::Linear => Self::lerp_vec3(a, b, t),
            InterpolationMode::Step => a,
            InterpolationMode::Bezier => Self::lerp_vec3(a, b, Self::ease(t, BEZIER_EASE_IN_OUT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_codes() {
        for mode in InterpolationMode::ALL {
            assert_eq!(InterpolationMode::from_code(mode.code()), Some(mode));
            assert_eq!(InterpolationMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(InterpolationMode::from_code(7), None);
        assert_eq!(InterpolationMode::from_name("step"), Some(InterpolationMode::Step));
        assert_eq!(InterpolationMode::from_name("cubic"), None);
    }

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&InterpolationMode::Bezier).unwrap();
        assert_eq!(json, "\"BEZIER\"");
    }

    #[test]
    fn test_validate_value() {
        assert!(validate_value([1.0, 2.0, 3.0]).is_ok());
        assert!(matches!(
            validate_value([f32::NAN, 0.0, 0.0]),
            Err(TrackError::InvalidValue(_))
        ));
        assert!(validate_time(f32::INFINITY).is_err());
    }

    #[test]
    fn test_ease_endpoints_and_symmetry() {
        assert!(Interpolation::ease(0.0, BEZIER_EASE_IN_OUT).abs() < 1e-5);
        assert!((Interpolation::ease(1.0, BEZIER_EASE_IN_OUT) - 1.0).abs() < 1e-5);
        assert!((Interpolation::ease(0.5, BEZIER_EASE_IN_OUT) - 0.5).abs() < 1e-4);
        // Ease-in: slower than linear early on
        assert!(Interpolation::ease(0.2, BEZIER_EASE_IN_OUT) < 0.2);
        assert!(Interpolation::ease(0.8, BEZIER_EASE_IN_OUT) > 0.8);
    }

    #[test]
    fn test_blend_modes() {
        let a = [0.0, 0.0, 0.0];
        let b = [10.0, -4.0, 2.0];
        assert_eq!(Interpolation::blend(a, b, 0.5, InterpolationMode::Linear), [5.0, -2.0, 1.0]);
        assert_eq!(Interpolation::blend(a, b, 0.9, InterpolationMode::Step), a);
        let eased = Interpolation::blend(a, b, 0.25, InterpolationMode::Bezier);
        assert!(eased[0] > 0.0 && eased[0] < 2.5);
    }
}
