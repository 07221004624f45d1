//! Content quality signals supplied by an external analysis provider.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::viewport::ViewingAngle;

/// Motion statistics for a spherical video.
///
/// Values are expected in [0, 1]; consumers clamp.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContentQualitySignal {
    /// Overall motion intensity.
    #[serde(default)]
    pub motion_intensity: f64,
    /// Motion intensity per viewing direction.
    #[serde(default)]
    pub region_motion: BTreeMap<ViewingAngle, f64>,
}

impl ContentQualitySignal {
    pub fn new(motion_intensity: f64) -> Self {
        Self {
            motion_intensity,
            region_motion: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, angle: ViewingAngle, intensity: f64) -> Self {
        self.region_motion.insert(angle, intensity);
        self
    }

    /// Motion intensity clamped to [0, 1]; NaN counts as no motion.
    pub fn clamped_motion(&self) -> f64 {
        if self.motion_intensity.is_nan() {
            0.0
        } else {
            self.motion_intensity.clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_motion() {
        assert_eq!(ContentQualitySignal::new(1.7).clamped_motion(), 1.0);
        assert_eq!(ContentQualitySignal::new(-0.2).clamped_motion(), 0.0);
        assert_eq!(ContentQualitySignal::new(f64::NAN).clamped_motion(), 0.0);
    }

    #[test]
    fn test_region_map_deserializes_by_name() {
        let signal: ContentQualitySignal =
            serde_json::from_str(r#"{"motion_intensity":0.5,"region_motion":{"front":0.9,"up":0.1}}"#)
                .unwrap();
        assert_eq!(signal.region_motion.get(&ViewingAngle::Front), Some(&0.9));
        assert_eq!(signal.region_motion.len(), 2);
    }
}
