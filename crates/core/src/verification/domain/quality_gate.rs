use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::face_region::FaceRegion;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateRejection {
    #[error("face too small: {size:.0} px, need {min} px")]
    TooSmall { size: f64, min: u32 },
    #[error("face turned too far: profile ratio {ratio:.2} > {max:.2}")]
    TooOblique { ratio: f64, max: f64 },
    #[error("face tilted too far: roll {degrees:.1} > {max:.1} degrees")]
    TooTilted { degrees: f64, max: f64 },
    #[error("detection confidence {confidence:.2} below {min:.2}")]
    LowConfidence { confidence: f64, min: f64 },
}

/// Liveness and quality checks applied to a detected face before any
/// extraction work is spent on it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    /// Shorter side of the face box, in upright frame pixels.
    pub min_face_size: u32,
    /// Upper bound on [`FaceLandmarks::profile_ratio`](crate::detection::domain::face_landmarks::FaceLandmarks::profile_ratio).
    pub max_profile_ratio: f64,
    /// Upper bound on the absolute in-plane roll.
    pub max_roll_degrees: f64,
    pub min_confidence: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_face_size: 64,
            max_profile_ratio: 0.35,
            max_roll_degrees: 25.0,
            min_confidence: 0.6,
        }
    }
}

impl QualityGate {
    /// Pose checks only run when the detector supplied landmarks.
    pub fn check(&self, region: &FaceRegion) -> Result<(), GateRejection> {
        if region.confidence < self.min_confidence {
            return Err(GateRejection::LowConfidence {
                confidence: region.confidence,
                min: self.min_confidence,
            });
        }
        let size = region.min_side();
        if size < self.min_face_size as f64 {
            return Err(GateRejection::TooSmall {
                size,
                min: self.min_face_size,
            });
        }
        if let Some(landmarks) = &region.landmarks {
            let ratio = landmarks.profile_ratio();
            if ratio > self.max_profile_ratio {
                return Err(GateRejection::TooOblique {
                    ratio,
                    max: self.max_profile_ratio,
                });
            }
            let roll = landmarks.roll_degrees().abs();
            if roll > self.max_roll_degrees {
                return Err(GateRejection::TooTilted {
                    degrees: roll,
                    max: self.max_roll_degrees,
                });
            }
        }
        Ok(())
    }

    /// First region (in the given order) that passes, plus the rejections
    /// of the ones before it.
    pub fn select<'a>(
        &self,
        regions: &'a [FaceRegion],
    ) -> (Option<&'a FaceRegion>, Vec<GateRejection>) {
        let mut rejections = Vec::new();
        for region in regions {
            match self.check(region) {
                Ok(()) => return (Some(region), rejections),
                Err(r) => rejections.push(r),
            }
        }
        (None, rejections)
    }
}
