use std::collections::HashMap;
use std::sync::RwLock;

use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::detection::domain::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Replays detections produced outside this crate, keyed by frame sequence.
///
/// Used when the platform detector runs upstream (for example an on-device
/// vendor SDK) and ships its boxes alongside each frame. Frames with no
/// recorded detections yield an empty result.
#[derive(Default)]
pub struct PrecomputedFaceDetector {
    detections: RwLock<HashMap<u64, Vec<FaceRegion>>>,
}

impl PrecomputedFaceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the regions detected for the frame with `sequence`.
    pub fn insert(&self, sequence: u64, regions: Vec<FaceRegion>) {
        if let Ok(mut map) = self.detections.write() {
            map.insert(sequence, regions);
        }
    }

    pub fn len(&self) -> usize {
        self.detections.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FaceDetector for PrecomputedFaceDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<FaceRegion>, DetectionError> {
        let map = self
            .detections
            .read()
            .map_err(|e| DetectionError::Unavailable(format!("Lock poisoned: {e}")))?;
        Ok(map.get(&frame.sequence()).cloned().unwrap_or_default())
    }
}
