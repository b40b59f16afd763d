use std::sync::Arc;

use super::face_detector::{DetectionError, FaceDetector};
use super::face_region::FaceRegion;
use crate::shared::frame::Frame;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Normalizes vendor detector output into canonical face regions.
///
/// Frames are rotated upright before detection. Returned regions are
/// clamped to the frame, free of zero-area boxes and low-confidence hits,
/// and sorted by descending confidence.
#[derive(Clone)]
pub struct FaceDetectorAdapter {
    detector: Arc<dyn FaceDetector>,
    min_confidence: f64,
}

impl FaceDetectorAdapter {
    pub fn new(detector: Arc<dyn FaceDetector>, min_confidence: f64) -> Self {
        Self {
            detector,
            min_confidence,
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Detects faces in `frame`, returning the upright frame alongside
    /// its regions so later stages crop from the same coordinates.
    pub fn detect(&self, frame: Frame) -> Result<(Frame, Vec<FaceRegion>), DetectionError> {
        validate_frame(&frame)?;
        let frame = frame.to_upright();
        let raw = self.detector.detect(&frame)?;
        let regions = self.normalize(raw, frame.width(), frame.height());
        Ok((frame, regions))
    }

    fn normalize(&self, raw: Vec<FaceRegion>, frame_w: u32, frame_h: u32) -> Vec<FaceRegion> {
        let total = raw.len();
        let mut regions: Vec<FaceRegion> = raw
            .into_iter()
            .map(|r| r.clamp_to(frame_w, frame_h))
            .filter(|r| r.is_valid() && r.confidence >= self.min_confidence)
            .collect();
        regions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        if regions.len() < total {
            log::debug!(
                "Discarded {} of {total} detections below confidence {} or without area",
                total - regions.len(),
                self.min_confidence
            );
        }
        regions
    }
}

fn validate_frame(frame: &Frame) -> Result<(), DetectionError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(DetectionError::InvalidFrame(format!(
            "empty frame {}x{}",
            frame.width(),
            frame.height()
        )));
    }
    if frame.channels() != 3 {
        return Err(DetectionError::InvalidFrame(format!(
            "expected 3 channels, got {}",
            frame.channels()
        )));
    }
    let expected = frame.width() as usize * frame.height() as usize * 3;
    if frame.data().len() != expected {
        return Err(DetectionError::InvalidFrame(format!(
            "expected {expected} bytes, got {}",
            frame.data().len()
        )));
    }
    Ok(())
}
