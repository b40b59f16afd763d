use thiserror::Error;

use super::face_region::FaceRegion;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("face detector unavailable: {0}")]
    Unavailable(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("face detector failed: {0}")]
    Backend(String),
}

/// Vendor seam for face detection.
///
/// Implementations are shared across concurrent sessions, so detection
/// takes `&self`; backends with mutable inference state lock internally.
/// Frames are always upright when they reach a detector.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<FaceRegion>, DetectionError>;
}
