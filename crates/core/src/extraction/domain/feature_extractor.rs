use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::face_crop::FaceCrop;
use super::sharpness::laplacian_variance;
use crate::detection::domain::face_region::FaceRegion;
use crate::shared::embedding::{Embedding, ModelVersion};
use crate::shared::frame::Frame;

/// Per-frame extraction failures. All of them are transient: the next
/// frame may yield a usable crop.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("region too small: {width}x{height} px, need at least {min} px per side")]
    RegionTooSmall { width: u32, height: u32, min: u32 },
    #[error("region too blurry: sharpness {sharpness:.1}, need at least {min:.1}")]
    RegionTooBlurry { sharpness: f64, min: f64 },
    #[error("region lies outside the frame")]
    EmptyCrop,
    #[error("feature extractor failed: {0}")]
    Backend(String),
}

/// Minimum crop quality accepted before invoking an extractor backend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropRequirements {
    /// Shorter crop side in pixels.
    pub min_crop_size: u32,
    /// Laplacian variance of the crop's luma.
    pub min_sharpness: f64,
}

impl Default for CropRequirements {
    fn default() -> Self {
        Self {
            min_crop_size: 48,
            min_sharpness: 25.0,
        }
    }
}

/// Vendor seam for embedding models.
///
/// Implementations must be deterministic: the same crop always yields a
/// bit-identical embedding tagged with `model()`.
pub trait FeatureExtractor: Send + Sync {
    fn model(&self) -> &ModelVersion;

    fn extract(&self, crop: &FaceCrop) -> Result<Embedding, ExtractionError>;
}

/// Crops `region` out of `frame`, checks size and sharpness, then embeds it.
pub fn extract_features(
    extractor: &dyn FeatureExtractor,
    frame: &Frame,
    region: &FaceRegion,
    requirements: &CropRequirements,
) -> Result<Embedding, ExtractionError> {
    let crop = FaceCrop::from_region(frame, region).ok_or(ExtractionError::EmptyCrop)?;

    if crop.min_side() < requirements.min_crop_size {
        return Err(ExtractionError::RegionTooSmall {
            width: crop.width(),
            height: crop.height(),
            min: requirements.min_crop_size,
        });
    }

    let sharpness = laplacian_variance(&crop);
    if sharpness < requirements.min_sharpness {
        return Err(ExtractionError::RegionTooBlurry {
            sharpness,
            min: requirements.min_sharpness,
        });
    }

    let embedding = extractor.extract(&crop)?;
    if embedding.model() != extractor.model() {
        return Err(ExtractionError::Backend(format!(
            "extractor {} produced an embedding tagged {}",
            extractor.model(),
            embedding.model()
        )));
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MeanColorExtractor {
        model: ModelVersion,
        calls: AtomicUsize,
    }

    impl MeanColorExtractor {
        fn new() -> Self {
            Self {
                model: ModelVersion::new("mean-color", "1"),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FeatureExtractor for MeanColorExtractor {
        fn model(&self) -> &ModelVersion {
            &self.model
        }

        fn extract(&self, crop: &FaceCrop) -> Result<Embedding, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut sums = [0f32; 3];
            for px in crop.data().chunks_exact(3) {
                for c in 0..3 {
                    sums[c] += px[c] as f32;
                }
            }
            Ok(Embedding::new(sums.to_vec(), self.model.clone()))
        }
    }

    fn checker_frame(w: u32, h: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let v = if (x / 2 + y / 2) % 2 == 0 { 230 } else { 20 };
                data.extend_from_slice(&[v, v / 2, v / 3]);
            }
        }
        Frame::new(data, w, h, 3, 0)
    }

    #[test]
    fn test_extracts_sharp_large_region() {
        let extractor = MeanColorExtractor::new();
        let frame = checker_frame(128, 128);
        let region = FaceRegion::new(10.0, 10.0, 80.0, 80.0, 0.9);
        let embedding =
            extract_features(&extractor, &frame, &region, &CropRequirements::default()).unwrap();
        assert_eq!(embedding.model(), extractor.model());
        assert_eq!(embedding.len(), 3);
    }

    #[test]
    fn test_small_region_fails_without_calling_backend() {
        let extractor = MeanColorExtractor::new();
        let frame = checker_frame(128, 128);
        let region = FaceRegion::new(0.0, 0.0, 20.0, 100.0, 0.9);
        let err = extract_features(&extractor, &frame, &region, &CropRequirements::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::RegionTooSmall {
                width: 20,
                height: 100,
                min: 48
            }
        ));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blurry_region_fails() {
        let extractor = MeanColorExtractor::new();
        let frame = Frame::new(vec![100u8; 128 * 128 * 3], 128, 128, 3, 0);
        let region = FaceRegion::new(0.0, 0.0, 100.0, 100.0, 0.9);
        let err = extract_features(&extractor, &frame, &region, &CropRequirements::default())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::RegionTooBlurry { .. }));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_region_outside_frame_is_empty_crop() {
        let extractor = MeanColorExtractor::new();
        let frame = checker_frame(64, 64);
        let region = FaceRegion::new(100.0, 100.0, 50.0, 50.0, 0.9);
        let err = extract_features(&extractor, &frame, &region, &CropRequirements::default())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyCrop));
    }

    #[test]
    fn test_requirements_partial_json_uses_defaults() {
        let req: CropRequirements = serde_json::from_str(r#"{"min_crop_size": 32}"#).unwrap();
        assert_eq!(req.min_crop_size, 32);
        assert_eq!(req.min_sharpness, 25.0);
    }
}
