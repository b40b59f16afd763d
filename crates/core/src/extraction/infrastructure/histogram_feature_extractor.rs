/// HSV histogram embedding.
///
/// A model-free fallback that describes a face crop by its 2D Hue-Saturation
/// distribution. Far less discriminative than ArcFace but needs no model
/// download and is exactly reproducible.
use crate::extraction::domain::face_crop::FaceCrop;
use crate::extraction::domain::feature_extractor::{ExtractionError, FeatureExtractor};
use crate::shared::embedding::{l2_normalize, Embedding, ModelVersion};

pub const MODEL_NAME: &str = "hsv-histogram";

const HUE_BINS: usize = 32;
const SAT_BINS: usize = 32;

pub struct HistogramFeatureExtractor {
    model: ModelVersion,
}

impl HistogramFeatureExtractor {
    pub fn new() -> Self {
        Self {
            model: ModelVersion::new(MODEL_NAME, format!("{HUE_BINS}x{SAT_BINS}")),
        }
    }
}

impl Default for HistogramFeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for HistogramFeatureExtractor {
    fn model(&self) -> &ModelVersion {
        &self.model
    }

    fn extract(&self, crop: &FaceCrop) -> Result<Embedding, ExtractionError> {
        let hist = compute_histogram(crop.data(), crop.width(), crop.height());
        if hist.iter().all(|v| *v == 0.0) {
            return Err(ExtractionError::EmptyCrop);
        }
        let mut values: Vec<f32> = hist.iter().map(|v| *v as f32).collect();
        l2_normalize(&mut values);
        Ok(Embedding::new(values, self.model.clone()))
    }
}

/// Normalized H-S histogram with `HUE_BINS * SAT_BINS` entries summing to 1.
fn compute_histogram(rgb_data: &[u8], width: u32, height: u32) -> Vec<f64> {
    let num_pixels = (width as usize) * (height as usize);
    let mut hist = vec![0.0f64; HUE_BINS * SAT_BINS];
    let mut count = 0usize;

    for px in rgb_data.chunks_exact(3).take(num_pixels) {
        let r = px[0] as f64 / 255.0;
        let g = px[1] as f64 / 255.0;
        let b = px[2] as f64 / 255.0;

        let (h, s, _v) = rgb_to_hsv(r, g, b);

        let h_bin = ((h / 360.0) * HUE_BINS as f64).min(HUE_BINS as f64 - 1.0) as usize;
        let s_bin = (s * SAT_BINS as f64).min(SAT_BINS as f64 - 1.0) as usize;

        hist[h_bin * SAT_BINS + s_bin] += 1.0;
        count += 1;
    }

    if count > 0 {
        let total = count as f64;
        for v in &mut hist {
            *v /= total;
        }
    }

    hist
}

fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };

    let h = if delta == 0.0 {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * (((g - b) / delta) % 6.0)
    } else if (max - g).abs() < f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let h = if h < 0.0 { h + 360.0 } else { h };

    (h, s, v)
}
