/// ArcFace face embeddings via ONNX Runtime.
///
/// Produces 512-d L2-normalized vectors from 112x112 RGB input. Inference
/// runs with a fixed graph, so identical crops give identical embeddings.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::execution_provider::build_session;
use crate::extraction::domain::face_crop::FaceCrop;
use crate::extraction::domain::feature_extractor::{ExtractionError, FeatureExtractor};
use crate::shared::constants::ARCFACE_MODEL_VERSION;
use crate::shared::embedding::{l2_normalize, Embedding, ModelVersion};

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxArcFaceExtractor {
    session: Mutex<ort::session::Session>,
    model: ModelVersion,
}

impl OnnxArcFaceExtractor {
    pub fn new(model_path: &Path) -> Result<Self, ExtractionError> {
        Self::with_version(model_path, ModelVersion::new("arcface", ARCFACE_MODEL_VERSION))
    }

    /// Loads a model with an explicit version tag, for custom model files.
    pub fn with_version(model_path: &Path, model: ModelVersion) -> Result<Self, ExtractionError> {
        let session = build_session(model_path).map_err(|e| {
            ExtractionError::Backend(format!("failed to load {}: {e}", model_path.display()))
        })?;
        log::info!("Loaded embedding model {} as {model}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
            model,
        })
    }
}

impl FeatureExtractor for OnnxArcFaceExtractor {
    fn model(&self) -> &ModelVersion {
        &self.model
    }

    fn extract(&self, crop: &FaceCrop) -> Result<Embedding, ExtractionError> {
        let tensor = preprocess(crop.data(), crop.width(), crop.height());
        let input_value = ort::value::Tensor::from_array(tensor)
            .map_err(|e| ExtractionError::Backend(e.to_string()))?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| ExtractionError::Backend(format!("Lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| ExtractionError::Backend(e.to_string()))?;
        let embedding_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| ExtractionError::Backend(e.to_string()))?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or_else(|| ExtractionError::Backend("Cannot get embedding slice".into()))?;

        let mut values = embedding_slice.to_vec();
        l2_normalize(&mut values);
        Ok(Embedding::new(values, self.model.clone()))
    }
}

/// Resize crop to 112x112 (nearest sample at pixel centers), normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}
