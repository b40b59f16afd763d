pub mod histogram_feature_extractor;
pub mod onnx_arcface_extractor;
