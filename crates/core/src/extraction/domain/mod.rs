pub mod face_crop;
pub mod feature_extractor;
pub mod sharpness;
