pub mod face_detector;
pub mod face_detector_adapter;
pub mod face_landmarks;
pub mod face_region;
