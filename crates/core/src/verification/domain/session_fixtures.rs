//! Fakes shared by the session and runner tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::identity_matcher::LocalIdentityMatcher;
use super::quality_gate::QualityGate;
use super::session_observer::SessionObserver;
use super::verification_session::SessionPipeline;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_detector_adapter::FaceDetectorAdapter;
use crate::detection::domain::face_region::FaceRegion;
use crate::detection::infrastructure::precomputed_face_detector::PrecomputedFaceDetector;
use crate::extraction::domain::face_crop::FaceCrop;
use crate::extraction::domain::feature_extractor::{
    CropRequirements, ExtractionError, FeatureExtractor,
};
use crate::matching::domain::enrollment::EnrollmentRecord;
use crate::matching::domain::enrollment_store::EnrollmentStore;
use crate::matching::domain::match_engine::MatchEngine;
use crate::matching::infrastructure::in_memory_enrollment_store::InMemoryEnrollmentStore;
use crate::shared::embedding::{Embedding, ModelVersion};
use crate::shared::frame::Frame;

const FRAME_SIZE: u32 = 128;

pub(crate) struct FakeExtractor {
    model: ModelVersion,
    values: Vec<f32>,
    calls: AtomicUsize,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
}

impl FakeExtractor {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Raises `flag` from inside `extract`, as an external cancel would.
    pub(crate) fn cancel_during_extract(&self, flag: Arc<AtomicBool>) {
        *self.cancel.lock().unwrap() = Some(flag);
    }
}

impl FeatureExtractor for FakeExtractor {
    fn model(&self) -> &ModelVersion {
        &self.model
    }

    fn extract(&self, _crop: &FaceCrop) -> Result<Embedding, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(flag) = self.cancel.lock().unwrap().as_ref() {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(Embedding::new(self.values.clone(), self.model.clone()))
    }
}

pub(crate) struct Fixture {
    pub detector: Arc<PrecomputedFaceDetector>,
    pub extractor: Arc<FakeExtractor>,
    pub store: Arc<InMemoryEnrollmentStore>,
}

impl Fixture {
    /// `alice` enrolled at `[1, 0]`; the extractor reproduces her.
    pub(crate) fn new() -> Self {
        Self::with_probe(vec![1.0, 0.0])
    }

    pub(crate) fn with_probe(probe: Vec<f32>) -> Self {
        Self::build(probe, "1")
    }

    pub(crate) fn enrolled_with_version(version: &str) -> Self {
        Self::build(vec![1.0, 0.0], version)
    }

    fn build(probe: Vec<f32>, enrolled_version: &str) -> Self {
        let store = Arc::new(InMemoryEnrollmentStore::new());
        let reference = Embedding::new(vec![1.0, 0.0], ModelVersion::new("fake", enrolled_version));
        store
            .put(EnrollmentRecord::new("alice".into(), vec![reference]).unwrap())
            .unwrap();
        Self {
            detector: Arc::new(PrecomputedFaceDetector::new()),
            extractor: Arc::new(FakeExtractor {
                model: ModelVersion::new("fake", "1"),
                values: probe,
                calls: AtomicUsize::new(0),
                cancel: Mutex::new(None),
            }),
            store,
        }
    }

    pub(crate) fn pipeline(&self) -> Arc<SessionPipeline> {
        Arc::new(self.pipeline_with_detector(self.detector.clone()))
    }

    pub(crate) fn pipeline_with_detector(&self, detector: Arc<dyn FaceDetector>) -> SessionPipeline {
        let matcher = LocalIdentityMatcher::new(self.store.clone(), MatchEngine::default());
        SessionPipeline::new(
            FaceDetectorAdapter::new(detector, 0.5),
            QualityGate::default(),
            self.extractor.clone(),
            CropRequirements::default(),
            Arc::new(matcher),
        )
    }
}

/// High-contrast stripes, well above the sharpness floor.
pub(crate) fn sharp_frame(sequence: u64) -> Frame {
    let mut data = Vec::with_capacity((FRAME_SIZE * FRAME_SIZE * 3) as usize);
    for y in 0..FRAME_SIZE {
        for x in 0..FRAME_SIZE {
            let v = if (x / 4 + y / 4) % 2 == 0 { 20 } else { 235 };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    Frame::new(data, FRAME_SIZE, FRAME_SIZE, 3, sequence)
}

pub(crate) fn blurry_frame(sequence: u64) -> Frame {
    let data = vec![128u8; (FRAME_SIZE * FRAME_SIZE * 3) as usize];
    Frame::new(data, FRAME_SIZE, FRAME_SIZE, 3, sequence)
}

/// A 96 px frontal face that passes the default gate.
pub(crate) fn face_region(confidence: f64) -> FaceRegion {
    FaceRegion::new(16.0, 16.0, 96.0, 96.0, confidence)
}

#[derive(Clone, Default)]
pub(crate) struct Transitions {
    names: Arc<Mutex<Vec<String>>>,
    dropped: Arc<AtomicUsize>,
}

impl Transitions {
    pub(crate) fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }

    pub(crate) fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

pub(crate) struct RecordingObserver {
    transitions: Transitions,
}

impl RecordingObserver {
    pub(crate) fn new() -> (Self, Transitions) {
        let transitions = Transitions::default();
        (
            Self {
                transitions: transitions.clone(),
            },
            transitions,
        )
    }
}

impl SessionObserver for RecordingObserver {
    fn transition(&mut self, from: &str, to: &str) {
        self.transitions
            .names
            .lock()
            .unwrap()
            .push(format!("{from}->{to}"));
    }
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, name: &str, value: f64) {
        if name == "dropped_frames" {
            self.transitions
                .dropped
                .fetch_add(value as usize, Ordering::SeqCst);
        }
    }
    fn info(&mut self, _message: &str) {}
}
