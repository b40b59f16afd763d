use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::identity_matcher::IdentityMatcher;
use super::quality_gate::QualityGate;
use super::session_config::SessionConfig;
use super::session_observer::SessionObserver;
use super::session_state::{Decision, SessionEvent, SessionState, SessionStateMachine};
use super::verification_error::VerificationError;
use crate::detection::domain::face_detector_adapter::FaceDetectorAdapter;
use crate::extraction::domain::feature_extractor::{
    extract_features, CropRequirements, FeatureExtractor,
};
use crate::shared::frame::Frame;

/// Capabilities shared by every session: detection, gating, extraction
/// and identity matching.
pub struct SessionPipeline {
    detector: FaceDetectorAdapter,
    gate: QualityGate,
    extractor: Arc<dyn FeatureExtractor>,
    crop: CropRequirements,
    matcher: Arc<dyn IdentityMatcher>,
}

impl SessionPipeline {
    pub fn new(
        detector: FaceDetectorAdapter,
        gate: QualityGate,
        extractor: Arc<dyn FeatureExtractor>,
        crop: CropRequirements,
        matcher: Arc<dyn IdentityMatcher>,
    ) -> Self {
        Self {
            detector,
            gate,
            extractor,
            crop,
            matcher,
        }
    }

    pub fn extractor(&self) -> &Arc<dyn FeatureExtractor> {
        &self.extractor
    }
}

/// Drives one verification session frame by frame.
///
/// Steps run strictly in order on the caller's thread. Cancellation is
/// observed between any two transitions; once the session is decided,
/// further frames are ignored.
pub struct VerificationSession {
    pipeline: Arc<SessionPipeline>,
    config: SessionConfig,
    machine: SessionStateMachine,
    started_at: Instant,
    cancelled: Arc<AtomicBool>,
    observer: Box<dyn SessionObserver>,
}

impl VerificationSession {
    pub fn new(
        pipeline: Arc<SessionPipeline>,
        config: SessionConfig,
        observer: Box<dyn SessionObserver>,
    ) -> Self {
        let machine = SessionStateMachine::new(config.settings.max_extraction_retries);
        Self {
            pipeline,
            config,
            machine,
            started_at: Instant::now(),
            cancelled: Arc::new(AtomicBool::new(false)),
            observer,
        }
    }

    /// Shares an externally owned cancel flag.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.machine.decision()
    }

    pub fn is_decided(&self) -> bool {
        self.machine.state().is_decided()
    }

    /// Time left before the face search gives up.
    pub fn remaining_face_time(&self) -> Duration {
        self.config
            .settings
            .face_timeout()
            .saturating_sub(self.started_at.elapsed())
    }

    pub fn cancel(&mut self) -> &SessionState {
        self.cancelled.store(true, Ordering::SeqCst);
        self.checkpoint();
        self.state()
    }

    /// Applies cancellation and the face timeout without a new frame.
    pub fn tick(&mut self) -> &SessionState {
        if self.checkpoint() {
            self.check_face_timeout();
        }
        self.state()
    }

    /// The frame source closed; no face can arrive anymore.
    pub fn finish_input(&mut self) -> &SessionState {
        if self.checkpoint() {
            let waited = self.started_at.elapsed();
            self.apply(SessionEvent::Failed(VerificationError::NoFaceFound { waited }));
        }
        self.state()
    }

    pub fn process_frame(&mut self, frame: Frame) -> &SessionState {
        if self.checkpoint() && self.check_face_timeout() {
            self.run_frame(frame);
        } else {
            log::debug!("Ignoring frame {}: session closed", frame.sequence());
        }
        self.state()
    }

    pub fn report_dropped_frames(&mut self, count: usize) {
        self.observer.metric("dropped_frames", count as f64);
    }

    /// Ends the session's reporting and hands back the decision, if any.
    pub fn into_decision(self) -> Option<Decision> {
        self.observer.summary();
        self.machine.decision().cloned()
    }

    fn run_frame(&mut self, frame: Frame) {
        if matches!(self.machine.state(), SessionState::Idle) {
            self.apply(SessionEvent::Started);
        }
        if !matches!(self.machine.state(), SessionState::AwaitingFace) {
            log::warn!(
                "Frame {} arrived in state {}",
                frame.sequence(),
                self.machine.state().name()
            );
            return;
        }

        let sequence = frame.sequence();
        let t0 = Instant::now();
        let detected = self.pipeline.detector.detect(frame);
        self.observer.timing("detect", elapsed_ms(t0));

        let (frame, regions) = match detected {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("Detection failed on frame {sequence}: {e}");
                self.observer.metric("detection_errors", 1.0);
                self.apply(SessionEvent::NoValidFace);
                return;
            }
        };
        self.observer.metric("regions", regions.len() as f64);

        let (chosen, rejections) = self.pipeline.gate.select(&regions);
        for rejection in &rejections {
            log::debug!("Frame {sequence}: {rejection}");
        }
        let Some(region) = chosen.cloned() else {
            self.apply(SessionEvent::NoValidFace);
            return;
        };
        drop(regions);

        if !self.apply(SessionEvent::FaceFound) || !self.checkpoint() {
            return;
        }
        if !self.apply(SessionEvent::ExtractionStarted) || !self.checkpoint() {
            return;
        }

        let t0 = Instant::now();
        let extracted = extract_features(
            self.pipeline.extractor.as_ref(),
            &frame,
            &region,
            &self.pipeline.crop,
        );
        self.observer.timing("extract", elapsed_ms(t0));
        drop(frame);

        if !self.checkpoint() {
            return;
        }
        let embedding = match extracted {
            Ok(embedding) => embedding,
            Err(e) => {
                self.observer.info(&format!("Extraction failed on frame {sequence}: {e}"));
                self.apply(SessionEvent::ExtractionFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        if !self.apply(SessionEvent::Extracted) || !self.checkpoint() {
            return;
        }

        let t0 = Instant::now();
        let matched = self
            .pipeline
            .matcher
            .identify(&embedding, &self.config.subjects);
        self.observer.timing("match", elapsed_ms(t0));
        drop(embedding);

        if !self.checkpoint() {
            return;
        }
        match matched {
            Ok(result) => self.apply(SessionEvent::Matched(result)),
            Err(e) => self.apply(SessionEvent::Failed(e)),
        };
    }

    /// Returns whether the session is still open after honoring a pending
    /// cancel.
    fn checkpoint(&mut self) -> bool {
        if self.machine.state().is_decided() {
            return false;
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return self.apply(SessionEvent::Failed(VerificationError::Cancelled));
        }
        true
    }

    /// The face timeout only bounds the search, not extraction or matching.
    fn check_face_timeout(&mut self) -> bool {
        if !matches!(
            self.machine.state(),
            SessionState::Idle | SessionState::AwaitingFace
        ) {
            return true;
        }
        let waited = self.started_at.elapsed();
        if waited >= self.config.settings.face_timeout() {
            return self.apply(SessionEvent::Failed(VerificationError::NoFaceFound { waited }));
        }
        true
    }

    /// Applies an event and reports it. Returns whether the session is
    /// still open.
    fn apply(&mut self, event: SessionEvent) -> bool {
        let from = self.machine.state().name();
        match self.machine.apply(event) {
            Ok(to) => {
                let to = to.name();
                if from != to {
                    self.observer.transition(from, to);
                }
            }
            Err(e) => log::warn!("Ignoring session event: {e}"),
        }
        if let Some(decision) = self.machine.decision() {
            let message = format!("Decided: {decision}");
            self.observer.info(&message);
            return false;
        }
        true
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
    use crate::detection::domain::face_region::FaceRegion;
    use crate::verification::domain::session_config::SessionSettings;
    use crate::verification::domain::session_fixtures::*;
    use crate::verification::domain::verification_error::ErrorKind;

    fn settings(face_timeout_ms: u64, max_extraction_retries: u32) -> SessionSettings {
        SessionSettings {
            face_timeout_ms,
            max_extraction_retries,
        }
    }

    fn session(fixture: &Fixture, settings: SessionSettings) -> (VerificationSession, Transitions) {
        let (observer, transitions) = RecordingObserver::new();
        let config = SessionConfig::for_subject("alice", settings);
        let session = VerificationSession::new(fixture.pipeline(), config, Box::new(observer));
        (session, transitions)
    }

    #[test]
    fn test_frames_without_faces_never_reach_extractor() {
        let fixture = Fixture::new();
        let (mut s, _) = session(&fixture, SessionSettings::default());
        for seq in 0..5 {
            assert_eq!(s.process_frame(sharp_frame(seq)), &SessionState::AwaitingFace);
        }
        assert_eq!(fixture.extractor.calls(), 0);
    }

    #[test]
    fn test_gated_faces_never_reach_extractor() {
        let fixture = Fixture::new();
        fixture
            .detector
            .insert(0, vec![FaceRegion::new(10.0, 10.0, 30.0, 30.0, 0.95)]);
        fixture.detector.insert(1, vec![face_region(0.4)]);
        let (mut s, _) = session(&fixture, SessionSettings::default());
        s.process_frame(sharp_frame(0));
        s.process_frame(sharp_frame(1));
        assert_eq!(s.state(), &SessionState::AwaitingFace);
        assert_eq!(fixture.extractor.calls(), 0);
    }

    #[test]
    fn test_full_path_accepts_enrolled_subject() {
        let fixture = Fixture::new();
        fixture.detector.insert(2, vec![face_region(0.9)]);
        let (mut s, transitions) = session(&fixture, SessionSettings::default());

        s.process_frame(sharp_frame(1));
        s.process_frame(sharp_frame(2));

        let decision = s.decision().unwrap();
        assert!(decision.is_accepted(), "{decision}");
        assert_eq!(
            decision.match_result().unwrap().matched_subject().unwrap().as_str(),
            "alice"
        );
        assert_eq!(
            transitions.names(),
            vec![
                "Idle->AwaitingFace",
                "AwaitingFace->FaceDetected",
                "FaceDetected->ExtractingFeatures",
                "ExtractingFeatures->Matching",
                "Matching->Decided",
            ]
        );
    }

    #[test]
    fn test_stranger_is_rejected() {
        let fixture = Fixture::with_probe(vec![0.0, 1.0]);
        fixture.detector.insert(0, vec![face_region(0.9)]);
        let (mut s, _) = session(&fixture, SessionSettings::default());
        s.process_frame(sharp_frame(0));
        assert!(matches!(s.decision(), Some(Decision::Rejected(_))));
    }

    #[test]
    fn test_face_timeout_decides_no_face_found() {
        let fixture = Fixture::new();
        let (mut s, _) = session(&fixture, settings(30, 3));
        for seq in 0..3 {
            s.process_frame(sharp_frame(seq));
        }
        std::thread::sleep(Duration::from_millis(40));
        // a face arriving after the deadline is too late
        fixture.detector.insert(10, vec![face_region(0.9)]);
        s.process_frame(sharp_frame(10));

        let err = s.decision().unwrap().error().unwrap();
        assert_eq!(err.kind(), ErrorKind::NoFaceFound);
        assert_eq!(fixture.extractor.calls(), 0);
    }

    #[test]
    fn test_tick_applies_timeout_without_frames() {
        let fixture = Fixture::new();
        let (mut s, _) = session(&fixture, settings(0, 3));
        s.tick();
        assert_eq!(
            s.decision().unwrap().error().unwrap().kind(),
            ErrorKind::NoFaceFound
        );
    }

    #[test]
    fn test_face_timeout_counts_from_creation_not_first_frame() {
        let fixture = Fixture::new();
        fixture.detector.insert(0, vec![face_region(0.9)]);
        let (mut s, _) = session(&fixture, settings(30, 3));
        std::thread::sleep(Duration::from_millis(40));

        s.process_frame(sharp_frame(0));
        assert_eq!(
            s.decision().unwrap().error().unwrap().kind(),
            ErrorKind::NoFaceFound
        );
        assert_eq!(fixture.extractor.calls(), 0);
    }

    #[test]
    fn test_extraction_failure_is_transient() {
        let fixture = Fixture::new();
        fixture.detector.insert(0, vec![face_region(0.9)]);
        fixture.detector.insert(1, vec![face_region(0.9)]);
        let (mut s, _) = session(&fixture, SessionSettings::default());

        assert_eq!(s.process_frame(blurry_frame(0)), &SessionState::AwaitingFace);
        s.process_frame(sharp_frame(1));
        assert!(s.decision().unwrap().is_accepted());
    }

    #[test]
    fn test_extraction_retry_budget_is_enforced() {
        let fixture = Fixture::new();
        for seq in 0..3 {
            fixture.detector.insert(seq, vec![face_region(0.9)]);
        }
        let (mut s, _) = session(&fixture, settings(10_000, 2));

        s.process_frame(blurry_frame(0));
        s.process_frame(blurry_frame(1));
        assert_eq!(s.state(), &SessionState::AwaitingFace);
        s.process_frame(blurry_frame(2));

        let err = s.decision().unwrap().error().unwrap();
        assert_eq!(err.kind(), ErrorKind::ExtractionRetriesExhausted);
        assert!(err.to_string().contains("too blurry"));
    }

    #[test]
    fn test_cancel_mid_extraction_stops_all_transitions() {
        let fixture = Fixture::new();
        fixture.detector.insert(0, vec![face_region(0.9)]);
        fixture.detector.insert(1, vec![face_region(0.9)]);
        let (mut s, transitions) = session(&fixture, SessionSettings::default());
        fixture.extractor.cancel_during_extract(s.cancel_flag());

        s.process_frame(sharp_frame(0));
        assert_eq!(
            s.decision(),
            Some(&Decision::Error(VerificationError::Cancelled))
        );
        let after_cancel = transitions.names();
        assert_eq!(after_cancel.last().unwrap(), "ExtractingFeatures->Decided");

        s.process_frame(sharp_frame(1));
        s.tick();
        s.finish_input();
        assert_eq!(transitions.names(), after_cancel);
        assert_eq!(fixture.extractor.calls(), 1);
    }

    #[test]
    fn test_cancel_before_any_frame() {
        let fixture = Fixture::new();
        let (mut s, _) = session(&fixture, SessionSettings::default());
        s.cancel();
        assert_eq!(
            s.into_decision(),
            Some(Decision::Error(VerificationError::Cancelled))
        );
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let fixture = Fixture::enrolled_with_version("2");
        fixture.detector.insert(0, vec![face_region(0.9)]);
        let (mut s, _) = session(&fixture, SessionSettings::default());
        s.process_frame(sharp_frame(0));
        assert_eq!(
            s.decision().unwrap().error().unwrap().kind(),
            ErrorKind::VersionMismatch
        );
    }

    #[test]
    fn test_finish_input_without_face() {
        let fixture = Fixture::new();
        let (mut s, _) = session(&fixture, SessionSettings::default());
        s.process_frame(sharp_frame(0));
        s.finish_input();
        assert_eq!(
            s.decision().unwrap().error().unwrap().kind(),
            ErrorKind::NoFaceFound
        );
    }

    struct BrokenDetector;

    impl FaceDetector for BrokenDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<FaceRegion>, DetectionError> {
            Err(DetectionError::Unavailable("model not loaded".into()))
        }
    }

    #[test]
    fn test_detector_failure_is_per_frame() {
        let fixture = Fixture::new();
        let pipeline = Arc::new(fixture.pipeline_with_detector(Arc::new(BrokenDetector)));
        let config = SessionConfig::for_subject("alice", SessionSettings::default());
        let mut s = VerificationSession::new(pipeline, config, Box::new(RecordingObserver::new().0));
        for seq in 0..3 {
            assert_eq!(s.process_frame(sharp_frame(seq)), &SessionState::AwaitingFace);
        }
    }
}
