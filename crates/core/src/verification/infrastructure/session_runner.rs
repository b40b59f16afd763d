use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;

use crate::shared::frame::Frame;
use crate::verification::domain::session_config::SessionConfig;
use crate::verification::domain::session_observer::{LogSessionObserver, SessionObserver};
use crate::verification::domain::session_state::{Decision, SessionState};
use crate::verification::domain::verification_error::VerificationError;
use crate::verification::domain::verification_session::{SessionPipeline, VerificationSession};

/// Upper bound on how long a worker sleeps before re-checking cancel and
/// the face timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug, PartialEq)]
#[error("session no longer accepts frames")]
pub struct SessionClosed;

/// Starts verification sessions over a shared set of capabilities.
///
/// Each session runs on its own worker thread. Sessions share nothing
/// mutable apart from the enrollment store behind the identity matcher.
pub struct Verifier {
    pipeline: Arc<SessionPipeline>,
    next_id: AtomicU64,
}

impl Verifier {
    pub fn new(pipeline: SessionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn pipeline(&self) -> &Arc<SessionPipeline> {
        &self.pipeline
    }

    /// Starts a session that reports through the `log` facade.
    pub fn start_session(&self, config: SessionConfig) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let observer = LogSessionObserver::new(format!("session-{id}"));
        self.spawn(id, config, Box::new(observer))
    }

    pub fn start_session_with_observer(
        &self,
        config: SessionConfig,
        observer: Box<dyn SessionObserver>,
    ) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.spawn(id, config, observer)
    }

    fn spawn(
        &self,
        id: u64,
        config: SessionConfig,
        observer: Box<dyn SessionObserver>,
    ) -> SessionHandle {
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<Frame>();
        let (decision_tx, decision_rx) = crossbeam_channel::bounded::<Decision>(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        let session = VerificationSession::new(self.pipeline.clone(), config, observer)
            .with_cancel_flag(cancelled.clone());
        log::debug!("Starting verification session {id}");
        let worker = std::thread::spawn(move || run_session(session, frame_rx, decision_tx));

        SessionHandle {
            id,
            frames: Some(frame_tx),
            cancelled,
            decisions: decision_rx,
            delivered: false,
            worker: Some(worker),
        }
    }
}

/// Caller side of one running session. Dropping the handle cancels it.
pub struct SessionHandle {
    id: u64,
    frames: Option<Sender<Frame>>,
    cancelled: Arc<AtomicBool>,
    decisions: Receiver<Decision>,
    delivered: bool,
    worker: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues a frame. Frames that pile up while the session searches for a
    /// face are superseded by newer ones.
    pub fn feed_frame(&self, frame: Frame) -> Result<(), SessionClosed> {
        let frames = self.frames.as_ref().ok_or(SessionClosed)?;
        frames.send(frame).map_err(|_| SessionClosed)
    }

    /// Signals that no more frames will come.
    pub fn finish_input(&mut self) {
        self.frames = None;
    }

    /// Requests cancellation; the session stops at its next transition.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Blocks until the session decides. Returns `None` once the decision
    /// has already been delivered.
    pub fn wait_for_decision(&mut self) -> Option<Decision> {
        if self.delivered {
            return None;
        }
        let decision = self.decisions.recv().unwrap_or_else(|_| worker_lost());
        self.deliver(decision)
    }

    /// Like [`wait_for_decision`](Self::wait_for_decision) but gives up
    /// after `timeout`, returning `None` without consuming the decision.
    pub fn wait_for_decision_timeout(&mut self, timeout: Duration) -> Option<Decision> {
        if self.delivered {
            return None;
        }
        match self.decisions.recv_timeout(timeout) {
            Ok(decision) => self.deliver(decision),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.deliver(worker_lost()),
        }
    }

    fn deliver(&mut self, decision: Decision) -> Option<Decision> {
        self.delivered = true;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Session {} worker panicked", self.id);
            }
        }
        Some(decision)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.delivered {
            self.cancel();
        }
        self.frames = None;
    }
}

fn worker_lost() -> Decision {
    Decision::Error(VerificationError::Internal(
        "session worker stopped without a decision".into(),
    ))
}

fn run_session(
    mut session: VerificationSession,
    frames: Receiver<Frame>,
    decision_tx: Sender<Decision>,
) {
    let mut input_open = true;
    while !session.is_decided() {
        if !input_open {
            session.finish_input();
            break;
        }
        let wait = session.remaining_face_time().min(POLL_INTERVAL);
        match frames.recv_timeout(wait) {
            Ok(frame) => {
                let frame = if awaiting_face(session.state()) {
                    let (newest, dropped) = newest_frame(frame, &frames);
                    if dropped > 0 {
                        log::debug!("Dropped {dropped} superseded frame(s)");
                        session.report_dropped_frames(dropped);
                    }
                    newest
                } else {
                    frame
                };
                session.process_frame(frame);
            }
            Err(RecvTimeoutError::Timeout) => {
                session.tick();
            }
            Err(RecvTimeoutError::Disconnected) => input_open = false,
        }
    }

    let decision = session.into_decision().unwrap_or_else(worker_lost);
    // The handle may be gone already; nobody is left to tell.
    let _ = decision_tx.send(decision);
}

fn awaiting_face(state: &SessionState) -> bool {
    matches!(state, SessionState::Idle | SessionState::AwaitingFace)
}

/// Drains queued frames, keeping only the most recent.
fn newest_frame(first: Frame, frames: &Receiver<Frame>) -> (Frame, usize) {
    let mut newest = first;
    let mut dropped = 0;
    loop {
        match frames.try_recv() {
            Ok(frame) => {
                newest = frame;
                dropped += 1;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    (newest, dropped)
}
