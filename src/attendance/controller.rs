//! Attendance session controller
//!
//! Owns the camera handle, the recurring recognition tick and the session
//! generation, and exposes the capture lifecycle:
//!
//! ```text
//! Idle -> CameraActive -> Recognizing <-> Paused -> Stopped
//! ```
//!
//! Every request is tagged with the generation it was issued under. Pausing,
//! stopping and switching modes bump the generation, so replies that arrive
//! after any of those are dropped instead of reaching the roster.

use super::overlay::{Overlay, OverlayRenderer};
use super::roster::{RosterEntry, RosterReconciler, RosterSummary, UpsertOutcome};
use super::state::{ActiveSession, AttendanceMode, BackendStatus, SessionContext, SessionState};
use crate::capture::{CameraHandle, CaptureError, FrameCapture, Resolution};
use crate::recognition::{
    RecognitionContext, RecognitionError, RecognitionResult, RecognitionService,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default spacing between roster ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(3000);

/// How many recent recognitions are kept for display
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

/// Session controller errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Operation requires {expected:?} mode (current mode: {actual:?})")]
    WrongMode {
        expected: AttendanceMode,
        actual: AttendanceMode,
    },

    #[error("Recognition service is not connected")]
    BackendUnavailable,

    #[error("A capture is already in progress")]
    CaptureInProgress,

    #[error("Failed to start attendance session: {0}")]
    SessionStart(RecognitionError),

    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Events emitted by the controller
#[derive(Debug, Clone)]
pub enum AttendanceEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    BackendStatus(BackendStatus),
    SessionStarted {
        session_id: String,
    },
    /// A result was applied; `outcome` is `None` in self mode
    Recognized {
        result: RecognitionResult,
        outcome: Option<UpsertOutcome>,
    },
    /// The service answered with its unknown-identity sentinel
    NotRecognized,
    /// A tick's request failed; the loop keeps running
    TickFailed(String),
    Reset,
}

/// Result of a self-mode capture
#[derive(Debug, Clone, PartialEq)]
pub enum SelfCheckOutcome {
    Marked(RecognitionResult),
    NotRecognized,
}

/// Controller tuning
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub tick_interval: Duration,
    pub contact_domain: String,
    pub recent_capacity: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            contact_domain: super::roster::DEFAULT_CONTACT_DOMAIN.to_string(),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
        }
    }
}

/// Mutable controller state. Never held across an await.
struct Shared {
    state: SessionState,
    mode: AttendanceMode,
    backend: BackendStatus,
    generation: u64,
    camera: Option<CameraHandle>,
    session: Option<ActiveSession>,
    roster: RosterReconciler,
    recent: VecDeque<RecognitionResult>,
    recent_capacity: usize,
    overlay: Option<Overlay>,
    self_attendance: Option<RecognitionResult>,
}

impl Shared {
    fn remember(
        &mut self,
        frame: Resolution,
        result: &RecognitionResult,
        renderer: &OverlayRenderer,
    ) {
        self.overlay = Some(Overlay {
            frame,
            commands: renderer.draw(frame, result),
        });
        if self.recent.len() == self.recent_capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(result.clone());
    }

    /// Whether a roster tick issued under `generation` may still land
    fn accepts_tick(&self, generation: u64) -> bool {
        self.generation == generation && self.state == SessionState::Recognizing
    }
}

struct Ticker {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

/// Everything a tick needs, cloned out of the controller
#[derive(Clone)]
struct TickContext {
    shared: Arc<Mutex<Shared>>,
    capture: Arc<FrameCapture>,
    service: Arc<dyn RecognitionService>,
    renderer: OverlayRenderer,
    tick_lock: Arc<tokio::sync::Mutex<()>>,
    event_tx: broadcast::Sender<AttendanceEvent>,
}

/// Drives camera capture and recognition for one attendance page
pub struct SessionController {
    ctx: TickContext,
    settings: ControllerSettings,
    ticker: Mutex<Option<Ticker>>,
    self_in_flight: AtomicBool,
}

impl SessionController {
    /// Create a controller in `Idle`, roster mode
    pub fn new(
        capture: FrameCapture,
        service: Arc<dyn RecognitionService>,
        settings: ControllerSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let shared = Shared {
            state: SessionState::Idle,
            mode: AttendanceMode::Roster,
            backend: BackendStatus::Checking,
            generation: 0,
            camera: None,
            session: None,
            roster: RosterReconciler::new(settings.contact_domain.clone()),
            recent: VecDeque::new(),
            recent_capacity: settings.recent_capacity.max(1),
            overlay: None,
            self_attendance: None,
        };

        Self {
            ctx: TickContext {
                shared: Arc::new(Mutex::new(shared)),
                capture: Arc::new(capture),
                service,
                renderer: OverlayRenderer,
                tick_lock: Arc::new(tokio::sync::Mutex::new(())),
                event_tx,
            },
            settings,
            ticker: Mutex::new(None),
            self_in_flight: AtomicBool::new(false),
        }
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.ctx.shared.lock().state
    }

    pub fn mode(&self) -> AttendanceMode {
        self.ctx.shared.lock().mode
    }

    pub fn backend_status(&self) -> BackendStatus {
        self.ctx.shared.lock().backend
    }

    pub fn session(&self) -> Option<ActiveSession> {
        self.ctx.shared.lock().session.clone()
    }

    pub fn camera_live(&self) -> bool {
        self.ctx
            .shared
            .lock()
            .camera
            .as_ref()
            .map(CameraHandle::is_live)
            .unwrap_or(false)
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.ctx.shared.lock().roster.entries().to_vec()
    }

    pub fn roster_summary(&self) -> RosterSummary {
        self.ctx.shared.lock().roster.summary()
    }

    /// Oldest first
    pub fn recent_recognitions(&self) -> Vec<RecognitionResult> {
        self.ctx.shared.lock().recent.iter().cloned().collect()
    }

    pub fn overlay(&self) -> Option<Overlay> {
        self.ctx.shared.lock().overlay.clone()
    }

    pub fn self_attendance(&self) -> Option<RecognitionResult> {
        self.ctx.shared.lock().self_attendance.clone()
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.ctx.event_tx.subscribe()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Probe the recognition service and record the result
    pub async fn check_backend(&self) -> BackendStatus {
        self.set_backend(BackendStatus::Checking);
        let status = if self.ctx.service.probe().await {
            BackendStatus::Connected
        } else {
            BackendStatus::Disconnected
        };
        self.set_backend(status);
        tracing::info!("Recognition service status: {:?}", status);
        status
    }

    /// Acquire the camera. No-op if it is already live.
    pub async fn start(&self) -> SessionResult<()> {
        if self.state().camera_live() {
            return Ok(());
        }

        let handle = self.ctx.capture.acquire().await?;

        {
            let mut shared = self.ctx.shared.lock();
            if !shared.state.camera_live() {
                shared.camera = Some(handle);
                self.ctx.transition(&mut shared, SessionState::CameraActive);
                return Ok(());
            }
        }
        // Another start won the race
        release_camera(Some(handle));
        Ok(())
    }

    /// Open a roster session on the server and arm the recurring tick.
    ///
    /// On failure the controller stays in `CameraActive` so the caller can
    /// retry without re-acquiring the camera.
    pub async fn start_session(&self, context: SessionContext) -> SessionResult<ActiveSession> {
        {
            let shared = self.ctx.shared.lock();
            Self::require_mode(&shared, AttendanceMode::Roster)?;
            Self::require_state(&shared, SessionState::CameraActive, "start a session")?;
            if shared.backend != BackendStatus::Connected {
                return Err(SessionError::BackendUnavailable);
            }
        }

        let server = self
            .ctx
            .service
            .start_session(&context)
            .await
            .map_err(|e| {
                tracing::warn!("Start session rejected: {}", e);
                SessionError::SessionStart(e)
            })?;

        let mut shared = self.ctx.shared.lock();
        Self::require_state(&shared, SessionState::CameraActive, "start a session")?;

        let recognition = context.recognition_context();
        shared.generation += 1;
        let generation = shared.generation;
        let session = ActiveSession {
            context,
            server,
            generation,
        };
        shared.session = Some(session.clone());
        self.ctx.transition(&mut shared, SessionState::Recognizing);
        self.arm_ticker(generation, recognition);

        let _ = self.ctx.event_tx.send(AttendanceEvent::SessionStarted {
            session_id: session.id().to_string(),
        });
        Ok(session)
    }

    /// Cancel the recurring tick; the camera stays live
    pub fn pause(&self) -> SessionResult<()> {
        let mut shared = self.ctx.shared.lock();
        Self::require_state(&shared, SessionState::Recognizing, "pause")?;

        self.disarm_ticker();
        shared.generation += 1;
        self.ctx.transition(&mut shared, SessionState::Paused);
        Ok(())
    }

    /// Re-arm the recurring tick
    pub fn resume(&self) -> SessionResult<()> {
        let mut shared = self.ctx.shared.lock();
        Self::require_state(&shared, SessionState::Paused, "resume")?;
        let recognition = match &shared.session {
            Some(session) => session.context.recognition_context(),
            None => {
                return Err(SessionError::InvalidState {
                    operation: "resume without a session",
                    state: shared.state,
                })
            }
        };

        shared.generation += 1;
        let generation = shared.generation;
        if let Some(session) = shared.session.as_mut() {
            session.generation = generation;
        }
        self.ctx.transition(&mut shared, SessionState::Recognizing);
        self.arm_ticker(generation, recognition);
        Ok(())
    }

    /// Cancel the tick, release the camera and forget the session.
    ///
    /// Does not wait for a request already on the wire; its reply is dropped.
    pub fn stop(&self) {
        let camera = {
            let mut shared = self.ctx.shared.lock();
            let camera = self.stop_locked(&mut shared);
            if shared.state != SessionState::Idle {
                self.ctx.transition(&mut shared, SessionState::Stopped);
            }
            camera
        };
        release_camera(camera);
    }

    /// Clear the roster, recent results and self attendance, and stop the camera
    pub fn reset(&self) {
        let camera = {
            let mut shared = self.ctx.shared.lock();
            let camera = self.stop_locked(&mut shared);
            shared.roster.reset();
            shared.recent.clear();
            shared.overlay = None;
            shared.self_attendance = None;
            self.ctx.transition(&mut shared, SessionState::Idle);
            camera
        };
        release_camera(camera);
        let _ = self.ctx.event_tx.send(AttendanceEvent::Reset);
    }

    /// Switch between roster and self mode. Always a full reset.
    pub fn switch_mode(&self, mode: AttendanceMode) {
        self.reset();
        self.ctx.shared.lock().mode = mode;
        tracing::info!("Attendance mode switched to {:?}", mode);
    }

    /// One capture -> recognize -> mark cycle for the teacher's own attendance.
    ///
    /// At most one runs at a time; a concurrent call fails with
    /// [`SessionError::CaptureInProgress`].
    pub async fn capture_once(&self) -> SessionResult<SelfCheckOutcome> {
        if self
            .self_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::CaptureInProgress);
        }
        let _in_flight = InFlightGuard(&self.self_in_flight);

        let (camera, generation) = {
            let shared = self.ctx.shared.lock();
            Self::require_mode(&shared, AttendanceMode::SelfCheck)?;
            Self::require_state(&shared, SessionState::CameraActive, "capture")?;
            if shared.backend != BackendStatus::Connected {
                return Err(SessionError::BackendUnavailable);
            }
            let camera = shared.camera.clone().ok_or(SessionError::InvalidState {
                operation: "capture without a camera",
                state: shared.state,
            })?;
            (camera, shared.generation)
        };

        let image = self.ctx.capture.capture_frame(&camera).await?;
        let outcome = self
            .ctx
            .service
            .recognize_and_mark(&image, &RecognitionContext::SelfCheck)
            .await;

        let mut shared = self.ctx.shared.lock();
        if shared.generation != generation || shared.state != SessionState::CameraActive {
            tracing::debug!("Discarding self-check reply from generation {}", generation);
            return Err(SessionError::Superseded);
        }

        match outcome {
            Ok(result) => {
                tracing::info!(
                    "Teacher {} marked present ({} confidence)",
                    result.display_name,
                    result.confidence_percent()
                );
                shared.self_attendance = Some(result.clone());
                shared.remember(image.resolution(), &result, &self.ctx.renderer);
                let _ = self.ctx.event_tx.send(AttendanceEvent::Recognized {
                    result: result.clone(),
                    outcome: None,
                });
                Ok(SelfCheckOutcome::Marked(result))
            }
            Err(RecognitionError::NoMatch) => {
                tracing::info!("Face not recognized");
                let _ = self.ctx.event_tx.send(AttendanceEvent::NotRecognized);
                Ok(SelfCheckOutcome::NotRecognized)
            }
            Err(e) => {
                tracing::error!("Self-check recognition failed: {}", e);
                Err(SessionError::Recognition(e))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn require_state(
        shared: &Shared,
        expected: SessionState,
        operation: &'static str,
    ) -> SessionResult<()> {
        if shared.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: shared.state,
            })
        }
    }

    fn require_mode(shared: &Shared, expected: AttendanceMode) -> SessionResult<()> {
        if shared.mode == expected {
            Ok(())
        } else {
            Err(SessionError::WrongMode {
                expected,
                actual: shared.mode,
            })
        }
    }

    fn set_backend(&self, status: BackendStatus) {
        self.ctx.shared.lock().backend = status;
        let _ = self.ctx.event_tx.send(AttendanceEvent::BackendStatus(status));
    }

    /// Returns the camera for the caller to release once the lock is gone
    #[must_use]
    fn stop_locked(&self, shared: &mut Shared) -> Option<CameraHandle> {
        self.disarm_ticker();
        shared.generation += 1;
        if let Some(session) = shared.session.take() {
            tracing::info!("Attendance session {} closed", session.id());
        }
        shared.camera.take()
    }

    fn arm_ticker(&self, generation: u64, recognition: RecognitionContext) {
        let token = CancellationToken::new();
        let handle = tokio::spawn(self.ctx.clone().run_ticker(
            generation,
            recognition,
            self.settings.tick_interval,
            token.clone(),
        ));

        if let Some(previous) = self.ticker.lock().replace(Ticker {
            token,
            _handle: handle,
        }) {
            previous.token.cancel();
        }
    }

    /// Cancellation is immediate: a tick that has not started its work will not run
    fn disarm_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.token.cancel();
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disarm_ticker();
        let camera = self.ctx.shared.lock().camera.take();
        release_camera(camera);
    }
}

/// Device shutdown can block; never call this with `Shared` locked
fn release_camera(camera: Option<CameraHandle>) {
    if let Some(camera) = camera {
        camera.release();
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TickContext {
    fn transition(&self, shared: &mut Shared, to: SessionState) {
        let from = shared.state;
        if from == to {
            return;
        }
        shared.state = to;
        tracing::info!("Attendance state {:?} -> {:?}", from, to);
        let _ = self.event_tx.send(AttendanceEvent::StateChanged { from, to });
    }

    async fn run_ticker(
        self,
        generation: u64,
        recognition: RecognitionContext,
        period: Duration,
        token: CancellationToken,
    ) {
        // First tick one full period after arming
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    // Ticks are serialized across re-arms: wait for any earlier
                    // tick's request to settle before starting this one.
                    let _slot = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        slot = self.tick_lock.lock() => slot,
                    };
                    if token.is_cancelled() {
                        break;
                    }
                    self.tick(generation, &recognition).await;
                }
            }
        }

        tracing::debug!("Recognition ticker for generation {} exited", generation);
    }

    async fn tick(&self, generation: u64, recognition: &RecognitionContext) {
        let camera = {
            let shared = self.shared.lock();
            if !shared.accepts_tick(generation) {
                return;
            }
            match &shared.camera {
                Some(camera) if camera.is_live() => camera.clone(),
                _ => return,
            }
        };

        let image = match self.capture.capture_frame(&camera).await {
            Ok(image) => image,
            Err(CaptureError::NotReady) => {
                tracing::debug!("Camera not ready, skipping tick");
                return;
            }
            Err(CaptureError::Released) => return,
            Err(e) => {
                tracing::warn!("Frame capture failed: {}", e);
                return;
            }
        };

        let outcome = self.service.recognize_and_mark(&image, recognition).await;

        let mut shared = self.shared.lock();
        if !shared.accepts_tick(generation) {
            tracing::debug!(
                "Discarding recognition reply from generation {} (now {}, {:?})",
                generation,
                shared.generation,
                shared.state
            );
            return;
        }

        match outcome {
            Ok(result) => {
                let upsert = shared.roster.upsert(&result);
                shared.remember(image.resolution(), &result, &self.renderer);
                tracing::info!(
                    "Recognized {} ({}) at {}: {:?}",
                    result.display_name,
                    result.identity_id.as_deref().unwrap_or("no id"),
                    result.confidence_percent(),
                    upsert
                );
                let _ = self.event_tx.send(AttendanceEvent::Recognized {
                    result,
                    outcome: Some(upsert),
                });
            }
            Err(RecognitionError::NoMatch) => {
                let _ = self.event_tx.send(AttendanceEvent::NotRecognized);
            }
            Err(e) => {
                tracing::warn!("Recognition tick failed: {}", e);
                let _ = self.event_tx.send(AttendanceEvent::TickFailed(e.to_string()));
            }
        }
    }
}
