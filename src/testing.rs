//! Test doubles shared by the unit tests

use crate::attendance::state::SessionContext;
use crate::capture::{CameraSource, CaptureError, CaptureResult, EncodedImage, RawFrame, VideoStream};
use crate::recognition::{
    RecognitionContext, RecognitionError, RecognitionKind, RecognitionOutcome, RecognitionResult,
    RecognitionService, ServerSession,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub(crate) fn solid_frame(width: u32, height: u32) -> RawFrame {
    RawFrame {
        width,
        height,
        rgb: vec![128; width as usize * height as usize * 3],
    }
}

pub(crate) fn roster_result(id: &str, name: &str, confidence: f64) -> RecognitionResult {
    RecognitionResult {
        identity_id: Some(id.to_string()),
        display_name: name.to_string(),
        confidence,
        timestamp: Utc::now(),
        kind: RecognitionKind::Roster {
            status: "present".to_string(),
        },
    }
}

pub(crate) fn self_result(
    id: &str,
    name: &str,
    role: Option<&str>,
    confidence: f64,
) -> RecognitionResult {
    RecognitionResult {
        identity_id: Some(id.to_string()),
        display_name: name.to_string(),
        confidence,
        timestamp: Utc::now(),
        kind: RecognitionKind::SelfCheck {
            role: role.map(str::to_string),
            status: "present".to_string(),
        },
    }
}

// =============================================================================
// Camera
// =============================================================================

/// Camera whose stream reports `NotReady` for the first `warmup` grabs
pub(crate) struct FakeCamera {
    warmup: usize,
    deny: bool,
    stop_delay: Duration,
    opens: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    stopping: Arc<AtomicBool>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            warmup: 0,
            deny: false,
            stop_delay: Duration::ZERO,
            opens: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn warmup_grabs(mut self, grabs: usize) -> Self {
        self.warmup = grabs;
        self
    }

    pub fn deny_access(mut self) -> Self {
        self.deny = true;
        self
    }

    /// Make `stop` block the calling thread, like a device that is slow to shut down
    pub fn slow_stop(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    /// Set once a stream has entered `stop`
    pub fn stopping_flag(&self) -> Arc<AtomicBool> {
        self.stopping.clone()
    }

    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }

    pub fn stop_counter(&self) -> Arc<AtomicUsize> {
        self.stops.clone()
    }
}

#[async_trait]
impl CameraSource for FakeCamera {
    fn id(&self) -> &str {
        "fake"
    }

    async fn open(&self) -> CaptureResult<Box<dyn VideoStream>> {
        if self.deny {
            return Err(CaptureError::Device("permission denied".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            warmup: self.warmup,
            stopped: false,
            stop_delay: self.stop_delay,
            stops: self.stops.clone(),
            stopping: self.stopping.clone(),
        }))
    }
}

struct FakeStream {
    warmup: usize,
    stopped: bool,
    stop_delay: Duration,
    stops: Arc<AtomicUsize>,
    stopping: Arc<AtomicBool>,
}

impl VideoStream for FakeStream {
    fn grab(&mut self) -> CaptureResult<RawFrame> {
        if self.stopped {
            return Err(CaptureError::Released);
        }
        if self.warmup > 0 {
            self.warmup -= 1;
            return Err(CaptureError::NotReady);
        }
        Ok(solid_frame(32, 24))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopping.store(true, Ordering::SeqCst);
            std::thread::sleep(self.stop_delay);
            self.stopped = true;
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// =============================================================================
// Recognition service
// =============================================================================

/// Scripted recognition backend.
///
/// Replies are served in order; an empty queue answers `NoMatch`. When gated,
/// every request waits for a permit from [`release`](Self::release).
pub(crate) struct FakeService {
    reachable: AtomicBool,
    session_reply: Mutex<RecognitionOutcome<ServerSession>>,
    replies: Mutex<VecDeque<RecognitionOutcome<RecognitionResult>>>,
    contexts: Mutex<Vec<RecognitionContext>>,
    delay: Mutex<Option<Duration>>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            session_reply: Mutex::new(Ok(ServerSession {
                id: "session-1".to_string(),
                payload: serde_json::json!({ "id": "session-1" }),
            })),
            replies: Mutex::new(VecDeque::new()),
            contexts: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            gate: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn unreachable(self) -> Self {
        self.reachable.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn reply(&self, outcome: RecognitionOutcome<RecognitionResult>) {
        self.replies.lock().push_back(outcome);
    }

    pub fn set_session_reply(&self, outcome: RecognitionOutcome<ServerSession>) {
        *self.session_reply.lock() = outcome;
    }

    /// Let `n` gated requests complete
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<RecognitionContext> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl RecognitionService for FakeService {
    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn start_session(&self, _context: &SessionContext) -> RecognitionOutcome<ServerSession> {
        self.session_reply.lock().clone()
    }

    async fn recognize_and_mark(
        &self,
        _image: &EncodedImage,
        context: &RecognitionContext,
    ) -> RecognitionOutcome<RecognitionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(context.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or(Err(RecognitionError::NoMatch))
    }
}
