//! Attendance command handlers
//!
//! Thin async entry points over a shared [`SessionController`]; each maps
//! its failure into an [`ErrorResponse`] for the caller.

use crate::attendance::{
    ActiveSession, AttendanceMode, BackendStatus, ControllerSettings, Overlay, RosterEntry,
    RosterSummary, SelfCheckOutcome, SessionContext, SessionController, SessionState,
};
use crate::capture::{CameraInfo, CameraSource, FrameCapture};
use crate::config::AttendanceConfig;
use crate::export::{export_roster, export_self, ExportMeta};
use crate::recognition::{RecognitionClient, RecognitionResult, RecognitionService};
use crate::utils::error::{AppError, AppResult, ErrorResponse};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Application state for attendance capture
pub struct AttendanceState {
    pub controller: Arc<SessionController>,
    warmup: Duration,
}

impl AttendanceState {
    pub fn new(controller: SessionController, warmup: Duration) -> Self {
        Self {
            controller: Arc::new(controller),
            warmup,
        }
    }

    /// Wire a controller to the configured recognition service
    pub fn from_config(config: &AttendanceConfig, camera: Arc<dyn CameraSource>) -> AppResult<Self> {
        let client = RecognitionClient::new(&config.service.base_url, config.service.timeout())?;
        Ok(Self::with_service(config, camera, Arc::new(client)))
    }

    pub fn with_service(
        config: &AttendanceConfig,
        camera: Arc<dyn CameraSource>,
        service: Arc<dyn RecognitionService>,
    ) -> Self {
        let capture = FrameCapture::new(camera, config.capture.jpeg_quality);
        let settings: ControllerSettings = config.controller_settings();
        Self::new(
            SessionController::new(capture, service, settings),
            config.capture.warmup(),
        )
    }
}

/// Everything a page needs to render the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSnapshot {
    pub state: SessionState,
    pub mode: AttendanceMode,
    pub backend: BackendStatus,
    pub camera_live: bool,
    pub session: Option<ActiveSession>,
    pub roster: Vec<RosterEntry>,
    pub summary: RosterSummary,
    pub recent: Vec<RecognitionResult>,
    pub overlay: Option<Overlay>,
    pub self_attendance: Option<RecognitionResult>,
}

/// Session details as sent by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub teacher_id: String,
    pub subject_id: String,
    pub section: String,
    pub semester: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl From<SessionRequest> for SessionContext {
    fn from(request: SessionRequest) -> Self {
        let context = SessionContext::new(
            request.teacher_id,
            request.subject_id,
            &request.section,
            request.semester,
            request.date,
        );
        match request.duration_minutes {
            Some(minutes) => context.with_duration(minutes),
            None => context,
        }
    }
}

fn respond<T>(result: Result<T, impl Into<AppError>>) -> Result<T, ErrorResponse> {
    result.map_err(|e| ErrorResponse::from(e.into()))
}

/// Get list of available cameras/webcams
pub async fn get_cameras() -> Result<Vec<CameraInfo>, ErrorResponse> {
    #[cfg(feature = "webcam")]
    {
        Ok(crate::capture::webcam::get_cameras())
    }

    #[cfg(not(feature = "webcam"))]
    {
        Ok(vec![])
    }
}

/// Probe the recognition service
pub async fn check_backend(state: &AttendanceState) -> Result<BackendStatus, ErrorResponse> {
    Ok(state.controller.check_backend().await)
}

/// Start the camera
pub async fn start_camera(state: &AttendanceState) -> Result<(), ErrorResponse> {
    respond(state.controller.start().await)
}

/// Open a roster session and begin recurring recognition
pub async fn start_attendance(
    state: &AttendanceState,
    request: SessionRequest,
) -> Result<ActiveSession, ErrorResponse> {
    respond(state.controller.start_session(request.into()).await)
}

pub async fn pause_attendance(state: &AttendanceState) -> Result<(), ErrorResponse> {
    respond(state.controller.pause())
}

pub async fn resume_attendance(state: &AttendanceState) -> Result<(), ErrorResponse> {
    respond(state.controller.resume())
}

/// Stop recognition and release the camera
pub async fn stop_attendance(state: &AttendanceState) -> Result<(), ErrorResponse> {
    state.controller.stop();
    Ok(())
}

pub async fn reset_attendance(state: &AttendanceState) -> Result<(), ErrorResponse> {
    state.controller.reset();
    Ok(())
}

pub async fn switch_mode(
    state: &AttendanceState,
    mode: AttendanceMode,
) -> Result<(), ErrorResponse> {
    state.controller.switch_mode(mode);
    Ok(())
}

/// Start the camera if needed, let it settle, then run one self-mode capture
pub async fn capture_self(state: &AttendanceState) -> Result<SelfCheckOutcome, ErrorResponse> {
    if !state.controller.camera_live() {
        respond(state.controller.start().await)?;
        tokio::time::sleep(state.warmup).await;
    }
    respond(state.controller.capture_once().await)
}

/// Current controller state
pub async fn get_attendance_state(
    state: &AttendanceState,
) -> Result<AttendanceSnapshot, ErrorResponse> {
    let controller = &state.controller;
    Ok(AttendanceSnapshot {
        state: controller.state(),
        mode: controller.mode(),
        backend: controller.backend_status(),
        camera_live: controller.camera_live(),
        session: controller.session(),
        roster: controller.roster(),
        summary: controller.roster_summary(),
        recent: controller.recent_recognitions(),
        overlay: controller.overlay(),
        self_attendance: controller.self_attendance(),
    })
}

/// Write the current mode's records as CSV into `dir`
pub async fn export_attendance(
    state: &AttendanceState,
    dir: &Path,
    meta: ExportMeta,
) -> Result<PathBuf, ErrorResponse> {
    let controller = &state.controller;
    match controller.mode() {
        AttendanceMode::Roster => respond(export_roster(dir, &meta, &controller.roster())),
        AttendanceMode::SelfCheck => respond(export_self(
            dir,
            meta.date,
            controller.self_attendance().as_ref(),
        )),
    }
}
