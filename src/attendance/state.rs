//! Attendance session state
//!
//! Defines the capture state machine, the attendance modes and the context
//! a roster session is opened with.

use crate::recognition::{RecognitionContext, ServerSession};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current state of the capture controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No camera, no session
    Idle,
    /// Camera live, no recurring recognition
    CameraActive,
    /// Camera live and the recurring tick armed
    Recognizing,
    /// Session open, tick cancelled, camera still live
    Paused,
    /// Camera released after a stop
    Stopped,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionState {
    /// Whether the camera is held in this state
    pub fn camera_live(&self) -> bool {
        matches!(
            self,
            SessionState::CameraActive | SessionState::Recognizing | SessionState::Paused
        )
    }
}

/// Which attendance flow the controller is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceMode {
    /// Recurring multi-student capture into a roster
    #[serde(rename = "student")]
    Roster,
    /// One-shot capture of the teacher's own attendance
    #[serde(rename = "self")]
    SelfCheck,
}

impl Default for AttendanceMode {
    fn default() -> Self {
        Self::Roster
    }
}

/// Reachability of the recognition service as last probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendStatus {
    Checking,
    Connected,
    Disconnected,
}

impl Default for BackendStatus {
    fn default() -> Self {
        Self::Checking
    }
}

/// Class details a roster session is opened with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub teacher_id: String,
    pub subject_id: String,
    /// Always upper-case
    pub section: String,
    pub semester: String,
    pub date: NaiveDate,
    pub duration_minutes: u32,
}

impl SessionContext {
    pub const DEFAULT_DURATION_MINUTES: u32 = 60;

    pub fn new(
        teacher_id: impl Into<String>,
        subject_id: impl Into<String>,
        section: impl AsRef<str>,
        semester: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            teacher_id: teacher_id.into(),
            subject_id: subject_id.into(),
            section: section.as_ref().trim().to_uppercase(),
            semester: semester.into(),
            date,
            duration_minutes: Self::DEFAULT_DURATION_MINUTES,
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    /// `A-7` for section A, semester 7
    pub fn class_name(&self) -> String {
        format!("{}-{}", self.section, self.semester)
    }

    /// Form fields sent with each roster frame
    pub fn recognition_context(&self) -> RecognitionContext {
        RecognitionContext::Roster {
            section: self.section.clone(),
            year: self.semester.clone(),
        }
    }
}

/// A roster session opened on the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub context: SessionContext,
    pub server: ServerSession,
    /// Generation the recurring tick was last armed under
    pub generation: u64,
}

impl ActiveSession {
    pub fn id(&self) -> &str {
        &self.server.id
    }
}
