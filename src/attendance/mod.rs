//! Attendance capture
//!
//! The session controller and everything it owns: the state machine, the
//! deduplicated roster and the recognition overlay.

pub mod controller;
pub mod overlay;
pub mod roster;
pub mod state;

pub use controller::{
    AttendanceEvent, ControllerSettings, SelfCheckOutcome, SessionController, SessionError,
    SessionResult,
};
pub use overlay::{DrawCommand, Overlay, OverlayRenderer, Rect};
pub use roster::{AttendanceStatus, RosterEntry, RosterReconciler, RosterSummary, UpsertOutcome};
pub use state::{ActiveSession, AttendanceMode, BackendStatus, SessionContext, SessionState};
