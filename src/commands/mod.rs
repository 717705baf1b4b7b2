//! Command handlers
//!
//! Async entry points an outer surface (CLI, IPC bridge) calls into.

pub mod attendance;

pub use attendance::{AttendanceSnapshot, AttendanceState, SessionRequest};
