//! Capture trait definitions
//!
//! Device-agnostic traits for camera sources and the frames they produce.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera capture errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Permission denied, no device, or the device refused to open
    #[error("Camera unavailable: {0}")]
    Device(String),

    /// The stream has not buffered a frame yet
    #[error("Camera has not buffered a frame yet")]
    NotReady,

    /// The handle was released before the capture
    #[error("Camera stream already released")]
    Released,

    /// JPEG encoding failed
    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// One decoded RGB8 frame at the stream's native resolution
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB8 pixels, `width * height * 3` bytes
    pub rgb: Vec<u8>,
}

impl RawFrame {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}

/// A live video feed opened from a [`CameraSource`].
///
/// Streams are driven from blocking worker threads, so `grab` may block for
/// as long as a device read takes.
pub trait VideoStream: Send {
    /// Latest buffered frame, or [`CaptureError::NotReady`] while the stream
    /// is still warming up.
    fn grab(&mut self) -> CaptureResult<RawFrame>;

    /// Stop every track of the stream. Must be safe to call more than once.
    fn stop(&mut self);
}

/// A device (or stand-in) that can open a live video feed
#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Get the source identifier
    fn id(&self) -> &str;

    /// Open the feed. Fails with [`CaptureError::Device`] when the device is
    /// missing or access is denied.
    async fn open(&self) -> CaptureResult<Box<dyn VideoStream>>;
}
