//! Camera capture
//!
//! Camera sources, the live-stream handle and single-frame JPEG capture.

pub mod frame;
pub mod still;
pub mod traits;

#[cfg(feature = "webcam")]
pub mod webcam;

pub use frame::{encode_jpeg, CameraHandle, EncodedImage, FrameCapture, DEFAULT_JPEG_QUALITY};
pub use still::StillImageCamera;
pub use traits::{
    CameraInfo, CameraSource, CaptureError, CaptureResult, RawFrame, Resolution, VideoStream,
};
