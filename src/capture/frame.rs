//! Frame capture
//!
//! Acquires a live stream from a [`CameraSource`], grabs single stills from it
//! and encodes them as JPEG for upload.

use super::traits::{CameraSource, CaptureError, CaptureResult, RawFrame, Resolution, VideoStream};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use parking_lot::Mutex;
use std::sync::Arc;

/// Default JPEG quality used for uploads
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// A JPEG-encoded still ready to be posted to the recognition service
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub const MIME_TYPE: &'static str = "image/jpeg";

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}

/// Shared ownership of an open video stream.
///
/// Clones point at the same stream; once any clone calls [`release`](Self::release)
/// the device is stopped for all of them and further grabs fail with
/// [`CaptureError::Released`].
#[derive(Clone)]
pub struct CameraHandle {
    source_id: String,
    stream: Arc<Mutex<Option<Box<dyn VideoStream>>>>,
}

impl CameraHandle {
    fn new(source_id: String, stream: Box<dyn VideoStream>) -> Self {
        Self {
            source_id,
            stream: Arc::new(Mutex::new(Some(stream))),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Whether the underlying stream is still open
    pub fn is_live(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Stop all tracks and drop the stream. Idempotent.
    pub fn release(&self) {
        let stream = self.stream.lock().take();
        if let Some(mut stream) = stream {
            stream.stop();
            tracing::info!("Camera stream released ({})", self.source_id);
        }
    }

    fn grab(&self) -> CaptureResult<RawFrame> {
        match self.stream.lock().as_mut() {
            Some(stream) => stream.grab(),
            None => Err(CaptureError::Released),
        }
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("source_id", &self.source_id)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Grabs stills from a camera source
pub struct FrameCapture {
    source: Arc<dyn CameraSource>,
    jpeg_quality: u8,
}

impl FrameCapture {
    pub fn new(source: Arc<dyn CameraSource>, jpeg_quality: u8) -> Self {
        Self {
            source,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn source_id(&self) -> &str {
        self.source.id()
    }

    /// Open the camera. The returned handle owns the stream until released.
    pub async fn acquire(&self) -> CaptureResult<CameraHandle> {
        let stream = self.source.open().await?;
        tracing::info!("Camera stream acquired ({})", self.source.id());
        Ok(CameraHandle::new(self.source.id().to_string(), stream))
    }

    /// Stop the stream behind `handle`. Safe to call on an already released handle.
    pub fn release(&self, handle: &CameraHandle) {
        handle.release();
    }

    /// Grab the current frame and encode it as JPEG.
    ///
    /// Fails with [`CaptureError::NotReady`] while the stream is warming up;
    /// the caller decides whether to skip.
    pub async fn capture_frame(&self, handle: &CameraHandle) -> CaptureResult<EncodedImage> {
        let handle = handle.clone();
        let quality = self.jpeg_quality;

        tokio::task::spawn_blocking(move || {
            let frame = handle.grab()?;
            encode_jpeg(&frame, quality)
        })
        .await
        .map_err(|e| CaptureError::Encode(format!("capture worker join failed: {e}")))?
    }
}

/// Encode a raw RGB8 frame as a baseline JPEG
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> CaptureResult<EncodedImage> {
    let expected_len = frame.width as usize * frame.height as usize * 3;
    if frame.width == 0 || frame.height == 0 || frame.rgb.len() != expected_len {
        return Err(CaptureError::Encode(format!(
            "frame buffer is {} bytes, expected {} for {}x{}",
            frame.rgb.len(),
            expected_len,
            frame.width,
            frame.height
        )));
    }

    let mut bytes = Vec::with_capacity(expected_len / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder
        .encode(&frame.rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    Ok(EncodedImage {
        bytes,
        width: frame.width,
        height: frame.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{solid_frame, FakeCamera};

    #[test]
    fn test_encode_jpeg_keeps_native_resolution() {
        let frame = solid_frame(32, 24);
        let encoded = encode_jpeg(&frame, DEFAULT_JPEG_QUALITY).unwrap();

        assert_eq!(&encoded.bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&encoded.bytes).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
    }

    #[test]
    fn test_encode_jpeg_rejects_short_buffer() {
        let mut frame = solid_frame(8, 8);
        frame.rgb.truncate(10);
        assert!(matches!(
            encode_jpeg(&frame, DEFAULT_JPEG_QUALITY),
            Err(CaptureError::Encode(_))
        ));
    }

    #[tokio::test]
    async fn test_not_ready_is_passed_through() {
        let camera = FakeCamera::new().warmup_grabs(1);
        let capture = FrameCapture::new(Arc::new(camera), DEFAULT_JPEG_QUALITY);
        let handle = capture.acquire().await.unwrap();

        assert_eq!(
            capture.capture_frame(&handle).await.unwrap_err(),
            CaptureError::NotReady
        );
        assert!(capture.capture_frame(&handle).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let camera = FakeCamera::new();
        let stops = camera.stop_counter();
        let capture = FrameCapture::new(Arc::new(camera), DEFAULT_JPEG_QUALITY);
        let handle = capture.acquire().await.unwrap();
        let clone = handle.clone();

        capture.release(&handle);
        capture.release(&clone);
        handle.release();

        assert!(!clone.is_live());
        assert_eq!(stops.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(
            capture.capture_frame(&clone).await.unwrap_err(),
            CaptureError::Released
        );
    }

    #[tokio::test]
    async fn test_acquire_reports_device_error() {
        let camera = FakeCamera::new().deny_access();
        let capture = FrameCapture::new(Arc::new(camera), DEFAULT_JPEG_QUALITY);

        assert!(matches!(
            capture.acquire().await,
            Err(CaptureError::Device(_))
        ));
    }
}
