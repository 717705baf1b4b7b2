//! Native webcam capture using nokhwa
//!
//! The camera is opened on a dedicated thread which keeps decoding frames into
//! a single-slot buffer. Grabs return the most recent frame, or `NotReady`
//! until the first one has arrived.

use super::traits::{
    CameraInfo, CameraSource, CaptureError, CaptureResult, RawFrame, Resolution, VideoStream,
};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Webcam source
pub struct WebcamCamera {
    id: String,

    /// Device ID/index to capture from (None = default camera)
    device_id: Option<String>,

    /// Ideal capture resolution
    resolution: Resolution,

    /// Ideal capture FPS
    fps: u32,
}

impl WebcamCamera {
    pub fn new(device_id: Option<String>, resolution: Resolution, fps: u32) -> Self {
        Self {
            id: format!("webcam:{}", device_id.as_deref().unwrap_or("default")),
            device_id,
            resolution,
            fps,
        }
    }

    /// Get camera index from device_id
    fn camera_index(&self) -> CameraIndex {
        match &self.device_id {
            Some(id) => {
                if let Ok(idx) = id.parse::<u32>() {
                    CameraIndex::Index(idx)
                } else {
                    CameraIndex::String(id.clone())
                }
            }
            None => CameraIndex::Index(0),
        }
    }
}

#[async_trait]
impl CameraSource for WebcamCamera {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open(&self) -> CaptureResult<Box<dyn VideoStream>> {
        let latest: Arc<Mutex<Option<RawFrame>>> = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (opened_tx, opened_rx) = mpsc::channel::<CaptureResult<()>>();

        let camera_index = self.camera_index();
        let requested = CameraFormat::new_from(
            self.resolution.width,
            self.resolution.height,
            FrameFormat::MJPEG,
            self.fps,
        );
        let thread_latest = latest.clone();
        let thread_running = running.clone();

        let handle = std::thread::spawn(move || {
            let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(requested));

            let mut camera = match Camera::new(camera_index.clone(), format) {
                Ok(c) => c,
                Err(e) => {
                    let _ = opened_tx.send(Err(CaptureError::Device(format!(
                        "failed to open camera {camera_index:?}: {e}"
                    ))));
                    return;
                }
            };

            if let Err(e) = camera.open_stream() {
                let _ = opened_tx.send(Err(CaptureError::Device(format!(
                    "failed to open camera stream: {e}"
                ))));
                return;
            }

            let camera_format = camera.camera_format();
            tracing::info!(
                "Webcam opened: {}x{} @ {}fps, format={:?}",
                camera_format.resolution().width(),
                camera_format.resolution().height(),
                camera_format.frame_rate(),
                camera_format.format()
            );
            let _ = opened_tx.send(Ok(()));

            while thread_running.load(Ordering::SeqCst) {
                // Blocks until the camera delivers the next frame
                match camera.frame() {
                    Ok(buffer) => match buffer.decode_image::<RgbFormat>() {
                        Ok(decoded) => {
                            let frame = RawFrame {
                                width: decoded.width(),
                                height: decoded.height(),
                                rgb: decoded.into_raw(),
                            };
                            *thread_latest.lock() = Some(frame);
                        }
                        Err(e) => tracing::debug!("Failed to decode webcam frame: {:?}", e),
                    },
                    Err(e) => tracing::debug!("Failed to capture frame: {:?}", e),
                }
            }

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {:?}", e);
            }
            tracing::info!("Webcam capture thread stopped");
        });

        let opened = tokio::task::spawn_blocking(move || {
            opened_rx.recv().unwrap_or_else(|_| {
                Err(CaptureError::Device(
                    "camera thread exited before opening".to_string(),
                ))
            })
        })
        .await
        .map_err(|e| CaptureError::Device(format!("camera open join failed: {e}")))?;

        if let Err(e) = opened {
            let _ = handle.join();
            return Err(e);
        }

        Ok(Box::new(WebcamStream {
            latest,
            running,
            capture_thread: Some(handle),
        }))
    }
}

struct WebcamStream {
    latest: Arc<Mutex<Option<RawFrame>>>,
    running: Arc<AtomicBool>,
    capture_thread: Option<std::thread::JoinHandle<()>>,
}

impl VideoStream for WebcamStream {
    fn grab(&mut self) -> CaptureResult<RawFrame> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::Released);
        }
        self.latest.lock().clone().ok_or(CaptureError::NotReady)
    }

    /// Signals the capture thread without waiting for it; a detached reaper
    /// thread does the join.
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.latest.lock().take();
        if let Some(handle) = self.capture_thread.take() {
            let reaper = std::thread::Builder::new()
                .name("webcam-reaper".to_string())
                .spawn(move || {
                    if handle.join().is_err() {
                        tracing::warn!("Webcam capture thread panicked");
                    }
                });
            if let Err(e) = reaper {
                tracing::warn!("Failed to spawn webcam reaper thread: {}", e);
            }
        }
    }
}

impl Drop for WebcamStream {
    fn drop(&mut self) {
        self.stop();
    }
}
