//! Still-image camera source
//!
//! Replays image files from disk as if they were a live feed. A single file
//! yields the same frame forever; a directory cycles through its images in
//! name order, one per grab.

use super::traits::{CameraSource, CaptureError, CaptureResult, RawFrame, VideoStream};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Camera source backed by image files
pub struct StillImageCamera {
    id: String,
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: format!("still:{}", path.display()),
            path,
        }
    }
}

#[async_trait]
impl CameraSource for StillImageCamera {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open(&self) -> CaptureResult<Box<dyn VideoStream>> {
        let path = self.path.clone();
        let frames = tokio::task::spawn_blocking(move || load_frames(&path))
            .await
            .map_err(|e| CaptureError::Device(format!("image loader join failed: {e}")))??;

        tracing::info!("Still-image camera opened with {} frame(s)", frames.len());
        Ok(Box::new(StillStream {
            frames,
            next: 0,
            stopped: false,
        }))
    }
}

fn image_paths(path: &Path) -> CaptureResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(CaptureError::Device(format!(
            "{} does not exist",
            path.display()
        )));
    }

    let entries = std::fs::read_dir(path)
        .map_err(|e| CaptureError::Device(format!("cannot read {}: {e}", path.display())))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn load_frames(path: &Path) -> CaptureResult<Vec<RawFrame>> {
    let paths = image_paths(path)?;
    if paths.is_empty() {
        return Err(CaptureError::Device(format!(
            "no image files in {}",
            path.display()
        )));
    }

    paths
        .iter()
        .map(|p| {
            let rgb = image::open(p)
                .map_err(|e| CaptureError::Device(format!("cannot decode {}: {e}", p.display())))?
                .to_rgb8();
            Ok(RawFrame {
                width: rgb.width(),
                height: rgb.height(),
                rgb: rgb.into_raw(),
            })
        })
        .collect()
}

struct StillStream {
    frames: Vec<RawFrame>,
    next: usize,
    stopped: bool,
}

impl VideoStream for StillStream {
    fn grab(&mut self) -> CaptureResult<RawFrame> {
        if self.stopped {
            return Err(CaptureError::Released);
        }
        let frame = self.frames[self.next % self.frames.len()].clone();
        self.next = (self.next + 1) % self.frames.len();
        Ok(frame)
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.frames.clear();
    }
}
