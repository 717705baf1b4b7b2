//! Application configuration
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration pointing at a local recognition service.

use crate::attendance::{ControllerSettings, SessionContext};
use crate::capture::{Resolution, DEFAULT_JPEG_QUALITY};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub roster: RosterConfig,
    pub session: SessionDefaults,
}

/// Recognition service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Per-request timeout; unset means wait indefinitely
    pub timeout_ms: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: None,
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Camera and tick settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub tick_interval_ms: u64,
    /// How long to let the camera settle before a self-mode capture
    pub warmup_ms: u64,
    pub jpeg_quality: u8,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3000,
            warmup_ms: 1500,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

impl CaptureConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub contact_domain: String,
    pub recent_capacity: usize,
}

impl Default for RosterConfig {
    fn default() -> Self {
        let settings = ControllerSettings::default();
        Self {
            contact_domain: settings.contact_domain,
            recent_capacity: settings.recent_capacity,
        }
    }
}

/// Class details used when the command line leaves them out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub teacher_id: String,
    pub subject: String,
    pub section: String,
    pub semester: String,
    pub duration_minutes: u32,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            teacher_id: String::new(),
            subject: "CS101".to_string(),
            section: "A".to_string(),
            semester: "7".to_string(),
            duration_minutes: SessionContext::DEFAULT_DURATION_MINUTES,
        }
    }
}

impl SessionDefaults {
    pub fn context(&self, date: NaiveDate) -> SessionContext {
        SessionContext::new(
            self.teacher_id.clone(),
            self.subject.clone(),
            &self.section,
            self.semester.clone(),
            date,
        )
        .with_duration(self.duration_minutes)
    }
}

impl AttendanceConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            tick_interval: self.capture.tick_interval(),
            contact_domain: self.roster.contact_domain.clone(),
            recent_capacity: self.roster.recent_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AttendanceConfig::default();
        assert_eq!(config.service.base_url, "http://localhost:8000");
        assert_eq!(config.service.timeout(), None);
        assert_eq!(config.capture.tick_interval(), Duration::from_millis(3000));
        assert_eq!(config.capture.warmup(), Duration::from_millis(1500));
        assert_eq!(config.capture.resolution(), Resolution::default());
        assert_eq!(config.roster.contact_domain, "university.edu");
        assert_eq!(config.session.duration_minutes, 60);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("attendance.toml");
        std::fs::write(
            &path,
            r#"
[service]
base_url = "http://10.0.0.5:8000"
timeout_ms = 5000

[session]
section = "b"
"#,
        )
        .unwrap();

        let config = AttendanceConfig::load(&path).unwrap();
        assert_eq!(config.service.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.service.timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(config.capture.jpeg_quality, 80);

        let context = config
            .session
            .context(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(context.section, "B");
        assert_eq!(context.subject_id, "CS101");
    }

    #[test]
    fn test_bad_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[capture]\ntick_interval_ms = \"soon\"\n").unwrap();

        let err = AttendanceConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));

        assert!(matches!(
            AttendanceConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
