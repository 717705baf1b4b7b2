//! Attendance export
//!
//! Renders the roster or the teacher's own record as CSV and writes it under
//! the conventional file name.

pub mod report;

pub use report::{roster_csv, self_csv, ExportMeta};

use crate::attendance::RosterEntry;
use crate::recognition::RecognitionResult;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No attendance data to export")]
    NoData,

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ExportResult<T> = Result<T, ExportError>;

/// `student_attendance_CS101_A_2026-10-19.csv`
pub fn roster_file_name(meta: &ExportMeta) -> String {
    format!(
        "student_attendance_{}_{}_{}.csv",
        meta.subject, meta.section, meta.date
    )
}

/// `teacher_attendance_2026-10-19.csv`
pub fn self_file_name(date: NaiveDate) -> String {
    format!("teacher_attendance_{date}.csv")
}

/// Write the roster CSV into `dir`, returning the file path
pub fn export_roster(dir: &Path, meta: &ExportMeta, entries: &[RosterEntry]) -> ExportResult<PathBuf> {
    if entries.is_empty() {
        return Err(ExportError::NoData);
    }
    write(dir.join(roster_file_name(meta)), roster_csv(meta, entries)?)
}

/// Write the self-attendance CSV into `dir`, returning the file path
pub fn export_self(
    dir: &Path,
    date: NaiveDate,
    result: Option<&RecognitionResult>,
) -> ExportResult<PathBuf> {
    let result = result.ok_or(ExportError::NoData)?;
    write(dir.join(self_file_name(date)), self_csv(date, result)?)
}

fn write(path: PathBuf, content: String) -> ExportResult<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(&path, content).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!("Attendance exported to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::RosterReconciler;
    use crate::testing::{roster_result, self_result};
    use tempfile::tempdir;

    fn meta() -> ExportMeta {
        ExportMeta {
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            subject: "CS101".to_string(),
            section: "A".to_string(),
            semester: "7".to_string(),
        }
    }

    #[test]
    fn test_export_roster_writes_named_file() {
        let dir = tempdir().unwrap();
        let mut roster = RosterReconciler::default();
        roster.upsert(&roster_result("S100", "Asha", 0.92));

        let path = export_roster(dir.path(), &meta(), roster.entries()).unwrap();

        assert_eq!(
            path.file_name().unwrap(),
            "student_attendance_CS101_A_2026-10-19.csv"
        );
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"Asha\""));
    }

    #[test]
    fn test_export_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("reports").join("october");
        let result = self_result("T42", "Dr. Rao", None, 0.9);

        let path = export_self(&nested, meta().date, Some(&result)).unwrap();

        assert_eq!(path.file_name().unwrap(), "teacher_attendance_2026-10-19.csv");
        assert!(path.exists());
    }

    #[test]
    fn test_export_without_data_fails() {
        let dir = tempdir().unwrap();

        assert!(matches!(
            export_roster(dir.path(), &meta(), &[]),
            Err(ExportError::NoData)
        ));
        assert!(matches!(
            export_self(dir.path(), meta().date, None),
            Err(ExportError::NoData)
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
