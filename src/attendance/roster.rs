//! Attendance roster
//!
//! Identity-keyed list of recognized students. Display order is the order in
//! which identities were first seen; later recognitions of the same identity
//! update the entry where it stands.

use crate::recognition::{format_confidence, RecognitionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default mail domain for derived contact handles
pub const DEFAULT_CONTACT_DOMAIN: &str = "university.edu";

/// Attendance status of a roster row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Pending,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Pending => "pending",
        }
    }
}

/// One row of the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub contact: String,
    pub status: AttendanceStatus,
    pub confidence: f64,
    pub last_seen: DateTime<Utc>,
}

impl RosterEntry {
    pub fn confidence_percent(&self) -> String {
        format_confidence(self.confidence)
    }
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New identity appended at `position`
    Inserted { position: usize },
    /// Existing identity refreshed in place
    Updated { position: usize },
    /// Result carried no usable identity
    Ignored,
}

/// Headline numbers for the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub pending: usize,
    /// Present share of all rows, one decimal
    pub attendance_percentage: f64,
}

/// Merges recognition results into a deduplicated roster
#[derive(Debug, Clone)]
pub struct RosterReconciler {
    entries: Vec<RosterEntry>,
    index: HashMap<String, usize>,
    contact_domain: String,
}

impl Default for RosterReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_CONTACT_DOMAIN)
    }
}

impl RosterReconciler {
    pub fn new(contact_domain: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            contact_domain: contact_domain.into(),
        }
    }

    /// Merge one result. Unknown or empty identities are ignored.
    pub fn upsert(&mut self, result: &RecognitionResult) -> UpsertOutcome {
        let Some(id) = usable_identity(result) else {
            return UpsertOutcome::Ignored;
        };

        if let Some(&position) = self.index.get(id) {
            let entry = &mut self.entries[position];
            entry.confidence = result.confidence;
            entry.last_seen = result.timestamp;
            entry.status = AttendanceStatus::Present;
            return UpsertOutcome::Updated { position };
        }

        let position = self.entries.len();
        self.entries.push(RosterEntry {
            id: id.to_string(),
            name: result.display_name.clone(),
            contact: contact_handle(&result.display_name, &self.contact_domain),
            status: AttendanceStatus::Present,
            confidence: result.confidence,
            last_seen: result.timestamp,
        });
        self.index.insert(id.to_string(), position);
        UpsertOutcome::Inserted { position }
    }

    /// Drop every entry
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&RosterEntry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> RosterSummary {
        let count = |status| self.entries.iter().filter(|e| e.status == status).count();
        let present = count(AttendanceStatus::Present);
        let total = self.entries.len();
        let attendance_percentage = if total == 0 {
            0.0
        } else {
            (present as f64 / total as f64 * 1000.0).round() / 10.0
        };

        RosterSummary {
            total,
            present,
            absent: count(AttendanceStatus::Absent),
            pending: count(AttendanceStatus::Pending),
            attendance_percentage,
        }
    }
}

fn usable_identity(result: &RecognitionResult) -> Option<&str> {
    let id = result.identity_id.as_deref()?.trim();
    if id.is_empty() || id.eq_ignore_ascii_case("unknown") {
        None
    } else {
        Some(id)
    }
}

/// `Asha  Verma` -> `asha.verma@university.edu`
pub fn contact_handle(name: &str, domain: &str) -> String {
    let local = name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(".");
    format!("{local}@{domain}")
}
