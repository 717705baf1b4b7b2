//! Recognition types
//!
//! The recognition service answers with differently shaped bodies per
//! endpoint. Everything is normalized here into a single [`RecognitionResult`]
//! so consumers never look at wire fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Sentinel name the self-check endpoint returns for an unmatched face
pub const UNKNOWN_NAME: &str = "Unknown";

/// Identity placeholder used when the self-check endpoint omits an id
pub const MISSING_ID: &str = "N/A";

/// Recognition request errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Connection failed or timed out
    #[error("Network error: {0}")]
    Network(String),

    /// Server returned a non-2xx status
    #[error("Server error (status {status}): {message}")]
    Service { status: u16, message: String },

    /// 2xx with a body we could not interpret
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The service explicitly reported an unknown identity
    #[error("Face not recognized")]
    NoMatch,
}

impl RecognitionError {
    /// A no-match is a normal outcome, not a failure of the tick
    pub fn is_no_match(&self) -> bool {
        matches!(self, RecognitionError::NoMatch)
    }
}

pub type RecognitionOutcome<T> = Result<T, RecognitionError>;

/// Mode-specific form fields sent with each image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionContext {
    /// Multi-student roster capture
    Roster { section: String, year: String },
    /// Single teacher self check, sent with empty section/year
    SelfCheck,
}

impl RecognitionContext {
    pub fn endpoint(&self) -> &'static str {
        match self {
            RecognitionContext::Roster { .. } => "/attendance/recognize-and-mark",
            RecognitionContext::SelfCheck => "/test",
        }
    }

    pub fn upload_file_name(&self) -> &'static str {
        match self {
            RecognitionContext::Roster { .. } => "test.jpg",
            RecognitionContext::SelfCheck => "teacher.jpg",
        }
    }

    /// `(section, year)` form values
    pub fn form_fields(&self) -> (String, String) {
        match self {
            RecognitionContext::Roster { section, year } => (section.clone(), year.clone()),
            RecognitionContext::SelfCheck => (String::new(), String::new()),
        }
    }
}

/// Mode discriminant carried by every result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RecognitionKind {
    Roster {
        status: String,
    },
    SelfCheck {
        role: Option<String>,
        status: String,
    },
}

/// One recognition outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    /// `None` when the service matched a face but sent no id
    pub identity_id: Option<String>,
    pub display_name: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// When the frame was captured
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RecognitionKind,
}

impl RecognitionResult {
    pub fn status(&self) -> &str {
        match &self.kind {
            RecognitionKind::Roster { status } | RecognitionKind::SelfCheck { status, .. } => {
                status
            }
        }
    }

    pub fn role(&self) -> Option<&str> {
        match &self.kind {
            RecognitionKind::SelfCheck { role, .. } => role.as_deref(),
            RecognitionKind::Roster { .. } => None,
        }
    }

    pub fn confidence_percent(&self) -> String {
        format_confidence(self.confidence)
    }
}

/// `0.923` -> `"92.3%"`
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}

/// Session record returned by `start-session`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSession {
    pub id: String,
    /// The server's `session` object as received
    pub payload: Value,
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct RosterWireResponse {
    #[serde(default)]
    pub success: bool,
    pub recognition: Option<RosterWireMatch>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RosterWireMatch {
    pub name: Option<String>,
    pub id: Option<Value>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelfCheckWireResponse {
    pub name: Option<String>,
    pub id: Option<Value>,
    pub role: Option<String>,
    pub confidence: Option<f64>,
}

/// Ids arrive as strings or numbers depending on the table they come from
fn id_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn normalize_roster(
    response: RosterWireResponse,
    captured_at: DateTime<Utc>,
) -> RecognitionOutcome<RecognitionResult> {
    if !response.success {
        return Err(RecognitionError::NoMatch);
    }

    let recognition = response
        .recognition
        .ok_or_else(|| RecognitionError::Malformed("missing `recognition` object".to_string()))?;
    let display_name = recognition
        .name
        .ok_or_else(|| RecognitionError::Malformed("missing `recognition.name`".to_string()))?;

    Ok(RecognitionResult {
        identity_id: id_to_string(recognition.id.as_ref()),
        display_name,
        confidence: recognition.confidence.unwrap_or(0.0),
        timestamp: captured_at,
        kind: RecognitionKind::Roster {
            status: response.status.unwrap_or_else(|| "present".to_string()),
        },
    })
}

pub(crate) fn normalize_self_check(
    response: SelfCheckWireResponse,
    captured_at: DateTime<Utc>,
) -> RecognitionOutcome<RecognitionResult> {
    let display_name = response
        .name
        .ok_or_else(|| RecognitionError::Malformed("missing `name`".to_string()))?;
    if display_name == UNKNOWN_NAME {
        return Err(RecognitionError::NoMatch);
    }

    Ok(RecognitionResult {
        identity_id: Some(
            id_to_string(response.id.as_ref()).unwrap_or_else(|| MISSING_ID.to_string()),
        ),
        display_name,
        confidence: response.confidence.unwrap_or(0.0),
        timestamp: captured_at,
        kind: RecognitionKind::SelfCheck {
            role: response.role,
            status: "present".to_string(),
        },
    })
}

/// Interpret a `start-session` reply. `body` is `None` when it was not JSON.
pub(crate) fn parse_start_session(
    status: u16,
    body: Option<Value>,
) -> RecognitionOutcome<ServerSession> {
    let success = (200..300).contains(&status);

    let Some(body) = body else {
        return Err(if success {
            RecognitionError::Malformed("start-session reply is not JSON".to_string())
        } else {
            RecognitionError::Service {
                status,
                message: "Failed to start session".to_string(),
            }
        });
    };

    if !success {
        let message = match body.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(Value::Null) | None => "Failed to start session".to_string(),
            Some(other) => other.to_string(),
        };
        return Err(RecognitionError::Service { status, message });
    }

    let payload = body
        .get("session")
        .cloned()
        .ok_or_else(|| RecognitionError::Malformed("missing `session` object".to_string()))?;
    let id = id_to_string(payload.get("id"))
        .or_else(|| id_to_string(payload.get("session_id")))
        .unwrap_or_else(|| {
            let local = uuid::Uuid::new_v4().to_string();
            tracing::debug!("Server session carries no id, using local id {}", local);
            local
        });

    Ok(ServerSession { id, payload })
}
