//! HTTP client for the face-recognition service
//!
//! Stateless request/response wrapper. Every call stands alone; the
//! recurring tick is the only retry mechanism.

use super::types::{
    normalize_roster, normalize_self_check, parse_start_session, RecognitionContext,
    RecognitionError, RecognitionOutcome, RecognitionResult, RosterWireResponse,
    SelfCheckWireResponse, ServerSession,
};
use crate::attendance::state::SessionContext;
use crate::capture::EncodedImage;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

const START_SESSION_PATH: &str = "/attendance/start-session";
const PROBE_PATH: &str = "/debug/students";

/// Operations the session controller needs from the recognition backend
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Liveness probe; any 2xx means reachable
    async fn probe(&self) -> bool;

    /// Ask the server to open a roster session
    async fn start_session(&self, context: &SessionContext) -> RecognitionOutcome<ServerSession>;

    /// Submit one frame and get back a normalized result
    async fn recognize_and_mark(
        &self,
        image: &EncodedImage,
        context: &RecognitionContext,
    ) -> RecognitionOutcome<RecognitionResult>;
}

impl From<reqwest::Error> for RecognitionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RecognitionError::Network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            RecognitionError::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            RecognitionError::Malformed(err.to_string())
        } else {
            RecognitionError::Network(err.to_string())
        }
    }
}

/// reqwest-backed [`RecognitionService`]
#[derive(Debug, Clone)]
pub struct RecognitionClient {
    base_url: String,
    client: reqwest::Client,
}

impl RecognitionClient {
    /// `timeout` of `None` leaves requests unbounded
    pub fn new(base_url: &str, timeout: Option<Duration>) -> RecognitionOutcome<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a multipart form and return the status with the raw body
    async fn post_form(&self, path: &str, form: Form) -> RecognitionOutcome<(u16, String)> {
        let response = self.client.post(self.url(path)).multipart(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl RecognitionService for RecognitionClient {
    async fn probe(&self) -> bool {
        match self.client.get(self.url(PROBE_PATH)).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    tracing::warn!("Recognition service probe returned {}", response.status());
                }
                ok
            }
            Err(e) => {
                tracing::warn!("Recognition service unreachable: {}", e);
                false
            }
        }
    }

    async fn start_session(&self, context: &SessionContext) -> RecognitionOutcome<ServerSession> {
        let form = Form::new()
            .text("teacher_id", context.teacher_id.clone())
            .text("subject_id", context.subject_id.clone())
            .text("section", context.section.clone())
            .text("semester", context.semester.clone())
            .text("class_name", context.class_name())
            .text("duration_minutes", context.duration_minutes.to_string());

        let (status, body) = self.post_form(START_SESSION_PATH, form).await?;
        let session = parse_start_session(status, serde_json::from_str(&body).ok())?;

        tracing::info!(
            "Attendance session {} started for {} ({})",
            session.id,
            context.subject_id,
            context.class_name()
        );
        Ok(session)
    }

    async fn recognize_and_mark(
        &self,
        image: &EncodedImage,
        context: &RecognitionContext,
    ) -> RecognitionOutcome<RecognitionResult> {
        let captured_at = Utc::now();
        let (section, year) = context.form_fields();
        let part = Part::bytes(image.bytes.clone())
            .file_name(context.upload_file_name())
            .mime_str(EncodedImage::MIME_TYPE)?;
        let form = Form::new()
            .part("image", part)
            .text("section", section)
            .text("year", year);

        let (status, body) = self.post_form(context.endpoint(), form).await?;
        if !(200..300).contains(&status) {
            return Err(RecognitionError::Service {
                status,
                message: body,
            });
        }

        match context {
            RecognitionContext::Roster { .. } => {
                let response: RosterWireResponse = serde_json::from_str(&body)
                    .map_err(|e| RecognitionError::Malformed(e.to_string()))?;
                normalize_roster(response, captured_at)
            }
            RecognitionContext::SelfCheck => {
                let response: SelfCheckWireResponse = serde_json::from_str(&body)
                    .map_err(|e| RecognitionError::Malformed(e.to_string()))?;
                normalize_self_check(response, captured_at)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one HTTP/1.1 exchange and hand back the raw request
    async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            let header_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            let chunked = headers.contains("transfer-encoding: chunked");

            loop {
                let done = match content_length {
                    Some(len) => request.len() >= header_end + len,
                    None if chunked => request.ends_with(b"0\r\n\r\n"),
                    None => true,
                };
                if done {
                    break;
                }
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    fn jpeg() -> EncodedImage {
        crate::capture::encode_jpeg(&crate::testing::solid_frame(8, 8), 80).unwrap()
    }

    #[tokio::test]
    async fn test_recognize_and_mark_posts_roster_form() {
        let (url, server) = serve_once(
            200,
            r#"{"success":true,"recognition":{"name":"Asha","id":"S100","confidence":0.92},"status":"present"}"#,
        )
        .await;
        let client = RecognitionClient::new(&url, None).unwrap();
        let context = RecognitionContext::Roster {
            section: "A".to_string(),
            year: "7".to_string(),
        };

        let result = client.recognize_and_mark(&jpeg(), &context).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(result.identity_id.as_deref(), Some("S100"));
        assert!(request.starts_with("POST /attendance/recognize-and-mark "));
        assert!(request.contains("filename=\"test.jpg\""));
        assert!(request.contains("name=\"section\"\r\n\r\nA\r\n"));
        assert!(request.contains("name=\"year\"\r\n\r\n7\r\n"));
    }

    #[tokio::test]
    async fn test_self_check_unknown_is_no_match() {
        let (url, server) = serve_once(200, r#"{"name":"Unknown","confidence":0.1}"#).await;
        let client = RecognitionClient::new(&url, None).unwrap();

        let err = client
            .recognize_and_mark(&jpeg(), &RecognitionContext::SelfCheck)
            .await
            .unwrap_err();
        let request = server.await.unwrap();

        assert!(err.is_no_match());
        assert!(request.starts_with("POST /test "));
        assert!(request.contains("filename=\"teacher.jpg\""));
    }

    #[tokio::test]
    async fn test_non_success_status_is_service_error() {
        let (url, server) = serve_once(502, r#"{"detail":"engine offline"}"#).await;
        let client = RecognitionClient::new(&format!("{url}/"), None).unwrap();

        let err = client
            .recognize_and_mark(&jpeg(), &RecognitionContext::SelfCheck)
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, RecognitionError::Service { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_start_session_sends_class_name() {
        let (url, server) = serve_once(200, r#"{"session":{"id":"sess-1"}}"#).await;
        let client = RecognitionClient::new(&url, None).unwrap();
        let context = SessionContext::new(
            "T42",
            "CS101",
            "a",
            "7",
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        );

        let session = client.start_session(&context).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(session.id, "sess-1");
        assert!(request.contains("name=\"class_name\"\r\n\r\nA-7\r\n"));
        assert!(request.contains("name=\"duration_minutes\"\r\n\r\n60\r\n"));
    }

    #[tokio::test]
    async fn test_probe_reports_reachability() {
        let (url, server) = serve_once(200, "[]").await;
        let client = RecognitionClient::new(&url, None).unwrap();
        assert!(client.probe().await);
        assert!(server.await.unwrap().starts_with("GET /debug/students "));

        let unreachable = RecognitionClient::new("http://127.0.0.1:1", None).unwrap();
        assert!(!unreachable.probe().await);
    }
}
