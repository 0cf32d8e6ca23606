//! OCR for image uploads: submit, poll, collect lines.
//!
//! Read-style OCR services are asynchronous. A submit call returns an
//! operation handle; the result has to be polled until the operation leaves
//! the `notStarted`/`running` states. [`read_image_text`] owns that loop:
//! it sleeps between polls (never busy-spins) and bounds the whole wait with
//! `ocr_timeout_secs`, so a stuck operation cannot hang the session.
//!
//! A `failed` operation is not an error here. It yields empty text, which the
//! rest of the pipeline treats as "nothing extracted".

use crate::config::{AzureSettings, MenuConfig};
use crate::error::{BackendError, MenuError, StageError};
use crate::progress::PipelineProgress;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Status of an OCR read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    /// Any status string the service adds later; treated as terminal.
    #[serde(other)]
    Unknown,
}

impl ReadStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReadStatus::NotStarted | ReadStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::NotStarted => "notStarted",
            ReadStatus::Running => "running",
            ReadStatus::Succeeded => "succeeded",
            ReadStatus::Failed => "failed",
            ReadStatus::Unknown => "unknown",
        }
    }
}

/// Handle of a submitted read operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOperation {
    /// Operation id (last segment of the operation URL).
    pub id: String,
    /// Full URL to poll.
    pub location: String,
}

impl OcrOperation {
    pub fn from_location(location: impl Into<String>) -> Self {
        let location = location.into();
        let id = location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self { id, location }
    }
}

/// One poll result. `pages` is only populated once the status is
/// `Succeeded`: one entry per analysed page, each an ordered list of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub status: ReadStatus,
    pub pages: Vec<Vec<String>>,
}

/// Capability interface for an asynchronous OCR service.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Short provider label for logs.
    fn name(&self) -> &str;

    /// Start reading `image`.
    async fn submit(&self, image: &[u8]) -> Result<OcrOperation, BackendError>;

    /// Fetch the current state of `operation`.
    async fn poll(&self, operation: &OcrOperation) -> Result<ReadResult, BackendError>;
}

/// Text read from one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrText {
    /// Every recognised line, newline-joined, in backend order.
    pub text: String,
    pub pages: usize,
    pub polls: u32,
}

/// Run one OCR operation to completion.
pub async fn read_image_text(
    backend: &dyn OcrBackend,
    image: &[u8],
    config: &MenuConfig,
    progress: &dyn PipelineProgress,
) -> Result<OcrText, StageError> {
    info!("Submitting {} bytes to OCR ({})", image.len(), backend.name());
    let operation = backend
        .submit(image)
        .await
        .map_err(|e| StageError::Extraction {
            detail: format!("OCR submit failed: {e}"),
        })?;
    debug!("OCR operation {}", operation.id);

    let interval = Duration::from_millis(config.ocr_poll_interval_ms);
    let limit = Duration::from_secs(config.ocr_timeout_secs);

    let poll_loop = async {
        let mut polls: u32 = 0;
        loop {
            let result = backend
                .poll(&operation)
                .await
                .map_err(|e| StageError::Extraction {
                    detail: format!("OCR poll failed: {e}"),
                })?;
            polls += 1;
            progress.on_ocr_poll(polls, result.status.as_str());
            if !result.status.is_pending() {
                return Ok::<_, StageError>((result, polls));
            }
            sleep(interval).await;
        }
    };

    let (result, polls) = timeout(limit, poll_loop)
        .await
        .map_err(|_| StageError::OcrTimeout {
            secs: config.ocr_timeout_secs,
        })??;

    if result.status != ReadStatus::Succeeded {
        warn!(
            "OCR operation {} ended as '{}'; no text extracted",
            operation.id,
            result.status.as_str()
        );
        return Ok(OcrText {
            text: String::new(),
            pages: 0,
            polls,
        });
    }

    let text = join_lines(&result.pages);
    info!(
        "OCR read {} pages, {} chars after {} polls",
        result.pages.len(),
        text.len(),
        polls
    );
    Ok(OcrText {
        text,
        pages: result.pages.len(),
        polls,
    })
}

/// Flatten pages of lines into one newline-joined string.
pub fn join_lines(pages: &[Vec<String>]) -> String {
    pages
        .iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Azure Computer Vision Read ───────────────────────────────────────────

/// Azure Computer Vision Read (v3.2) client.
pub struct AzureReadClient {
    http: reqwest::Client,
    analyze_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct AzureReadResponse {
    status: ReadStatus,
    #[serde(rename = "analyzeResult", default)]
    analyze_result: Option<AzureAnalyzeResult>,
}

#[derive(Deserialize)]
struct AzureAnalyzeResult {
    #[serde(rename = "readResults", default)]
    read_results: Vec<AzurePage>,
}

#[derive(Deserialize)]
struct AzurePage {
    #[serde(default)]
    lines: Vec<AzureLine>,
}

#[derive(Deserialize)]
struct AzureLine {
    text: String,
}

impl AzureReadClient {
    /// Build a client from config-file settings.
    pub fn new(settings: &AzureSettings) -> Result<Self, MenuError> {
        let endpoint = settings
            .cv_endpoint
            .as_deref()
            .ok_or(MenuError::OcrNotConfigured)?;
        let api_key = settings.cv_api_key.clone().ok_or(MenuError::OcrNotConfigured)?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| MenuError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            analyze_url: format!("{}/vision/v3.2/read/analyze", endpoint.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl OcrBackend for AzureReadClient {
    fn name(&self) -> &str {
        "azure-read"
    }

    async fn submit(&self, image: &[u8]) -> Result<OcrOperation, BackendError> {
        let response = self
            .http
            .post(&self.analyze_url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| BackendError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::new(format!("HTTP {status}: {detail}")));
        }

        let location = response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| BackendError::new("response has no Operation-Location header"))?;
        Ok(OcrOperation::from_location(location))
    }

    async fn poll(&self, operation: &OcrOperation) -> Result<ReadResult, BackendError> {
        let response = self
            .http
            .get(&operation.location)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| BackendError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::new(format!("HTTP {status}: {detail}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::new(e.to_string()))?;
        parse_read_response(&body)
    }
}

/// Decode a Read API result document.
pub fn parse_read_response(body: &str) -> Result<ReadResult, BackendError> {
    let parsed: AzureReadResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::new(format!("Invalid read result: {e}")))?;
    let pages = parsed
        .analyze_result
        .map(|r| {
            r.read_results
                .into_iter()
                .map(|p| p.lines.into_iter().map(|l| l.text).collect())
                .collect()
        })
        .unwrap_or_default();
    Ok(ReadResult {
        status: parsed.status,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountdownOcr {
        pending_polls: u32,
        final_status: ReadStatus,
        polls: AtomicU32,
    }

    #[async_trait]
    impl OcrBackend for CountdownOcr {
        fn name(&self) -> &str {
            "countdown"
        }

        async fn submit(&self, _image: &[u8]) -> Result<OcrOperation, BackendError> {
            Ok(OcrOperation::from_location("https://ocr/operations/op-1"))
        }

        async fn poll(&self, _operation: &OcrOperation) -> Result<ReadResult, BackendError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n < self.pending_polls {
                let status = if n == 0 {
                    ReadStatus::NotStarted
                } else {
                    ReadStatus::Running
                };
                return Ok(ReadResult {
                    status,
                    pages: vec![],
                });
            }
            Ok(ReadResult {
                status: self.final_status,
                pages: vec![
                    vec!["FOOD MENU".into(), "Burger".into()],
                    vec!["$5".into()],
                ],
            })
        }
    }

    /// Accepts the image, then loses the connection on the first poll.
    struct DroppedOcr;

    #[async_trait]
    impl OcrBackend for DroppedOcr {
        fn name(&self) -> &str {
            "dropped"
        }

        async fn submit(&self, _image: &[u8]) -> Result<OcrOperation, BackendError> {
            Ok(OcrOperation::from_location("https://ocr/operations/op-2"))
        }

        async fn poll(&self, _operation: &OcrOperation) -> Result<ReadResult, BackendError> {
            Err(BackendError::new("connection reset by peer"))
        }
    }

    fn fast_config() -> MenuConfig {
        MenuConfig::builder()
            .ocr_poll_interval_ms(1)
            .ocr_timeout_secs(5)
            .build()
            .unwrap()
    }

    #[test]
    fn operation_id_is_last_segment() {
        let op = OcrOperation::from_location(
            "https://cv.example.com/vision/v3.2/read/analyzeResults/abc-123",
        );
        assert_eq!(op.id, "abc-123");
    }

    #[tokio::test]
    async fn polls_until_succeeded_and_joins_lines() {
        let ocr = CountdownOcr {
            pending_polls: 3,
            final_status: ReadStatus::Succeeded,
            polls: AtomicU32::new(0),
        };
        let out = read_image_text(&ocr, b"img", &fast_config(), &NoopProgress)
            .await
            .unwrap();
        assert_eq!(out.text, "FOOD MENU\nBurger\n$5");
        assert_eq!(out.polls, 4);
        assert_eq!(out.pages, 2);
    }

    #[tokio::test]
    async fn failed_operation_is_empty_text() {
        let ocr = CountdownOcr {
            pending_polls: 1,
            final_status: ReadStatus::Failed,
            polls: AtomicU32::new(0),
        };
        let out = read_image_text(&ocr, b"img", &fast_config(), &NoopProgress)
            .await
            .unwrap();
        assert!(out.text.is_empty());
    }

    #[tokio::test]
    async fn poll_transport_fault_is_extraction_error() {
        let err = read_image_text(&DroppedOcr, b"img", &fast_config(), &NoopProgress)
            .await
            .unwrap_err();
        match err {
            StageError::Extraction { detail } => {
                assert!(detail.contains("OCR poll failed"), "{detail}");
                assert!(detail.contains("connection reset"), "{detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stuck_operation_times_out() {
        let ocr = CountdownOcr {
            pending_polls: u32::MAX,
            final_status: ReadStatus::Succeeded,
            polls: AtomicU32::new(0),
        };
        let config = MenuConfig::builder()
            .ocr_poll_interval_ms(200)
            .ocr_timeout_secs(1)
            .build()
            .unwrap();
        let err = read_image_text(&ocr, b"img", &config, &NoopProgress)
            .await
            .unwrap_err();
        assert_eq!(err, StageError::OcrTimeout { secs: 1 });
    }

    #[test]
    fn parse_azure_read_result() {
        let body = r#"{
            "status": "succeeded",
            "analyzeResult": {
                "readResults": [
                    {"page": 1, "lines": [{"text": "MAIN COURSE", "boundingBox": []}, {"text": "Hot dog"}]},
                    {"page": 2, "lines": [{"text": "$24"}]}
                ]
            }
        }"#;
        let r = parse_read_response(body).unwrap();
        assert_eq!(r.status, ReadStatus::Succeeded);
        assert_eq!(join_lines(&r.pages), "MAIN COURSE\nHot dog\n$24");
    }

    #[test]
    fn parse_running_and_unknown_status() {
        let r = parse_read_response(r#"{"status": "running"}"#).unwrap();
        assert!(r.status.is_pending());
        assert!(r.pages.is_empty());
        let r = parse_read_response(r#"{"status": "paused"}"#).unwrap();
        assert_eq!(r.status, ReadStatus::Unknown);
        assert!(!r.status.is_pending());
    }

    #[test]
    fn client_requires_cv_settings() {
        assert!(matches!(
            AzureReadClient::new(&AzureSettings::default()),
            Err(MenuError::OcrNotConfigured)
        ));
    }
}
