//! Document loading: turn a path, URL or upload into a [`RawDocument`].
//!
//! The kind of document is decided from its magic bytes, not from its name:
//! phones happily save PNG screenshots as `menu.jpg`. A declared MIME type
//! (from an upload form or an HTTP `Content-Type`) only gates which uploads
//! are accepted at all.

use crate::error::MenuError;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Raster formats the OCR backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Jpeg,
    Png,
}

/// What an uploaded document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Image(ImageKind),
    Pdf,
}

impl DocumentKind {
    /// Map an upload MIME type to a kind. Parameters (`; charset=…`) are
    /// ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(DocumentKind::Image(ImageKind::Jpeg)),
            "image/png" => Some(DocumentKind::Image(ImageKind::Png)),
            "application/pdf" => Some(DocumentKind::Pdf),
            _ => None,
        }
    }

    /// Detect the kind from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(DocumentKind::Pdf);
        }
        match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => Some(DocumentKind::Image(ImageKind::Jpeg)),
            Ok(ImageFormat::Png) => Some(DocumentKind::Image(ImageKind::Png)),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            DocumentKind::Image(ImageKind::Jpeg) => "image/jpeg",
            DocumentKind::Image(ImageKind::Png) => "image/png",
            DocumentKind::Pdf => "application/pdf",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, DocumentKind::Image(_))
    }
}

/// An uploaded menu, immutable until text extraction consumes it.
#[derive(Clone)]
pub struct RawDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDocument")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl RawDocument {
    /// Accept an in-memory upload.
    ///
    /// `declared_mime`, when given, must be one of the accepted upload types.
    /// The document kind itself always comes from the content.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: Vec<u8>,
        declared_mime: Option<&str>,
    ) -> Result<Self, MenuError> {
        let name = name.into();
        if let Some(mime) = declared_mime {
            if DocumentKind::from_mime(mime).is_none() {
                return Err(MenuError::UnsupportedDocument {
                    name,
                    detail: mime.to_string(),
                });
            }
        }

        let kind = DocumentKind::sniff(&bytes).ok_or_else(|| {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            MenuError::UnsupportedDocument {
                name: name.clone(),
                detail: format!("content is not JPEG, PNG or PDF; first bytes {:?}", magic),
            }
        })?;

        if let Some(declared) = declared_mime.and_then(DocumentKind::from_mime) {
            if declared != kind {
                debug!(
                    "'{}' declared as {} but content is {}",
                    name,
                    declared.mime(),
                    kind.mime()
                );
            }
        }

        Ok(Self { name, kind, bytes })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<RawDocument, MenuError> {
    if input.trim().is_empty() {
        return Err(MenuError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(input).await
    }
}

async fn load_local(path_str: &str) -> Result<RawDocument, MenuError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => MenuError::PermissionDenied { path: path.clone() },
        _ => MenuError::FileNotFound { path: path.clone() },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());
    let doc = RawDocument::from_bytes(name, bytes, None)?;
    debug!("Loaded {} ({:?}, {} bytes)", path.display(), doc.kind, doc.bytes.len());
    Ok(doc)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<RawDocument, MenuError> {
    info!("Downloading menu from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MenuError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            MenuError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            MenuError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(MenuError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let name = filename_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| MenuError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    // Servers often answer with application/octet-stream; only a specific,
    // recognised type is used to gate the upload.
    let declared = content_type
        .as_deref()
        .filter(|ct| DocumentKind::from_mime(ct).is_some());

    info!("Downloaded {} bytes", bytes.len());
    RawDocument::from_bytes(name, bytes.to_vec(), declared)
}

/// Last non-empty URL path segment, or `downloaded`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded".to_string()
}
