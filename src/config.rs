//! Configuration types for menu-to-spreadsheet conversion.
//!
//! All pipeline behaviour is controlled through [`MenuConfig`], built via
//! [`MenuConfigBuilder`]. Backend credentials live in [`AzureSettings`],
//! which reads the same `config.json` layout the menu tool has always used.
//! Everything is loaded once at startup and passed explicitly into
//! [`crate::session::Pipeline::new`]; nothing is read from global state after
//! that, so tests can inject mock backends.

use crate::error::MenuError;
use crate::pipeline::llm::CompletionBackend;
use crate::pipeline::ocr::OcrBackend;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Default sheet name written by the exporter.
pub const DEFAULT_SHEET_NAME: &str = "Restaurant_menu";

/// Configuration for a menu conversion session.
///
/// Built via [`MenuConfig::builder()`] or using [`MenuConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_menu2xlsx::MenuConfig;
///
/// let config = MenuConfig::builder()
///     .temperature(0.2)
///     .max_tokens(2048)
///     .ocr_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct MenuConfig {
    /// Sampling temperature for the structuring call. Default: 0.3.
    ///
    /// Structuring is a formatting task, so low values keep the output
    /// close to the source text.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    ///
    /// A long menu with descriptions easily produces 2 000+ output tokens;
    /// too low a cap silently truncates the last rows.
    pub max_tokens: usize,

    /// Retry attempts on a model failure. Default: 0 (no automatic retry).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Delay between OCR status polls in milliseconds. Default: 1000.
    pub ocr_poll_interval_ms: u64,

    /// Upper bound for the whole OCR poll loop in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Worksheet name in the exported file. Default: `Restaurant_menu`.
    pub sheet_name: String,

    /// Strip a code fence wrapping the whole model response. Default: true.
    pub strip_code_fences: bool,

    /// PDF user password for encrypted documents.
    pub pdf_password: Option<String>,

    /// Path to an existing pdfium library. If None, pdfium-auto locates or
    /// downloads one.
    pub pdfium_lib_path: Option<String>,

    /// Model identifier for non-Azure providers, e.g. "gpt-4.1-mini".
    pub model: Option<String>,

    /// Provider name for non-Azure providers (e.g. "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed model backend. Takes precedence over everything else.
    pub model_backend: Option<Arc<dyn CompletionBackend>>,

    /// Pre-constructed OCR backend. Takes precedence over [`AzureSettings`].
    pub ocr_backend: Option<Arc<dyn OcrBackend>>,

    /// Azure credentials and endpoints.
    pub azure: AzureSettings,

    /// Optional progress callback.
    pub progress: Option<ProgressCallback>,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            ocr_poll_interval_ms: 1000,
            ocr_timeout_secs: 120,
            download_timeout_secs: 120,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            strip_code_fences: true,
            pdf_password: None,
            pdfium_lib_path: None,
            model: None,
            provider_name: None,
            model_backend: None,
            ocr_backend: None,
            azure: AzureSettings::default(),
            progress: None,
        }
    }
}

impl fmt::Debug for MenuConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuConfig")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("ocr_poll_interval_ms", &self.ocr_poll_interval_ms)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("sheet_name", &self.sheet_name)
            .field("strip_code_fences", &self.strip_code_fences)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field(
                "model_backend",
                &self.model_backend.as_ref().map(|_| "<dyn CompletionBackend>"),
            )
            .field(
                "ocr_backend",
                &self.ocr_backend.as_ref().map(|_| "<dyn OcrBackend>"),
            )
            .field("azure", &self.azure)
            .finish()
    }
}

impl MenuConfig {
    /// Create a new builder for `MenuConfig`.
    pub fn builder() -> MenuConfigBuilder {
        MenuConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`MenuConfig`].
#[derive(Debug)]
pub struct MenuConfigBuilder {
    config: MenuConfig,
}

impl MenuConfigBuilder {
    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn ocr_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.ocr_poll_interval_ms = ms;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.config.sheet_name = name.into();
        self
    }

    pub fn strip_code_fences(mut self, v: bool) -> Self {
        self.config.strip_code_fences = v;
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<String>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.model_backend = Some(backend);
        self
    }

    pub fn ocr_backend(mut self, backend: Arc<dyn OcrBackend>) -> Self {
        self.config.ocr_backend = Some(backend);
        self
    }

    pub fn azure(mut self, settings: AzureSettings) -> Self {
        self.config.azure = settings;
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.config.progress = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MenuConfig, MenuError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(MenuError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.ocr_poll_interval_ms == 0 {
            return Err(MenuError::InvalidConfig(
                "OCR poll interval must be ≥ 1ms".into(),
            ));
        }
        if c.ocr_timeout_secs == 0 {
            return Err(MenuError::InvalidConfig(
                "OCR timeout must be ≥ 1s".into(),
            ));
        }
        validate_sheet_name(&c.sheet_name)?;
        Ok(self.config)
    }
}

/// Excel rejects sheet names that are empty, longer than 31 characters, or
/// contain any of `[ ] : * ? / \`.
fn validate_sheet_name(name: &str) -> Result<(), MenuError> {
    if name.is_empty() || name.chars().count() > 31 {
        return Err(MenuError::InvalidConfig(format!(
            "Sheet name must be 1–31 characters, got {:?}",
            name
        )));
    }
    if let Some(bad) = name.chars().find(|c| "[]:*?/\\".contains(*c)) {
        return Err(MenuError::InvalidConfig(format!(
            "Sheet name {:?} contains forbidden character '{}'",
            name, bad
        )));
    }
    Ok(())
}

// ── Azure settings ───────────────────────────────────────────────────────

/// Azure OpenAI + Azure Computer Vision credentials.
///
/// Deserialises from the flat `config.json` layout:
///
/// ```json
/// {
///   "azure_api_key": "…",
///   "azure_api_version": "2024-02-01",
///   "azure_endpoint": "https://my-openai.openai.azure.com",
///   "deployment_name": "gpt-4o-mini",
///   "azure_cv_api_key": "…",
///   "azure_cv_endpoint": "https://my-vision.cognitiveservices.azure.com"
/// }
/// ```
///
/// Every key is optional so one file may configure only OCR or only the
/// model.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AzureSettings {
    #[serde(rename = "azure_api_key", default)]
    pub api_key: Option<String>,
    #[serde(rename = "azure_api_version", default)]
    pub api_version: Option<String>,
    #[serde(rename = "azure_endpoint", default)]
    pub endpoint: Option<String>,
    #[serde(rename = "deployment_name", default)]
    pub deployment_name: Option<String>,
    #[serde(rename = "azure_cv_api_key", default)]
    pub cv_api_key: Option<String>,
    #[serde(rename = "azure_cv_endpoint", default)]
    pub cv_endpoint: Option<String>,
}

impl AzureSettings {
    /// Load settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MenuError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| MenuError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&raw).map_err(|detail| MenuError::ConfigParse {
            path: path.to_path_buf(),
            detail,
        })
    }

    /// Parse settings from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }

    /// True when endpoint, key and deployment are all present.
    pub fn has_chat(&self) -> bool {
        is_set(&self.endpoint) && is_set(&self.api_key) && is_set(&self.deployment_name)
    }

    /// True when the Computer Vision endpoint and key are present.
    pub fn has_ocr(&self) -> bool {
        is_set(&self.cv_endpoint) && is_set(&self.cv_api_key)
    }
}

fn is_set(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AzureSettings")
            .field("api_key", &redact(&self.api_key))
            .field("api_version", &self.api_version)
            .field("endpoint", &self.endpoint)
            .field("deployment_name", &self.deployment_name)
            .field("cv_api_key", &redact(&self.cv_api_key))
            .field("cv_endpoint", &self.cv_endpoint)
            .finish()
    }
}
