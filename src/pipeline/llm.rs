//! Model interaction: send the structuring prompt and return the raw table text.
//!
//! This module is intentionally thin. Prompt wording lives in
//! [`crate::prompts`] and output cleanup in [`super::postprocess`]; here we
//! only drive the call, its timeout and the (opt-in) retry loop.
//!
//! The model is reached through the [`CompletionBackend`] trait so providers
//! can be swapped or mocked without touching pipeline logic:
//!
//! * [`AzureChatClient`] — Azure OpenAI chat completions over `reqwest`
//! * [`EdgequakeBackend`] — any `edgequake_llm` provider (OpenAI, Anthropic,
//!   Gemini, Ollama, …)

use crate::config::{AzureSettings, MenuConfig};
use crate::error::{BackendError, MenuError, StageError};
use crate::pipeline::postprocess;
use crate::prompts::build_messages;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Default Azure OpenAI REST API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Default model for non-Azure providers.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

// ── Messages ─────────────────────────────────────────────────────────────

/// Chat role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Generation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl CompletionParams {
    pub fn from_config(config: &MenuConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// One generated completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Capability interface for a chat-completion model.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short provider label for logs.
    fn name(&self) -> &str;

    /// Generate one completion for `messages`.
    async fn complete(
        &self,
        messages: &[PromptMessage],
        params: &CompletionParams,
    ) -> Result<Completion, BackendError>;
}

// ── Structuring call ─────────────────────────────────────────────────────

/// Result of a successful structuring call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredOutput {
    /// Trimmed (and optionally un-fenced) model response.
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub duration_ms: u64,
    pub retries: u32,
}

/// Exponential backoff before retry `attempt` (1-based), saturating at
/// `u64::MAX` milliseconds.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
}

/// Ask the model to turn `menu_text` into pipe-delimited rows.
///
/// Empty input short-circuits to an empty output without a backend call.
/// With the default `max_retries = 0` a failure is reported immediately;
/// otherwise backoff doubles from `retry_backoff_ms` on each attempt.
pub async fn structure_text(
    backend: &dyn CompletionBackend,
    menu_text: &str,
    config: &MenuConfig,
) -> Result<StructuredOutput, StageError> {
    if menu_text.trim().is_empty() {
        debug!("No extracted text; skipping model call");
        return Ok(StructuredOutput::default());
    }

    let start = Instant::now();
    let messages = build_messages(menu_text);
    let params = CompletionParams::from_config(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs.max(1));

    info!(
        "Structuring {} chars of menu text via {}",
        menu_text.len(),
        backend.name()
    );

    let mut last_err: Option<StageError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Structuring: retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, backend.complete(&messages, &params)).await {
            Ok(Ok(completion)) => {
                let duration = start.elapsed();
                debug!(
                    "Structuring: {} input tokens, {} output tokens, {:?}",
                    completion.prompt_tokens, completion.completion_tokens, duration
                );
                let text = postprocess::clean_model_output(
                    &completion.content,
                    config.strip_code_fences,
                );
                return Ok(StructuredOutput {
                    text,
                    prompt_tokens: completion.prompt_tokens,
                    completion_tokens: completion.completion_tokens,
                    duration_ms: duration.as_millis() as u64,
                    retries: attempt,
                });
            }
            Ok(Err(e)) => {
                warn!("Structuring: attempt {} failed — {}", attempt + 1, e);
                last_err = Some(StageError::Model {
                    retries: attempt,
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "Structuring: attempt {} timed out after {}s",
                    attempt + 1,
                    call_timeout.as_secs()
                );
                last_err = Some(StageError::ModelTimeout {
                    secs: call_timeout.as_secs(),
                });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| StageError::Model {
        retries: config.max_retries,
        detail: "Unknown error".to_string(),
    }))
}

// ── Backend resolution ───────────────────────────────────────────────────

/// Resolve the model backend, from most-specific to least-specific.
///
/// 1. **Injected backend** (`config.model_backend`) — used as-is.
/// 2. **Named provider** (`config.provider_name`) — built by
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Azure settings** — endpoint, key and deployment all present in the
///    config file.
/// 4. **Auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_backend(config: &MenuConfig) -> Result<Arc<dyn CompletionBackend>, MenuError> {
    if let Some(ref backend) = config.model_backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            MenuError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        return Ok(Arc::new(EdgequakeBackend::new(name.clone(), provider)));
    }

    if config.azure.has_chat() {
        let client = AzureChatClient::new(&config.azure)?;
        return Ok(Arc::new(client));
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| MenuError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No model provider could be found.\n\
                Add azure_endpoint/azure_api_key/deployment_name to the config file,\n\
                or set OPENAI_API_KEY, ANTHROPIC_API_KEY, ….\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(EdgequakeBackend::new("auto", provider)))
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Adapter exposing an `edgequake_llm` provider as a [`CompletionBackend`].
pub struct EdgequakeBackend {
    label: String,
    provider: Arc<dyn LLMProvider>,
}

impl EdgequakeBackend {
    pub fn new(label: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            label: label.into(),
            provider,
        }
    }
}

#[async_trait]
impl CompletionBackend for EdgequakeBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(
        &self,
        messages: &[PromptMessage],
        params: &CompletionParams,
    ) -> Result<Completion, BackendError> {
        let chat: Vec<ChatMessage> = messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::system(m.content.as_str()),
                Role::User => ChatMessage::user(m.content.as_str()),
            })
            .collect();
        let options = CompletionOptions {
            temperature: Some(params.temperature),
            max_tokens: Some(params.max_tokens),
            ..Default::default()
        };
        let response = self
            .provider
            .chat(&chat, Some(&options))
            .await
            .map_err(|e| BackendError::new(format!("{}", e)))?;
        Ok(Completion {
            content: response.content,
            prompt_tokens: response.prompt_tokens as u64,
            completion_tokens: response.completion_tokens as u64,
        })
    }
}

// ── Azure OpenAI ─────────────────────────────────────────────────────────

/// Azure OpenAI chat-completions client.
pub struct AzureChatClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [PromptMessage],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl AzureChatClient {
    /// Build a client from config-file settings.
    pub fn new(settings: &AzureSettings) -> Result<Self, MenuError> {
        let missing = |field: &str| MenuError::ProviderNotConfigured {
            provider: "azure".to_string(),
            hint: format!("Missing '{field}' in the config file."),
        };
        let endpoint = settings.endpoint.as_deref().ok_or_else(|| missing("azure_endpoint"))?;
        let api_key = settings.api_key.clone().ok_or_else(|| missing("azure_api_key"))?;
        let deployment = settings
            .deployment_name
            .as_deref()
            .ok_or_else(|| missing("deployment_name"))?;
        let version = settings
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_AZURE_API_VERSION);

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| MenuError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: chat_completions_url(endpoint, deployment, version),
            api_key,
        })
    }
}

/// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`
pub fn chat_completions_url(endpoint: &str, deployment: &str, version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        version
    )
}

#[async_trait]
impl CompletionBackend for AzureChatClient {
    fn name(&self) -> &str {
        "azure"
    }

    async fn complete(
        &self,
        messages: &[PromptMessage],
        params: &CompletionParams,
    ) -> Result<Completion, BackendError> {
        let body = ChatRequest {
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };
        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::new(format!("HTTP {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::new(format!("Invalid response body: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::new("Response contained no choices"))?;
        let usage = parsed.usage.unwrap_or(ChatUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        Ok(Completion {
            content,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}
