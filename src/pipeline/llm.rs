//! Remote VLM engine: build the vision request and call the provider.
//!
//! One request per image: a single user message carrying the prompt text and
//! the scan as a base64 image attachment. There is no retry loop here; a
//! failed call is categorised once and returned, and the batch moves on.

use crate::config::TranscriptionConfig;
use crate::error::ItemError;
use crate::output::TranscriptionResult;
use crate::pipeline::encode::encode_image;
use crate::pipeline::engine::{TranscriptionEngine, TranscriptionRequest};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Text and token usage of one vision call.
#[derive(Debug, Clone, Default)]
pub struct VisionReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// The single provider call the remote engine makes.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn chat(
        &self,
        prompt: &str,
        image: ImageData,
        options: &CompletionOptions,
    ) -> Result<VisionReply, LlmError>;
}

/// [`VisionBackend`] over any `edgequake-llm` provider.
pub struct ProviderBackend(pub Arc<dyn LLMProvider>);

#[async_trait]
impl VisionBackend for ProviderBackend {
    async fn chat(
        &self,
        prompt: &str,
        image: ImageData,
        options: &CompletionOptions,
    ) -> Result<VisionReply, LlmError> {
        let messages = vision_messages(prompt, image);
        let response = self.0.chat(&messages, Some(options)).await?;
        Ok(VisionReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

/// One user turn: prompt text plus the scan.
fn vision_messages(prompt: &str, image: ImageData) -> Vec<ChatMessage> {
    vec![ChatMessage::user_with_images(prompt, vec![image])]
}

/// [`TranscriptionEngine`] backed by an `edgequake-llm` provider.
pub struct RemoteVisionEngine {
    backend: Arc<dyn VisionBackend>,
    options: CompletionOptions,
    timeout: Duration,
    sentinel: String,
    name: String,
}

impl RemoteVisionEngine {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TranscriptionConfig) -> Self {
        Self::with_backend(Arc::new(ProviderBackend(provider)), config)
    }

    pub fn with_backend(backend: Arc<dyn VisionBackend>, config: &TranscriptionConfig) -> Self {
        Self {
            backend,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
            sentinel: config.no_text_sentinel.clone(),
            name: format!("remote:{}", config.model_or_default()),
        }
    }
}

#[async_trait]
impl TranscriptionEngine for RemoteVisionEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> TranscriptionResult {
        let name = request.image.display_name();
        let image_data = match encode_image(&request.image) {
            Ok(data) => data,
            Err(e) => return TranscriptionResult::failed(e),
        };

        let start = Instant::now();
        let call = self
            .backend
            .chat(request.prompt.as_str(), image_data, &self.options);
        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!("{}: raw provider error: {}", name, e);
                return TranscriptionResult::failed(classify_llm_error(&e));
            }
            Err(_) => {
                warn!("{}: no response within {:?}", name, self.timeout);
                return TranscriptionResult::failed(ItemError::TransientRemote {
                    detail: format!("request timed out after {:?}", self.timeout),
                });
            }
        };

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            name,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            debug!("{}: empty response, writing sentinel", name);
        }
        let text = normalise_transcript(&response.content, &self.sentinel);

        TranscriptionResult::ok(text).with_usage(response.prompt_tokens, response.completion_tokens)
    }
}

/// Build `CompletionOptions` from the run config.
fn build_options(config: &TranscriptionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Trim a model answer; an empty answer means the page has no legible text
/// and becomes the sentinel.
pub fn normalise_transcript(raw: &str, sentinel: &str) -> String {
    let text = raw.trim();
    if text.is_empty() {
        sentinel.to_string()
    } else {
        text.to_string()
    }
}

/// Map a provider error onto the item error taxonomy.
///
/// Typed variants decide directly; generic API/provider errors fall back to
/// [`classify_remote_error`] on their message.
pub fn classify_llm_error(err: &LlmError) -> ItemError {
    let detail = err.to_string();
    match err {
        LlmError::AuthError(_) => ItemError::Authentication { detail },
        LlmError::ModelNotFound(_) | LlmError::NotSupported(_) => {
            ItemError::ModelUnavailable { detail }
        }
        LlmError::InvalidRequest(_) => ItemError::MalformedRequest { detail },
        LlmError::RateLimited(_) | LlmError::NetworkError(_) => {
            ItemError::TransientRemote { detail }
        }
        _ => classify_remote_error(&detail),
    }
}

/// An HTTP status, only when introduced by a status keyword or leading the
/// message. Bare digits inside token counts or durations never match.
static RE_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\b(?:status(?:\s+code)?|http(?:/[\d.]+)?|code))[\s:=(]*([1-5]\d\d)\b")
        .unwrap()
});

fn status_code(message: &str) -> Option<u16> {
    RE_STATUS
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Map a provider error message onto the item error taxonomy.
///
/// Order: content filter, anchored HTTP status, transient phrases, then
/// auth/model/request phrases. Anything unrecognised is transient.
pub fn classify_remote_error(message: &str) -> ItemError {
    let lower = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    let detail = message.to_string();

    if has(&["content_filter", "content filter", "empty response", "no content"]) {
        return ItemError::EmptyOutput { detail };
    }

    if let Some(status) = status_code(message) {
        return match status {
            401 | 403 => ItemError::Authentication { detail },
            404 => ItemError::ModelUnavailable { detail },
            400 | 413 | 415 | 422 => ItemError::MalformedRequest { detail },
            _ => ItemError::TransientRemote { detail },
        };
    }

    if has(&[
        "rate limit",
        "too many requests",
        "timed out",
        "timeout",
        "connection reset",
        "connection refused",
        "connection closed",
        "temporarily unavailable",
        "overloaded",
    ]) {
        ItemError::TransientRemote { detail }
    } else if has(&[
        "unauthorized",
        "forbidden",
        "api key",
        "api_key",
        "authentication",
        "permission denied",
    ]) {
        ItemError::Authentication { detail }
    } else if has(&[
        "model_not_found",
        "model not found",
        "does not exist",
        "does not support",
        "not supported",
        "unsupported model",
    ]) {
        ItemError::ModelUnavailable { detail }
    } else if has(&[
        "bad request",
        "invalid_request",
        "invalid request",
        "invalid image",
        "too large",
    ]) {
        ItemError::MalformedRequest { detail }
    } else {
        ItemError::TransientRemote { detail }
    }
}
