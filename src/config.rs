//! Configuration types for scan transcription.
//!
//! Every knob of a run lives in [`TranscriptionConfig`], built via
//! [`TranscriptionConfigBuilder`]. The config is handed to each component at
//! construction time; nothing reads process-wide mutable state.

use crate::classify::{CoarseLabel, MIN_CONFIDENCE_SCORE};
use crate::error::ScanError;
use crate::pipeline::route::{EngineKind, RoutingPolicy};
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_NO_TEXT_SENTINEL;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Model used when the caller names none.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for a transcription run.
///
/// # Example
/// ```rust
/// use edgequake_scan2txt::TranscriptionConfig;
///
/// let config = TranscriptionConfig::builder()
///     .model("gpt-4.1-mini")
///     .max_tokens(2000)
///     .min_confidence(0.6)
///     .build()
///     .unwrap();
/// assert_eq!(config.output_extension, "txt");
/// ```
#[derive(Clone)]
pub struct TranscriptionConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini", "gpt-4o".
    /// If None, [`DEFAULT_MODEL`] is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the completion. Default: 0.1.
    ///
    /// Transcription wants the model to copy, not to compose, so this stays
    /// close to zero.
    pub temperature: f32,

    /// Maximum tokens the model may generate per image. Default: 1500.
    ///
    /// A dense typed page is roughly 600–900 tokens. Too low a value cuts the
    /// transcription mid-line without any error.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 60. Expiry is a transient failure.
    pub api_timeout_secs: u64,

    /// Confidence floor below which a classification becomes `undetermined`.
    /// Range: 0.0–1.0. Default: 0.5.
    pub min_confidence: f32,

    /// Text written for an image with no legible content.
    /// Default: `[NO LEGIBLE TEXT]`.
    pub no_text_sentinel: String,

    /// Extension of output files, without the leading dot. Default: "txt".
    pub output_extension: String,

    /// Coarse label → engine table. Default: everything to the remote engine.
    pub routing: RoutingPolicy,

    /// Optional per-item progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1500,
            api_timeout_secs: 60,
            min_confidence: MIN_CONFIDENCE_SCORE,
            no_text_sentinel: DEFAULT_NO_TEXT_SENTINEL.to_string(),
            output_extension: "txt".to_string(),
            routing: RoutingPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("min_confidence", &self.min_confidence)
            .field("no_text_sentinel", &self.no_text_sentinel)
            .field("output_extension", &self.output_extension)
            .field("routing", &self.routing)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl TranscriptionConfig {
    /// Create a new builder for `TranscriptionConfig`.
    pub fn builder() -> TranscriptionConfigBuilder {
        TranscriptionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`TranscriptionConfig`].
#[derive(Debug)]
pub struct TranscriptionConfigBuilder {
    config: TranscriptionConfig,
}

impl TranscriptionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn min_confidence(mut self, floor: f32) -> Self {
        self.config.min_confidence = floor;
        self
    }

    pub fn no_text_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.config.no_text_sentinel = sentinel.into();
        self
    }

    /// Output file extension; a leading dot is stripped.
    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        self.config.output_extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn routing(mut self, policy: RoutingPolicy) -> Self {
        self.config.routing = policy;
        self
    }

    /// Shorthand for overriding the engine of a single label.
    pub fn route(mut self, label: CoarseLabel, engine: EngineKind) -> Self {
        self.config.routing = self.config.routing.with_route(label, engine);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranscriptionConfig, ScanError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.min_confidence) {
            return Err(ScanError::InvalidConfig(format!(
                "min_confidence must be 0.0–1.0, got {}",
                c.min_confidence
            )));
        }
        if c.max_tokens == 0 {
            return Err(ScanError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.no_text_sentinel.trim().is_empty() {
            return Err(ScanError::InvalidConfig(
                "no_text_sentinel must not be empty".into(),
            ));
        }
        if c.output_extension.is_empty()
            || c.output_extension
                .contains(|ch: char| ch == '/' || ch == '\\' || ch.is_whitespace())
        {
            return Err(ScanError::InvalidConfig(format!(
                "invalid output extension '{}'",
                c.output_extension
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = TranscriptionConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_tokens, 1500);
        assert_eq!(c.api_timeout_secs, 60);
        assert_eq!(c.min_confidence, 0.5);
        assert_eq!(c.no_text_sentinel, "[NO LEGIBLE TEXT]");
        assert_eq!(c.output_extension, "txt");
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
        assert_eq!(c.routing, RoutingPolicy::default());
    }

    #[test]
    fn builder_clamps_and_normalises() {
        let c = TranscriptionConfig::builder()
            .temperature(5.0)
            .output_extension(".md")
            .model("gpt-4o")
            .build()
            .expect("valid");
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.output_extension, "md");
        assert_eq!(c.model_or_default(), "gpt-4o");
    }

    #[test]
    fn confidence_out_of_range_is_rejected() {
        for bad in [-0.1, 1.5, f32::NAN] {
            let err = TranscriptionConfig::builder()
                .min_confidence(bad)
                .build()
                .expect_err("out of range");
            assert!(matches!(err, ScanError::InvalidConfig(_)));
        }
    }

    #[test]
    fn empty_sentinel_and_extension_are_rejected() {
        assert!(TranscriptionConfig::builder()
            .no_text_sentinel("  ")
            .build()
            .is_err());
        assert!(TranscriptionConfig::builder()
            .output_extension(".")
            .build()
            .is_err());
        assert!(TranscriptionConfig::builder()
            .output_extension("a/b")
            .build()
            .is_err());
    }

    #[test]
    fn route_shorthand_updates_policy() {
        let c = TranscriptionConfig::builder()
            .route(CoarseLabel::Handwritten, EngineKind::LocalOcr)
            .build()
            .expect("valid");
        assert_eq!(
            c.routing.engine_for(CoarseLabel::Handwritten),
            EngineKind::LocalOcr
        );
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", TranscriptionConfig::default());
        assert!(s.contains("TranscriptionConfig"));
        assert!(s.contains("min_confidence"));
    }
}
