//! Transcription engines and the registry the router dispatches into.
//!
//! Every strategy (remote VLM, a future on-device OCR model, test doubles)
//! implements [`TranscriptionEngine`]. Engines never return `Err`: failures
//! are folded into [`TranscriptionResult::failed`] so the item pipeline has a
//! single path for recording an outcome.

use crate::classify::CoarseLabel;
use crate::error::ItemError;
use crate::output::TranscriptionResult;
use crate::pipeline::input::ImageRef;
use crate::pipeline::route::EngineKind;
use crate::prompts::TranscriptionPrompt;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Input to one transcription call.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// Loaded image (bytes present).
    pub image: ImageRef,
    pub prompt: TranscriptionPrompt,
    /// Coarse label the router keyed on; engines may use it to pick a
    /// sub-model.
    pub engine_hint: CoarseLabel,
}

/// A transcription strategy.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Transcribe one image. Always returns a result; failures are reported
    /// through [`TranscriptionResult::error`].
    async fn transcribe(&self, request: &TranscriptionRequest) -> TranscriptionResult;
}

/// Engines available to a run, keyed by [`EngineKind`].
#[derive(Clone, Default)]
pub struct EngineSet {
    engines: HashMap<EngineKind, Arc<dyn TranscriptionEngine>>,
}

impl EngineSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the engine for `kind`.
    pub fn with(mut self, kind: EngineKind, engine: Arc<dyn TranscriptionEngine>) -> Self {
        self.engines.insert(kind, engine);
        self
    }

    pub fn insert(&mut self, kind: EngineKind, engine: Arc<dyn TranscriptionEngine>) {
        self.engines.insert(kind, engine);
    }

    pub fn contains(&self, kind: EngineKind) -> bool {
        self.engines.contains_key(&kind)
    }

    /// Engine for `kind`, or [`ItemError::EngineUnavailable`].
    pub fn get(&self, kind: EngineKind) -> Result<Arc<dyn TranscriptionEngine>, ItemError> {
        self.engines
            .get(&kind)
            .cloned()
            .ok_or_else(|| ItemError::EngineUnavailable {
                engine: kind.to_string(),
                detail: "no engine of this kind is configured".into(),
            })
    }
}

impl fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .engines
            .iter()
            .map(|(k, e)| format!("{}={}", k, e.name()))
            .collect();
        names.sort();
        f.debug_struct("EngineSet").field("engines", &names).finish()
    }
}
