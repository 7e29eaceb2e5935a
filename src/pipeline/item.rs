//! Item pipeline: one image, end to end.
//!
//! ```text
//! check ext ──▶ load ──▶ decode + classify ──▶ route ──▶ transcribe ──▶ persist
//!                        (spawn_blocking)
//! ```
//!
//! [`ItemPipeline::process`] never returns an error. Whatever stage fails,
//! the failure is logged with its context and recorded in the returned
//! [`ItemOutcome`] so the batch carries on with the next image.

use crate::classify::{ClassificationResult, DocumentClassifier};
use crate::config::TranscriptionConfig;
use crate::error::{ItemError, ScanError};
use crate::output::ItemOutcome;
use crate::pipeline::engine::{EngineSet, TranscriptionRequest};
use crate::pipeline::input::ImageRef;
use crate::pipeline::llm::RemoteVisionEngine;
use crate::pipeline::persist::{output_path_for, write_transcription_async};
use crate::pipeline::route::EngineKind;
use crate::prompts::TranscriptionPrompt;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Composes classifier, router, engines and persistence for one image.
#[derive(Clone)]
pub struct ItemPipeline {
    config: TranscriptionConfig,
    classifier: Arc<dyn DocumentClassifier>,
    engines: EngineSet,
}

impl fmt::Debug for ItemPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemPipeline")
            .field("classifier", &self.classifier.name())
            .field("engines", &self.engines)
            .field("routing", &self.config.routing)
            .finish()
    }
}

impl ItemPipeline {
    /// Assemble a pipeline from explicit parts.
    pub fn new(
        config: TranscriptionConfig,
        classifier: Arc<dyn DocumentClassifier>,
        engines: EngineSet,
    ) -> Self {
        for kind in config.routing.engines() {
            if !engines.contains(kind) {
                warn!(
                    "Routing can select '{}' but no such engine is configured; \
                     affected items will fail as engine_unavailable",
                    kind
                );
            }
        }
        Self {
            config,
            classifier,
            engines,
        }
    }

    /// Pipeline with the remote engine on `provider`.
    pub fn with_provider(
        config: TranscriptionConfig,
        classifier: Arc<dyn DocumentClassifier>,
        provider: Arc<dyn LLMProvider>,
    ) -> Self {
        let remote = RemoteVisionEngine::new(provider, &config);
        let engines = EngineSet::new().with(EngineKind::RemoteVision, Arc::new(remote));
        Self::new(config, classifier, engines)
    }

    /// Pipeline whose remote provider is resolved from the config and the
    /// environment. Fails with [`ScanError::ProviderNotConfigured`] before any
    /// image is touched when no provider is available.
    pub async fn from_config(
        config: TranscriptionConfig,
        classifier: Arc<dyn DocumentClassifier>,
    ) -> Result<Self, ScanError> {
        Self::from_config_with_engines(config, classifier, EngineSet::new()).await
    }

    /// Like [`from_config`](Self::from_config), keeping the engines already
    /// in `engines` (e.g. a local OCR engine) next to the remote one.
    pub async fn from_config_with_engines(
        config: TranscriptionConfig,
        classifier: Arc<dyn DocumentClassifier>,
        mut engines: EngineSet,
    ) -> Result<Self, ScanError> {
        let provider = crate::batch::resolve_provider(&config).await?;
        engines.insert(
            EngineKind::RemoteVision,
            Arc::new(RemoteVisionEngine::new(provider, &config)),
        );
        Ok(Self::new(config, classifier, engines))
    }

    pub fn config(&self) -> &TranscriptionConfig {
        &self.config
    }

    /// Run one image through every stage, writing `<stem>.<ext>` into
    /// `output_dir` on success.
    pub async fn process(
        &self,
        image: ImageRef,
        prompt: &TranscriptionPrompt,
        output_dir: &Path,
    ) -> ItemOutcome {
        let start = Instant::now();
        let name = image.display_name();
        let mut outcome = ItemOutcome::new(image.path());

        if let Err(e) = self.run_stages(image, prompt, output_dir, &mut outcome).await {
            warn!(
                "{}: {} [label={}, engine={}]",
                name,
                e,
                outcome
                    .classification
                    .as_ref()
                    .map(|c| c.label.as_str())
                    .unwrap_or("-"),
                outcome.engine.map(|k| k.as_str()).unwrap_or("-"),
            );
            outcome.output = None;
            outcome.chars = 0;
            outcome.error = Some(e);
        }

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        outcome
    }

    async fn run_stages(
        &self,
        image: ImageRef,
        prompt: &TranscriptionPrompt,
        output_dir: &Path,
        outcome: &mut ItemOutcome,
    ) -> Result<(), ItemError> {
        image.check_extension()?;
        let image = image.load().await?;
        let name = image.display_name();

        let classification = self.classify(image.clone()).await?;
        debug!(
            "{}: raw scores [{}]",
            name,
            classification.scores_summary()
        );
        info!(
            "{}: classified as {} (confidence {:.3}, top label {})",
            name,
            classification.label,
            classification.confidence,
            classification.top_label.as_deref().unwrap_or("-")
        );
        let selection = self.config.routing.select_engine(&classification);
        outcome.classification = Some(classification);
        outcome.engine = Some(selection.engine);

        let engine = self.engines.get(selection.engine)?;
        debug!("{}: routed to {} ({})", name, selection.engine, engine.name());

        let request = TranscriptionRequest {
            image,
            prompt: prompt.clone(),
            engine_hint: selection.label,
        };
        let result = engine.transcribe(&request).await.into_result()?;
        outcome.input_tokens = result.input_tokens;
        outcome.output_tokens = result.output_tokens;

        let target = output_path_for(request.image.path(), output_dir, &self.config.output_extension);
        let chars = result.text.chars().count();
        write_transcription_async(target.clone(), result.text).await?;
        info!("{}: wrote {} ({} chars)", name, target.display(), chars);

        outcome.output = Some(target);
        outcome.chars = chars;
        Ok(())
    }

    /// Decode check and classification on the blocking pool. A panicking
    /// classifier is reported as a classification failure.
    async fn classify(&self, image: ImageRef) -> Result<ClassificationResult, ItemError> {
        let classifier = Arc::clone(&self.classifier);
        tokio::task::spawn_blocking(move || {
            image.decode()?;
            classifier.classify(&image)
        })
        .await
        .map_err(|e| ItemError::Classification {
            detail: format!("classifier task failed: {e}"),
        })?
    }
}
