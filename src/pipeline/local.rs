//! On-device OCR engine.
//!
//! [`LocalOcrEngine`] adapts any [`OcrModel`] to the [`TranscriptionEngine`]
//! contract: decode, recognise on a blocking thread, trim, and substitute
//! the sentinel for an empty read. The prompt is ignored; OCR models take no
//! instructions.

use crate::config::TranscriptionConfig;
use crate::error::ItemError;
use crate::output::TranscriptionResult;
use crate::pipeline::engine::{TranscriptionEngine, TranscriptionRequest};
use crate::pipeline::llm::normalise_transcript;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// A local text-recognition network.
pub trait OcrModel: Send + Sync {
    fn name(&self) -> &str;

    /// Read the text in a decoded image. Errors are model-internal failures.
    fn recognise(&self, image: &DynamicImage) -> Result<String, String>;
}

/// [`TranscriptionEngine`] backed by an [`OcrModel`].
pub struct LocalOcrEngine {
    model: Arc<dyn OcrModel>,
    sentinel: String,
    name: String,
}

impl LocalOcrEngine {
    pub fn new(model: Arc<dyn OcrModel>, config: &TranscriptionConfig) -> Self {
        let name = format!("local:{}", model.name());
        Self {
            model,
            sentinel: config.no_text_sentinel.clone(),
            name,
        }
    }
}

#[async_trait]
impl TranscriptionEngine for LocalOcrEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> TranscriptionResult {
        let model = Arc::clone(&self.model);
        let image = request.image.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let decoded = image.decode()?;
            model
                .recognise(&decoded)
                .map_err(|detail| ItemError::LocalOcr { detail })
        })
        .await;

        match joined {
            Ok(Ok(raw)) => {
                debug!(
                    "{}: {} read {} chars",
                    request.image.display_name(),
                    self.name,
                    raw.trim().chars().count()
                );
                TranscriptionResult::ok(normalise_transcript(&raw, &self.sentinel))
            }
            Ok(Err(e)) => TranscriptionResult::failed(e),
            Err(e) => TranscriptionResult::failed(ItemError::LocalOcr {
                detail: format!("OCR task failed: {e}"),
            }),
        }
    }
}
