//! Batch orchestration: resolve the input, run every image through the item
//! pipeline, and aggregate a [`BatchReport`].
//!
//! Images are processed one after another in file-name order. Fatal
//! problems (missing input, unwritable output directory, no provider) are
//! detected before the first image is touched; after that only per-item
//! failures are possible.

use crate::config::TranscriptionConfig;
use crate::error::{ItemError, ScanError};
use crate::output::{BatchReport, ItemOutcome};
use crate::pipeline::input::{resolve_images, BatchInput};
use crate::pipeline::item::ItemPipeline;
use crate::pipeline::persist::output_path_for;
use crate::prompts::TranscriptionPrompt;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Transcribe a single image or every supported image in a directory.
///
/// # Returns
/// `Ok(BatchReport)` once every image has been attempted, even if some
/// failed (check [`BatchReport::is_success`]).
///
/// # Errors
/// Returns `Err(ScanError)` only for run-level faults:
/// - input path missing or of the wrong kind
/// - directory not listable
/// - output directory not creatable or not writable
pub async fn run(
    input: &BatchInput,
    prompt: &TranscriptionPrompt,
    output_dir: Option<&Path>,
    pipeline: &ItemPipeline,
) -> Result<BatchReport, ScanError> {
    let total_start = Instant::now();
    info!("Starting run: {}", input.path().display());

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let images = resolve_images(input)?;
    let total = images.len();

    // ── Step 2: Resolve and prepare the output directory ─────────────────
    let out_dir = resolve_output_dir(input, output_dir);
    if let Some(explicit) = output_dir {
        tokio::fs::create_dir_all(explicit)
            .await
            .map_err(|source| ScanError::OutputDirUnwritable {
                path: explicit.to_path_buf(),
                source,
            })?;
    }
    ensure_writable(&out_dir)?;
    info!(
        "{} image(s) to transcribe, output to {}",
        total,
        out_dir.display()
    );

    let progress = pipeline.config().progress_callback.clone();
    if let Some(ref cb) = progress {
        cb.on_batch_start(total);
    }

    // ── Step 3: Process sequentially ─────────────────────────────────────
    let extension = pipeline.config().output_extension.clone();
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::with_capacity(total);
    let mut items = Vec::with_capacity(total);
    for (i, image) in images.into_iter().enumerate() {
        let index = i + 1;
        let name = image.display_name();
        debug!("[{}/{}] {}", index, total, name);
        if let Some(ref cb) = progress {
            cb.on_item_start(index, total, &name);
        }

        // a.jpg and a.jpeg both map to a.txt; only the first one may write it.
        let target = output_path_for(image.path(), &out_dir, &extension);
        let outcome = match claimed.get(&target) {
            Some(first) => duplicate_target(image.path(), target, first),
            None => {
                claimed.insert(target, image.path().to_path_buf());
                pipeline.process(image, prompt, &out_dir).await
            }
        };

        if let Some(ref cb) = progress {
            match &outcome.error {
                None => cb.on_item_complete(index, total, &name, outcome.chars),
                Some(e) => cb.on_item_error(index, total, &name, &e.to_string()),
            }
        }
        items.push(outcome);
    }

    // ── Step 4: Aggregate ────────────────────────────────────────────────
    let report = BatchReport::from_items(items, total_start.elapsed().as_millis() as u64);
    info!(
        "Run complete: {}/{} succeeded, {} failed, {}ms",
        report.succeeded, report.total, report.failed, report.total_duration_ms
    );
    if let Some(ref cb) = progress {
        cb.on_batch_complete(report.total, report.succeeded);
    }

    Ok(report)
}

/// Fail the run up front when nothing can be written to `dir`.
fn ensure_writable(dir: &Path) -> Result<(), ScanError> {
    tempfile::NamedTempFile::new_in(dir)
        .map(drop)
        .map_err(|source| ScanError::OutputDirUnwritable {
            path: dir.to_path_buf(),
            source,
        })
}

/// Failed outcome for an image whose output file an earlier image already
/// owns.
fn duplicate_target(image: &Path, target: PathBuf, first: &Path) -> ItemOutcome {
    let error = ItemError::Persist {
        path: target,
        detail: format!("output already written for {}", first.display()),
    };
    warn!("{}: {}", image.display(), error);
    let mut outcome = ItemOutcome::new(image);
    outcome.error = Some(error);
    outcome
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    input: &BatchInput,
    prompt: &TranscriptionPrompt,
    output_dir: Option<&Path>,
    pipeline: &ItemPipeline,
) -> Result<BatchReport, ScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(input, prompt, output_dir, pipeline))
}

/// Where output files go.
///
/// An explicit directory wins; otherwise the image's own directory in
/// single-file mode, or the input directory itself in directory mode.
pub fn resolve_output_dir(input: &BatchInput, explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    match input {
        BatchInput::File(path) => match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
        BatchInput::Directory(dir) => dir.clone(),
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ScanError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScanError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`OPENAI_API_KEY`** present → OpenAI with the configured model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(
    config: &TranscriptionConfig,
) -> Result<Arc<dyn LLMProvider>, ScanError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScanError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
