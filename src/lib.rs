//! # edgequake-scan2txt
//!
//! Transcribe scanned document images to plain text with a local document
//! classifier in front of a remote Vision Language Model (VLM).
//!
//! Each scan is classified on-device into a coarse document type
//! (handwritten, typewritten, other document type, undetermined), routed to a
//! transcription engine by a label → engine table, transcribed, and written
//! next to the scan (or into an output directory) as `<stem>.txt`. A failure
//! on one scan is recorded in the batch report and never stops the others.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image file / directory
//!  │
//!  ├─ 1. Input     enumerate .jpg/.jpeg, sorted by file name
//!  ├─ 2. Classify  DiT (RVL-CDIP) on ONNX Runtime, spawn_blocking
//!  ├─ 3. Route     CoarseLabel → EngineKind table
//!  ├─ 4. VLM       prompt + base64 image → text (gpt-4.1-mini / claude / …)
//!  ├─ 5. Persist   atomic write of <stem>.txt
//!  └─ 6. Report    per-item outcomes + success/failure counts
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_scan2txt::{
//!     batch, BatchInput, ItemPipeline, TranscriptionConfig, TranscriptionPrompt, Unclassified,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = TranscriptionConfig::default();
//!     let prompt = TranscriptionPrompt::builtin(&config.no_text_sentinel);
//!     let pipeline = ItemPipeline::from_config(config, Arc::new(Unclassified)).await?;
//!
//!     let input = BatchInput::Directory("scans/".into());
//!     let report = batch::run(&input, &prompt, None, &pipeline).await?;
//!     eprintln!("{}/{} transcribed", report.succeeded, report.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2txt` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `dit`   | on      | ONNX Runtime document classifier (`classify::dit`) |
//! | `trocr` | off     | TrOCR handwriting engine (`pipeline::trocr`), implies `dit` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{resolve_output_dir, resolve_provider, run, run_sync};
pub use classify::{
    ClassificationResult, CoarseLabel, DocumentClassifier, LabelMap, LabelScore, ModelClassifier,
    ScoreModel, Unclassified, MIN_CONFIDENCE_SCORE,
};
pub use config::{TranscriptionConfig, TranscriptionConfigBuilder, DEFAULT_MODEL};
pub use error::{ItemError, ScanError};
pub use output::{BatchReport, ItemOutcome, TranscriptionResult};
pub use pipeline::engine::{EngineSet, TranscriptionEngine, TranscriptionRequest};
pub use pipeline::input::{BatchInput, ImageRef};
pub use pipeline::item::ItemPipeline;
pub use pipeline::llm::{ProviderBackend, RemoteVisionEngine, VisionBackend, VisionReply};
pub use pipeline::local::{LocalOcrEngine, OcrModel};
pub use pipeline::route::{EngineKind, EngineSelection, RoutingPolicy};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{TranscriptionPrompt, DEFAULT_NO_TEXT_SENTINEL};
