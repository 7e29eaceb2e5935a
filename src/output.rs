//! Result types produced by the engines, the item pipeline and the batch
//! orchestrator.

use crate::classify::ClassificationResult;
use crate::error::{ItemError, ScanError};
use crate::pipeline::route::EngineKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What an engine produced for one image.
///
/// `succeeded == true` implies `error == None`; a failed result carries the
/// categorised failure and an empty `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub succeeded: bool,
    pub error: Option<ItemError>,
    /// Prompt tokens reported by the provider (0 for local engines).
    pub input_tokens: usize,
    /// Completion tokens reported by the provider.
    pub output_tokens: usize,
}

impl TranscriptionResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            succeeded: true,
            error: None,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub fn failed(error: ItemError) -> Self {
        Self {
            text: String::new(),
            succeeded: false,
            error: Some(error),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub fn with_usage(mut self, input_tokens: usize, output_tokens: usize) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    /// View the result as a `Result` for `?`-style handling.
    pub fn into_result(self) -> Result<Self, ItemError> {
        match self.error.clone() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// Everything the pipeline learned about one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// The input image.
    pub image: PathBuf,
    /// Path of the written `.txt` file; `None` when the item failed.
    pub output: Option<PathBuf>,
    /// Classification, when the item got that far.
    pub classification: Option<ClassificationResult>,
    /// Engine selected by the router, when the item got that far.
    pub engine: Option<EngineKind>,
    /// Character count of the persisted transcription.
    pub chars: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub error: Option<ItemError>,
}

impl ItemOutcome {
    /// A fresh outcome for `image` with nothing recorded yet.
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            output: None,
            classification: None,
            engine: None,
            chars: 0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.output.is_some()
    }
}

/// Summary of a batch run. Items appear in processing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<ItemOutcome>,
    pub total_duration_ms: u64,
}

impl BatchReport {
    /// Build a report from per-item outcomes, computing the counters.
    pub fn from_items(items: Vec<ItemOutcome>, total_duration_ms: u64) -> Self {
        let succeeded = items.iter().filter(|i| i.succeeded()).count();
        Self {
            total: items.len(),
            succeeded,
            failed: items.len() - succeeded,
            items,
            total_duration_ms,
        }
    }

    /// True when no item failed (an empty batch counts as success).
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Failed items only.
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|i| !i.succeeded())
    }

    /// Total prompt + completion tokens across all items.
    pub fn total_tokens(&self) -> (u64, u64) {
        self.items.iter().fold((0, 0), |(i, o), item| {
            (i + item.input_tokens as u64, o + item.output_tokens as u64)
        })
    }

    /// Turn a report with failures into [`ScanError::PartialFailure`].
    pub fn into_result(self) -> Result<Self, ScanError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ScanError::PartialFailure {
                succeeded: self.succeeded,
                failed: self.failed,
                total: self.total,
            })
        }
    }
}
