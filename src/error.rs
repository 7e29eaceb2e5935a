//! Error types for the edgequake-scan2txt library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScanError`] — **Fatal**: the run cannot proceed at all (input path
//!   missing, prompt unreadable, provider not configured, output directory not
//!   writable). Returned as `Err(ScanError)` before any image is processed.
//!
//! * [`ItemError`] — **Non-fatal**: a single image failed (corrupt JPEG,
//!   classifier fault, rejected API call) but every other image is fine.
//!   Stored inside [`crate::output::ItemOutcome`] so one bad scan never
//!   aborts the rest of a directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-scan2txt library.
///
/// Item-level failures use [`ItemError`] and are stored in
/// [`crate::output::ItemOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input path does not exist.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// `--image-file` pointed at something that is not a regular file.
    #[error("'{path}' is not a file")]
    NotAFile { path: PathBuf },

    /// `--image-dir` pointed at something that is not a directory.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// The image directory exists but could not be listed.
    #[error("Failed to read directory '{path}': {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Prompt errors ─────────────────────────────────────────────────────
    /// Prompt file missing, unreadable, or not UTF-8.
    #[error("Failed to read prompt file '{path}': {source}")]
    PromptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Prompt file contained only whitespace.
    #[error("Prompt file '{path}' is empty")]
    PromptEmpty { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created or is not writable.
    #[error("Cannot write to output directory '{path}': {source}")]
    OutputDirUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Engine / classifier setup ─────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The local classifier model could not be loaded.
    #[error("Failed to load classifier model '{path}': {detail}")]
    ClassifierLoad { path: PathBuf, detail: String },

    /// The local OCR model directory is incomplete or could not be loaded.
    #[error("Failed to load local OCR model '{path}': {detail}")]
    OcrModelLoad { path: PathBuf, detail: String },

    /// A label map file could not be parsed.
    #[error("Invalid label map '{path}': {detail}")]
    InvalidLabelMap { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Run outcome ───────────────────────────────────────────────────────
    /// Some images succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::BatchReport::into_result`] when the
    /// caller wants to treat any item failure as an error.
    #[error("{failed}/{total} images failed during transcription")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        total: usize,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// Stored in [`crate::output::ItemOutcome`] and in
/// [`crate::output::TranscriptionResult`] when a stage fails. The batch
/// always continues with the next image.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    /// Unsupported extension, unreadable file, or undecodable raster data.
    #[error("invalid image '{path}': {detail}")]
    InvalidImage { path: PathBuf, detail: String },

    /// The local classifier failed on a decodable image.
    #[error("classification failed: {detail}")]
    Classification { detail: String },

    /// The router selected an engine that is not registered or not usable.
    #[error("transcription engine '{engine}' is unavailable: {detail}")]
    EngineUnavailable { engine: String, detail: String },

    /// The on-device OCR model failed on a decodable image.
    #[error("local OCR failed: {detail}")]
    LocalOcr { detail: String },

    /// The remote API rejected the credentials (401/403).
    #[error("authentication failed: {detail}")]
    Authentication { detail: String },

    /// The model does not exist or does not accept image input (404).
    #[error("model unavailable: {detail}")]
    ModelUnavailable { detail: String },

    /// The remote API rejected the request payload (400).
    #[error("malformed request: {detail}")]
    MalformedRequest { detail: String },

    /// Network failure, timeout, rate limit or 5xx; safe to retry later.
    #[error("transient remote failure: {detail}")]
    TransientRemote { detail: String },

    /// The remote call itself signalled that no content was produced.
    ///
    /// Never used for a legitimate "no legible text" answer; that is a
    /// successful result carrying the sentinel string.
    #[error("remote returned no content: {detail}")]
    EmptyOutput { detail: String },

    /// The transcription could not be written to disk.
    #[error("failed to write '{path}': {detail}")]
    Persist { path: PathBuf, detail: String },
}

impl ItemError {
    /// Machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::InvalidImage { .. } => "invalid_image",
            ItemError::Classification { .. } => "classification",
            ItemError::EngineUnavailable { .. } => "engine_unavailable",
            ItemError::LocalOcr { .. } => "local_ocr",
            ItemError::Authentication { .. } => "authentication",
            ItemError::ModelUnavailable { .. } => "model_unavailable",
            ItemError::MalformedRequest { .. } => "malformed_request",
            ItemError::TransientRemote { .. } => "transient_remote",
            ItemError::EmptyOutput { .. } => "empty_output",
            ItemError::Persist { .. } => "persist",
        }
    }

    /// Whether a caller-level retry of the same item could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ItemError::TransientRemote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = ScanError::PartialFailure {
            succeeded: 9,
            failed: 1,
            total: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/10"), "got: {msg}");
    }

    #[test]
    fn provider_not_configured_display() {
        let e = ScanError::ProviderNotConfigured {
            provider: "openai".into(),
            hint: "Set OPENAI_API_KEY".into(),
        };
        assert!(e.to_string().contains("openai"));
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn item_error_kinds_are_distinct() {
        let errors = [
            ItemError::InvalidImage {
                path: "a.jpg".into(),
                detail: "truncated".into(),
            },
            ItemError::Classification { detail: "x".into() },
            ItemError::EngineUnavailable {
                engine: "local_ocr".into(),
                detail: "x".into(),
            },
            ItemError::LocalOcr { detail: "x".into() },
            ItemError::Authentication { detail: "x".into() },
            ItemError::ModelUnavailable { detail: "x".into() },
            ItemError::MalformedRequest { detail: "x".into() },
            ItemError::TransientRemote { detail: "x".into() },
            ItemError::EmptyOutput { detail: "x".into() },
            ItemError::Persist {
                path: "a.txt".into(),
                detail: "x".into(),
            },
        ];
        let mut kinds: Vec<&str> = errors.iter().map(ItemError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(ItemError::TransientRemote { detail: "429".into() }.is_retryable());
        assert!(!ItemError::Authentication { detail: "401".into() }.is_retryable());
        assert!(!ItemError::EmptyOutput { detail: "x".into() }.is_retryable());
    }

    #[test]
    fn item_error_serialises_with_kind_tag() {
        let e = ItemError::ModelUnavailable {
            detail: "no vision".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("\"kind\":\"model_unavailable\""), "got: {json}");
    }
}
