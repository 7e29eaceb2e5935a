//! Transcription prompts.
//!
//! The prompt is resolved once per run (built-in default or a caller file)
//! and shared read-only by every image. The built-in prompt tells the model
//! to answer with the sentinel string when a page has no legible text, so an
//! empty page is a successful transcription rather than an API failure.

use crate::error::ScanError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Text written for a document with no legible content.
pub const DEFAULT_NO_TEXT_SENTINEL: &str = "[NO LEGIBLE TEXT]";

/// Build the default transcription prompt for the given sentinel.
pub fn default_prompt(sentinel: &str) -> String {
    format!(
        r#"You are an expert archivist transcribing a scanned document image.

Follow these rules precisely:

1. Transcribe ALL visible text exactly as written, handwritten or printed.
2. Preserve the reading order a human would follow, and keep line breaks
   and paragraph breaks where they appear on the page.
3. Keep original spelling, punctuation, capitalisation and abbreviations.
   Do NOT correct, modernise, translate or summarise.
4. Mark a word you cannot read with [illegible]; mark a word you are unsure
   of with [?] directly after it.
5. Ignore stamps, decorations and marks that carry no text.
6. Output ONLY the transcription as plain text: no commentary, no Markdown,
   no code fences.
7. If the image contains no legible text at all, answer with exactly:
{sentinel}"#
    )
}

/// Instruction text sent with every image of a run.
///
/// Cheap to clone: the text is shared behind an `Arc`.
#[derive(Clone, PartialEq, Eq)]
pub struct TranscriptionPrompt {
    text: Arc<str>,
}

impl TranscriptionPrompt {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self { text: text.into() }
    }

    /// The built-in prompt.
    pub fn builtin(sentinel: &str) -> Self {
        Self::new(default_prompt(sentinel))
    }

    /// Read a UTF-8 prompt file. Surrounding whitespace is trimmed; an empty
    /// file is rejected.
    pub fn from_file(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScanError::PromptUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ScanError::PromptEmpty {
                path: path.to_path_buf(),
            });
        }
        info!("Loaded prompt from {}", path.display());
        Ok(Self::new(text))
    }

    /// Caller file when given, built-in prompt otherwise.
    pub fn resolve(path: Option<&Path>, sentinel: &str) -> Result<Self, ScanError> {
        let prompt = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                info!("No prompt file given, using the built-in prompt");
                Self::builtin(sentinel)
            }
        };
        debug!("Prompt preview: {}", prompt.preview(100));
        Ok(prompt)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// First `max_chars` characters, for logs.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.text.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }
}

impl fmt::Debug for TranscriptionPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionPrompt")
            .field("chars", &self.text.chars().count())
            .field("preview", &self.preview(40))
            .finish()
    }
}
