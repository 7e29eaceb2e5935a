//! Output persistence: one text file per image.
//!
//! The output name is the input file stem plus the configured extension, so
//! `scan_01.jpg` becomes `scan_01.txt`. Writes go to a temp file in the
//! target directory and are then renamed over the destination: an existing
//! output is replaced wholesale and a crash never leaves a half-written file.

use crate::error::ItemError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Output path for `image` inside `output_dir`.
pub fn output_path_for(image: &Path, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let mut name = stem;
    name.push(".");
    name.push(extension);
    output_dir.join(name)
}

/// Atomically write `text` (UTF-8) to `path`, replacing any existing file.
pub fn write_transcription(path: &Path, text: &str) -> Result<(), ItemError> {
    let persist_err = |detail: String| ItemError::Persist {
        path: path.to_path_buf(),
        detail,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| persist_err(format!("cannot create temp file: {e}")))?;
    tmp.write_all(text.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| persist_err(format!("write failed: {e}")))?;
    tmp.persist(path)
        .map_err(|e| persist_err(format!("rename failed: {}", e.error)))?;

    debug!("Wrote {} ({} bytes)", path.display(), text.len());
    Ok(())
}

/// Async wrapper: file I/O runs on the blocking pool.
pub async fn write_transcription_async(path: PathBuf, text: String) -> Result<(), ItemError> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_transcription(&target, &text))
        .await
        .map_err(|e| ItemError::Persist {
            path,
            detail: format!("write task failed: {e}"),
        })?
}
