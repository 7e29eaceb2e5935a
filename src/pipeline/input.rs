//! Input resolution: turn a user-supplied file or directory into `ImageRef`s.
//!
//! Directory entries are sorted by file name so that logs, progress output and
//! test expectations are identical from run to run regardless of the order
//! the platform's `readdir` happens to return.

use crate::error::{ItemError, ScanError};
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Extensions accepted as input images (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// What the caller asked to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchInput {
    /// A single image file.
    File(PathBuf),
    /// Every supported image directly inside a directory.
    Directory(PathBuf),
}

impl BatchInput {
    /// The path the caller supplied.
    pub fn path(&self) -> &Path {
        match self {
            BatchInput::File(p) | BatchInput::Directory(p) => p,
        }
    }
}

/// One input image.
///
/// Bytes are loaded lazily by [`ImageRef::load`] and shared through an `Arc`
/// so the ref can be cloned into blocking tasks without copying the payload.
#[derive(Debug, Clone)]
pub struct ImageRef {
    path: PathBuf,
    bytes: Option<Arc<[u8]>>,
}

impl ImageRef {
    /// Reference an image on disk without reading it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bytes: None,
        }
    }

    /// Build an already-loaded ref from in-memory bytes.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            bytes: Some(bytes.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for log lines; falls back to the full path.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Read the file contents into memory (no-op when already loaded).
    pub async fn load(self) -> Result<Self, ItemError> {
        if self.bytes.is_some() {
            return Ok(self);
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ItemError::InvalidImage {
                path: self.path.clone(),
                detail: format!("cannot read file: {e}"),
            })?;
        Ok(Self {
            bytes: Some(bytes.into()),
            ..self
        })
    }

    /// Raw bytes; errors when [`ImageRef::load`] has not run.
    pub fn bytes(&self) -> Result<&[u8], ItemError> {
        self.bytes.as_deref().ok_or_else(|| ItemError::InvalidImage {
            path: self.path.clone(),
            detail: "image bytes not loaded".into(),
        })
    }

    /// Raster format sniffed from the magic bytes.
    pub fn format(&self) -> Result<ImageFormat, ItemError> {
        image::guess_format(self.bytes()?).map_err(|e| ItemError::InvalidImage {
            path: self.path.clone(),
            detail: format!("unrecognised image format: {e}"),
        })
    }

    /// Fully decode the raster. This is the decodability check of the item
    /// pipeline and the entry point for local classifiers.
    pub fn decode(&self) -> Result<DynamicImage, ItemError> {
        image::load_from_memory(self.bytes()?).map_err(|e| ItemError::InvalidImage {
            path: self.path.clone(),
            detail: format!("cannot decode image: {e}"),
        })
    }

    /// Reject files whose extension is not in [`SUPPORTED_EXTENSIONS`].
    pub fn check_extension(&self) -> Result<(), ItemError> {
        if is_supported_image(&self.path) {
            Ok(())
        } else {
            Err(ItemError::InvalidImage {
                path: self.path.clone(),
                detail: format!(
                    "unsupported extension (supported: {})",
                    SUPPORTED_EXTENSIONS.join(", ")
                ),
            })
        }
    }
}

/// True when the path has a supported image extension (case-insensitive).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

/// Validate a [`BatchInput`] and expand it to the images to process.
///
/// A single file is returned as-is even when its extension is unsupported;
/// the item pipeline reports that as a per-item failure.
pub fn resolve_images(input: &BatchInput) -> Result<Vec<ImageRef>, ScanError> {
    let path = input.path();
    if !path.exists() {
        return Err(ScanError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    match input {
        BatchInput::File(p) => {
            if !p.is_file() {
                return Err(ScanError::NotAFile { path: p.clone() });
            }
            Ok(vec![ImageRef::new(p.clone())])
        }
        BatchInput::Directory(dir) => {
            if !dir.is_dir() {
                return Err(ScanError::NotADirectory { path: dir.clone() });
            }
            Ok(list_images(dir)?.into_iter().map(ImageRef::new).collect())
        }
    }
}

/// List supported images directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let unreadable = |source| ScanError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if !path.is_file() {
            continue;
        }
        if is_supported_image(&path) {
            images.push(path);
        } else {
            debug!("Skipping unsupported file: {}", path.display());
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}
