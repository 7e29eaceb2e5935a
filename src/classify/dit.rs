//! ONNX Runtime backend for the Document Image Transformer (DiT) classifier.
//!
//! Expects an ONNX export of `microsoft/dit-base-finetuned-rvlcdip` (or any
//! image classifier with the same I/O contract): a single `[1, 3, H, W]` f32
//! input and a `[1, N]` logits output, where `N` equals the label count.
//!
//! The session is wrapped in a `Mutex` because `Session::run` needs `&mut`;
//! the pipeline classifies one image at a time so the lock is never contended.

use super::{LabelScore, ScoreModel, RVL_CDIP_LABELS};
use crate::error::ScanError;
use image::imageops::FilterType;
use image::DynamicImage;
use ort::{inputs, session::Session, value::Value};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Square input resolution of the DiT base model.
pub const DIT_INPUT_SIZE: u32 = 224;

/// BEiT-style normalisation used by DiT: `(x / 255 - 0.5) / 0.5`.
const NORM_MEAN: f32 = 0.5;
const NORM_STD: f32 = 0.5;
/// Bicubic, as in the model's reference image processor.
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// DiT image classifier running on ONNX Runtime.
pub struct DitModel {
    session: Mutex<Session>,
    labels: Vec<String>,
    input_size: u32,
    name: String,
}

impl std::fmt::Debug for DitModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DitModel")
            .field("name", &self.name)
            .field("labels", &self.labels.len())
            .field("input_size", &self.input_size)
            .finish()
    }
}

impl DitModel {
    /// Load the model with the RVL-CDIP label set.
    pub fn from_file(path: &Path) -> Result<Self, ScanError> {
        Self::with_labels(
            path,
            RVL_CDIP_LABELS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Load the model with a custom label vocabulary (logit order).
    pub fn with_labels(path: &Path, labels: Vec<String>) -> Result<Self, ScanError> {
        let load_err = |detail: String| ScanError::ClassifierLoad {
            path: path.to_path_buf(),
            detail,
        };
        if labels.is_empty() {
            return Err(load_err("label list is empty".into()));
        }
        if !path.is_file() {
            return Err(load_err("model file not found".into()));
        }

        let session = Session::builder()
            .map_err(|e| load_err(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| load_err(e.to_string()))?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dit".to_string());
        info!(
            "Loaded classifier '{}' ({} labels) from {}",
            name,
            labels.len(),
            path.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            labels,
            input_size: DIT_INPUT_SIZE,
            name,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl ScoreModel for DitModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn label_scores(&self, image: &DynamicImage) -> Result<Vec<LabelScore>, String> {
        let size = self.input_size;
        let pixels = preprocess(image, size);
        let input = Value::from_array((
            [1_usize, 3, size as usize, size as usize],
            pixels.into_boxed_slice(),
        ))
        .map_err(|e| format!("failed to build input tensor: {e}"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| "classifier session lock poisoned".to_string())?;
        let outputs = session
            .run(inputs![input])
            .map_err(|e| format!("inference failed: {e}"))?;
        let (shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("unexpected output tensor: {e}"))?;
        debug!("Classifier output shape {:?}", shape);

        if logits.len() != self.labels.len() {
            return Err(format!(
                "model produced {} logits for {} labels",
                logits.len(),
                self.labels.len()
            ));
        }

        Ok(self
            .labels
            .iter()
            .zip(softmax(logits))
            .map(|(label, score)| LabelScore {
                label: label.clone(),
                score,
            })
            .collect())
    }
}

/// Resize to `size`×`size` RGB and lay out as normalised CHW f32.
pub fn preprocess(image: &DynamicImage, size: u32) -> Vec<f32> {
    normalised_chw(image, size, RESIZE_FILTER)
}

/// Resize to `size`×`size` and lay out as CHW f32 in `[-1, 1]`, the input
/// contract shared by the BEiT/ViT-family encoders.
pub fn normalised_chw(image: &DynamicImage, size: u32, filter: FilterType) -> Vec<f32> {
    let rgb = image.resize_exact(size, size, filter).to_rgb8();
    let plane = (size * size) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (pixel[c] as f32 / 255.0 - NORM_MEAN) / NORM_STD;
        }
    }
    out
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}
