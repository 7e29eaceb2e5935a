//! TrOCR handwriting recognition on ONNX Runtime.
//!
//! Loads an `optimum-cli export onnx` export of
//! `microsoft/trocr-base-handwritten` from one directory:
//!
//! ```text
//! <dir>/encoder_model.onnx   pixel_values [1,3,384,384] → last_hidden_state
//! <dir>/decoder_model.onnx   input_ids + encoder_hidden_states → logits
//! <dir>/tokenizer.json
//! ```
//!
//! The whole scan is encoded once and decoded greedily. Sessions sit behind
//! `Mutex` because `Session::run` needs `&mut`.

use crate::classify::dit::normalised_chw;
use crate::error::ScanError;
use crate::pipeline::local::OcrModel;
use image::imageops::FilterType;
use image::DynamicImage;
use ort::{inputs, session::Session, value::Value};
use std::path::Path;
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Square input resolution of the TrOCR base encoder.
pub const TROCR_INPUT_SIZE: u32 = 384;

/// Upper bound on generated tokens per image.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 128;

/// TrOCR checkpoints start decoding from `</s>` and stop on it.
const DECODER_START_ID: u32 = 2;
const EOS_ID: u32 = 2;

const ENCODER_FILE: &str = "encoder_model.onnx";
const DECODER_FILE: &str = "decoder_model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// TrOCR encoder/decoder pair with its tokenizer.
pub struct TrOcrModel {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    max_new_tokens: usize,
    name: String,
}

impl std::fmt::Debug for TrOcrModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrOcrModel")
            .field("name", &self.name)
            .field("max_new_tokens", &self.max_new_tokens)
            .finish()
    }
}

impl TrOcrModel {
    pub fn from_dir(dir: &Path) -> Result<Self, ScanError> {
        let encoder = load_session(&dir.join(ENCODER_FILE))?;
        let decoder = load_session(&dir.join(DECODER_FILE))?;

        let tokenizer_path = dir.join(TOKENIZER_FILE);
        let tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(|e| ScanError::OcrModelLoad {
                path: tokenizer_path.clone(),
                detail: e.to_string(),
            })?;

        let name = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "trocr".to_string());
        info!("Loaded local OCR model '{}' from {}", name, dir.display());

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            name,
        })
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens.max(1);
        self
    }

    /// Run the encoder once; returns the hidden-state shape and data.
    fn encode(&self, image: &DynamicImage) -> Result<(Vec<usize>, Vec<f32>), String> {
        let size = TROCR_INPUT_SIZE as usize;
        // ViTImageProcessor resamples bilinearly.
        let pixels = normalised_chw(image, TROCR_INPUT_SIZE, FilterType::Triangle);
        let input = Value::from_array(([1_usize, 3, size, size], pixels.into_boxed_slice()))
            .map_err(|e| format!("failed to build input tensor: {e}"))?;

        let mut encoder = self
            .encoder
            .lock()
            .map_err(|_| "encoder session lock poisoned".to_string())?;
        let outputs = encoder
            .run(inputs![input])
            .map_err(|e| format!("encoder failed: {e}"))?;
        let (shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("unexpected encoder output: {e}"))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok((dims, hidden.to_vec()))
    }
}

impl OcrModel for TrOcrModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognise(&self, image: &DynamicImage) -> Result<String, String> {
        let (dims, hidden) = self.encode(image)?;
        debug!("TrOCR encoder output {:?}", dims);

        let mut decoder = self
            .decoder
            .lock()
            .map_err(|_| "decoder session lock poisoned".to_string())?;
        let ids = greedy_decode(DECODER_START_ID, EOS_ID, self.max_new_tokens, |prefix| {
            let input_ids: Vec<i64> = prefix.iter().map(|&t| t as i64).collect();
            let ids_value =
                Value::from_array(([1_usize, input_ids.len()], input_ids.into_boxed_slice()))
                    .map_err(|e| format!("failed to build input_ids: {e}"))?;
            let hidden_value = Value::from_array((dims.clone(), hidden.clone().into_boxed_slice()))
                .map_err(|e| format!("failed to build encoder_hidden_states: {e}"))?;

            let outputs = decoder
                .run(inputs![
                    "input_ids" => ids_value,
                    "encoder_hidden_states" => hidden_value
                ])
                .map_err(|e| format!("decoder failed: {e}"))?;
            let (shape, logits) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| format!("unexpected decoder output: {e}"))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            last_position(&dims, logits)
        })?;
        debug!("TrOCR generated {} tokens", ids.len());

        self.tokenizer
            .decode(&ids, true)
            .map_err(|e| format!("failed to detokenize: {e}"))
    }
}

fn load_session(path: &Path) -> Result<Session, ScanError> {
    let load_err = |detail: String| ScanError::OcrModelLoad {
        path: path.to_path_buf(),
        detail,
    };
    if !path.is_file() {
        return Err(load_err("model file not found".into()));
    }
    Session::builder()
        .map_err(|e| load_err(e.to_string()))?
        .commit_from_file(path)
        .map_err(|e| load_err(e.to_string()))
}

/// Greedy autoregressive decoding.
///
/// `step` maps the current prefix (start token included) to next-token
/// logits. Stops on `eos` or after `max_new` tokens; the returned ids exclude
/// the start token and `eos`.
pub fn greedy_decode<F>(start: u32, eos: u32, max_new: usize, mut step: F) -> Result<Vec<u32>, String>
where
    F: FnMut(&[u32]) -> Result<Vec<f32>, String>,
{
    let mut ids = vec![start];
    for _ in 0..max_new {
        let logits = step(&ids)?;
        let next = argmax(&logits).ok_or_else(|| "decoder produced no logits".to_string())?;
        if next == eos {
            break;
        }
        ids.push(next);
    }
    Ok(ids.split_off(1))
}

/// Index of the largest value; NaNs are skipped.
fn argmax(values: &[f32]) -> Option<u32> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i as u32)
}

/// Logits of the last sequence position from a `[1, seq, vocab]` tensor.
fn last_position(dims: &[usize], logits: &[f32]) -> Result<Vec<f32>, String> {
    let (seq, vocab) = match dims {
        [1, seq, vocab] if *seq > 0 && *vocab > 0 => (*seq, *vocab),
        other => return Err(format!("unexpected logits shape {other:?}")),
    };
    let start = (seq - 1) * vocab;
    logits
        .get(start..start + vocab)
        .map(<[f32]>::to_vec)
        .ok_or_else(|| format!("logits buffer shorter than shape {dims:?}"))
}
