//! Pipeline stages for scan transcription.
//!
//! Each submodule implements one step; [`item`] composes them for a single
//! image.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ classify ──▶ route ──▶ engine ──▶ persist
//! (paths)   (local)      (table)   (encode+llm) (<stem>.txt)
//! ```
//!
//! 1. [`input`]   — validate the user path and enumerate `.jpg`/`.jpeg` files
//! 2. [`route`]   — pure label → engine decision
//! 3. [`engine`]  — the `TranscriptionEngine` trait and the engine registry
//! 4. [`encode`]  — base64-wrap the scan bytes for the multimodal request
//! 5. [`llm`]     — the remote VLM engine and provider error mapping
//! 6. [`local`]   — the on-device OCR engine (`trocr` feature for the model)
//! 7. [`persist`] — output naming and atomic writes
//! 8. [`item`]    — the per-image pipeline with failure isolation

pub mod encode;
pub mod engine;
pub mod input;
pub mod item;
pub mod llm;
pub mod local;
pub mod persist;
pub mod route;
#[cfg(feature = "trocr")]
pub mod trocr;
