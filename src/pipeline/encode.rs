//! Image encoding: raw scan bytes → base64 `ImageData` for the VLM request.
//!
//! Scans are sent as their original bytes rather than re-encoded: a JPEG is
//! already compressed, and re-encoding would only add artefacts to faint
//! handwriting. `detail: "high"` asks GPT-4-class models for the full tile
//! budget so small print stays legible.

use crate::error::ItemError;
use crate::pipeline::input::ImageRef;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Encode an image for a multimodal chat request.
pub fn encode_image(image: &ImageRef) -> Result<ImageData, ItemError> {
    let bytes = image.bytes()?;
    let mime = image.format()?.to_mime_type();

    let b64 = STANDARD.encode(bytes);
    debug!(
        "Encoded {} ({}) → {} bytes base64",
        image.display_name(),
        mime,
        b64.len()
    );

    Ok(ImageData::new(b64, mime).with_detail("high"))
}
