//! Base64 snapshot decoding and frame encoding.

use crate::error::RecognitionError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// Standard alphabet, accepting input with or without `=` padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const JPEG_QUALITY: u8 = 80;

/// Strip a `data:image/...;base64,` prefix, keeping only the payload.
fn strip_data_url(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

/// Decode an uploaded frame: optional data-URL prefix, base64, then any
/// image format the decoder recognizes.
pub fn decode_snapshot(data: &str) -> Result<RgbImage, RecognitionError> {
    let payload: String = strip_data_url(data.trim())
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(RecognitionError::FrameDecode("empty frame data".into()));
    }

    let bytes = LENIENT
        .decode(payload.as_bytes())
        .map_err(|e| RecognitionError::FrameDecode(format!("invalid base64: {e}")))?;

    let image = image::load_from_memory(&bytes)
        .map_err(|e| RecognitionError::FrameDecode(e.to_string()))?
        .into_rgb8();

    tracing::debug!(width = image.width(), height = image.height(), "decoded snapshot");
    Ok(image)
}

/// Encode a frame as base64 JPEG for embedding in a report line.
pub fn encode_jpeg_base64(image: &RgbImage) -> Result<String, image::ImageError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(image)?;
    Ok(STANDARD.encode(jpeg))
}
