//! Loading the registered reference photo and its embedding.

use crate::error::RecognitionError;
use image::RgbImage;
use rollcall_core::{Embedding, FaceEmbedder, Observation};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on a downloaded reference image.
const MAX_REFERENCE_BYTES: u64 = 20 * 1024 * 1024;

/// Where the reference photo lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSource {
    Url(String),
    Path(PathBuf),
}

impl ReferenceSource {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim_start().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(raw.trim().to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }
}

impl std::fmt::Display for ReferenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetch the raw bytes of the reference image.
pub fn fetch_bytes(source: &ReferenceSource, http_timeout: Duration) -> Result<Vec<u8>, RecognitionError> {
    match source {
        ReferenceSource::Url(url) => download(url, http_timeout),
        ReferenceSource::Path(path) => std::fs::read(path).map_err(|source| RecognitionError::ReferenceRead {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn download(url: &str, timeout: Duration) -> Result<Vec<u8>, RecognitionError> {
    tracing::info!(url, "downloading reference image");
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();

    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => RecognitionError::ReferenceDownload(format!("HTTP {code}")),
        ureq::Error::Transport(t) => RecognitionError::ReferenceDownload(t.to_string()),
    })?;

    let bytes = read_capped(response.into_reader(), MAX_REFERENCE_BYTES)?;
    tracing::debug!(bytes = bytes.len(), "reference image downloaded");
    Ok(bytes)
}

/// Read a response body, failing once it grows past `limit` bytes.
fn read_capped(reader: impl Read, limit: u64) -> Result<Vec<u8>, RecognitionError> {
    let mut bytes = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| RecognitionError::ReferenceDownload(format!("reading body: {e}")))?;
    if bytes.len() as u64 > limit {
        return Err(RecognitionError::ReferenceDownload(format!(
            "reference image exceeds {} MiB",
            limit / (1024 * 1024)
        )));
    }
    Ok(bytes)
}

/// Decode reference bytes of any supported format to RGB.
pub fn decode_reference(bytes: &[u8]) -> Result<RgbImage, RecognitionError> {
    image::load_from_memory(bytes)
        .map(|img| img.into_rgb8())
        .map_err(RecognitionError::ReferenceDecode)
}

/// Fetch, decode and embed the reference photo, keeping the first face.
pub fn load_reference<E: FaceEmbedder + ?Sized>(
    source: &ReferenceSource,
    embedder: &mut E,
    http_timeout: Duration,
) -> Result<Embedding, RecognitionError> {
    let bytes = fetch_bytes(source, http_timeout)?;
    let image = decode_reference(&bytes)?;

    match embedder.observe(&image)? {
        Observation::Face { face, embedding } => {
            tracing::info!(
                confidence = face.confidence,
                width = image.width(),
                height = image.height(),
                "reference face encoded"
            );
            Ok(embedding)
        }
        Observation::FaceWithoutEmbedding(_) => Err(RecognitionError::ReferenceNoEmbedding),
        Observation::NoFace => Err(RecognitionError::ReferenceNoFace),
    }
}
