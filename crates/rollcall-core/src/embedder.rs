//! The seam between image sources and the face models.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Observation;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Turns an image into at most one face embedding.
pub trait FaceEmbedder {
    /// Inspect `image` and report its highest-confidence face.
    fn observe(&mut self, image: &RgbImage) -> Result<Observation, EmbedError>;
}

/// SCRFD detection followed by ArcFace embedding of the best face.
pub struct OnnxEmbedder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEmbedder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EmbedError> {
        let detector = FaceDetector::load(&scrfd_model_path(model_dir))?;
        let recognizer = FaceRecognizer::load(&arcface_model_path(model_dir))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEmbedder for OnnxEmbedder {
    fn observe(&mut self, image: &RgbImage) -> Result<Observation, EmbedError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.into_iter().next() else {
            return Ok(Observation::NoFace);
        };

        match self.recognizer.extract(image, &face) {
            Ok(embedding) => Ok(Observation::Face { face, embedding }),
            Err(RecognizerError::NoLandmarks) => {
                tracing::debug!(confidence = face.confidence, "face has no landmarks, cannot embed");
                Ok(Observation::FaceWithoutEmbedding(face))
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub fn scrfd_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join(SCRFD_MODEL_FILE)
}

pub fn arcface_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join(ARCFACE_MODEL_FILE)
}

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = std::env::var_os("HOME").unwrap_or_else(|| "/tmp".into());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("rollcall").join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths() {
        let dir = Path::new("/opt/models");
        assert_eq!(scrfd_model_path(dir), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(arcface_model_path(dir), PathBuf::from("/opt/models/w600k_r50.onnx"));
    }

    #[test]
    fn test_load_missing_models() {
        let err = OnnxEmbedder::load(Path::new("/nonexistent/rollcall-models"))
            .err()
            .expect("load should fail without model files");
        assert!(matches!(err, EmbedError::Detector(DetectorError::ModelNotFound(_))));
        assert!(err.to_string().contains("det_10g.onnx"));
    }

    #[test]
    fn test_default_model_dir_suffix() {
        assert!(default_model_dir().ends_with("rollcall/models"));
    }
}
