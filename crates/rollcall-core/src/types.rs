use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are in pixels of the image the detector was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector, only meaningful when compared to another embedding
/// from the same model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two embeddings, or `None` when their
    /// lengths differ.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>();
        Some(sum.sqrt())
    }
}

/// Outcome of running the embedder over one image.
#[derive(Debug, Clone)]
pub enum Observation {
    /// The detector found nothing.
    NoFace,
    /// A face was found but no embedding could be extracted from it.
    FaceWithoutEmbedding(BoundingBox),
    /// The highest-confidence face and its embedding.
    Face {
        face: BoundingBox,
        embedding: Embedding,
    },
}

impl Observation {
    pub fn face(&self) -> Option<&BoundingBox> {
        match self {
            Observation::NoFace => None,
            Observation::FaceWithoutEmbedding(face) | Observation::Face { face, .. } => Some(face),
        }
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        match self {
            Observation::Face { embedding, .. } => Some(embedding),
            _ => None,
        }
    }
}

/// Decision for one sample embedding compared to the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchDecision {
    pub is_match: bool,
    /// `1 - distance`, clamped to [0, 1].
    pub confidence: f32,
    /// Consecutive matching frames including this one (0 after a miss).
    pub consecutive_count: u32,
}
