//! rollcall-core: face detection, embedding and match decisions.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime for CPU inference. Match decisions compare
//! Euclidean distances against a reference embedding.

pub mod alignment;
pub mod detector;
pub mod embedder;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use embedder::{default_model_dir, EmbedError, FaceEmbedder, OnnxEmbedder};
pub use matcher::{Comparison, ConsecutiveMatcher, DistanceMatcher, Matcher};
pub use types::{BoundingBox, Embedding, MatchDecision, Observation};
