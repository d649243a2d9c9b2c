use rollcall_core::EmbedError;
use rollcall_hw::CameraError;
use thiserror::Error;

/// Every way a recognition run can fail. The `Display` text is what the
/// calling process sees in the JSON `message`/`error` fields.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("failed to load reference image: download failed: {0}")]
    ReferenceDownload(String),
    #[error("failed to load reference image: cannot read {path}: {source}")]
    ReferenceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load reference image: {0}")]
    ReferenceDecode(#[source] image::ImageError),
    #[error("failed to load reference image: no face found")]
    ReferenceNoFace,
    #[error("failed to load reference image: face found but no embedding could be extracted")]
    ReferenceNoEmbedding,
    #[error("failed to decode frame: {0}")]
    FrameDecode(String),
    #[error("failed to load face models: {0}")]
    ModelLoad(#[source] EmbedError),
    #[error("face analysis failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("failed to initialize camera: {0}")]
    CameraOpen(#[source] CameraError),
    #[error("camera stopped delivering frames: {0}")]
    CameraRead(#[source] CameraError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
