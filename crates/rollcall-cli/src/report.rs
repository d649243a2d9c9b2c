//! JSON lines written to stdout for the calling process.

use crate::error::RecognitionError;
use rollcall_core::{BoundingBox, MatchDecision};
use serde::Serialize;
use std::io::{self, Write};

/// Face rectangle in integer pixels of the processed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<&BoundingBox> for FaceRegion {
    fn from(b: &BoundingBox) -> Self {
        Self {
            x: b.x.round() as i32,
            y: b.y.round() as i32,
            width: b.width.round() as i32,
            height: b.height.round() as i32,
        }
    }
}

/// Per-frame outcome in streaming mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    pub face_detected: bool,
    #[serde(rename = "match")]
    pub is_match: bool,
    pub confidence: f32,
    pub consecutive_matches: u32,
    pub recognition_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<FaceRegion>,
}

impl FrameResult {
    pub fn new(decision: MatchDecision, face: Option<&BoundingBox>, complete: bool) -> Self {
        Self {
            face_detected: face.is_some(),
            is_match: decision.is_match,
            confidence: decision.confidence,
            consecutive_matches: decision.consecutive_count,
            recognition_complete: complete,
            face: face.map(FaceRegion::from),
        }
    }
}

/// Terminal verdict of a streaming run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    pub success: bool,
    pub recognized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    pub confidence: f32,
    pub frames_processed: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FinalReport {
    pub fn recognized(roll_number: &str, confidence: f32, frames_processed: u32) -> Self {
        Self {
            success: true,
            recognized: true,
            roll_number: Some(roll_number.to_string()),
            confidence,
            frames_processed,
            message: "Attendance marked successfully".to_string(),
            error: None,
        }
    }

    pub fn not_recognized(roll_number: &str, best_confidence: f32, frames_processed: u32) -> Self {
        Self {
            success: false,
            recognized: false,
            roll_number: Some(roll_number.to_string()),
            confidence: best_confidence,
            frames_processed,
            message: format!(
                "Face not recognized. Best confidence: {:.1}%",
                best_confidence * 100.0
            ),
            error: None,
        }
    }

    pub fn failed(roll_number: Option<&str>, err: &RecognitionError, frames_processed: u32) -> Self {
        Self::error(roll_number, err.to_string(), frames_processed)
    }

    pub fn error(roll_number: Option<&str>, message: String, frames_processed: u32) -> Self {
        Self {
            success: false,
            recognized: false,
            roll_number: roll_number.map(str::to_string),
            confidence: 0.0,
            frames_processed,
            error: Some(message.clone()),
            message,
        }
    }
}

/// Messages of the streaming protocol, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    Frame {
        frame: u32,
        timestamp: String,
        result: FrameResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    Final(FinalReport),
}

/// Verdict of the single-snapshot comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareReport {
    pub success: bool,
    pub face_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(flatten)]
    pub face: Option<FaceRegion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompareReport {
    pub fn no_face() -> Self {
        Self {
            success: true,
            face_detected: false,
            matched: None,
            confidence: None,
            face: None,
            error: None,
        }
    }

    pub fn compared(face: &BoundingBox, matched: bool, confidence: f32) -> Self {
        Self {
            success: true,
            face_detected: true,
            matched: Some(matched),
            confidence: Some(confidence),
            face: Some(face.into()),
            error: None,
        }
    }

    pub fn failed(err: &RecognitionError) -> Self {
        Self::error(err.to_string())
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            face_detected: false,
            matched: None,
            confidence: None,
            face: None,
            error: Some(message),
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched == Some(true)
    }
}

/// Diagnostics emitted by `rollcall check`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub model_dir: String,
    pub detector_model: bool,
    pub recognizer_model: bool,
    pub cameras: Vec<CameraEntry>,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraEntry {
    pub path: String,
    pub name: String,
    pub driver: String,
}

/// Writes one JSON document per line and flushes after each, so the
/// parent sees every message as soon as it is produced.
pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn emit<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, message)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
