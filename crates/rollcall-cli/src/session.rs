//! Streaming recognition: sample frames until enough consecutive matches,
//! the wall-clock timeout, or the frame limit.

use crate::error::RecognitionError;
use crate::report::{FinalReport, FrameResult, Reporter, StreamMessage};
use crate::snapshot;
use chrono::{SecondsFormat, Utc};
use rollcall_core::{ConsecutiveMatcher, DistanceMatcher, Embedding, FaceEmbedder, Observation};
use rollcall_hw::FrameSource;
use std::io::Write;
use std::time::{Duration, Instant};

/// Consecutive failed frame reads after which the camera is considered gone.
const MAX_CONSECUTIVE_READ_FAILURES: u32 = 10;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub required_matches: u32,
    pub timeout: Duration,
    pub max_frames: u32,
    /// Attach each processed frame as base64 JPEG.
    pub emit_images: bool,
}

/// One streaming run against a fixed reference.
pub struct StreamSession<'a, E: ?Sized, S: ?Sized, W: Write> {
    embedder: &'a mut E,
    source: &'a mut S,
    reporter: &'a mut Reporter<W>,
    settings: SessionSettings,
    roll_number: &'a str,
}

impl<'a, E, S, W> StreamSession<'a, E, S, W>
where
    E: FaceEmbedder + ?Sized,
    S: FrameSource + ?Sized,
    W: Write,
{
    pub fn new(
        embedder: &'a mut E,
        source: &'a mut S,
        reporter: &'a mut Reporter<W>,
        settings: SessionSettings,
        roll_number: &'a str,
    ) -> Self {
        Self {
            embedder,
            source,
            reporter,
            settings,
            roll_number,
        }
    }

    /// Run to completion, emitting one `frame` line per processed frame.
    ///
    /// Recognition failures mid-stream become a failed [`FinalReport`];
    /// only output errors are returned as `Err`.
    pub fn run(mut self, reference: Embedding, matcher: DistanceMatcher) -> Result<FinalReport, RecognitionError> {
        let mut run = ConsecutiveMatcher::new(matcher, reference, self.settings.required_matches);
        let started = Instant::now();
        let mut processed = 0u32;
        let mut read_failures = 0u32;

        tracing::info!(
            required = run.required(),
            timeout_secs = self.settings.timeout.as_secs(),
            max_frames = self.settings.max_frames,
            "starting recognition stream"
        );

        while processed < self.settings.max_frames && !run.is_complete() {
            if started.elapsed() >= self.settings.timeout {
                tracing::info!(processed, "recognition timed out");
                break;
            }

            let frame = match self.source.next_frame() {
                Ok(frame) => {
                    read_failures = 0;
                    frame.mirrored()
                }
                Err(e) => {
                    read_failures += 1;
                    tracing::warn!(error = %e, read_failures, "failed to read frame");
                    if read_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                        let err = RecognitionError::CameraRead(e);
                        return Ok(FinalReport::failed(Some(self.roll_number), &err, processed));
                    }
                    continue;
                }
            };

            let observation = if frame.is_dark {
                tracing::debug!(seq = frame.sequence, "dark frame, skipping inference");
                Observation::NoFace
            } else {
                match self.embedder.observe(&frame.image) {
                    Ok(observation) => observation,
                    Err(e) => {
                        let err = RecognitionError::from(e);
                        return Ok(FinalReport::failed(Some(self.roll_number), &err, processed));
                    }
                }
            };

            let decision = run.observe(observation.embedding());
            processed += 1;

            let image = if self.settings.emit_images {
                snapshot::encode_jpeg_base64(&frame.image)
                    .map_err(|e| tracing::warn!(error = %e, "failed to encode frame image"))
                    .ok()
            } else {
                None
            };

            self.reporter.emit(&StreamMessage::Frame {
                frame: processed,
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                result: FrameResult::new(decision, observation.face(), run.is_complete()),
                image,
            })?;
        }

        if run.is_complete() {
            tracing::info!(
                confidence = run.best_confidence(),
                processed,
                "recognition complete"
            );
            Ok(FinalReport::recognized(self.roll_number, run.best_confidence(), processed))
        } else {
            tracing::info!(
                best_confidence = run.best_confidence(),
                processed,
                "face not recognized"
            );
            Ok(FinalReport::not_recognized(self.roll_number, run.best_confidence(), processed))
        }
    }
}
