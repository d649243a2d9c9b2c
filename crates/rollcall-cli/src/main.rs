use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use rollcall_core::embedder::{arcface_model_path, scrfd_model_path};
use rollcall_core::{FaceEmbedder, Matcher, Observation, OnnxEmbedder};
use rollcall_hw::Camera;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod reference;
mod report;
mod session;
mod snapshot;

use config::Config;
use error::RecognitionError;
use reference::ReferenceSource;
use report::{CameraEntry, CheckReport, CompareReport, FinalReport, Reporter, StreamMessage};
use session::{SessionSettings, StreamSession};

#[derive(Parser)]
#[command(
    name = "rollcall",
    version,
    about = "Match a webcam or uploaded face against a registered photo"
)]
struct Cli {
    /// TOML config file (overrides $ROLLCALL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream webcam frames until the registered face is seen enough times in a row
    Stream(StreamArgs),
    /// Compare one uploaded base64 frame against the registered face
    Compare(CompareArgs),
    /// Report model and camera availability
    Check,
}

#[derive(Args)]
struct StreamArgs {
    /// Registered image URL or local path
    registered_image: String,
    /// Roll number echoed in the final report
    roll_number: String,
    /// Wall-clock limit in seconds
    timeout_seconds: Option<u64>,
    /// Attach each processed frame as base64 JPEG
    #[arg(long)]
    emit_images: bool,
}

#[derive(Args)]
struct CompareArgs {
    /// Registered image URL or local path
    registered_image: String,
    /// Base64 frame, optionally a data URL; `-` reads it from stdin
    frame_data: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            eprintln!("{e}");
            let shape = ReportShape::from_raw_args(
                std::env::args_os().map(|a| a.to_string_lossy().into_owned()),
            );
            emit_fallback_error(&shape, format!("invalid arguments: {}", e.kind()));
            return ExitCode::FAILURE;
        }
    };

    let shape = ReportShape::of(&cli.command);
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "rollcall failed");
            emit_fallback_error(&shape, format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// JSON shape the caller of a subcommand parses.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReportShape {
    Final { roll_number: Option<String> },
    Compare,
}

impl ReportShape {
    fn of(command: &Commands) -> Self {
        match command {
            Commands::Stream(args) => Self::Final {
                roll_number: Some(args.roll_number.clone()),
            },
            Commands::Compare(_) => Self::Compare,
            Commands::Check => Self::Final { roll_number: None },
        }
    }

    /// Guess from the raw command line when it did not parse: the first
    /// positional argument names the subcommand.
    fn from_raw_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut args = args.into_iter().skip(1);
        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            if arg == "--config" {
                args.next();
                continue;
            }
            if arg.starts_with('-') {
                continue;
            }
            if arg == "compare" {
                return Self::Compare;
            }
            break;
        }
        Self::Final { roll_number: None }
    }
}

/// Last-resort JSON line so the caller never has to parse free text.
fn emit_fallback_error(shape: &ReportShape, message: String) {
    let mut reporter = Reporter::new(std::io::stdout().lock());
    if let Err(e) = write_fallback_error(&mut reporter, shape, message) {
        tracing::error!(error = %e, "failed to write error report");
    }
}

fn write_fallback_error<W: Write>(
    reporter: &mut Reporter<W>,
    shape: &ReportShape,
    message: String,
) -> std::io::Result<()> {
    match shape {
        ReportShape::Compare => reporter.emit(&CompareReport::error(message)),
        ReportShape::Final { roll_number } => reporter.emit(&StreamMessage::Final(FinalReport::error(
            roll_number.as_deref(),
            message,
            0,
        ))),
    }
}

/// Returns whether the run ended in a recognized match.
fn run(cli: Cli) -> Result<bool> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration resolved");

    let mut reporter = Reporter::new(std::io::stdout().lock());

    match cli.command {
        Commands::Stream(args) => {
            let report = stream(&config, &args, &mut reporter)?;
            let recognized = report.recognized;
            reporter
                .emit(&StreamMessage::Final(report))
                .context("writing final report")?;
            Ok(recognized)
        }
        Commands::Compare(args) => {
            let report = match compare(&config, &args) {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(error = %e, "comparison failed");
                    CompareReport::failed(&e)
                }
            };
            reporter.emit(&report).context("writing compare report")?;
            Ok(report.is_match())
        }
        Commands::Check => {
            let report = check(&config);
            reporter.emit(&report).context("writing check report")?;
            Ok(report.ready)
        }
    }
}

fn stream<W: Write>(config: &Config, args: &StreamArgs, reporter: &mut Reporter<W>) -> Result<FinalReport> {
    tracing::info!(
        roll_number = %args.roll_number,
        reference = %args.registered_image,
        "starting face recognition"
    );

    match stream_session(config, args, reporter) {
        Ok(report) => Ok(report),
        Err(RecognitionError::Output(e)) => Err(e).context("writing frame report"),
        Err(e) => {
            tracing::error!(error = %e, "recognition failed");
            Ok(FinalReport::failed(Some(&args.roll_number), &e, 0))
        }
    }
}

fn stream_session<W: Write>(
    config: &Config,
    args: &StreamArgs,
    reporter: &mut Reporter<W>,
) -> Result<FinalReport, RecognitionError> {
    let mut embedder = OnnxEmbedder::load(&config.model_dir).map_err(RecognitionError::ModelLoad)?;

    let source = ReferenceSource::parse(&args.registered_image);
    let reference = reference::load_reference(&source, &mut embedder, config.http_timeout())?;

    // Opened only after the reference is ready; released when `camera` drops.
    let camera = Camera::open(&config.camera_device).map_err(RecognitionError::CameraOpen)?;
    let mut frames = camera
        .stream(config.frame_timeout())
        .map_err(RecognitionError::CameraOpen)?;
    frames
        .warm_up(config.warmup_frames)
        .map_err(RecognitionError::CameraOpen)?;
    tracing::info!(device = %config.camera_device, "camera initialized");

    let settings = SessionSettings {
        required_matches: config.required_matches,
        timeout: Duration::from_secs(args.timeout_seconds.unwrap_or(config.timeout_secs)),
        max_frames: config.max_frames,
        emit_images: args.emit_images,
    };

    StreamSession::new(&mut embedder, &mut frames, reporter, settings, &args.roll_number)
        .run(reference, config.matcher())
}

fn compare(config: &Config, args: &CompareArgs) -> Result<CompareReport, RecognitionError> {
    let mut embedder = OnnxEmbedder::load(&config.model_dir).map_err(RecognitionError::ModelLoad)?;
    let frame_data = read_frame_data(&args.frame_data)?;
    compare_snapshot(
        &mut embedder,
        &ReferenceSource::parse(&args.registered_image),
        &frame_data,
        config,
    )
}

fn read_frame_data(arg: &str) -> Result<String, RecognitionError> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut data = String::new();
    std::io::stdin()
        .read_to_string(&mut data)
        .map_err(|e| RecognitionError::FrameDecode(format!("reading stdin: {e}")))?;
    Ok(data)
}

/// Compare one snapshot against the reference: reference first, then frame.
fn compare_snapshot<E: FaceEmbedder + ?Sized>(
    embedder: &mut E,
    source: &ReferenceSource,
    frame_data: &str,
    config: &Config,
) -> Result<CompareReport, RecognitionError> {
    let reference = reference::load_reference(source, embedder, config.http_timeout())?;
    let frame = snapshot::decode_snapshot(frame_data)?;

    let (face, embedding) = match embedder.observe(&frame)? {
        Observation::Face { face, embedding } => (face, embedding),
        Observation::FaceWithoutEmbedding(_) | Observation::NoFace => {
            tracing::info!("no usable face in snapshot");
            return Ok(CompareReport::no_face());
        }
    };

    let cmp = config.matcher().compare(&reference, &embedding);
    tracing::info!(
        distance = cmp.distance,
        confidence = cmp.confidence,
        matched = cmp.is_match,
        "snapshot compared"
    );
    Ok(CompareReport::compared(&face, cmp.is_match, cmp.confidence))
}

fn check(config: &Config) -> CheckReport {
    let detector_model = scrfd_model_path(&config.model_dir).exists();
    let recognizer_model = arcface_model_path(&config.model_dir).exists();
    let cameras: Vec<CameraEntry> = Camera::list_devices()
        .into_iter()
        .map(|d| CameraEntry {
            path: d.path,
            name: d.name,
            driver: d.driver,
        })
        .collect();

    tracing::info!(
        model_dir = %config.model_dir.display(),
        detector_model,
        recognizer_model,
        cameras = cameras.len(),
        "diagnostics"
    );

    CheckReport {
        model_dir: config.model_dir.display().to_string(),
        detector_model,
        recognizer_model,
        cameras,
        ready: detector_model && recognizer_model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::tests::{face, png_bytes, ScriptedEmbedder};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn reference_file() -> (tempfile::TempDir, ReferenceSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registered.png");
        std::fs::write(&path, png_bytes()).unwrap();
        (dir, ReferenceSource::Path(path))
    }

    #[test]
    fn test_cli_parses_stream_positional_timeout() {
        let cli = Cli::try_parse_from(["rollcall", "stream", "https://x/y.jpg", "17", "45"]).unwrap();
        let Commands::Stream(args) = cli.command else {
            panic!("expected stream");
        };
        assert_eq!(args.roll_number, "17");
        assert_eq!(args.timeout_seconds, Some(45));
        assert!(!args.emit_images);
    }

    #[test]
    fn test_cli_missing_arguments_rejected() {
        assert!(Cli::try_parse_from(["rollcall", "stream", "https://x/y.jpg"]).is_err());
    }

    #[test]
    fn test_report_shape_from_raw_args() {
        assert_eq!(
            ReportShape::from_raw_args(["rollcall", "compare", "ref.jpg"]),
            ReportShape::Compare
        );
        assert_eq!(
            ReportShape::from_raw_args(["rollcall", "--config", "compare", "compare"]),
            ReportShape::Compare
        );
        assert_eq!(
            ReportShape::from_raw_args(["rollcall", "stream", "compare"]),
            ReportShape::Final { roll_number: None }
        );
        assert_eq!(ReportShape::from_raw_args(["rollcall"]), ReportShape::Final { roll_number: None });
    }

    #[test]
    fn test_report_shape_of_parsed_command() {
        let cli = Cli::try_parse_from(["rollcall", "stream", "ref.jpg", "17"]).unwrap();
        assert_eq!(
            ReportShape::of(&cli.command),
            ReportShape::Final { roll_number: Some("17".into()) }
        );
        let cli = Cli::try_parse_from(["rollcall", "compare", "ref.jpg", "-"]).unwrap();
        assert_eq!(ReportShape::of(&cli.command), ReportShape::Compare);
    }

    #[test]
    fn test_compare_fallback_error_uses_compare_shape() {
        let mut reporter = Reporter::new(Vec::new());
        write_fallback_error(&mut reporter, &ReportShape::Compare, "invalid arguments".into()).unwrap();
        let line: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
        assert_eq!(
            line,
            serde_json::json!({ "success": false, "faceDetected": false, "error": "invalid arguments" })
        );
    }

    #[test]
    fn test_stream_fallback_error_uses_final_shape() {
        let mut reporter = Reporter::new(Vec::new());
        let shape = ReportShape::Final { roll_number: Some("17".into()) };
        write_fallback_error(&mut reporter, &shape, "parsing config file".into()).unwrap();
        let line: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
        assert_eq!(line["type"], "final");
        assert_eq!(line["rollNumber"], "17");
        assert_eq!(line["success"], false);
        assert_eq!(line["error"], "parsing config file");
    }

    #[test]
    fn test_compare_identical_faces_match() {
        let (_dir, source) = reference_file();
        let mut embedder = ScriptedEmbedder::new([face(&[0.5, 0.0]), face(&[0.5, 0.0])]);
        let frame = STANDARD.encode(png_bytes());

        let report = compare_snapshot(&mut embedder, &source, &frame, &Config::default()).unwrap();
        assert!(report.is_match());
        assert_eq!(report.confidence, Some(1.0));
        assert!(report.face_detected);
    }

    #[test]
    fn test_compare_different_faces_no_match() {
        let (_dir, source) = reference_file();
        let mut embedder = ScriptedEmbedder::new([face(&[0.5, 0.0]), face(&[0.0, 0.5])]);
        let frame = STANDARD.encode(png_bytes());

        let report = compare_snapshot(&mut embedder, &source, &frame, &Config::default()).unwrap();
        assert!(!report.is_match());
        assert!(report.confidence.unwrap() < 0.5);
    }

    #[test]
    fn test_compare_no_face_in_frame() {
        let (_dir, source) = reference_file();
        let mut embedder = ScriptedEmbedder::new([face(&[0.5, 0.0]), Observation::NoFace]);
        let frame = STANDARD.encode(png_bytes());

        let report = compare_snapshot(&mut embedder, &source, &frame, &Config::default()).unwrap();
        assert!(!report.face_detected);
        assert_eq!(report.confidence, None);
        assert!(!report.is_match());
    }

    #[test]
    fn test_compare_missing_reference() {
        let mut embedder = ScriptedEmbedder::new([]);
        let source = ReferenceSource::parse("/nonexistent/registered.jpg");
        let frame = STANDARD.encode(png_bytes());

        let err = compare_snapshot(&mut embedder, &source, &frame, &Config::default()).unwrap_err();
        let report = CompareReport::failed(&err);
        assert!(!report.success);
        assert!(report.error.unwrap().contains("reference image"));
    }

    #[test]
    fn test_compare_bad_frame() {
        let (_dir, source) = reference_file();
        let mut embedder = ScriptedEmbedder::new([face(&[0.5, 0.0])]);
        let err = compare_snapshot(&mut embedder, &source, "%%%", &Config::default()).unwrap_err();
        assert!(matches!(err, RecognitionError::FrameDecode(_)));
    }

    #[test]
    fn test_stream_without_models_reports_failure() {
        let config = Config {
            model_dir: PathBuf::from("/nonexistent/rollcall-models"),
            ..Config::default()
        };
        let args = StreamArgs {
            registered_image: "/nonexistent/registered.jpg".into(),
            roll_number: "9".into(),
            timeout_seconds: None,
            emit_images: false,
        };
        let mut reporter = Reporter::new(Vec::new());
        let report = stream(&config, &args, &mut reporter).unwrap();
        assert!(!report.success);
        assert_eq!(report.roll_number.as_deref(), Some("9"));
        assert!(report.message.starts_with("failed to load face models"));
        assert!(reporter.into_inner().is_empty());
    }

    #[test]
    fn test_check_without_models_not_ready() {
        let config = Config {
            model_dir: PathBuf::from("/nonexistent/rollcall-models"),
            ..Config::default()
        };
        let report = check(&config);
        assert!(!report.detector_model && !report.recognizer_model);
        assert!(!report.ready);
    }
}
