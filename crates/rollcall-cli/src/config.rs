use anyhow::{Context, Result};
use rollcall_core::matcher::{
    DEFAULT_MIN_CONFIDENCE, DEFAULT_REQUIRED_MATCHES, DEFAULT_TOLERANCE,
};
use rollcall_core::DistanceMatcher;
use rollcall_hw::DEFAULT_READ_TIMEOUT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "ROLLCALL_CONFIG";

/// Runtime configuration.
///
/// Resolution order: built-in defaults, then the TOML file (if any), then
/// `ROLLCALL_*` environment variables, then command-line arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// V4L2 device path for streaming mode.
    pub camera_device: String,
    /// Comparator tolerance: maximum distance still called the same face.
    pub tolerance: f32,
    /// Confidence floor: `1 - distance` must exceed this.
    pub min_confidence: f32,
    /// Consecutive matching frames required in streaming mode.
    pub required_matches: u32,
    /// Wall-clock limit for a streaming session.
    pub timeout_secs: u64,
    /// Frame limit for a streaming session.
    pub max_frames: u32,
    /// Frames discarded after opening the camera.
    pub warmup_frames: usize,
    /// Longest wait for one camera frame before the read counts as failed.
    pub frame_timeout_ms: u64,
    /// Timeout for downloading the reference image.
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: rollcall_core::default_model_dir(),
            camera_device: "/dev/video0".to_string(),
            tolerance: DEFAULT_TOLERANCE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            required_matches: DEFAULT_REQUIRED_MATCHES,
            timeout_secs: 30,
            max_frames: 600,
            warmup_frames: 5,
            frame_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            http_timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load from the optional file at `path` (or `$ROLLCALL_CONFIG`) and the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match path.or(env_path.as_deref()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Overlay `ROLLCALL_*` variables. Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(device) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        env_parse(&lookup, "ROLLCALL_TOLERANCE", &mut self.tolerance);
        env_parse(&lookup, "ROLLCALL_MIN_CONFIDENCE", &mut self.min_confidence);
        env_parse(&lookup, "ROLLCALL_REQUIRED_MATCHES", &mut self.required_matches);
        env_parse(&lookup, "ROLLCALL_TIMEOUT_SECS", &mut self.timeout_secs);
        env_parse(&lookup, "ROLLCALL_MAX_FRAMES", &mut self.max_frames);
        env_parse(&lookup, "ROLLCALL_WARMUP_FRAMES", &mut self.warmup_frames);
        env_parse(&lookup, "ROLLCALL_FRAME_TIMEOUT_MS", &mut self.frame_timeout_ms);
        env_parse(&lookup, "ROLLCALL_HTTP_TIMEOUT_SECS", &mut self.http_timeout_secs);
    }

    pub fn matcher(&self) -> DistanceMatcher {
        DistanceMatcher {
            tolerance: self.tolerance,
            min_confidence: self.min_confidence,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}
