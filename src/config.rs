//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for lapsecam, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults matching the original hardcoded behavior
//! - One cached global read on first access
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LAPSECAM_WARMUP_FRAMES` | Frames discarded after device open | `10` |
//! | `LAPSECAM_FAILURE_THRESHOLD` | Consecutive read failures before the session aborts | `30` |
//! | `LAPSECAM_POLL_MS` | Polling cadence of the capture loop (ms) | `100` |
//! | `LAPSECAM_JPEG_QUALITY` | JPEG quality for stored frames (1-100) | `85` |
//! | `LAPSECAM_FRAME_DELAY_MS` | Per-frame display duration for GIF export (ms) | `500` |
//! | `LAPSECAM_FPS` | Frame rate for MP4 export | `10` |
//!
//! # Example
//!
//! ```bash
//! # Longer warm-up for a slow-to-settle USB camera
//! export LAPSECAM_WARMUP_FRAMES=25
//!
//! # Snappier GIFs
//! export LAPSECAM_FRAME_DELAY_MS=200
//! ```

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default number of warm-up frames discarded after device open
/// (lets camera auto-exposure settle before the first scheduled capture)
pub const DEFAULT_WARMUP_FRAMES: u32 = 10;

/// Default number of consecutive failed reads tolerated before the
/// session transitions to Stopped with a device-lost error
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 30;

/// Default polling cadence of the capture loop (milliseconds)
pub const DEFAULT_POLL_MS: u64 = 100;

/// Default JPEG quality for stored frames
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Default per-frame display duration for GIF export (milliseconds)
pub const DEFAULT_FRAME_DELAY_MS: u32 = 500;

/// Default frame rate for MP4 export
pub const DEFAULT_FPS: u32 = 10;

/// Minimum zero-pad width for the elapsed-seconds filename field
pub const MIN_PAD_WIDTH: usize = 3;

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for warm-up frame count
pub const ENV_WARMUP_FRAMES: &str = "LAPSECAM_WARMUP_FRAMES";

/// Environment variable for the consecutive-read-failure threshold
pub const ENV_FAILURE_THRESHOLD: &str = "LAPSECAM_FAILURE_THRESHOLD";

/// Environment variable for the capture loop polling cadence
pub const ENV_POLL_MS: &str = "LAPSECAM_POLL_MS";

/// Environment variable for JPEG quality
pub const ENV_JPEG_QUALITY: &str = "LAPSECAM_JPEG_QUALITY";

/// Environment variable for GIF per-frame delay
pub const ENV_FRAME_DELAY_MS: &str = "LAPSECAM_FRAME_DELAY_MS";

/// Environment variable for MP4 frame rate
pub const ENV_FPS: &str = "LAPSECAM_FPS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for lapsecam
#[derive(Debug, Clone)]
pub struct Config {
    /// Capture loop settings
    pub capture: CaptureSettings,
    /// Export settings
    pub export: ExportSettings,
}

/// Capture-loop related settings
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Warm-up frames discarded after device open
    pub warmup_frames: u32,
    /// Consecutive read failures tolerated before aborting
    pub failure_threshold: u32,
    /// Polling cadence (milliseconds)
    pub poll_ms: u64,
    /// JPEG quality for stored frames
    pub jpeg_quality: u8,
}

/// Export-related settings
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Per-frame display duration for GIF export (milliseconds)
    pub frame_delay_ms: u32,
    /// Frame rate for MP4 export
    pub fps: u32,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            capture: CaptureSettings::from_env(),
            export: ExportSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            capture: CaptureSettings::defaults(),
            export: ExportSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl CaptureSettings {
    /// Create capture settings from environment variables
    pub fn from_env() -> Self {
        Self {
            warmup_frames: env_parse(ENV_WARMUP_FRAMES, DEFAULT_WARMUP_FRAMES),
            failure_threshold: env_parse(ENV_FAILURE_THRESHOLD, DEFAULT_FAILURE_THRESHOLD),
            poll_ms: env_parse(ENV_POLL_MS, DEFAULT_POLL_MS),
            jpeg_quality: env_parse(ENV_JPEG_QUALITY, DEFAULT_JPEG_QUALITY).clamp(1, 100),
        }
    }

    /// Create capture settings with defaults
    pub fn defaults() -> Self {
        Self {
            warmup_frames: DEFAULT_WARMUP_FRAMES,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            poll_ms: DEFAULT_POLL_MS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ExportSettings {
    /// Create export settings from environment variables
    pub fn from_env() -> Self {
        Self {
            frame_delay_ms: env_parse(ENV_FRAME_DELAY_MS, DEFAULT_FRAME_DELAY_MS),
            fps: env_parse(ENV_FPS, DEFAULT_FPS).max(1),
        }
    }

    /// Create export settings with defaults
    pub fn defaults() -> Self {
        Self {
            frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
            fps: DEFAULT_FPS,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse an environment variable, falling back to a default on absence or
/// parse failure
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Get the warm-up frame count (convenience function)
pub fn warmup_frames() -> u32 {
    get().capture.warmup_frames
}

/// Get the read-failure threshold (convenience function)
pub fn failure_threshold() -> u32 {
    get().capture.failure_threshold
}

/// Get the JPEG quality (convenience function)
pub fn jpeg_quality() -> u8 {
    get().capture.jpeg_quality
}
