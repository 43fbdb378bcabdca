// Core types for a time-lapse capture session

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config;

/// Configuration for one time-lapse session.
///
/// Immutable for the lifetime of the session; built once from CLI/UI input
/// and handed to [`CaptureSession::new`](crate::capture::CaptureSession::new).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Seconds between scheduled captures (must be >= 1)
    pub interval_seconds: u64,

    /// Total session length in seconds (must be >= 1)
    pub duration_seconds: u64,

    /// Filename prefix for stored frames (e.g., "timelapse")
    pub name_prefix: String,

    /// Directory where frames are written (created if absent)
    pub output_directory: PathBuf,

    /// Frames discarded after device open, before the first scheduling check
    pub warmup_frames: u32,

    /// Consecutive failed reads tolerated before the session aborts
    pub failure_threshold: u32,

    /// Polling cadence of the capture loop in milliseconds
    pub poll_ms: u64,

    /// JPEG quality for stored frames (1-100)
    pub jpeg_quality: u8,
}

impl CaptureConfig {
    /// Create a config for the given prefix/interval/duration, pulling the
    /// remaining knobs from the environment-backed defaults.
    pub fn new(
        name_prefix: impl Into<String>,
        output_directory: impl Into<PathBuf>,
        interval_seconds: u64,
        duration_seconds: u64,
    ) -> Self {
        let settings = &config::get().capture;
        Self {
            interval_seconds,
            duration_seconds,
            name_prefix: name_prefix.into(),
            output_directory: output_directory.into(),
            warmup_frames: settings.warmup_frames,
            failure_threshold: settings.failure_threshold,
            poll_ms: settings.poll_ms,
            jpeg_quality: settings.jpeg_quality,
        }
    }

    /// Configured interval as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Configured session length as a [`Duration`]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    /// Validate the numeric fields. Zero interval or duration would either
    /// fire every tick or never run, so both are rejected up front.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.interval_seconds == 0 {
            return Err(CaptureError::InvalidConfig(
                "interval_seconds must be at least 1".into(),
            ));
        }
        if self.duration_seconds == 0 {
            return Err(CaptureError::InvalidConfig(
                "duration_seconds must be at least 1".into(),
            ));
        }
        if self.name_prefix.is_empty() {
            return Err(CaptureError::InvalidConfig(
                "name_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Why a session left the `Running` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Elapsed session time reached the configured duration
    DurationReached,
    /// An external stop signal was observed
    StopRequested,
}

/// Result of a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Frames successfully written to disk
    pub frames_captured: u64,

    /// Scheduled frames that failed to encode/write (non-fatal, skipped)
    pub frames_skipped: u64,

    /// Wall-clock seconds the session ran
    pub elapsed_seconds: u64,

    /// How the session ended
    pub outcome: SessionOutcome,

    /// Directory the frames were written to
    pub output_directory: PathBuf,
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Error types for capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Camera device could not be opened (fatal at session start)
    #[error("camera device {device} unavailable: {reason}")]
    DeviceUnavailable {
        /// Device index that failed to open
        device: u32,
        /// Driver-reported reason
        reason: String,
    },

    /// Too many consecutive frame reads failed mid-session
    #[error("device lost after {consecutive_failures} consecutive failed reads")]
    DeviceLost {
        /// Number of failed reads that exhausted the threshold
        consecutive_failures: u32,
    },

    /// A second session was started while one is running
    #[error("a capture session is already running")]
    AlreadyRunning,

    /// Configuration rejected before the session started
    #[error("invalid capture config: {0}")]
    InvalidConfig(String),

    /// Storage error fatal at session start (e.g., unwritable directory)
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}

/// Error returned by a frame source for a single read
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Transient frame-grab miss; the session retries up to its threshold
    #[error("frame read failed: {0}")]
    Transient(String),
}
