//! lapsecam - Webcam time-lapse capture and export.
//!
//! This crate provides:
//! - Interval-driven capture sessions with a bounded duration and an
//!   external stop signal
//! - A `FrameSource` abstraction over real webcams (feature `camera`) and a
//!   mock source for testing and hardware-less runs
//! - Deterministic zero-padded frame storage whose filename order matches
//!   capture order
//! - Batch export of a stored sequence as an animated GIF or MP4 video
//!
//! # Example
//!
//! ```rust,no_run
//! use lapsecam::capture::{CaptureConfig, CaptureSession, MockCamera};
//!
//! let config = CaptureConfig::new("timelapse", "./timelapse", 5, 60);
//! let mut session = CaptureSession::new(config).unwrap();
//! let summary = session.run(MockCamera::new(1280, 720)).unwrap();
//! println!("captured {} frames", summary.frames_captured);
//! ```

pub mod capture;
pub mod config;
pub mod export;
pub mod storage;

// Re-export capture types and sources
#[cfg(feature = "camera")]
pub use capture::{list_devices, DeviceCamera};
pub use capture::{
    CaptureConfig, CaptureError, CaptureResult, CaptureSession, Clock, FrameSource,
    IntervalScheduler, ManualClock, MockCamera, RawFrame, SessionHandle, SessionOutcome,
    SessionState, SessionSummary, WallClock,
};

// Re-export storage helpers
pub use storage::{parse_elapsed_seconds, StorageError, StorageResult, StorageWriter};

// Re-export the exporter
pub use export::{export, ExportArtifact, ExportError, ExportMode, ExportResult};
