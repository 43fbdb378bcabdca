//! The capture session state machine.
//!
//! One session is one bounded run: `Idle -> Running -> Stopped`. The loop
//! is single-threaded cooperative polling; every iteration checks the stop
//! flag, checks the duration bound, reads one frame, consults the interval
//! scheduler, and writes the frame if the tick qualifies.
//!
//! Only one session may run at a time in the whole process: the camera is
//! an exclusive resource, so a second `run` while any session is active is
//! rejected with [`CaptureError::AlreadyRunning`].
//!
//! The frame source is taken by value, so whichever way the loop exits
//! (duration, stop signal, device loss, storage failure) the source is
//! dropped and the camera released.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::scheduler::IntervalScheduler;
use super::source::FrameSource;
use super::types::{CaptureConfig, CaptureError, CaptureResult, SessionOutcome, SessionSummary};
use crate::storage::StorageWriter;

// Held for the whole of a run, across every CaptureSession instance.
static ACTIVE_SESSION: AtomicBool = AtomicBool::new(false);

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet run
    Idle,
    /// Capture loop in progress
    Running,
    /// Loop exited (normally or not)
    Stopped,
}

/// Time seam for the capture loop.
///
/// `elapsed` is wall-clock time since session start (zero at the first
/// scheduling check); `sleep` paces the polling loop. Production uses
/// [`WallClock`]; tests drive the loop deterministically with
/// [`ManualClock`], whose `sleep` advances virtual time instead of waiting.
pub trait Clock {
    /// Time since session start
    fn elapsed(&self) -> Duration;

    /// Pause between polling ticks
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock time
#[derive(Debug)]
pub struct WallClock {
    start: Instant,
}

impl WallClock {
    /// Start counting from now
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for WallClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for deterministic tests: `sleep` advances elapsed time
/// immediately instead of blocking.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    /// Create a clock at t=0
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump forward by `step`
    pub fn advance(&self, step: Duration) {
        self.now.set(self.now.get() + step);
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Shared control handle for a session.
///
/// Cloneable; `stop` is idempotent, and signalling an already-stopped
/// session is a no-op. The stop flag is observed at the top of every loop
/// iteration, so it takes effect within one iteration's latency. Each new
/// run clears the flag, so a stop request only applies to the run it was
/// made against.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Request the session to stop after the in-flight tick
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Whether the session loop is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Drives one time-lapse capture run.
#[derive(Debug)]
pub struct CaptureSession {
    config: CaptureConfig,
    state: SessionState,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl CaptureSession {
    /// Create a session from a validated config
    pub fn new(config: CaptureConfig) -> CaptureResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: SessionState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The session's configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the capture loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get a control handle (cloneable, usable from signal handlers or
    /// other threads)
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            stop: Arc::clone(&self.stop),
            running: Arc::clone(&self.running),
        }
    }

    /// Run the session against a real wall clock.
    ///
    /// Fails with [`CaptureError::AlreadyRunning`] if any session in the
    /// process is mid-run. A session that has stopped may be run again.
    pub fn run(&mut self, source: impl FrameSource) -> CaptureResult<SessionSummary> {
        // Warm-up happens before the clock starts so auto-exposure settling
        // doesn't eat into the configured duration
        self.run_inner(source, None)
    }

    /// Run the session against an injected clock (t must be 0 at entry)
    pub fn run_with_clock(
        &mut self,
        source: impl FrameSource,
        clock: &dyn Clock,
    ) -> CaptureResult<SessionSummary> {
        self.run_inner(source, Some(clock))
    }

    fn run_inner(
        &mut self,
        mut source: impl FrameSource,
        clock: Option<&dyn Clock>,
    ) -> CaptureResult<SessionSummary> {
        // The camera is exclusive, so the guard is process-wide rather
        // than per instance
        if ACTIVE_SESSION.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }
        // A fresh run starts unstopped; any stop request left over from an
        // earlier run is discarded
        self.stop.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        self.state = SessionState::Running;

        let result = self.prepare_and_loop(&mut source, clock);

        self.state = SessionState::Stopped;
        self.running.store(false, Ordering::SeqCst);
        ACTIVE_SESSION.store(false, Ordering::SeqCst);
        // `source` dropped here on every path, releasing the device
        result
    }

    fn prepare_and_loop(
        &mut self,
        source: &mut impl FrameSource,
        clock: Option<&dyn Clock>,
    ) -> CaptureResult<SessionSummary> {
        let writer = StorageWriter::create(
            &self.config.output_directory,
            &self.config.name_prefix,
            self.config.duration_seconds,
            self.config.jpeg_quality,
        )?;
        if let Err(e) = writer.write_manifest(&self.config) {
            warn!(error = %e, "failed to write session manifest");
        }

        info!(
            source = source.source_type(),
            interval_seconds = self.config.interval_seconds,
            duration_seconds = self.config.duration_seconds,
            output = %writer.dir().display(),
            "starting capture session"
        );

        // Discard warm-up frames so camera auto-exposure settles before the
        // first scheduled capture; failures here don't count against the
        // session's failure threshold
        for n in 0..self.config.warmup_frames {
            if let Err(e) = source.read() {
                debug!(warmup_frame = n, error = %e, "warm-up read failed");
            }
        }

        // Session start is recorded after warm-up
        let wall;
        let clock: &dyn Clock = match clock {
            Some(c) => c,
            None => {
                wall = WallClock::start();
                &wall
            }
        };

        self.capture_loop(source, &writer, clock)
    }

    fn capture_loop(
        &mut self,
        source: &mut impl FrameSource,
        writer: &StorageWriter,
        clock: &dyn Clock,
    ) -> CaptureResult<SessionSummary> {
        let mut scheduler = IntervalScheduler::new(self.config.interval());
        let session_duration = self.config.duration();
        let poll = Duration::from_millis(self.config.poll_ms);

        let mut frames_captured = 0u64;
        let mut frames_skipped = 0u64;
        let mut consecutive_failures = 0u32;

        let outcome = loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("stop signal observed");
                break SessionOutcome::StopRequested;
            }

            match source.read() {
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(error = %e, consecutive_failures, "frame read failed");
                    if consecutive_failures >= self.config.failure_threshold {
                        return Err(CaptureError::DeviceLost {
                            consecutive_failures,
                        });
                    }
                }
                Ok(frame) => {
                    consecutive_failures = 0;
                    let elapsed = clock.elapsed();
                    if scheduler.should_capture(elapsed) {
                        let elapsed_seconds = elapsed.as_secs();
                        match writer.write(&frame, elapsed_seconds) {
                            Ok(path) => {
                                frames_captured += 1;
                                info!(path = %path.display(), elapsed_seconds, "captured frame");
                            }
                            Err(e) => {
                                // One bad frame must not lose the session
                                frames_skipped += 1;
                                warn!(error = %e, elapsed_seconds, "frame write failed, skipping");
                            }
                        }
                    }
                }
            }

            // Checked after the tick so a capture due exactly at the
            // duration bound still lands; frame count for duration D and
            // interval I is floor(D/I) + 1 even when I divides D
            if clock.elapsed() >= session_duration {
                break SessionOutcome::DurationReached;
            }

            clock.sleep(poll);
        };

        let summary = SessionSummary {
            frames_captured,
            frames_skipped,
            elapsed_seconds: clock.elapsed().as_secs(),
            outcome,
            output_directory: writer.dir().to_path_buf(),
        };
        info!(
            frames_captured,
            frames_skipped,
            outcome = ?summary.outcome,
            "capture session finished"
        );
        Ok(summary)
    }
}
