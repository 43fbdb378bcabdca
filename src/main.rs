use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use lapsecam::capture::{CaptureConfig, CaptureSession, MockCamera};
use lapsecam::config;
use lapsecam::export::{export, ExportMode};

/// lapsecam - Webcam time-lapse capture and export
#[derive(Parser, Debug)]
#[command(
    name = "lapsecam",
    about = "Webcam time-lapse capture with interval scheduling and GIF/MP4 export",
    after_help = "ENVIRONMENT VARIABLES:\n\
        LAPSECAM_WARMUP_FRAMES      Frames discarded after device open\n\
        LAPSECAM_FAILURE_THRESHOLD  Consecutive read failures before abort\n\
        LAPSECAM_POLL_MS            Capture loop polling cadence (ms)\n\
        LAPSECAM_JPEG_QUALITY       JPEG quality for stored frames\n\
        LAPSECAM_FRAME_DELAY_MS     Per-frame delay for GIF export (ms)\n\
        LAPSECAM_FPS                Frame rate for MP4 export"
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Artifact kind for export
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ModeArg {
    /// Animated GIF with a fixed per-frame delay, looping forever
    Gif,
    /// H.264 MP4 at a fixed frame rate (requires ffmpeg on PATH)
    Mp4,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a time-lapse capture session
    Capture {
        /// Camera device index
        #[arg(short, long, default_value = "0")]
        device: u32,

        /// Use the synthetic mock camera instead of real hardware
        #[arg(long)]
        mock: bool,

        /// Filename prefix for stored frames (also the default folder name)
        #[arg(short, long, default_value = "timelapse")]
        prefix: String,

        /// Seconds between captures
        #[arg(short, long, default_value = "10")]
        interval: u64,

        /// Total session length in seconds
        #[arg(short = 'D', long, default_value = "300")]
        duration: u64,

        /// Output directory (default: ./<prefix>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export the captured sequence after the session ends
        #[arg(long, value_enum)]
        export: Option<ModeArg>,

        /// Output the session summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a stored frame sequence as a GIF or MP4
    Export {
        /// Directory containing the stored frames
        #[arg(short, long)]
        input: PathBuf,

        /// Artifact kind
        #[arg(short, long, value_enum, default_value = "gif")]
        mode: ModeArg,

        /// Output path (default: <input>/<dirname>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frame rate for MP4 export
        #[arg(long, env = "LAPSECAM_FPS")]
        fps: Option<u32>,

        /// Per-frame display duration for GIF export (milliseconds)
        #[arg(long, env = "LAPSECAM_FRAME_DELAY_MS")]
        frame_delay: Option<u32>,

        /// Output the artifact description as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available camera devices
    Devices,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Capture {
            device,
            mock,
            prefix,
            interval,
            duration,
            output,
            export: export_mode,
            json,
        } => {
            // Folder-per-prefix convention when no explicit output is given
            let output_dir = output.unwrap_or_else(|| PathBuf::from(".").join(&prefix));
            let config = CaptureConfig::new(&prefix, &output_dir, interval, duration);
            let mut session = CaptureSession::new(config)?;

            #[cfg(unix)]
            install_stop_handler(session.handle());

            let summary = if mock {
                session.run(MockCamera::new(1280, 720))?
            } else {
                run_device_session(&mut session, device)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Captured {} frames to {} ({} skipped, {:?} after {}s)",
                    summary.frames_captured,
                    summary.output_directory.display(),
                    summary.frames_skipped,
                    summary.outcome,
                    summary.elapsed_seconds
                );
            }

            if let Some(mode_arg) = export_mode {
                let mode = resolve_mode(mode_arg, None, None);
                let out_path = output_dir.join(format!("{}.{}", prefix, mode.extension()));
                let artifact = export(&output_dir, mode, &out_path)?;
                println!(
                    "Exported {} frames to {}",
                    artifact.frame_count,
                    artifact.path.display()
                );
            }
        }

        Commands::Export {
            input,
            mode,
            output,
            fps,
            frame_delay,
            json,
        } => {
            let mode = resolve_mode(mode, fps, frame_delay);
            let out_path = output.unwrap_or_else(|| default_artifact_path(&input, &mode));
            let artifact = export(&input, mode, &out_path)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&artifact)?);
            } else {
                println!(
                    "Exported {} frames ({} skipped) to {} at {}x{}",
                    artifact.frame_count,
                    artifact.frames_skipped,
                    artifact.path.display(),
                    artifact.width,
                    artifact.height
                );
            }
        }

        Commands::Devices => list_cameras()?,
    }

    Ok(())
}

/// Turn CLI mode + optional overrides into an export mode, falling back to
/// the environment-backed defaults
fn resolve_mode(mode: ModeArg, fps: Option<u32>, frame_delay: Option<u32>) -> ExportMode {
    let defaults = &config::get().export;
    match mode {
        ModeArg::Gif => ExportMode::Gif {
            frame_delay: Duration::from_millis(
                u64::from(frame_delay.unwrap_or(defaults.frame_delay_ms)),
            ),
        },
        ModeArg::Mp4 => ExportMode::Mp4 {
            fps: fps.unwrap_or(defaults.fps).max(1),
        },
    }
}

/// Default artifact path: `<input>/<dirname>.<ext>`
fn default_artifact_path(input: &std::path::Path, mode: &ExportMode) -> PathBuf {
    let stem = input
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "export".to_string());
    input.join(format!("{}.{}", stem, mode.extension()))
}

#[cfg(feature = "camera")]
fn run_device_session(
    session: &mut CaptureSession,
    device: u32,
) -> Result<lapsecam::capture::SessionSummary, Box<dyn Error>> {
    let camera = lapsecam::capture::DeviceCamera::open(device)?;
    Ok(session.run(camera)?)
}

#[cfg(not(feature = "camera"))]
fn run_device_session(
    _session: &mut CaptureSession,
    device: u32,
) -> Result<lapsecam::capture::SessionSummary, Box<dyn Error>> {
    Err(format!(
        "device {} requested but this build has no camera support; \
         rebuild with --features camera or use --mock",
        device
    )
    .into())
}

#[cfg(feature = "camera")]
fn list_cameras() -> Result<(), Box<dyn Error>> {
    let devices = lapsecam::capture::list_devices()?;
    if devices.is_empty() {
        println!("No cameras found");
    }
    for (index, name) in devices {
        println!("{}: {}", index, name);
    }
    Ok(())
}

#[cfg(not(feature = "camera"))]
fn list_cameras() -> Result<(), Box<dyn Error>> {
    Err("this build has no camera support; rebuild with --features camera".into())
}

/// Route SIGINT to the session's stop flag so ctrl-c ends the session
/// cleanly (frames flushed, camera released) instead of killing the process
#[cfg(unix)]
fn install_stop_handler(handle: lapsecam::capture::SessionHandle) {
    use lapsecam::capture::SessionHandle;
    use nix::sys::signal::{self, SigHandler, Signal};
    use std::sync::OnceLock;

    static HANDLE: OnceLock<SessionHandle> = OnceLock::new();

    extern "C" fn on_sigint(_: libc::c_int) {
        // Only the atomic store happens here; async-signal-safe
        if let Some(handle) = HANDLE.get() {
            handle.stop();
        }
    }

    let _ = HANDLE.set(handle);
    unsafe {
        let _ = signal::signal(Signal::SIGINT, SigHandler::Handler(on_sigint));
    }
}
