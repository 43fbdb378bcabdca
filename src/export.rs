//! Batch export of a stored frame sequence into a single artifact.
//!
//! Reads every stored frame in a session directory, orders them by the
//! elapsed-seconds number embedded in their filenames (directory listing
//! order is unreliable across filesystems), and produces either an
//! animated GIF or an MP4 video. The canvas size comes from the first
//! frame in the sequence; every later frame is resized to match.
//!
//! Artifacts are written to a `.part` path and renamed into place on
//! success, so a failed export never leaves a half-written file that looks
//! like output. Corrupt individual frames are skipped with a warning, the
//! same fire-and-forget policy the storage writer applies on the way in.

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{Delay, DynamicImage, Frame, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::storage::parse_elapsed_seconds;

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Error types for export operations
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Directory held no decodable stored frames (fatal to this export call)
    #[error("no images found in {}", dir.display())]
    NoImagesFound {
        /// The directory that was scanned
        dir: PathBuf,
    },

    /// I/O error reading frames or writing the artifact
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error on the artifact itself
    #[error("image error: {0}")]
    Encode(#[from] image::ImageError),

    /// The external video encoder (ffmpeg) failed or is missing
    #[error("video encoder error: {0}")]
    VideoEncoder(String),
}

/// What kind of artifact to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Animated GIF with a fixed per-frame display duration, looping forever
    Gif {
        /// Display duration of each frame
        frame_delay: Duration,
    },
    /// H.264 MP4 at a fixed frame rate, one output frame per stored image
    Mp4 {
        /// Output frame rate
        fps: u32,
    },
}

impl ExportMode {
    /// File extension for this mode's artifact
    pub fn extension(&self) -> &'static str {
        match self {
            ExportMode::Gif { .. } => "gif",
            ExportMode::Mp4 { .. } => "mp4",
        }
    }
}

/// A successfully produced artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportArtifact {
    /// Where the artifact was written
    pub path: PathBuf,

    /// Frames included, in elapsed-seconds order
    pub frame_count: usize,

    /// Corrupt/unreadable source images that were skipped
    pub frames_skipped: usize,

    /// Canvas width (from the first frame)
    pub width: u32,

    /// Canvas height (from the first frame)
    pub height: u32,
}

/// Export the stored frame sequence in `directory` as `mode` to
/// `output_path`.
///
/// Repeated calls over an unchanged directory produce artifacts with the
/// same frame count and order.
pub fn export(directory: &Path, mode: ExportMode, output_path: &Path) -> ExportResult<ExportArtifact> {
    let entries = scan_frames(directory)?;
    if entries.is_empty() {
        return Err(ExportError::NoImagesFound {
            dir: directory.to_path_buf(),
        });
    }
    debug!(frames = entries.len(), dir = %directory.display(), "scanned frame sequence");

    let mut reader = SequenceReader::new(entries);
    // The first decodable frame fixes the canvas; without one there is
    // nothing to export
    let first = reader.next_frame().ok_or_else(|| ExportError::NoImagesFound {
        dir: directory.to_path_buf(),
    })?;
    let (width, height) = (first.width(), first.height());

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let part_path = part_path_for(output_path);

    let encode_result = match mode {
        ExportMode::Gif { frame_delay } => {
            encode_gif(&part_path, first, &mut reader, frame_delay)
        }
        ExportMode::Mp4 { fps } => encode_mp4(&part_path, first, &mut reader, fps),
    };

    let frame_count = match encode_result {
        Ok(count) => count,
        Err(e) => {
            // Never leave a half-written artifact behind
            let _ = fs::remove_file(&part_path);
            return Err(e);
        }
    };

    fs::rename(&part_path, output_path)?;
    info!(
        path = %output_path.display(),
        frame_count,
        frames_skipped = reader.skipped,
        "export complete"
    );

    Ok(ExportArtifact {
        path: output_path.to_path_buf(),
        frame_count,
        frames_skipped: reader.skipped,
        width,
        height,
    })
}

/// Collect stored frames from `directory`, sorted ascending by the
/// elapsed-seconds number parsed from each filename
fn scan_frames(directory: &Path) -> ExportResult<Vec<(u64, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(elapsed) = parse_elapsed_seconds(&name.to_string_lossy()) {
            entries.push((elapsed, path));
        }
    }
    entries.sort();
    Ok(entries)
}

/// Streams the ordered sequence, decoding frames one at a time, resizing
/// everything after the first to the first frame's dimensions and skipping
/// corrupt images with a warning.
struct SequenceReader {
    entries: VecDeque<(u64, PathBuf)>,
    canvas: Option<(u32, u32)>,
    skipped: usize,
}

impl SequenceReader {
    fn new(entries: Vec<(u64, PathBuf)>) -> Self {
        Self {
            entries: entries.into(),
            canvas: None,
            skipped: 0,
        }
    }

    fn next_frame(&mut self) -> Option<RgbaImage> {
        while let Some((_, path)) = self.entries.pop_front() {
            match image::open(&path) {
                Ok(img) => {
                    let rgba = img.to_rgba8();
                    let (w, h) = *self
                        .canvas
                        .get_or_insert((rgba.width(), rgba.height()));
                    if rgba.width() == w && rgba.height() == h {
                        return Some(rgba);
                    }
                    return Some(image::imageops::resize(&rgba, w, h, FilterType::Lanczos3));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt image skipped");
                    self.skipped += 1;
                }
            }
        }
        None
    }
}

/// Encode the sequence as an infinitely looping animated GIF.
/// Returns the number of frames written.
fn encode_gif(
    part_path: &Path,
    first: RgbaImage,
    reader: &mut SequenceReader,
    frame_delay: Duration,
) -> ExportResult<usize> {
    let file = File::create(part_path)?;
    // Speed 10 trades palette quality for not taking minutes on HD frames
    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), 10);
    encoder.set_repeat(Repeat::Infinite)?;

    let delay = Delay::from_saturating_duration(frame_delay);
    let mut count = 0usize;
    let mut next = Some(first);
    while let Some(img) = next {
        encoder.encode_frame(Frame::from_parts(img, 0, 0, delay))?;
        count += 1;
        next = reader.next_frame();
    }
    Ok(count)
}

/// Encode the sequence as an H.264 MP4 by piping PNG frames through an
/// ffmpeg subprocess. Returns the number of frames written.
fn encode_mp4(
    part_path: &Path,
    first: RgbaImage,
    reader: &mut SequenceReader,
    fps: u32,
) -> ExportResult<usize> {
    let mut child = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error"])
        .args(["-f", "image2pipe"])
        .args(["-framerate", &fps.to_string()])
        .args(["-i", "-"])
        .args(["-c:v", "libx264"])
        .args(["-pix_fmt", "yuv420p"])
        // libx264 requires even dimensions
        .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"])
        .args(["-movflags", "+faststart"])
        .args(["-f", "mp4"])
        .arg(part_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExportError::VideoEncoder(format!("failed to spawn ffmpeg: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ExportError::VideoEncoder("ffmpeg stdin unavailable".to_string()))?;

    let mut count = 0usize;
    let mut next = Some(first);
    let write_result: ExportResult<()> = (|| {
        while let Some(img) = next.take() {
            let mut bytes = Vec::new();
            DynamicImage::ImageRgba8(img)
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
            stdin.write_all(&bytes)?;
            count += 1;
            next = reader.next_frame();
        }
        Ok(())
    })();
    drop(stdin);

    let output = child.wait_with_output()?;
    // Exit status first: an early ffmpeg exit breaks the pipe, and its
    // stderr says what actually went wrong
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExportError::VideoEncoder(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    write_result?;
    Ok(count)
}

/// In-progress path for an artifact (`<output>.part`)
fn part_path_for(output_path: &Path) -> PathBuf {
    let mut os = output_path.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 3]) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(color));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_scan_sorts_by_parsed_number_not_listing_order() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), "test-010-sec.jpg", 8, 8, [0, 0, 0]);
        write_jpeg(dir.path(), "test-000-sec.jpg", 8, 8, [0, 0, 0]);
        write_jpeg(dir.path(), "test-005-sec.jpg", 8, 8, [0, 0, 0]);
        std::fs::write(dir.path().join(".session.json"), b"{}").unwrap();

        let entries = scan_frames(dir.path()).unwrap();
        let elapsed: Vec<u64> = entries.iter().map(|(e, _)| *e).collect();
        assert_eq!(elapsed, vec![0, 5, 10]);
    }

    #[test]
    fn test_export_gif_three_frames_resized_to_first() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), "test-000-sec.jpg", 32, 24, [255, 0, 0]);
        write_jpeg(dir.path(), "test-005-sec.jpg", 16, 16, [0, 255, 0]);
        write_jpeg(dir.path(), "test-010-sec.jpg", 64, 48, [0, 0, 255]);

        let out = dir.path().join("out.gif");
        let artifact = export(
            dir.path(),
            ExportMode::Gif {
                frame_delay: Duration::from_millis(500),
            },
            &out,
        )
        .unwrap();

        assert_eq!(artifact.frame_count, 3);
        assert_eq!(artifact.frames_skipped, 0);
        assert_eq!((artifact.width, artifact.height), (32, 24));
        assert!(out.exists());
        assert!(!part_path_for(&out).exists());

        // Decode the GIF back and confirm frame count and uniform canvas
        use image::AnimationDecoder;
        let decoder =
            image::codecs::gif::GifDecoder::new(File::open(&out).unwrap()).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.buffer().width(), 32);
            assert_eq!(frame.buffer().height(), 24);
        }
    }

    #[test]
    fn test_export_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.gif");
        let result = export(
            dir.path(),
            ExportMode::Gif {
                frame_delay: Duration::from_millis(500),
            },
            &out,
        );
        assert!(matches!(result, Err(ExportError::NoImagesFound { .. })));
        assert!(!out.exists());
    }

    #[test]
    fn test_export_all_corrupt_fails_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test-000-sec.jpg"), b"not a jpeg").unwrap();
        std::fs::write(dir.path().join("test-005-sec.jpg"), b"also not").unwrap();

        let out = dir.path().join("out.gif");
        let result = export(
            dir.path(),
            ExportMode::Gif {
                frame_delay: Duration::from_millis(500),
            },
            &out,
        );
        assert!(matches!(result, Err(ExportError::NoImagesFound { .. })));
        assert!(!out.exists());
        assert!(!part_path_for(&out).exists());
    }

    #[test]
    fn test_export_skips_corrupt_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), "test-000-sec.jpg", 16, 16, [255, 0, 0]);
        std::fs::write(dir.path().join("test-005-sec.jpg"), b"garbage").unwrap();
        write_jpeg(dir.path(), "test-010-sec.jpg", 16, 16, [0, 0, 255]);

        let out = dir.path().join("out.gif");
        let artifact = export(
            dir.path(),
            ExportMode::Gif {
                frame_delay: Duration::from_millis(100),
            },
            &out,
        )
        .unwrap();

        assert_eq!(artifact.frame_count, 2);
        assert_eq!(artifact.frames_skipped, 1);
    }

    #[test]
    fn test_export_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), "test-000-sec.jpg", 16, 16, [10, 20, 30]);
        write_jpeg(dir.path(), "test-005-sec.jpg", 16, 16, [40, 50, 60]);

        let mode = ExportMode::Gif {
            frame_delay: Duration::from_millis(500),
        };
        let out = dir.path().join("out.gif");
        let first = export(dir.path(), mode, &out).unwrap();
        let second = export(dir.path(), mode, &out).unwrap();

        assert_eq!(first.frame_count, second.frame_count);
        assert_eq!((first.width, first.height), (second.width, second.height));
    }

    #[test]
    #[cfg(unix)]
    fn test_mp4_encoder_exit_failure_reports_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_jpeg(dir.path(), "test-000-sec.jpg", 16, 16, [1, 2, 3]);

        // A stand-in encoder that exits without reading stdin. The pipe
        // write may fail, but the reported error must carry the encoder's
        // stderr, not a broken-pipe I/O error.
        let bin = tempfile::tempdir().unwrap();
        let stub = bin.path().join("ffmpeg");
        std::fs::write(&stub, "#!/bin/sh\necho 'encoder exploded' >&2\nexit 1\n").unwrap();
        let mut perms = std::fs::metadata(&stub).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&stub, perms).unwrap();

        let original_path = std::env::var_os("PATH").unwrap_or_default();
        let mut prefixed = bin.path().as_os_str().to_os_string();
        prefixed.push(":");
        prefixed.push(&original_path);
        std::env::set_var("PATH", &prefixed);

        let out = dir.path().join("out.mp4");
        let result = export(dir.path(), ExportMode::Mp4 { fps: 10 }, &out);

        std::env::set_var("PATH", &original_path);

        match result {
            Err(ExportError::VideoEncoder(message)) => {
                assert!(message.contains("encoder exploded"), "{message}");
            }
            other => panic!("expected a video encoder error, got {other:?}"),
        }
        assert!(!out.exists());
        assert!(!part_path_for(&out).exists());
    }

    #[test]
    fn test_part_path_for() {
        assert_eq!(
            part_path_for(Path::new("/tmp/out.gif")),
            PathBuf::from("/tmp/out.gif.part")
        );
    }

    #[test]
    fn test_mode_extensions() {
        assert_eq!(
            ExportMode::Gif {
                frame_delay: Duration::from_millis(500)
            }
            .extension(),
            "gif"
        );
        assert_eq!(ExportMode::Mp4 { fps: 10 }.extension(), "mp4");
    }
}
