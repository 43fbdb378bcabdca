//! Frame persistence for capture sessions.
//!
//! Frames are written to a flat per-session directory as JPEGs named
//! `{prefix}-{elapsed:0W}-sec.jpg`. The pad width `W` is derived from the
//! configured session duration so that lexicographic filename order always
//! matches elapsed-seconds order, the invariant the exporter depends on.
//!
//! Directory writability is probed once at session start; per-frame write
//! failures are reported to the caller but the session treats them as
//! non-fatal (one bad frame must not lose the rest of the capture).

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::capture::{CaptureConfig, RawFrame};
use crate::config::MIN_PAD_WIDTH;

/// Filename of the informational session manifest
pub const MANIFEST_FILENAME: &str = ".session.json";

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Error types for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Output directory cannot be created or written (fatal at session start)
    #[error("directory {path} is not writable: {source}")]
    DirectoryUnwritable {
        /// The directory that failed the probe
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A single frame failed to encode (non-fatal, skipped by the session)
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    /// I/O error while writing a frame or manifest
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Zero-pad width covering every elapsed-seconds value a session of the
/// given duration can produce, never below [`MIN_PAD_WIDTH`]
pub fn pad_width(duration_seconds: u64) -> usize {
    let digits = duration_seconds.to_string().len();
    digits.max(MIN_PAD_WIDTH)
}

/// Extract the elapsed-seconds ordering key from a stored frame filename.
///
/// Matches the `-{digits}-sec` tail before a jpg/jpeg/png extension.
/// Returns `None` for anything else (manifests, partial artifacts, foreign
/// files), which is how the exporter filters a directory.
pub fn parse_elapsed_seconds(filename: &str) -> Option<u64> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if !matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png") {
        return None;
    }
    let head = stem.strip_suffix("-sec")?;
    let (_, digits) = head.rsplit_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Writes captured frames into one session directory.
#[derive(Debug)]
pub struct StorageWriter {
    dir: PathBuf,
    prefix: String,
    pad_width: usize,
    jpeg_quality: u8,
}

impl StorageWriter {
    /// Create the session directory (if absent) and probe it for write
    /// permission once, so an unwritable destination fails the session at
    /// start instead of per-frame.
    pub fn create(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        duration_seconds: u64,
        jpeg_quality: u8,
    ) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::DirectoryUnwritable {
            path: dir.clone(),
            source,
        })?;
        probe_writable(&dir)?;

        Ok(Self {
            dir,
            prefix: prefix.into(),
            pad_width: pad_width(duration_seconds),
            jpeg_quality,
        })
    }

    /// Session directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pad width used for the elapsed-seconds field
    pub fn pad_width(&self) -> usize {
        self.pad_width
    }

    /// Filename for a frame captured at `elapsed_seconds`
    pub fn filename(&self, elapsed_seconds: u64) -> String {
        format!(
            "{}-{:0width$}-sec.jpg",
            self.prefix,
            elapsed_seconds,
            width = self.pad_width
        )
    }

    /// Full path for a frame captured at `elapsed_seconds`
    pub fn frame_path(&self, elapsed_seconds: u64) -> PathBuf {
        self.dir.join(self.filename(elapsed_seconds))
    }

    /// Encode one frame as JPEG and write it to its deterministic path.
    ///
    /// Returns the written path. Errors here are per-frame; the session
    /// logs and skips them.
    pub fn write(&self, frame: &RawFrame, elapsed_seconds: u64) -> StorageResult<PathBuf> {
        let path = self.frame_path(elapsed_seconds);
        let file = File::create(&path)?;
        let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), self.jpeg_quality);
        encoder.encode(
            frame.as_bytes(),
            frame.width(),
            frame.height(),
            image::ColorType::Rgb8,
        )?;
        Ok(path)
    }

    /// Write the informational `.session.json` manifest.
    ///
    /// Records the session config and start timestamp. Export ordering is
    /// still re-derived from filenames so directories from earlier tool
    /// versions stay exportable.
    pub fn write_manifest(&self, config: &CaptureConfig) -> StorageResult<()> {
        let manifest = serde_json::json!({
            "created": Utc::now().to_rfc3339(),
            "pad_width": self.pad_width,
            "config": config,
        });
        let path = self.dir.join(MANIFEST_FILENAME);
        fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(())
    }
}

/// Write-and-delete a probe file to confirm the directory accepts writes
fn probe_writable(dir: &Path) -> StorageResult<()> {
    let probe = dir.join(".write-probe");
    match fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(source) => Err(StorageError::DirectoryUnwritable {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pad_width_from_duration() {
        assert_eq!(pad_width(12), 3);
        assert_eq!(pad_width(999), 3);
        assert_eq!(pad_width(1000), 4);
        assert_eq!(pad_width(5400), 4);
        assert_eq!(pad_width(100_000), 6);
    }

    #[test]
    fn test_parse_elapsed_seconds() {
        assert_eq!(parse_elapsed_seconds("test-000-sec.jpg"), Some(0));
        assert_eq!(parse_elapsed_seconds("test-005-sec.jpg"), Some(5));
        assert_eq!(parse_elapsed_seconds("my-lapse-1234-sec.jpeg"), Some(1234));
        assert_eq!(parse_elapsed_seconds("frame-07-sec.PNG"), Some(7));
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert_eq!(parse_elapsed_seconds(".session.json"), None);
        assert_eq!(parse_elapsed_seconds("test-abc-sec.jpg"), None);
        assert_eq!(parse_elapsed_seconds("test-010.jpg"), None);
        assert_eq!(parse_elapsed_seconds("test-010-sec.gif"), None);
        assert_eq!(parse_elapsed_seconds("notaframe.jpg"), None);
        assert_eq!(parse_elapsed_seconds("output.mp4.part"), None);
    }

    #[test]
    fn test_filename_format() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StorageWriter::create(dir.path(), "test", 12, 85).unwrap();
        assert_eq!(writer.filename(0), "test-000-sec.jpg");
        assert_eq!(writer.filename(5), "test-005-sec.jpg");
        assert_eq!(writer.filename(10), "test-010-sec.jpg");
    }

    #[test]
    fn test_lexicographic_order_matches_numeric() {
        let dir = tempfile::tempdir().unwrap();
        // Duration of 5400s forces a width of 4
        let writer = StorageWriter::create(dir.path(), "lapse", 5400, 85).unwrap();
        let elapsed = [0u64, 7, 42, 360, 999, 1000, 5399];
        let mut names: Vec<String> = elapsed.iter().map(|&e| writer.filename(e)).collect();
        let numeric = names.clone();
        names.sort();
        assert_eq!(names, numeric);
        // And the parsed keys round-trip
        for (&e, name) in elapsed.iter().zip(&numeric) {
            assert_eq!(parse_elapsed_seconds(name), Some(e));
        }
    }

    #[test]
    fn test_write_produces_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StorageWriter::create(dir.path(), "test", 60, 85).unwrap();
        let frame = RawFrame::with_color(16, 8, [200, 100, 50]);

        let path = writer.write(&frame, 5).unwrap();
        assert!(path.ends_with("test-005-sec.jpg"));

        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 8);
    }

    #[test]
    fn test_create_fails_on_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the directory should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"x").unwrap();

        let result = StorageWriter::create(&blocker, "test", 60, 85);
        assert!(matches!(
            result,
            Err(StorageError::DirectoryUnwritable { .. })
        ));
    }

    #[test]
    fn test_manifest_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StorageWriter::create(dir.path(), "test", 12, 85).unwrap();
        let config = CaptureConfig::new("test", dir.path(), 5, 12);
        writer.write_manifest(&config).unwrap();

        let raw = fs::read_to_string(dir.path().join(MANIFEST_FILENAME)).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(manifest["pad_width"], 3);
        assert_eq!(manifest["config"]["interval_seconds"], 5);
    }
}
