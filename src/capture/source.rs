//! Frame source abstraction for camera capture.
//!
//! This module provides a unified interface over different frame producers:
//! - `DeviceCamera` for real webcams via nokhwa (feature `camera`)
//! - `MockCamera` for testing and hardware-less runs
//!
//! Sources are acquired by constructing them and released by dropping them;
//! a capture session takes its source by value so every exit path out of
//! the loop releases the device.

use image::{ImageBuffer, RgbImage};

use super::types::ReadError;

/// One raw frame pulled from a source.
///
/// Owned RGB pixel buffer (row-major, 3 bytes per pixel), immutable once
/// handed to the storage writer.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Width in pixels
    width: u32,
    /// Height in pixels
    height: u32,
    /// RGB pixel buffer
    data: Vec<u8>,
}

impl RawFrame {
    /// Create a frame with the given dimensions, initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        let data = vec![0u8; (width * height * 3) as usize];
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a frame filled with a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut frame = Self::new(width, height);
        frame.fill(color);
        frame
    }

    /// Build a frame from raw RGB bytes, validating the buffer length
    pub fn from_raw_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ReadError> {
        let expected = (width * height * 3) as usize;
        if data.len() != expected {
            return Err(ReadError::Transient(format!(
                "buffer size mismatch: expected {} bytes, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Fill the entire frame with a color
    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.data.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Convert to an image buffer
    pub fn to_image(&self) -> RgbImage {
        ImageBuffer::from_raw(self.width, self.height, self.data.clone())
            .expect("buffer length validated at construction")
    }
}

impl From<RgbImage> for RawFrame {
    fn from(img: RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            data: img.into_raw(),
        }
    }
}

/// Trait for frame sources.
///
/// Implementations yield one frame per `read` call or reject with a
/// [`ReadError`]. Whether a failed read is survivable is the session's
/// policy, not the source's: sources report, the session counts.
pub trait FrameSource {
    /// Pull one frame
    fn read(&mut self) -> Result<RawFrame, ReadError>;

    /// Source type identifier (e.g., "device", "mock")
    fn source_type(&self) -> &str;

    /// Current frame width in pixels
    fn width(&self) -> u32;

    /// Current frame height in pixels
    fn height(&self) -> u32;
}

/// A synthetic frame source for testing and hardware-less capture.
///
/// Produces a solid-color frame whose brightness steps with every read, so
/// exported sequences visibly animate. Test hooks:
/// - `fail_next_reads()` injects transient read failures
/// - `on_read()` runs a callback after each read with the read count,
///   letting tests stop a session or mutate the filesystem mid-loop
pub struct MockCamera {
    width: u32,
    height: u32,
    base_color: [u8; 3],
    reads: u64,
    pending_failures: u32,
    read_hook: Option<Box<dyn FnMut(u64)>>,
}

impl std::fmt::Debug for MockCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCamera")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("reads", &self.reads)
            .field("pending_failures", &self.pending_failures)
            .finish()
    }
}

impl MockCamera {
    /// Create a mock camera producing frames of the given dimensions
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            base_color: [32, 96, 160],
            reads: 0,
            pending_failures: 0,
            read_hook: None,
        }
    }

    /// Set the base frame color
    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.base_color = color;
        self
    }

    /// Make the next `count` reads fail with a transient error
    pub fn fail_next_reads(&mut self, count: u32) {
        self.pending_failures = count;
    }

    /// Install a callback invoked after every successful or failed read
    /// with the total read count (1-based)
    pub fn on_read(mut self, hook: impl FnMut(u64) + 'static) -> Self {
        self.read_hook = Some(Box::new(hook));
        self
    }

    /// Total reads performed so far
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl FrameSource for MockCamera {
    fn read(&mut self) -> Result<RawFrame, ReadError> {
        self.reads += 1;
        let reads = self.reads;
        let result = if self.pending_failures > 0 {
            self.pending_failures -= 1;
            Err(ReadError::Transient("injected failure".to_string()))
        } else {
            // Step the red channel with the read count so frames differ
            let mut color = self.base_color;
            color[0] = color[0].wrapping_add((reads % 256) as u8);
            Ok(RawFrame::with_color(self.width, self.height, color))
        };
        if let Some(hook) = self.read_hook.as_mut() {
            hook(reads);
        }
        result
    }

    fn source_type(&self) -> &str {
        "mock"
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(feature = "camera")]
pub use device::{list_devices, DeviceCamera};

#[cfg(feature = "camera")]
mod device {
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;

    use super::{FrameSource, RawFrame};
    use crate::capture::types::{CaptureError, CaptureResult, ReadError};

    /// A real webcam opened through nokhwa.
    ///
    /// The stream is opened in the constructor and stopped on drop, so a
    /// session that exits for any reason releases the device.
    pub struct DeviceCamera {
        camera: Camera,
        index: u32,
    }

    impl DeviceCamera {
        /// Open the camera at `index` and start its stream
        pub fn open(index: u32) -> CaptureResult<Self> {
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
            let mut camera = Camera::new(CameraIndex::Index(index), requested).map_err(|e| {
                CaptureError::DeviceUnavailable {
                    device: index,
                    reason: e.to_string(),
                }
            })?;
            camera
                .open_stream()
                .map_err(|e| CaptureError::DeviceUnavailable {
                    device: index,
                    reason: e.to_string(),
                })?;
            Ok(Self { camera, index })
        }

        /// Device index this camera was opened with
        pub fn index(&self) -> u32 {
            self.index
        }
    }

    impl FrameSource for DeviceCamera {
        fn read(&mut self) -> Result<RawFrame, ReadError> {
            let buffer = self
                .camera
                .frame()
                .map_err(|e| ReadError::Transient(e.to_string()))?;
            let image = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| ReadError::Transient(e.to_string()))?;
            Ok(RawFrame::from(image))
        }

        fn source_type(&self) -> &str {
            "device"
        }

        fn width(&self) -> u32 {
            self.camera.resolution().width()
        }

        fn height(&self) -> u32 {
            self.camera.resolution().height()
        }
    }

    impl Drop for DeviceCamera {
        fn drop(&mut self) {
            let _ = self.camera.stop_stream();
        }
    }

    /// Enumerate attached cameras as (index, human name) pairs
    pub fn list_devices() -> CaptureResult<Vec<(u32, String)>> {
        let devices = nokhwa::query(ApiBackend::Auto).map_err(|e| {
            CaptureError::DeviceUnavailable {
                device: 0,
                reason: e.to_string(),
            }
        })?;
        Ok(devices
            .iter()
            .enumerate()
            .map(|(i, info)| (i as u32, info.human_name()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_frame_new() {
        let frame = RawFrame::new(4, 2);
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.as_bytes().len(), 4 * 2 * 3);
        assert!(frame.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_raw_frame_from_raw_rgb_validates_length() {
        assert!(RawFrame::from_raw_rgb(2, 2, vec![0u8; 12]).is_ok());
        assert!(RawFrame::from_raw_rgb(2, 2, vec![0u8; 11]).is_err());
    }

    #[test]
    fn test_raw_frame_fill() {
        let frame = RawFrame::with_color(3, 3, [10, 20, 30]);
        assert_eq!(&frame.as_bytes()[..3], &[10, 20, 30]);
        assert_eq!(&frame.as_bytes()[24..27], &[10, 20, 30]);
    }

    #[test]
    fn test_mock_camera_reads() {
        let mut camera = MockCamera::new(8, 8);
        let first = camera.read().unwrap();
        let second = camera.read().unwrap();
        assert_eq!(camera.reads(), 2);
        assert_eq!(first.width(), 8);
        // Frames step over time
        assert_ne!(first.as_bytes()[0], second.as_bytes()[0]);
    }

    #[test]
    fn test_mock_camera_failure_injection() {
        let mut camera = MockCamera::new(8, 8);
        camera.fail_next_reads(2);
        assert!(camera.read().is_err());
        assert!(camera.read().is_err());
        assert!(camera.read().is_ok());
    }

    #[test]
    fn test_mock_camera_read_hook_sees_count() {
        use std::cell::Cell;
        use std::rc::Rc;

        let seen = Rc::new(Cell::new(0u64));
        let seen_clone = Rc::clone(&seen);
        let mut camera = MockCamera::new(4, 4).on_read(move |n| seen_clone.set(n));
        camera.read().unwrap();
        camera.read().unwrap();
        assert_eq!(seen.get(), 2);
    }
}
