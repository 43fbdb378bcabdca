pub mod scheduler;
pub mod session;
pub mod source;
pub mod types;

pub use scheduler::IntervalScheduler;
pub use session::{CaptureSession, Clock, ManualClock, SessionHandle, SessionState, WallClock};
#[cfg(feature = "camera")]
pub use source::{list_devices, DeviceCamera};
pub use source::{FrameSource, MockCamera, RawFrame};
pub use types::{
    CaptureConfig, CaptureError, CaptureResult, ReadError, SessionOutcome, SessionSummary,
};
