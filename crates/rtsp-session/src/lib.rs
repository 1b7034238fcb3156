//! Live preview and recording engine for a single RTSP camera.
//!
//! ```text
//!   SessionController::request_start(base_url)
//!         │
//!         ├── StreamProbe (ffprobe)       ← preview + main sub-streams
//!         ├── RecorderProcess (ffmpeg)    → ~/rtsp_saved/<day>/saved_<ts>.mp4
//!         ├── FrameDecoderProcess (ffmpeg) → rgb24 on stdout
//!         └── DisplayScheduler thread
//!                 └── FramePump::read_frame() every 1/fps
//!                         └── every Nth frame → SchedulerEvent::Frame → UI
//! ```

pub mod backend;
pub mod error;
pub mod probe;
pub mod process;
pub mod pump;
pub mod scheduler;
pub mod session;

pub use backend::{FfmpegBackend, MediaBackend};
pub use error::{Feed, LaunchError, ProbeError, PumpError, SchedulerError, SessionError};
pub use process::{ProcessControl, ProcessHandle, ProcessKind};
pub use pump::{FramePump, PumpRead};
pub use scheduler::{DisplayScheduler, FrameThrottle, SchedulerEvent, SchedulerSettings, TickStats};
pub use session::{SessionController, SessionInfo, SessionSettings, StartOutcome};
