use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which of the camera's two feeds an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Preview,
    Record,
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feed::Preview => f.write_str("preview sub-stream"),
            Feed::Record => f.write_str("main stream"),
        }
    }
}

/// Why a stream could not be probed. Always returned, never raised.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("ffprobe binary not found")]
    BinaryMissing,
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("ffprobe gave no answer within {0:?}")]
    Timeout(Duration),
    #[error("ffprobe exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unreadable ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("stream has no video track")]
    NoVideo,
    #[error("video track reports invalid size {width}x{height}")]
    BadGeometry { width: i64, height: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    /// The pipe delivered part of a frame and then closed. The byte stream can
    /// no longer be split into frames.
    #[error("decoder pipe out of sync: expected {expected} bytes, got {got}")]
    Desync { expected: usize, got: usize },
    #[error("decoder pipe read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("ffmpeg binary not found")]
    BinaryMissing,
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("decoder has no output pipe")]
    NoOutput,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("display scheduler already running")]
    AlreadyRunning,
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Why `SessionController::request_start` did not produce a running session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no camera URL given")]
    EmptyUrl,
    #[error("cannot connect to {base_url}: {feed} probe failed: {source}")]
    Probe {
        base_url: String,
        feed: Feed,
        #[source]
        source: ProbeError,
    },
    #[error("{process} failed to start: {source}")]
    Launch {
        process: crate::process::ProcessKind,
        #[source]
        source: LaunchError,
    },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl SessionError {
    /// Base URL named by a connection failure.
    pub fn base_url(&self) -> Option<&str> {
        match self {
            SessionError::Probe { base_url, .. } => Some(base_url),
            _ => None,
        }
    }
}
