use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use rtsp_proto::config::Config;
use rtsp_proto::platform;
use rtsp_proto::protocol::StreamGeometry;

use crate::error::{LaunchError, ProbeError};
use crate::probe::StreamProbe;
use crate::process::{FrameDecoderProcess, ProcessHandle, RecorderProcess};

/// Everything the session needs from the outside world.
pub trait MediaBackend: Send + Sync {
    fn probe(&self, url: &str) -> Result<StreamGeometry, ProbeError>;

    /// Start recording `url` into `output`.
    fn start_recorder(&self, url: &str, output: &Path) -> Result<ProcessHandle, LaunchError>;

    /// Start decoding `url`; the returned handle carries the frame pipe.
    fn start_decoder(&self, url: &str) -> Result<ProcessHandle, LaunchError>;
}

/// The real backend: ffprobe and two ffmpeg processes.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    probe: StreamProbe,
    decoder: FrameDecoderProcess,
    recorder: RecorderProcess,
}

impl FfmpegBackend {
    pub fn new(config: &Config) -> Self {
        let ffmpeg = platform::find_ffmpeg_binary();
        let ffprobe = platform::find_ffprobe_binary();
        match (&ffmpeg, &ffprobe) {
            (Some(m), Some(p)) => info!("using ffmpeg {:?}, ffprobe {:?}", m, p),
            _ => warn!(
                "ffmpeg {:?} / ffprobe {:?}: missing binaries will fail at connect",
                ffmpeg,
                ffprobe
            ),
        }
        let timeout = match config.stream.probe_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            probe: StreamProbe::new(ffprobe, timeout),
            decoder: FrameDecoderProcess::new(ffmpeg.clone(), platform::log_dir()),
            recorder: RecorderProcess::new(ffmpeg, platform::log_dir(), config.recorder.clone()),
        }
    }

    pub fn from_parts(
        probe: StreamProbe,
        decoder: FrameDecoderProcess,
        recorder: RecorderProcess,
    ) -> Self {
        Self {
            probe,
            decoder,
            recorder,
        }
    }
}

impl MediaBackend for FfmpegBackend {
    fn probe(&self, url: &str) -> Result<StreamGeometry, ProbeError> {
        self.probe.probe(url)
    }

    fn start_recorder(&self, url: &str, output: &Path) -> Result<ProcessHandle, LaunchError> {
        self.recorder.start(url, output)
    }

    fn start_decoder(&self, url: &str) -> Result<ProcessHandle, LaunchError> {
        self.decoder.start(url)
    }
}
