//! ffmpeg child processes: the preview decoder and the recorder.
//!
//! Each process is wrapped in a [`ProcessHandle`] that is owned by exactly one
//! place and terminated exactly once. Termination never waits for the child:
//! the recorder is asked to quit through stdin (so the MP4 gets its index
//! written) and is reaped on a background thread; the decoder is killed.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use rtsp_proto::config::RecorderConfig;

use crate::error::LaunchError;

/// How long a recorder gets to finalize its file after `q` before it is killed.
const RECORDER_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    Decoder,
    Recorder,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Decoder => f.write_str("preview decoder"),
            ProcessKind::Recorder => f.write_str("recorder"),
        }
    }
}

/// Something that can be told to go away.
pub trait ProcessControl: Send {
    fn id(&self) -> Option<u32>;

    /// Ask the process to exit. Must not block on the process exiting.
    fn terminate(self: Box<Self>) -> std::io::Result<()>;
}

/// How a real child is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStyle {
    /// Kill signal straight away.
    Kill,
    /// Write `q` to ffmpeg's stdin, kill after a grace period.
    QuitThenKill(Duration),
}

struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    style: StopStyle,
}

impl ProcessControl for ChildProcess {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn terminate(self: Box<Self>) -> std::io::Result<()> {
        let ChildProcess {
            mut child,
            stdin,
            style,
        } = *self;

        let grace = match (style, stdin) {
            (StopStyle::QuitThenKill(grace), Some(mut stdin)) => {
                match stdin.write_all(b"q").and_then(|_| stdin.flush()) {
                    Ok(()) => Some(grace),
                    Err(e) => {
                        debug!("process {}: quit request failed: {}", child.id(), e);
                        None
                    }
                }
            }
            _ => None,
        };

        if grace.is_none() {
            if let Err(e) = child.kill() {
                // Already exited is fine.
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    return Err(e);
                }
            }
        }

        std::thread::Builder::new()
            .name(format!("reap-{}", child.id()))
            .spawn(move || reap(child, grace))?;
        Ok(())
    }
}

fn reap(mut child: Child, grace: Option<Duration>) {
    let pid = child.id();
    if let Some(grace) = grace {
        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("process {}: exited with {}", pid, status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Ok(None) => {
                    warn!("process {}: still running {:?} after quit, killing", pid, grace);
                    let _ = child.kill();
                    break;
                }
                Err(e) => {
                    warn!("process {}: wait failed: {}", pid, e);
                    return;
                }
            }
        }
    }
    match child.wait() {
        Ok(status) => debug!("process {}: exited with {}", pid, status),
        Err(e) => warn!("process {}: wait failed: {}", pid, e),
    }
}

/// An owned external process plus the read end of its output pipe.
pub struct ProcessHandle {
    kind: ProcessKind,
    pid: Option<u32>,
    control: Option<Box<dyn ProcessControl>>,
    output: Option<Box<dyn Read + Send>>,
}

impl ProcessHandle {
    pub fn new(
        kind: ProcessKind,
        control: Box<dyn ProcessControl>,
        output: Option<Box<dyn Read + Send>>,
    ) -> Self {
        Self {
            kind,
            pid: control.id(),
            control: Some(control),
            output,
        }
    }

    /// Spawn `cmd`. Its stdin is always piped so `QuitThenKill` can reach it.
    pub fn spawn(kind: ProcessKind, cmd: &mut Command, style: StopStyle) -> std::io::Result<Self> {
        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        let output = child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>);
        info!("{}: started pid {}", kind, child.id());
        Ok(Self::new(
            kind,
            Box::new(ChildProcess {
                child,
                stdin,
                style,
            }),
            output,
        ))
    }

    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Hand the output pipe to its single reader.
    pub fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.output.take()
    }

    pub fn is_terminated(&self) -> bool {
        self.control.is_none()
    }

    /// Best-effort, fire-and-forget. Later calls do nothing.
    pub fn terminate(&mut self) {
        let Some(control) = self.control.take() else {
            return;
        };
        match control.terminate() {
            Ok(()) => info!("{}: terminate sent to pid {:?}", self.kind, self.pid),
            Err(e) => warn!("{}: terminate pid {:?} failed: {}", self.kind, self.pid, e),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("kind", &self.kind)
            .field("pid", &self.pid)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Terminate whatever occupies `slot`; an empty slot is a no-op.
pub fn stop_process(slot: &mut Option<ProcessHandle>) {
    if let Some(mut handle) = slot.take() {
        handle.terminate();
    }
}

/// Append-mode log file for a child's stderr, or `/dev/null` if it can't be opened.
fn stderr_sink(log_dir: &Path, name: &str) -> Stdio {
    let path = log_dir.join(name);
    let opened = std::fs::create_dir_all(log_dir).and_then(|_| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
    });
    match opened {
        Ok(file) => {
            debug!("logging ffmpeg stderr to {:?}", path);
            Stdio::from(file)
        }
        Err(e) => {
            warn!("cannot open {:?}: {}, discarding ffmpeg stderr", path, e);
            Stdio::null()
        }
    }
}

/// ffmpeg decoding the preview sub-stream to raw `rgb24` on stdout.
#[derive(Debug, Clone)]
pub struct FrameDecoderProcess {
    ffmpeg: Option<PathBuf>,
    log_dir: PathBuf,
}

impl FrameDecoderProcess {
    pub fn new(ffmpeg: Option<PathBuf>, log_dir: PathBuf) -> Self {
        Self { ffmpeg, log_dir }
    }

    pub fn args(url: &str) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-rtsp_transport",
            "tcp",
            "-allowed_media_types",
            "video",
            "-i",
            url,
            "-an",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn start(&self, url: &str) -> Result<ProcessHandle, LaunchError> {
        let ffmpeg = self.ffmpeg.as_ref().ok_or(LaunchError::BinaryMissing)?;
        info!("decoder: opening {}", url);
        let mut cmd = Command::new(ffmpeg);
        cmd.args(Self::args(url))
            .stdout(Stdio::piped())
            .stderr(stderr_sink(&self.log_dir, "ffmpeg-decoder.log"));
        let handle = ProcessHandle::spawn(ProcessKind::Decoder, &mut cmd, StopStyle::Kill)
            .map_err(LaunchError::Spawn)?;
        if handle.output.is_none() {
            return Err(LaunchError::NoOutput);
        }
        Ok(handle)
    }

    pub fn stop(slot: &mut Option<ProcessHandle>) {
        stop_process(slot)
    }
}

/// ffmpeg transcoding the main stream into a dated MP4 file.
#[derive(Debug, Clone)]
pub struct RecorderProcess {
    ffmpeg: Option<PathBuf>,
    log_dir: PathBuf,
    settings: RecorderConfig,
}

impl RecorderProcess {
    pub fn new(ffmpeg: Option<PathBuf>, log_dir: PathBuf, settings: RecorderConfig) -> Self {
        Self {
            ffmpeg,
            log_dir,
            settings,
        }
    }

    pub fn args(&self, url: &str, output: &Path) -> Vec<String> {
        // -2 keeps the aspect ratio and rounds the height to an even number,
        // which libx264 requires.
        let filter = format!(
            "scale={}:-2,fps={}",
            self.settings.target_width.max(2),
            self.settings.output_fps.max(1)
        );
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-rtsp_transport".into(),
            "tcp".into(),
            "-i".into(),
            url.into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "0:a?".into(),
            "-vf".into(),
            filter,
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            self.settings.audio_codec.clone(),
            "-y".into(),
            output.to_string_lossy().into_owned(),
        ]
    }

    pub fn start(&self, url: &str, output: &Path) -> Result<ProcessHandle, LaunchError> {
        let ffmpeg = self.ffmpeg.as_ref().ok_or(LaunchError::BinaryMissing)?;
        if let Some(dir) = output.parent() {
            std::fs::create_dir_all(dir).map_err(|source| LaunchError::OutputDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        info!("recorder: {} -> {}", url, output.display());
        let mut cmd = Command::new(ffmpeg);
        cmd.args(self.args(url, output))
            .stdout(Stdio::null())
            .stderr(stderr_sink(&self.log_dir, "ffmpeg-recorder.log"));
        ProcessHandle::spawn(
            ProcessKind::Recorder,
            &mut cmd,
            StopStyle::QuitThenKill(RECORDER_GRACE),
        )
        .map_err(LaunchError::Spawn)
    }

    pub fn stop(slot: &mut Option<ProcessHandle>) {
        stop_process(slot)
    }
}
