//! In-memory stand-in for ffprobe/ffmpeg.

#![allow(dead_code)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rtsp_proto::config::Config;
use rtsp_proto::history::ConnectionHistory;
use rtsp_proto::protocol::StreamGeometry;
use rtsp_session::{
    LaunchError, MediaBackend, ProbeError, ProcessControl, ProcessHandle, ProcessKind,
    SchedulerEvent, SessionController, SessionSettings,
};
use tokio::sync::mpsc;

pub const BASE_URL: &str = "rtsp://admin:pw@192.168.1.64:554";

pub const HD: StreamGeometry = StreamGeometry {
    width: 1920,
    height: 1080,
    fps: 15,
};

pub const SMALL: StreamGeometry = StreamGeometry {
    width: 32,
    height: 18,
    fps: 50,
};

/// Everything the fake saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe(String),
    StartRecorder { url: String, output: PathBuf },
    StartDecoder(String),
    Terminate(ProcessKind),
}

#[derive(Default)]
pub struct Journal(Mutex<Vec<Call>>);

impl Journal {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn terminated(&self, kind: ProcessKind) -> usize {
        self.count(|c| *c == Call::Terminate(kind))
    }

    pub fn started(&self, kind: ProcessKind) -> usize {
        self.count(|c| match (kind, c) {
            (ProcessKind::Recorder, Call::StartRecorder { .. }) => true,
            (ProcessKind::Decoder, Call::StartDecoder(_)) => true,
            _ => false,
        })
    }
}

pub struct FakeBackend {
    /// `None` makes the probe of that feed fail.
    pub preview: Option<StreamGeometry>,
    pub record: Option<StreamGeometry>,
    pub fail_recorder: bool,
    pub fail_decoder: bool,
    pub probe_delay: Duration,
    pub journal: Arc<Journal>,
}

impl FakeBackend {
    pub fn healthy(geometry: StreamGeometry) -> Self {
        Self {
            preview: Some(geometry),
            record: Some(geometry),
            fail_recorder: false,
            fail_decoder: false,
            probe_delay: Duration::ZERO,
            journal: Arc::new(Journal::default()),
        }
    }
}

impl MediaBackend for FakeBackend {
    fn probe(&self, url: &str) -> Result<StreamGeometry, ProbeError> {
        self.journal.push(Call::Probe(url.to_string()));
        std::thread::sleep(self.probe_delay);
        let answer = if url.contains("/sub/") {
            self.preview
        } else {
            self.record
        };
        answer.ok_or_else(|| ProbeError::Failed {
            status: "exit status: 1".into(),
            stderr: format!("{}: Connection refused", url),
        })
    }

    fn start_recorder(&self, url: &str, output: &Path) -> Result<ProcessHandle, LaunchError> {
        self.journal.push(Call::StartRecorder {
            url: url.to_string(),
            output: output.to_path_buf(),
        });
        if self.fail_recorder {
            return Err(LaunchError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ffmpeg vanished",
            )));
        }
        let killed = Arc::new(AtomicBool::new(false));
        Ok(ProcessHandle::new(
            ProcessKind::Recorder,
            Box::new(FakeProcess {
                kind: ProcessKind::Recorder,
                killed,
                journal: self.journal.clone(),
            }),
            None,
        ))
    }

    fn start_decoder(&self, url: &str) -> Result<ProcessHandle, LaunchError> {
        self.journal.push(Call::StartDecoder(url.to_string()));
        if self.fail_decoder {
            return Err(LaunchError::Spawn(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "not allowed",
            )));
        }
        let killed = Arc::new(AtomicBool::new(false));
        Ok(ProcessHandle::new(
            ProcessKind::Decoder,
            Box::new(FakeProcess {
                kind: ProcessKind::Decoder,
                killed: killed.clone(),
                journal: self.journal.clone(),
            }),
            Some(Box::new(FrameSource { killed })),
        ))
    }
}

struct FakeProcess {
    kind: ProcessKind,
    killed: Arc<AtomicBool>,
    journal: Arc<Journal>,
}

impl ProcessControl for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn terminate(self: Box<Self>) -> std::io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        self.journal.push(Call::Terminate(self.kind));
        Ok(())
    }
}

/// Grey frames forever, EOF once the owning process is killed.
struct FrameSource {
    killed: Arc<AtomicBool>,
}

impl Read for FrameSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(0);
        }
        buf.fill(0x40);
        Ok(buf.len())
    }
}

pub struct Harness {
    pub controller: SessionController<FakeBackend>,
    pub events: mpsc::Receiver<SchedulerEvent>,
    pub journal: Arc<Journal>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::with_display_every(backend, 1)
    }

    pub fn with_display_every(backend: FakeBackend, display_every: u32) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.paths.output_root = dir.path().join("rtsp_saved");
        config.display.display_every = display_every;
        let history = ConnectionHistory::open(dir.path().join("config").join("config.json"));
        Self::build(backend, &config, history, dir)
    }

    pub fn build(
        backend: FakeBackend,
        config: &Config,
        history: ConnectionHistory,
        dir: tempfile::TempDir,
    ) -> Self {
        let journal = backend.journal.clone();
        let (tx, rx) = mpsc::channel(16);
        let controller = SessionController::new(
            backend,
            SessionSettings::from_config(config),
            history,
            tx,
        );
        Self {
            controller,
            events: rx,
            journal,
            dir,
        }
    }

    /// Wait up to `limit` for the next scheduler event.
    pub fn next_event(&mut self, limit: Duration) -> Option<SchedulerEvent> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Ok(ev) = self.events.try_recv() {
                return Some(ev);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }
}
