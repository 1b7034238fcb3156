//! The single camera session: probe, record, preview, tear down.

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use rtsp_proto::config::Config;
use rtsp_proto::history::ConnectionHistory;
use rtsp_proto::platform;
use rtsp_proto::protocol::{SessionState, StreamEndpoint, StreamGeometry};

use crate::backend::MediaBackend;
use crate::error::{Feed, LaunchError, SessionError};
use crate::process::{stop_process, ProcessHandle, ProcessKind};
use crate::pump::FramePump;
use crate::scheduler::{DisplayScheduler, SchedulerEvent, SchedulerSettings};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub preview_path: String,
    pub record_path: String,
    /// Recordings go under `<output_root>/<YYYYMMDD>/`.
    pub output_root: PathBuf,
    pub container_ext: String,
    pub scheduler: SchedulerSettings,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            preview_path: config.stream.preview_path.clone(),
            record_path: config.stream.record_path.clone(),
            output_root: config.paths.output_root.clone(),
            container_ext: config.recorder.container_ext.clone(),
            scheduler: SchedulerSettings::from(&config.display),
        }
    }
}

/// What a running session is connected to.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Increments per successful start; tags every `SchedulerEvent`.
    pub session: u64,
    pub endpoint: StreamEndpoint,
    pub preview: StreamGeometry,
    pub record: StreamGeometry,
    pub recording_path: PathBuf,
    pub started_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(SessionInfo),
    /// A session was already starting or running; nothing was done.
    AlreadyActive,
}

/// Resources owned by a live session. Only touched with the gate held.
struct Slots {
    decoder: Option<ProcessHandle>,
    recorder: Option<ProcessHandle>,
    scheduler: DisplayScheduler,
}

#[derive(Default)]
struct Status {
    state: SessionState,
    current: Option<SessionInfo>,
}

/// Owns every process, the scheduler and the connection history.
///
/// Starts and shutdowns are serialized on one gate mutex; the state itself
/// sits behind a separate mutex so the UI can read it while a start is still
/// probing.
pub struct SessionController<B: MediaBackend> {
    backend: B,
    settings: SessionSettings,
    gate: Mutex<Slots>,
    status: Mutex<Status>,
    history: Mutex<ConnectionHistory>,
    events: mpsc::Sender<SchedulerEvent>,
    next_session: AtomicU64,
}

impl<B: MediaBackend> SessionController<B> {
    pub fn new(
        backend: B,
        settings: SessionSettings,
        history: ConnectionHistory,
        events: mpsc::Sender<SchedulerEvent>,
    ) -> Self {
        let scheduler = DisplayScheduler::new(settings.scheduler);
        Self {
            backend,
            settings,
            gate: Mutex::new(Slots {
                decoder: None,
                recorder: None,
                scheduler,
            }),
            status: Mutex::new(Status::default()),
            history: Mutex::new(history),
            events,
            next_session: AtomicU64::new(0),
        }
    }

    /// Connect to the camera at `base_url` and start recording and previewing.
    ///
    /// Blocks for as long as probing takes. A call made while another session
    /// is starting or running returns `AlreadyActive`. On any error nothing is
    /// left running and the state is back to `Idle`.
    pub fn request_start(&self, base_url: &str) -> Result<StartOutcome, SessionError> {
        let base_url = base_url.trim();
        if base_url.is_empty() {
            return Err(SessionError::EmptyUrl);
        }

        let mut slots = lock(&self.gate);
        {
            let mut status = lock(&self.status);
            if !status.state.is_idle() {
                debug!("session: start ignored, already {:?}", status.state);
                return Ok(StartOutcome::AlreadyActive);
            }
            status.state = SessionState::Starting;
        }

        match self.start_locked(&mut slots, base_url) {
            Ok(info) => {
                info!(
                    "session {}: live, preview {} recording {} to {}",
                    info.session,
                    info.preview,
                    info.record,
                    info.recording_path.display()
                );
                let mut status = lock(&self.status);
                status.state = SessionState::Running;
                status.current = Some(info.clone());
                Ok(StartOutcome::Started(info))
            }
            Err(e) => {
                warn!("session: start failed: {}", e);
                teardown(&mut slots);
                let mut status = lock(&self.status);
                status.state = SessionState::Idle;
                status.current = None;
                Err(e)
            }
        }
    }

    fn start_locked(&self, slots: &mut Slots, base_url: &str) -> Result<SessionInfo, SessionError> {
        let endpoint = StreamEndpoint::new(
            base_url,
            &self.settings.preview_path,
            &self.settings.record_path,
        );
        let probe_failed = |feed: Feed| {
            let base_url = endpoint.base_url.clone();
            move |source| SessionError::Probe {
                base_url,
                feed,
                source,
            }
        };
        let preview = self
            .backend
            .probe(&endpoint.preview_url)
            .map_err(probe_failed(Feed::Preview))?;
        let record = self
            .backend
            .probe(&endpoint.record_url)
            .map_err(probe_failed(Feed::Record))?;

        let started_at = Local::now();
        let recording_path = platform::recording_path(
            &self.settings.output_root,
            started_at,
            &self.settings.container_ext,
        );

        let recorder = self
            .backend
            .start_recorder(&endpoint.record_url, &recording_path)
            .map_err(|source| SessionError::Launch {
                process: ProcessKind::Recorder,
                source,
            })?;
        slots.recorder = Some(recorder);

        let decoder = self
            .backend
            .start_decoder(&endpoint.preview_url)
            .map_err(|source| SessionError::Launch {
                process: ProcessKind::Decoder,
                source,
            })?;
        let output = slots
            .decoder
            .insert(decoder)
            .take_output()
            .ok_or(SessionError::Launch {
                process: ProcessKind::Decoder,
                source: LaunchError::NoOutput,
            })?;

        let session = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        slots.scheduler.start(
            session,
            preview.fps,
            FramePump::new(output, preview),
            self.events.clone(),
        )?;

        match lock(&self.history).append(&endpoint.base_url) {
            Ok(true) => debug!("session: remembered {}", endpoint.base_url),
            Ok(false) => {}
            Err(e) => warn!("session: cannot save connection history: {:#}", e),
        }

        Ok(SessionInfo {
            session,
            endpoint,
            preview,
            record,
            recording_path,
            started_at,
        })
    }

    /// Stop everything the session owns. Safe from any state and idempotent.
    pub fn shutdown(&self) {
        let mut slots = lock(&self.gate);
        let was = {
            let mut status = lock(&self.status);
            let was = status.state;
            status.state = SessionState::Stopping;
            was
        };
        if !was.is_idle() {
            info!("session: stopping");
        }
        teardown(&mut slots);
        let mut status = lock(&self.status);
        status.state = SessionState::Idle;
        status.current = None;
    }

    pub fn state(&self) -> SessionState {
        lock(&self.status).state
    }

    pub fn current(&self) -> Option<SessionInfo> {
        lock(&self.status).current.clone()
    }

    /// Snapshot of the connection history.
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).entries().to_vec()
    }

    pub fn suggestions(&self, prefix: &str) -> Vec<String> {
        lock(&self.history)
            .suggestions(prefix)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: MediaBackend> Drop for SessionController<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decoder first so the scheduler's blocking read sees the pipe close.
fn teardown(slots: &mut Slots) {
    stop_process(&mut slots.decoder);
    stop_process(&mut slots.recorder);
    slots.scheduler.stop();
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use std::path::Path;

    struct Unreachable;

    impl MediaBackend for Unreachable {
        fn probe(&self, _: &str) -> Result<StreamGeometry, ProbeError> {
            Err(ProbeError::Timeout(std::time::Duration::from_secs(10)))
        }

        fn start_recorder(&self, _: &str, _: &Path) -> Result<ProcessHandle, LaunchError> {
            Err(LaunchError::BinaryMissing)
        }

        fn start_decoder(&self, _: &str) -> Result<ProcessHandle, LaunchError> {
            Err(LaunchError::BinaryMissing)
        }
    }

    fn controller(dir: &Path) -> SessionController<Unreachable> {
        let mut config = Config::default();
        config.paths.output_root = dir.to_path_buf();
        let (tx, _rx) = mpsc::channel(4);
        SessionController::new(
            Unreachable,
            SessionSettings::from_config(&config),
            ConnectionHistory::open(dir.join("config.json")),
            tx,
        )
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.display.display_every = 3;
        config.recorder.container_ext = "mkv".into();
        let settings = SessionSettings::from_config(&config);
        assert_eq!(settings.preview_path, "h264/ch1/sub/av_stream");
        assert_eq!(settings.record_path, "h264/ch1/main/av_stream");
        assert_eq!(settings.container_ext, "mkv");
        assert_eq!(settings.scheduler.display_every, 3);
    }

    #[test]
    fn test_blank_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(dir.path());
        assert!(matches!(ctl.request_start("   "), Err(SessionError::EmptyUrl)));
        assert_eq!(ctl.state(), SessionState::Idle);
    }

    #[test]
    fn test_unreachable_camera_leaves_idle_and_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(dir.path());
        let err = ctl.request_start("rtsp://10.0.0.9:554").unwrap_err();
        assert_eq!(err.base_url(), Some("rtsp://10.0.0.9:554"));
        assert!(matches!(
            err,
            SessionError::Probe {
                feed: Feed::Preview,
                ..
            }
        ));
        assert_eq!(ctl.state(), SessionState::Idle);
        assert!(ctl.current().is_none());
        assert!(ctl.history().is_empty());
        assert!(!dir.path().join("config.json").exists());
    }

    #[test]
    fn test_shutdown_when_idle_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(dir.path());
        ctl.shutdown();
        ctl.shutdown();
        assert_eq!(ctl.state(), SessionState::Idle);
    }
}
