//! AppState: shared read-only data passed to all components during render/event.
//!
//! The App event-loop is the only thing that writes to AppState.

use std::path::PathBuf;

use rtsp_proto::protocol::SessionState;
use rtsp_session::SessionInfo;

use crate::widgets::status_bar::InputMode;

#[derive(Debug, Clone)]
pub struct AppState {
    pub session: SessionState,
    /// Set while a session is running.
    pub info: Option<SessionInfo>,
    /// Frames handed to the preview in the current session.
    pub frames_shown: u64,
    pub input_mode: InputMode,
    pub log_path: PathBuf,
}

impl AppState {
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            session: SessionState::Idle,
            info: None,
            frames_shown: 0,
            input_mode: InputMode::Editing,
            log_path,
        }
    }

    /// Session id the preview should accept frames from.
    pub fn live_session(&self) -> Option<u64> {
        self.info.as_ref().map(|i| i.session)
    }

    pub fn reset_session(&mut self) {
        self.session = SessionState::Idle;
        self.info = None;
        self.frames_shown = 0;
    }
}
