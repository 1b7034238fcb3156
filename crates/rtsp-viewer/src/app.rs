//! App: the UI event loop.
//!
//! Architecture:
//! - `App` owns all components and `AppState` (shared read-only data for components).
//! - A `tokio::mpsc` channel carries `AppMessage` events in from background tasks:
//!   terminal input and the results of blocking session calls.
//! - Scheduler events arrive on their own channel; frames only ever touch the
//!   preview from this task.
//! - Components return `Vec<Action>`; App dispatches each Action.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rtsp_proto::protocol::SessionState;
use rtsp_session::{
    MediaBackend, SchedulerEvent, SessionController, SessionError, StartOutcome,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    components::{
        error_dialog::ErrorDialog,
        preview::{DisplaySink, PreviewPane},
        url_bar::UrlBar,
    },
    widgets::{
        status_bar::{self, InputMode},
        toast::{Severity, ToastManager},
    },
};

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    /// `request_start` returned.
    StartFinished {
        url: String,
        result: Result<StartOutcome, SessionError>,
    },
    /// `shutdown` returned.
    Stopped,
}

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

pub struct App<B: MediaBackend + 'static> {
    controller: Arc<SessionController<B>>,
    state: AppState,
    url_bar: UrlBar,
    preview: PreviewPane,
    dialog: ErrorDialog,
    toast: ToastManager,
    focus: ComponentId,
    show_keys_bar: bool,
    should_quit: bool,
    tx: mpsc::Sender<AppMessage>,
    /// Taken by the event loop.
    rx: Option<mpsc::Receiver<AppMessage>>,
    frames_rx: Option<mpsc::Receiver<SchedulerEvent>>,
}

impl<B: MediaBackend + 'static> App<B> {
    pub fn new(
        controller: Arc<SessionController<B>>,
        frames_rx: mpsc::Receiver<SchedulerEvent>,
        log_path: PathBuf,
        initial_url: Option<String>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<AppMessage>(256);
        let mut url_bar = UrlBar::new();
        let url = initial_url.unwrap_or_default();
        url_bar.set_text(&url);
        url_bar.set_suggestions(controller.suggestions(&url));

        Self {
            controller,
            state: AppState::new(log_path),
            url_bar,
            preview: PreviewPane::new(),
            dialog: ErrorDialog::new(),
            toast: ToastManager::new(),
            focus: ComponentId::UrlBar,
            show_keys_bar: true,
            should_quit: false,
            tx,
            rx: Some(rx),
            frames_rx: Some(frames_rx),
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    /// Run until the user quits. `connect_now` starts the prefilled URL at once.
    pub async fn run(mut self, connect_now: bool) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        // ── Background task: keyboard events ──────────────────────────────────
        // Polls so it notices the App is gone and lets the runtime exit.
        let event_tx = self.tx.clone();
        tokio::task::spawn_blocking(move || loop {
            if event_tx.is_closed() {
                break;
            }
            match event::poll(Duration::from_millis(200)) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Ok(false) => {}
                Err(_) => break,
            }
        });

        if connect_now && !self.url_bar.text().trim().is_empty() {
            let url = self.url_bar.text().trim().to_string();
            self.dispatch(Action::Connect(url));
        }

        let result = self.event_loop(&mut terminal).await;

        // ── Teardown: processes first, then the terminal ──────────────────────
        let controller = self.controller.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || controller.shutdown()).await {
            error!("shutdown task failed: {}", e);
        }
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        info!("viewer stopped");

        result
    }

    async fn event_loop(&mut self, terminal: &mut Tui) -> anyhow::Result<()> {
        let (Some(mut rx), Some(mut frames_rx)) = (self.rx.take(), self.frames_rx.take()) else {
            anyhow::bail!("event loop already ran");
        };

        // Toast expiry and spinner animation.
        let mut ui_tick = tokio::time::interval(Duration::from_millis(100));
        ui_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    needs_redraw = self.handle_message(msg);
                }

                Some(ev) = frames_rx.recv() => {
                    needs_redraw = self.handle_scheduler_event(ev);
                    // Coalesce a backlog into one redraw.
                    while let Ok(ev) = frames_rx.try_recv() {
                        needs_redraw |= self.handle_scheduler_event(ev);
                    }
                }

                _ = ui_tick.tick() => {
                    self.toast.tick();
                    let mut actions = self.url_bar.tick(&self.state);
                    actions.extend(self.preview.tick(&self.state));
                    for action in actions {
                        self.dispatch(action);
                    }
                    needs_redraw = true;
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if the message requires a redraw.
    fn handle_message(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::Event(Event::Key(key)) => {
                if key.kind == KeyEventKind::Release {
                    return false;
                }
                for action in self.handle_key(key) {
                    self.dispatch(action);
                }
            }
            AppMessage::Event(Event::Resize(w, h)) => {
                debug!("terminal resized to {}x{}", w, h);
            }
            AppMessage::Event(_) => return false,
            AppMessage::StartFinished { url, result } => self.on_start_finished(url, result),
            AppMessage::Stopped => {
                self.state.reset_session();
                self.state.session = self.controller.state();
                self.toast.success("session stopped");
            }
        }
        true
    }

    fn handle_scheduler_event(&mut self, ev: SchedulerEvent) -> bool {
        if Some(ev.session()) != self.state.live_session() {
            debug!("dropping event from stale session {}", ev.session());
            return false;
        }
        match ev {
            SchedulerEvent::Frame { frame, .. } => {
                self.preview.present(Some(frame));
                self.state.frames_shown = self.preview.presented();
                true
            }
            SchedulerEvent::Desync { expected, got, .. } => {
                error!("preview desync: expected {} bytes, got {}", expected, got);
                self.dispatch(Action::Stop);
                self.dispatch(Action::ShowError(
                    "Preview stream lost".to_string(),
                    format!(
                        "decoder output out of sync ({} of {} bytes); session stopped",
                        got, expected
                    ),
                ));
                true
            }
            SchedulerEvent::ReadError { message, .. } => {
                warn!("preview read failed: {}", message);
                self.toast.error(format!("preview read failed: {}", message));
                true
            }
            SchedulerEvent::Stalled { ticks, .. } => {
                warn!("preview stalled for {} ticks", ticks);
                self.toast
                    .warning(format!("no video for {} ticks, stopping", ticks));
                self.dispatch(Action::Stop);
                true
            }
        }
    }

    fn on_start_finished(&mut self, url: String, result: Result<StartOutcome, SessionError>) {
        match result {
            Ok(StartOutcome::Started(info))
                if self.controller.current().map(|c| c.session) != Some(info.session) =>
            {
                // Stopped before the result got here.
                debug!("session {} ended before start was reported", info.session);
                self.toast.dismiss_spinner();
                self.state.reset_session();
            }
            Ok(StartOutcome::Started(info)) => {
                self.toast.resolve_spinner(
                    Severity::Success,
                    format!("recording to {}", info.recording_path.display()),
                );
                self.preview.clear();
                self.state.session = SessionState::Running;
                self.state.frames_shown = 0;
                self.state.info = Some(info);
                self.focus = ComponentId::Preview;
                let suggestions = self.controller.suggestions(self.url_bar.text());
                self.url_bar.set_suggestions(suggestions);
            }
            Ok(StartOutcome::AlreadyActive) => {
                self.toast.dismiss_spinner();
                self.state.session = self.controller.state();
                self.toast.info("a session is already active");
            }
            Err(e) => {
                self.toast.dismiss_spinner();
                error!("cannot start {}: {}", url, e);
                self.state.reset_session();
                let title = match &e {
                    SessionError::Probe { .. } => "Cannot connect",
                    SessionError::EmptyUrl => "No camera URL",
                    SessionError::Launch { .. } | SessionError::Scheduler(_) => {
                        "Cannot start session"
                    }
                };
                self.dispatch(Action::ShowError(title.to_string(), e.to_string()));
            }
        }
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            return vec![Action::Quit];
        }
        if self.dialog.is_visible() {
            return self.dialog.handle_key(key, &self.state);
        }
        match key.code {
            KeyCode::Esc => return vec![Action::Quit],
            KeyCode::Char('s') if ctrl => return vec![Action::Stop],
            KeyCode::F(1) => return vec![Action::ToggleKeysBar],
            KeyCode::BackTab => return vec![Action::FocusNext],
            KeyCode::Tab if self.focus == ComponentId::Preview => {
                return vec![Action::FocusPane(ComponentId::UrlBar)]
            }
            _ => {}
        }
        match self.focus {
            ComponentId::UrlBar => self.url_bar.handle_key(key, &self.state),
            ComponentId::Preview => self.preview.handle_key(key, &self.state),
            ComponentId::ErrorDialog => self.dialog.handle_key(key, &self.state),
        }
    }

    // ── Action dispatch ───────────────────────────────────────────────────────

    fn dispatch(&mut self, action: Action) {
        debug!("dispatch: {:?}", action);
        let mut follow_up = Vec::new();
        follow_up.extend(self.dialog.on_action(&action, &self.state));
        follow_up.extend(self.preview.on_action(&action, &self.state));
        follow_up.extend(self.url_bar.on_action(&action, &self.state));
        self.apply_action(action);
        for a in follow_up {
            self.dispatch(a);
        }
        self.sync_input_mode();
    }

    fn apply_action(&mut self, action: Action) {
        match action {
            Action::Connect(url) => self.start_session(url),
            Action::Stop => self.stop_session(),
            Action::UrlEdited(text) => {
                self.url_bar.set_suggestions(self.controller.suggestions(&text));
            }
            Action::FocusNext => {
                self.focus = match self.focus {
                    ComponentId::UrlBar => ComponentId::Preview,
                    _ => ComponentId::UrlBar,
                };
            }
            Action::FocusPane(id) => self.focus = id,
            Action::ShowError(..) | Action::DismissError => {}
            Action::ToggleKeysBar => self.show_keys_bar = !self.show_keys_bar,
            Action::Quit => {
                info!("quit requested");
                self.should_quit = true;
            }
        }
    }

    fn start_session(&mut self, url: String) {
        if !self.state.session.is_idle() {
            self.toast.info("stop the current session first (Ctrl-S)");
            return;
        }
        info!("connecting to {}", url);
        self.state.session = SessionState::Starting;
        self.toast.spinner(format!("connecting to {}", url));

        let controller = self.controller.clone();
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = controller.request_start(&url);
            let _ = tx.blocking_send(AppMessage::StartFinished { url, result });
        });
    }

    fn stop_session(&mut self) {
        if self.state.session.is_idle() {
            return;
        }
        self.state.session = SessionState::Stopping;
        // No more frames from this session.
        self.state.info = None;
        let controller = self.controller.clone();
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            controller.shutdown();
            let _ = tx.blocking_send(AppMessage::Stopped);
        });
    }

    fn sync_input_mode(&mut self) {
        self.state.input_mode = if self.dialog.is_visible() {
            InputMode::Dialog
        } else if self.focus == ComponentId::UrlBar {
            InputMode::Editing
        } else {
            InputMode::Watching
        };
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        use crate::theme::C_BG;
        use ratatui::widgets::Block;
        let area = frame.area();

        frame.render_widget(
            Block::default().style(ratatui::style::Style::default().bg(C_BG)),
            area,
        );

        let keys_h = if self.show_keys_bar { 1u16 } else { 0 };
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(keys_h),
            ])
            .split(area);

        let url_focused = self.focus == self.url_bar.id() && !self.dialog.is_visible();
        self.url_bar.draw(frame, outer[0], url_focused, &self.state);
        let preview_focused = self.focus == self.preview.id() && !self.dialog.is_visible();
        self.preview
            .draw(frame, outer[1], preview_focused, &self.state);
        status_bar::draw_separator(frame, outer[2]);
        status_bar::draw_session_bar(frame, outer[3], &self.state);
        if self.show_keys_bar {
            status_bar::draw_keys_bar(frame, outer[4], self.state.input_mode);
        }

        self.dialog.draw(frame, area, true, &self.state);
        self.toast.draw(frame, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtsp_proto::history::ConnectionHistory;
    use rtsp_proto::protocol::{RawFrame, StreamEndpoint, StreamGeometry};
    use rtsp_session::{LaunchError, ProbeError, ProcessHandle, SessionInfo, SessionSettings};
    use std::path::Path;

    struct DeadCamera;

    impl MediaBackend for DeadCamera {
        fn probe(&self, url: &str) -> Result<StreamGeometry, ProbeError> {
            Err(ProbeError::Failed {
                status: "exit status: 1".into(),
                stderr: format!("{}: Connection timed out", url),
            })
        }

        fn start_recorder(&self, _: &str, _: &Path) -> Result<ProcessHandle, LaunchError> {
            Err(LaunchError::BinaryMissing)
        }

        fn start_decoder(&self, _: &str) -> Result<ProcessHandle, LaunchError> {
            Err(LaunchError::BinaryMissing)
        }
    }

    fn app(dir: &Path) -> App<DeadCamera> {
        let mut config = rtsp_proto::config::Config::default();
        config.paths.output_root = dir.to_path_buf();
        let mut history = ConnectionHistory::open(dir.join("config.json"));
        history.append("rtsp://10.0.0.5:554").unwrap();
        let (events_tx, events_rx) = mpsc::channel(4);
        let controller = Arc::new(SessionController::new(
            DeadCamera,
            SessionSettings::from_config(&config),
            history,
            events_tx,
        ));
        App::new(controller, events_rx, dir.join("viewer.log"), None)
    }

    /// Pretend session `id` is live, as after a successful start.
    fn go_live(app: &mut App<DeadCamera>, id: u64) {
        let g = StreamGeometry {
            width: 2,
            height: 2,
            fps: 15,
        };
        app.state.session = SessionState::Running;
        app.state.info = Some(SessionInfo {
            session: id,
            endpoint: StreamEndpoint::new("rtsp://10.0.0.5:554", "sub", "main"),
            preview: g,
            record: g,
            recording_path: PathBuf::from("/r/20240101/saved_20240101_120000.mp4"),
            started_at: chrono::Local::now(),
        });
    }

    /// Wait for the background shutdown to report back and apply it.
    async fn finish_stop(app: &mut App<DeadCamera>) {
        let msg = tokio::time::timeout(Duration::from_secs(5), app.rx.as_mut().unwrap().recv())
            .await
            .expect("shutdown reported in time")
            .expect("app channel open");
        assert!(matches!(msg, AppMessage::Stopped));
        app.handle_message(msg);
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[tokio::test]
    async fn test_failed_connect_opens_dialog_naming_camera() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        app.dispatch(Action::Connect("rtsp://10.0.0.9:554".into()));
        assert_eq!(app.state.session, SessionState::Starting);

        let msg = app.rx.as_mut().unwrap().recv().await.unwrap();
        app.handle_message(msg);
        assert_eq!(app.state.session, SessionState::Idle);
        assert!(app.dialog.is_visible());
        assert_eq!(app.dialog.title(), Some("Cannot connect"));
        assert!(app.dialog.body().unwrap().contains("rtsp://10.0.0.9:554"));
        assert_eq!(app.state.input_mode, InputMode::Dialog);

        // The dialog swallows keys until dismissed.
        for action in app.handle_key(key(KeyCode::Enter)) {
            app.dispatch(action);
        }
        assert!(!app.dialog.is_visible());
        assert_eq!(app.state.input_mode, InputMode::Editing);
    }

    #[tokio::test]
    async fn test_typing_offers_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        for c in "RTSP://10".chars() {
            for action in app.handle_key(key(KeyCode::Char(c))) {
                app.dispatch(action);
            }
        }
        assert_eq!(app.url_bar.hint(), Some("rtsp://10.0.0.5:554"));

        for action in app.handle_key(key(KeyCode::Tab)) {
            app.dispatch(action);
        }
        assert_eq!(app.url_bar.text(), "rtsp://10.0.0.5:554");
    }

    #[tokio::test]
    async fn test_frames_from_other_sessions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let frame = RawFrame::from_bytes(2, 2, vec![0; 12]).unwrap();
        let redraw = app.handle_scheduler_event(SchedulerEvent::Frame {
            session: 7,
            seq: 10,
            frame,
        });
        assert!(!redraw);
        assert!(!app.preview.has_frame());
    }

    #[tokio::test]
    async fn test_desync_stops_session_and_shows_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        go_live(&mut app, 4);

        let redraw = app.handle_scheduler_event(SchedulerEvent::Desync {
            session: 4,
            expected: 12,
            got: 5,
        });
        assert!(redraw);
        assert_eq!(app.state.session, SessionState::Stopping);
        assert!(app.state.live_session().is_none());
        assert!(app.dialog.is_visible());
        assert_eq!(app.dialog.title(), Some("Preview stream lost"));
        assert!(app.dialog.body().unwrap().contains("5 of 12 bytes"));
        assert_eq!(app.state.input_mode, InputMode::Dialog);

        finish_stop(&mut app).await;
        assert_eq!(app.state.session, SessionState::Idle);
        assert!(app.dialog.is_visible());
    }

    #[tokio::test]
    async fn test_stall_stops_session_without_dialog() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        go_live(&mut app, 2);
        let frame = RawFrame::from_bytes(2, 2, vec![0; 12]).unwrap();
        app.handle_scheduler_event(SchedulerEvent::Frame {
            session: 2,
            seq: 10,
            frame,
        });
        assert!(app.preview.has_frame());

        app.handle_scheduler_event(SchedulerEvent::Stalled {
            session: 2,
            ticks: 50,
        });
        assert_eq!(app.state.session, SessionState::Stopping);
        assert!(!app.dialog.is_visible());
        assert!(!app.preview.has_frame());

        // Events still in flight from the stopped session change nothing.
        assert!(!app.handle_scheduler_event(SchedulerEvent::Stalled {
            session: 2,
            ticks: 50,
        }));

        finish_stop(&mut app).await;
        assert_eq!(app.state.session, SessionState::Idle);
        assert!(app.state.info.is_none());
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        assert_eq!(
            app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            vec![Action::Quit]
        );
        assert_eq!(app.handle_key(key(KeyCode::Esc)), vec![Action::Quit]);
        app.dispatch(Action::Quit);
        assert!(app.should_quit);
    }
}
