//! Status bar: session state and stream details, plus the keybindings footer.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use rtsp_proto::protocol::SessionState;

use crate::app_state::AppState;
use crate::theme::{
    style_secondary, C_ACCENT, C_CONNECTING, C_LIVE, C_MODE_EDITING, C_MODE_WATCHING, C_MUTED,
    C_SEPARATOR,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    /// Typing in the URL field.
    Editing,
    /// Focus on the preview; keys drive the session.
    Watching,
    /// An error dialog is up.
    Dialog,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Editing => "URL",
            Self::Watching => "VIEW",
            Self::Dialog => "ERROR",
        }
    }

    pub fn color(self) -> ratatui::style::Color {
        match self {
            Self::Editing => C_MODE_EDITING,
            Self::Watching => C_MODE_WATCHING,
            Self::Dialog => C_ACCENT,
        }
    }
}

fn state_color(state: SessionState) -> ratatui::style::Color {
    match state {
        SessionState::Idle => C_MUTED,
        SessionState::Starting | SessionState::Stopping => C_CONNECTING,
        SessionState::Running => C_LIVE,
    }
}

/// Text after the state badge: geometry, frame count, output file.
pub fn session_summary(state: &AppState) -> String {
    match &state.info {
        Some(info) => format!(
            "{}  preview {}  record {}  shown {}  → {}",
            info.endpoint.base_url,
            info.preview,
            info.record,
            state.frames_shown,
            info.recording_path.display()
        ),
        None => match state.session {
            SessionState::Starting => "probing camera…".to_string(),
            _ => format!("log: {}", state.log_path.display()),
        },
    }
}

/// Draw the session line: state badge then details.
pub fn draw_session_bar(frame: &mut Frame, area: Rect, state: &AppState) {
    let badge = Span::styled(
        format!(" {} ", state.session.label()),
        Style::default()
            .fg(state_color(state.session))
            .add_modifier(Modifier::BOLD),
    );
    let line = Line::from(vec![
        badge,
        Span::raw(" "),
        Span::styled(session_summary(state), style_secondary()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// Draw a horizontal separator line.
pub fn draw_separator(frame: &mut Frame, area: Rect) {
    let line = Line::from(Span::styled(
        "─".repeat(area.width as usize),
        Style::default().fg(C_SEPARATOR),
    ));
    frame.render_widget(Paragraph::new(line), area);
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, mode: InputMode) {
    let keys = match mode {
        InputMode::Editing => {
            " Enter connect  Tab complete  ↑↓ history  Ctrl-S stop  F1 keys  Esc/Ctrl-C quit"
        }
        InputMode::Watching => " Tab url  Ctrl-S stop  F1 keys  Esc/Ctrl-C quit",
        InputMode::Dialog => " Enter/Esc dismiss",
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default()
                .fg(mode.color())
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(keys, Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
