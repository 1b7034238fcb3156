//! ErrorDialog: centered modal naming what failed. Swallows all keys while up.

use ratatui::crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{style_default, style_error_title, style_muted, C_BG, C_ERROR},
};

#[derive(Default)]
pub struct ErrorDialog {
    message: Option<(String, String)>,
}

impl ErrorDialog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.message.is_some()
    }

    pub fn title(&self) -> Option<&str> {
        self.message.as_ref().map(|(t, _)| t.as_str())
    }

    pub fn body(&self) -> Option<&str> {
        self.message.as_ref().map(|(_, b)| b.as_str())
    }
}

impl Component for ErrorDialog {
    fn id(&self) -> ComponentId {
        ComponentId::ErrorDialog
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => vec![Action::DismissError],
            _ => vec![],
        }
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        match action {
            Action::ShowError(title, body) => {
                self.message = Some((title.clone(), body.clone()));
            }
            Action::DismissError => self.message = None,
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, _state: &AppState) {
        let (Some(title), Some(body)) = (self.title(), self.body()) else {
            return;
        };

        let popup = centered_rect(60, 8, area);
        let lines = vec![
            Line::from(""),
            Line::from(Span::styled(format!(" {}", body), style_default())),
            Line::from(""),
            Line::from(Span::styled(" press enter or esc to close", style_muted())),
        ];

        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(lines)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(C_ERROR))
                        .title(Span::styled(format!(" {} ", title), style_error_title()))
                        .style(Style::default().bg(C_BG)),
                )
                .wrap(Wrap { trim: false }),
            popup,
        );
    }
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;
    use std::path::PathBuf;

    #[test]
    fn test_show_and_dismiss() {
        let state = AppState::new(PathBuf::from("viewer.log"));
        let mut dialog = ErrorDialog::new();
        assert!(!dialog.is_visible());

        dialog.on_action(
            &Action::ShowError("Cannot connect".into(), "rtsp://cam: refused".into()),
            &state,
        );
        assert_eq!(dialog.title(), Some("Cannot connect"));
        assert_eq!(dialog.body(), Some("rtsp://cam: refused"));

        let other = dialog.handle_key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE), &state);
        assert!(other.is_empty());
        let actions = dialog.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE), &state);
        assert_eq!(actions, vec![Action::DismissError]);

        dialog.on_action(&Action::DismissError, &state);
        assert!(!dialog.is_visible());
    }
}
