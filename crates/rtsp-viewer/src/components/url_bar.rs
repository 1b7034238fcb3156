use ratatui::crossterm::event::KeyEvent;
use ratatui::{layout::Rect, Frame};

use rtsp_proto::protocol::SessionState;

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::C_LIVE,
    widgets::{
        pane_chrome::{pane_chrome, Badge},
        url_input::{UrlAction, UrlInput},
    },
};

/// Camera address field. Enter connects; the App feeds it history matches.
#[derive(Default)]
pub struct UrlBar {
    input: UrlInput,
}

impl UrlBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        self.input.text()
    }

    pub fn set_text(&mut self, url: &str) {
        self.input.set_value(url);
    }

    pub fn set_suggestions(&mut self, suggestions: Vec<String>) {
        self.input.set_suggestions(suggestions);
    }

    #[cfg(test)]
    pub fn hint(&self) -> Option<&str> {
        self.input.hint()
    }
}

impl Component for UrlBar {
    fn id(&self) -> ComponentId {
        ComponentId::UrlBar
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        match self.input.handle_key(key) {
            UrlAction::Submitted(url) => vec![Action::Connect(url)],
            UrlAction::Changed(text) => vec![Action::UrlEdited(text)],
            UrlAction::None => vec![],
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let badge = (state.session == SessionState::Running).then_some(Badge {
            text: "LIVE",
            color: C_LIVE,
        });
        let block = pane_chrome("camera", focused, badge);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.input.draw(frame, inner, focused);
    }
}
