//! Toasts: transient status messages in the top-right corner, plus one
//! persistent spinner shown while a camera is being probed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use crate::theme::{C_TOAST_ERROR, C_TOAST_INFO, C_TOAST_SUCCESS, C_TOAST_WARNING};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    fn lifetime(self) -> Duration {
        match self {
            Severity::Info | Severity::Success => Duration::from_secs(3),
            Severity::Warning => Duration::from_secs(4),
            Severity::Error => Duration::from_secs(6),
        }
    }

    fn color(self) -> Color {
        match self {
            Severity::Info => C_TOAST_INFO,
            Severity::Success => C_TOAST_SUCCESS,
            Severity::Warning => C_TOAST_WARNING,
            Severity::Error => C_TOAST_ERROR,
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Severity::Info => "·",
            Severity::Success => "✓",
            Severity::Warning => "!",
            Severity::Error => "✗",
        }
    }
}

struct Toast {
    message: String,
    severity: Severity,
    expires: Instant,
}

struct Spinner {
    message: String,
    frame: usize,
}

const SPINNER_FRAMES: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
const MAX_VISIBLE: usize = 4;

pub struct ToastManager {
    toasts: VecDeque<Toast>,
    spinner: Option<Spinner>,
}

impl ToastManager {
    pub fn new() -> Self {
        Self {
            toasts: VecDeque::new(),
            spinner: None,
        }
    }

    pub fn push(&mut self, message: impl Into<String>, severity: Severity) {
        self.push_at(message.into(), severity, Instant::now());
    }

    fn push_at(&mut self, message: String, severity: Severity, now: Instant) {
        // A repeated message replaces the older copy.
        self.toasts.retain(|t| t.message != message);
        self.toasts.push_back(Toast {
            message,
            severity,
            expires: now + severity.lifetime(),
        });
        while self.toasts.len() > MAX_VISIBLE * 2 {
            self.toasts.pop_front();
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Info);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Success);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Warning);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Error);
    }

    /// Show the spinner until `resolve_spinner` or `dismiss_spinner`.
    pub fn spinner(&mut self, message: impl Into<String>) {
        self.spinner = Some(Spinner {
            message: message.into(),
            frame: 0,
        });
    }

    /// Replace the spinner with an ordinary expiring toast.
    pub fn resolve_spinner(&mut self, severity: Severity, message: impl Into<String>) {
        self.spinner = None;
        self.push(message, severity);
    }

    pub fn dismiss_spinner(&mut self) {
        self.spinner = None;
    }

    /// Drop expired toasts and advance the spinner. Call each UI tick.
    pub fn tick(&mut self) {
        self.expire(Instant::now());
        if let Some(ref mut s) = self.spinner {
            s.frame = (s.frame + 1) % SPINNER_FRAMES.len();
        }
    }

    fn expire(&mut self, now: Instant) {
        self.toasts.retain(|t| t.expires > now);
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty() && self.spinner.is_none()
    }

    fn visible(&self) -> impl Iterator<Item = (&'static str, &str, Color)> + '_ {
        let spinner = self.spinner.as_ref().map(|s| {
            (
                SPINNER_FRAMES[s.frame % SPINNER_FRAMES.len()],
                s.message.as_str(),
                C_TOAST_INFO,
            )
        });
        let toasts = self
            .toasts
            .iter()
            .rev()
            .take(MAX_VISIBLE)
            .map(|t| (t.severity.icon(), t.message.as_str(), t.severity.color()));
        spinner.into_iter().chain(toasts)
    }

    /// Render toasts in the top-right corner of `area`, newest first.
    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        if self.is_empty() {
            return;
        }
        let max_width = (area.width / 2).clamp(30, 60).min(area.width);
        let bottom = area.y + area.height;

        for (row, (icon, message, color)) in self.visible().enumerate() {
            let y = area.y + 1 + row as u16;
            if y >= bottom {
                break;
            }
            let w = (message.chars().count() as u16 + 4).min(max_width);
            let toast_area = Rect {
                x: area.x + area.width.saturating_sub(w + 1),
                y,
                width: w,
                height: 1,
            };
            frame.render_widget(Clear, toast_area);
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(
                    format!(" {} {} ", icon, message),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))),
                toast_area,
            );
        }
    }
}

impl Default for ToastManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(t: &ToastManager) -> Vec<String> {
        t.visible().map(|(_, m, _)| m.to_string()).collect()
    }

    #[test]
    fn test_repeated_message_kept_once() {
        let mut t = ToastManager::new();
        t.info("recording");
        t.warning("recording");
        assert_eq!(messages(&t), vec!["recording"]);
    }

    #[test]
    fn test_expiry_by_severity() {
        let mut t = ToastManager::new();
        let now = Instant::now();
        t.push_at("info".into(), Severity::Info, now);
        t.push_at("error".into(), Severity::Error, now);

        t.expire(now + Duration::from_secs(4));
        assert_eq!(messages(&t), vec!["error"]);
        t.expire(now + Duration::from_secs(7));
        assert!(t.is_empty());
    }

    #[test]
    fn test_spinner_listed_first_until_resolved() {
        let mut t = ToastManager::new();
        t.info("older");
        t.spinner("connecting");
        assert_eq!(messages(&t), vec!["connecting", "older"]);

        t.resolve_spinner(Severity::Success, "live");
        assert_eq!(messages(&t), vec!["live", "older"]);
    }

    #[test]
    fn test_queue_is_capped() {
        let mut t = ToastManager::new();
        for i in 0..20 {
            t.info(format!("m{}", i));
        }
        assert_eq!(t.toasts.len(), MAX_VISIBLE * 2);
        assert_eq!(messages(&t).first().map(String::as_str), Some("m19"));
    }
}
