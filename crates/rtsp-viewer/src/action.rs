//! Action enum: user intents and session outcomes flowing through the App.

/// Unique identifier for a focusable component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    UrlBar,
    Preview,
    ErrorDialog,
}

/// All actions that can flow through the system.
/// Components produce Actions; the App dispatches them.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Session ──────────────────────────────────────────────────────────────
    /// Start a session against this base URL.
    Connect(String),
    /// Stop the running session.
    Stop,
    /// The URL field changed; refresh history suggestions.
    UrlEdited(String),

    // ── Navigation ───────────────────────────────────────────────────────────
    FocusNext,
    FocusPane(ComponentId),

    // ── Overlays ─────────────────────────────────────────────────────────────
    /// Show a modal error (title, body).
    ShowError(String, String),
    DismissError,
    ToggleKeysBar,

    Quit,
}
