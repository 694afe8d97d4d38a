//! Input events a front-end forwards to a session.

/// What happened in the terminal widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// The widget content changed through a user edit.
    TextChanged { text: String, caret: usize },
    /// Enter was pressed.
    Enter,
    /// Up arrow.
    HistoryOlder,
    /// Down arrow.
    HistoryNewer,
    FocusGained,
    FocusLost,
}

impl TerminalEvent {
    pub fn text_changed(text: impl Into<String>, caret: usize) -> Self {
        Self::TextChanged {
            text: text.into(),
            caret,
        }
    }
}
