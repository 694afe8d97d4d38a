//! Boundary to the text widget that displays the terminal.
//!
//! Positions are measured in characters, not bytes.

/// The operations the terminal core needs from a text widget.
///
/// Implementations are owned and driven by the UI thread. `set_text` may
/// synchronously fire the widget's own "text changed" notification, which
/// ends up back in [`TerminalBuffer::reconcile_edit`](crate::TerminalBuffer::reconcile_edit).
#[cfg_attr(test, mockall::automock)]
pub trait TextWidget {
    fn set_text(&mut self, text: &str);
    fn text(&self) -> String;
    fn caret(&self) -> usize;
    fn set_caret(&mut self, position: usize);
    fn scroll_to_bottom(&mut self);
}

type ChangeListener = Box<dyn FnMut(&str, usize) + Send>;

/// In-memory widget for headless front-ends and tests.
///
/// Programmatic `set_text` notifies the optional change listener, the way a
/// GUI text area does; user edits made through [`insert_at_caret`](Self::insert_at_caret)
/// and [`backspace`](Self::backspace) do not, so the caller forwards them itself.
#[derive(Default)]
pub struct MemoryWidget {
    text: String,
    caret: usize,
    scrolls: usize,
    listener: Option<ChangeListener>,
}

impl MemoryWidget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a callback fired after every programmatic `set_text`.
    pub fn with_change_listener(mut self, listener: impl FnMut(&str, usize) + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Type `input` at the caret, as a user would.
    pub fn insert_at_caret(&mut self, input: &str) {
        let at = byte_offset(&self.text, self.caret);
        self.text.insert_str(at, input);
        self.caret += input.chars().count();
    }

    /// Delete the character before the caret, as a user would.
    pub fn backspace(&mut self) {
        if self.caret == 0 {
            return;
        }
        let end = byte_offset(&self.text, self.caret);
        let start = byte_offset(&self.text, self.caret - 1);
        self.text.replace_range(start..end, "");
        self.caret -= 1;
    }

    /// Number of `scroll_to_bottom` calls so far.
    pub fn scroll_count(&self) -> usize {
        self.scrolls
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl TextWidget for MemoryWidget {
    fn set_text(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.caret = self.caret.min(self.char_len());
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.text, self.caret);
        }
    }

    fn text(&self) -> String {
        self.text.clone()
    }

    fn caret(&self) -> usize {
        self.caret
    }

    fn set_caret(&mut self, position: usize) {
        self.caret = position.min(self.char_len());
    }

    fn scroll_to_bottom(&mut self) {
        self.scrolls += 1;
    }
}

/// Byte offset of the `chars`-th character, or the end of `text`.
pub(crate) fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[test]
    fn typing_moves_caret() {
        let mut widget = MemoryWidget::new();
        widget.insert_at_caret("2+");
        widget.insert_at_caret("2");
        assert_eq!(widget.text(), "2+2");
        assert_eq!(widget.caret(), 3);
    }

    #[test]
    fn typing_in_the_middle_inserts() {
        let mut widget = MemoryWidget::new();
        widget.insert_at_caret("ac");
        widget.set_caret(1);
        widget.insert_at_caret("b");
        assert_eq!(widget.text(), "abc");
        assert_eq!(widget.caret(), 2);
    }

    #[test]
    fn backspace_handles_multibyte_characters() {
        let mut widget = MemoryWidget::new();
        widget.insert_at_caret("héé");
        widget.backspace();
        assert_eq!(widget.text(), "hé");
        assert_eq!(widget.caret(), 2);
        widget.set_caret(0);
        widget.backspace();
        assert_eq!(widget.text(), "hé");
    }

    #[test]
    fn set_text_clamps_caret_and_notifies() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut widget = MemoryWidget::new().with_change_listener({
            let seen = seen.clone();
            move |text, caret| seen.lock().unwrap().push((text.to_string(), caret))
        });
        widget.insert_at_caret("hello world");
        widget.set_text("hi");

        assert_eq!(widget.caret(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![("hi".to_string(), 2)]);
    }

    #[test]
    fn byte_offset_counts_characters() {
        assert_eq!(byte_offset("añb", 0), 0);
        assert_eq!(byte_offset("añb", 2), 3);
        assert_eq!(byte_offset("añb", 9), 4);
    }
}
