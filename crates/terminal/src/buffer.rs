//! Authoritative terminal content: committed output plus the live input line.
//!
//! The display always shows `committed + live_line`. Only the live line is
//! editable; anything else the widget reports is rolled back on the next
//! refresh. Mutators are cheap and safe to call from the UI thread while the
//! stream aggregator appends output from its own thread.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use settings::constants::{scrollback, LINE_SEPARATOR};
use util::debug_panic;

use crate::line_channel::LineChannel;
use crate::widget::TextWidget;

/// Result of reconciling a widget edit against the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit touched only the live line and was adopted.
    Accepted,
    /// The edit touched committed text or typed a line terminator; the
    /// buffer is dirty and the next refresh restores the display.
    Rejected,
    /// The notification came from our own refresh and was skipped.
    Ignored,
}

/// Direction of a history step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    /// Towards earlier entries (Up).
    Older,
    /// Towards the draft line (Down).
    Newer,
}

#[derive(Debug, Default)]
struct BufferState {
    committed: String,
    /// `committed.chars().count()`, kept in step with `committed`.
    committed_chars: usize,
    live_line: String,
    history: Vec<String>,
    /// Steps back from the newest history entry; 0 means not browsing.
    history_cursor: usize,
    dirty: bool,
    /// Caret to restore on the next refresh instead of the widget's own.
    caret_hint: Option<usize>,
}

impl BufferState {
    fn push_committed(&mut self, text: &str, capacity: usize) {
        self.committed.push_str(text);
        self.committed_chars += text.chars().count();
        if self.committed_chars > capacity {
            let excess = self.committed_chars - capacity;
            let cut = crate::widget::byte_offset(&self.committed, excess);
            self.committed.drain(..cut);
            self.committed_chars = capacity;
        }
        self.dirty = true;
    }

    fn display_text(&self) -> String {
        let mut text = String::with_capacity(self.committed.len() + self.live_line.len());
        text.push_str(&self.committed);
        text.push_str(&self.live_line);
        text
    }
}

struct BufferInner {
    state: Mutex<BufferState>,
    input: Arc<LineChannel>,
    capacity: usize,
    /// Set while `refresh_display` is pushing text into the widget.
    applying: AtomicBool,
    refresh_requested: AtomicBool,
}

/// Shared handle to one terminal's content. Cloning shares the buffer.
#[derive(Clone)]
pub struct TerminalBuffer {
    inner: Arc<BufferInner>,
}

impl std::fmt::Debug for TerminalBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TerminalBuffer")
            .field("committed_chars", &state.committed_chars)
            .field("live_line", &state.live_line)
            .field("history_len", &state.history.len())
            .field("dirty", &state.dirty)
            .finish()
    }
}

impl TerminalBuffer {
    /// Create a buffer that forwards committed lines to `input`.
    pub fn new(input: Arc<LineChannel>) -> Self {
        Self::with_capacity(input, scrollback::DEFAULT_CHARS)
    }

    /// Create a buffer keeping the trailing `capacity` characters of output.
    pub fn with_capacity(input: Arc<LineChannel>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                state: Mutex::new(BufferState::default()),
                input,
                capacity: capacity.max(1),
                applying: AtomicBool::new(false),
                refresh_requested: AtomicBool::new(false),
            }),
        }
    }

    /// The channel committed lines are forwarded to.
    pub fn input(&self) -> &Arc<LineChannel> {
        &self.inner.input
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Append produced output, keeping only the trailing window.
    pub fn append_output(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.inner
            .state
            .lock()
            .push_committed(text, self.inner.capacity);
        self.request_refresh();
    }

    /// Adopt or reject the widget's new content after a user edit.
    ///
    /// `caret_hint` is the widget caret after the edit; on rejection it is
    /// kept (but never inside committed text) for the restoring refresh.
    pub fn reconcile_edit(&self, new_text: &str, caret_hint: usize) -> EditOutcome {
        if self.inner.applying.load(Ordering::Acquire) {
            return EditOutcome::Ignored;
        }

        let mut state = self.inner.state.lock();
        let live = match new_text.strip_prefix(state.committed.as_str()) {
            Some(live) if !ends_with_terminator(live) => live,
            _ => {
                tracing::trace!(
                    committed_chars = state.committed_chars,
                    "Rejected edit outside the live line"
                );
                state.caret_hint = Some(caret_hint.max(state.committed_chars));
                state.dirty = true;
                drop(state);
                self.request_refresh();
                return EditOutcome::Rejected;
            }
        };

        if live != state.live_line {
            state.live_line.clear();
            state.live_line.push_str(live);
        }
        EditOutcome::Accepted
    }

    /// Move the live line into committed text and hand it to the input channel.
    ///
    /// Returns the line as delivered (line terminators removed).
    pub fn commit_line(&self) -> String {
        let line = {
            let mut state = self.inner.state.lock();
            let line: String = std::mem::take(&mut state.live_line)
                .chars()
                .filter(|c| !matches!(c, '\r' | '\n'))
                .collect();

            let trimmed = line.trim();
            if !trimmed.is_empty() {
                state.history.push(trimmed.to_string());
            }
            state.history_cursor = 0;

            let capacity = self.inner.capacity;
            state.push_committed(&line, capacity);
            state.push_committed(LINE_SEPARATOR, capacity);
            line
        };

        self.inner.input.submit(line.clone());
        self.request_refresh();
        line
    }

    /// Replace the live line with the next older or newer history entry.
    pub fn navigate_history(&self, direction: HistoryDirection) {
        let mut state = self.inner.state.lock();
        let len = state.history.len();
        if state.history_cursor > len {
            debug_panic!("history cursor {} beyond {} entries", state.history_cursor, len);
            state.history_cursor = len;
        }

        state.history_cursor = match direction {
            HistoryDirection::Older => (state.history_cursor + 1).min(len),
            HistoryDirection::Newer => state.history_cursor.saturating_sub(1),
        };
        state.live_line = match state.history_cursor {
            0 => String::new(),
            cursor => state.history[len - cursor].clone(),
        };
        state.caret_hint = Some(usize::MAX);
        state.dirty = true;
        drop(state);
        self.request_refresh();
    }

    /// Drop all committed text. The live line survives.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.committed.clear();
        state.committed_chars = 0;
        state.dirty = true;
        drop(state);
        self.request_refresh();
    }

    /// Push the model into the widget if it changed since the last refresh.
    ///
    /// The caret lands at the end of committed text unless it was already
    /// further forward. Returns whether the widget was updated. Change
    /// notifications fired by the widget during the update are ignored.
    pub fn refresh_display(&self, widget: &mut dyn TextWidget) -> bool {
        if self.inner.applying.swap(true, Ordering::AcqRel) {
            return false;
        }
        let refreshed = self.apply_to(widget);
        self.inner.applying.store(false, Ordering::Release);
        refreshed
    }

    fn apply_to(&self, widget: &mut dyn TextWidget) -> bool {
        let (text, committed_chars, caret_hint) = {
            let mut state = self.inner.state.lock();
            if !state.dirty {
                return false;
            }
            state.dirty = false;
            (
                state.display_text(),
                state.committed_chars,
                state.caret_hint.take(),
            )
        };

        let total_chars = text.chars().count();
        let caret = caret_hint
            .unwrap_or_else(|| widget.caret())
            .max(committed_chars)
            .min(total_chars);

        widget.set_text(&text);
        widget.set_caret(caret);
        widget.scroll_to_bottom();
        true
    }

    /// Keep the widget caret out of committed text (focus changes).
    pub fn clamp_caret(&self, widget: &mut dyn TextWidget) {
        let committed_chars = self.inner.state.lock().committed_chars;
        if widget.caret() < committed_chars {
            widget.set_caret(committed_chars);
        }
    }

    /// Ask the UI to refresh on its next poll.
    pub fn request_refresh(&self) {
        self.inner.refresh_requested.store(true, Ordering::Release);
    }

    /// Check and clear the refresh-requested flag.
    pub fn take_refresh_requested(&self) -> bool {
        self.inner.refresh_requested.swap(false, Ordering::AcqRel)
    }

    pub fn committed_text(&self) -> String {
        self.inner.state.lock().committed.clone()
    }

    pub fn live_line(&self) -> String {
        self.inner.state.lock().live_line.clone()
    }

    /// What the widget should be showing: committed text then the live line.
    pub fn display_text(&self) -> String {
        self.inner.state.lock().display_text()
    }

    pub fn history(&self) -> Vec<String> {
        self.inner.state.lock().history.clone()
    }

    pub fn history_cursor(&self) -> usize {
        self.inner.state.lock().history_cursor
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }
}

fn ends_with_terminator(text: &str) -> bool {
    text.ends_with('\n') || text.ends_with('\r')
}
