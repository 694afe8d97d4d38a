//! Session controls exposed to running programs (`clear`, `exit`, `quit`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use terminal::TerminalBuffer;

/// Cooperative cancellation flag shared between a session and its evaluations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Action a runtime binding triggers in the owning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionCommand {
    /// Empty the terminal's committed text.
    Clear,
    /// End the session.
    Exit,
}

/// Handle through which bound runtime functions reach the session.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    buffer: TerminalBuffer,
    exit_requested: Arc<AtomicBool>,
    cancel: CancelToken,
}

impl ControlHandle {
    pub fn new(buffer: TerminalBuffer, cancel: CancelToken) -> Self {
        Self {
            buffer,
            exit_requested: Arc::new(AtomicBool::new(false)),
            cancel,
        }
    }

    /// Run `command`. Exit also cancels the evaluation that asked for it.
    pub fn run(&self, command: SessionCommand) {
        tracing::debug!(?command, "Session command");
        match command {
            SessionCommand::Clear => self.buffer.clear(),
            SessionCommand::Exit => {
                self.exit_requested.store(true, Ordering::Release);
                self.cancel.cancel();
                self.buffer.request_refresh();
            }
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}
