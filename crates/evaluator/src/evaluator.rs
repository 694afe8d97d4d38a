//! Boundary between a terminal session and the language runtime behind it.
//!
//! A runtime implements [`Evaluator`]. It never touches the display: all it
//! produces goes through the sinks in [`EvalIo`], and all it reads comes
//! from the session's input channel.

mod control;
mod echo;
mod language;

use std::fmt;
use std::sync::Arc;

use terminal::{LineChannel, SinkKind, SinkWriter, StreamSinks};

pub use control::{CancelToken, ControlHandle, SessionCommand};
pub use echo::EchoEvaluator;
pub use language::{BindingScope, LanguageSpec, LanguageTable};

/// How source handed to [`Evaluator::evaluate`] should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Typed at the prompt; may be reported as [`Outcome::Incomplete`].
    Interactive,
    /// A complete program submitted at once.
    Script,
    /// Session plumbing such as init snippets.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalRequest {
    pub language: String,
    pub source: String,
    pub mode: EvalMode,
}

impl EvalRequest {
    pub fn new(language: impl Into<String>, source: impl Into<String>, mode: EvalMode) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
            mode,
        }
    }

    /// Name of the pseudo-file the source comes from.
    pub fn origin(&self) -> &'static str {
        match self.mode {
            EvalMode::Interactive | EvalMode::Script => "<shell>",
            EvalMode::Internal => "<internal>",
        }
    }
}

/// Where in the source an error was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// The offending source text.
    pub snippet: String,
    /// 1-based.
    pub line: usize,
    /// 1-based.
    pub column: usize,
}

/// A program error, shown to the user on the error stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, snippet: impl Into<String>, line: usize, column: usize) -> Self {
        self.location = Some(SourceLocation {
            snippet: snippet.into(),
            line,
            column,
        });
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(location) = &self.location {
            write!(
                f,
                "\n\tat \"{}\" ({}:{})",
                location.snippet, location.line, location.column
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The source is a valid prefix; more lines are needed.
    Incomplete,
    Failed(EvalError),
}

/// I/O and control available to a running program.
#[derive(Debug, Clone)]
pub struct EvalIo {
    pub output: SinkWriter,
    pub log: SinkWriter,
    pub error: SinkWriter,
    pub input: Arc<LineChannel>,
    pub control: ControlHandle,
}

impl EvalIo {
    pub fn new(sinks: &StreamSinks, input: Arc<LineChannel>, control: ControlHandle) -> Self {
        Self {
            output: sinks.writer(SinkKind::Output),
            log: sinks.writer(SinkKind::Log),
            error: sinks.writer(SinkKind::Error),
            input,
            control,
        }
    }

    /// Block until the user submits a line. `None` means end of input.
    pub fn request_input_line(&self) -> Option<String> {
        self.input.receive_line()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancel_token().is_cancelled()
    }
}

/// A language runtime.
///
/// `evaluate` runs on a worker thread and may block in
/// [`EvalIo::request_input_line`]; it must check [`EvalIo::is_cancelled`]
/// in any long-running loop.
pub trait Evaluator: Send + Sync {
    /// Whether this runtime can evaluate `language`.
    fn supports(&self, language: &str) -> bool;

    /// Install the language's control bindings before first use.
    fn bind(&self, _language: &LanguageSpec, _control: &ControlHandle) -> anyhow::Result<()> {
        Ok(())
    }

    fn evaluate(&self, request: &EvalRequest, io: &EvalIo) -> Outcome;
}
