//! Shared test utilities for integration tests.
//!
//! A tiny arithmetic runtime, a harness that drives a session through a
//! `MemoryWidget` the way a front-end would, and temp-dir config fixtures.

// Not every test binary uses every helper
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use evaluator::{EvalError, EvalIo, EvalRequest, Evaluator, LanguageSpec, LanguageTable, Outcome};
use replterm_session::{ReplSession, TerminalEvent};
use settings::Config;
use terminal::{MemoryWidget, TextWidget};

pub use tempfile::{tempdir, TempDir};

/// Default timeout for cross-thread waits
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tick period used by test sessions
pub const TEST_TICK: Duration = Duration::from_millis(10);

/// Language id of [`SumEvaluator`].
pub const CALC: &str = "calc";

/// Poll `condition` until it holds, failing the test after [`DEFAULT_TIMEOUT`].
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + DEFAULT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// Evaluates `a+b+...` over integers, one expression per line.
///
/// `read` asks for a number on the input channel and prints it doubled.
#[derive(Debug, Default)]
pub struct SumEvaluator;

impl SumEvaluator {
    pub fn language_spec() -> LanguageSpec {
        LanguageSpec::new(CALC, "Calculator")
    }

    pub fn table() -> LanguageTable {
        let mut table = LanguageTable::new();
        table.insert(Self::language_spec());
        table
    }

    fn line(&self, line: &str, number: usize, io: &EvalIo) -> Result<(), EvalError> {
        if line == "read" {
            let answer = io
                .request_input_line()
                .ok_or_else(|| EvalError::new("no input"))?;
            let value: i64 = answer
                .trim()
                .parse()
                .map_err(|_| EvalError::new("not a number").at(answer.as_str(), number, 1))?;
            io.output.write_line(&(value * 2).to_string());
            return Ok(());
        }

        let mut sum = 0i64;
        let mut column = 1;
        for term in line.split('+') {
            let value: i64 = term
                .trim()
                .parse()
                .map_err(|_| EvalError::new("not a number").at(term.trim(), number, column))?;
            sum += value;
            column += term.len() + 1;
        }
        io.output.write_line(&sum.to_string());
        Ok(())
    }
}

impl Evaluator for SumEvaluator {
    fn supports(&self, language: &str) -> bool {
        language == CALC
    }

    fn evaluate(&self, request: &EvalRequest, io: &EvalIo) -> Outcome {
        if request.source.trim_end().ends_with('+') {
            return Outcome::Incomplete;
        }
        let source = request.source.replace("+\n", "+");
        for (index, line) in source.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if let Err(error) = self.line(line.trim(), index + 1, io) {
                return Outcome::Failed(error);
            }
        }
        Outcome::Completed
    }
}

// ============================================================================
// Session harness
// ============================================================================

/// A session plus the widget a front-end would own.
pub struct TestTerminal {
    pub session: ReplSession,
    pub widget: MemoryWidget,
}

impl TestTerminal {
    pub fn new(config: &Config, table: LanguageTable, evaluator: Arc<dyn Evaluator>) -> Self {
        let session = ReplSession::new(config, table, evaluator).expect("Failed to start session");
        let terminal = Self {
            session,
            widget: MemoryWidget::new(),
        };
        terminal.wait_idle();
        terminal
    }

    /// Calculator session without banner, ticking fast.
    pub fn calc() -> Self {
        Self::new(&test_config(), SumEvaluator::table(), Arc::new(SumEvaluator))
    }

    pub fn wait_idle(&self) {
        wait_until("session to become idle", || !self.session.is_running());
        self.session.tick();
    }

    pub fn wait_for_input_request(&self) {
        wait_until("program to ask for input", || self.session.is_input_blocked());
        self.session.tick();
    }

    /// Type `text` at the end of the live line.
    pub fn type_text(&mut self, text: &str) {
        self.session.tick();
        self.session.poll(&mut self.widget);
        self.widget.set_caret(usize::MAX);
        self.widget.insert_at_caret(text);
        let event = TerminalEvent::text_changed(self.widget.text(), self.widget.caret());
        self.session
            .handle_event(event, &mut self.widget)
            .expect("Failed to handle edit");
    }

    pub fn press(&mut self, event: TerminalEvent) {
        self.session
            .handle_event(event, &mut self.widget)
            .expect("Failed to handle event");
    }

    /// Type `line`, press Enter.
    pub fn enter(&mut self, line: &str) {
        self.type_text(line);
        self.press(TerminalEvent::Enter);
    }

    /// Refresh the widget and return what it shows.
    pub fn screen(&mut self) -> String {
        self.session.tick();
        self.session.poll(&mut self.widget);
        self.widget.text()
    }

    pub fn committed(&self) -> String {
        self.session.buffer().committed_text()
    }
}

// ============================================================================
// Test Environment Setup
// ============================================================================

/// Config used by harness sessions.
pub fn test_config() -> Config {
    Config {
        tick_interval_ms: TEST_TICK.as_millis() as u64,
        banner: false,
        ..Config::default()
    }
}

/// Temporary config directory, removed on drop.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("replterm").join("config.toml");
        Self {
            temp_dir,
            config_path,
        }
    }

    pub fn write_config(&self, content: &str) {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create config dir");
        }
        std::fs::write(&self.config_path, content).expect("Failed to write config");
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
