//! Work that runs on the evaluation thread.
//!
//! At most one job runs per session. The busy flag is claimed on the UI
//! thread before the job is spawned and released by the job itself, after
//! it has printed the next prompt.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use evaluator::{
    CancelToken, EvalError, EvalIo, EvalMode, EvalRequest, Evaluator, LanguageTable, Outcome,
};
use settings::constants::prompt;
use terminal::LineChannel;
use uuid::Uuid;

/// One unit of evaluation-thread work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Job {
    /// Run every language's init snippet, then show the first prompt.
    Init,
    /// Read a statement from the input channel and evaluate it.
    ReadEvalPrint,
    /// Evaluate a whole program.
    Script(String),
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ReadEvalPrint => "repl",
            Self::Script(_) => "script",
        }
    }
}

/// State shared by the session and its evaluation thread.
pub(crate) struct Shared {
    pub id: Uuid,
    pub input: Arc<LineChannel>,
    pub io: EvalIo,
    pub evaluator: Arc<dyn Evaluator>,
    pub languages: LanguageTable,
    pub current: AtomicUsize,
    pub busy: AtomicBool,
    pub cancel: CancelToken,
}

impl Shared {
    pub fn current_language(&self) -> &str {
        let index = self.current.load(Ordering::Acquire);
        self.languages
            .get_index(index)
            .map_or("", |spec| spec.id.as_str())
    }

    pub fn show_prompt(&self) {
        self.io
            .output
            .write_str(&format!("{}{}", self.current_language(), prompt::SUFFIX));
    }

    /// Body of the evaluation thread.
    pub fn run(&self, job: Job) {
        let name = job.name();
        tracing::debug!(session = %self.id, job = name, "Job started");

        let finished = catch_unwind(AssertUnwindSafe(|| match &job {
            Job::Init => self.run_init(),
            Job::ReadEvalPrint => self.read_eval_print(),
            Job::Script(source) => self.run_script(source),
        }));
        if finished.is_err() {
            tracing::error!(session = %self.id, job = name, "Evaluator panicked");
            self.report(&EvalError::new("Internal error: evaluator panicked"));
        }

        if !self.cancel.is_cancelled() {
            if job == Job::Init {
                self.io.output.write_str(settings::constants::LINE_SEPARATOR);
            }
            self.show_prompt();
        }
        self.busy.store(false, Ordering::Release);
        tracing::debug!(session = %self.id, job = name, "Job finished");
    }

    fn run_init(&self) {
        for spec in self.languages.iter() {
            if self.cancel.is_cancelled() {
                return;
            }
            if spec.init_snippet.is_empty() {
                continue;
            }
            tracing::debug!(session = %self.id, language = %spec.id, "Initializing language");
            let request = EvalRequest::new(&spec.id, &spec.init_snippet, EvalMode::Internal);
            if let Outcome::Failed(error) = self.evaluator.evaluate(&request, &self.io) {
                self.report(&error);
            }
        }
    }

    fn run_script(&self, source: &str) {
        let request = EvalRequest::new(self.current_language(), source, EvalMode::Script);
        match self.evaluator.evaluate(&request, &self.io) {
            Outcome::Completed => {}
            Outcome::Incomplete => self.report(&EvalError::new("Incomplete source")),
            Outcome::Failed(error) => self.report(&error),
        }
    }

    fn read_eval_print(&self) {
        // Blank lines and comments are skipped while more input is queued.
        let first = loop {
            let Some(line) = self.io.request_input_line() else {
                return self.end_of_input();
            };
            let skippable = line.trim().is_empty() || line.starts_with('#');
            if !skippable || self.input.is_empty() {
                break line;
            }
        };
        if first.trim().is_empty() {
            return;
        }

        let language = self.current_language();
        let mut source = first;
        source.push('\n');
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let request = EvalRequest::new(language, source.as_str(), EvalMode::Interactive);
            match self.evaluator.evaluate(&request, &self.io) {
                Outcome::Completed => break,
                Outcome::Failed(error) => {
                    self.report(&error);
                    break;
                }
                Outcome::Incomplete => loop {
                    // Collect continuation lines until a blank one, then retry.
                    self.io.output.write_str(prompt::CONTINUATION);
                    match self.io.request_input_line() {
                        None => return self.end_of_input(),
                        Some(line) if line.is_empty() => break,
                        Some(line) => {
                            source.push_str(&line);
                            source.push('\n');
                        }
                    }
                },
            }
        }
        self.input.try_flush();
    }

    fn end_of_input(&self) {
        if !self.cancel.is_cancelled() {
            self.io.error.write_line("EOF reached.");
        }
    }

    fn report(&self, error: &EvalError) {
        tracing::debug!(session = %self.id, error = %error.message, "Evaluation failed");
        self.io.error.write_line(&error.to_string());
    }
}
