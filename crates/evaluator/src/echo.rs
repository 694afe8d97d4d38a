//! Line-oriented reference runtime.
//!
//! Every source line is one statement:
//!
//! | Line              | Effect                                              |
//! |-------------------|-----------------------------------------------------|
//! | `log <text>`      | `<text>` to the log stream                          |
//! | `fail <message>`  | stop with an error located at this line             |
//! | `input [prompt]`  | print the prompt, read a line, echo it back         |
//! | `sleep <ms>`      | wait, giving up early when cancelled                |
//! | a bound name      | run the bound session command (`clear`, `exit`)     |
//! | anything else     | echoed to the output stream                         |
//!
//! A line ending in `\` continues on the next one. At the interactive prompt
//! a trailing `\` makes the source incomplete.

use parking_lot::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use collections::FxHashMap;

use crate::control::{ControlHandle, SessionCommand};
use crate::language::LanguageSpec;
use crate::{EvalError, EvalIo, EvalMode, EvalRequest, Evaluator, Outcome};

const LANGUAGE_ID: &str = "echo";

const SLEEP_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
pub struct EchoEvaluator {
    bindings: Mutex<FxHashMap<String, SessionCommand>>,
}

impl EchoEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table entry for the echo language.
    pub fn language_spec() -> LanguageSpec {
        LanguageSpec::new(LANGUAGE_ID, "Echo").with_init("Echo runtime (line mode)")
    }

    fn statement(&self, text: &str, line: usize, io: &EvalIo) -> Result<Flow, EvalError> {
        let (word, rest) = match text.split_once(' ') {
            Some((word, rest)) => (word, rest),
            None => (text, ""),
        };

        match word {
            "log" => io.log.write_line(rest),
            "fail" => return Err(EvalError::new(rest.trim_end()).at(text.trim_end(), line, 1)),
            "input" => {
                io.output.write_str(rest);
                match io.request_input_line() {
                    Some(answer) => io.output.write_line(&answer),
                    None => return Err(EvalError::new("input closed").at(text, line, 1)),
                }
            }
            "sleep" => {
                let millis: u64 = rest
                    .trim()
                    .parse()
                    .map_err(|_| EvalError::new("sleep expects milliseconds").at(text, line, 7))?;
                let deadline = Instant::now() + Duration::from_millis(millis);
                while Instant::now() < deadline {
                    if io.is_cancelled() {
                        return Ok(Flow::Stop);
                    }
                    thread::sleep(SLEEP_SLICE.min(deadline.saturating_duration_since(Instant::now())));
                }
            }
            _ => {
                let bound = self.bindings.lock().get(text.trim_end()).copied();
                match bound {
                    Some(command) => {
                        io.control.run(command);
                        if command == SessionCommand::Exit {
                            return Ok(Flow::Stop);
                        }
                    }
                    None => io.output.write_line(text),
                }
            }
        }
        Ok(Flow::Continue)
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Join `\`-continued lines. Returns each statement with its first line
/// number, and whether the source ended mid-statement.
fn statements(source: &str) -> (Vec<(String, usize)>, bool) {
    let mut statements = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for (index, line) in source.lines().enumerate() {
        let (text, _) = current.get_or_insert_with(|| (String::new(), index + 1));
        match line.strip_suffix('\\') {
            Some(head) => text.push_str(head),
            None => {
                text.push_str(line);
                statements.extend(current.take());
            }
        }
    }

    let dangling = current.is_some();
    statements.extend(current);
    (statements, dangling)
}

impl Evaluator for EchoEvaluator {
    fn supports(&self, language: &str) -> bool {
        language == LANGUAGE_ID
    }

    fn bind(&self, language: &LanguageSpec, _control: &ControlHandle) -> anyhow::Result<()> {
        let mut bindings = self.bindings.lock();
        for (name, command) in &language.bindings {
            bindings.insert(name.clone(), *command);
        }
        tracing::debug!(language = %language.id, count = bindings.len(), "Bound session commands");
        Ok(())
    }

    fn evaluate(&self, request: &EvalRequest, io: &EvalIo) -> Outcome {
        let (statements, dangling) = statements(&request.source);
        if dangling {
            if request.mode == EvalMode::Interactive {
                return Outcome::Incomplete;
            }
            let line = statements.last().map_or(1, |(_, line)| *line);
            return Outcome::Failed(
                EvalError::new("unexpected end of input").at(request.origin(), line, 1),
            );
        }

        for (text, line) in statements {
            if io.is_cancelled() {
                break;
            }
            if text.trim().is_empty() {
                continue;
            }
            match self.statement(text.trim_start(), line, io) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(error) => return Outcome::Failed(error),
            }
        }
        Outcome::Completed
    }
}
