//! One interactive terminal session.
//!
//! [`ReplSession`] owns every core component of a terminal: the display
//! buffer, the input channel, the output sinks with their aggregator, and
//! the language runtime. There is no process-wide state; front-ends create
//! a session, forward widget events to it, and poll it from their UI timer.
//!
//! ```text
//!  UI thread                 evaluation thread           aggregator thread
//!  ─────────                 ─────────────────           ─────────────────
//!  handle_event ─► buffer ─► LineChannel ─► Evaluator ─► sinks ─► tick ─► buffer
//!  poll ◄──────────────────────────────────────────────────── refresh flag
//! ```

mod event;
mod job;

use anyhow::Context;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use evaluator::{CancelToken, ControlHandle, EvalIo, Evaluator, LanguageTable};
use settings::Config;
use terminal::{
    EditOutcome, HistoryDirection, LineChannel, StreamAggregator, StreamSinks, TerminalBuffer,
    TextWidget,
};
use uuid::Uuid;

use job::{Job, Shared};

pub use event::TerminalEvent;

/// A terminal wired to a language runtime.
pub struct ReplSession {
    shared: Arc<Shared>,
    buffer: TerminalBuffer,
    sinks: StreamSinks,
    aggregator: StreamAggregator,
    control: ControlHandle,
    closed: AtomicBool,
}

impl ReplSession {
    /// Build a session over the languages of `table` that `evaluator`
    /// supports and `config` enables, start output aggregation and run
    /// the init snippets.
    pub fn new(
        config: &Config,
        mut table: LanguageTable,
        evaluator: Arc<dyn Evaluator>,
    ) -> anyhow::Result<Self> {
        table.retain(|spec| evaluator.supports(&spec.id) && config.language_enabled(&spec.id));
        table.reorder(&config.languages);
        anyhow::ensure!(
            !table.is_empty(),
            "No languages available: the runtime supports none of the enabled languages"
        );

        let current = match config.default_language.as_deref() {
            Some(id) => table.index_of(id).unwrap_or_else(|| {
                tracing::warn!(language = id, "Default language not available, using the first one");
                0
            }),
            None => 0,
        };

        let id = Uuid::new_v4();
        let input = Arc::new(LineChannel::with_capacity(config.input_queue_capacity()));
        let buffer = TerminalBuffer::with_capacity(input.clone(), config.scrollback_chars());
        let sinks = StreamSinks::new();
        let cancel = CancelToken::new();
        let control = ControlHandle::new(buffer.clone(), cancel.clone());

        for spec in table.iter() {
            evaluator
                .bind(spec, &control)
                .with_context(|| format!("Failed to bind session commands for {}", spec.id))?;
        }

        if config.banner {
            let languages: Vec<&str> = table.ids().collect();
            buffer.append_output(&format!(
                "replterm {}\nLanguages: {}\n\n",
                env!("CARGO_PKG_VERSION"),
                languages.join(", ")
            ));
        }

        let shared = Arc::new(Shared {
            id,
            input: input.clone(),
            io: EvalIo::new(&sinks, input, control.clone()),
            evaluator,
            languages: table,
            current: AtomicUsize::new(current),
            busy: AtomicBool::new(false),
            cancel,
        });
        let session = Self {
            aggregator: StreamAggregator::new(sinks.clone(), buffer.clone()),
            shared,
            buffer,
            sinks,
            control,
            closed: AtomicBool::new(false),
        };

        session.aggregator.start(config.tick_interval())?;
        session.spawn(Job::Init)?;
        tracing::info!(
            session = %session.id(),
            language = session.shared.current_language(),
            "Session started"
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn buffer(&self) -> &TerminalBuffer {
        &self.buffer
    }

    pub fn sinks(&self) -> &StreamSinks {
        &self.sinks
    }

    pub fn input(&self) -> &Arc<LineChannel> {
        &self.shared.input
    }

    pub fn languages(&self) -> &LanguageTable {
        &self.shared.languages
    }

    pub fn current_language(&self) -> String {
        self.shared.current_language().to_string()
    }

    /// True while a job (init, prompt line or script) is running.
    pub fn is_running(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// True while the running program waits for an input line.
    pub fn is_input_blocked(&self) -> bool {
        self.shared.input.is_blocked()
    }

    /// Set once a program called the `exit`/`quit` binding.
    pub fn exit_requested(&self) -> bool {
        self.control.exit_requested()
    }

    /// Dispatch a widget event. Call from the UI thread.
    pub fn handle_event(
        &self,
        event: TerminalEvent,
        widget: &mut dyn TextWidget,
    ) -> anyhow::Result<()> {
        match event {
            TerminalEvent::TextChanged { text, caret } => {
                if self.buffer.reconcile_edit(&text, caret) == EditOutcome::Rejected {
                    self.buffer.refresh_display(widget);
                }
            }
            TerminalEvent::Enter => self.submit_input(widget)?,
            TerminalEvent::HistoryOlder => {
                self.buffer.navigate_history(HistoryDirection::Older);
                self.buffer.refresh_display(widget);
            }
            TerminalEvent::HistoryNewer => {
                self.buffer.navigate_history(HistoryDirection::Newer);
                self.buffer.refresh_display(widget);
            }
            TerminalEvent::FocusGained | TerminalEvent::FocusLost => {
                self.buffer.clamp_caret(widget);
            }
        }
        Ok(())
    }

    /// Commit the live line.
    ///
    /// When idle the line starts a new prompt evaluation; when the running
    /// program waits for input the line is handed to it. Otherwise the line
    /// stays where it is.
    pub fn submit_input(&self, widget: &mut dyn TextWidget) -> anyhow::Result<()> {
        self.aggregator.tick();
        let running = self.is_running();
        if !running || self.is_input_blocked() {
            self.shared.input.try_flush();
            let line = self.buffer.commit_line();
            tracing::trace!(session = %self.id(), chars = line.chars().count(), "Line submitted");
            if !running {
                self.spawn(Job::ReadEvalPrint)?;
            }
        }
        self.aggregator.tick();
        self.buffer.refresh_display(widget);
        Ok(())
    }

    /// Clear the terminal and run `source` as a whole program.
    ///
    /// Returns `false` without doing anything while another job runs.
    pub fn run_code(&self, source: &str) -> anyhow::Result<bool> {
        if !self.claim() {
            return Ok(false);
        }
        self.buffer.clear();
        self.spawn_claimed(Job::Script(source.to_string()))?;
        Ok(true)
    }

    /// Switch to the next language and show its prompt.
    ///
    /// Returns `false` while a job runs.
    pub fn switch_language(&self) -> bool {
        if !self.claim() {
            return false;
        }
        let next = self
            .shared
            .languages
            .next_index(self.shared.current.load(Ordering::Acquire));
        self.shared.current.store(next, Ordering::Release);
        self.shared
            .io
            .output
            .write_str(settings::constants::LINE_SEPARATOR);
        self.shared.show_prompt();
        self.shared.busy.store(false, Ordering::Release);

        tracing::debug!(session = %self.id(), language = self.shared.current_language(), "Language switched");
        self.aggregator.tick();
        true
    }

    /// UI timer hook: push pending changes to the widget.
    pub fn poll(&self, widget: &mut dyn TextWidget) -> bool {
        if !self.buffer.take_refresh_requested() && !self.buffer.is_dirty() {
            return false;
        }
        self.buffer.refresh_display(widget)
    }

    /// Drain the output sinks now instead of waiting for the next tick.
    pub fn tick(&self) -> bool {
        self.aggregator.tick()
    }

    /// End the session: cancel the running program, end its input, then
    /// stop output aggregation. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.cancel.cancel();
        self.shared.input.try_flush();
        self.shared.input.close();
        self.aggregator.stop();
        tracing::info!(session = %self.id(), "Session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn claim(&self) -> bool {
        !self.is_closed()
            && self
                .shared
                .busy
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    fn spawn(&self, job: Job) -> anyhow::Result<()> {
        if !self.claim() {
            tracing::debug!(session = %self.id(), ?job, "Session busy, job not started");
            return Ok(());
        }
        self.spawn_claimed(job)
    }

    /// Start `job` on its own thread. The caller holds the busy flag.
    fn spawn_claimed(&self, job: Job) -> anyhow::Result<()> {
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("replterm-eval".into())
            .spawn(move || shared.run(job));
        if let Err(error) = spawned {
            self.shared.busy.store(false, Ordering::Release);
            return Err(error).context("Failed to spawn evaluation thread");
        }
        Ok(())
    }
}

impl Drop for ReplSession {
    fn drop(&mut self) {
        self.close();
    }
}
