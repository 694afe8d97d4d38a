//! Drives a session from standard input and mirrors its display to stdout.
//!
//! Plain lines are typed into the live line and submitted. Lines starting
//! with `:` are front-end commands standing in for the GUI's keys and buttons.

use anyhow::{Context, Result};
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use replterm_session::{ReplSession, TerminalEvent};
use terminal::{MemoryWidget, TextWidget};

/// A line read from stdin, decoded into what the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command<'a> {
    /// Type this text and press Enter.
    Line(&'a str),
    /// `:up`
    Older,
    /// `:down`
    Newer,
    /// `:lang`
    SwitchLanguage,
    /// `:run <code>`, with `\n` escapes for line breaks.
    Run(&'a str),
    /// `:clear`
    Clear,
    /// `:quit`
    Quit,
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.trim_end() {
            ":up" => Self::Older,
            ":down" => Self::Newer,
            ":lang" => Self::SwitchLanguage,
            ":clear" => Self::Clear,
            ":quit" => Self::Quit,
            other => match other.strip_prefix(":run ") {
                Some(code) => Self::Run(code),
                None => Self::Line(line),
            },
        }
    }
}

/// What has been written to stdout so far.
struct Screen<W: Write> {
    out: W,
    shown: String,
    /// The tty already echoed what the user typed.
    input_echoed: bool,
}

impl<W: Write> Screen<W> {
    fn show(&mut self, display: &str) -> io::Result<()> {
        let unseen = unseen_suffix(&self.shown, display);
        if !unseen.is_empty() {
            self.out.write_all(unseen.as_bytes())?;
            self.out.flush()?;
        }
        self.shown.clear();
        self.shown.push_str(display);
        Ok(())
    }

    /// Account for text the tty put on screen by itself.
    fn typed(&mut self, text: &str, committed: bool) {
        if self.input_echoed {
            self.shown.push_str(text);
            if committed {
                self.shown.push_str(settings::constants::LINE_SEPARATOR);
            }
        }
    }
}

/// The part of `display` not on screen yet, given that `shown` is.
///
/// Handles the display scrolling: when old text was dropped from the front,
/// the tail of `shown` reappears at the start of `display`. Anything else
/// (a cleared terminal) prints `display` in full.
pub(crate) fn unseen_suffix<'a>(shown: &str, display: &'a str) -> &'a str {
    if let Some(rest) = display.strip_prefix(shown) {
        return rest;
    }
    shown
        .char_indices()
        .skip(1)
        .find_map(|(index, _)| display.strip_prefix(&shown[index..]))
        .unwrap_or(display)
}

fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (lines, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("replterm-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if lines.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader thread")?;
    Ok(receiver)
}

/// Run until `:quit`, an `exit` binding, or end of stdin.
pub fn run(session: &ReplSession, tick: Duration) -> Result<()> {
    let lines = spawn_stdin_reader()?;
    let mut widget = MemoryWidget::new();
    let mut screen = Screen {
        out: io::stdout(),
        shown: String::new(),
        input_echoed: io::stdin().is_terminal(),
    };
    let mut stdin_closed = false;

    loop {
        match lines.recv_timeout(tick) {
            Ok(line) => {
                session.tick();
                session.poll(&mut widget);
                screen.show(&widget.text())?;
                if !dispatch(session, &mut widget, &mut screen, Command::parse(&line))? {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if !stdin_closed {
                    tracing::debug!("End of stdin, waiting for the session to finish");
                    stdin_closed = true;
                    session.input().close();
                }
                thread::sleep(tick);
            }
        }

        session.poll(&mut widget);
        screen.show(&widget.text())?;

        if session.exit_requested() || (stdin_closed && !session.is_running()) {
            session.tick();
            session.poll(&mut widget);
            screen.show(&widget.text())?;
            break;
        }
    }

    if !screen.shown.ends_with('\n') {
        writeln!(screen.out)?;
    }
    Ok(())
}

/// Apply one command. Returns `false` when the driver should stop.
fn dispatch<W: Write>(
    session: &ReplSession,
    widget: &mut MemoryWidget,
    screen: &mut Screen<W>,
    command: Command<'_>,
) -> Result<bool> {
    match command {
        Command::Line(text) => {
            widget.set_caret(usize::MAX);
            widget.insert_at_caret(text);
            session.handle_event(TerminalEvent::text_changed(widget.text(), widget.caret()), widget)?;
            session.handle_event(TerminalEvent::Enter, widget)?;
            screen.typed(text, session.buffer().live_line().is_empty());
        }
        Command::Older => session.handle_event(TerminalEvent::HistoryOlder, widget)?,
        Command::Newer => session.handle_event(TerminalEvent::HistoryNewer, widget)?,
        Command::SwitchLanguage => {
            if !session.switch_language() {
                tracing::info!("Busy, language not switched");
            }
        }
        Command::Run(code) => {
            if !session.run_code(&code.replace("\\n", "\n"))? {
                tracing::info!("Busy, code not run");
            }
        }
        Command::Clear => session.buffer().clear(),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}
