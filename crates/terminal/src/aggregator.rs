//! Periodic drain of the program's output sinks into the terminal buffer.
//!
//! Runs on a dedicated OS thread at a fixed rate so output keeps flowing
//! whether or not an evaluation is in progress. The UI learns about new
//! content through the buffer's refresh-requested flag, which it polls.

use anyhow::Context;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::buffer::TerminalBuffer;
use crate::sink::{SinkKind, StreamSinks};

/// Longest incomplete UTF-8 tail held back between ticks.
const MAX_CARRY: usize = 3;

struct Shared {
    sinks: StreamSinks,
    buffer: TerminalBuffer,
    /// Undecoded tail bytes per sink, indexed by `SinkKind::index`. The lock
    /// also serializes ticks.
    carry: Mutex<[Vec<u8>; 3]>,
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Moves sink content into a [`TerminalBuffer`], prefixed per stream.
///
/// [`tick`](Self::tick) can be called directly; [`start`](Self::start) runs
/// it on a background schedule until [`stop`](Self::stop) or drop.
pub struct StreamAggregator {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl StreamAggregator {
    pub fn new(sinks: StreamSinks, buffer: TerminalBuffer) -> Self {
        Self {
            shared: Arc::new(Shared {
                sinks,
                buffer,
                carry: Mutex::new(Default::default()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn sinks(&self) -> &StreamSinks {
        &self.shared.sinks
    }

    /// Drain error, log and output sinks (in that order) into the buffer.
    ///
    /// Returns whether anything was appended; if so a display refresh has
    /// been requested.
    pub fn tick(&self) -> bool {
        self.shared.tick()
    }

    /// Start ticking every `interval` on a background thread.
    ///
    /// Calling this while already running is a no-op.
    pub fn start(&self, interval: Duration) -> anyhow::Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (shutdown, shutdown_rx) = mpsc::channel();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("replterm-stream-aggregator".into())
            .spawn(move || aggregator_loop(shared, interval, shutdown_rx))
            .context("Failed to spawn stream aggregator thread")?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Stream aggregator started");
        *worker = Some(Worker { shutdown, handle });
        Ok(())
    }

    /// Stop the background schedule and wait for the thread to exit.
    ///
    /// An in-flight tick completes first. Safe to call repeatedly.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.shutdown.send(());
        if worker.handle.join().is_err() {
            tracing::error!("Stream aggregator thread panicked");
        }
        tracing::debug!("Stream aggregator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for StreamAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn tick(&self) -> bool {
        self.drain(false)
    }

    /// Drain every sink. On the `last` drain nothing is held back: a
    /// trailing partial character is decoded with replacement characters.
    fn drain(&self, last: bool) -> bool {
        let mut carry = self.carry.lock();
        let mut appended = false;

        for sink in self.sinks.drain_order() {
            let kind = sink.kind();
            let drained = sink.drain();
            let pending = &mut carry[kind.index()];
            if drained.is_empty() && pending.is_empty() {
                continue;
            }

            // A held-back lead byte only continues into continuation bytes.
            if !pending.is_empty() && drained.first().is_some_and(|b| !is_continuation(*b)) {
                tracing::warn!(stream = %kind, bytes = pending.len(), "Dropping unfinished character");
                pending.clear();
            }

            pending.extend_from_slice(&drained);
            let text = if last {
                decode_lossy(std::mem::take(pending), kind)
            } else {
                match decode_chunk(pending) {
                    Some(text) => text,
                    None => {
                        tracing::warn!(stream = %kind, "Dropping undecodable output chunk");
                        continue;
                    }
                }
            };
            if text.is_empty() {
                continue;
            }

            match kind.prefix() {
                Some(prefix) => self.buffer.append_output(&format!("{prefix}{text}")),
                None => self.buffer.append_output(&text),
            }
            appended = true;
        }

        if appended {
            self.buffer.request_refresh();
        }
        appended
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

fn decode_lossy(bytes: Vec<u8>, kind: SinkKind) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(stream = %kind, "Replacing undecodable bytes in final output");
            String::from_utf8_lossy(error.as_bytes()).into_owned()
        }
    }
}

/// Decode `pending`, leaving an incomplete trailing sequence in place.
///
/// Returns `None` (and clears `pending`) when the complete part is not valid
/// UTF-8.
fn decode_chunk(pending: &mut Vec<u8>) -> Option<String> {
    let split = pending.len() - incomplete_tail_len(pending);
    let tail = pending.split_off(split);
    let head = std::mem::replace(pending, tail);
    String::from_utf8(head).ok()
}

/// Length of a truncated multi-byte sequence at the end of `bytes`, if any.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=MAX_CARRY.min(bytes.len()) {
        let byte = bytes[bytes.len() - back];
        if is_continuation(byte) {
            // Keep looking for the lead byte.
            continue;
        }
        let needed = match byte {
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

fn aggregator_loop(shared: Arc<Shared>, interval: Duration, shutdown: mpsc::Receiver<()>) {
    let mut next_tick = Instant::now() + interval;
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match shutdown.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if catch_unwind(AssertUnwindSafe(|| shared.tick())).is_err() {
            tracing::error!("Stream aggregator tick panicked, continuing");
        }

        // Fixed rate; skip missed ticks instead of bursting to catch up.
        next_tick += interval;
        let now = Instant::now();
        if next_tick < now {
            next_tick = now + interval;
        }
    }
    // Output written just before shutdown still reaches the buffer.
    if catch_unwind(AssertUnwindSafe(|| shared.drain(true))).is_err() {
        tracing::error!("Stream aggregator final tick panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_channel::LineChannel;
    use pretty_assertions::assert_eq;
    use test_case::test_case;
    use tracing_test::traced_test;

    fn aggregator() -> (StreamAggregator, TerminalBuffer) {
        let buffer = TerminalBuffer::new(Arc::new(LineChannel::new()));
        (StreamAggregator::new(StreamSinks::new(), buffer.clone()), buffer)
    }

    fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn output_is_appended_without_prefix() {
        let (aggregator, buffer) = aggregator();
        aggregator.sinks().output.write_str("4");
        buffer.take_refresh_requested();

        assert!(aggregator.tick());
        assert_eq!(buffer.committed_text(), "4");
        assert!(buffer.take_refresh_requested());
        assert!(aggregator.sinks().output.is_empty());
    }

    #[test]
    fn error_output_is_prefixed() {
        let (aggregator, buffer) = aggregator();
        aggregator.sinks().error.write_str("boom");
        aggregator.tick();
        assert!(buffer.committed_text().ends_with("err> boom"));
    }

    #[test]
    fn streams_are_drained_error_then_log_then_output() {
        let (aggregator, buffer) = aggregator();
        let sinks = aggregator.sinks();
        sinks.output.write_line("out");
        sinks.log.write_line("note");
        sinks.error.write_line("bad");

        aggregator.tick();
        assert_eq!(buffer.committed_text(), "err> bad\nlog> note\nout\n");
    }

    #[test]
    fn empty_tick_appends_nothing() {
        let (aggregator, buffer) = aggregator();
        buffer.take_refresh_requested();
        assert!(!aggregator.tick());
        assert_eq!(buffer.committed_text(), "");
        assert!(!buffer.take_refresh_requested());
        assert!(!buffer.is_dirty());
    }

    #[test]
    fn each_chunk_is_prefixed_once() {
        let (aggregator, buffer) = aggregator();
        aggregator.sinks().log.write_str("a\nb\n");
        aggregator.tick();
        assert_eq!(buffer.committed_text(), "log> a\nb\n");
    }

    #[test]
    fn split_multibyte_character_waits_for_next_tick() {
        let (aggregator, buffer) = aggregator();
        let bytes = "héllo".as_bytes();
        aggregator.sinks().output.write_bytes(&bytes[..2]);

        aggregator.tick();
        assert_eq!(buffer.committed_text(), "h");

        aggregator.sinks().output.write_bytes(&bytes[2..]);
        aggregator.tick();
        assert_eq!(buffer.committed_text(), "héllo");
    }

    #[test]
    #[traced_test]
    fn invalid_chunk_is_dropped_and_draining_continues() {
        let (aggregator, buffer) = aggregator();
        aggregator.sinks().error.write_bytes(&[0xff, 0xfe, b'x']);
        aggregator.sinks().output.write_str("fine");

        assert!(aggregator.tick());
        assert_eq!(buffer.committed_text(), "fine");
        assert!(logs_contain("Dropping undecodable output chunk"));

        aggregator.sinks().error.write_str("next");
        aggregator.tick();
        assert_eq!(buffer.committed_text(), "fineerr> next");
    }

    #[test]
    #[traced_test]
    fn unfinished_character_does_not_swallow_next_output() {
        let (aggregator, buffer) = aggregator();
        aggregator.sinks().output.write_bytes(b"ok\xc3");
        aggregator.tick();
        assert_eq!(buffer.committed_text(), "ok");

        aggregator.sinks().output.write_str("next line of real output\n");
        aggregator.tick();
        assert_eq!(buffer.committed_text(), "oknext line of real output\n");
        assert!(logs_contain("Dropping unfinished character"));
    }

    #[test]
    fn stop_replaces_unfinished_character() {
        let (aggregator, buffer) = aggregator();
        aggregator.start(Duration::from_secs(5)).unwrap();
        aggregator.sinks().error.write_bytes(b"bad \xe2\x82");
        aggregator.stop();

        assert_eq!(buffer.committed_text(), "err> bad \u{FFFD}");
    }

    #[test]
    #[traced_test]
    fn last_drain_flushes_held_back_bytes() {
        let (aggregator, buffer) = aggregator();
        aggregator.sinks().log.write_bytes(b"tail \xf0\x9f");
        aggregator.tick();
        assert_eq!(buffer.committed_text(), "log> tail ");

        assert!(aggregator.shared.drain(true));
        assert_eq!(buffer.committed_text(), "log> tail log> \u{FFFD}");
        assert!(logs_contain("Replacing undecodable bytes in final output"));
    }

    #[test_case(b"abc", 0 ; "ascii")]
    #[test_case(b"a\xc3", 1 ; "two byte lead")]
    #[test_case(b"\xe2\x82", 2 ; "three byte partial")]
    #[test_case(b"\xe2\x82\xac", 0 ; "three byte complete")]
    #[test_case(b"\xf0\x9f\x98", 3 ; "four byte partial")]
    #[test_case(b"", 0 ; "empty")]
    fn incomplete_tail_detection(bytes: &[u8], expected: usize) {
        assert_eq!(incomplete_tail_len(bytes), expected);
    }

    #[test]
    fn background_schedule_drains_sinks() {
        let (aggregator, buffer) = aggregator();
        aggregator.start(Duration::from_millis(10)).unwrap();
        assert!(aggregator.is_running());

        aggregator.sinks().output.write_str("4");
        wait_until("output to reach the buffer", || buffer.committed_text() == "4");

        aggregator.stop();
        assert!(!aggregator.is_running());
    }

    #[test]
    fn stop_flushes_remaining_output() {
        let (aggregator, buffer) = aggregator();
        aggregator.start(Duration::from_secs(5)).unwrap();
        aggregator.sinks().error.write_str("late");
        aggregator.stop();
        assert_eq!(buffer.committed_text(), "err> late");
    }

    #[test]
    fn start_twice_and_stop_twice_are_harmless() {
        let (aggregator, _buffer) = aggregator();
        aggregator.start(Duration::from_millis(10)).unwrap();
        aggregator.start(Duration::from_millis(10)).unwrap();
        aggregator.stop();
        aggregator.stop();
        assert!(!aggregator.is_running());
    }

    #[test]
    fn concurrent_ticks_never_duplicate_output() {
        let (aggregator, buffer) = aggregator();
        let aggregator = Arc::new(aggregator);
        let tickers: Vec<_> = (0..4)
            .map(|_| {
                let aggregator = aggregator.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        aggregator.tick();
                    }
                })
            })
            .collect();

        for i in 0..100 {
            aggregator.sinks().output.write_str(&format!("{},", i % 10));
        }
        for ticker in tickers {
            ticker.join().expect("ticker thread panicked");
        }
        aggregator.tick();

        assert_eq!(buffer.committed_text().matches(',').count(), 100);
    }
}
