//! Output sinks written by a running program and drained by the aggregator.

use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;

use settings::constants::streams::{ERROR_PREFIX, LOG_PREFIX};

/// Which program stream a sink collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Output,
    Log,
    Error,
}

impl SinkKind {
    /// Prefix shown before each drained chunk. Plain output has none.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Output => None,
            Self::Log => Some(LOG_PREFIX),
            Self::Error => Some(ERROR_PREFIX),
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Error => 0,
            Self::Log => 1,
            Self::Output => 2,
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output => write!(f, "stdout"),
            Self::Log => write!(f, "log"),
            Self::Error => write!(f, "stderr"),
        }
    }
}

/// Append-only byte buffer shared between writers and a single drainer.
///
/// Every write and every drain takes the same lock, so a drain observes
/// whole writes only.
#[derive(Debug)]
pub struct StreamSink {
    kind: SinkKind,
    buffer: Mutex<Vec<u8>>,
}

impl StreamSink {
    pub fn new(kind: SinkKind) -> Self {
        Self {
            kind,
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    pub fn write_bytes(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.buffer.lock().extend_from_slice(bytes);
    }

    pub fn write_str(&self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Write `text` followed by the line separator as one chunk.
    pub fn write_line(&self, text: &str) {
        let mut buffer = self.buffer.lock();
        buffer.extend_from_slice(text.as_bytes());
        buffer.extend_from_slice(settings::constants::LINE_SEPARATOR.as_bytes());
    }

    /// Take everything written since the last drain, leaving the sink empty.
    pub fn drain(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }
}

impl io::Write for &StreamSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Cloneable `io::Write` handle onto a shared sink, for program code.
#[derive(Debug, Clone)]
pub struct SinkWriter {
    sink: Arc<StreamSink>,
}

impl SinkWriter {
    pub fn new(sink: Arc<StreamSink>) -> Self {
        Self { sink }
    }

    pub fn kind(&self) -> SinkKind {
        self.sink.kind()
    }

    pub fn write_str(&self, text: &str) {
        self.sink.write_str(text);
    }

    pub fn write_line(&self, text: &str) {
        self.sink.write_line(text);
    }
}

impl io::Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The three program streams of one terminal session.
#[derive(Debug, Clone)]
pub struct StreamSinks {
    pub output: Arc<StreamSink>,
    pub log: Arc<StreamSink>,
    pub error: Arc<StreamSink>,
}

impl Default for StreamSinks {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSinks {
    pub fn new() -> Self {
        Self {
            output: Arc::new(StreamSink::new(SinkKind::Output)),
            log: Arc::new(StreamSink::new(SinkKind::Log)),
            error: Arc::new(StreamSink::new(SinkKind::Error)),
        }
    }

    pub fn get(&self, kind: SinkKind) -> &Arc<StreamSink> {
        match kind {
            SinkKind::Output => &self.output,
            SinkKind::Log => &self.log,
            SinkKind::Error => &self.error,
        }
    }

    pub fn writer(&self, kind: SinkKind) -> SinkWriter {
        SinkWriter::new(self.get(kind).clone())
    }

    /// Sinks in the order they are drained: diagnostics before plain output.
    pub fn drain_order(&self) -> [&Arc<StreamSink>; 3] {
        [&self.error, &self.log, &self.output]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::thread;
    use test_case::test_case;

    #[test_case(SinkKind::Output, None ; "output has no prefix")]
    #[test_case(SinkKind::Log, Some("log> ") ; "log prefix")]
    #[test_case(SinkKind::Error, Some("err> ") ; "error prefix")]
    fn prefixes(kind: SinkKind, expected: Option<&str>) {
        assert_eq!(kind.prefix(), expected);
    }

    #[test]
    fn drain_takes_everything_and_resets() {
        let sink = StreamSink::new(SinkKind::Output);
        sink.write_str("4");
        sink.write_line("2");
        assert_eq!(sink.drain(), b"42\n".to_vec());
        assert!(sink.is_empty());
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn io_write_appends() {
        let sink = Arc::new(StreamSink::new(SinkKind::Log));
        let mut writer = SinkWriter::new(sink.clone());
        write!(writer, "{} + {}", 1, 2).unwrap();
        writeln!(&*sink, " = 3").unwrap();
        assert_eq!(sink.drain(), b"1 + 2 = 3\n".to_vec());
    }

    #[test]
    fn drain_order_is_error_log_output() {
        let sinks = StreamSinks::new();
        let kinds: Vec<SinkKind> = sinks.drain_order().iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec![SinkKind::Error, SinkKind::Log, SinkKind::Output]);
        for kind in kinds {
            assert_eq!(sinks.drain_order()[kind.index()].kind(), kind);
        }
    }

    #[test]
    fn concurrent_writes_are_never_torn() {
        let sink = Arc::new(StreamSink::new(SinkKind::Output));
        let writers: Vec<_> = (0..4)
            .map(|id| {
                let sink = sink.clone();
                thread::spawn(move || {
                    let chunk = format!("[{id}{id}{id}{id}]");
                    for _ in 0..250 {
                        sink.write_str(&chunk);
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for writer in writers {
            drained.extend(sink.drain());
            writer.join().expect("writer thread panicked");
        }
        drained.extend(sink.drain());

        let text = String::from_utf8(drained).unwrap();
        assert_eq!(text.len(), 4 * 250 * 6);
        for chunk in text.as_bytes().chunks(6) {
            assert_eq!(chunk[0], b'[');
            assert_eq!(chunk[5], b']');
            assert!(chunk[1..5].iter().all(|b| *b == chunk[1]));
        }
    }
}
