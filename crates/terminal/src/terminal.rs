//! Terminal I/O core.
//!
//! The authoritative display model ([`TerminalBuffer`]), the hand-off of
//! input lines to a running program ([`LineChannel`]), the program's output
//! sinks ([`StreamSinks`]) and the periodic drain between them
//! ([`StreamAggregator`]). The text widget itself stays outside this crate,
//! behind [`TextWidget`].

mod aggregator;
mod buffer;
mod line_channel;
mod sink;
pub mod widget;

pub use aggregator::StreamAggregator;
pub use buffer::{EditOutcome, HistoryDirection, TerminalBuffer};
pub use line_channel::LineChannel;
pub use sink::{SinkKind, SinkWriter, StreamSink, StreamSinks};
pub use widget::{MemoryWidget, TextWidget};
