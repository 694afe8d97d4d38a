//! Centralized configuration constants for replterm.
//!
//! Compile-time defaults and bounds, organized by the component that owns them.

/// Line terminator written after every committed line.
pub const LINE_SEPARATOR: &str = "\n";

/// Committed-text window of the terminal buffer.
pub mod scrollback {
    /// Default number of trailing characters of committed text kept on screen.
    /// Older output is dropped silently.
    pub const DEFAULT_CHARS: usize = 1000;
    /// Smallest accepted window.
    pub const MIN_CHARS: usize = 80;
    /// Largest accepted window.
    pub const MAX_CHARS: usize = 1_000_000;
}

/// Output stream draining.
pub mod streams {
    use std::time::Duration;

    /// Period of the aggregator tick.
    pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
    /// Fastest allowed tick.
    pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);
    /// Slowest allowed tick.
    pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(5);

    /// Prefix for chunks drained from the error sink.
    pub const ERROR_PREFIX: &str = "err> ";
    /// Prefix for chunks drained from the log sink.
    pub const LOG_PREFIX: &str = "log> ";
}

/// Interactive input hand-off.
pub mod input {
    /// Lines buffered for a program that has not asked for input yet.
    pub const QUEUE_CAPACITY: usize = 8;
    /// Upper bound for a configured queue.
    pub const MAX_QUEUE_CAPACITY: usize = 256;
}

/// Prompt strings.
pub mod prompt {
    /// Appended to the language id: `js> `.
    pub const SUFFIX: &str = "> ";
    /// Shown while an incomplete statement waits for more lines.
    pub const CONTINUATION: &str = "... ";
}

/// Settings file validation limits.
pub mod settings {
    /// Maximum settings file size in bytes (64 KB).
    /// Settings files should be tiny; anything larger is suspicious.
    pub const MAX_FILE_SIZE: u64 = 64 * 1024;
}
