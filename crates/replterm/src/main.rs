//! replterm - a line-mode terminal for embedded language runtimes
//!
//! Main entry point: sets up logging and config, then drives one session
//! from standard input.

mod driver;

use anyhow::{Context, Result};
use evaluator::{EchoEvaluator, LanguageTable};
use once_cell::sync::Lazy;
use replterm_session::ReplSession;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Application startup time for performance monitoring
static STARTUP_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Make sure the config directory and a default config file exist.
fn init_paths() -> Result<()> {
    let config_file = settings::ensure_config_file().context("Could not prepare config file")?;
    debug!(
        "Initialized paths - config dir: {:?}, config file: {:?}",
        replterm_paths::config_dir(),
        config_file
    );
    Ok(())
}

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("REPLTERM_DEBUG").is_ok()
}

/// Initialize the logging system. Logs go to stderr; stdout is the terminal.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if is_debug_mode() {
        "replterm=trace,terminal=debug,replterm_session=debug,info"
    } else {
        "replterm=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();

    if is_debug_mode() {
        info!(
            "replterm v{} starting up (DEBUG MODE ENABLED)",
            env!("CARGO_PKG_VERSION")
        );
        info!("Set RUST_LOG for custom log levels, e.g. RUST_LOG=terminal=trace");
    } else {
        debug!("replterm v{} starting up", env!("CARGO_PKG_VERSION"));
    }
}

/// Languages this build can run.
fn language_table() -> LanguageTable {
    let mut table = LanguageTable::polyglot();
    table.insert(EchoEvaluator::language_spec());
    table
}

fn main() -> Result<()> {
    let _ = *STARTUP_TIME;

    init_logging();

    if let Err(e) = init_paths() {
        error!("Failed to initialize paths: {:#}", e);
    }

    let config = settings::load_config();
    let session = ReplSession::new(&config, language_table(), Arc::new(EchoEvaluator::new()))
        .context("Failed to start session")?;
    info!(
        session = %session.id(),
        "Session ready in {:?}",
        STARTUP_TIME.elapsed()
    );

    let result = driver::run(&session, config.tick_interval());
    session.close();
    result
}
