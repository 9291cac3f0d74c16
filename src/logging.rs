//! Diagnostic logging through `tracing`.
//!
//! Hosts call [`init`] once at startup. Output goes to stderr, or to the file
//! named by `EXEC_CONSOLE_LOG_FILE` so it does not interleave with the
//! transcript.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV_VAR: &str = "EXEC_CONSOLE_LOG";
pub const LOG_FILE_ENV_VAR: &str = "EXEC_CONSOLE_LOG_FILE";
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs the global subscriber from the environment.
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init() -> io::Result<bool> {
    let filter = std::env::var(LOG_FILTER_ENV_VAR).ok();
    let file = std::env::var(LOG_FILE_ENV_VAR)
        .ok()
        .filter(|path| !path.trim().is_empty());
    init_with(filter.as_deref(), file.as_deref().map(Path::new))
}

pub fn init_with(filter: Option<&str>, file: Option<&Path>) -> io::Result<bool> {
    let filter = env_filter(filter);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .is_ok()
        }
        None => builder.with_writer(io::stderr).try_init().is_ok(),
    };

    Ok(installed)
}

/// Parses a filter directive, falling back to [`DEFAULT_LOG_FILTER`] when the
/// directive is blank or invalid.
pub fn env_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}
