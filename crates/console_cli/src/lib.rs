//! Line-oriented terminal host for the execution console.
//!
//! Transport selection:
//!
//! - `EXEC_CONSOLE_TRANSPORT=socket` (default) connects to the execution
//!   server at `EXEC_CONSOLE_URL` (default `http://127.0.0.1:5000`)
//! - `EXEC_CONSOLE_TRANSPORT=mock` answers from an in-process mock server
//!
//! Program output goes to stdout; connection, lint and command feedback goes
//! to stderr.

pub mod app;
pub mod commands;
pub mod host;
pub mod sink;
pub mod transports;
