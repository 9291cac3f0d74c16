//! Client core of a remote code-execution console.
//!
//! Invariant: session state alone decides whether a run or a cancel is
//! permitted, and the transcript grows in transport arrival order.
//!
//! # Public API Overview
//! - Drive one execution session with [`SessionController`], or the whole
//!   console (editor buffer, session, completion, lint) with [`Console`].
//! - Render through any [`OutputSink`]; [`Transcript`] keeps it in memory.
//! - Correlate completion requests with [`CompletionBroker`] and debounce lint
//!   requests with [`LintScheduler`].
//! - Run a console over a transport with [`ConsoleRuntime`] and steer it
//!   through a [`ConsoleHandle`].
//!
//! The wire vocabulary and the transport seams live in `console_protocol`,
//! re-exported here as [`protocol`].

pub mod config;
pub mod logging;

pub mod completion;
pub mod console;
pub mod input_prompt;
pub mod lint;
pub mod output;
pub mod runtime;
pub mod session;

pub use console_protocol as protocol;

/// Configuration.
pub use crate::config::{ConfigError, ConsoleConfig};

/// Session lifecycle.
pub use crate::session::{
    Affordances, CancelOutcome, HelpRequest, OutputOutcome, SessionController, SessionError,
    SessionState, ValidationError,
};

/// Completion correlation and suggestion filtering.
pub use crate::completion::{
    filter_suggestions, is_inside_string, CompletionBroker, CompletionError, CompletionItem,
    CompletionKind, CompletionReply, CompletionResult, CompletionTicket, TRIGGER_CHARACTERS,
};

/// Lint debounce.
pub use crate::lint::LintScheduler;

/// Interactive input.
pub use crate::input_prompt::InputPrompt;

/// Transcript rendering.
pub use crate::output::{escape_html, Entry, Fragment, FragmentStyle, OutputSink, Transcript};

/// Console aggregate and its async driver.
pub use crate::console::{Console, ConsoleNotice, Shortcut};
pub use crate::runtime::{ConsoleCommand, ConsoleHandle, ConsoleRuntime, RuntimeClosed};
