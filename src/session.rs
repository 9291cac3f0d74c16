//! Execution session lifecycle.
//!
//! [`SessionController`] owns the single session state. It is driven by user
//! actions (`run`, `cancel`, `submit_input`) and by output events in arrival
//! order, and it never blocks: every transition either sends one message or
//! reacts to one event.

use console_protocol::{is_traceback, Outbox, OutboundMessage, OutputEvent, TransportError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ConsoleConfig;
use crate::input_prompt::InputPrompt;
use crate::output::{Fragment, OutputSink};

pub const RUN_LABEL_IDLE: &str = "Run Code";
pub const RUN_LABEL_BUSY: &str = "Running...";

const DETACHED_AFTER_RECONNECT: &str =
    "Connection restored. The previous run may have ended on the server; cancel to reset.";
const DETACHED_AFTER_GIVE_UP: &str =
    "Connection lost. The run's outcome is unknown; cancel to reset.";
const RESET_WITHOUT_SERVER: &str = "Server unreachable. Session reset locally.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    AwaitingInput,
    /// Live session whose server-side process may be gone after a connection loss.
    Detached,
}

impl SessionState {
    #[must_use]
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// What the run and cancel controls should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub run_enabled: bool,
    pub cancel_enabled: bool,
    pub run_label: &'static str,
}

impl Affordances {
    #[must_use]
    pub fn for_state(state: SessionState) -> Self {
        let live = state.is_live();
        Self {
            run_enabled: !live,
            cancel_enabled: live,
            run_label: if live { RUN_LABEL_BUSY } else { RUN_LABEL_IDLE },
        }
    }
}

/// Last runtime traceback together with the code that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpRequest {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Code exceeds maximum length limit")]
    TooLong { length: usize, limit: usize },

    #[error("Forbidden operations detected")]
    ForbiddenPattern { pattern: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("an execution session is already active")]
    AlreadyRunning,

    #[error("no input prompt is pending")]
    NoPendingInput,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Nothing was running; nothing was sent.
    NotRunning,
    /// `cancel_execution` was sent; the session ends when the server answers.
    Requested,
    /// The transport is gone, so a detached session was reset without the server.
    ResetLocally,
}

/// Side effects of one output event beyond what reached the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputOutcome {
    pub ended_session: bool,
    pub latched_help: bool,
}

#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
    prompt: Option<InputPrompt>,
    help: Option<HelpRequest>,
    max_code_length: usize,
    forbidden_patterns: Vec<String>,
}

impl SessionController {
    pub fn new(config: &ConsoleConfig) -> Self {
        Self {
            state: SessionState::Idle,
            prompt: None,
            help: None,
            max_code_length: config.max_code_length,
            forbidden_patterns: config.forbidden_patterns.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn affordances(&self) -> Affordances {
        Affordances::for_state(self.state)
    }

    pub fn pending_prompt(&self) -> Option<&InputPrompt> {
        self.prompt.as_ref()
    }

    /// Latched help context, if a traceback has been seen.
    pub fn help_request(&self) -> Option<&HelpRequest> {
        self.help.as_ref()
    }

    /// Length first, then forbidden substrings (plain, case-sensitive).
    pub fn validate(&self, code: &str) -> Result<(), ValidationError> {
        let length = code.chars().count();
        if length > self.max_code_length {
            return Err(ValidationError::TooLong {
                length,
                limit: self.max_code_length,
            });
        }

        if let Some(pattern) = self
            .forbidden_patterns
            .iter()
            .find(|pattern| code.contains(pattern.as_str()))
        {
            return Err(ValidationError::ForbiddenPattern {
                pattern: pattern.clone(),
            });
        }

        Ok(())
    }

    pub fn run(
        &mut self,
        code: &str,
        outbox: &mut dyn Outbox,
        sink: &mut dyn OutputSink,
    ) -> Result<(), SessionError> {
        if self.state.is_live() {
            return Err(SessionError::AlreadyRunning);
        }
        self.validate(code)?;

        outbox.send(OutboundMessage::Execute {
            code: code.to_string(),
        })?;
        sink.append(Fragment::execution_started());
        sink.scroll_to_end();
        self.transition(SessionState::Running);
        Ok(())
    }

    pub fn cancel(&mut self, outbox: &mut dyn Outbox) -> Result<CancelOutcome, SessionError> {
        if !self.state.is_live() {
            debug!("cancel ignored: no live session");
            return Ok(CancelOutcome::NotRunning);
        }

        match outbox.send(OutboundMessage::CancelExecution) {
            Ok(()) => Ok(CancelOutcome::Requested),
            Err(TransportError::Closed) if self.state == SessionState::Detached => {
                Ok(CancelOutcome::ResetLocally)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Completes a [`CancelOutcome::ResetLocally`] cancel.
    pub fn reset_detached(&mut self, sink: &mut dyn OutputSink) {
        if self.state != SessionState::Detached {
            return;
        }
        sink.append(Fragment::notice(RESET_WITHOUT_SERVER));
        self.finish(sink);
    }

    pub fn submit_input(
        &mut self,
        value: &str,
        outbox: &mut dyn Outbox,
        sink: &mut dyn OutputSink,
    ) -> Result<(), SessionError> {
        let Some(prompt) = self.prompt.as_ref() else {
            return Err(SessionError::NoPendingInput);
        };

        prompt.submit(value, outbox, sink)?;
        self.prompt = None;
        self.transition(SessionState::Running);
        Ok(())
    }

    /// Applies one output event. `code_snapshot` is the editor contents at
    /// arrival time, kept with a traceback for help requests.
    pub fn on_output(
        &mut self,
        event: OutputEvent,
        code_snapshot: &str,
        sink: &mut dyn OutputSink,
    ) -> OutputOutcome {
        let mut outcome = OutputOutcome::default();
        let terminal = event.is_terminal();

        match event {
            OutputEvent::Stdout(text) => sink.append(Fragment::output(text)),
            OutputEvent::Stderr(text) => {
                sink.append(Fragment::error(&text));
                if is_traceback(&text) {
                    self.help = Some(HelpRequest {
                        error: text,
                        code: code_snapshot.to_string(),
                    });
                    outcome.latched_help = true;
                }
            }
            OutputEvent::ExecutionTime(text) => sink.append(Fragment::execution_time(&text)),
            OutputEvent::InputRequest(prompt) => self.on_input_request(&prompt, sink),
        }

        if terminal && self.state.is_live() {
            self.finish(sink);
            outcome.ended_session = true;
        }
        sink.scroll_to_end();
        outcome
    }

    /// The transport came back after a drop.
    pub fn on_connection_resumed(&mut self, sink: &mut dyn OutputSink) {
        self.detach(DETACHED_AFTER_RECONNECT, sink);
    }

    /// The transport stopped reconnecting.
    pub fn on_connection_gave_up(&mut self, sink: &mut dyn OutputSink) {
        self.detach(DETACHED_AFTER_GIVE_UP, sink);
    }

    fn on_input_request(&mut self, prompt: &str, sink: &mut dyn OutputSink) {
        match self.state {
            SessionState::Running => {
                self.prompt = Some(InputPrompt::open(prompt, sink));
                self.transition(SessionState::AwaitingInput);
            }
            SessionState::AwaitingInput => {
                warn!(prompt, "input request while another prompt is pending; rejected");
            }
            SessionState::Idle | SessionState::Detached => {
                warn!(prompt, state = ?self.state, "input request without a running session; rejected");
            }
        }
    }

    fn detach(&mut self, notice: &str, sink: &mut dyn OutputSink) {
        if !self.state.is_live() || self.state == SessionState::Detached {
            return;
        }
        if let Some(prompt) = self.prompt.take() {
            prompt.abandon(sink);
        }
        sink.append(Fragment::notice(notice));
        sink.scroll_to_end();
        self.transition(SessionState::Detached);
    }

    fn finish(&mut self, sink: &mut dyn OutputSink) {
        if let Some(prompt) = self.prompt.take() {
            prompt.abandon(sink);
        }
        self.transition(SessionState::Idle);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "session state changed");
            self.state = next;
        }
    }
}
