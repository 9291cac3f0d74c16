//! The console aggregate: editor buffer, session, completion, lint and the
//! transcript sink, driven by user actions and transport events.

use console_protocol::{
    ConnectionStatus, InboundMessage, LintReport, Outbox, Position, RequestId, TransportError,
    TransportEvent,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::completion::{CompletionBroker, CompletionReply};
use crate::config::ConsoleConfig;
use crate::lint::LintScheduler;
use crate::output::OutputSink;
use crate::session::{
    Affordances, CancelOutcome, HelpRequest, SessionController, SessionError, SessionState,
};

/// Something the host should show outside the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleNotice {
    /// Blocking message for the user, such as a rejected run.
    Alert(String),
    SessionChanged {
        state: SessionState,
        affordances: Affordances,
    },
    Connection(ConnectionStatus),
    Diagnostics(LintReport),
    HelpAvailable(HelpRequest),
}

/// Keyboard shortcuts the console reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Run,
    ClearOutput,
}

impl Shortcut {
    /// Maps a key pressed with or without the primary modifier (Ctrl/Cmd).
    pub fn from_key(key: &str, primary: bool) -> Option<Self> {
        if !primary {
            return None;
        }
        match key {
            "Enter" => Some(Self::Run),
            "l" | "L" => Some(Self::ClearOutput),
            _ => None,
        }
    }
}

pub struct Console<S: OutputSink> {
    code: String,
    session: SessionController,
    completion: CompletionBroker,
    lint: LintScheduler,
    sink: S,
    diagnostics: Option<LintReport>,
    connection: ConnectionStatus,
    notices: Vec<ConsoleNotice>,
}

impl<S: OutputSink> Console<S> {
    pub fn new(config: &ConsoleConfig, sink: S) -> Self {
        Self {
            code: String::new(),
            session: SessionController::new(config),
            completion: CompletionBroker::new(
                config.completion_blacklist.clone(),
                config.completion_timeout,
            ),
            lint: LintScheduler::new(config.lint_debounce),
            sink,
            diagnostics: None,
            connection: ConnectionStatus::Connecting,
            notices: Vec::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn affordances(&self) -> Affordances {
        self.session.affordances()
    }

    pub fn pending_prompt(&self) -> Option<&str> {
        self.session.pending_prompt().map(|prompt| prompt.prompt())
    }

    /// Latest lint report.
    pub fn diagnostics(&self) -> Option<&LintReport> {
        self.diagnostics.as_ref()
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn pending_completion(&self) -> Option<RequestId> {
        self.completion.pending_request()
    }

    /// Replaces the editor contents and schedules a lint.
    pub fn set_editor_code(&mut self, code: impl Into<String>, now: Instant) {
        self.code = code.into();
        self.lint.on_change(&self.code, now);
    }

    pub fn run(&mut self, outbox: &mut dyn Outbox) -> Result<(), SessionError> {
        let before = self.session.state();
        let result = self.session.run(&self.code, outbox, &mut self.sink);
        self.note_session_change(before);
        result
    }

    pub fn cancel(&mut self, outbox: &mut dyn Outbox) -> Result<CancelOutcome, SessionError> {
        let before = self.session.state();
        let outcome = self.session.cancel(outbox)?;
        if outcome == CancelOutcome::ResetLocally {
            self.session.reset_detached(&mut self.sink);
        }
        self.note_session_change(before);
        Ok(outcome)
    }

    /// Empties the transcript. A running session keeps running.
    pub fn clear(&mut self) {
        self.sink.clear();
    }

    pub fn submit_input(
        &mut self,
        value: &str,
        outbox: &mut dyn Outbox,
    ) -> Result<(), SessionError> {
        let before = self.session.state();
        let result = self.session.submit_input(value, outbox, &mut self.sink);
        self.note_session_change(before);
        result
    }

    /// Requests completions at `position` in the current editor contents.
    pub fn request_completion(
        &mut self,
        position: Position,
        now: Instant,
        outbox: &mut dyn Outbox,
        reply: CompletionReply,
    ) -> Result<(), TransportError> {
        self.completion
            .request_into(&self.code, position, now, outbox, reply)
    }

    pub fn handle_shortcut(
        &mut self,
        shortcut: Shortcut,
        outbox: &mut dyn Outbox,
    ) -> Result<(), SessionError> {
        match shortcut {
            Shortcut::Run => self.run(outbox),
            Shortcut::ClearOutput => {
                self.clear();
                Ok(())
            }
        }
    }

    /// Help context for the last traceback, if any.
    pub fn request_help(&self) -> Option<HelpRequest> {
        self.session.help_request().cloned()
    }

    pub fn alert(&mut self, message: impl Into<String>) {
        self.notices.push(ConsoleNotice::Alert(message.into()));
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { resumed } => {
                self.set_connection(ConnectionStatus::Connected);
                if resumed {
                    let before = self.session.state();
                    self.session.on_connection_resumed(&mut self.sink);
                    self.note_session_change(before);
                }
            }
            TransportEvent::Disconnected => {
                self.set_connection(ConnectionStatus::Reconnecting { attempt: 1 });
            }
            TransportEvent::GaveUp => {
                self.set_connection(ConnectionStatus::Disconnected);
                self.completion.close();
                self.lint.cancel();
                let before = self.session.state();
                self.session.on_connection_gave_up(&mut self.sink);
                self.note_session_change(before);
            }
            TransportEvent::Message(message) => self.on_message(message),
        }
    }

    /// Earliest lint or completion deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.lint.deadline(), self.completion.next_deadline()) {
            (Some(lint), Some(completion)) => Some(lint.min(completion)),
            (lint, completion) => lint.or(completion),
        }
    }

    pub fn on_deadline(
        &mut self,
        now: Instant,
        outbox: &mut dyn Outbox,
    ) -> Result<(), TransportError> {
        self.completion.expire(now);
        self.lint.fire_due(now, outbox)?;
        Ok(())
    }

    pub fn take_notices(&mut self) -> Vec<ConsoleNotice> {
        std::mem::take(&mut self.notices)
    }

    fn on_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Output(event) => {
                let before = self.session.state();
                let outcome = self.session.on_output(event, &self.code, &mut self.sink);
                self.note_session_change(before);
                if outcome.latched_help {
                    if let Some(help) = self.session.help_request() {
                        self.notices.push(ConsoleNotice::HelpAvailable(help.clone()));
                    }
                }
            }
            InboundMessage::CompletionResult {
                request_id,
                suggestions,
            } => {
                self.completion.on_result(request_id, suggestions);
            }
            InboundMessage::LintResult(report) => {
                debug!(valid = report.valid, "lint result");
                self.diagnostics = Some(report.clone());
                self.notices.push(ConsoleNotice::Diagnostics(report));
            }
        }
    }

    fn set_connection(&mut self, status: ConnectionStatus) {
        if self.connection == status {
            return;
        }
        match status {
            ConnectionStatus::Disconnected => warn!("connection to execution server lost for good"),
            ConnectionStatus::Reconnecting { .. } => warn!("connection to execution server dropped"),
            _ => info!(status = status.label(), "connection status changed"),
        }
        self.connection = status;
        self.notices.push(ConsoleNotice::Connection(status));
    }

    fn note_session_change(&mut self, before: SessionState) {
        let state = self.session.state();
        if state != before {
            self.notices.push(ConsoleNotice::SessionChanged {
                state,
                affordances: self.session.affordances(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use console_protocol::{OutboundMessage, OutputEvent, RawSuggestion, NO_RUNNING_PROCESS};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::completion::{CompletionError, CompletionTicket};
    use crate::output::Transcript;

    fn console() -> Console<Transcript> {
        Console::new(&ConsoleConfig::default(), Transcript::new())
    }

    fn output(event: OutputEvent) -> TransportEvent {
        TransportEvent::Message(InboundMessage::Output(event))
    }

    #[test]
    fn shortcuts_require_primary_modifier() {
        assert_eq!(Shortcut::from_key("Enter", true), Some(Shortcut::Run));
        assert_eq!(Shortcut::from_key("l", true), Some(Shortcut::ClearOutput));
        assert_eq!(Shortcut::from_key("Enter", false), None);
        assert_eq!(Shortcut::from_key("k", true), None);
    }

    #[test]
    fn run_uses_editor_contents_and_reports_state_change() {
        let mut console = console();
        let mut outbox: Vec<OutboundMessage> = Vec::new();
        console.set_editor_code("print(\"hi\")", Instant::now());

        console
            .handle_shortcut(Shortcut::Run, &mut outbox)
            .expect("valid code runs");

        assert_eq!(
            outbox,
            vec![OutboundMessage::Execute {
                code: "print(\"hi\")".to_string()
            }]
        );
        assert_eq!(
            console.take_notices(),
            vec![ConsoleNotice::SessionChanged {
                state: SessionState::Running,
                affordances: Affordances::for_state(SessionState::Running),
            }]
        );
        assert!(console.take_notices().is_empty());
    }

    #[test]
    fn traceback_snapshot_uses_code_at_arrival_time() {
        let mut console = console();
        let mut outbox: Vec<OutboundMessage> = Vec::new();
        console.set_editor_code("print(x)", Instant::now());
        console.run(&mut outbox).expect("valid code runs");
        console.set_editor_code("print(y)", Instant::now());
        console.take_notices();

        console.on_transport_event(output(OutputEvent::Stderr(
            "Traceback (most recent call last):\nNameError".to_string(),
        )));

        let help = console.request_help().expect("help latched");
        assert_eq!(help.code, "print(y)");
        assert_eq!(console.take_notices(), vec![ConsoleNotice::HelpAvailable(help)]);
        assert_eq!(console.session_state(), SessionState::Running);
    }

    #[test]
    fn clear_keeps_session_running() {
        let mut console = console();
        let mut outbox: Vec<OutboundMessage> = Vec::new();
        console.set_editor_code("while True: pass", Instant::now());
        console.run(&mut outbox).expect("valid code runs");

        console.handle_shortcut(Shortcut::ClearOutput, &mut outbox).expect("clear");

        assert!(console.sink().is_empty());
        assert_eq!(console.session_state(), SessionState::Running);
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn lint_result_updates_diagnostics() {
        let mut console = console();
        let report = LintReport {
            valid: false,
            error: Some("invalid syntax".to_string()),
            line: Some(1),
            column: Some(7),
        };

        console.on_transport_event(TransportEvent::Message(InboundMessage::LintResult(
            report.clone(),
        )));

        assert_eq!(console.diagnostics(), Some(&report));
        assert_eq!(console.take_notices(), vec![ConsoleNotice::Diagnostics(report)]);
    }

    #[test]
    fn deadlines_merge_lint_and_completion() {
        let config = ConsoleConfig::default().with_completion_timeout(Some(Duration::from_millis(200)));
        let mut console = Console::new(&config, Transcript::new());
        let mut outbox: Vec<OutboundMessage> = Vec::new();
        let now = Instant::now();
        assert_eq!(console.next_deadline(), None);

        console.set_editor_code("pri", now);
        let (reply, mut ticket) = CompletionTicket::channel();
        console
            .request_completion(
                Position {
                    line_number: 1,
                    column: 4,
                },
                now,
                &mut outbox,
                reply,
            )
            .expect("vec outbox accepts");
        assert_eq!(console.next_deadline(), Some(now + Duration::from_millis(200)));

        console
            .on_deadline(now + Duration::from_millis(200), &mut outbox)
            .expect("vec outbox accepts");
        assert_eq!(ticket.try_resolve(), Some(Err(CompletionError::TimedOut)));
        assert_eq!(console.next_deadline(), Some(now + Duration::from_millis(500)));

        console
            .on_deadline(now + Duration::from_millis(500), &mut outbox)
            .expect("vec outbox accepts");
        assert_eq!(
            outbox.last(),
            Some(&OutboundMessage::Lint {
                code: "pri".to_string()
            })
        );
        assert_eq!(console.next_deadline(), None);
    }

    #[test]
    fn completion_results_route_to_the_broker() {
        let mut console = console();
        let mut outbox: Vec<OutboundMessage> = Vec::new();
        console.set_editor_code("le", Instant::now());
        let (reply, mut ticket) = CompletionTicket::channel();
        console
            .request_completion(
                Position {
                    line_number: 1,
                    column: 3,
                },
                Instant::now(),
                &mut outbox,
                reply,
            )
            .expect("vec outbox accepts");
        let request_id = console.pending_completion().expect("request pending");

        console.on_transport_event(TransportEvent::Message(InboundMessage::CompletionResult {
            request_id: Some(request_id),
            suggestions: vec![RawSuggestion {
                label: "len".to_string(),
                kind: None,
                detail: None,
                documentation: None,
                insert_text: None,
                sort_text: None,
            }],
        }));

        let items = ticket.try_resolve().expect("resolved").expect("ok");
        assert_eq!(items[0].label, "len");
    }

    #[test]
    fn reconnect_detaches_then_cancel_reply_returns_to_idle() {
        let mut console = console();
        let mut outbox: Vec<OutboundMessage> = Vec::new();
        console.set_editor_code("while True: pass", Instant::now());
        console.on_transport_event(TransportEvent::Connected { resumed: false });
        console.run(&mut outbox).expect("valid code runs");

        console.on_transport_event(TransportEvent::Disconnected);
        assert_eq!(
            console.connection(),
            ConnectionStatus::Reconnecting { attempt: 1 }
        );
        console.on_transport_event(TransportEvent::Connected { resumed: true });
        assert_eq!(console.session_state(), SessionState::Detached);
        assert!(!console.affordances().run_enabled);
        assert!(console.affordances().cancel_enabled);

        assert_eq!(console.cancel(&mut outbox), Ok(CancelOutcome::Requested));
        console.on_transport_event(output(OutputEvent::Stderr(NO_RUNNING_PROCESS.to_string())));
        assert_eq!(console.session_state(), SessionState::Idle);

        let notices = console.take_notices();
        assert!(notices.contains(&ConsoleNotice::Connection(ConnectionStatus::Connected)));
        assert_eq!(
            notices.last(),
            Some(&ConsoleNotice::SessionChanged {
                state: SessionState::Idle,
                affordances: Affordances::for_state(SessionState::Idle),
            })
        );
    }

    #[test]
    fn give_up_fails_pending_completion_and_detaches() {
        let mut console = console();
        let mut outbox: Vec<OutboundMessage> = Vec::new();
        console.set_editor_code("x", Instant::now());
        console.run(&mut outbox).expect("valid code runs");
        let (reply, mut ticket) = CompletionTicket::channel();
        console
            .request_completion(
                Position {
                    line_number: 1,
                    column: 2,
                },
                Instant::now(),
                &mut outbox,
                reply,
            )
            .expect("vec outbox accepts");

        console.on_transport_event(TransportEvent::GaveUp);

        assert_eq!(ticket.try_resolve(), Some(Err(CompletionError::Closed)));
        assert_eq!(console.connection(), ConnectionStatus::Disconnected);
        assert_eq!(console.session_state(), SessionState::Detached);
        assert_eq!(console.next_deadline(), None);
    }
}
