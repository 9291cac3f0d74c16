//! Async event loop that drives a [`Console`] over a [`Transport`].
//!
//! The loop owns the console and the transport. Transport events, host
//! commands and the lint/completion deadline are handled one at a time, with
//! transport events first so output is applied in arrival order.

use std::time::Duration;

use console_protocol::{Position, Transport};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::completion::{CompletionError, CompletionResult, CompletionTicket};
use crate::console::{Console, ConsoleNotice, Shortcut};
use crate::output::OutputSink;
use crate::session::{HelpRequest, SessionError};

const IDLE_TIMER: Duration = Duration::from_secs(24 * 60 * 60);

/// Host action forwarded to the runtime.
#[derive(Debug)]
pub enum ConsoleCommand {
    EditorChanged(String),
    Run,
    Cancel,
    Clear,
    SubmitInput(String),
    Complete {
        position: Position,
        reply: oneshot::Sender<CompletionResult>,
    },
    Shortcut(Shortcut),
    RequestHelp(oneshot::Sender<Option<HelpRequest>>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("console runtime has stopped")]
pub struct RuntimeClosed;

/// Cloneable sender of host commands.
#[derive(Debug, Clone)]
pub struct ConsoleHandle {
    commands: mpsc::UnboundedSender<ConsoleCommand>,
}

impl ConsoleHandle {
    pub fn send(&self, command: ConsoleCommand) -> Result<(), RuntimeClosed> {
        self.commands.send(command).map_err(|_| RuntimeClosed)
    }

    pub fn set_code(&self, code: impl Into<String>) -> Result<(), RuntimeClosed> {
        self.send(ConsoleCommand::EditorChanged(code.into()))
    }

    pub fn run(&self) -> Result<(), RuntimeClosed> {
        self.send(ConsoleCommand::Run)
    }

    pub fn cancel(&self) -> Result<(), RuntimeClosed> {
        self.send(ConsoleCommand::Cancel)
    }

    pub fn clear(&self) -> Result<(), RuntimeClosed> {
        self.send(ConsoleCommand::Clear)
    }

    pub fn submit_input(&self, value: impl Into<String>) -> Result<(), RuntimeClosed> {
        self.send(ConsoleCommand::SubmitInput(value.into()))
    }

    pub fn shortcut(&self, shortcut: Shortcut) -> Result<(), RuntimeClosed> {
        self.send(ConsoleCommand::Shortcut(shortcut))
    }

    pub fn shutdown(&self) -> Result<(), RuntimeClosed> {
        self.send(ConsoleCommand::Shutdown)
    }

    /// Requests completions at `position` and waits for the outcome.
    pub async fn complete(&self, position: Position) -> CompletionResult {
        let (reply, ticket) = CompletionTicket::channel();
        self.send(ConsoleCommand::Complete { position, reply })
            .map_err(|_| CompletionError::Closed)?;
        ticket.resolve().await
    }

    pub async fn help(&self) -> Result<Option<HelpRequest>, RuntimeClosed> {
        let (reply, receiver) = oneshot::channel();
        self.send(ConsoleCommand::RequestHelp(reply))?;
        receiver.await.map_err(|_| RuntimeClosed)
    }
}

pub struct ConsoleRuntime<S: OutputSink, T: Transport> {
    console: Console<S>,
    transport: T,
    commands: mpsc::UnboundedReceiver<ConsoleCommand>,
    notices: mpsc::UnboundedSender<ConsoleNotice>,
}

impl<S: OutputSink, T: Transport> ConsoleRuntime<S, T> {
    pub fn new(
        console: Console<S>,
        transport: T,
    ) -> (Self, ConsoleHandle, mpsc::UnboundedReceiver<ConsoleNotice>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let runtime = Self {
            console,
            transport,
            commands: command_rx,
            notices: notice_tx,
        };
        (
            runtime,
            ConsoleHandle {
                commands: command_tx,
            },
            notice_rx,
        )
    }

    /// Runs until [`ConsoleCommand::Shutdown`] or until every handle is
    /// dropped, then hands the console back.
    pub async fn run(mut self) -> Console<S> {
        let mut transport_open = true;

        loop {
            let deadline = self.console.next_deadline();
            let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_TIMER);

            tokio::select! {
                biased;

                event = self.transport.next_event(), if transport_open => match event {
                    Some(event) => self.console.on_transport_event(event),
                    None => {
                        debug!("transport finished; console keeps serving commands");
                        transport_open = false;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(ConsoleCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                () = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                    if let Err(error) = self.console.on_deadline(Instant::now(), &mut self.transport) {
                        warn!(%error, "lint request dropped");
                    }
                }
            }

            self.flush_notices();
        }

        self.flush_notices();
        self.console
    }

    fn apply(&mut self, command: ConsoleCommand) {
        let console = &mut self.console;
        let transport = &mut self.transport;

        match command {
            ConsoleCommand::EditorChanged(code) => console.set_editor_code(code, Instant::now()),
            ConsoleCommand::Run => {
                let result = console.run(transport);
                report(console, result);
            }
            ConsoleCommand::Cancel => {
                let result = console.cancel(transport).map(|_| ());
                report(console, result);
            }
            ConsoleCommand::Clear => console.clear(),
            ConsoleCommand::SubmitInput(value) => {
                let result = console.submit_input(&value, transport);
                report(console, result);
            }
            ConsoleCommand::Complete { position, reply } => {
                if let Err(error) =
                    console.request_completion(position, Instant::now(), transport, reply)
                {
                    warn!(%error, "completion request not sent");
                }
            }
            ConsoleCommand::Shortcut(shortcut) => {
                let result = console.handle_shortcut(shortcut, transport);
                report(console, result);
            }
            ConsoleCommand::RequestHelp(reply) => {
                let _ = reply.send(console.request_help());
            }
            ConsoleCommand::Shutdown => {}
        }
    }

    fn flush_notices(&mut self) {
        for notice in self.console.take_notices() {
            // The host may have stopped listening.
            let _ = self.notices.send(notice);
        }
    }
}

fn report<S: OutputSink>(console: &mut Console<S>, result: Result<(), SessionError>) {
    match result {
        Ok(()) => {}
        Err(SessionError::AlreadyRunning) => debug!("run ignored: session already active"),
        Err(error) => console.alert(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use console_protocol::{InboundMessage, OutboundMessage, OutputEvent};
    use console_transport_mock::ScriptedTransport;

    use super::*;
    use crate::config::ConsoleConfig;
    use crate::output::Transcript;
    use crate::session::SessionState;

    #[tokio::test(start_paused = true)]
    async fn validation_failures_become_alerts() {
        let (transport, script) = ScriptedTransport::new();
        let console = Console::new(&ConsoleConfig::default(), Transcript::new());
        let (runtime, handle, mut notices) = ConsoleRuntime::new(console, transport);

        let driver = async {
            handle.set_code("import os").expect("runtime alive");
            handle.run().expect("runtime alive");
            let notice = notices.recv().await;
            handle.shutdown().expect("runtime alive");
            notice
        };
        let (console, notice) = tokio::join!(runtime.run(), driver);

        assert_eq!(
            notice,
            Some(ConsoleNotice::Alert("Forbidden operations detected".to_string()))
        );
        assert_eq!(console.session_state(), SessionState::Idle);
        assert!(!script
            .sent()
            .iter()
            .any(|message| matches!(message, OutboundMessage::Execute { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_output_is_applied_in_arrival_order() {
        let (transport, script) = ScriptedTransport::new();
        let console = Console::new(&ConsoleConfig::default(), Transcript::new());
        let (runtime, handle, mut notices) = ConsoleRuntime::new(console, transport);

        let driver = async {
            handle.set_code("print(\"hi\")").expect("runtime alive");
            handle.run().expect("runtime alive");
            assert!(matches!(
                notices.recv().await,
                Some(ConsoleNotice::SessionChanged {
                    state: SessionState::Running,
                    ..
                })
            ));

            script.push_message(InboundMessage::Output(OutputEvent::Stdout("hi\n".to_string())));
            script.push_message(InboundMessage::Output(OutputEvent::ExecutionTime(
                "0.01s".to_string(),
            )));
            assert!(matches!(
                notices.recv().await,
                Some(ConsoleNotice::SessionChanged {
                    state: SessionState::Idle,
                    ..
                })
            ));
            handle.shutdown().expect("runtime alive");
        };
        let (console, ()) = tokio::join!(runtime.run(), driver);

        assert_eq!(
            console.sink().to_plain_text(),
            "--- Execution Started ---\nhi\n0.01s\n"
        );
        assert_eq!(
            script.sent().first(),
            Some(&OutboundMessage::Execute {
                code: "print(\"hi\")".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_lint_fires_from_the_timer() {
        let (transport, script) = ScriptedTransport::new();
        let console = Console::new(&ConsoleConfig::default(), Transcript::new());
        let (runtime, handle, _notices) = ConsoleRuntime::new(console, transport);

        let driver = async {
            handle.set_code("x = 1").expect("runtime alive");
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.set_code("x = 12").expect("runtime alive");
            tokio::time::sleep(Duration::from_millis(499)).await;
            let early = script.sent();
            tokio::time::sleep(Duration::from_millis(2)).await;
            handle.shutdown().expect("runtime alive");
            early
        };
        let (_console, early) = tokio::join!(runtime.run(), driver);

        assert!(early.is_empty());
        assert_eq!(
            script.sent(),
            vec![OutboundMessage::Lint {
                code: "x = 12".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn handle_reports_stopped_runtime() {
        let (transport, _script) = ScriptedTransport::new();
        let console = Console::new(&ConsoleConfig::default(), Transcript::new());
        let (runtime, handle, _notices) = ConsoleRuntime::new(console, transport);
        drop(runtime);

        assert_eq!(handle.run(), Err(RuntimeClosed));
        assert_eq!(handle.help().await, Err(RuntimeClosed));
        assert_eq!(
            handle
                .complete(Position {
                    line_number: 1,
                    column: 1,
                })
                .await,
            Err(CompletionError::Closed)
        );
    }
}
