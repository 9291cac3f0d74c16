#![allow(dead_code)]

use console_protocol::{
    InboundMessage, Outbox, OutboundMessage, OutputEvent, Position, TransportError,
    TransportEvent,
};
use exec_console::{Console, ConsoleConfig, Transcript};
use tokio::time::Instant;

/// Outbox that behaves like a transport that has shut down.
pub struct ClosedOutbox;

impl Outbox for ClosedOutbox {
    fn send(&mut self, _message: OutboundMessage) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }
}

pub fn console() -> Console<Transcript> {
    Console::new(&ConsoleConfig::default(), Transcript::new())
}

pub fn console_with_code(code: &str) -> Console<Transcript> {
    let mut console = console();
    console.set_editor_code(code, Instant::now());
    console
}

pub fn output(event: OutputEvent) -> TransportEvent {
    TransportEvent::Message(InboundMessage::Output(event))
}

pub fn stdout(text: &str) -> TransportEvent {
    output(OutputEvent::Stdout(text.to_string()))
}

pub fn stderr(text: &str) -> TransportEvent {
    output(OutputEvent::Stderr(text.to_string()))
}

pub fn execution_time(text: &str) -> TransportEvent {
    output(OutputEvent::ExecutionTime(text.to_string()))
}

pub fn input_request(prompt: &str) -> TransportEvent {
    output(OutputEvent::InputRequest(prompt.to_string()))
}

pub fn at(line_number: u32, column: u32) -> Position {
    Position {
        line_number,
        column,
    }
}

pub fn executes(messages: &[OutboundMessage]) -> usize {
    messages
        .iter()
        .filter(|message| matches!(message, OutboundMessage::Execute { .. }))
        .count()
}
