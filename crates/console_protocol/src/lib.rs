//! Wire contract shared by the execution console core and its transports.
//!
//! This crate defines the outbound/inbound event vocabulary, the sentinel
//! strings the execution server uses to end a session, and the two seams a
//! transport implements ([`Outbox`] and [`Transport`]). It performs no I/O.

pub mod error;
pub mod message;

use std::future::Future;

pub use error::{ProtocolError, TransportError};
pub use message::{
    event, is_terminal_error, is_traceback, InboundMessage, LintReport, OutboundMessage,
    OutputEvent, Position, RawSuggestion, RequestId, CANCELLED_BY_USER, NO_RUNNING_PROCESS,
    SYNTAX_ERROR_PREFIX, TRACEBACK_MARKER,
};

/// Connectivity as reported to a status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// First connection attempt in flight.
    Connecting,
    Connected,
    /// Connection lost; `attempt` is the 1-based reconnect attempt being waited on.
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted. Permanent.
    Disconnected,
}

impl ConnectionStatus {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting { .. } => "Reconnecting",
            Self::Disconnected => "Disconnected",
        }
    }
}

/// Event delivered by a transport, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Channel is up. `resumed` is true for every connection after the first.
    Connected { resumed: bool },
    /// Channel dropped; the transport is reconnecting on its own.
    Disconnected,
    /// Reconnect attempts exhausted; no further events follow.
    GaveUp,
    Message(InboundMessage),
}

/// Send half of a transport.
pub trait Outbox {
    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError>;
}

impl Outbox for Vec<OutboundMessage> {
    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.push(message);
        Ok(())
    }
}

/// Duplex channel between the console and the execution server.
///
/// `next_event` must be cancel-safe: dropping the returned future before it
/// completes must not lose an event. Console runtimes poll it inside
/// `select!` alongside user input and timers.
pub trait Transport: Outbox {
    /// Resolves to the next event in delivery order, or `None` once the
    /// transport has shut down for good.
    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent>>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        ConnectionStatus, InboundMessage, Outbox, OutboundMessage, OutputEvent, Position,
        TransportEvent,
    };

    #[test]
    fn vec_outbox_records_messages_in_send_order() {
        let mut outbox: Vec<OutboundMessage> = Vec::new();
        outbox
            .send(OutboundMessage::Execute {
                code: "print(1)".to_string(),
            })
            .expect("vec outbox never fails");
        outbox
            .send(OutboundMessage::CancelExecution)
            .expect("vec outbox never fails");

        assert_eq!(
            outbox,
            vec![
                OutboundMessage::Execute {
                    code: "print(1)".to_string(),
                },
                OutboundMessage::CancelExecution,
            ]
        );
    }

    #[test]
    fn connection_status_labels_follow_indicator_states() {
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(!ConnectionStatus::Reconnecting { attempt: 2 }.is_connected());
        assert_eq!(ConnectionStatus::Connecting.label(), "Connecting");
        assert_eq!(ConnectionStatus::Disconnected.label(), "Disconnected");
    }

    #[test]
    fn transport_event_wraps_decoded_inbound_messages() {
        let message = InboundMessage::decode("execution_output", json!({ "output": "hi\n" }))
            .expect("output payload decodes");

        assert_eq!(
            TransportEvent::Message(message),
            TransportEvent::Message(InboundMessage::Output(OutputEvent::Stdout(
                "hi\n".to_string()
            )))
        );
    }

    #[test]
    fn position_uses_editor_field_names_on_the_wire() {
        let position = Position {
            line_number: 3,
            column: 7,
        };

        assert_eq!(
            serde_json::to_value(position).expect("position serializes"),
            json!({ "lineNumber": 3, "column": 7 })
        );
    }
}
