//! Deterministic in-memory implementation of the console transport seams.
//!
//! [`ScriptedTransport`] delivers events that tests inject through a
//! [`ScriptHandle`] and records everything the console sends. Paired with a
//! [`MockExecutionServer`] it answers like the real execution server, which
//! lets the terminal host run without a network.

pub mod server;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use console_protocol::{
    InboundMessage, Outbox, OutboundMessage, Transport, TransportError, TransportEvent,
};
use tokio::sync::mpsc;

pub use server::{check_syntax, MockExecutionServer, SyntaxIssue, MOCK_EXECUTION_TIME};

/// Stable transport identifier used for explicit startup selection.
pub const MOCK_TRANSPORT_ID: &str = "mock";

enum Injected {
    Event(TransportEvent),
    Close,
}

/// Transport whose inbound side is driven by a [`ScriptHandle`].
pub struct ScriptedTransport {
    injected: mpsc::UnboundedReceiver<Injected>,
    ready: VecDeque<TransportEvent>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    server: Option<MockExecutionServer>,
    closed: bool,
}

/// Test-side control of a [`ScriptedTransport`].
#[derive(Clone)]
pub struct ScriptHandle {
    injector: mpsc::UnboundedSender<Injected>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl ScriptedTransport {
    /// Transport with nothing queued. Events only arrive through the handle.
    #[must_use]
    pub fn new() -> (Self, ScriptHandle) {
        let (injector, injected) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Self {
            injected,
            ready: VecDeque::new(),
            sent: Arc::clone(&sent),
            server: None,
            closed: false,
        };
        (transport, ScriptHandle { injector, sent })
    }

    /// Connected transport whose replies come from `server`.
    #[must_use]
    pub fn with_server(server: MockExecutionServer) -> (Self, ScriptHandle) {
        let (mut transport, handle) = Self::new();
        transport.server = Some(server);
        transport
            .ready
            .push_back(TransportEvent::Connected { resumed: false });
        (transport, handle)
    }
}

impl Outbox for ScriptedTransport {
    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        if let Some(server) = self.server.as_mut() {
            self.ready.extend(
                server
                    .handle(&message)
                    .into_iter()
                    .map(TransportEvent::Message),
            );
        }
        lock_unpoisoned(&self.sent).push(message);
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }
            if self.closed {
                return None;
            }

            match self.injected.recv().await {
                Some(Injected::Event(event)) => return Some(event),
                Some(Injected::Close) => self.closed = true,
                // Every handle is gone; stay open without further events.
                None => std::future::pending::<()>().await,
            }
        }
    }
}

impl ScriptHandle {
    /// Queues a transport event for delivery.
    pub fn push(&self, event: TransportEvent) {
        let _ = self.injector.send(Injected::Event(event));
    }

    pub fn push_message(&self, message: InboundMessage) {
        self.push(TransportEvent::Message(message));
    }

    /// Ends the event stream after everything queued so far.
    pub fn close(&self) {
        let _ = self.injector.send(Injected::Close);
    }

    /// Snapshot of every message sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        lock_unpoisoned(&self.sent).clone()
    }

    /// Drains the record of sent messages.
    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *lock_unpoisoned(&self.sent))
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
