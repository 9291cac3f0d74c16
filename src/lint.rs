//! Debounced lint requests.

use std::time::Duration;

use console_protocol::{Outbox, OutboundMessage, TransportError};
use tokio::time::Instant;
use tracing::debug;

/// Coalesces editor changes into one `lint` request per quiet period.
///
/// Every change moves the single deadline; when it passes, the latest code is
/// sent once.
#[derive(Debug, Clone)]
pub struct LintScheduler {
    debounce: Duration,
    pending: Option<PendingLint>,
}

#[derive(Debug, Clone)]
struct PendingLint {
    code: String,
    deadline: Instant,
}

impl LintScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: None,
        }
    }

    pub fn on_change(&mut self, code: &str, now: Instant) {
        self.pending = Some(PendingLint {
            code: code.to_string(),
            deadline: now + self.debounce,
        });
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    /// Sends the pending request if its deadline has passed.
    ///
    /// Returns whether a request was sent. A send failure drops the request;
    /// the next edit schedules a fresh one.
    pub fn fire_due(
        &mut self,
        now: Instant,
        outbox: &mut dyn Outbox,
    ) -> Result<bool, TransportError> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.deadline <= now);
        if !due {
            return Ok(false);
        }

        let Some(pending) = self.pending.take() else {
            return Ok(false);
        };
        debug!(len = pending.code.len(), "sending lint request");
        outbox.send(OutboundMessage::Lint { code: pending.code })?;
        Ok(true)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
