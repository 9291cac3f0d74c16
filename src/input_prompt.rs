use console_protocol::{Outbox, OutboundMessage, TransportError};

use crate::output::{Fragment, OutputSink};

/// A pending answer to an `input()` call in the running program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPrompt {
    prompt: String,
}

impl InputPrompt {
    /// Shows the prompt and an editable field in `sink`.
    pub fn open(prompt: &str, sink: &mut dyn OutputSink) -> Self {
        sink.open_input(Fragment::prompt(prompt));
        sink.scroll_to_end();
        Self {
            prompt: prompt.to_string(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Sends `value` to the program and replaces the field with its echo.
    ///
    /// On a send failure the field stays open so the user can retry.
    pub fn submit(
        &self,
        value: &str,
        outbox: &mut dyn Outbox,
        sink: &mut dyn OutputSink,
    ) -> Result<(), TransportError> {
        outbox.send(OutboundMessage::InputResponse {
            input: value.to_string(),
        })?;
        sink.close_input(Some(Fragment::input_echo(value)));
        sink.scroll_to_end();
        Ok(())
    }

    /// Removes the field without sending anything.
    pub fn abandon(self, sink: &mut dyn OutputSink) {
        sink.close_input(None);
    }
}
