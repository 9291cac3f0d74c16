use std::io::Write;

use exec_console::{Fragment, OutputSink, Transcript};
use tracing::warn;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Writes the transcript to a terminal as it grows and keeps a copy.
///
/// The terminal already shows what the user typed at a prompt, so an input
/// echo is recorded without being written again.
pub struct TerminalSink<W: Write> {
    out: W,
    transcript: Transcript,
    input_open: bool,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            transcript: Transcript::new(),
            input_open: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let written = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(error) = written {
            warn!(%error, "terminal write failed");
        }
    }
}

impl<W: Write> OutputSink for TerminalSink<W> {
    fn append(&mut self, fragment: Fragment) {
        self.write(&fragment.text);
        self.transcript.append(fragment);
    }

    fn open_input(&mut self, prompt: Fragment) {
        self.write(&prompt.text);
        self.input_open = true;
        self.transcript.open_input(prompt);
    }

    fn close_input(&mut self, echo: Option<Fragment>) {
        if echo.is_none() && self.input_open {
            // Ends the abandoned prompt line.
            self.write("\n");
        }
        self.input_open = false;
        self.transcript.close_input(echo);
    }

    fn clear(&mut self) {
        self.write(CLEAR_SCREEN);
        self.input_open = false;
        self.transcript.clear();
    }
}
