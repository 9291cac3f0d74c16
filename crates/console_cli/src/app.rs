use std::path::Path;

use console_protocol::{ConnectionStatus, LintReport, Position};
use exec_console::{
    CompletionItem, CompletionResult, ConsoleHandle, ConsoleNotice, HelpRequest, RuntimeClosed,
    SessionState,
};

use crate::commands::{parse_host_command, HostCommand, HELP_TEXT};

/// What the input loop should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Continue,
    /// Print this text on the status stream.
    Print(String),
    Complete(Position),
    Explain,
    Quit,
}

/// Line-oriented host state: the code buffer and what the console last
/// reported.
#[derive(Debug)]
pub struct HostApp {
    handle: ConsoleHandle,
    buffer: String,
    state: SessionState,
    connection: ConnectionStatus,
    diagnostics: Option<LintReport>,
}

impl HostApp {
    pub fn new(handle: ConsoleHandle) -> Self {
        Self {
            handle,
            buffer: String::new(),
            state: SessionState::Idle,
            connection: ConnectionStatus::Connecting,
            diagnostics: None,
        }
    }

    pub fn handle(&self) -> &ConsoleHandle {
        &self.handle
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// While the program waits for input every line is its answer, apart from
    /// `/cancel` and `/quit`.
    pub fn on_line(&mut self, line: &str) -> Result<HostAction, RuntimeClosed> {
        let command = match parse_host_command(line) {
            Some(command @ (HostCommand::Cancel | HostCommand::Quit)) => command,
            _ if self.state == SessionState::AwaitingInput => {
                self.handle.submit_input(line)?;
                return Ok(HostAction::Continue);
            }
            Some(command) => command,
            None => return self.on_text(line),
        };

        let action = match command {
            HostCommand::Run(path) => {
                if let Some(path) = path {
                    if let Err(message) = self.load(&path) {
                        return Ok(HostAction::Print(message));
                    }
                }
                self.handle.run()?;
                HostAction::Continue
            }
            HostCommand::Load(path) => match self.load(&path) {
                Ok(()) => HostAction::Print(format!(
                    "Loaded {} ({} lines)",
                    path.display(),
                    self.buffer.lines().count()
                )),
                Err(message) => HostAction::Print(message),
            },
            HostCommand::Cancel => {
                self.handle.cancel()?;
                HostAction::Continue
            }
            HostCommand::Clear => {
                self.handle.clear()?;
                HostAction::Continue
            }
            HostCommand::Complete(location) => {
                let position = match location {
                    Some((line_number, column)) => Position {
                        line_number,
                        column,
                    },
                    None => self.end_of_buffer(),
                };
                HostAction::Complete(position)
            }
            HostCommand::Explain => HostAction::Explain,
            HostCommand::Status => HostAction::Print(self.status_text()),
            HostCommand::Code => HostAction::Print(self.buffer.clone()),
            HostCommand::Reset => {
                self.buffer.clear();
                self.handle.set_code(String::new())?;
                HostAction::Continue
            }
            HostCommand::Help => HostAction::Print(HELP_TEXT.to_string()),
            HostCommand::Quit => {
                self.handle.shutdown()?;
                HostAction::Quit
            }
            HostCommand::Unknown(command) => {
                HostAction::Print(format!("Unknown command: {command}. Try /help."))
            }
        };

        Ok(action)
    }

    /// Status text for a console notice, if it deserves one.
    pub fn on_notice(&mut self, notice: ConsoleNotice) -> Option<String> {
        match notice {
            ConsoleNotice::Alert(message) => Some(format!("! {message}")),
            ConsoleNotice::SessionChanged { state, affordances } => {
                self.state = state;
                (state == SessionState::Detached)
                    .then(|| format!("[{}] run outcome unknown; /cancel to reset", affordances.run_label))
            }
            ConsoleNotice::Connection(status) => {
                self.connection = status;
                Some(format!("[{}]", status.label()))
            }
            ConsoleNotice::Diagnostics(report) => {
                let text = (!report.valid).then(|| describe_lint(&report));
                self.diagnostics = Some(report);
                text
            }
            ConsoleNotice::HelpAvailable(_) => {
                Some("Traceback captured. /explain shows it with the code that raised it.".to_string())
            }
        }
    }

    pub fn status_text(&self) -> String {
        let lint = match &self.diagnostics {
            None => "not checked".to_string(),
            Some(report) if report.valid => "ok".to_string(),
            Some(report) => describe_lint(report),
        };
        format!(
            "connection: {}\nsession: {:?}\nlint: {lint}",
            self.connection.label(),
            self.state
        )
    }

    fn on_text(&mut self, line: &str) -> Result<HostAction, RuntimeClosed> {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        self.handle.set_code(self.buffer.clone())?;
        Ok(HostAction::Continue)
    }

    fn load(&mut self, path: &Path) -> Result<(), String> {
        let code = std::fs::read_to_string(path)
            .map_err(|error| format!("Cannot read {}: {error}", path.display()))?;
        self.buffer = code;
        self.handle
            .set_code(self.buffer.clone())
            .map_err(|error| error.to_string())
    }

    fn end_of_buffer(&self) -> Position {
        let line_number = self.buffer.split('\n').count();
        let last_line = self.buffer.split('\n').last().unwrap_or_default();
        Position {
            line_number: u32::try_from(line_number).unwrap_or(u32::MAX),
            column: u32::try_from(last_line.chars().count() + 1).unwrap_or(u32::MAX),
        }
    }
}

pub fn describe_lint(report: &LintReport) -> String {
    let error = report.error.as_deref().unwrap_or("invalid syntax");
    match (report.line, report.column) {
        (Some(line), Some(column)) => format!("{error} (line {line}, column {column})"),
        (Some(line), None) => format!("{error} (line {line})"),
        _ => error.to_string(),
    }
}

pub fn describe_completions(result: &CompletionResult) -> String {
    match result {
        Ok(items) if items.is_empty() => "no suggestions".to_string(),
        Ok(items) => items
            .iter()
            .map(describe_item)
            .collect::<Vec<_>>()
            .join("\n"),
        Err(error) => format!("completion failed: {error}"),
    }
}

fn describe_item(item: &CompletionItem) -> String {
    match &item.detail {
        Some(detail) => format!("{} ({}) {detail}", item.label, item.kind.name()),
        None => format!("{} ({})", item.label, item.kind.name()),
    }
}

pub fn describe_help(help: Option<&HelpRequest>) -> String {
    match help {
        Some(help) => format!("Error:\n{}\nCode:\n{}", help.error.trim_end(), help.code.trim_end()),
        None => "No traceback captured yet.".to_string(),
    }
}
