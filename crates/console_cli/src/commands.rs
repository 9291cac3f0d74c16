use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Runs the buffer, or the file at the path after loading it.
    Run(Option<PathBuf>),
    Load(PathBuf),
    Cancel,
    Clear,
    /// Completion at `line:column`, or at the end of the buffer.
    Complete(Option<(u32, u32)>),
    /// Help context of the last traceback.
    Explain,
    Status,
    Code,
    Reset,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /run [path], /load <path>, /cancel, /clear, /complete [line:col], /explain, /status, /code, /reset, /help, /quit\nOther lines extend the code buffer, or answer the program while it waits for input;\nthen only /cancel and /quit are commands.";

pub fn parse_host_command(input: &str) -> Option<HostCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, non_empty(rest.trim())),
        None => (trimmed, None),
    };

    let parsed = match command {
        "/run" => HostCommand::Run(argument.map(PathBuf::from)),
        "/load" => match argument {
            Some(path) => HostCommand::Load(PathBuf::from(path)),
            None => HostCommand::Unknown(trimmed.to_string()),
        },
        "/cancel" => HostCommand::Cancel,
        "/clear" => HostCommand::Clear,
        "/complete" => match argument {
            None => HostCommand::Complete(None),
            Some(location) => match parse_location(location) {
                Some(location) => HostCommand::Complete(Some(location)),
                None => HostCommand::Unknown(trimmed.to_string()),
            },
        },
        "/explain" => HostCommand::Explain,
        "/status" => HostCommand::Status,
        "/code" => HostCommand::Code,
        "/reset" => HostCommand::Reset,
        "/help" => HostCommand::Help,
        "/quit" => HostCommand::Quit,
        _ => HostCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

fn parse_location(location: &str) -> Option<(u32, u32)> {
    let (line, column) = location.split_once(':')?;
    let line = line.trim().parse().ok().filter(|line| *line > 0)?;
    let column = column.trim().parse().ok().filter(|column| *column > 0)?;
    Some((line, column))
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
