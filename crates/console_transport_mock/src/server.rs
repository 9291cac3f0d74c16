use std::collections::HashMap;

use console_protocol::{
    InboundMessage, LintReport, OutboundMessage, OutputEvent, Position, RawSuggestion, RequestId,
    CANCELLED_BY_USER, NO_RUNNING_PROCESS, SYNTAX_ERROR_PREFIX,
};
use serde_json::json;
use tracing::debug;

/// Execution time reported for every completed mock run.
pub const MOCK_EXECUTION_TIME: &str = "0.00s";

const ALLOWED_MODULES: [&str; 13] = [
    "array",
    "collections",
    "datetime",
    "functools",
    "itertools",
    "json",
    "math",
    "random",
    "re",
    "statistics",
    "string",
    "time",
    "typing",
];

const BUILTINS: [&str; 20] = [
    "abs", "dict", "enumerate", "filter", "float", "input", "int", "len", "list", "map", "max",
    "min", "print", "range", "set", "sorted", "str", "sum", "tuple", "zip",
];

const MODULE_MEMBERS: [(&str, &[&str]); 2] = [
    ("math", &["ceil", "floor", "pi", "sqrt"]),
    ("random", &["choice", "randint", "random", "shuffle"]),
];

/// Text fragments for which the server refuses to complete at all.
const BLOCKED_COMPLETION_CONTEXT: [&str; 7] = [
    "import os",
    "import sys",
    "import subprocess",
    "eval(",
    "exec(",
    "__import__",
    "open(",
];

/// Names the server never suggests.
const HIDDEN_NAME_FRAGMENTS: [&str; 6] = ["/", "\\", "path", "system", "os", "sys"];

/// In-process stand-in for the execution server.
///
/// Understands a tiny line-oriented subset of Python: `print(...)`,
/// assignments, `input(...)`, `raise Name("message")` and `while True:`
/// (which never finishes). Replies follow the real server's event shapes,
/// including its quirks: a runtime traceback ends the run without an
/// execution time, and cancel answers even when nothing is running.
#[derive(Debug, Default)]
pub struct MockExecutionServer {
    run: Option<MockRun>,
    omit_request_ids: bool,
}

#[derive(Debug)]
struct MockRun {
    statements: Vec<(usize, String)>,
    next: usize,
    variables: HashMap<String, String>,
    state: RunState,
}

#[derive(Debug, PartialEq, Eq)]
enum RunState {
    Ready,
    AwaitingInput { target: Option<String> },
    Hung,
}

impl MockExecutionServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers completions without echoing `requestId`, like older servers.
    #[must_use]
    pub fn without_request_ids(mut self) -> Self {
        self.omit_request_ids = true;
        self
    }

    /// True while a run is executing, hung or waiting for input.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Replies the server emits for one client message, in emission order.
    pub fn handle(&mut self, message: &OutboundMessage) -> Vec<InboundMessage> {
        match message {
            OutboundMessage::Execute { code } => self
                .execute(code)
                .into_iter()
                .map(InboundMessage::Output)
                .collect(),
            OutboundMessage::CancelExecution => {
                let text = if self.run.take().is_some() {
                    CANCELLED_BY_USER
                } else {
                    NO_RUNNING_PROCESS
                };
                vec![InboundMessage::Output(OutputEvent::Stderr(text.to_string()))]
            }
            OutboundMessage::InputResponse { input } => self
                .provide_input(input)
                .into_iter()
                .map(InboundMessage::Output)
                .collect(),
            OutboundMessage::Completion {
                request_id,
                text,
                position,
            } => vec![self.complete(*request_id, text, *position)],
            OutboundMessage::Lint { code } => {
                let report = match check_syntax(code) {
                    Ok(()) => LintReport {
                        valid: true,
                        ..LintReport::default()
                    },
                    Err(issue) => LintReport {
                        valid: false,
                        error: Some(issue.describe()),
                        line: Some(issue.line),
                        column: Some(issue.column),
                    },
                };
                vec![InboundMessage::LintResult(report)]
            }
        }
    }

    fn execute(&mut self, code: &str) -> Vec<OutputEvent> {
        if let Err(issue) = check_syntax(code) {
            return vec![OutputEvent::Stderr(issue.syntax_error_text())];
        }

        let statements = code
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim().to_string()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .collect();
        self.run = Some(MockRun {
            statements,
            next: 0,
            variables: HashMap::new(),
            state: RunState::Ready,
        });
        self.advance()
    }

    fn provide_input(&mut self, input: &str) -> Vec<OutputEvent> {
        let Some(run) = self.run.as_mut() else {
            debug!("mock server ignoring input without a running process");
            return Vec::new();
        };
        let RunState::AwaitingInput { target } = &run.state else {
            debug!("mock server ignoring unsolicited input");
            return Vec::new();
        };

        if let Some(target) = target.clone() {
            run.variables.insert(target, input.to_string());
        }
        run.state = RunState::Ready;
        self.advance()
    }

    fn advance(&mut self) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        let Some(run) = self.run.as_mut() else {
            return events;
        };

        while run.next < run.statements.len() {
            let (line, statement) = run.statements[run.next].clone();
            run.next += 1;

            match Statement::parse(&statement) {
                Statement::Print(arguments) => match run.render(&arguments) {
                    Ok(text) => events.push(OutputEvent::Stdout(format!("{text}\n"))),
                    Err(name) => {
                        events.push(OutputEvent::Stderr(traceback(
                            line,
                            &statement,
                            "NameError",
                            &format!("name '{name}' is not defined"),
                        )));
                        self.run = None;
                        return events;
                    }
                },
                Statement::Input { target, prompt } => {
                    let prompt = match prompt {
                        Some(expression) => run.evaluate(&expression).unwrap_or(expression),
                        None => String::new(),
                    };
                    events.push(OutputEvent::InputRequest(prompt));
                    run.state = RunState::AwaitingInput { target };
                    return events;
                }
                Statement::Assign { target, expression } => {
                    let value = run.evaluate(&expression).unwrap_or(expression);
                    run.variables.insert(target, value);
                }
                Statement::Raise { exception, message } => {
                    events.push(OutputEvent::Stderr(traceback(
                        line, &statement, &exception, &message,
                    )));
                    self.run = None;
                    return events;
                }
                Statement::Forever => {
                    run.state = RunState::Hung;
                    return events;
                }
                Statement::Other => {}
            }
        }

        events.push(OutputEvent::ExecutionTime(MOCK_EXECUTION_TIME.to_string()));
        self.run = None;
        events
    }

    fn complete(&self, request_id: RequestId, text: &str, position: Position) -> InboundMessage {
        let lowered = text.to_lowercase();
        let suggestions = if BLOCKED_COMPLETION_CONTEXT
            .iter()
            .any(|blocked| lowered.contains(blocked))
        {
            Vec::new()
        } else {
            suggestions_at(text, position)
        };

        InboundMessage::CompletionResult {
            request_id: (!self.omit_request_ids).then_some(request_id),
            suggestions,
        }
    }
}

impl MockRun {
    fn render(&self, arguments: &str) -> Result<String, String> {
        let mut rendered = Vec::new();
        for argument in split_arguments(arguments) {
            rendered.push(self.evaluate(&argument).map_err(|_| argument.clone())?);
        }
        Ok(rendered.join(" "))
    }

    /// Evaluates a literal or a known variable. Unknown identifiers are errors.
    fn evaluate(&self, expression: &str) -> Result<String, String> {
        let expression = expression.trim();
        if let Some(text) = string_literal(expression) {
            return Ok(text);
        }
        if expression.parse::<f64>().is_ok() || matches!(expression, "True" | "False" | "None") {
            return Ok(expression.to_string());
        }
        if is_identifier(expression) {
            return self
                .variables
                .get(expression)
                .cloned()
                .ok_or_else(|| expression.to_string());
        }
        Ok(expression.to_string())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Statement {
    Print(String),
    Input {
        target: Option<String>,
        prompt: Option<String>,
    },
    Assign {
        target: String,
        expression: String,
    },
    Raise {
        exception: String,
        message: String,
    },
    Forever,
    Other,
}

impl Statement {
    fn parse(statement: &str) -> Self {
        if statement.starts_with("while True") {
            return Self::Forever;
        }
        if let Some(arguments) = call_arguments(statement, "print") {
            return Self::Print(arguments);
        }
        if let Some(prompt) = call_arguments(statement, "input") {
            return Self::Input {
                target: None,
                prompt: non_empty(prompt),
            };
        }
        if let Some(rest) = statement.strip_prefix("raise ") {
            let rest = rest.trim();
            return match rest.find('(') {
                Some(open) => Self::Raise {
                    exception: rest[..open].trim().to_string(),
                    message: call_arguments(rest, rest[..open].trim())
                        .and_then(|argument| string_literal(argument.trim()))
                        .unwrap_or_default(),
                },
                None => Self::Raise {
                    exception: rest.to_string(),
                    message: String::new(),
                },
            };
        }
        if let Some((target, expression)) = statement.split_once('=') {
            let target = target.trim();
            let expression = expression.trim();
            if is_identifier(target) && !expression.starts_with('=') {
                if let Some(prompt) = call_arguments(expression, "input") {
                    return Self::Input {
                        target: Some(target.to_string()),
                        prompt: non_empty(prompt),
                    };
                }
                return Self::Assign {
                    target: target.to_string(),
                    expression: expression.to_string(),
                };
            }
        }
        Self::Other
    }
}

/// Location and reason of the first syntax problem in a piece of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub text: String,
}

impl SyntaxIssue {
    fn describe(&self) -> String {
        format!("{} (<string>, line {})", self.message, self.line)
    }

    fn syntax_error_text(&self) -> String {
        let caret_padding = " ".repeat(self.column.saturating_sub(1) as usize);
        format!(
            "{SYNTAX_ERROR_PREFIX} {}\nLine {}, Column {}\n{}\n{caret_padding}^",
            self.describe(),
            self.line,
            self.column,
            self.text
        )
    }
}

/// Bracket and string-literal balance check, the subset of compile errors
/// the mock server reports.
pub fn check_syntax(code: &str) -> Result<(), SyntaxIssue> {
    let lines: Vec<&str> = code.lines().collect();
    let mut open: Vec<(char, u32, u32)> = Vec::new();

    for (index, text) in lines.iter().enumerate() {
        let line = index as u32 + 1;
        let mut quote: Option<(char, u32)> = None;
        let mut escaped = false;

        for (offset, ch) in text.chars().enumerate() {
            let column = offset as u32 + 1;
            if let Some((delimiter, _)) = quote {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == delimiter {
                    quote = None;
                }
                continue;
            }

            match ch {
                '#' => break,
                '\'' | '"' => quote = Some((ch, column)),
                '(' | '[' | '{' => open.push((ch, line, column)),
                ')' | ']' | '}' => match open.pop() {
                    Some((opener, _, _)) if closer_for(opener) == ch => {}
                    Some((opener, _, _)) => {
                        return Err(SyntaxIssue {
                            message: format!(
                                "closing parenthesis '{ch}' does not match opening parenthesis '{opener}'"
                            ),
                            line,
                            column,
                            text: (*text).to_string(),
                        });
                    }
                    None => {
                        return Err(SyntaxIssue {
                            message: format!("unmatched '{ch}'"),
                            line,
                            column,
                            text: (*text).to_string(),
                        });
                    }
                },
                _ => {}
            }
        }

        if let Some((_, column)) = quote {
            return Err(SyntaxIssue {
                message: format!("unterminated string literal (detected at line {line})"),
                line,
                column,
                text: (*text).to_string(),
            });
        }
    }

    match open.first() {
        Some(&(opener, line, column)) => Err(SyntaxIssue {
            message: format!("'{opener}' was never closed"),
            line,
            column,
            text: lines
                .get(line as usize - 1)
                .map(|text| (*text).to_string())
                .unwrap_or_default(),
        }),
        None => Ok(()),
    }
}

fn closer_for(opener: char) -> char {
    match opener {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn suggestions_at(text: &str, position: Position) -> Vec<RawSuggestion> {
    let lines: Vec<&str> = text.split('\n').collect();
    let Some(line) = (position.line_number as usize)
        .checked_sub(1)
        .and_then(|index| lines.get(index))
    else {
        return Vec::new();
    };
    let current: String = line.chars().take(position.column as usize).collect();

    if current.contains("import") || current.contains("from") {
        let word = current.split_whitespace().last().unwrap_or_default();
        return ALLOWED_MODULES
            .iter()
            .filter(|module| module.starts_with(word))
            .map(|module| suggestion(module, "module", &format!("Safe module: {module}")))
            .collect();
    }

    let prefix: String = current
        .chars()
        .rev()
        .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let before_prefix = &current[..current.len() - prefix.len()];

    let candidates: Vec<(&str, &str)> = match before_prefix.strip_suffix('.') {
        Some(object) => {
            let object: String = object
                .chars()
                .rev()
                .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            MODULE_MEMBERS
                .iter()
                .find(|(module, _)| *module == object)
                .map(|(_, members)| members.iter().map(|member| (*member, "function")).collect())
                .unwrap_or_default()
        }
        None => BUILTINS.iter().map(|name| (*name, "function")).collect(),
    };

    candidates
        .into_iter()
        .filter(|(name, _)| name.starts_with(prefix.as_str()))
        .filter(|(name, _)| {
            !name.starts_with('_')
                && !HIDDEN_NAME_FRAGMENTS
                    .iter()
                    .any(|fragment| name.to_lowercase().contains(fragment))
        })
        .map(|(name, detail)| suggestion(name, detail, &format!("{name}(...)")))
        .collect()
}

fn suggestion(label: &str, detail: &str, documentation: &str) -> RawSuggestion {
    RawSuggestion {
        label: label.to_string(),
        kind: Some(json!(1)),
        detail: Some(detail.to_string()),
        documentation: Some(documentation.to_string()),
        insert_text: Some(label.to_string()),
        sort_text: None,
    }
}

fn traceback(line: usize, statement: &str, exception: &str, message: &str) -> String {
    let summary = if message.is_empty() {
        exception.to_string()
    } else {
        format!("{exception}: {message}")
    };
    format!(
        "Traceback (most recent call last):\n  File \"<string>\", line {line}, in <module>\n    {statement}\n{summary}\n"
    )
}

/// Argument text of `name(...)` when `statement` is exactly that call.
fn call_arguments(statement: &str, name: &str) -> Option<String> {
    let rest = statement.strip_prefix(name)?.trim_start();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner.to_string())
}

fn split_arguments(arguments: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for ch in arguments.chars() {
        match (quote, ch) {
            (Some(delimiter), _) if ch == delimiter => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(std::mem::take(&mut current).trim().to_string());
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }

    let last = current.trim();
    if !last.is_empty() {
        parts.push(last.to_string());
    }
    parts
}

fn string_literal(expression: &str) -> Option<String> {
    let mut chars = expression.chars();
    let first = chars.next()?;
    if !matches!(first, '\'' | '"') || expression.len() < 2 || !expression.ends_with(first) {
        return None;
    }
    Some(expression[1..expression.len() - 1].replace("\\n", "\n"))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(ch) if ch.is_alphabetic() || ch == '_')
        && chars.all(|ch| ch.is_alphanumeric() || ch == '_')
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdout(text: &str) -> InboundMessage {
        InboundMessage::Output(OutputEvent::Stdout(text.to_string()))
    }

    fn execute(server: &mut MockExecutionServer, code: &str) -> Vec<InboundMessage> {
        server.handle(&OutboundMessage::Execute {
            code: code.to_string(),
        })
    }

    #[test]
    fn print_then_execution_time() {
        let mut server = MockExecutionServer::new();
        let replies = execute(&mut server, "print(\"hi\")\nprint('a', 2)");

        assert_eq!(
            replies,
            vec![
                stdout("hi\n"),
                stdout("a 2\n"),
                InboundMessage::Output(OutputEvent::ExecutionTime("0.00s".to_string())),
            ]
        );
        assert!(!server.is_running());
    }

    #[test]
    fn input_pauses_until_response_and_binds_variable() {
        let mut server = MockExecutionServer::new();
        let replies = execute(&mut server, "name = input(\"Name:\")\nprint(name)");
        assert_eq!(
            replies,
            vec![InboundMessage::Output(OutputEvent::InputRequest(
                "Name:".to_string()
            ))]
        );
        assert!(server.is_running());

        let replies = server.handle(&OutboundMessage::InputResponse {
            input: "Ada".to_string(),
        });
        assert_eq!(
            replies,
            vec![
                stdout("Ada\n"),
                InboundMessage::Output(OutputEvent::ExecutionTime("0.00s".to_string())),
            ]
        );
    }

    #[test]
    fn raise_reports_traceback_without_execution_time() {
        let mut server = MockExecutionServer::new();
        let replies = execute(&mut server, "raise ValueError(\"bad\")");

        assert_eq!(replies.len(), 1);
        let InboundMessage::Output(OutputEvent::Stderr(text)) = &replies[0] else {
            panic!("expected traceback");
        };
        assert!(text.starts_with("Traceback (most recent call last):"));
        assert!(text.ends_with("ValueError: bad\n"));
        assert!(!server.is_running());
    }

    #[test]
    fn cancel_answers_by_running_state() {
        let mut server = MockExecutionServer::new();
        assert!(execute(&mut server, "while True:\n    pass").is_empty());
        assert!(server.is_running());

        assert_eq!(
            server.handle(&OutboundMessage::CancelExecution),
            vec![InboundMessage::Output(OutputEvent::Stderr(
                CANCELLED_BY_USER.to_string()
            ))]
        );
        assert_eq!(
            server.handle(&OutboundMessage::CancelExecution),
            vec![InboundMessage::Output(OutputEvent::Stderr(
                NO_RUNNING_PROCESS.to_string()
            ))]
        );
    }

    #[test]
    fn unbalanced_code_is_a_syntax_error_on_execute_and_lint() {
        let mut server = MockExecutionServer::new();
        let replies = execute(&mut server, "print(\"hi\"");
        let InboundMessage::Output(OutputEvent::Stderr(text)) = &replies[0] else {
            panic!("expected syntax error");
        };
        assert!(text.starts_with("Syntax Error: '(' was never closed"));
        assert!(text.contains("Line 1, Column 6"));

        let replies = server.handle(&OutboundMessage::Lint {
            code: "x = 1\ny = 'oops".to_string(),
        });
        assert_eq!(
            replies,
            vec![InboundMessage::LintResult(LintReport {
                valid: false,
                error: Some(
                    "unterminated string literal (detected at line 2) (<string>, line 2)"
                        .to_string()
                ),
                line: Some(2),
                column: Some(5),
            })]
        );
    }

    #[test]
    fn completion_echoes_request_id_and_filters_by_prefix() {
        let mut server = MockExecutionServer::new();
        let replies = server.handle(&OutboundMessage::Completion {
            request_id: 7,
            text: "import math\nmath.s".to_string(),
            position: Position {
                line_number: 2,
                column: 7,
            },
        });

        let [InboundMessage::CompletionResult {
            request_id,
            suggestions,
        }] = replies.as_slice()
        else {
            panic!("expected one completion result");
        };
        assert_eq!(*request_id, Some(7));
        let labels: Vec<&str> = suggestions.iter().map(|item| item.label.as_str()).collect();
        assert_eq!(labels, vec!["sqrt"]);
    }

    #[test]
    fn legacy_server_omits_request_id_and_blocks_unsafe_context() {
        let mut server = MockExecutionServer::new().without_request_ids();
        let replies = server.handle(&OutboundMessage::Completion {
            request_id: 1,
            text: "import os\nos.".to_string(),
            position: Position {
                line_number: 2,
                column: 4,
            },
        });

        assert_eq!(
            replies,
            vec![InboundMessage::CompletionResult {
                request_id: None,
                suggestions: Vec::new(),
            }]
        );
    }

    #[test]
    fn statements_parse_into_supported_forms() {
        assert_eq!(
            Statement::parse("answer = input()"),
            Statement::Input {
                target: Some("answer".to_string()),
                prompt: None,
            }
        );
        assert_eq!(Statement::parse("if x == 1:"), Statement::Other);
        assert_eq!(
            Statement::parse("raise KeyboardInterrupt"),
            Statement::Raise {
                exception: "KeyboardInterrupt".to_string(),
                message: String::new(),
            }
        );
    }
}
