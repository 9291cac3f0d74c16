use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ProtocolError;

/// Event names used on the wire.
pub mod event {
    pub const EXECUTE: &str = "execute";
    pub const CANCEL_EXECUTION: &str = "cancel_execution";
    pub const INPUT_RESPONSE: &str = "input_response";
    pub const COMPLETION: &str = "completion";
    pub const LINT: &str = "lint";

    pub const EXECUTION_OUTPUT: &str = "execution_output";
    pub const EXECUTION_INPUT_REQUEST: &str = "execution_input_request";
    pub const COMPLETION_RESULT: &str = "completion_result";
    pub const LINT_RESULT: &str = "lint_result";
}

/// Error text the server sends after killing a run on request.
pub const CANCELLED_BY_USER: &str = "Execution cancelled by user.";
/// Error text the server sends when a cancel finds nothing to kill.
pub const NO_RUNNING_PROCESS: &str = "No running process found.";
/// Prefix of the error the server sends when code fails to compile.
pub const SYNTAX_ERROR_PREFIX: &str = "Syntax Error:";
/// Marker of a runtime traceback. Not terminal.
pub const TRACEBACK_MARKER: &str = "Traceback";

/// Correlation identifier for completion requests.
pub type RequestId = u64;

/// Returns true when an error text ends the current session.
#[must_use]
pub fn is_terminal_error(text: &str) -> bool {
    text == CANCELLED_BY_USER || text == NO_RUNNING_PROCESS || text.starts_with(SYNTAX_ERROR_PREFIX)
}

#[must_use]
pub fn is_traceback(text: &str) -> bool {
    text.contains(TRACEBACK_MARKER)
}

/// 1-based cursor position in editor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub line_number: u32,
    pub column: u32,
}

/// Client → server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Execute {
        code: String,
    },
    CancelExecution,
    InputResponse {
        input: String,
    },
    Completion {
        request_id: RequestId,
        text: String,
        position: Position,
    },
    Lint {
        code: String,
    },
}

impl OutboundMessage {
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Execute { .. } => event::EXECUTE,
            Self::CancelExecution => event::CANCEL_EXECUTION,
            Self::InputResponse { .. } => event::INPUT_RESPONSE,
            Self::Completion { .. } => event::COMPLETION,
            Self::Lint { .. } => event::LINT,
        }
    }

    /// JSON argument carried with the event. `cancel_execution` carries none.
    #[must_use]
    pub fn payload(&self) -> Option<Value> {
        match self {
            Self::Execute { code } | Self::Lint { code } => Some(json!({ "code": code })),
            Self::CancelExecution => None,
            Self::InputResponse { input } => Some(json!({ "input": input })),
            Self::Completion {
                request_id,
                text,
                position,
            } => Some(json!({
                "text": text,
                "position": position,
                "requestId": request_id,
            })),
        }
    }
}

/// One item of the execution stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Stdout(String),
    Stderr(String),
    ExecutionTime(String),
    InputRequest(String),
}

impl OutputEvent {
    /// Returns true when this event ends the session it belongs to.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::ExecutionTime(_) => true,
            Self::Stderr(text) => is_terminal_error(text),
            Self::Stdout(_) | Self::InputRequest(_) => false,
        }
    }
}

/// Completion entry exactly as the server sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSuggestion {
    pub label: String,
    /// Kind name (`"Function"`) or editor kind index (`1`).
    #[serde(default)]
    pub kind: Option<Value>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub insert_text: Option<String>,
    #[serde(default)]
    pub sort_text: Option<String>,
}

/// Syntax check result for a `lint` request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LintReport {
    pub valid: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

/// Server → client message after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Output(OutputEvent),
    CompletionResult {
        request_id: Option<RequestId>,
        suggestions: Vec<RawSuggestion>,
    },
    LintResult(LintReport),
}

#[derive(Debug, Default, Deserialize)]
struct ExecutionOutputPayload {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    execution_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InputRequestPayload {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResultPayload {
    #[serde(default)]
    suggestions: Option<Vec<RawSuggestion>>,
    #[serde(default)]
    request_id: Option<RequestId>,
}

impl InboundMessage {
    /// Decodes one named event with its JSON argument.
    pub fn decode(event_name: &str, payload: Value) -> Result<Self, ProtocolError> {
        match event_name {
            event::EXECUTION_OUTPUT => {
                let payload: ExecutionOutputPayload = decode_payload(event_name, payload)?;
                // First non-empty field wins, in this order.
                if let Some(error) = non_empty(payload.error) {
                    Ok(Self::Output(OutputEvent::Stderr(error)))
                } else if let Some(output) = non_empty(payload.output) {
                    Ok(Self::Output(OutputEvent::Stdout(output)))
                } else if let Some(time) = non_empty(payload.execution_time) {
                    Ok(Self::Output(OutputEvent::ExecutionTime(time)))
                } else {
                    Err(ProtocolError::EmptyExecutionOutput)
                }
            }
            event::EXECUTION_INPUT_REQUEST => {
                let payload: InputRequestPayload = decode_payload(event_name, payload)?;
                Ok(Self::Output(OutputEvent::InputRequest(
                    payload.prompt.unwrap_or_default(),
                )))
            }
            event::COMPLETION_RESULT => {
                let payload: CompletionResultPayload = decode_payload(event_name, payload)?;
                Ok(Self::CompletionResult {
                    request_id: payload.request_id,
                    suggestions: payload.suggestions.unwrap_or_default(),
                })
            }
            event::LINT_RESULT => {
                let report: LintReport = decode_payload(event_name, payload)?;
                Ok(Self::LintResult(report))
            }
            unknown => Err(ProtocolError::UnknownEvent(unknown.to_string())),
        }
    }

    /// Event name this message arrives under.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Output(OutputEvent::InputRequest(_)) => event::EXECUTION_INPUT_REQUEST,
            Self::Output(_) => event::EXECUTION_OUTPUT,
            Self::CompletionResult { .. } => event::COMPLETION_RESULT,
            Self::LintResult(_) => event::LINT_RESULT,
        }
    }

    /// Re-encodes the message as the server would send it.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Output(OutputEvent::Stdout(text)) => json!({ "output": text }),
            Self::Output(OutputEvent::Stderr(text)) => json!({ "error": text }),
            Self::Output(OutputEvent::ExecutionTime(text)) => json!({ "execution_time": text }),
            Self::Output(OutputEvent::InputRequest(prompt)) => json!({ "prompt": prompt }),
            Self::CompletionResult {
                request_id,
                suggestions,
            } => {
                let mut payload = Map::new();
                payload.insert("suggestions".to_string(), json!(suggestions));
                if let Some(request_id) = request_id {
                    payload.insert("requestId".to_string(), json!(request_id));
                }
                Value::Object(payload)
            }
            Self::LintResult(report) => json!(report),
        }
    }
}

fn decode_payload<T>(event_name: &str, payload: Value) -> Result<T, ProtocolError>
where
    T: DeserializeOwned + Default,
{
    if payload.is_null() {
        return Ok(T::default());
    }

    serde_json::from_value(payload).map_err(|source| ProtocolError::MalformedPayload {
        event: event_name.to_string(),
        source,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty())
}
