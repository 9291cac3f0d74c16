//! Completion request correlation.
//!
//! One request is current at a time. Each carries a fresh `requestId`; a
//! newer request supersedes the older one, and only a response whose id
//! matches the current request is applied.

use std::time::Duration;

use console_protocol::{Outbox, OutboundMessage, Position, RawSuggestion, RequestId, TransportError};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Characters that open the suggestion list without explicit invocation.
pub const TRIGGER_CHARACTERS: [char; 2] = ['.', '('];

#[must_use]
pub fn is_trigger_character(ch: char) -> bool {
    TRIGGER_CHARACTERS.contains(&ch)
}

/// Editor suggestion kinds, numbered as the editor numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    Method,
    Function,
    Constructor,
    Field,
    Variable,
    Class,
    Struct,
    Interface,
    Module,
    Property,
    Event,
    Operator,
    Unit,
    Value,
    Constant,
    Enum,
    EnumMember,
    Keyword,
    Text,
    Color,
    File,
    Reference,
    Customcolor,
    Folder,
    TypeParameter,
    User,
    Issue,
    Snippet,
}

const KINDS: [CompletionKind; 28] = [
    CompletionKind::Method,
    CompletionKind::Function,
    CompletionKind::Constructor,
    CompletionKind::Field,
    CompletionKind::Variable,
    CompletionKind::Class,
    CompletionKind::Struct,
    CompletionKind::Interface,
    CompletionKind::Module,
    CompletionKind::Property,
    CompletionKind::Event,
    CompletionKind::Operator,
    CompletionKind::Unit,
    CompletionKind::Value,
    CompletionKind::Constant,
    CompletionKind::Enum,
    CompletionKind::EnumMember,
    CompletionKind::Keyword,
    CompletionKind::Text,
    CompletionKind::Color,
    CompletionKind::File,
    CompletionKind::Reference,
    CompletionKind::Customcolor,
    CompletionKind::Folder,
    CompletionKind::TypeParameter,
    CompletionKind::User,
    CompletionKind::Issue,
    CompletionKind::Snippet,
];

impl CompletionKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Method => "Method",
            Self::Function => "Function",
            Self::Constructor => "Constructor",
            Self::Field => "Field",
            Self::Variable => "Variable",
            Self::Class => "Class",
            Self::Struct => "Struct",
            Self::Interface => "Interface",
            Self::Module => "Module",
            Self::Property => "Property",
            Self::Event => "Event",
            Self::Operator => "Operator",
            Self::Unit => "Unit",
            Self::Value => "Value",
            Self::Constant => "Constant",
            Self::Enum => "Enum",
            Self::EnumMember => "EnumMember",
            Self::Keyword => "Keyword",
            Self::Text => "Text",
            Self::Color => "Color",
            Self::File => "File",
            Self::Reference => "Reference",
            Self::Customcolor => "Customcolor",
            Self::Folder => "Folder",
            Self::TypeParameter => "TypeParameter",
            Self::User => "User",
            Self::Issue => "Issue",
            Self::Snippet => "Snippet",
        }
    }

    #[must_use]
    pub fn index(self) -> u8 {
        KINDS
            .iter()
            .position(|kind| *kind == self)
            .and_then(|index| u8::try_from(index).ok())
            .unwrap_or(1)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        KINDS.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn from_index(index: u64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|index| KINDS.get(index).copied())
    }

    /// Resolves the wire `kind`. Missing, falsy (`0`, `""`) or unknown
    /// values fall back to [`CompletionKind::Function`].
    pub fn from_wire(kind: Option<&Value>) -> Self {
        let resolved = match kind {
            Some(Value::String(name)) => Self::from_name(name),
            Some(Value::Number(number)) => number
                .as_u64()
                .filter(|index| *index != 0)
                .and_then(Self::from_index),
            _ => None,
        };
        resolved.unwrap_or(Self::Function)
    }
}

/// Suggestion ready for the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
    /// Markdown.
    pub documentation: Option<String>,
    pub insert_text: String,
    pub sort_text: Option<String>,
}

impl CompletionItem {
    pub fn from_raw(raw: RawSuggestion) -> Self {
        let kind = CompletionKind::from_wire(raw.kind.as_ref());
        let insert_text = raw.insert_text.unwrap_or_else(|| raw.label.clone());
        Self {
            label: raw.label,
            kind,
            detail: raw.detail,
            documentation: raw.documentation,
            insert_text,
            sort_text: raw.sort_text,
        }
    }
}

/// Drops suggestions whose label contains a blacklisted term, ignoring case
/// on both sides.
pub fn filter_suggestions(raw: Vec<RawSuggestion>, blacklist: &[String]) -> Vec<CompletionItem> {
    let terms: Vec<String> = blacklist.iter().map(|term| term.to_lowercase()).collect();
    raw.into_iter()
        .filter(|suggestion| {
            let label = suggestion.label.to_lowercase();
            !terms.iter().any(|term| label.contains(term.as_str()))
        })
        .map(CompletionItem::from_raw)
        .collect()
}

/// Returns true when `line_prefix` ends inside an unterminated string literal.
///
/// Counts unescaped quotes of each kind; a backslash toggles escaping and the
/// escape resets after any other character.
#[must_use]
pub fn is_inside_string(line_prefix: &str) -> bool {
    let mut single_quotes = 0usize;
    let mut double_quotes = 0usize;
    let mut escaped = false;

    for ch in line_prefix.chars() {
        if ch == '\\' {
            escaped = !escaped;
            continue;
        }
        if !escaped {
            match ch {
                '\'' => single_quotes += 1,
                '"' => double_quotes += 1,
                _ => {}
            }
        }
        escaped = false;
    }

    single_quotes % 2 == 1 || double_quotes % 2 == 1
}

/// Text around the cursor a completion request is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    /// Everything from the start of the buffer up to the cursor.
    pub text_before_cursor: String,
    /// The cursor line up to the cursor.
    pub line_prefix: String,
}

/// Splits `code` at a 1-based cursor position. Columns past the end of the
/// line clamp to it; a line past the end of the buffer yields `None`.
pub fn completion_context(code: &str, position: Position) -> Option<CompletionContext> {
    let line_index = usize::try_from(position.line_number).ok()?.checked_sub(1)?;
    let column = usize::try_from(position.column.max(1) - 1).unwrap_or(usize::MAX);

    let mut text_before_cursor = String::new();
    for (index, line) in code.split('\n').enumerate() {
        if index < line_index {
            text_before_cursor.push_str(line);
            text_before_cursor.push('\n');
            continue;
        }

        let line_prefix: String = line.chars().take(column).collect();
        text_before_cursor.push_str(&line_prefix);
        return Some(CompletionContext {
            text_before_cursor,
            line_prefix,
        });
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("completion request superseded by a newer one")]
    Superseded,

    #[error("completion request timed out")]
    TimedOut,

    #[error("completion channel closed")]
    Closed,
}

pub type CompletionResult = Result<Vec<CompletionItem>, CompletionError>;

/// Where the outcome of one completion request is delivered.
pub type CompletionReply = oneshot::Sender<CompletionResult>;

/// Receiving end of a completion request.
#[derive(Debug)]
pub struct CompletionTicket {
    receiver: oneshot::Receiver<CompletionResult>,
}

impl CompletionTicket {
    pub fn channel() -> (CompletionReply, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }

    pub async fn resolve(self) -> CompletionResult {
        self.receiver.await.unwrap_or(Err(CompletionError::Closed))
    }

    /// Returns the outcome if it has already been delivered.
    pub fn try_resolve(&mut self) -> Option<CompletionResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(CompletionError::Closed)),
        }
    }
}

#[derive(Debug)]
struct PendingCompletion {
    request_id: RequestId,
    deadline: Option<Instant>,
    reply: CompletionReply,
}

#[derive(Debug)]
pub struct CompletionBroker {
    blacklist: Vec<String>,
    timeout: Option<Duration>,
    next_request_id: RequestId,
    pending: Option<PendingCompletion>,
}

impl CompletionBroker {
    pub fn new(blacklist: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            blacklist,
            timeout,
            next_request_id: 1,
            pending: None,
        }
    }

    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending.as_ref().map(|pending| pending.request_id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().and_then(|pending| pending.deadline)
    }

    pub fn request(
        &mut self,
        code: &str,
        position: Position,
        now: Instant,
        outbox: &mut dyn Outbox,
    ) -> Result<CompletionTicket, TransportError> {
        let (reply, ticket) = CompletionTicket::channel();
        self.request_into(code, position, now, outbox, reply)?;
        Ok(ticket)
    }

    /// Starts a request whose outcome goes to `reply`.
    ///
    /// Inside a string literal, or past the end of the buffer, `reply`
    /// receives an empty list at once and nothing is sent.
    pub fn request_into(
        &mut self,
        code: &str,
        position: Position,
        now: Instant,
        outbox: &mut dyn Outbox,
        reply: CompletionReply,
    ) -> Result<(), TransportError> {
        let context = match completion_context(code, position) {
            Some(context) if !is_inside_string(&context.line_prefix) => context,
            _ => {
                let _ = reply.send(Ok(Vec::new()));
                return Ok(());
            }
        };

        self.resolve_pending(Err(CompletionError::Superseded));

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let sent = outbox.send(OutboundMessage::Completion {
            request_id,
            text: context.text_before_cursor,
            position,
        });
        if let Err(error) = sent {
            let _ = reply.send(Err(CompletionError::Closed));
            return Err(error);
        }

        debug!(request_id, "completion requested");
        self.pending = Some(PendingCompletion {
            request_id,
            deadline: self.timeout.map(|timeout| now + timeout),
            reply,
        });
        Ok(())
    }

    /// Applies a `completion_result`. Returns false when it was stale.
    ///
    /// A result without a request id answers whatever request is current.
    pub fn on_result(
        &mut self,
        request_id: Option<RequestId>,
        suggestions: Vec<RawSuggestion>,
    ) -> bool {
        let Some(current) = self.pending_request() else {
            debug!(?request_id, "completion result with no request pending; dropped");
            return false;
        };
        if request_id.is_some_and(|id| id != current) {
            debug!(?request_id, current, "stale completion result; dropped");
            return false;
        }

        let items = filter_suggestions(suggestions, &self.blacklist);
        self.resolve_pending(Ok(items));
        true
    }

    /// Fails the pending request if its deadline has passed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let expired = self
            .pending
            .as_ref()
            .and_then(|pending| pending.deadline)
            .is_some_and(|deadline| deadline <= now);
        if expired {
            debug!(request_id = ?self.pending_request(), "completion request timed out");
            self.resolve_pending(Err(CompletionError::TimedOut));
        }
        expired
    }

    /// Fails the pending request because no answer can arrive any more.
    pub fn close(&mut self) {
        self.resolve_pending(Err(CompletionError::Closed));
    }

    fn resolve_pending(&mut self, result: CompletionResult) {
        if let Some(pending) = self.pending.take() {
            // The requester may have stopped waiting.
            let _ = pending.reply.send(result);
        }
    }
}
