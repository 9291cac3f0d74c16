mod support;

use console_protocol::{InboundMessage, OutboundMessage, RawSuggestion, TransportEvent};
use exec_console::{
    filter_suggestions, CompletionBroker, CompletionError, CompletionKind, CompletionTicket,
    ConsoleConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;

use support::{at, console_with_code};

fn suggestion(label: &str) -> RawSuggestion {
    RawSuggestion {
        label: label.to_string(),
        kind: Some(json!(1)),
        detail: Some("function".to_string()),
        documentation: Some(format!("Built-in function {label}")),
        insert_text: Some(label.to_string()),
        sort_text: None,
    }
}

fn broker() -> CompletionBroker {
    let config = ConsoleConfig::default();
    CompletionBroker::new(config.completion_blacklist, config.completion_timeout)
}

#[test]
fn blacklisted_suggestions_are_filtered() {
    let blacklist = ConsoleConfig::default().completion_blacklist;

    let items = filter_suggestions(
        vec![
            suggestion("os.path.join"),
            suggestion("print"),
            suggestion("exec_stuff"),
            suggestion("len"),
        ],
        &blacklist,
    );

    let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
    assert_eq!(labels, vec!["print", "len"]);
    assert!(items.iter().all(|item| item.kind == CompletionKind::Function));
}

#[test]
fn cursor_inside_string_short_circuits() {
    let mut broker = broker();
    let mut outbox: Vec<OutboundMessage> = Vec::new();

    let mut ticket = broker
        .request("foo(\"bar, ", at(1, 11), Instant::now(), &mut outbox)
        .expect("vec outbox accepts");

    assert_eq!(ticket.try_resolve(), Some(Ok(Vec::new())));
    assert!(outbox.is_empty());

    broker
        .request("foo(\"bar\")", at(1, 11), Instant::now(), &mut outbox)
        .expect("vec outbox accepts");
    assert_eq!(outbox.len(), 1);
    assert!(matches!(outbox[0], OutboundMessage::Completion { .. }));
}

#[test]
fn stale_response_is_ignored_and_newer_request_wins() {
    let mut broker = broker();
    let mut outbox: Vec<OutboundMessage> = Vec::new();
    let now = Instant::now();

    let mut older = broker
        .request("pr", at(1, 3), now, &mut outbox)
        .expect("vec outbox accepts");
    let mut newer = broker
        .request("pri", at(1, 4), now, &mut outbox)
        .expect("vec outbox accepts");

    let ids: Vec<u64> = outbox
        .iter()
        .filter_map(|message| match message {
            OutboundMessage::Completion { request_id, .. } => Some(*request_id),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    assert_eq!(older.try_resolve(), Some(Err(CompletionError::Superseded)));
    assert!(!broker.on_result(Some(ids[0]), vec![suggestion("property")]));
    assert_eq!(newer.try_resolve(), None);

    assert!(broker.on_result(Some(ids[1]), vec![suggestion("print")]));
    let items = newer.try_resolve().expect("resolved").expect("ok");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].label, "print");
}

#[test]
fn console_sends_multiline_prefix_up_to_cursor() {
    let mut console = console_with_code("import math\nx = math.sq\nprint(x)");
    let mut outbox: Vec<OutboundMessage> = Vec::new();
    let (reply, mut ticket) = CompletionTicket::channel();

    console
        .request_completion(at(2, 12), Instant::now(), &mut outbox, reply)
        .expect("vec outbox accepts");

    let Some(OutboundMessage::Completion {
        request_id,
        text,
        position,
    }) = outbox.first().cloned()
    else {
        panic!("expected a completion request, got {outbox:?}");
    };
    assert_eq!(text, "import math\nx = math.sq");
    assert_eq!(position, at(2, 12));

    console.on_transport_event(TransportEvent::Message(InboundMessage::CompletionResult {
        request_id: Some(request_id),
        suggestions: vec![RawSuggestion {
            label: "sqrt".to_string(),
            kind: Some(json!("Function")),
            detail: None,
            documentation: None,
            insert_text: None,
            sort_text: None,
        }],
    }));

    let items = ticket.try_resolve().expect("resolved").expect("ok");
    assert_eq!(items[0].insert_text, "sqrt");
}
