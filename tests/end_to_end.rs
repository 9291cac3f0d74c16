mod support;

use console_protocol::{OutboundMessage, TransportEvent, CANCELLED_BY_USER, NO_RUNNING_PROCESS};
use console_transport_mock::{MockExecutionServer, ScriptedTransport, MOCK_EXECUTION_TIME};
use exec_console::{
    CompletionKind, Console, ConsoleConfig, ConsoleHandle, ConsoleNotice, ConsoleRuntime,
    SessionState, Shortcut, Transcript,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc::UnboundedReceiver;

use support::at;

type Harness = (
    ConsoleRuntime<Transcript, ScriptedTransport>,
    ConsoleHandle,
    UnboundedReceiver<ConsoleNotice>,
    console_transport_mock::ScriptHandle,
);

fn harness(server: MockExecutionServer) -> Harness {
    let (transport, script) = ScriptedTransport::with_server(server);
    let console = Console::new(&ConsoleConfig::default(), Transcript::new());
    let (runtime, handle, notices) = ConsoleRuntime::new(console, transport);
    (runtime, handle, notices, script)
}

async fn wait_for_state(notices: &mut UnboundedReceiver<ConsoleNotice>, wanted: SessionState) {
    loop {
        match notices.recv().await {
            Some(ConsoleNotice::SessionChanged { state, .. }) if state == wanted => return,
            Some(_) => continue,
            None => panic!("runtime stopped before reaching {wanted:?}"),
        }
    }
}

async fn wait_for_help(notices: &mut UnboundedReceiver<ConsoleNotice>) {
    loop {
        match notices.recv().await {
            Some(ConsoleNotice::HelpAvailable(_)) => return,
            Some(_) => continue,
            None => panic!("runtime stopped before help was offered"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn interactive_program_round_trip() {
    let (runtime, handle, mut notices, script) = harness(MockExecutionServer::new());

    let driver = async {
        handle
            .set_code("name = input(\"Name:\")\nprint(\"Hello,\", name)")
            .expect("runtime alive");
        handle.shortcut(Shortcut::Run).expect("runtime alive");
        wait_for_state(&mut notices, SessionState::AwaitingInput).await;

        handle.submit_input("Ada").expect("runtime alive");
        wait_for_state(&mut notices, SessionState::Idle).await;
        handle.shutdown().expect("runtime alive");
    };
    let (console, ()) = tokio::join!(runtime.run(), driver);

    assert_eq!(
        console.sink().to_plain_text(),
        format!("--- Execution Started ---\nName: Ada\nHello, Ada\n{MOCK_EXECUTION_TIME}\n")
    );
    assert!(console.affordances().run_enabled);
    assert!(script
        .sent()
        .contains(&OutboundMessage::InputResponse {
            input: "Ada".to_string()
        }));
}

#[tokio::test(start_paused = true)]
async fn traceback_keeps_session_live_until_cancel() {
    let (runtime, handle, mut notices, script) = harness(MockExecutionServer::new());

    let driver = async {
        handle
            .set_code("raise ValueError(\"boom\")")
            .expect("runtime alive");
        handle.run().expect("runtime alive");
        wait_for_help(&mut notices).await;

        let help = handle
            .help()
            .await
            .expect("runtime alive")
            .expect("traceback latched");
        handle.cancel().expect("runtime alive");
        wait_for_state(&mut notices, SessionState::Idle).await;
        handle.shutdown().expect("runtime alive");
        help
    };
    let (console, help) = tokio::join!(runtime.run(), driver);

    assert!(help.error.starts_with("Traceback (most recent call last):"));
    assert!(help.error.contains("ValueError: boom"));
    assert_eq!(help.code, "raise ValueError(\"boom\")");
    assert!(console
        .sink()
        .to_plain_text()
        .ends_with(&format!("{NO_RUNNING_PROCESS}\n")));
    assert_eq!(script.sent().last(), Some(&OutboundMessage::CancelExecution));
}

#[tokio::test(start_paused = true)]
async fn syntax_error_ends_the_session_immediately() {
    let (runtime, handle, mut notices, _script) = harness(MockExecutionServer::new());

    let driver = async {
        handle.set_code("print(1").expect("runtime alive");
        handle.run().expect("runtime alive");
        wait_for_state(&mut notices, SessionState::Running).await;
        wait_for_state(&mut notices, SessionState::Idle).await;
        handle.shutdown().expect("runtime alive");
    };
    let (console, ()) = tokio::join!(runtime.run(), driver);

    let text = console.sink().to_plain_text();
    assert!(text.contains("Syntax Error: '(' was never closed"));
    assert!(text.contains("Line 1, Column 6"));
    assert_eq!(console.request_help(), None);
}

#[tokio::test(start_paused = true)]
async fn reconnect_during_hung_run_detaches_then_cancel_recovers() {
    let (runtime, handle, mut notices, script) = harness(MockExecutionServer::new());

    let driver = async {
        handle
            .set_code("while True:\n    pass")
            .expect("runtime alive");
        handle.run().expect("runtime alive");
        wait_for_state(&mut notices, SessionState::Running).await;

        script.push(TransportEvent::Disconnected);
        script.push(TransportEvent::Connected { resumed: true });
        wait_for_state(&mut notices, SessionState::Detached).await;

        handle.run().expect("runtime alive");
        handle.cancel().expect("runtime alive");
        wait_for_state(&mut notices, SessionState::Idle).await;
        handle.shutdown().expect("runtime alive");
    };
    let (console, ()) = tokio::join!(runtime.run(), driver);

    let executes = script
        .sent()
        .iter()
        .filter(|message| matches!(message, OutboundMessage::Execute { .. }))
        .count();
    assert_eq!(executes, 1);
    assert!(console
        .sink()
        .to_plain_text()
        .ends_with(&format!("{CANCELLED_BY_USER}\n")));
}

#[tokio::test(start_paused = true)]
async fn completion_round_trip_with_and_without_request_ids() {
    for server in [
        MockExecutionServer::new(),
        MockExecutionServer::new().without_request_ids(),
    ] {
        let (runtime, handle, _notices, _script) = harness(server);

        let driver = async {
            handle.set_code("pri").expect("runtime alive");
            let inside_code = handle.complete(at(1, 4)).await;
            handle.set_code("x = \"pri").expect("runtime alive");
            let inside_string = handle.complete(at(1, 9)).await;
            handle.shutdown().expect("runtime alive");
            (inside_code, inside_string)
        };
        let (_console, (inside_code, inside_string)) = tokio::join!(runtime.run(), driver);

        let items = inside_code.expect("completion resolves");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "print");
        assert_eq!(items[0].kind, CompletionKind::Function);
        assert_eq!(inside_string, Ok(Vec::new()));
    }
}
