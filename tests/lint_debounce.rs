mod support;

use std::time::Duration;

use console_protocol::OutboundMessage;
use console_transport_mock::{MockExecutionServer, ScriptedTransport};
use exec_console::{Console, ConsoleConfig, ConsoleNotice, ConsoleRuntime, LintScheduler, Transcript};
use tokio::time::Instant;

#[test]
fn edits_within_the_window_send_one_lint_with_the_last_code() {
    let start = Instant::now();
    let mut scheduler = LintScheduler::new(Duration::from_millis(500));
    let mut outbox: Vec<OutboundMessage> = Vec::new();

    let edits = ["d", "de", "def", "def f(", "def f():"];
    for (index, code) in edits.iter().enumerate() {
        let now = start + Duration::from_millis(450 * index as u64);
        scheduler
            .fire_due(now, &mut outbox)
            .expect("vec outbox accepts");
        scheduler.on_change(code, now);
    }

    let quiet = start + Duration::from_millis(450 * 4) + Duration::from_millis(500);
    scheduler
        .fire_due(quiet, &mut outbox)
        .expect("vec outbox accepts");

    assert_eq!(
        outbox,
        vec![OutboundMessage::Lint {
            code: "def f():".to_string()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn lint_result_reaches_the_host_as_diagnostics() {
    let (transport, script) = ScriptedTransport::with_server(MockExecutionServer::new());
    let console = Console::new(&ConsoleConfig::default(), Transcript::new());
    let (runtime, handle, mut notices) = ConsoleRuntime::new(console, transport);

    let driver = async {
        handle.set_code("print((1)").expect("runtime alive");
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.set_code("print((1)").expect("runtime alive");

        let report = loop {
            match notices.recv().await {
                Some(ConsoleNotice::Diagnostics(report)) => break report,
                Some(_) => continue,
                None => panic!("runtime stopped before diagnostics arrived"),
            }
        };
        handle.shutdown().expect("runtime alive");
        report
    };
    let (console, report) = tokio::join!(runtime.run(), driver);

    assert!(!report.valid);
    assert_eq!(report.line, Some(1));
    assert_eq!(console.diagnostics(), Some(&report));
    let lints: Vec<OutboundMessage> = script
        .sent()
        .into_iter()
        .filter(|message| matches!(message, OutboundMessage::Lint { .. }))
        .collect();
    assert_eq!(
        lints,
        vec![OutboundMessage::Lint {
            code: "print((1)".to_string()
        }]
    );
}
