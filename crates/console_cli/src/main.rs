use std::io;

use console_cli::app::HostApp;
use console_cli::host::run_host;
use console_cli::sink::TerminalSink;
use console_cli::transports;
use exec_console::{logging, Console, ConsoleConfig, ConsoleRuntime};
use tokio::io::BufReader;

#[tokio::main(flavor = "current_thread")]
async fn main() -> io::Result<()> {
    logging::init()?;

    let config = ConsoleConfig::from_env().map_err(io::Error::other)?;
    let transport = transports::transport_from_env().map_err(io::Error::other)?;
    tracing::info!(transport = transport.id(), "starting console");

    let console = Console::new(&config, TerminalSink::new(io::stdout()));
    let (runtime, handle, notices) = ConsoleRuntime::new(console, transport);
    let app = HostApp::new(handle);

    let input = BufReader::new(tokio::io::stdin());
    let (_console, hosted) = tokio::join!(runtime.run(), run_host(app, input, notices, io::stderr()));
    hosted
}
