use std::io::{self, Write};

use exec_console::ConsoleNotice;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::app::{describe_completions, describe_help, HostAction, HostApp};

/// Feeds `input` lines to the console and reports notices on `status` until
/// `/quit`, end of input, or the runtime stopping.
///
/// Runs on the same task as the console runtime, so it never blocks.
pub async fn run_host<R, W>(
    mut app: HostApp,
    input: R,
    mut notices: UnboundedReceiver<ConsoleNotice>,
    mut status: W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut notices_open = true;

    loop {
        tokio::select! {
            biased;

            notice = notices.recv(), if notices_open => match notice {
                Some(notice) => report(&mut app, notice, &mut status)?,
                None => notices_open = false,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // The runtime may already be gone.
                    let _ = app.handle().shutdown();
                    break;
                };

                match app.on_line(&line) {
                    Ok(HostAction::Continue) => {}
                    Ok(HostAction::Print(text)) => writeln!(status, "{text}")?,
                    Ok(HostAction::Complete(position)) => {
                        let result = app.handle().complete(position).await;
                        writeln!(status, "{}", describe_completions(&result))?;
                    }
                    Ok(HostAction::Explain) => {
                        let help = app.handle().help().await.map_err(io::Error::other)?;
                        writeln!(status, "{}", describe_help(help.as_ref()))?;
                    }
                    Ok(HostAction::Quit) | Err(_) => break,
                }
            }
        }
    }

    while let Some(notice) = notices.recv().await {
        report(&mut app, notice, &mut status)?;
    }
    status.flush()
}

fn report<W: Write>(app: &mut HostApp, notice: ConsoleNotice, status: &mut W) -> io::Result<()> {
    if let Some(text) = app.on_notice(notice) {
        writeln!(status, "{text}")?;
    }
    Ok(())
}
