//! Terminal rendering of session notifications.

use std::io::Write;

use futures::{Stream, StreamExt};
use shared::{
    domain::SessionState,
    protocol::{LoadProgress, SessionEvent},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::debug;

const BAR_WIDTH: usize = 24;

pub fn render_progress(progress: &LoadProgress) -> String {
    let percent = progress.percent();
    let filled = (usize::from(percent) * BAR_WIDTH) / 100;
    format!(
        "[{}{}] {:>3}% {}",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        percent,
        progress.text
    )
}

/// Status line for an event. Results go to stdout from the caller, so they
/// render nothing here.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged { state, status, .. } => {
            let marker = match state {
                SessionState::Ready => "●",
                SessionState::LoadFailed => "✖",
                _ => "○",
            };
            Some(format!("{marker} {status}"))
        }
        SessionEvent::Failed { message, .. } => Some(format!("✖ {message}")),
        SessionEvent::PromptGenerated { .. } => None,
    }
}

/// Renders events and load progress to `out` until both sources close,
/// which happens once the controller that owns them is dropped.
pub fn spawn<W>(
    mut events: broadcast::Receiver<SessionEvent>,
    progress: impl Stream<Item = LoadProgress> + Send + Unpin + 'static,
    mut out: W,
) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    let mut progress = progress.fuse();
    tokio::spawn(async move {
        let mut events_open = true;
        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Ok(event) => {
                        if let Some(line) = render_event(&event) {
                            emit(&mut out, &line);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "presenter: lagged behind session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                Some(report) = progress.next() => {
                    if !report.text.is_empty() {
                        emit(&mut out, &render_progress(&report));
                    }
                }
                else => break,
            }
        }
        debug!("presenter: session closed");
    })
}

fn emit(out: &mut impl Write, line: &str) {
    if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
        debug!(error = %err, "presenter: write failed");
    }
}

#[cfg(test)]
#[path = "tests/presenter_tests.rs"]
mod tests;
