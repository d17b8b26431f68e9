use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{open_session, CliContext};
use crate::error::CliError;

/// Probe connectivity and sync in the background until interrupted.
pub async fn run_watch(context: &CliContext) -> Result<(), CliError> {
    if !context.config.is_remote_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let session = open_session(context).await?;
    let workspace = &session.workspace;
    let mut summaries = workspace.subscribe_summaries();

    if let Some(probe) = session.probe {
        workspace.start(probe, context.config.timings);
    }

    let pending = workspace.queue().count().await;
    let connectivity = if workspace.monitor().is_online() {
        "online"
    } else {
        "offline"
    };
    println!("Watching ({connectivity}, {pending} pending); press Ctrl-C to stop");

    if workspace.monitor().is_online() && pending > 0 {
        workspace.manual_sync().await?;
    }

    loop {
        tokio::select! {
            summary = summaries.recv() => match summary {
                Ok(summary) => println!("{summary}"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} sync summaries", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    workspace.shutdown().await?;
    println!("Stopped");
    Ok(())
}
