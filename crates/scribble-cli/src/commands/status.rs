use scribble_core::state::SyncState;

use crate::commands::common::{
    format_status_lines, format_sync_timestamp, open_session, CliContext, StatusReport,
};
use crate::error::CliError;

pub async fn run_status(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let session = open_session(context).await?;
    let status = session.workspace.status().await;

    let report = StatusReport {
        state: SyncState::from_status(&status, None),
        last_sync_attempt_iso: status.last_sync_attempt.map(format_sync_timestamp),
        status,
        remote_configured: context.config.is_remote_configured(),
        db_path: context.db_path.display().to_string(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}
