use crate::commands::common::{format_outcome, open_session, CliContext};
use crate::error::CliError;

pub async fn run_sync(context: &CliContext) -> Result<(), CliError> {
    if !context.config.is_remote_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let session = open_session(context).await?;
    let outcome = session.workspace.manual_sync().await?;
    let pending = session.workspace.queue().count().await;
    println!("{}", format_outcome(&outcome, pending));
    Ok(())
}
