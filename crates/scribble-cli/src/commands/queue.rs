use crate::commands::common::{
    change_to_item, format_change_lines, open_session, replay_order, CliContext, QueueItem,
};
use crate::error::CliError;

pub async fn run_queue_list(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let session = open_session(context).await?;
    let changes = replay_order(session.workspace.queue().snapshot().await);

    if as_json {
        let json_items = changes
            .iter()
            .map(change_to_item)
            .collect::<Vec<QueueItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if changes.is_empty() {
        println!("No pending changes.");
        return Ok(());
    }

    for line in format_change_lines(&changes) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_queue_clear(context: &CliContext) -> Result<(), CliError> {
    let session = open_session(context).await?;
    let count = session.workspace.queue().count().await;
    session.workspace.queue().clear().await?;
    println!("Dropped {count} pending change(s)");
    Ok(())
}
