use chrono::Utc;
use scribble_core::models::FolderId;
use scribble_core::services::{CreateOutcome, EditOutcome};

use crate::commands::common::{format_folder_lines, normalize_value, open_session, CliContext};
use crate::error::CliError;

pub async fn run_folder_list(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let session = open_session(context).await?;
    let folders = session.workspace.mirror().list_folders().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&folders)?);
    } else if folders.is_empty() {
        println!("No folders stored locally");
    } else {
        for line in format_folder_lines(&folders, Utc::now().timestamp_millis()) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_folder_create(name: &str, context: &CliContext) -> Result<(), CliError> {
    let name = normalize_value(name, "Folder name")?;
    let session = open_session(context).await?;
    match session.workspace.create_folder(name).await? {
        CreateOutcome::Created(folder_id) => println!("{folder_id}"),
        CreateOutcome::Queued(change_id) => {
            println!("Offline; folder creation queued as {change_id}");
        }
    }
    Ok(())
}

pub async fn run_folder_rename(id: &str, name: &str, context: &CliContext) -> Result<(), CliError> {
    let folder_id = FolderId::new(normalize_value(id, "Folder ID")?);
    let name = normalize_value(name, "Folder name")?;
    let session = open_session(context).await?;
    match session.workspace.rename_folder(&folder_id, name).await? {
        EditOutcome::Synced => println!("Renamed folder {folder_id}"),
        EditOutcome::Queued(change_id) => {
            println!("Renamed folder {folder_id} locally; queued as {change_id}");
        }
    }
    Ok(())
}
