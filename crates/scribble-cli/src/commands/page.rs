use std::path::Path;

use chrono::Utc;
use scribble_core::models::{FolderId, PageId};
use scribble_core::services::{CreateOutcome, EditOutcome};

use crate::commands::common::{
    format_page_lines, normalize_value, open_session, page_to_list_item, page_to_view,
    read_elements_file, CliContext, PageListItem,
};
use crate::error::CliError;

pub async fn run_page_list(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let session = open_session(context).await?;
    let pages = session.workspace.mirror().list_documents().await?;

    if as_json {
        let items = pages
            .iter()
            .map(page_to_list_item)
            .collect::<Vec<PageListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if pages.is_empty() {
        println!("No pages stored locally");
    } else {
        for line in format_page_lines(&pages, Utc::now().timestamp_millis()) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_page_show(id: &str, as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let page_id = PageId::new(normalize_value(id, "Page ID")?);
    let session = open_session(context).await?;
    let snapshot = session
        .workspace
        .refresh_page(&page_id)
        .await?
        .ok_or_else(|| CliError::PageNotFound(page_id.to_string()))?;

    let view = page_to_view(&snapshot);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}  {}", view.id, view.name);
        println!("{} element(s), updated {}", view.element_count, view.updated_at_iso);
    }
    Ok(())
}

pub async fn run_page_save(
    id: &str,
    name: &str,
    elements_file: Option<&Path>,
    context: &CliContext,
) -> Result<(), CliError> {
    let page_id = PageId::new(normalize_value(id, "Page ID")?);
    let name = normalize_value(name, "Page name")?;
    let session = open_session(context).await?;

    // Without a file only the name changes; keep the last known elements.
    let (elements, files) = match elements_file {
        Some(path) => read_elements_file(path)?,
        None => {
            let existing = session.workspace.open_page(&page_id).await?;
            (existing.map(|page| page.elements).unwrap_or_default(), None)
        }
    };

    let outcome = session
        .workspace
        .save_page(&page_id, elements, name, files)
        .await?;
    match outcome {
        EditOutcome::Synced => println!("Saved page {page_id}"),
        EditOutcome::Queued(change_id) => {
            println!("Saved page {page_id} locally; queued as {change_id}");
        }
    }
    Ok(())
}

pub async fn run_page_create(
    folder: &str,
    name: &str,
    elements_file: Option<&Path>,
    context: &CliContext,
) -> Result<(), CliError> {
    let folder_id = FolderId::new(normalize_value(folder, "Folder ID")?);
    let name = normalize_value(name, "Page name")?;
    let elements = elements_file
        .map(read_elements_file)
        .transpose()?
        .map(|(elements, _)| elements);

    let session = open_session(context).await?;
    match session
        .workspace
        .create_page(&folder_id, elements, name)
        .await?
    {
        CreateOutcome::Created(page_id) => println!("{page_id}"),
        CreateOutcome::Queued(change_id) => {
            println!("Offline; page creation queued as {change_id}");
        }
    }
    Ok(())
}
