//! Scribble CLI - offline-first drawing notebook from the terminal
//!
//! Edits land in the local mirror first and are queued whenever the remote
//! service is unreachable; `scribble sync` and `scribble watch` push them.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, FolderCommands, PageCommands, QueueCommands};
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::folder::{run_folder_create, run_folder_list, run_folder_rename};
use crate::commands::page::{run_page_create, run_page_list, run_page_save, run_page_show};
use crate::commands::queue::{run_queue_clear, run_queue_list};
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "scribble=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let context = CliContext::from_env(cli.db_path)?;

    match cli.command {
        Commands::Status { json } => run_status(json, &context).await?,
        Commands::Sync => run_sync(&context).await?,
        Commands::Queue { command } => match command {
            QueueCommands::List { json } => run_queue_list(json, &context).await?,
            QueueCommands::Clear => run_queue_clear(&context).await?,
        },
        Commands::Page { command } => match command {
            PageCommands::List { json } => run_page_list(json, &context).await?,
            PageCommands::Show { id, json } => run_page_show(&id, json, &context).await?,
            PageCommands::Save {
                id,
                name,
                elements_file,
            } => run_page_save(&id, &name, elements_file.as_deref(), &context).await?,
            PageCommands::Create {
                folder,
                name,
                elements_file,
            } => run_page_create(&folder, &name, elements_file.as_deref(), &context).await?,
        },
        Commands::Folder { command } => match command {
            FolderCommands::List { json } => run_folder_list(json, &context).await?,
            FolderCommands::Create { name } => run_folder_create(&name, &context).await?,
            FolderCommands::Rename { id, name } => run_folder_rename(&id, &name, &context).await?,
        },
        Commands::Watch => run_watch(&context).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
