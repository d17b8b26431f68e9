use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "scribble")]
#[command(about = "Offline-first drawing notebook, from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show connectivity and pending change counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push pending changes to the remote service now
    Sync,
    /// Inspect or clear the pending change queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// List, read and edit pages
    Page {
        #[command(subcommand)]
        command: PageCommands,
    },
    /// List, create and rename folders
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },
    /// Keep running: probe connectivity and sync automatically
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued changes in replay order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop every queued change
    Clear,
}

#[derive(Subcommand)]
pub enum PageCommands {
    /// List pages stored locally, most recently modified first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a page, refreshed from the remote when reachable
    Show {
        /// Page ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save page content
    Save {
        /// Page ID
        id: String,
        /// Page name
        #[arg(long)]
        name: String,
        /// JSON file with an element array or `{ "elements": [...], "files": {...} }`
        #[arg(long, value_name = "PATH")]
        elements_file: Option<PathBuf>,
    },
    /// Create a page in a folder
    Create {
        /// Folder ID
        #[arg(long, value_name = "ID")]
        folder: String,
        /// Page name
        #[arg(long, default_value = "Untitled")]
        name: String,
        /// JSON file with the initial elements
        #[arg(long, value_name = "PATH")]
        elements_file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum FolderCommands {
    /// List folders stored locally
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a folder
    Create {
        /// Folder name
        name: String,
    },
    /// Rename a folder
    Rename {
        /// Folder ID
        id: String,
        /// New folder name
        name: String,
    },
}
