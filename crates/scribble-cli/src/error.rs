use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] scribble_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),
    #[error("Invalid elements file: {0}")]
    InvalidElements(String),
    #[error("Page not found locally: {0}")]
    PageNotFound(String),
    #[error(
        "Sync is not configured. Set SCRIBBLE_SUPABASE_URL and SCRIBBLE_SUPABASE_ANON_KEY to enable `scribble sync`."
    )]
    SyncNotConfigured,
}
