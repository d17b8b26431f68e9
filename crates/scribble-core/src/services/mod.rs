//! Services shared by every front-end.

mod database;
mod workspace;

pub use database::DatabaseService;
pub use workspace::{CreateOutcome, EditOutcome, SyncStatus, Workspace};
