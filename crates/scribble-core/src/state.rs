//! Shared cross-platform state types.

use serde::Serialize;

use crate::services::SyncStatus;
use crate::sync::{SummaryStatus, SyncSummary};

/// Unified sync indicator used by every front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Offline,
    Syncing,
    /// Online with changes still waiting
    Pending,
    Synced,
    Error,
}

impl SyncState {
    /// Derive the indicator from the current status and the most recent pass
    #[must_use]
    pub fn from_status(status: &SyncStatus, last_summary: Option<&SyncSummary>) -> Self {
        if !status.is_online {
            return Self::Offline;
        }
        if status.is_syncing {
            return Self::Syncing;
        }
        if status.pending_changes_count == 0 {
            return Self::Synced;
        }
        match last_summary.map(SyncSummary::status) {
            Some(SummaryStatus::Failed | SummaryStatus::PartiallySucceeded) => Self::Error,
            _ => Self::Pending,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}
