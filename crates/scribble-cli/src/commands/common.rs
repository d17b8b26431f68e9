use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use scribble_core::config::ClientConfig;
use scribble_core::models::{
    BinaryFiles, ElementSet, LocalDocumentSnapshot, LocalFolderSnapshot,
};
use scribble_core::network::{ConnectivityProbe, HttpProbe, NetworkMonitor};
use scribble_core::remote::{PostgrestClient, PostgrestConfig};
use scribble_core::services::{DatabaseService, SyncStatus, Workspace};
use scribble_core::state::SyncState;
use scribble_core::sync::{SkipReason, SyncOutcome};
use scribble_core::PendingChange;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

pub const ENV_DB_PATH: &str = "SCRIBBLE_DB_PATH";

pub type CliWorkspace = Workspace<Option<PostgrestClient>>;

/// Resolved inputs shared by every command
pub struct CliContext {
    pub db_path: PathBuf,
    pub config: ClientConfig,
}

impl CliContext {
    pub fn from_env(cli_db_path: Option<PathBuf>) -> Result<Self, CliError> {
        Ok(Self {
            db_path: resolve_db_path(cli_db_path),
            config: ClientConfig::from_env()?,
        })
    }
}

/// An opened workspace plus the probe used to decide connectivity
pub struct Session {
    pub workspace: CliWorkspace,
    pub probe: Option<HttpProbe>,
}

pub async fn open_session(context: &CliContext) -> Result<Session, CliError> {
    let db = DatabaseService::open_path(&context.db_path).await?;
    let remote = build_remote(&context.config)?;

    let probe = match context.config.resolved_health_url() {
        Some(url) if remote.is_some() => Some(HttpProbe::new(url, context.config.timings.probe_timeout)?),
        _ => None,
    };
    let online = match &probe {
        Some(probe) => probe.probe().await,
        None => false,
    };
    if remote.is_some() && !online {
        tracing::info!("Remote service unreachable; working offline");
    }

    let monitor = NetworkMonitor::new(online, context.config.timings.reconnect_window);
    let workspace = Workspace::open(db, Arc::new(remote), monitor).await?;
    Ok(Session { workspace, probe })
}

fn build_remote(config: &ClientConfig) -> Result<Option<PostgrestClient>, CliError> {
    if !config.is_remote_configured() {
        return Ok(None);
    }
    let postgrest = PostgrestConfig::try_from(config).map_err(scribble_core::Error::from)?;
    let client = PostgrestClient::new(postgrest).map_err(scribble_core::Error::from)?;
    Ok(Some(client))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scribble")
        .join("scribble.db")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ElementsFile {
    Bare(ElementSet),
    Scene {
        elements: ElementSet,
        #[serde(default)]
        files: Option<BinaryFiles>,
    },
}

/// Parse drawing content: either a bare element array or a scene object
pub fn parse_elements(raw: &str) -> Result<(ElementSet, Option<BinaryFiles>), CliError> {
    match serde_json::from_str::<ElementsFile>(raw) {
        Ok(ElementsFile::Bare(elements)) => Ok((elements, None)),
        Ok(ElementsFile::Scene { elements, files }) => Ok((elements, files)),
        Err(error) => Err(CliError::InvalidElements(error.to_string())),
    }
}

pub fn read_elements_file(path: &Path) -> Result<(ElementSet, Option<BinaryFiles>), CliError> {
    let raw = std::fs::read_to_string(path)?;
    parse_elements(&raw)
}

pub fn normalize_value(value: &str, field: &'static str) -> Result<String, CliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyValue(field))
    } else {
        Ok(trimmed.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct QueueItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub created_at: i64,
    pub created_at_iso: String,
    pub description: String,
}

pub fn change_to_item(change: &PendingChange) -> QueueItem {
    QueueItem {
        id: change.id.to_string(),
        kind: change.kind.type_name(),
        created_at: change.created_at,
        created_at_iso: format_sync_timestamp(change.created_at),
        description: change.kind.describe(),
    }
}

/// Queued changes in the order a sync pass replays them
pub fn replay_order(mut changes: Vec<PendingChange>) -> Vec<PendingChange> {
    changes.sort_by_key(|change| change.created_at);
    changes
}

pub fn format_change_lines(changes: &[PendingChange]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    changes
        .iter()
        .map(|change| {
            let id = change.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let relative_time = format_relative_time(change.created_at, now_ms);
            format!(
                "{short_id:<13}  {:<13}  {relative_time:<10}  {}",
                change.kind.type_name(),
                change.kind.describe()
            )
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: SyncState,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub last_sync_attempt_iso: Option<String>,
    pub remote_configured: bool,
    pub db_path: String,
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    let connectivity = if report.status.is_online {
        "online"
    } else if report.remote_configured {
        "offline"
    } else {
        "offline (no remote configured)"
    };
    let last_attempt = report.status.last_sync_attempt.map_or_else(
        || "never".to_string(),
        |timestamp| {
            format!(
                "{} ({})",
                format_sync_timestamp(timestamp),
                format_relative_time(timestamp, now_ms)
            )
        },
    );

    vec![
        format!("State:             {}", report.state.label()),
        format!("Connectivity:      {connectivity}"),
        format!("Pending changes:   {}", report.status.pending_changes_count),
        format!("Last sync attempt: {last_attempt}"),
        format!("Database:          {}", report.db_path),
    ]
}

pub fn format_outcome(outcome: &SyncOutcome, pending: usize) -> String {
    match outcome {
        SyncOutcome::Completed(summary) => summary.message(),
        SyncOutcome::Skipped { reason } => match reason {
            SkipReason::Empty => "No pending changes to sync".to_string(),
            SkipReason::AlreadyRunning => "Sync already in progress".to_string(),
            SkipReason::Offline => format!("Offline; {pending} change(s) remain queued"),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct PageView {
    pub id: String,
    pub name: String,
    pub element_count: usize,
    pub updated_at: i64,
    pub updated_at_iso: String,
    pub elements: ElementSet,
}

pub fn page_to_view(snapshot: &LocalDocumentSnapshot) -> PageView {
    PageView {
        id: snapshot.id.to_string(),
        name: snapshot.name.clone(),
        element_count: snapshot.elements.len(),
        updated_at: snapshot.updated_at,
        updated_at_iso: format_sync_timestamp(snapshot.updated_at),
        elements: snapshot.elements.clone(),
    }
}

#[derive(Debug, Serialize)]
pub struct PageListItem {
    pub id: String,
    pub name: String,
    pub element_count: usize,
    pub updated_at: i64,
    pub updated_at_iso: String,
}

pub fn page_to_list_item(snapshot: &LocalDocumentSnapshot) -> PageListItem {
    PageListItem {
        id: snapshot.id.to_string(),
        name: snapshot.name.clone(),
        element_count: snapshot.elements.len(),
        updated_at: snapshot.updated_at,
        updated_at_iso: format_sync_timestamp(snapshot.updated_at),
    }
}

pub fn format_page_lines(pages: &[LocalDocumentSnapshot], now_ms: i64) -> Vec<String> {
    pages
        .iter()
        .map(|page| {
            format!(
                "{:<36}  {:>5} el  {:<10}  {}",
                page.id.as_str(),
                page.elements.len(),
                format_relative_time(page.updated_at, now_ms),
                page.name
            )
        })
        .collect()
}

pub fn format_folder_lines(folders: &[LocalFolderSnapshot], now_ms: i64) -> Vec<String> {
    let mut sorted: Vec<&LocalFolderSnapshot> = folders.iter().collect();
    sorted.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    sorted
        .into_iter()
        .map(|folder| {
            format!(
                "{:<36}  {:<10}  {}",
                folder.id.as_str(),
                format_relative_time(folder.updated_at, now_ms),
                folder.name
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
