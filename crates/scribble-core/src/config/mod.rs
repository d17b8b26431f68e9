//! Client configuration.
//!
//! Provides `ClientConfig`, read from `SCRIBBLE_*` environment variables by
//! front-ends, and `SyncTimings`, the clocks that drive connectivity probing
//! and automatic sync.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const ENV_SUPABASE_URL: &str = "SCRIBBLE_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SCRIBBLE_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "SCRIBBLE_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "SCRIBBLE_USER_ID";
pub const ENV_USER_EMAIL: &str = "SCRIBBLE_USER_EMAIL";
pub const ENV_HEALTH_URL: &str = "SCRIBBLE_HEALTH_URL";
pub const ENV_MAX_PAGES_PER_USER: &str = "SCRIBBLE_MAX_PAGES_PER_USER";
pub const ENV_UNLIMITED_USERS: &str = "SCRIBBLE_UNLIMITED_USERS";
pub const ENV_PROBE_INTERVAL_SECS: &str = "SCRIBBLE_PROBE_INTERVAL_SECS";
pub const ENV_SYNC_INTERVAL_SECS: &str = "SCRIBBLE_SYNC_INTERVAL_SECS";

const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RECONNECT_WINDOW_MS: u64 = 1_000;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5 * 60;

/// Timers used by the network monitor and the sync scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimings {
    /// How often the monitor actively probes connectivity
    pub probe_interval: Duration,
    /// Timeout for a single probe round-trip
    pub probe_timeout: Duration,
    /// How long `just_reconnected` stays raised after a reconnect
    pub reconnect_window: Duration,
    /// Periodic sync cadence while online
    pub sync_interval: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            reconnect_window: Duration::from_millis(DEFAULT_RECONNECT_WINDOW_MS),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        }
    }
}

/// Per-user drawing cap enforced before inserting pages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimit {
    /// Maximum number of non-deleted pages per user
    pub max_pages: u32,
    /// Lowercased emails exempt from the cap
    pub unlimited_users: Vec<String>,
}

impl PageLimit {
    /// Whether the cap applies to the given user email
    #[must_use]
    pub fn applies_to(&self, email: Option<&str>) -> bool {
        email.map_or(true, |email| {
            let email = email.trim().to_ascii_lowercase();
            !self.unlimited_users.iter().any(|user| *user == email)
        })
    }
}

/// Everything a client needs to reach the remote service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the Supabase project (REST lives under `/rest/v1`)
    pub supabase_url: Option<String>,
    /// Public anon key sent as `apikey`
    pub supabase_anon_key: Option<String>,
    /// User access token; anon key is used as bearer when absent
    pub access_token: Option<String>,
    /// Owner id stamped on inserted rows
    pub user_id: Option<String>,
    /// Owner email, consulted by the drawing limit
    pub user_email: Option<String>,
    /// Connectivity probe target; defaults to the REST root
    pub health_url: Option<String>,
    /// Optional drawing cap
    pub page_limit: Option<PageLimit>,
    /// Probe/sync clocks
    pub timings: SyncTimings,
}

impl ClientConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| normalize_text_option(lookup(name));

        let supabase_url = read(ENV_SUPABASE_URL)
            .map(|url| normalize_http_url(&url, ENV_SUPABASE_URL))
            .transpose()?;
        let health_url = read(ENV_HEALTH_URL)
            .map(|url| normalize_http_url(&url, ENV_HEALTH_URL))
            .transpose()?;

        let page_limit = read(ENV_MAX_PAGES_PER_USER)
            .map(|raw| parse_positive(&raw, ENV_MAX_PAGES_PER_USER))
            .transpose()?
            .filter(|max_pages| *max_pages > 0)
            .map(|max_pages| PageLimit {
                max_pages: u32::try_from(max_pages).unwrap_or(u32::MAX),
                unlimited_users: parse_user_list(read(ENV_UNLIMITED_USERS).as_deref()),
            });

        let mut timings = SyncTimings::default();
        if let Some(raw) = read(ENV_PROBE_INTERVAL_SECS) {
            timings.probe_interval =
                Duration::from_secs(parse_positive(&raw, ENV_PROBE_INTERVAL_SECS)?);
        }
        if let Some(raw) = read(ENV_SYNC_INTERVAL_SECS) {
            timings.sync_interval =
                Duration::from_secs(parse_positive(&raw, ENV_SYNC_INTERVAL_SECS)?);
        }

        Ok(Self {
            supabase_url,
            supabase_anon_key: read(ENV_SUPABASE_ANON_KEY),
            access_token: read(ENV_ACCESS_TOKEN),
            user_id: read(ENV_USER_ID),
            user_email: read(ENV_USER_EMAIL),
            health_url,
            page_limit,
            timings,
        })
    }

    /// Whether the remote service can be reached with this configuration
    pub const fn is_remote_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }

    /// The URL probed for connectivity
    pub fn resolved_health_url(&self) -> Option<String> {
        self.health_url.clone().or_else(|| {
            self.supabase_url
                .as_ref()
                .map(|url| format!("{url}/rest/v1/"))
        })
    }
}

fn normalize_http_url(raw: &str, field: &str) -> Result<String> {
    if is_http_url(raw) {
        Ok(raw.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(format!(
            "{field} must include http:// or https://"
        )))
    }
}

fn parse_positive(raw: &str, field: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| Error::Config(format!("{field} must be a non-negative integer, got {raw:?}")))
}

/// Parse a comma-separated email list into trimmed lowercase entries.
pub fn parse_user_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(|email| email.trim().to_ascii_lowercase())
            .filter(|email| !email.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ClientConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        ClientConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_is_local_only() {
        let config = config_from(&[]).unwrap();
        assert!(!config.is_remote_configured());
        assert_eq!(config.timings, SyncTimings::default());
        assert_eq!(config.resolved_health_url(), None);
    }

    #[test]
    fn reads_and_normalizes_remote_settings() {
        let config = config_from(&[
            (ENV_SUPABASE_URL, " https://demo.supabase.co/ "),
            (ENV_SUPABASE_ANON_KEY, "anon"),
            (ENV_ACCESS_TOKEN, "   "),
            (ENV_SYNC_INTERVAL_SECS, "60"),
        ])
        .unwrap();

        assert!(config.is_remote_configured());
        assert_eq!(config.supabase_url.as_deref(), Some("https://demo.supabase.co"));
        assert_eq!(config.access_token, None);
        assert_eq!(config.timings.sync_interval, Duration::from_secs(60));
        assert_eq!(
            config.resolved_health_url().as_deref(),
            Some("https://demo.supabase.co/rest/v1/")
        );
    }

    #[test]
    fn rejects_url_without_scheme() {
        let error = config_from(&[(ENV_SUPABASE_URL, "demo.supabase.co")]).unwrap_err();
        assert!(error.to_string().contains("http:// or https://"));
    }

    #[test]
    fn rejects_non_numeric_interval() {
        let error = config_from(&[(ENV_PROBE_INTERVAL_SECS, "soon")]).unwrap_err();
        assert!(error.to_string().contains(ENV_PROBE_INTERVAL_SECS));
    }

    #[test]
    fn page_limit_exempts_unlimited_users() {
        let config = config_from(&[
            (ENV_MAX_PAGES_PER_USER, "3"),
            (ENV_UNLIMITED_USERS, "Admin@Example.com, ,ops@example.com"),
        ])
        .unwrap();

        let limit = config.page_limit.unwrap();
        assert_eq!(limit.max_pages, 3);
        assert_eq!(
            limit.unlimited_users,
            vec!["admin@example.com".to_string(), "ops@example.com".to_string()]
        );
        assert!(!limit.applies_to(Some("admin@example.com")));
        assert!(limit.applies_to(Some("someone@example.com")));
        assert!(limit.applies_to(None));
    }

    #[test]
    fn zero_page_limit_disables_cap() {
        let config = config_from(&[(ENV_MAX_PAGES_PER_USER, "0")]).unwrap();
        assert_eq!(config.page_limit, None);
    }
}
