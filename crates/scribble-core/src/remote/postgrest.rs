//! PostgREST client for the `draw` and `folders` tables.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{FolderRow, PageElements, PageRow, RemoteError, RemoteResult, RemoteStore};
use crate::config::{ClientConfig, PageLimit};
use crate::models::{FolderCreate, FolderRename, PageCreate, PageId, PageUpdate};
use crate::util::{compact_text, now_ms, ms_to_rfc3339};

const PAGES_TABLE: &str = "draw";
const FOLDERS_TABLE: &str = "folders";
const FOLDER_COLUMNS: &str = "folder_id,name,icon,created_at,updated_at,user_id";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const NO_ROWS_CODE: &str = "PGRST116";

/// Connection settings for the PostgREST endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct PostgrestConfig {
    pub base_url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub page_limit: Option<PageLimit>,
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PostgrestConfig")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("user_id", &self.user_id)
            .field("user_email", &self.user_email)
            .field("page_limit", &self.page_limit)
            .finish()
    }
}

impl TryFrom<&ClientConfig> for PostgrestConfig {
    type Error = RemoteError;

    fn try_from(config: &ClientConfig) -> RemoteResult<Self> {
        let base_url = config
            .supabase_url
            .clone()
            .ok_or(RemoteError::NotConfigured("Supabase URL is missing"))?;
        let anon_key = config
            .supabase_anon_key
            .clone()
            .ok_or(RemoteError::NotConfigured("Supabase anon key is missing"))?;

        Ok(Self {
            base_url,
            anon_key,
            access_token: config.access_token.clone(),
            user_id: config.user_id.clone(),
            user_email: config.user_email.clone(),
            page_limit: config.page_limit.clone(),
        })
    }
}

/// `RemoteStore` backed by a Supabase/PostgREST endpoint
#[derive(Clone)]
pub struct PostgrestClient {
    rest_url: String,
    config: PostgrestConfig,
    client: Client,
}

impl PostgrestClient {
    pub fn new(config: PostgrestConfig) -> RemoteResult<Self> {
        let rest_url = normalize_rest_url(&config.base_url)?;
        if config.anon_key.trim().is_empty() {
            return Err(RemoteError::NotConfigured("Supabase anon key must not be empty"));
        }

        Ok(Self {
            rest_url,
            config,
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.anon_key);
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    fn owner_id(&self) -> RemoteResult<&str> {
        self.config
            .user_id
            .as_deref()
            .ok_or(RemoteError::NotConfigured("user id is required to insert rows"))
    }

    /// Send a request that returns a representation and expect exactly one row.
    async fn single_row<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: impl FnOnce() -> String,
    ) -> RemoteResult<T> {
        let response = self
            .authorized(request)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<T> = read_json(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(what()))
    }

    async fn count_active_pages(&self, owner_id: &str) -> RemoteResult<u64> {
        let response = self
            .authorized(self.client.head(self.table_url(PAGES_TABLE)))
            .query(&[
                ("select", "page_id".to_string()),
                ("user_id", format!("eq.{owner_id}")),
                ("is_deleted", "eq.false".to_string()),
            ])
            .header("Prefer", "count=exact")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                RemoteError::InvalidPayload("count response had no Content-Range total".to_string())
            })
    }

    async fn enforce_page_limit(&self, owner_id: &str) -> RemoteResult<()> {
        let Some(limit) = &self.config.page_limit else {
            return Ok(());
        };
        if !limit.applies_to(self.config.user_email.as_deref()) {
            return Ok(());
        }

        let count = self.count_active_pages(owner_id).await?;
        if count >= u64::from(limit.max_pages) {
            return Err(RemoteError::LimitReached {
                limit: limit.max_pages,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PageUpdateBody<'a> {
    name: &'a str,
    page_elements: PageElements,
    updated_at: String,
}

#[derive(Debug, Serialize)]
struct PageInsertBody<'a> {
    user_id: &'a str,
    folder_id: &'a str,
    name: &'a str,
    page_elements: PageElements,
}

#[derive(Debug, Serialize)]
struct FolderUpdateBody<'a> {
    name: &'a str,
    updated_at: String,
}

#[derive(Debug, Serialize)]
struct FolderInsertBody<'a> {
    user_id: &'a str,
    name: &'a str,
}

impl RemoteStore for PostgrestClient {
    async fn update_page(&self, update: &PageUpdate) -> RemoteResult<PageRow> {
        let body = PageUpdateBody {
            name: &update.name,
            page_elements: PageElements {
                elements: update.elements.clone(),
                files: update.files.clone(),
            },
            updated_at: ms_to_rfc3339(now_ms()),
        };
        let request = self
            .client
            .patch(self.table_url(PAGES_TABLE))
            .query(&[("page_id", format!("eq.{}", update.page_id))])
            .json(&body);

        self.single_row(request, || format!("page {}", update.page_id))
            .await
    }

    async fn create_page(&self, create: &PageCreate) -> RemoteResult<PageRow> {
        let owner_id = self.owner_id()?;
        self.enforce_page_limit(owner_id).await?;

        let body = PageInsertBody {
            user_id: owner_id,
            folder_id: create.folder_id.as_str(),
            name: &create.name,
            page_elements: PageElements {
                elements: create.elements.clone().unwrap_or_default(),
                files: None,
            },
        };
        let request = self.client.post(self.table_url(PAGES_TABLE)).json(&body);

        self.single_row(request, || {
            format!("inserted page in folder {}", create.folder_id)
        })
        .await
    }

    async fn rename_folder(&self, rename: &FolderRename) -> RemoteResult<FolderRow> {
        let body = FolderUpdateBody {
            name: &rename.name,
            updated_at: ms_to_rfc3339(now_ms()),
        };
        let request = self
            .client
            .patch(self.table_url(FOLDERS_TABLE))
            .query(&[
                ("folder_id", format!("eq.{}", rename.folder_id)),
                ("select", FOLDER_COLUMNS.to_string()),
            ])
            .json(&body);

        self.single_row(request, || format!("folder {}", rename.folder_id))
            .await
    }

    async fn create_folder(&self, create: &FolderCreate) -> RemoteResult<FolderRow> {
        let body = FolderInsertBody {
            user_id: self.owner_id()?,
            name: &create.name,
        };
        let request = self
            .client
            .post(self.table_url(FOLDERS_TABLE))
            .query(&[("select", FOLDER_COLUMNS)])
            .json(&body);

        self.single_row(request, || format!("inserted folder {:?}", create.name))
            .await
    }

    async fn fetch_page(&self, page_id: &PageId) -> RemoteResult<Option<PageRow>> {
        let response = self
            .authorized(self.client.get(self.table_url(PAGES_TABLE)))
            .query(&[
                ("page_id", format!("eq.{page_id}")),
                ("is_deleted", "eq.false".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<PageRow> = match read_json(response).await {
            Ok(rows) => rows,
            Err(error) if error.is_terminal() => return Ok(None),
            Err(error) => return Err(error),
        };
        Ok(rows.into_iter().next())
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

async fn read_json<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json::<T>().await?)
}

async fn api_error(response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    parse_api_error(status, &body)
}

fn parse_api_error(status: StatusCode, body: &str) -> RemoteError {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        let message = payload
            .message
            .or(payload.details)
            .or(payload.hint)
            .map(|message| message.trim().to_string());

        if payload.code.as_deref() == Some(NO_ROWS_CODE) || status == StatusCode::NOT_FOUND {
            return RemoteError::NotFound(message.unwrap_or_else(|| "no rows".to_string()));
        }
        if let Some(message) = message {
            return RemoteError::Api {
                status: status.as_u16(),
                message,
            };
        }
    }

    let trimmed = compact_text(body);
    RemoteError::Api {
        status: status.as_u16(),
        message: if trimmed.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            trimmed
        },
    }
}

fn normalize_rest_url(url: &str) -> RemoteResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(RemoteError::NotConfigured("Supabase URL must not be empty"));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(RemoteError::NotConfigured(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/rest/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/rest/v1"))
    }
}

/// Extract the total from a `Content-Range` header such as `0-9/42` or `*/0`.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}
