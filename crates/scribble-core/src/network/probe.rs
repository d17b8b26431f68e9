//! Active connectivity probes

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderValue, CACHE_CONTROL};

use crate::remote::RemoteError;
use crate::Result;

/// Something that can tell whether the remote service is reachable
pub trait ConnectivityProbe: Send + Sync + 'static {
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// `HEAD` request against a health URL; any HTTP response counts as reachable
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RemoteError::from)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match self
            .client
            .head(&self.url)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await
        {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!("Connectivity probe to {} failed: {}", self.url, error);
                false
            }
        }
    }
}
