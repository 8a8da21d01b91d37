//! reqwest-backed network access for probes and remote content.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use omniview_core::config::ViewerConfig;
use omniview_processing::traits::{NetworkFetch, ProbeResponse};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};

pub struct HttpFetch {
    client: reqwest::Client,
    probe_timeout: Duration,
    fetch_timeout: Duration,
}

impl HttpFetch {
    pub fn new(probe_timeout: Duration, fetch_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("omniview/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            probe_timeout,
            fetch_timeout,
        })
    }

    pub fn from_config(config: &ViewerConfig) -> Result<Self> {
        Self::new(config.probe_timeout, config.fetch_timeout)
    }
}

#[async_trait]
impl NetworkFetch for HttpFetch {
    #[tracing::instrument(skip(self))]
    async fn head(&self, url: &str) -> Result<ProbeResponse> {
        let response = self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .with_context(|| format!("HEAD request to {} failed", url))?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        Ok(ProbeResponse {
            status: response.status().as_u16(),
            content_type,
            content_length,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, url: &str, max_bytes: u64) -> Result<Bytes> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .with_context(|| format!("GET request to {} failed", url))?;

        if !response.status().is_success() {
            return Err(anyhow!("URL returned status code: {}", response.status()));
        }

        if let Some(declared) = response.content_length() {
            if declared > max_bytes {
                return Err(anyhow!(
                    "Remote file is {} bytes (limit: {} bytes)",
                    declared,
                    max_bytes
                ));
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read response body")?
        {
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(anyhow!("Remote file exceeds {} bytes", max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }
}
