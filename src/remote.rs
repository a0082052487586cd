//! External collaborators: paste-service upload and remote source fetch.
//!
//! The console only sees the [`PasteClient`] trait; failures here surface
//! as short user-visible messages and never touch session state. The HTTP
//! implementation targets a paste API answering multipart uploads with
//! `{"url": ...}` or `{"error": ...}` JSON.

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, SandboxError};

/// Default paste-service endpoint.
pub const DEFAULT_PASTE_ENDPOINT: &str = "https://s.h4ks.com/api/";

/// Upload and fetch seam for the `paste` / `run <url>` commands.
#[async_trait]
pub trait PasteClient: Send + Sync {
    /// Upload `text`, returning the public URL.
    async fn upload(&self, text: &str) -> Result<String>;

    /// Fetch source text from `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// [`PasteClient`] over HTTP.
pub struct HttpPasteClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpPasteClient {
    /// Client against the default endpoint.
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_PASTE_ENDPOINT)
    }

    /// Client against a custom endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for HttpPasteClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PasteClient for HttpPasteClient {
    async fn upload(&self, text: &str) -> Result<String> {
        let part = reqwest::multipart::Part::text(text.to_string()).file_name("paste.txt");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SandboxError::PasteUpload(e.into()))?;
        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| SandboxError::PasteUpload(anyhow!("non-JSON response ({})", status)))?;
        debug!(%status, "paste service replied");

        if let Some(url) = body.get("url").and_then(|v| v.as_str()) {
            return Ok(url.to_string());
        }
        if let Some(error) = body.get("error").and_then(|v| v.as_str()) {
            return Err(SandboxError::PasteUpload(anyhow!("{}", error)));
        }
        Err(SandboxError::PasteUpload(anyhow!(
            "unexpected response: {}",
            body
        )))
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SandboxError::Fetch(e.into()))?;
        if !response.status().is_success() {
            return Err(SandboxError::Fetch(anyhow!(
                "status {} from {}",
                response.status(),
                url
            )));
        }
        response
            .text()
            .await
            .map_err(|e| SandboxError::Fetch(e.into()))
    }
}
