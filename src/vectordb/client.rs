//! Elasticsearch REST client.

use super::{BulkOperation, SearchEngine};
use crate::config::ElasticsearchSettings;
use crate::error::{RaglineError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Elasticsearch client speaking JSON over HTTP(S).
pub struct EsClient {
    http: reqwest::Client,
    base_url: Url,
    basic_auth: Option<(String, Option<String>)>,
    closed: AtomicBool,
}

impl EsClient {
    /// Build a client from connection settings.
    pub fn new(settings: &ElasticsearchSettings) -> Result<Self> {
        let raw_url = settings
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RaglineError::Config("Elasticsearch URL is required".to_string()))?;

        let mut base_url = Url::parse(raw_url).map_err(|e| {
            RaglineError::Config(format!("Invalid Elasticsearch URL {}: {}", raw_url, e))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RaglineError::Config(format!(
                "Elasticsearch URL must use http or https: {}",
                raw_url
            )));
        }
        // keep any path prefix when joining relative endpoints
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &settings.api_key {
            let value = HeaderValue::from_str(&format!("ApiKey {}", api_key))
                .map_err(|e| RaglineError::Config(format!("Invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RaglineError::Config(format!("Invalid header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RaglineError::Config(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| RaglineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let basic_auth = settings
            .username
            .clone()
            .map(|user| (user, settings.password.clone()));

        Ok(Self {
            http,
            base_url,
            basic_auth,
            closed: AtomicBool::new(false),
        })
    }

    /// The endpoint this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch cluster info (`GET /`), used to check connectivity.
    pub async fn info(&self) -> Result<Value> {
        let response = self.send(self.request(Method::GET, "")?).await?;
        let response = Self::expect_success(response, "cluster info").await?;
        Self::json(response).await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RaglineError::SourceUnavailable(
                "Elasticsearch client is closed".to_string(),
            ));
        }

        let url = self
            .base_url
            .join(path)
            .map_err(|e| RaglineError::InvalidInput(format!("Invalid path {}: {}", path, e)))?;

        let mut builder = self.http.request(method, url);
        if let Some((user, password)) = &self.basic_auth {
            builder = builder.basic_auth(user, password.as_ref());
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| RaglineError::unavailable("Elasticsearch request failed", e))
    }

    async fn expect_success(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(RaglineError::NotFound(format!("{}: {}", what, body)));
        }
        Err(RaglineError::SourceUnavailable(format!(
            "{} returned {}: {}",
            what, status, body
        )))
    }

    async fn json(response: Response) -> Result<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|e| RaglineError::unavailable("invalid Elasticsearch response", e))
    }
}

/// NDJSON body for `_bulk`: one action line and one source line per document.
pub(crate) fn bulk_body(operations: &[BulkOperation]) -> Result<String> {
    let mut body = String::new();
    for op in operations {
        let action = json!({ "index": { "_index": op.index, "_id": op.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&op.source)?);
        body.push('\n');
    }
    Ok(body)
}

fn is_already_exists(body: &str) -> bool {
    body.contains("resource_already_exists_exception")
}

#[async_trait]
impl SearchEngine for EsClient {
    #[instrument(skip(self))]
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self.send(self.request(Method::HEAD, index)?).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(RaglineError::SourceUnavailable(format!(
                "index exists check for {} returned {}",
                index, s
            ))),
        }
    }

    #[instrument(skip(self, body))]
    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let response = self
            .send(self.request(Method::PUT, index)?.json(body))
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        // lost a creation race with another process
        if status == StatusCode::BAD_REQUEST && is_already_exists(&text) {
            debug!("Index {} already exists", index);
            return Ok(());
        }
        Err(RaglineError::SourceUnavailable(format!(
            "create index {} returned {}: {}",
            index, status, text
        )))
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, index: &str) -> Result<()> {
        let response = self.send(self.request(Method::DELETE, index)?).await?;
        Self::expect_success(response, &format!("delete index {}", index)).await?;
        Ok(())
    }

    #[instrument(skip(self, operations), fields(count = operations.len()))]
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<Value> {
        let body = bulk_body(operations)?;
        let request = self
            .request(Method::POST, "_bulk")?
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        let response = self.send(request).await?;
        let response = Self::expect_success(response, "bulk write").await?;
        Self::json(response).await
    }

    #[instrument(skip(self))]
    async fn refresh(&self, index: &str) -> Result<()> {
        let response = self
            .send(self.request(Method::POST, &format!("{}/_refresh", index))?)
            .await?;
        Self::expect_success(response, &format!("refresh {}", index)).await?;
        Ok(())
    }

    #[instrument(skip(self, body))]
    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let response = self
            .send(self.request(Method::POST, &format!("{}/_search", index))?.json(body))
            .await?;
        let response = Self::expect_success(response, &format!("search {}", index)).await?;
        Self::json(response).await
    }

    #[instrument(skip(self, body))]
    async fn count(&self, index: &str, body: &Value) -> Result<u64> {
        let response = self
            .send(self.request(Method::POST, &format!("{}/_count", index))?.json(body))
            .await?;
        let response = Self::expect_success(response, &format!("count {}", index)).await?;
        let value = Self::json(response).await?;
        value.get("count").and_then(Value::as_u64).ok_or_else(|| {
            RaglineError::SourceUnavailable(format!("count response without count: {}", value))
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        debug!("Closed Elasticsearch client for {}", self.base_url);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
