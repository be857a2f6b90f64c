//! HTTP client for the remote ingest endpoint

use anyhow::{Context, Result};
use monitor_lib::{source::decode_batch, Snapshot};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Client for one ingest route, e.g. `http://host:8080/api/ingest`
pub struct IngestClient {
    client: Client,
    endpoint: Url,
}

impl IngestClient {
    /// Create a new ingest client
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = Url::parse(endpoint).context("Invalid ingest endpoint URL")?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Make a GET request against the endpoint with optional query pairs
    async fn get<T: DeserializeOwned>(&self, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with a JSON body
    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Most recent snapshot, `None` when the endpoint holds nothing yet
    pub async fn latest(&self) -> Result<Option<Snapshot>> {
        let body: Value = self.get(&[]).await?;
        if body.is_null() {
            return Ok(None);
        }
        let snapshot = Snapshot::from_value(&body)
            .map_err(|e| anyhow::anyhow!("Endpoint returned an unusable snapshot: {}", e))?;
        Ok(Some(snapshot))
    }

    /// Every retained snapshot, oldest first. Undecodable items are skipped.
    pub async fn all(&self) -> Result<Vec<Snapshot>> {
        let body: Value = self.get(&[("all", "1")]).await?;
        Ok(decode_batch(&body))
    }

    /// POST a snapshot object or array as-is
    pub async fn push(&self, body: &Value) -> Result<PushResponse> {
        self.post(body).await
    }
}

/// Body of a successful ingest POST
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub ok: bool,
    pub added: usize,
    pub size: usize,
}
