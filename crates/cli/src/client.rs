//! API client for communicating with the host agent

use agent_lib::load::{LoadState, StressProfile};
use agent_lib::models::Sample;
use agent_lib::status::MonitorStatus;
use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the agent API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn status(&self) -> Result<MonitorStatus> {
        self.get("api/v1/status").await
    }

    pub async fn usage(&self) -> Result<Sample> {
        self.get("api/v1/usage").await
    }

    pub async fn load_state(&self) -> Result<LoadState> {
        self.get("api/v1/load").await
    }

    pub async fn start_cpu(&self, workers: Option<usize>) -> Result<LoadState> {
        self.post("api/v1/load/cpu/start", &CpuStartRequest { workers })
            .await
    }

    pub async fn stop_cpu(&self) -> Result<LoadState> {
        self.post_empty("api/v1/load/cpu/stop").await
    }

    pub async fn allocate_memory(&self) -> Result<LoadState> {
        self.post_empty("api/v1/load/memory/allocate").await
    }

    pub async fn free_memory(&self) -> Result<LoadState> {
        self.post_empty("api/v1/load/memory/free").await
    }

    pub async fn run_stress(&self, profile: &StressProfile) -> Result<LoadState> {
        self.post("api/v1/load/stress", profile).await
    }
}

// API request/response types not shared with the agent library

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuStartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_lib::status::MonitorPhase;
    use mockito::Matcher;

    const LOAD_BODY: &str = r#"{
        "cpu_workers": 2,
        "memory_blocks": 1,
        "memory_bytes": 524288000,
        "memory_max_blocks": 8,
        "stress_runs": 0
    }"#;

    #[tokio::test]
    async fn test_status_parses_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "phase": "migrating",
                    "label": "Migration in progress",
                    "migration_phase": "uploading",
                    "latest_sample": {
                        "cpu_percent": 91.0,
                        "memory_percent": 40.0,
                        "disk_percent": 30.0,
                        "timestamp": 1700000000
                    },
                    "samples_recorded": 12,
                    "history_len": 10,
                    "trailing_breaches": 5,
                    "threshold_percent": 75.0,
                    "consecutive_checks": 5,
                    "migration_attempts": 1,
                    "provider": "gcp",
                    "updated_at": 1700000001
                }"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let status = client.status().await.unwrap();

        mock.assert_async().await;
        assert_eq!(status.phase, MonitorPhase::Migrating);
        assert_eq!(status.trailing_breaches, 5);
        assert_eq!(status.latest_sample.unwrap().cpu_percent, 91.0);
        assert!(status.last_failure.is_none());
    }

    #[tokio::test]
    async fn test_start_cpu_sends_workers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/load/cpu/start")
            .match_body(Matcher::Json(serde_json::json!({"workers": 2})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(LOAD_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let state = client.start_cpu(Some(2)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(state.cpu_workers, 2);
    }

    #[tokio::test]
    async fn test_stress_sends_profile() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/load/stress")
            .match_body(Matcher::PartialJson(serde_json::json!({"timeout_secs": 60})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(LOAD_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let profile = StressProfile {
            timeout_secs: 60,
            ..StressProfile::default()
        };
        client.run_stress(&profile).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_uses_error_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/load/memory/allocate")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"memory ballast is full (8 blocks, 4194304000 bytes)"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.allocate_memory().await.unwrap_err().to_string();

        assert!(err.contains("409"));
        assert!(err.contains("memory ballast is full"));
    }

    #[tokio::test]
    async fn test_api_error_falls_back_to_raw_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/usage")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.usage().await.unwrap_err().to_string();

        assert!(err.contains("bad gateway"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
