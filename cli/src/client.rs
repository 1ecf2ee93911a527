use anyhow::{bail, Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqpatch_types::{
    api::{
        ErrorResponse, ImportResponse, LoadShowResponse, SaveShowRequest, SaveShowResponse,
        ShowListResponse, StateResponse, SyncStartedResponse,
    },
    ShowFile, SyncStatusResponse,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// HTTP client for the sqpatch REST API
#[derive(Clone, Debug)]
pub struct SqPatchClient {
    base_url: String,
    client: Client,
}

/// Turn an error status into an error carrying the server's message.
async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<ErrorResponse>().await {
            Ok(e) => match e.details {
                Some(details) => format!("{} ({})", e.error, details),
                None => e.error,
            },
            Err(_) => status.to_string(),
        };
        bail!("{}: {}", status.as_u16(), message);
    }
    response.json().await.context("Failed to parse response")
}

impl SqPatchClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Get channels, mixer address and current show
    pub async fn get_state(&self) -> Result<StateResponse> {
        let response = self
            .client
            .get(self.url("/api/state"))
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Start a sync
    pub async fn start_sync(&self) -> Result<SyncStartedResponse> {
        let response = self
            .client
            .post(self.url("/api/sync"))
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Get sync progress and last result
    pub async fn sync_status(&self) -> Result<SyncStatusResponse> {
        let response = self
            .client
            .get(self.url("/api/sync/status"))
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Poll until the sync is idle. Gives up after `deadline`.
    pub async fn wait_for_sync(
        &self,
        interval: Duration,
        deadline: Duration,
    ) -> Result<SyncStatusResponse> {
        let started = Instant::now();
        loop {
            let status = self.sync_status().await?;
            if !status.status.is_running() {
                return Ok(status);
            }
            debug!("Sync at {}/{}", status.current, status.total);
            if started.elapsed() >= deadline {
                bail!(
                    "sync still running after {:?} ({}/{})",
                    deadline,
                    status.current,
                    status.total
                );
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// List stored shows
    pub async fn list_shows(&self) -> Result<ShowListResponse> {
        let response = self
            .client
            .get(self.url("/api/shows"))
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Save the live channel list as a show
    pub async fn save_show(&self, name: &str, set_current: bool) -> Result<SaveShowResponse> {
        let request = SaveShowRequest {
            name: name.to_string(),
            set_current: Some(set_current),
            ..Default::default()
        };
        let response = self
            .client
            .post(self.url("/api/shows"))
            .json(&request)
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Load a stored show
    pub async fn load_show(&self, name: &str) -> Result<LoadShowResponse> {
        let response = self
            .client
            .post(self.url(&format!("/api/shows/{}/load", name)))
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Delete a stored show
    pub async fn delete_show(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/shows/{}", name)))
            .send()
            .await
            .context("Failed to send request")?;
        if !response.status().is_success() {
            parse::<Value>(response).await?;
        }
        Ok(())
    }

    /// Download the live channel list as a show file
    pub async fn export(&self, name: Option<&str>) -> Result<ShowFile> {
        let mut request = self.client.get(self.url("/api/state/export"));
        if let Some(name) = name {
            request = request.query(&[("name", name)]);
        }
        let response = request.send().await.context("Failed to send request")?;
        parse(response).await
    }

    /// Replace the channel list from a show file
    pub async fn import(&self, show: &Value) -> Result<ImportResponse> {
        let response = self
            .client
            .post(self.url("/api/state/import"))
            .json(show)
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }
}
