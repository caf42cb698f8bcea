//! Retrying HTTP access to package feeds.

use std::time::Duration;

use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

const RETRY_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the shared reqwest client used for every feed.
pub fn build_client() -> DexecResult<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("dexec/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DexecError::Network {
            message: format!("Failed to create HTTP client: {e}"),
        })
}

/// A reqwest client plus the bounded retry policy.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    attempts: u32,
}

impl HttpFetcher {
    pub fn new(client: Client, attempts: u32) -> Self {
        Self {
            client,
            attempts: attempts.max(1),
        }
    }

    /// Download raw bytes, retrying transient failures.
    ///
    /// Returns `Ok(None)` for 404. Connect errors, timeouts, 5xx and 429 are
    /// retried with a linear backoff; any other status fails immediately.
    pub async fn get_bytes(&self, url: &str, cancel: &CancelToken) -> DexecResult<Option<Vec<u8>>> {
        let mut last_err = String::new();

        for attempt in 0..self.attempts {
            cancel.check()?;
            if attempt > 0 {
                tracing::debug!("Retrying {url} (attempt {}): {last_err}", attempt + 1);
                cancel
                    .run(async {
                        tokio::time::sleep(RETRY_DELAY * attempt).await;
                        Ok(())
                    })
                    .await?;
            }

            match cancel.run(self.fetch_once(url)).await {
                Ok(Fetched::Body(bytes)) => return Ok(Some(bytes)),
                Ok(Fetched::NotFound) => return Ok(None),
                Ok(Fetched::Transient(message)) => last_err = message,
                Err(e) => return Err(e),
            }
        }

        Err(DexecError::Network {
            message: format!("Failed after {} attempts for {url}: {last_err}", self.attempts),
        })
    }

    pub async fn get_text(&self, url: &str, cancel: &CancelToken) -> DexecResult<Option<String>> {
        Ok(self
            .get_bytes(url, cancel)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancelToken,
    ) -> DexecResult<Option<T>> {
        match self.get_bytes(url, cancel).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| DexecError::Network {
                    message: format!("Invalid JSON from {url}: {e}"),
                }),
            None => Ok(None),
        }
    }

    async fn fetch_once(&self, url: &str) -> DexecResult<Fetched> {
        tracing::debug!("GET {url}");
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() || e.is_connect() => return Ok(Fetched::Transient(e.to_string())),
            Err(e) => {
                return Err(DexecError::Network {
                    message: format!("Request to {url} failed: {e}"),
                })
            }
        };

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Fetched::NotFound);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Fetched::Transient(format!("HTTP {status} from {url}")));
        }
        if !status.is_success() {
            return Err(DexecError::Network {
                message: format!("HTTP {status} fetching {url}"),
            });
        }

        match resp.bytes().await {
            Ok(bytes) => Ok(Fetched::Body(bytes.to_vec())),
            Err(e) if e.is_timeout() || e.is_body() => Ok(Fetched::Transient(e.to_string())),
            Err(e) => Err(DexecError::Network {
                message: format!("Failed to read response from {url}: {e}"),
            }),
        }
    }
}

enum Fetched {
    Body(Vec<u8>),
    NotFound,
    Transient(String),
}
