//! HTTP access for tile downloads, behind a trait so tests can stand in for the network.

use crate::core::constants::{DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_USER_AGENT};
use crate::{MapError, Result};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use std::time::Duration;

/// Shared blocking HTTP client with the default User-Agent and deadline.
static HTTP_CLIENT: Lazy<std::result::Result<Client, String>> = Lazy::new(|| {
    build_client(
        DEFAULT_USER_AGENT,
        Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
    )
    .map_err(|e| e.to_string())
});

/// Downloads the raw bytes behind a tile URL.
pub trait TileFetcher: Send + Sync {
    /// Returns the body of a 2xx response; anything else is an error.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`TileFetcher`] backed by a blocking `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTileFetcher {
    client: Client,
}

impl HttpTileFetcher {
    /// Fetcher sharing the process-wide client with default settings.
    pub fn new() -> Result<Self> {
        match &*HTTP_CLIENT {
            Ok(client) => Ok(Self {
                client: client.clone(),
            }),
            Err(e) => Err(MapError::Config(format!("failed to build HTTP client: {}", e))),
        }
    }

    /// Fetcher with its own User-Agent and per-request deadline.
    pub fn with_settings(user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(user_agent, timeout)?,
        })
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(MapError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes()?.to_vec())
    }
}

fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?)
}
