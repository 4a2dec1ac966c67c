//! Remote reader used by the fetch-and-cache tier.

use std::fmt::Debug;
use std::time::Duration;

use discocache::ByteStream;
use futures_util::TryStreamExt;
use reqwest::Client;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::AcquisitionError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens the raw media behind a remote locator.
#[async_trait::async_trait]
pub trait RemoteFetcher: Debug + Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<ByteStream, AcquisitionError>;
}

/// Streaming HTTP(S) fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, AcquisitionError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AcquisitionError::Fetch {
                locator: String::new(),
                details: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<ByteStream, AcquisitionError> {
        let fetch_error = |details: String| AcquisitionError::Fetch {
            locator: locator.to_string(),
            details,
        };

        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP status {}", status)));
        }

        debug!(
            locator,
            content_length = ?response.content_length(),
            "Remote stream opened"
        );
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }
}
