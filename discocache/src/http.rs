//! HTTP object store adapter.
//!
//! Talks to any object store exposing path-style URLs
//! (`{endpoint}/{bucket}/{key}`) with plain `GET`/`PUT`, such as a
//! pre-authorised S3-compatible gateway. An optional bearer token is sent
//! with every request.

use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::{header, Client, StatusCode};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use crate::store::{validate_key, ByteStream, CacheError, CacheStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cache store backed by an HTTP object store.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl HttpStore {
    /// Creates a store for `bucket` at `endpoint`.
    pub fn new(endpoint: &str, bucket: &str, token: Option<String>) -> Result<Self, CacheError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, endpoint, bucket, token))
    }

    /// Creates a store reusing an existing HTTP client.
    pub fn with_client(client: Client, endpoint: &str, bucket: &str, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// URL of the object stored under `key`
    pub fn object_url(&self, key: &str) -> Result<String, CacheError> {
        validate_key(key)?;
        Ok(format!("{}/{}/{}", self.endpoint, self.bucket, key))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl CacheStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn get(&self, key: &str) -> Result<ByteStream, CacheError> {
        let url = self.object_url(key)?;
        let response = self.authorize(self.client.get(&url)).send().await?;

        match response.status() {
            status if status.is_success() => {
                let stream = response.bytes_stream().map_err(std::io::Error::other);
                Ok(Box::new(StreamReader::new(stream)))
            }
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(key.to_string())),
            status => Err(CacheError::Status {
                status: status.as_u16(),
                key: key.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, data: ByteStream, size: Option<u64>) -> Result<(), CacheError> {
        let url = self.object_url(key)?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(data));

        let mut request = self.authorize(self.client.put(&url)).body(body);
        if let Some(size) = size {
            request = request.header(header::CONTENT_LENGTH, size);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Status {
                status: status.as_u16(),
                key: key.to_string(),
            });
        }

        debug!(key, url = %url, "Uploaded object");
        Ok(())
    }
}
