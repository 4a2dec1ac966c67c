//! Source resolution boundary.
//!
//! Turning a free-text query into a playable locator (search, platform
//! lookups) happens outside this crate behind [`SourceResolver`].
//! [`UrlResolver`] handles queries that already are locators.

use std::fmt::Debug;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::ResolveError;
use crate::track::Track;

/// Length of the hex identifier derived from a locator.
const ID_HEX_LEN: usize = 16;

/// One resolution request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveRequest {
    pub query: String,
    pub requester: String,
    pub channel_id: String,
}

impl ResolveRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn requested_by(mut self, requester: impl Into<String>, channel_id: impl Into<String>) -> Self {
        self.requester = requester.into();
        self.channel_id = channel_id.into();
        self
    }
}

/// Converts a query into an immutable [`Track`].
#[async_trait::async_trait]
pub trait SourceResolver: Debug + Send + Sync {
    async fn resolve(&self, request: &ResolveRequest) -> Result<Track, ResolveError>;
}

/// Stable identifier of a locator: truncated SHA-256, hex encoded.
pub fn locator_id(locator: &str) -> String {
    let digest = Sha256::digest(locator.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(ID_HEX_LEN);
    id
}

/// Resolver for queries that are already locators.
///
/// `http(s)` URLs are cache-eligible. Local paths and `file:` URLs are
/// played directly and never cached.
#[derive(Debug, Clone, Default)]
pub struct UrlResolver;

impl UrlResolver {
    pub fn new() -> Self {
        Self
    }

    fn title_from(locator: &str) -> String {
        let without_query = locator.split(['?', '#']).next().unwrap_or(locator);
        without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| {
                Path::new(s)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_else(|| s.to_string())
            })
            .unwrap_or_else(|| locator.to_string())
    }
}

#[async_trait::async_trait]
impl SourceResolver for UrlResolver {
    async fn resolve(&self, request: &ResolveRequest) -> Result<Track, ResolveError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(ResolveError::EmptyQuery);
        }

        let (locator, cache_eligible) = if query.starts_with("http://") || query.starts_with("https://") {
            (query.to_string(), true)
        } else if let Some(path) = query.strip_prefix("file://") {
            (path.to_string(), false)
        } else if Path::new(query).is_absolute() || query.starts_with("./") {
            if !tokio::fs::try_exists(query).await.unwrap_or(false) {
                return Err(ResolveError::NotFound(query.to_string()));
            }
            (query.to_string(), false)
        } else {
            return Err(ResolveError::Unsupported(query.to_string()));
        };

        Ok(Track::builder(locator_id(&locator), locator.clone())
            .title(Self::title_from(&locator))
            .requester(request.requester.clone())
            .channel_id(request.channel_id.clone())
            .cache_eligible(cache_eligible)
            .build())
    }
}
