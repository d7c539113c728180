//! Search provider abstraction
//!
//! The crawl engine only ever talks to a `SearchProvider`: an authenticated,
//! paginated keyword search. Errors are classified into transient trouble
//! (worth a cooldown and a later retry), hard trouble (malformed responses,
//! logged and not retried within the run) and authentication rejections
//! (terminal for the account).

mod http;

pub use http::HttpSearchProvider;

use crate::accounts::Credentials;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised by a search provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("provider rate limit hit")]
    RateLimited,

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Transient errors trigger an account cooldown and a retry-later
    /// unit outcome; everything else is handled case by case.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout | Self::RateLimited)
    }

    /// Hard rejection of the credentials themselves; bans the account
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected(_))
    }
}

/// An authenticated provider session for one account
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub token: String,
}

/// One raw search result as returned by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    pub id: String,
    pub username: String,
    pub text: String,
    pub date: DateTime<Utc>,
}

/// A lazy, provider-paginated stream of search results
///
/// Items arrive one at a time so a large window never has to be buffered
/// in full. Ordering is whatever the provider returns.
#[async_trait]
pub trait ItemStream: Send {
    /// Returns the next item, or `Ok(None)` once the provider is drained
    async fn next(&mut self) -> Result<Option<RawItem>, ProviderError>;
}

/// Contract for the external search service
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Attempts a login for the given credentials
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ProviderError>;

    /// Runs a query, returning at most `max_results` items
    async fn search(
        &self,
        session: &Session,
        query: &str,
        max_results: u32,
    ) -> Result<Box<dyn ItemStream>, ProviderError>;
}
