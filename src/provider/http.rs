//! HTTP search provider implementation
//!
//! Talks to a JSON search API: `POST /session` exchanges credentials for a
//! bearer token, `GET /search` returns cursor-paginated item pages. Status
//! codes are classified the same way for both calls: 429 is a rate limit,
//! 5xx and connection trouble are transient, anything else unexpected is a
//! malformed response.

use crate::accounts::Credentials;
use crate::config::ProviderConfig;
use crate::provider::{ItemStream, ProviderError, RawItem, SearchProvider, Session};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

/// HTTP-backed search provider
pub struct HttpSearchProvider {
    client: Client,
    base_url: Url,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    items: Vec<RawItem>,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl HttpSearchProvider {
    /// Builds a provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ProviderError::Malformed(format!("invalid base url: {}", e)))?;

        let client = Client::builder()
            .user_agent(concat!("driftnet/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            page_size: config.page_size,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Malformed(format!("invalid endpoint {}: {}", path, e)))
    }
}

/// Maps a reqwest transport error to a provider error
fn classify_request_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(error.to_string())
    }
}

/// Maps an unexpected status to a provider error; `auth_is_rejection`
/// controls whether 401/403 means bad credentials (login) or an
/// unexpected response (search with a token we just obtained)
fn classify_status(status: StatusCode, auth_is_rejection: bool) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if auth_is_rejection => {
            ProviderError::AuthRejected(format!("provider returned {}", status))
        }
        s if s.is_server_error() => ProviderError::Network(format!("provider returned {}", s)),
        s => ProviderError::Malformed(format!("unexpected status {}", s)),
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        let url = self.endpoint("session")?;

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "username": credentials.username,
                "password": credentials.password,
                "email": credentials.email,
                "email_password": credentials.email_password,
            }))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, true));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("bad session response: {}", e)))?;

        Ok(Session {
            username: credentials.username.clone(),
            token: session.token,
        })
    }

    async fn search(
        &self,
        session: &Session,
        query: &str,
        max_results: u32,
    ) -> Result<Box<dyn ItemStream>, ProviderError> {
        Ok(Box::new(HttpItemStream {
            client: self.client.clone(),
            search_url: self.endpoint("search")?,
            token: session.token.clone(),
            query: query.to_string(),
            page_size: self.page_size,
            remaining: max_results,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }
}

/// Cursor-paginated item stream over the search endpoint
struct HttpItemStream {
    client: Client,
    search_url: Url,
    token: String,
    query: String,
    page_size: u32,
    remaining: u32,
    cursor: Option<String>,
    buffer: VecDeque<RawItem>,
    exhausted: bool,
}

impl HttpItemStream {
    async fn fetch_page(&mut self) -> Result<(), ProviderError> {
        let mut url = self.search_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &self.query);
            pairs.append_pair("limit", &self.page_size.min(self.remaining).to_string());
            if let Some(cursor) = &self.cursor {
                pairs.append_pair("cursor", cursor);
            }
        }

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, false));
        }

        let page: SearchPage = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("bad search response: {}", e)))?;

        self.cursor = page.next_cursor;
        if self.cursor.is_none() || page.items.is_empty() {
            self.exhausted = true;
        }
        self.buffer.extend(page.items);
        Ok(())
    }
}

#[async_trait]
impl ItemStream for HttpItemStream {
    async fn next(&mut self) -> Result<Option<RawItem>, ProviderError> {
        loop {
            if self.remaining == 0 {
                return Ok(None);
            }
            if let Some(item) = self.buffer.pop_front() {
                self.remaining -= 1;
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }
}
