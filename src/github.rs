//! GitHub commit-search client.
//!
//! Issues a single `GET /search/commits` request and returns the raw
//! [`SearchPage`]. Items are left undecoded so the ingestion pipeline can
//! decode and fail them one at a time.
//!
//! # Retry strategy
//!
//! - HTTP 5xx → retry with exponential backoff (1s, 2s, 4s, …)
//! - Network error → retry
//! - Undecodable success body → [`FetchError::Decode`] immediately
//! - Any other non-success status → [`ApiError`] immediately
//!
//! Pagination and rate-limit handling are out of scope: one page per sync.

use std::time::Duration;

use commitfeed_core::remote::{ApiError, SearchPage};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GithubConfig;

/// Media type that enables the commit search endpoint.
const COMMIT_SEARCH_ACCEPT: &str = "application/vnd.github.cloak-preview+json";

/// Failure of a whole fetch. Aborts the batch that requested it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search response does not match the expected shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid search URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub struct GithubClient {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Full request URL for a commit search.
    pub fn search_url(&self, query: &str) -> Result<reqwest::Url, FetchError> {
        let base = format!(
            "{}/search/commits",
            self.config.api_url.trim_end_matches('/')
        );
        let per_page = self.config.per_page.to_string();
        reqwest::Url::parse_with_params(
            &base,
            &[
                ("q", query),
                ("sort", "author-date"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ],
        )
        .map_err(|e| FetchError::InvalidUrl {
            url: base.clone(),
            reason: e.to_string(),
        })
    }

    /// Run one commit search and decode the response envelope.
    ///
    /// Retries up to `max_retries` times; when they run out, the last
    /// attempt's error is returned.
    pub async fn search_commits(&self, query: &str) -> Result<SearchPage, FetchError> {
        let url = self.search_url(query)?;
        let mut attempt = 0;

        loop {
            let err = match self.attempt(&url).await {
                Ok(Attempt::Done(page)) => return Ok(page),
                Ok(Attempt::Fatal(err)) => return Err(err),
                Ok(Attempt::Retryable(err)) | Err(err) => err,
            };

            if attempt >= self.config.max_retries {
                return Err(err);
            }
            attempt += 1;

            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            warn!(error = %err, attempt, ?delay, "commit search failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, url: &reqwest::Url) -> Result<Attempt, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, COMMIT_SEARCH_ACCEPT)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "commit search response");

        if status.is_success() {
            return Ok(match SearchPage::from_slice(&body) {
                Ok(page) => Attempt::Done(page),
                Err(e) => Attempt::Fatal(e.into()),
            });
        }

        let err = FetchError::Api(ApiError::new(url.as_str(), &body, status.as_u16()));
        if status.is_server_error() {
            Ok(Attempt::Retryable(err))
        } else {
            Ok(Attempt::Fatal(err))
        }
    }
}

/// Outcome of a single request. Network failures come back as `Err` and
/// are retried like 5xx responses.
enum Attempt {
    Done(SearchPage),
    Retryable(FetchError),
    Fatal(FetchError),
}
