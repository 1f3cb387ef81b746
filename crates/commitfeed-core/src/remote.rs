//! Shape of a commit-search response from the remote hosting API.
//!
//! The envelope ([`SearchPage`]) keeps its items as raw JSON so each one
//! can be decoded on its own: a malformed item is a failure for that item
//! only, never for the page.
//!
//! [`ApiError`] is the failure value for any non-success HTTP response
//! from the remote API.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Commit, Repo, Source, User};

/// Message used when an error body carries no decodable `message`.
pub const UNDECODABLE_ERROR_MESSAGE: &str = "not able to unmarshal error response";

/// One page of a commit-search response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub total_count: i64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

impl SearchPage {
    /// Decode the envelope. Items stay undecoded.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// A single search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitItem {
    #[serde(rename = "html_url")]
    pub url: String,
    pub sha: String,
    pub commit: CommitDetail,
    pub author: RemoteUser,
    #[serde(rename = "repository")]
    pub repo: RemoteRepo,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: AuthorInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorInfo {
    pub date: DateTime<Utc>,
}

/// A user identity as the remote API reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteUser {
    pub login: String,
    pub avatar_url: String,
    #[serde(rename = "html_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRepo {
    pub name: String,
    #[serde(rename = "html_url")]
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner: RemoteUser,
}

impl CommitItem {
    /// Decode one raw item taken from [`SearchPage::items`].
    pub fn decode(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        CommitItem::deserialize(value)
    }

    /// The commit author as an unresolved [`User`].
    pub fn to_user(&self, source: &Source) -> User {
        User {
            id: None,
            source_id: source.id,
            username: self.author.login.clone(),
            url: self.author.url.clone(),
            avatar_url: self.author.avatar_url.clone(),
        }
    }

    /// The owning repository as an unresolved [`Repo`].
    pub fn to_repo(&self, source: &Source) -> Repo {
        Repo {
            id: None,
            source_id: source.id,
            name: self.repo.name.clone(),
            description: self.repo.description.clone().unwrap_or_default(),
            url: self.repo.url.clone(),
        }
    }

    /// The commit itself, pointing at already-resolved author and repo IDs.
    pub fn to_commit(&self, source: &Source, author_id: i64, repo_id: i64) -> Commit {
        Commit {
            id: None,
            source_id: source.id,
            author_id,
            repo_id,
            message: self.commit.message.clone(),
            sha: self.sha.clone(),
            url: self.url.clone(),
            date: self.commit.author.date,
        }
    }
}

/// A non-success response from the remote API.
///
/// Always keeps the request URL and status code; the message comes from
/// the response body when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("github error {status_code}: {message} | URL: {url}")]
pub struct ApiError {
    pub url: String,
    pub status_code: u16,
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    pub fn new(url: impl Into<String>, body: &[u8], status_code: u16) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .map(|b| b.message)
            .unwrap_or_else(|_| UNDECODABLE_ERROR_MESSAGE.to_string());
        Self {
            url: url.into(),
            status_code,
            message,
        }
    }
}
