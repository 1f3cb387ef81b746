//! Storage abstraction for commitfeed.
//!
//! The [`Store`] trait is the only way the ingestion pipeline touches
//! persistent state. Backends provide the primitive `resolve_*` and
//! `create_*` operations per entity; the `get_or_create_*` family is built
//! on top of them here so every backend shares one race policy.
//!
//! # Race policy
//!
//! `get_or_create_*` is a check-then-act sequence and is not atomic. When
//! two writers race on the same new URL, the loser's `create_*` fails with
//! [`StoreError::UniqueViolation`]. The winner's row is visible by then,
//! so the loser retries `resolve_*` once and adopts the winner's ID. Any
//! error from that retry is returned to the caller.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::models::{Commit, Entity, EntityKind, RecentCommit, Repo, RowCounts, Source, User};

/// Failures reported by a [`Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row carries this dedup key. Expected; drives the create branch.
    #[error("{kind} not found: {url}")]
    NotFound { kind: EntityKind, url: String },

    /// A row with this dedup key already exists.
    #[error("{kind} already exists: {url}")]
    UniqueViolation { kind: EntityKind, url: String },

    /// The named source has not been seeded.
    #[error("source not found: {0}")]
    MissingSource(String),

    /// Anything else the backend reports (connectivity, bad query, FK mismatch).
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn not_found<E: Entity>(entity: &E) -> Self {
        StoreError::NotFound {
            kind: E::KIND,
            url: entity.url().to_string(),
        }
    }

    pub fn unique_violation<E: Entity>(entity: &E) -> Self {
        StoreError::UniqueViolation {
            kind: E::KIND,
            url: entity.url().to_string(),
        }
    }

    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        StoreError::Backend(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// How a `get_or_create_*` call settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The row already existed (possibly written by a concurrent writer).
    Existing,
    /// This call inserted the row.
    Created,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | `resolve_*` | Fill `id` from the row with the same URL, or `NotFound` |
/// | `create_*` | Insert a row and fill `id`, or `UniqueViolation` |
/// | `get_or_create_*` | Resolve, creating on `NotFound` (provided) |
/// | [`source_by_name`](Store::source_by_name) | Look up reference data |
/// | [`recent_commits`](Store::recent_commits) | Commits authored after a timestamp, with authors |
/// | [`counts`](Store::counts) | Row counts per table |
#[async_trait]
pub trait Store: Send + Sync {
    async fn source_by_name(&self, name: &str) -> StoreResult<Source>;

    async fn resolve_user(&self, user: &mut User) -> StoreResult<()>;
    async fn create_user(&self, user: &mut User) -> StoreResult<()>;

    async fn resolve_repo(&self, repo: &mut Repo) -> StoreResult<()>;
    async fn create_repo(&self, repo: &mut Repo) -> StoreResult<()>;

    async fn resolve_commit(&self, commit: &mut Commit) -> StoreResult<()>;
    async fn create_commit(&self, commit: &mut Commit) -> StoreResult<()>;

    /// Commits with `date` strictly after `since`, each joined with its
    /// author. No ordering is guaranteed.
    async fn recent_commits(&self, since: DateTime<Utc>) -> StoreResult<Vec<RecentCommit>>;

    async fn counts(&self) -> StoreResult<RowCounts>;

    async fn get_or_create_user(&self, user: &mut User) -> StoreResult<Resolution> {
        match self.resolve_user(user).await {
            Err(e) if e.is_not_found() => {}
            other => return other.map(|_| Resolution::Existing),
        }
        match self.create_user(user).await {
            Err(e) if e.is_unique_violation() => {
                debug!(kind = %EntityKind::User, url = %user.url, "lost insert race, resolving again");
                self.resolve_user(user).await.map(|_| Resolution::Existing)
            }
            other => other.map(|_| Resolution::Created),
        }
    }

    async fn get_or_create_repo(&self, repo: &mut Repo) -> StoreResult<Resolution> {
        match self.resolve_repo(repo).await {
            Err(e) if e.is_not_found() => {}
            other => return other.map(|_| Resolution::Existing),
        }
        match self.create_repo(repo).await {
            Err(e) if e.is_unique_violation() => {
                debug!(kind = %EntityKind::Repo, url = %repo.url, "lost insert race, resolving again");
                self.resolve_repo(repo).await.map(|_| Resolution::Existing)
            }
            other => other.map(|_| Resolution::Created),
        }
    }

    async fn get_or_create_commit(&self, commit: &mut Commit) -> StoreResult<Resolution> {
        match self.resolve_commit(commit).await {
            Err(e) if e.is_not_found() => {}
            other => return other.map(|_| Resolution::Existing),
        }
        match self.create_commit(commit).await {
            Err(e) if e.is_unique_violation() => {
                debug!(kind = %EntityKind::Commit, url = %commit.url, "lost insert race, resolving again");
                self.resolve_commit(commit).await.map(|_| Resolution::Existing)
            }
            other => other.map(|_| Resolution::Created),
        }
    }
}
