//! Normalized domain entities.
//!
//! Rows in the relational store map one-to-one onto these types. Links
//! between entities are plain foreign-key values (`source_id`,
//! `author_id`, `repo_id`), never nested objects, so a [`Commit`] can be
//! passed around without dragging its author or repository along.
//!
//! The `id` field of [`User`], [`Repo`], and [`Commit`] is `None` until a
//! [`Store`](crate::store::Store) resolves or creates the row; only the
//! store ever writes it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// The external hosting provider an entity originates from.
///
/// Reference data: created out of band and looked up by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
}

/// An author on the external platform. Deduplicated by `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Option<i64>,
    pub source_id: i64,
    pub username: String,
    pub url: String,
    pub avatar_url: String,
}

/// A code repository. Deduplicated by `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repo {
    pub id: Option<i64>,
    pub source_id: i64,
    pub name: String,
    pub description: String,
    pub url: String,
}

/// A single commit surfaced by a search. Deduplicated by `url`.
///
/// `author_id` and `repo_id` are always resolved IDs: the ingestion
/// pipeline refuses to build a `Commit` from an unresolved [`User`] or
/// [`Repo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub id: Option<i64>,
    pub source_id: i64,
    pub author_id: i64,
    pub repo_id: i64,
    pub message: String,
    pub sha: String,
    pub url: String,
    pub date: DateTime<Utc>,
}

/// A commit joined with its author, as returned by
/// [`Store::recent_commits`](crate::store::Store::recent_commits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentCommit {
    #[serde(flatten)]
    pub commit: Commit,
    pub author: User,
}

/// Which table an entity lives in. Used for error context and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Repo,
    Commit,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::User => "user",
            EntityKind::Repo => "repo",
            EntityKind::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Common view over the three deduplicated entity types.
pub trait Entity {
    const KIND: EntityKind;

    /// The dedup key.
    fn url(&self) -> &str;

    fn id(&self) -> Option<i64>;
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn url(&self) -> &str {
        &self.url
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

impl Entity for Repo {
    const KIND: EntityKind = EntityKind::Repo;

    fn url(&self) -> &str {
        &self.url
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

impl Entity for Commit {
    const KIND: EntityKind = EntityKind::Commit;

    fn url(&self) -> &str {
        &self.url
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// Row counts per table, as reported by `cfeed stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub sources: i64,
    pub users: i64,
    pub repos: i64,
    pub commits: i64,
}
