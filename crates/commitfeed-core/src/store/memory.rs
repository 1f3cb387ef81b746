//! In-memory [`Store`] implementation for testing.
//!
//! Tables are `Vec`s behind a single `std::sync::RwLock`, with URL indexes
//! in `HashMap`s. Enforces the same constraints as the SQLite schema: URL
//! uniqueness on users, repos, and commits, and commit → user/repo
//! referential integrity.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Commit, RecentCommit, Repo, RowCounts, Source, User};

use super::{Store, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    sources: Vec<Source>,
    users: Vec<User>,
    repos: Vec<Repo>,
    commits: Vec<Commit>,
    user_urls: HashMap<String, i64>,
    repo_urls: HashMap<String, i64>,
    commit_urls: HashMap<String, i64>,
}

/// In-memory store. IDs are assigned sequentially from 1 per table.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// A store with the given source names seeded, IDs from 1.
    pub fn with_sources(names: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut t = store.tables.write().unwrap();
            for (i, name) in names.iter().enumerate() {
                t.sources.push(Source {
                    id: i as i64 + 1,
                    name: name.to_string(),
                });
            }
        }
        store
    }

    /// Snapshot of stored users, in insertion order.
    pub fn users(&self) -> Vec<User> {
        self.tables.read().unwrap().users.clone()
    }

    /// Snapshot of stored repos, in insertion order.
    pub fn repos(&self) -> Vec<Repo> {
        self.tables.read().unwrap().repos.clone()
    }

    /// Snapshot of stored commits, in insertion order.
    pub fn commits(&self) -> Vec<Commit> {
        self.tables.read().unwrap().commits.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup(index: &HashMap<String, i64>, url: &str) -> Option<i64> {
    index.get(url).copied()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn source_by_name(&self, name: &str) -> StoreResult<Source> {
        let t = self.tables.read().unwrap();
        t.sources
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| StoreError::MissingSource(name.to_string()))
    }

    async fn resolve_user(&self, user: &mut User) -> StoreResult<()> {
        let t = self.tables.read().unwrap();
        let id = lookup(&t.user_urls, &user.url).ok_or_else(|| StoreError::not_found(&*user))?;
        user.id = Some(id);
        Ok(())
    }

    async fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let mut t = self.tables.write().unwrap();
        if t.user_urls.contains_key(&user.url) {
            return Err(StoreError::unique_violation(&*user));
        }
        let id = t.users.len() as i64 + 1;
        let mut row = user.clone();
        row.id = Some(id);
        t.user_urls.insert(row.url.clone(), id);
        t.users.push(row);
        user.id = Some(id);
        Ok(())
    }

    async fn resolve_repo(&self, repo: &mut Repo) -> StoreResult<()> {
        let t = self.tables.read().unwrap();
        let id = lookup(&t.repo_urls, &repo.url).ok_or_else(|| StoreError::not_found(&*repo))?;
        repo.id = Some(id);
        Ok(())
    }

    async fn create_repo(&self, repo: &mut Repo) -> StoreResult<()> {
        let mut t = self.tables.write().unwrap();
        if t.repo_urls.contains_key(&repo.url) {
            return Err(StoreError::unique_violation(&*repo));
        }
        let id = t.repos.len() as i64 + 1;
        let mut row = repo.clone();
        row.id = Some(id);
        t.repo_urls.insert(row.url.clone(), id);
        t.repos.push(row);
        repo.id = Some(id);
        Ok(())
    }

    async fn resolve_commit(&self, commit: &mut Commit) -> StoreResult<()> {
        let t = self.tables.read().unwrap();
        let id =
            lookup(&t.commit_urls, &commit.url).ok_or_else(|| StoreError::not_found(&*commit))?;
        commit.id = Some(id);
        Ok(())
    }

    async fn create_commit(&self, commit: &mut Commit) -> StoreResult<()> {
        let mut t = self.tables.write().unwrap();
        if t.commit_urls.contains_key(&commit.url) {
            return Err(StoreError::unique_violation(&*commit));
        }
        if !t.users.iter().any(|u| u.id == Some(commit.author_id)) {
            return Err(StoreError::backend(format!(
                "FOREIGN KEY constraint failed: author_id {}",
                commit.author_id
            )));
        }
        if !t.repos.iter().any(|r| r.id == Some(commit.repo_id)) {
            return Err(StoreError::backend(format!(
                "FOREIGN KEY constraint failed: repo_id {}",
                commit.repo_id
            )));
        }
        let id = t.commits.len() as i64 + 1;
        let mut row = commit.clone();
        row.id = Some(id);
        t.commit_urls.insert(row.url.clone(), id);
        t.commits.push(row);
        commit.id = Some(id);
        Ok(())
    }

    async fn recent_commits(&self, since: DateTime<Utc>) -> StoreResult<Vec<RecentCommit>> {
        let t = self.tables.read().unwrap();
        let recent = t
            .commits
            .iter()
            .filter(|c| c.date > since)
            .filter_map(|c| {
                t.users
                    .iter()
                    .find(|u| u.id == Some(c.author_id))
                    .map(|u| RecentCommit {
                        commit: c.clone(),
                        author: u.clone(),
                    })
            })
            .collect();
        Ok(recent)
    }

    async fn counts(&self) -> StoreResult<RowCounts> {
        let t = self.tables.read().unwrap();
        Ok(RowCounts {
            sources: t.sources.len() as i64,
            users: t.users.len() as i64,
            repos: t.repos.len() as i64,
            commits: t.commits.len() as i64,
        })
    }
}
