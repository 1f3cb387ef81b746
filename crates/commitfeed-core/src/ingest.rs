//! Ingestion orchestrator.
//!
//! Maps remote search hits onto domain entities and drives the
//! get-or-create calls in foreign-key order:
//!
//! 1. Build a [`User`](crate::models::User) from the hit's author and a
//!    [`Repo`](crate::models::Repo) from its repository.
//! 2. Resolve or create both. No dependency between the two; either
//!    failing aborts the item.
//! 3. Build the [`Commit`] from the resolved IDs and resolve or create it.
//!
//! A batch runs items with bounded parallelism. Each item is isolated: a
//! decode or storage failure is recorded in the [`IngestReport`] and the
//! remaining items carry on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Commit, Entity, EntityKind, Source};
use crate::remote::CommitItem;
use crate::store::{Resolution, Store, StoreError};

/// Why a single item could not be ingested.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("item does not match the search result shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0} has no resolved id")]
    Unresolved(EntityKind),

    #[error("{kind} {url}: {source}")]
    Store {
        kind: EntityKind,
        url: String,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    fn store<E: Entity>(entity: &E, source: StoreError) -> Self {
        IngestError::Store {
            kind: E::KIND,
            url: entity.url().to_string(),
            source,
        }
    }
}

/// Result of ingesting one item.
#[derive(Debug, Clone)]
pub struct IngestedCommit {
    pub commit: Commit,
    /// Whether this call inserted the commit row.
    pub created: bool,
}

/// Batch tuning.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Items in flight at once. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// How many item failures to keep in the report.
    pub max_reported_errors: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_reported_errors: 5,
        }
    }
}

/// Shared flag for stopping a batch between items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One failed item, as kept in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    /// Position of the item in the batch.
    pub index: usize,
    /// Commit URL, when the item decoded far enough to have one.
    pub url: Option<String>,
    pub error: String,
}

/// Outcome of [`ingest_batch`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items never started because the batch was cancelled.
    pub skipped: usize,
    /// Commit rows inserted by this batch.
    pub commits_created: usize,
    /// The first `max_reported_errors` failures, in batch order.
    pub failures: Vec<ItemFailure>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Ingest one decoded search hit.
///
/// The commit row is only attempted once both the author and the repo
/// carry resolved IDs.
pub async fn ingest_item<S: Store + ?Sized>(
    store: &S,
    source: &Source,
    item: &CommitItem,
) -> Result<IngestedCommit, IngestError> {
    let mut user = item.to_user(source);
    let mut repo = item.to_repo(source);

    store
        .get_or_create_user(&mut user)
        .await
        .map_err(|e| IngestError::store(&user, e))?;
    store
        .get_or_create_repo(&mut repo)
        .await
        .map_err(|e| IngestError::store(&repo, e))?;

    let author_id = user.id.ok_or(IngestError::Unresolved(EntityKind::User))?;
    let repo_id = repo.id.ok_or(IngestError::Unresolved(EntityKind::Repo))?;

    let mut commit = item.to_commit(source, author_id, repo_id);
    let resolution = store
        .get_or_create_commit(&mut commit)
        .await
        .map_err(|e| IngestError::store(&commit, e))?;

    Ok(IngestedCommit {
        commit,
        created: resolution == Resolution::Created,
    })
}

enum ItemOutcome {
    Done(IngestedCommit),
    Failed(ItemFailure),
    Skipped,
}

async fn run_item<S: Store + ?Sized>(
    store: &S,
    source: &Source,
    index: usize,
    raw: &serde_json::Value,
    cancel: &CancelFlag,
) -> ItemOutcome {
    if cancel.is_cancelled() {
        return ItemOutcome::Skipped;
    }

    let item = match CommitItem::decode(raw) {
        Ok(item) => item,
        Err(e) => {
            let err = IngestError::from(e);
            warn!(item = index, error = %err, "skipping undecodable item");
            let url = raw
                .get("html_url")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return ItemOutcome::Failed(ItemFailure {
                index,
                url,
                error: err.to_string(),
            });
        }
    };

    match ingest_item(store, source, &item).await {
        Ok(done) => {
            debug!(item = index, url = %done.commit.url, created = done.created, "ingested commit");
            ItemOutcome::Done(done)
        }
        Err(err) => {
            warn!(item = index, url = %item.url, error = %err, "failed to ingest item");
            ItemOutcome::Failed(ItemFailure {
                index,
                url: Some(item.url.clone()),
                error: err.to_string(),
            })
        }
    }
}

/// Ingest a batch of raw search hits.
///
/// Items are decoded one at a time, so a malformed item only fails
/// itself. Up to `options.concurrency` items are in flight at once.
/// The cancel flag is checked before each item starts.
pub async fn ingest_batch<S: Store + ?Sized>(
    store: &S,
    source: &Source,
    items: &[serde_json::Value],
    options: &IngestOptions,
    cancel: &CancelFlag,
) -> IngestReport {
    let mut report = IngestReport {
        total: items.len(),
        ..IngestReport::default()
    };

    let outcomes: Vec<ItemOutcome> = stream::iter(items.iter().enumerate())
        .map(move |(index, raw)| run_item(store, source, index, raw, cancel))
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            ItemOutcome::Done(done) => {
                report.succeeded += 1;
                if done.created {
                    report.commits_created += 1;
                }
            }
            ItemOutcome::Failed(failure) => {
                report.failed += 1;
                failures.push(failure);
            }
            ItemOutcome::Skipped => report.skipped += 1,
        }
    }

    failures.sort_by_key(|f| f.index);
    failures.truncate(options.max_reported_errors);
    report.failures = failures;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Repo, User};
    use crate::store::memory::InMemoryStore;
    use crate::store::StoreResult;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use futures::executor::block_on;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn raw_item(user_url: &str, repo_url: &str, commit_url: &str) -> serde_json::Value {
        json!({
            "html_url": commit_url,
            "sha": format!("sha-{}", commit_url),
            "commit": {
                "message": "fix typo",
                "author": { "date": "2015-09-03T12:00:00Z" }
            },
            "author": {
                "login": format!("login-{}", user_url),
                "avatar_url": "https://avatars.example/a.png",
                "html_url": user_url
            },
            "repository": {
                "name": "hello",
                "html_url": repo_url,
                "description": "a repo",
                "owner": {
                    "login": "owner",
                    "avatar_url": "https://avatars.example/o.png",
                    "html_url": "https://github.com/owner"
                }
            }
        })
    }

    fn setup() -> (InMemoryStore, Source) {
        let store = InMemoryStore::with_sources(&["github"]);
        let source = block_on(store.source_by_name("github")).unwrap();
        (store, source)
    }

    #[test]
    fn test_single_item_end_to_end() {
        let (store, source) = setup();
        let items = vec![raw_item("u1", "r1", "c1")];

        let report = block_on(ingest_batch(
            &store,
            &source,
            &items,
            &IngestOptions::default(),
            &CancelFlag::new(),
        ));
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.commits_created, 1);

        let users = store.users();
        let repos = store.repos();
        let commits = store.commits();
        assert_eq!(users.len(), 1);
        assert_eq!(repos.len(), 1);
        assert_eq!(commits.len(), 1);
        assert_eq!(users[0].url, "u1");
        assert_eq!(repos[0].url, "r1");
        assert_eq!(commits[0].url, "c1");
        assert_eq!(Some(commits[0].author_id), users[0].id);
        assert_eq!(Some(commits[0].repo_id), repos[0].id);
    }

    #[test]
    fn test_reingest_creates_no_rows() {
        let (store, source) = setup();
        let items = vec![raw_item("u1", "r1", "c1")];
        let opts = IngestOptions::default();

        block_on(ingest_batch(&store, &source, &items, &opts, &CancelFlag::new()));
        let before = block_on(store.counts()).unwrap();

        let report = block_on(ingest_batch(&store, &source, &items, &opts, &CancelFlag::new()));
        let after = block_on(store.counts()).unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.commits_created, 0);
        assert_eq!(before, after);
    }

    #[test]
    fn test_bad_item_does_not_fail_siblings() {
        let (store, source) = setup();
        let items = vec![
            raw_item("u1", "r1", "c1"),
            json!({ "html_url": "c2", "sha": 42 }),
            raw_item("u3", "r3", "c3"),
        ];

        let report = block_on(ingest_batch(
            &store,
            &source,
            &items,
            &IngestOptions::default(),
            &CancelFlag::new(),
        ));

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].url.as_deref(), Some("c2"));

        let urls: Vec<String> = store.commits().into_iter().map(|c| c.url).collect();
        assert!(urls.contains(&"c1".to_string()));
        assert!(urls.contains(&"c3".to_string()));
    }

    #[test]
    fn test_shared_author_and_repo_are_deduplicated() {
        let (store, source) = setup();
        let items = vec![
            raw_item("u1", "r1", "c1"),
            raw_item("u1", "r1", "c2"),
            raw_item("u1", "r2", "c3"),
        ];

        let report = block_on(ingest_batch(
            &store,
            &source,
            &items,
            &IngestOptions {
                concurrency: 1,
                max_reported_errors: 5,
            },
            &CancelFlag::new(),
        ));

        assert_eq!(report.succeeded, 3);
        assert_eq!(store.users().len(), 1);
        assert_eq!(store.repos().len(), 2);
        assert_eq!(store.commits().len(), 3);
    }

    #[test]
    fn test_failure_list_is_capped() {
        let (store, source) = setup();
        let items: Vec<serde_json::Value> = (0..8).map(|i| json!({ "bad": i })).collect();

        let report = block_on(ingest_batch(
            &store,
            &source,
            &items,
            &IngestOptions {
                concurrency: 3,
                max_reported_errors: 2,
            },
            &CancelFlag::new(),
        ));

        assert_eq!(report.failed, 8);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 0);
        assert_eq!(report.failures[1].index, 1);
    }

    #[test]
    fn test_cancelled_batch_skips_items() {
        let (store, source) = setup();
        let items = vec![raw_item("u1", "r1", "c1"), raw_item("u2", "r2", "c2")];
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = block_on(ingest_batch(
            &store,
            &source,
            &items,
            &IngestOptions::default(),
            &cancel,
        ));

        assert_eq!(report.skipped, 2);
        assert_eq!(report.succeeded, 0);
        assert!(!report.is_clean());
        assert!(store.commits().is_empty());
    }

    /// Wraps a store and fails `create_repo` for one URL.
    struct FailingRepoStore {
        inner: InMemoryStore,
        bad_url: String,
    }

    #[async_trait]
    impl Store for FailingRepoStore {
        async fn source_by_name(&self, name: &str) -> StoreResult<Source> {
            self.inner.source_by_name(name).await
        }
        async fn resolve_user(&self, user: &mut User) -> StoreResult<()> {
            self.inner.resolve_user(user).await
        }
        async fn create_user(&self, user: &mut User) -> StoreResult<()> {
            self.inner.create_user(user).await
        }
        async fn resolve_repo(&self, repo: &mut Repo) -> StoreResult<()> {
            self.inner.resolve_repo(repo).await
        }
        async fn create_repo(&self, repo: &mut Repo) -> StoreResult<()> {
            if repo.url == self.bad_url {
                return Err(StoreError::backend("disk I/O error"));
            }
            self.inner.create_repo(repo).await
        }
        async fn resolve_commit(&self, commit: &mut Commit) -> StoreResult<()> {
            self.inner.resolve_commit(commit).await
        }
        async fn create_commit(&self, commit: &mut Commit) -> StoreResult<()> {
            self.inner.create_commit(commit).await
        }
        async fn recent_commits(
            &self,
            since: DateTime<Utc>,
        ) -> StoreResult<Vec<crate::models::RecentCommit>> {
            self.inner.recent_commits(since).await
        }
        async fn counts(&self) -> StoreResult<crate::models::RowCounts> {
            self.inner.counts().await
        }
    }

    #[test]
    fn test_repo_failure_never_writes_commit() {
        let store = FailingRepoStore {
            inner: InMemoryStore::with_sources(&["github"]),
            bad_url: "r-bad".to_string(),
        };
        let source = block_on(store.source_by_name("github")).unwrap();
        let item = CommitItem::decode(&raw_item("u1", "r-bad", "c1")).unwrap();

        let err = block_on(ingest_item(&store, &source, &item)).unwrap_err();
        match err {
            IngestError::Store { kind, url, .. } => {
                assert_eq!(kind, EntityKind::Repo);
                assert_eq!(url, "r-bad");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.inner.commits().is_empty());
        assert_eq!(store.inner.users().len(), 1);
    }

    /// Simulates a stale read: the first `stale_reads` calls to
    /// `resolve_user` report a miss even when the row exists.
    struct StaleReadStore {
        inner: InMemoryStore,
        stale_reads: AtomicUsize,
    }

    #[async_trait]
    impl Store for StaleReadStore {
        async fn source_by_name(&self, name: &str) -> StoreResult<Source> {
            self.inner.source_by_name(name).await
        }
        async fn resolve_user(&self, user: &mut User) -> StoreResult<()> {
            let remaining = self.stale_reads.load(Ordering::SeqCst);
            if remaining > 0 {
                self.stale_reads.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::not_found(&*user));
            }
            self.inner.resolve_user(user).await
        }
        async fn create_user(&self, user: &mut User) -> StoreResult<()> {
            self.inner.create_user(user).await
        }
        async fn resolve_repo(&self, repo: &mut Repo) -> StoreResult<()> {
            self.inner.resolve_repo(repo).await
        }
        async fn create_repo(&self, repo: &mut Repo) -> StoreResult<()> {
            self.inner.create_repo(repo).await
        }
        async fn resolve_commit(&self, commit: &mut Commit) -> StoreResult<()> {
            self.inner.resolve_commit(commit).await
        }
        async fn create_commit(&self, commit: &mut Commit) -> StoreResult<()> {
            self.inner.create_commit(commit).await
        }
        async fn recent_commits(
            &self,
            since: DateTime<Utc>,
        ) -> StoreResult<Vec<crate::models::RecentCommit>> {
            self.inner.recent_commits(since).await
        }
        async fn counts(&self) -> StoreResult<crate::models::RowCounts> {
            self.inner.counts().await
        }
    }

    #[test]
    fn test_losing_writer_adopts_winner_id() {
        let store = StaleReadStore {
            inner: InMemoryStore::with_sources(&["github"]),
            stale_reads: AtomicUsize::new(2),
        };
        let make = || User {
            id: None,
            source_id: 1,
            username: "alice".to_string(),
            url: "u-race".to_string(),
            avatar_url: String::new(),
        };

        let mut winner = make();
        let mut loser = make();
        let first = block_on(store.get_or_create_user(&mut winner)).unwrap();
        let second = block_on(store.get_or_create_user(&mut loser)).unwrap();

        assert_eq!(first, Resolution::Created);
        assert_eq!(second, Resolution::Existing);
        assert_eq!(winner.id, loser.id);
        assert_eq!(store.inner.users().len(), 1);
    }

    /// Raises the cancel flag from inside the first `create_commit`, so
    /// cancellation lands while an item is mid-flight.
    struct CancellingStore {
        inner: InMemoryStore,
        cancel: CancelFlag,
    }

    #[async_trait]
    impl Store for CancellingStore {
        async fn source_by_name(&self, name: &str) -> StoreResult<Source> {
            self.inner.source_by_name(name).await
        }
        async fn resolve_user(&self, user: &mut User) -> StoreResult<()> {
            self.inner.resolve_user(user).await
        }
        async fn create_user(&self, user: &mut User) -> StoreResult<()> {
            self.inner.create_user(user).await
        }
        async fn resolve_repo(&self, repo: &mut Repo) -> StoreResult<()> {
            self.inner.resolve_repo(repo).await
        }
        async fn create_repo(&self, repo: &mut Repo) -> StoreResult<()> {
            self.inner.create_repo(repo).await
        }
        async fn resolve_commit(&self, commit: &mut Commit) -> StoreResult<()> {
            self.inner.resolve_commit(commit).await
        }
        async fn create_commit(&self, commit: &mut Commit) -> StoreResult<()> {
            self.cancel.cancel();
            self.inner.create_commit(commit).await
        }
        async fn recent_commits(
            &self,
            since: DateTime<Utc>,
        ) -> StoreResult<Vec<crate::models::RecentCommit>> {
            self.inner.recent_commits(since).await
        }
        async fn counts(&self) -> StoreResult<crate::models::RowCounts> {
            self.inner.counts().await
        }
    }

    #[test]
    fn test_cancel_mid_batch_finishes_started_item() {
        let cancel = CancelFlag::new();
        let store = CancellingStore {
            inner: InMemoryStore::with_sources(&["github"]),
            cancel: cancel.clone(),
        };
        let source = block_on(store.source_by_name("github")).unwrap();
        let items = vec![
            raw_item("u1", "r1", "c1"),
            raw_item("u2", "r2", "c2"),
            raw_item("u3", "r3", "c3"),
        ];

        let report = block_on(ingest_batch(
            &store,
            &source,
            &items,
            &IngestOptions {
                concurrency: 1,
                max_reported_errors: 5,
            },
            &cancel,
        ));

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.commits_created, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed, 0);

        let users = store.inner.users();
        let repos = store.inner.repos();
        let commits = store.inner.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].url, "c1");
        for c in &commits {
            assert!(users.iter().any(|u| u.id == Some(c.author_id)));
            assert!(repos.iter().any(|r| r.id == Some(c.repo_id)));
        }
        assert_eq!(users.len(), 1);
        assert_eq!(repos.len(), 1);
    }
}
