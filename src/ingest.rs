//! `cfeed sync`: fetch one page of commit search results and ingest it.
//!
//! The fetch is batch-level: if it fails, nothing is ingested and the
//! command exits non-zero. Once the page is in hand, items are handed to
//! [`commitfeed_core::ingest::ingest_batch`], where failures are isolated
//! per item and only show up in the printed report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use commitfeed_core::ingest::{ingest_batch, CancelFlag, IngestOptions, IngestReport};
use commitfeed_core::remote::SearchPage;
use commitfeed_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::github::GithubClient;
use crate::sqlite_store::SqliteStore;

/// Where a sync reads its search results from.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Overrides `github.query`.
    pub query: Option<String>,
    /// Read a saved search response instead of calling the API.
    pub file: Option<PathBuf>,
    /// Only ingest the first N items of the page.
    pub limit: Option<usize>,
}

pub async fn run_sync(config: &Config, opts: SyncOptions) -> Result<()> {
    let page = fetch_page(config, &opts).await?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let cancel = CancelFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight items");
                cancel.cancel();
            }
        })
    };

    let result = sync_page(config, &store, &page, opts.limit, &cancel).await;
    watcher.abort();
    let report = result?;

    let label = match &opts.file {
        Some(path) => path.display().to_string(),
        None => opts.query.clone().unwrap_or_else(|| config.github.query.clone()),
    };
    print_report(&config.ingest.source, &label, &page, &report);

    store.pool().close().await;
    Ok(())
}

/// Load the search page from a file or from the remote API.
pub async fn fetch_page(config: &Config, opts: &SyncOptions) -> Result<SearchPage> {
    if let Some(path) = &opts.file {
        let body = std::fs::read(path)
            .with_context(|| format!("Failed to read search response: {}", path.display()))?;
        return SearchPage::from_slice(&body)
            .with_context(|| format!("Invalid search response in {}", path.display()));
    }

    let query = opts.query.as_deref().unwrap_or(&config.github.query);
    let client = GithubClient::new(&config.github)?;
    let page = client
        .search_commits(query)
        .await
        .with_context(|| format!("Commit search for '{}' failed", query))?;
    info!(
        query,
        total_count = page.total_count,
        items = page.items.len(),
        "fetched commit search page"
    );
    Ok(page)
}

/// Ingest one page into `store` under the configured source.
pub async fn sync_page<S: Store + ?Sized>(
    config: &Config,
    store: &S,
    page: &SearchPage,
    limit: Option<usize>,
    cancel: &CancelFlag,
) -> Result<IngestReport> {
    let source = store
        .source_by_name(&config.ingest.source)
        .await
        .with_context(|| "Run `cfeed init` to create the schema and seed sources")?;

    let items = match limit {
        Some(n) => &page.items[..n.min(page.items.len())],
        None => &page.items[..],
    };

    let options = IngestOptions {
        concurrency: config
            .ingest
            .concurrency
            .min(db::MAX_CONNECTIONS as usize),
        max_reported_errors: config.ingest.max_reported_errors,
    };

    let report = ingest_batch(store, &source, items, &options, cancel).await;
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        commits_created = report.commits_created,
        "sync finished"
    );
    Ok(report)
}

fn print_report(source: &str, label: &str, page: &SearchPage, report: &IngestReport) {
    println!("sync {} \"{}\"", source, label);
    println!(
        "  fetched: {} items (total matches: {})",
        report.total, page.total_count
    );
    if page.incomplete_results {
        println!("  note: remote reported incomplete results");
    }
    println!("  succeeded: {}", report.succeeded);
    println!("  failed: {}", report.failed);
    println!("  skipped: {}", report.skipped);
    println!("  commits created: {}", report.commits_created);
    if !report.failures.is_empty() {
        println!("  errors (first {}):", report.failures.len());
        for f in &report.failures {
            println!(
                "    #{} {}: {}",
                f.index,
                f.url.as_deref().unwrap_or("-"),
                f.error
            );
        }
    }
    println!("ok");
}
