//! Database schema creation (idempotent).
//!
//! Creates the four normalized tables and seeds the `github` source row.
//! Every statement is `IF NOT EXISTS` / `OR IGNORE`, so `cfeed init` can
//! run any number of times.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Source rows present in every database.
pub const SEEDED_SOURCES: &[&str] = &["github"];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create tables, indexes, and reference rows on an open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS git_source (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS git_user (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE,
            avatar_url TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (source_id) REFERENCES git_source(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS git_repo (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL UNIQUE,
            FOREIGN KEY (source_id) REFERENCES git_source(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `date` is fixed-width RFC 3339 UTC text with nanoseconds, so string
    // comparison matches chronological order.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS git_commit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL,
            author_id INTEGER NOT NULL,
            repo_id INTEGER NOT NULL,
            message TEXT NOT NULL,
            sha TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE,
            date TEXT NOT NULL,
            FOREIGN KEY (source_id) REFERENCES git_source(id),
            FOREIGN KEY (author_id) REFERENCES git_user(id),
            FOREIGN KEY (repo_id) REFERENCES git_repo(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_git_commit_date ON git_commit(date)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_git_commit_author_id ON git_commit(author_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_git_commit_repo_id ON git_commit(repo_id)")
        .execute(pool)
        .await?;

    for name in SEEDED_SOURCES {
        sqlx::query("INSERT OR IGNORE INTO git_source (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
    }

    Ok(())
}
