//! SQLite-backed [`Store`] implementation.
//!
//! Each `resolve_*` is a single `SELECT id … WHERE url = ?`; each
//! `create_*` is a single `INSERT`. A unique-constraint failure on insert
//! is reported as [`StoreError::UniqueViolation`] so the shared
//! get-or-create logic can recover from insert races.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use commitfeed_core::models::{Commit, Entity, RecentCommit, Repo, RowCounts, Source, User};
use commitfeed_core::store::{Store, StoreError, StoreResult};

/// SQLite implementation of the [`Store`] trait.
///
/// Wraps a [`SqlitePool`]; the schema is created by
/// [`migrate::apply_schema`](crate::migrate::apply_schema).
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Canonical text form for `git_commit.date`.
///
/// Always nine fractional digits, so the text is fixed-width and sorts
/// chronologically without losing sub-second precision.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_date(text: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn insert_error<E: Entity>(entity: &E, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::unique_violation(entity)
        }
        _ => StoreError::backend(err),
    }
}

fn recent_from_row(row: &SqliteRow) -> Result<RecentCommit, sqlx::Error> {
    let date: String = row.try_get("date")?;
    Ok(RecentCommit {
        commit: Commit {
            id: Some(row.try_get("id")?),
            source_id: row.try_get("source_id")?,
            author_id: row.try_get("author_id")?,
            repo_id: row.try_get("repo_id")?,
            message: row.try_get("message")?,
            sha: row.try_get("sha")?,
            url: row.try_get("url")?,
            date: parse_date(&date)?,
        },
        author: User {
            id: Some(row.try_get("author_id")?),
            source_id: row.try_get("author_source_id")?,
            username: row.try_get("author_username")?,
            url: row.try_get("author_url")?,
            avatar_url: row.try_get("author_avatar_url")?,
        },
    })
}

async fn resolve_id(pool: &SqlitePool, sql: &str, url: &str) -> StoreResult<Option<i64>> {
    sqlx::query_scalar(sql)
        .bind(url)
        .fetch_optional(pool)
        .await
        .map_err(StoreError::backend)
}

#[async_trait]
impl Store for SqliteStore {
    async fn source_by_name(&self, name: &str) -> StoreResult<Source> {
        let row = sqlx::query("SELECT id, name FROM git_source WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        match row {
            Some(r) => Ok(Source {
                id: r.try_get("id").map_err(StoreError::backend)?,
                name: r.try_get("name").map_err(StoreError::backend)?,
            }),
            None => Err(StoreError::MissingSource(name.to_string())),
        }
    }

    async fn resolve_user(&self, user: &mut User) -> StoreResult<()> {
        let id = resolve_id(&self.pool, "SELECT id FROM git_user WHERE url = ?", &user.url).await?;
        user.id = Some(id.ok_or_else(|| StoreError::not_found(&*user))?);
        Ok(())
    }

    async fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO git_user (source_id, username, url, avatar_url) VALUES (?, ?, ?, ?)",
        )
        .bind(user.source_id)
        .bind(&user.username)
        .bind(&user.url)
        .bind(&user.avatar_url)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(&*user, e))?;

        user.id = Some(result.last_insert_rowid());
        Ok(())
    }

    async fn resolve_repo(&self, repo: &mut Repo) -> StoreResult<()> {
        let id = resolve_id(&self.pool, "SELECT id FROM git_repo WHERE url = ?", &repo.url).await?;
        repo.id = Some(id.ok_or_else(|| StoreError::not_found(&*repo))?);
        Ok(())
    }

    async fn create_repo(&self, repo: &mut Repo) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO git_repo (source_id, name, description, url) VALUES (?, ?, ?, ?)",
        )
        .bind(repo.source_id)
        .bind(&repo.name)
        .bind(&repo.description)
        .bind(&repo.url)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(&*repo, e))?;

        repo.id = Some(result.last_insert_rowid());
        Ok(())
    }

    async fn resolve_commit(&self, commit: &mut Commit) -> StoreResult<()> {
        let id =
            resolve_id(&self.pool, "SELECT id FROM git_commit WHERE url = ?", &commit.url).await?;
        commit.id = Some(id.ok_or_else(|| StoreError::not_found(&*commit))?);
        Ok(())
    }

    async fn create_commit(&self, commit: &mut Commit) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO git_commit (source_id, author_id, repo_id, message, sha, url, date)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(commit.source_id)
        .bind(commit.author_id)
        .bind(commit.repo_id)
        .bind(&commit.message)
        .bind(&commit.sha)
        .bind(&commit.url)
        .bind(format_date(&commit.date))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(&*commit, e))?;

        commit.id = Some(result.last_insert_rowid());
        Ok(())
    }

    async fn recent_commits(&self, since: DateTime<Utc>) -> StoreResult<Vec<RecentCommit>> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.source_id, c.author_id, c.repo_id,
                c.message, c.sha, c.url, c.date,
                u.source_id AS author_source_id,
                u.username AS author_username,
                u.url AS author_url,
                u.avatar_url AS author_avatar_url
            FROM git_commit c
            INNER JOIN git_user u ON u.id = c.author_id
            WHERE c.date > ?
            "#,
        )
        .bind(format_date(&since))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.iter()
            .map(|row| recent_from_row(row).map_err(StoreError::backend))
            .collect()
    }

    async fn counts(&self) -> StoreResult<RowCounts> {
        let mut counts = RowCounts::default();
        for (table, slot) in [
            ("git_source", &mut counts.sources),
            ("git_user", &mut counts.users),
            ("git_repo", &mut counts.repos),
            ("git_commit", &mut counts.commits),
        ] {
            *slot = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::backend)?;
        }
        Ok(counts)
    }
}
