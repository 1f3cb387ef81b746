//! `cfeed recent`: list commits newer than a cutoff, with their authors.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};

use commitfeed_core::models::RecentCommit;
use commitfeed_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Cutoff used when none is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Parse a `--since` value: either `YYYY-MM-DD` (midnight UTC) or a full
/// RFC 3339 timestamp.
pub fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => bail!(
            "invalid date '{}': expected YYYY-MM-DD or an RFC 3339 timestamp",
            value
        ),
    }
}

pub fn default_since() -> DateTime<Utc> {
    Utc::now() - Duration::days(DEFAULT_WINDOW_DAYS)
}

/// Commits strictly after `since`, newest first.
///
/// The store returns rows in no particular order; sorting happens here.
pub async fn recent_sorted<S: Store + ?Sized>(
    store: &S,
    since: DateTime<Utc>,
) -> Result<Vec<RecentCommit>> {
    let mut commits = store.recent_commits(since).await?;
    commits.sort_by(|a, b| {
        b.commit
            .date
            .cmp(&a.commit.date)
            .then_with(|| b.commit.id.cmp(&a.commit.id))
    });
    Ok(commits)
}

pub async fn run_recent(config: &Config, since: Option<String>, json: bool) -> Result<()> {
    let since = match since.as_deref() {
        Some(value) => parse_since(value)?,
        None => default_since(),
    };

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let commits = recent_sorted(&store, since).await?;
    store.pool().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&commits)?);
        return Ok(());
    }

    if commits.is_empty() {
        println!("No commits since {}.", since.format("%Y-%m-%d %H:%M"));
        return Ok(());
    }

    println!("{:<17} {:<20} {:<9} MESSAGE", "DATE", "AUTHOR", "SHA");
    println!("{}", "-".repeat(80));
    for rc in &commits {
        println!(
            "{:<17} {:<20} {:<9} {}",
            rc.commit.date.format("%Y-%m-%d %H:%M"),
            truncate(&rc.author.username, 20),
            truncate(&rc.commit.sha, 8),
            first_line(&rc.commit.message)
        );
    }
    println!();
    println!("{} commit(s)", commits.len());
    Ok(())
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_since_date_only() {
        let since = parse_since("2015-09-02").unwrap();
        assert_eq!(since, Utc.with_ymd_and_hms(2015, 9, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_since_rfc3339() {
        let since = parse_since("2015-09-02T12:30:00+02:00").unwrap();
        assert_eq!(since, Utc.with_ymd_and_hms(2015, 9, 2, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_since_rejects_garbage() {
        assert!(parse_since("last tuesday").is_err());
    }

    #[test]
    fn test_truncate_and_first_line() {
        assert_eq!(truncate("abcdef0123456789", 8), "abcdef01");
        assert_eq!(truncate("ab", 8), "ab");
        assert_eq!(first_line("fix typo\n\nlonger body"), "fix typo");
    }
}
