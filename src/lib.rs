//! # commitfeed
//!
//! Ingests commit search results from a code-hosting API into a normalized
//! relational store: one row per source, user, repository, and commit,
//! linked by foreign keys and deduplicated by URL.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ GitHub search│──▶│ ingest_batch │──▶│  SQLite  │
//! │   (1 page)   │   │ get-or-create│   │ 4 tables │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │ (cfeed)  │       │ read API │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! The storage-agnostic pieces (models, decoding, the `Store` trait, and
//! the ingestion pipeline) live in the `commitfeed-core` crate and are
//! re-exported here.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation and seeding |
//! | [`sqlite_store`] | SQLite `Store` backend |
//! | [`github`] | Commit search client |
//! | [`ingest`] | `cfeed sync` |
//! | [`recent`] | `cfeed recent` |
//! | [`stats`] | `cfeed stats` |
//! | [`server`] | Read-only HTTP API |
//! | [`logging`] | tracing subscriber setup |

pub mod config;
pub mod db;
pub mod github;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod recent;
pub mod server;
pub mod sqlite_store;
pub mod stats;

pub use commitfeed_core::{models, remote, store};
