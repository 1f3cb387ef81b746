//! # commitfeed core
//!
//! Runtime-free logic for commitfeed: the remote search result model, the
//! normalized domain model, the storage abstraction with its in-memory
//! backend, and the ingestion orchestrator.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! The application crate supplies a [`store::Store`] backed by SQLite and
//! a client that produces [`remote::SearchPage`]s.

pub mod ingest;
pub mod models;
pub mod remote;
pub mod store;
