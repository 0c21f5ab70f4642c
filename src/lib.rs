//! wrapup - Call recording ingestion and wrap-up pipeline
//!
//! Polls a telephony platform for new call recordings, links each one to a
//! call session, auto-voids calls with no business content, opens a wrap-up
//! draft for the rest and pushes tickets or notes to the CRM.
//!
//! # Architecture
//!
//! The relational store is the only source of truth:
//! - A per-tenant cursor carries the recording watermark and processing lock
//! - Uniqueness constraints make every step idempotent across overlapping runs
//! - Failed CRM calls land in a retry queue keyed by an idempotency key
//!
//! # Modules
//!
//! - `adapters`: External systems (telephony, analyzer, CRM, alerts)
//! - `core`: Pipeline logic (Poller, RecordingProcessor, Dispatcher, ...)
//! - `domain`: Data structures (Recording, CallSession, WrapupDraft, ...)
//! - `ingest`: Per-recording readiness decisions
//! - `store`: SQLite persistence
//! - `serve`: HTTP health surface
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run one batch
//! wrapup poll
//!
//! # Poll every two minutes
//! wrapup watch --interval 120
//!
//! # Inspect the review queue
//! wrapup drafts
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod serve;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{BatchReport, Poller, RecordingProcessor};
pub use domain::{CallSession, Recording, WrapupDraft};
pub use store::Store;
