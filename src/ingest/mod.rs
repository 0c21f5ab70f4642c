//! Recording ingestion.
//!
//! Decides, per fetched recording, whether it is processed now, deferred to
//! a later poll, or skipped for good.

pub mod readiness;

pub use readiness::Readiness;
