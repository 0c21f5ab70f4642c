//! Core pipeline logic.
//!
//! This module contains:
//! - Poller: lock, fetch, per-recording loop, watermark, sweeps
//! - RecordingProcessor: one recording from match to dispatch
//! - CallMatcher / IdentityResolver: who the call was with
//! - VoidRules: auto-void classification
//! - WrapupManager / Dispatcher: review drafts and CRM side effects
//! - PollerLimits: every threshold, validated

pub mod classifier;
pub mod cleanup;
pub mod dispatcher;
pub mod health;
pub mod identity;
pub mod limits;
pub mod matcher;
pub mod merge;
pub mod poller;
pub mod processor;
pub mod subject;
pub mod wrapup;

// Re-export commonly used types
pub use classifier::{VoidInput, VoidPolicy, VoidRules};
pub use dispatcher::{DispatchOutcome, DispatchSettings, Dispatcher};
pub use health::HealthReport;
pub use identity::{Identity, IdentityResolver};
pub use limits::{LimitViolation, PollerLimits};
pub use matcher::{CallMatcher, MatchOutcome, MatchStrategy};
pub use merge::{MergeCoordinator, MergeOutcome};
pub use poller::{BatchReport, PollError, Poller, SkipReason};
pub use processor::{ProcessOutcome, RecordingProcessor};
pub use wrapup::{WrapupError, WrapupManager};
