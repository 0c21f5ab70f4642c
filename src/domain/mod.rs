//! Domain types for the wrapup pipeline.
//!
//! This module contains the core data structures:
//! - Recording: what the telephony platform hands us
//! - CallSession: our record of a call
//! - WrapupDraft: the human-review unit, with its match suggestions
//! - PollCursor: per-tenant watermark and processing lock
//! - RetryEntry: failed downstream dispatches
//! - MergeRecord: durable email/voicemail pairing

pub mod analysis;
pub mod call;
pub mod cursor;
pub mod customer;
pub mod merge;
pub mod phone;
pub mod recording;
pub mod retry;
pub mod wrapup;

// Re-export commonly used types
pub use analysis::{Analysis, ExtractedEntities, Sentiment};
pub use call::{CallDirection, CallSession, CallStatus, NewCallSession};
pub use cursor::PollCursor;
pub use customer::{Agent, CrmCandidate, Customer};
pub use merge::{MergeRecord, MergeSource, MergeStatus};
pub use recording::Recording;
pub use retry::{NewRetryEntry, RetryEntry, RetryOperation};
pub use wrapup::{
    Completion, CompletionAction, DraftStatus, MatchStatus, MatchSuggestion, VoidReason,
    WrapupDraft,
};
