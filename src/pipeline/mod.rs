//! The availability pass and its stages.
//!
//! - `detect`: status-cache diff into transitions
//! - `diff`: existence diff against the previous snapshot
//! - `guard`: snapshot shrink guard
//! - `matcher`: direct and similar-item matching
//! - `dedup`: similar-item suppression
//! - `batch`: one batch per subscriber per pass
//! - `dispatch`: channel fan-out
//! - `admin`: catalog-wide summaries
//! - `engine`: one pass end to end
//! - `scheduler`: periodic and on-demand triggering

pub mod admin;
pub mod batch;
pub mod dedup;
pub mod detect;
pub mod diff;
pub mod dispatch;
pub mod engine;
pub mod guard;
pub mod matcher;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use admin::{AdminAccumulator, AdminFanout};
pub use batch::{BatchState, Batcher, SubscriberBatch};
pub use dedup::{Deduplicator, Screened};
pub use detect::{ChangeDetector, Detection};
pub use diff::{ExistenceDiff, existence_diff};
pub use dispatch::{ChannelOutcome, DispatchReport, Dispatcher};
pub use engine::{Engine, EngineParts, PassReport};
pub use guard::{Shrink, SnapshotGuard, Verdict};
pub use matcher::{Match, Matcher, SubscriptionView, Watcher};
pub use scheduler::Scheduler;
