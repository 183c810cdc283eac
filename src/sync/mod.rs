//! Sync module for local ↔ cloud catalog synchronization
//!
//! Provides:
//! - Revision-watermarked change harvesting (pull)
//! - Conflict-aware application of cloud changes (push)
//! - Content checksums for integrity checks
//!
//! # Sync Protocol
//!
//! 1. Cloud sends a pull with `sinceRev`; the agent returns local-origin
//!    changes above it plus the current high-water mark
//! 2. Cloud pages with `hasMore` and resumes from its own watermark
//! 3. Cloud sends a push with `clientRev` and its changes
//! 4. Agent applies each change independently and reports conflicts and
//!    failed records in the response body
//!
//! # Echo Avoidance
//!
//! Every record carries `updatedBy`. Only `local` records are exported, and
//! applied cloud changes are stamped `cloud`, so a change never travels back
//! to the side that produced it.

mod applier;
mod content_hash;
mod conflict;
mod engine;
mod error;
mod reader;
mod types;

pub use applier::CloudChangeApplier;
pub use content_hash::{checksum, checksum_value};
pub use conflict::{
    resolve_conflict, ConflictResolver, ConflictStrategy, LastWriteWins, Resolution,
    ResolutionPolicy, VersionStamp,
};
pub use engine::{SyncEngine, DEFAULT_MAX_BATCH};
pub use error::{ApplyFailure, RecordApplyError, SyncError};
pub use reader::LocalChangeReader;
pub use types::{
    ChangeBatch, ChangeOp, ChangeRecord, ConflictRecord, PullRequest, PushBatch, PushResult,
    RecordFailure, SyncStatus, Winner,
};
