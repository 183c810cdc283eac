//! Sync error types

use thiserror::Error;

use crate::catalog::EntityKind;
use crate::error::StorageError;

/// Errors that fail a whole sync call
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("limit must be greater than zero (got {0})")]
    InvalidLimit(usize),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why a single change could not be applied
#[derive(Error, Debug)]
pub enum ApplyFailure {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no revision left above {base}")]
    RevisionOverflow { base: u64 },
}

/// A failure while applying one change.
///
/// Recoverable: the record is skipped and the rest of the batch proceeds.
#[derive(Error, Debug)]
#[error("failed to apply {entity} {id} (incoming rev {incoming_rev}): {source}")]
pub struct RecordApplyError {
    pub entity: EntityKind,
    pub id: String,
    pub incoming_rev: u64,
    pub current_rev: Option<u64>,
    #[source]
    pub source: ApplyFailure,
}
