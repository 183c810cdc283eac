//! Sync data types
//!
//! Wire types for the pull/push protocol:
//! - Change records carrying a full entity
//! - Pull batches with revision watermarks
//! - Push batches and their per-record outcomes

use serde::{Deserialize, Serialize};

use crate::catalog::{CategoryRecord, EntityKind, ProductRecord};

/// Kind of change carried by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Upsert,
    Delete,
}

/// A single entity change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum ChangeRecord {
    Product { op: ChangeOp, data: ProductRecord },
    Category { op: ChangeOp, data: CategoryRecord },
}

impl ChangeRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            ChangeRecord::Product { .. } => EntityKind::Product,
            ChangeRecord::Category { .. } => EntityKind::Category,
        }
    }

    pub fn op(&self) -> ChangeOp {
        match self {
            ChangeRecord::Product { op, .. } | ChangeRecord::Category { op, .. } => *op,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ChangeRecord::Product { data, .. } => &data.id,
            ChangeRecord::Category { data, .. } => &data.id,
        }
    }

    pub fn rev(&self) -> u64 {
        match self {
            ChangeRecord::Product { data, .. } => data.rev,
            ChangeRecord::Category { data, .. } => data.rev,
        }
    }
}

/// Request to pull local changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// Watermark the caller has already seen
    #[serde(rename = "sinceRev")]
    pub since_rev: u64,
    /// Maximum number of changes to return
    pub limit: usize,
}

/// Batch of local changes returned by a pull
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    #[serde(rename = "sinceRev")]
    pub since_rev: u64,
    /// Highest revision in the store, never below `since_rev`
    #[serde(rename = "latestRev")]
    pub latest_rev: u64,
    pub changes: Vec<ChangeRecord>,
    /// Set when the batch filled the requested limit
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Batch of cloud changes delivered by a push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushBatch {
    /// Cloud-side watermark the changes were produced at
    #[serde(rename = "clientRev")]
    pub client_rev: u64,
    pub changes: Vec<ChangeRecord>,
}

/// Outcome of applying a push batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResult {
    #[serde(rename = "appliedCount")]
    pub applied_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ConflictRecord>>,
    /// Highest revision assigned in this call, 0 if nothing applied
    #[serde(rename = "latestRev")]
    pub latest_rev: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RecordFailure>,
}

/// Which version won a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Current,
    Incoming,
}

/// A rejected incoming write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub entity: EntityKind,
    pub id: String,
    #[serde(rename = "currentRev")]
    pub current_rev: u64,
    #[serde(rename = "incomingRev")]
    pub incoming_rev: u64,
    pub decided: Winner,
}

/// A record that could not be applied because of a storage failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub entity: EntityKind,
    pub id: String,
    #[serde(rename = "incomingRev")]
    pub incoming_rev: u64,
    pub message: String,
}

/// Snapshot of the local sync state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Highest revision in the store
    #[serde(rename = "latestRev")]
    pub latest_rev: u64,
    /// Highest watermark the cloud has pulled from
    #[serde(rename = "acknowledgedRev")]
    pub acknowledged_rev: u64,
    /// Local changes above the acknowledged watermark
    #[serde(rename = "pendingLocal")]
    pub pending_local: usize,
    pub products: usize,
    pub categories: usize,
    pub tombstones: usize,
}
