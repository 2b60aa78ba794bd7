//! Common types used across the coordination services.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use swarm_store::StoreError;

/// Unique identifier for an agent in the swarm.
pub type AgentId = String;

/// Unique identifier for a proposal.
pub type ProposalId = String;

/// Unique identifier for a completed task record.
pub type TaskId = String;

/// Unique identifier for a work commitment.
pub type CommitmentId = String;

/// Unique identifier for a detected conflict.
pub type ConflictId = String;

/// Unique identifier for a coordination event.
pub type EventId = String;

/// Content-derived identifier for a mined pattern.
pub type PatternId = String;

/// Broad classes of failure, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The id names nothing.
    NotFound,
    /// The action is not valid for the current state.
    InvalidState,
    InvalidArgument,
    /// A best-effort external collaborator could not be reached.
    ExternalUnavailable,
    Internal,
}

/// Error types for coordination operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectiveError {
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Proposal is closed: {0}")]
    ProposalClosed(ProposalId),

    #[error("Proposal expired: {0}")]
    ProposalExpired(ProposalId),

    #[error("Invalid consensus rule: {0}")]
    InvalidRule(String),

    #[error("Commitment not found or already proven: {0}")]
    CommitmentNotFound(CommitmentId),

    #[error("Proof not found: {0}")]
    ProofNotFound(CommitmentId),

    #[error("No active intent for agent: {0}")]
    IntentNotFound(AgentId),

    #[error("Conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    #[error("Lore not found: {0}")]
    LoreNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("External collaborator unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CollectiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProposalNotFound(_)
            | Self::CommitmentNotFound(_)
            | Self::ProofNotFound(_)
            | Self::IntentNotFound(_)
            | Self::ConflictNotFound(_)
            | Self::LoreNotFound(_) => ErrorKind::NotFound,
            Self::ProposalClosed(_) | Self::ProposalExpired(_) => ErrorKind::InvalidState,
            Self::InvalidRule(_) | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ExternalUnavailable(_) => ErrorKind::ExternalUnavailable,
            Self::Store(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for CollectiveError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CollectiveError>;

/// Fresh random record id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Service state is only ever replaced wholesale after a successful write, so
/// a poisoned lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
