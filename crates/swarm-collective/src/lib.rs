//! Coordination services for a swarm of autonomous agents.
//!
//! Five services share one [`RecordStore`](swarm_store::RecordStore):
//!
//! - [`ConsensusEngine`]: proposals, votes and rule-based resolution
//! - [`ConflictDetector`]: declared work intents and overlap detection
//! - [`AgentProfileStore`]: task history folded into per-agent profiles
//! - [`WorkProofSystem`]: before/after file evidence that work was done
//! - [`PatternMiner`]: regularities mined from coordination events
//!
//! [`KnowledgeBase`] keeps lore and decisions shared across the pack, and
//! [`Collective`] ties everything together behind the typed [`Command`]
//! dispatch.
//!
//! # Usage
//!
//! ```ignore
//! use swarm_collective::{Collective, Command};
//! use swarm_config::SwarmConfig;
//!
//! let collective = Collective::open(&SwarmConfig::load(None)?)?;
//! let command: Command = serde_json::from_str(r#"{"op": "active_intents"}"#)?;
//! let intents = collective.execute(command).await?;
//! ```

pub mod command;
pub mod conflict;
pub mod consensus;
pub mod hub;
pub mod knowledge;
pub mod patterns;
pub mod profile;
pub mod similarity;
pub mod types;
pub mod vcs;
pub mod work_proof;

pub use command::Command;
pub use conflict::{
    Conflict, ConflictDetector, ConflictSettings, IntentDeclaration, IntentStatus, Severity,
    WorkIntent, WorkTargets,
};
pub use consensus::{
    ConsensusEngine, ConsensusRule, Proposal, ProposalDraft, ProposalStatus, Resolution, Tally,
    Vote, VoteChoice,
};
pub use hub::{Collective, CollectiveSettings};
pub use knowledge::{DecisionRecord, DecisionReport, KnowledgeBase, KnowledgeStats, Lore};
pub use patterns::{
    CoordinationEvent, EventContext, EventReport, MinerSettings, MinerStats, Outcome, Pattern,
    PatternConditions, PatternMiner, PatternType, Suggestion, SuggestionQuery,
};
pub use profile::{
    AgentMatch, AgentProfile, AgentProfileStore, AgentQuery, CategoryStats, LeaderboardEntry,
    TaskRecord, TaskReport,
};
pub use types::{AgentId, CollectiveError, ErrorKind, Result};
pub use vcs::{DiffStats, GitCli, NoVcs, VersionControl};
pub use work_proof::{FileSnapshot, ProofSettings, Verification, WorkCommitment, WorkProof, WorkProofSystem};
