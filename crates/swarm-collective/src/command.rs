//! Typed requests accepted by [`Collective::execute`](crate::Collective::execute).
//!
//! Each request is a JSON object whose `op` field names the operation, e.g.
//!
//! ```json
//! {"op": "vote", "proposal_id": "…", "agent": "a1", "choice": "approve"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conflict::WorkTargets;
use crate::consensus::VoteChoice;
use crate::knowledge::{DecisionReport, DEFAULT_RECALL_LIMIT};
use crate::patterns::{EventContext, Outcome, PatternType, SuggestionQuery};
use crate::profile::AgentQuery;
use crate::types::AgentId;

fn default_true() -> bool {
    true
}

fn default_quality() -> f64 {
    1.0
}

fn default_recall_limit() -> usize {
    DEFAULT_RECALL_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    // consensus
    Propose {
        proposer: AgentId,
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: Option<String>,
        /// Rule name; parsed so unknown names surface as invalid rules.
        #[serde(default)]
        rule: Option<String>,
        #[serde(default)]
        options: Option<Vec<String>>,
        #[serde(default)]
        quorum: Vec<AgentId>,
        #[serde(default)]
        deadline: Option<DateTime<Utc>>,
        /// Deadline relative to now, ignored when `deadline` is set.
        #[serde(default)]
        deadline_hours: Option<f64>,
    },
    Vote {
        proposal_id: String,
        agent: AgentId,
        choice: VoteChoice,
        #[serde(default)]
        reasoning: String,
        #[serde(default)]
        confidence: Option<f64>,
        #[serde(default)]
        weight: Option<f64>,
    },
    Tally {
        proposal_id: String,
    },
    Resolve {
        proposal_id: String,
        #[serde(default)]
        force: bool,
    },
    GetProposal {
        proposal_id: String,
    },
    OpenProposals {
        #[serde(default)]
        category: Option<String>,
    },
    PendingVotes {
        agent: AgentId,
    },
    ExpireProposals,

    // conflicts
    DeclareIntent {
        agent: AgentId,
        #[serde(default)]
        description: String,
        #[serde(flatten)]
        targets: WorkTargets,
        #[serde(default)]
        ttl_hours: Option<f64>,
    },
    CheckConflicts {
        agent: AgentId,
        #[serde(flatten)]
        targets: WorkTargets,
    },
    CompleteWork {
        agent: AgentId,
    },
    AbandonWork {
        agent: AgentId,
    },
    AgentIntent {
        agent: AgentId,
    },
    ActiveIntents,
    BlockedFiles,
    ResolveConflict {
        conflict_id: String,
        resolution: String,
    },
    Conflicts {
        #[serde(default)]
        unresolved_only: bool,
    },

    // profiles
    RecordTask {
        agent: AgentId,
        category: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        duration_minutes: f64,
        #[serde(default = "default_true")]
        success: bool,
        #[serde(default = "default_quality")]
        quality: f64,
        #[serde(default)]
        reverted: bool,
        #[serde(default)]
        review_score: Option<f64>,
        #[serde(default)]
        collaborators: Vec<AgentId>,
    },
    GetProfile {
        agent: AgentId,
    },
    Profiles,
    AgentTasks {
        agent: AgentId,
    },
    FindBestAgent {
        #[serde(flatten)]
        query: AgentQuery,
    },
    TaskEstimate {
        agent: AgentId,
        category: String,
    },
    Leaderboard {
        #[serde(default)]
        category: Option<String>,
    },
    SuggestPairing {
        agent: AgentId,
        category: String,
    },

    // work proofs
    CommitWork {
        agent: AgentId,
        task: String,
        files: Vec<String>,
    },
    ProveWork {
        commitment_id: String,
    },
    VerifyProof {
        agent: AgentId,
        commitment_id: String,
    },
    AgentProofs {
        agent: AgentId,
    },
    OpenCommitments {
        #[serde(default)]
        agent: Option<AgentId>,
    },

    // patterns
    RecordEvent {
        event_type: String,
        #[serde(default)]
        agents: Vec<AgentId>,
        #[serde(default)]
        context: EventContext,
        outcome: Outcome,
        #[serde(default)]
        duration_minutes: f64,
        #[serde(default = "default_quality")]
        quality: f64,
        #[serde(default)]
        tags: Vec<String>,
    },
    Suggest {
        #[serde(flatten)]
        query: SuggestionQuery,
    },
    Patterns {
        #[serde(default)]
        pattern_type: Option<PatternType>,
    },
    PatternStats,
    Events {
        /// Only the most recent `limit` events.
        #[serde(default)]
        limit: Option<usize>,
    },

    // pack memory
    ShareLore {
        agent: AgentId,
        category: String,
        #[serde(default)]
        title: String,
        wisdom: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    Recall {
        query: String,
        #[serde(default)]
        category: Option<String>,
        #[serde(default = "default_recall_limit")]
        limit: usize,
    },
    Endorse {
        lore_id: String,
    },
    RecordDecision {
        #[serde(flatten)]
        report: DecisionReport,
    },
    Decisions {
        agent: AgentId,
    },
    KnowledgeStats,
}
