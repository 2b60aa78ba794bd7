//! Collective decision-making through structured voting.
//!
//! Any agent may put a proposal up for vote; every agent casts at most one
//! live vote per proposal (re-voting replaces the earlier vote). A proposal
//! stays open until it is resolved under its agreement rule or its deadline
//! passes. Both outcomes are terminal.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swarm_store::{Namespace, RecordStore, RecordStoreExt};
use tracing::{debug, info};

use crate::types::{lock, new_id, AgentId, CollectiveError, ProposalId, Result};

const PROPOSALS_NS: &str = "consensus/proposals";

/// How votes are turned into a decision.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusRule {
    /// No rejections and at least one approval.
    Unanimous,
    /// More than half of all votes approve.
    #[default]
    Majority,
    /// At least two thirds of all votes approve.
    Supermajority,
    /// Every quorum agent voted, and among them approvals beat rejections.
    Quorum,
    /// Approval weight exceeds half of the total weight.
    Weighted,
}

impl FromStr for ConsensusRule {
    type Err = CollectiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unanimous" => Ok(Self::Unanimous),
            "majority" => Ok(Self::Majority),
            "supermajority" | "super" => Ok(Self::Supermajority),
            "quorum" => Ok(Self::Quorum),
            "weighted" => Ok(Self::Weighted),
            _ => Err(CollectiveError::InvalidRule(s.to_string())),
        }
    }
}

impl fmt::Display for ConsensusRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unanimous => "unanimous",
            Self::Majority => "majority",
            Self::Supermajority => "supermajority",
            Self::Quorum => "quorum",
            Self::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

/// Status of a proposal. Only ever moves away from `Open`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Accepting votes.
    Open,
    /// Resolved and the rule was met.
    Passed,
    /// Resolved and the rule was not met.
    Rejected,
    /// The deadline passed before resolution. No further votes are taken.
    Expired,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Open
    }
}

/// An agent's position on a proposal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Approve,
    Reject,
    Abstain,
    Defer,
}

impl VoteChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Abstain => "abstain",
            Self::Defer => "defer",
        }
    }
}

/// A vote on a proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub agent: AgentId,
    pub choice: VoteChoice,
    pub reasoning: String,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Voting weight, only consulted by the weighted rule.
    pub weight: f64,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(agent: impl Into<AgentId>, choice: VoteChoice, reasoning: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            choice,
            reasoning: reasoning.into(),
            confidence: 1.0,
            weight: 1.0,
            cast_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = if weight.is_nan() { 0.0 } else { weight.max(0.0) };
        self
    }
}

/// Votes gathered for one choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OptionTally {
    pub count: usize,
    pub weight: f64,
    pub agents: Vec<AgentId>,
}

/// Snapshot of the votes on a proposal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tally {
    /// Keyed by choice name (`approve`, `reject`, ...).
    pub options: BTreeMap<String, OptionTally>,
    pub total_votes: usize,
    pub total_weight: f64,
}

impl Tally {
    fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut tally = Tally::default();
        for vote in votes {
            let entry = tally
                .options
                .entry(vote.choice.as_str().to_string())
                .or_default();
            entry.count += 1;
            entry.weight += vote.weight;
            entry.agents.push(vote.agent.clone());
            tally.total_votes += 1;
            tally.total_weight += vote.weight;
        }
        tally
    }

    pub fn count(&self, choice: VoteChoice) -> usize {
        self.options.get(choice.as_str()).map(|o| o.count).unwrap_or(0)
    }

    pub fn weight(&self, choice: VoteChoice) -> f64 {
        self.options.get(choice.as_str()).map(|o| o.weight).unwrap_or(0.0)
    }
}

/// Outcome of resolving a proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    pub passed: bool,
    pub reason: String,
    pub tally: Tally,
    pub resolved_at: DateTime<Utc>,
    /// Set when the cached outcome of an earlier resolution is returned.
    #[serde(default)]
    pub already_resolved: bool,
}

/// A decision up for vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub proposer: AgentId,
    pub category: String,
    pub options: Vec<String>,
    pub rule: ConsensusRule,
    /// Agents whose votes are mandatory under the quorum rule.
    #[serde(default)]
    pub quorum: BTreeSet<AgentId>,
    pub deadline: Option<DateTime<Utc>>,
    pub status: ProposalStatus,
    #[serde(default)]
    pub votes: BTreeMap<AgentId, Vote>,
    pub created_at: DateTime<Utc>,
    pub resolution: Option<Resolution>,
}

impl Proposal {
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map(|d| now >= d).unwrap_or(false)
    }

    /// Open and still inside its deadline.
    pub fn accepts_votes(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Open && !self.is_past_deadline(now)
    }

    pub fn tally(&self) -> Tally {
        Tally::from_votes(self.votes.values())
    }

    /// Apply the agreement rule to the current votes.
    fn evaluate(&self) -> (bool, String) {
        let tally = self.tally();
        if tally.total_votes == 0 {
            return (false, "No votes cast".to_string());
        }

        let approvals = tally.count(VoteChoice::Approve);
        let rejects = tally.count(VoteChoice::Reject);
        let total = tally.total_votes;

        match self.rule {
            ConsensusRule::Unanimous => {
                if rejects == 0 && approvals > 0 {
                    (true, "All voters approved".to_string())
                } else {
                    (false, "Not unanimous".to_string())
                }
            }
            ConsensusRule::Majority => (
                2 * approvals > total,
                format!("{}/{} approved (>50% required)", approvals, total),
            ),
            ConsensusRule::Supermajority => (
                3 * approvals >= 2 * total,
                format!("{}/{} approved (>=2/3 required)", approvals, total),
            ),
            ConsensusRule::Quorum => {
                let missing: Vec<&str> = self
                    .quorum
                    .iter()
                    .filter(|agent| !self.votes.contains_key(*agent))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    return (false, format!("Quorum not met, missing: {}", missing.join(", ")));
                }

                // An empty quorum set counts every voter.
                let counted = self
                    .votes
                    .values()
                    .filter(|v| self.quorum.is_empty() || self.quorum.contains(&v.agent));
                let (mut yes, mut no) = (0usize, 0usize);
                for vote in counted {
                    match vote.choice {
                        VoteChoice::Approve => yes += 1,
                        VoteChoice::Reject => no += 1,
                        VoteChoice::Abstain | VoteChoice::Defer => {}
                    }
                }
                (
                    yes > no,
                    format!("Quorum met, {} approve vs {} reject", yes, no),
                )
            }
            ConsensusRule::Weighted => {
                let approve_weight = tally.weight(VoteChoice::Approve);
                (
                    approve_weight > tally.total_weight / 2.0,
                    format!(
                        "Weighted: {:.2}/{:.2} approved",
                        approve_weight, tally.total_weight
                    ),
                )
            }
        }
    }
}

/// Parameters for a new proposal.
#[derive(Debug, Clone)]
pub struct ProposalDraft {
    pub proposer: AgentId,
    pub title: String,
    pub description: String,
    pub category: String,
    /// `None` uses the engine's default rule.
    pub rule: Option<ConsensusRule>,
    pub options: Vec<String>,
    pub quorum: BTreeSet<AgentId>,
    pub deadline: Option<DateTime<Utc>>,
}

impl ProposalDraft {
    pub fn new(
        proposer: impl Into<AgentId>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            proposer: proposer.into(),
            title: title.into(),
            description: description.into(),
            category: "general".to_string(),
            rule: None,
            options: vec!["approve".to_string(), "reject".to_string()],
            quorum: BTreeSet::new(),
            deadline: None,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn rule(mut self, rule: ConsensusRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn options(mut self, options: Vec<String>) -> Self {
        if !options.is_empty() {
            self.options = options;
        }
        self
    }

    pub fn quorum<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        self.quorum = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Owns every proposal and its votes.
pub struct ConsensusEngine {
    store: Arc<dyn RecordStore>,
    namespace: Namespace,
    default_rule: ConsensusRule,
    proposals: Mutex<BTreeMap<ProposalId, Proposal>>,
}

impl ConsensusEngine {
    /// Load persisted proposals from `store`.
    pub fn open(store: Arc<dyn RecordStore>, default_rule: ConsensusRule) -> Result<Self> {
        let namespace = Namespace::new(PROPOSALS_NS);
        let proposals: BTreeMap<ProposalId, Proposal> = store
            .list_records::<Proposal>(&namespace)?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        debug!("Loaded {} proposals", proposals.len());

        Ok(Self {
            store,
            namespace,
            default_rule,
            proposals: Mutex::new(proposals),
        })
    }

    pub fn default_rule(&self) -> ConsensusRule {
        self.default_rule
    }

    /// Create a new proposal.
    pub fn propose(&self, draft: ProposalDraft) -> Result<Proposal> {
        let proposal = Proposal {
            id: new_id(),
            title: draft.title,
            description: draft.description,
            proposer: draft.proposer,
            category: draft.category,
            options: draft.options,
            rule: draft.rule.unwrap_or(self.default_rule),
            quorum: draft.quorum,
            deadline: draft.deadline,
            status: ProposalStatus::Open,
            votes: BTreeMap::new(),
            created_at: Utc::now(),
            resolution: None,
        };

        let mut proposals = lock(&self.proposals);
        self.store
            .put_record(&self.namespace, &proposal.id, &proposal)?;
        proposals.insert(proposal.id.clone(), proposal.clone());

        info!(
            "Proposal {} '{}' opened by {} ({})",
            proposal.id, proposal.title, proposal.proposer, proposal.rule
        );
        Ok(proposal)
    }

    /// Cast or replace a vote.
    ///
    /// Voting past the deadline flips the proposal to expired before the
    /// error is returned.
    pub fn vote(&self, proposal_id: &str, vote: Vote) -> Result<()> {
        let now = Utc::now();
        let mut proposals = lock(&self.proposals);
        let proposal = proposals
            .get_mut(proposal_id)
            .ok_or_else(|| CollectiveError::ProposalNotFound(proposal_id.to_string()))?;

        if proposal.status != ProposalStatus::Open {
            return Err(CollectiveError::ProposalClosed(proposal_id.to_string()));
        }

        if proposal.is_past_deadline(now) {
            let mut updated = proposal.clone();
            updated.status = ProposalStatus::Expired;
            self.store.put_record(&self.namespace, &updated.id, &updated)?;
            *proposal = updated;
            info!("Proposal {} expired", proposal_id);
            return Err(CollectiveError::ProposalExpired(proposal_id.to_string()));
        }

        let mut updated = proposal.clone();
        debug!(
            "{} votes {} on {}",
            vote.agent,
            vote.choice.as_str(),
            proposal_id
        );
        updated.votes.insert(vote.agent.clone(), vote);
        self.store.put_record(&self.namespace, &updated.id, &updated)?;
        *proposal = updated;
        Ok(())
    }

    /// Current vote counts. Pure read.
    pub fn tally(&self, proposal_id: &str) -> Result<Tally> {
        let proposals = lock(&self.proposals);
        proposals
            .get(proposal_id)
            .map(Proposal::tally)
            .ok_or_else(|| CollectiveError::ProposalNotFound(proposal_id.to_string()))
    }

    /// Close a proposal under its rule.
    ///
    /// A proposal that already has an outcome returns it unchanged unless
    /// `force` is set; forcing recomputes the outcome from the current votes.
    /// Expired proposals keep their status but gain a recorded outcome.
    pub fn resolve(&self, proposal_id: &str, force: bool) -> Result<Resolution> {
        let mut proposals = lock(&self.proposals);
        let proposal = proposals
            .get_mut(proposal_id)
            .ok_or_else(|| CollectiveError::ProposalNotFound(proposal_id.to_string()))?;

        if let (Some(cached), false) = (&proposal.resolution, force) {
            let mut cached = cached.clone();
            cached.already_resolved = true;
            return Ok(cached);
        }

        let (passed, reason) = proposal.evaluate();
        let resolution = Resolution {
            passed,
            reason,
            tally: proposal.tally(),
            resolved_at: Utc::now(),
            already_resolved: false,
        };

        let mut updated = proposal.clone();
        if updated.status == ProposalStatus::Open {
            updated.status = if passed {
                ProposalStatus::Passed
            } else {
                ProposalStatus::Rejected
            };
        }
        updated.resolution = Some(resolution.clone());
        self.store.put_record(&self.namespace, &updated.id, &updated)?;
        *proposal = updated;

        info!(
            "Proposal {} resolved: passed={} ({})",
            proposal_id, resolution.passed, resolution.reason
        );
        Ok(resolution)
    }

    pub fn proposal(&self, proposal_id: &str) -> Option<Proposal> {
        lock(&self.proposals).get(proposal_id).cloned()
    }

    /// Proposals still accepting votes, newest first.
    pub fn open_proposals(&self, category: Option<&str>) -> Vec<Proposal> {
        let now = Utc::now();
        let mut open: Vec<Proposal> = lock(&self.proposals)
            .values()
            .filter(|p| p.accepts_votes(now))
            .filter(|p| category.map(|c| p.category.eq_ignore_ascii_case(c)).unwrap_or(true))
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open
    }

    /// Open proposals the agent has not voted on yet.
    pub fn pending_votes_for(&self, agent: &str) -> Vec<Proposal> {
        self.open_proposals(None)
            .into_iter()
            .filter(|p| !p.votes.contains_key(agent))
            .collect()
    }

    /// Mark every open proposal whose deadline has passed as expired.
    pub fn expire_overdue(&self) -> Result<Vec<ProposalId>> {
        let now = Utc::now();
        let mut proposals = lock(&self.proposals);
        let mut expired = Vec::new();

        for proposal in proposals.values_mut() {
            if proposal.status == ProposalStatus::Open && proposal.is_past_deadline(now) {
                let mut updated = proposal.clone();
                updated.status = ProposalStatus::Expired;
                self.store.put_record(&self.namespace, &updated.id, &updated)?;
                *proposal = updated;
                expired.push(proposal.id.clone());
            }
        }

        if !expired.is_empty() {
            info!("Expired {} overdue proposals", expired.len());
        }
        Ok(expired)
    }
}
