//! One handle over every coordination service, sharing a single store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use swarm_config::SwarmConfig;
use swarm_store::{FileStore, RecordStore};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::conflict::{Conflict, ConflictDetector, ConflictSettings, IntentDeclaration};
use crate::consensus::{ConsensusEngine, ConsensusRule, ProposalDraft, Vote};
use crate::knowledge::KnowledgeBase;
use crate::patterns::{EventContext, EventReport, MinerSettings, Outcome, PatternMiner};
use crate::profile::{AgentProfileStore, TaskRecord, TaskReport};
use crate::types::{CollectiveError, Result};
use crate::vcs::{self, VersionControl};
use crate::work_proof::{ProofSettings, WorkProof, WorkProofSystem};

/// Tunables for every service the hub owns.
#[derive(Debug, Clone, Default)]
pub struct CollectiveSettings {
    pub default_rule: ConsensusRule,
    pub conflict: ConflictSettings,
    pub proof: ProofSettings,
    pub miner: MinerSettings,
    /// Record service activity as coordination events.
    pub feed_events: bool,
}

impl CollectiveSettings {
    pub fn from_config(config: &SwarmConfig) -> Result<Self> {
        Ok(Self {
            default_rule: config.consensus.default_rule.parse()?,
            conflict: ConflictSettings::from(&config.conflict),
            proof: ProofSettings::from(&config.work_proof),
            miner: MinerSettings::from(&config.patterns),
            feed_events: config.patterns.feed_from_services,
        })
    }
}

pub struct Collective {
    consensus: ConsensusEngine,
    conflicts: ConflictDetector,
    profiles: AgentProfileStore,
    proofs: WorkProofSystem,
    patterns: PatternMiner,
    knowledge: KnowledgeBase,
    feed_events: bool,
}

impl Collective {
    /// Open every service over the configured on-disk store.
    pub fn open(config: &SwarmConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CollectiveError::InvalidArgument(e.to_string()))?;
        let settings = CollectiveSettings::from_config(config)?;
        let root = config.storage_root();
        let store: Arc<dyn RecordStore> = Arc::new(FileStore::open(root.clone())?);
        info!("Opening swarm collective at {}", root.display());
        Self::with_store(store, settings, vcs::from_config(&config.work_proof))
    }

    pub fn with_store(
        store: Arc<dyn RecordStore>,
        settings: CollectiveSettings,
        vcs: Arc<dyn VersionControl>,
    ) -> Result<Self> {
        Ok(Self {
            consensus: ConsensusEngine::open(store.clone(), settings.default_rule)?,
            conflicts: ConflictDetector::open(store.clone(), settings.conflict)?,
            profiles: AgentProfileStore::open(store.clone())?,
            proofs: WorkProofSystem::open(store.clone(), vcs, settings.proof)?,
            patterns: PatternMiner::open(store.clone(), settings.miner)?,
            knowledge: KnowledgeBase::open(store)?,
            feed_events: settings.feed_events,
        })
    }

    pub fn consensus(&self) -> &ConsensusEngine {
        &self.consensus
    }

    pub fn conflicts(&self) -> &ConflictDetector {
        &self.conflicts
    }

    pub fn profiles(&self) -> &AgentProfileStore {
        &self.profiles
    }

    pub fn proofs(&self) -> &WorkProofSystem {
        &self.proofs
    }

    pub fn patterns(&self) -> &PatternMiner {
        &self.patterns
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Record a task and feed it to the pattern miner.
    pub fn record_task(&self, report: TaskReport) -> Result<TaskRecord> {
        let record = self.profiles.record_task(report)?;
        if self.feed_events {
            let mut agents = vec![record.agent.clone()];
            agents.extend(record.collaborators.iter().cloned());
            let mut context = EventContext::category(record.category.clone());
            context.files = record.files.iter().cloned().collect();
            let outcome = if record.success {
                Outcome::Success
            } else {
                Outcome::Failure
            };
            self.feed(
                EventReport::new("task_complete", agents, outcome)
                    .context(context)
                    .duration_minutes(record.duration_minutes)
                    .quality(record.quality),
            );
        }
        Ok(record)
    }

    pub fn resolve_conflict(&self, conflict_id: &str, resolution: &str) -> Result<Conflict> {
        let conflict = self.conflicts.resolve_conflict(conflict_id, resolution)?;
        if self.feed_events {
            let mut context = EventContext::category("conflict");
            context.files = conflict.files.clone();
            self.feed(
                EventReport::new(
                    "conflict_resolved",
                    [conflict.agent.clone(), conflict.other_agent.clone()],
                    Outcome::Success,
                )
                .context(context),
            );
        }
        Ok(conflict)
    }

    pub async fn prove(&self, commitment_id: &str) -> Result<WorkProof> {
        let proof = self.proofs.prove(commitment_id).await?;
        if self.feed_events {
            let mut context = EventContext::default();
            context.files = proof
                .files_created
                .iter()
                .chain(&proof.files_modified)
                .chain(&proof.files_deleted)
                .cloned()
                .collect();
            context.extra.insert("task".to_string(), json!(proof.task));
            let outcome = if proof.valid {
                Outcome::Success
            } else {
                Outcome::Partial
            };
            let minutes = proof.duration().num_seconds() as f64 / 60.0;
            self.feed(
                EventReport::new("work_proven", [proof.agent.clone()], outcome)
                    .context(context)
                    .duration_minutes(minutes.max(0.0)),
            );
        }
        Ok(proof)
    }

    /// The originating operation already succeeded, so a failed event write
    /// is only logged.
    fn feed(&self, report: EventReport) {
        let event_type = report.event_type.clone();
        if let Err(e) = self.patterns.record_event(report) {
            warn!("Failed to record {} event: {}", event_type, e);
        }
    }

    /// Run one command and return its result as JSON.
    pub async fn execute(&self, command: Command) -> Result<Value> {
        debug!("Executing {:?}", command);
        match command {
            Command::Propose {
                proposer,
                title,
                description,
                category,
                rule,
                options,
                quorum,
                deadline,
                deadline_hours,
            } => {
                let mut draft = ProposalDraft::new(proposer, title, description).quorum(quorum);
                if let Some(category) = category {
                    draft = draft.category(category);
                }
                if let Some(rule) = rule {
                    draft = draft.rule(rule.parse()?);
                }
                if let Some(options) = options {
                    draft = draft.options(options);
                }
                let deadline = match (deadline, deadline_hours) {
                    (Some(deadline), _) => Some(deadline),
                    (None, Some(hours)) if hours.is_finite() => {
                        Some(Utc::now() + Duration::milliseconds((hours * 3_600_000.0).round() as i64))
                    }
                    (None, Some(hours)) => {
                        return Err(CollectiveError::InvalidArgument(format!(
                            "invalid deadline_hours: {}",
                            hours
                        )))
                    }
                    (None, None) => None,
                };
                if let Some(deadline) = deadline {
                    draft = draft.deadline(deadline);
                }
                to_json(&self.consensus.propose(draft)?)
            }
            Command::Vote {
                proposal_id,
                agent,
                choice,
                reasoning,
                confidence,
                weight,
            } => {
                let mut vote = Vote::new(agent, choice, reasoning);
                if let Some(confidence) = confidence {
                    vote = vote.with_confidence(confidence);
                }
                if let Some(weight) = weight {
                    vote = vote.with_weight(weight);
                }
                self.consensus.vote(&proposal_id, vote)?;
                let tally = self.consensus.tally(&proposal_id)?;
                Ok(json!({ "recorded": true, "tally": to_json(&tally)? }))
            }
            Command::Tally { proposal_id } => to_json(&self.consensus.tally(&proposal_id)?),
            Command::Resolve { proposal_id, force } => {
                to_json(&self.consensus.resolve(&proposal_id, force)?)
            }
            Command::GetProposal { proposal_id } => {
                let proposal = self
                    .consensus
                    .proposal(&proposal_id)
                    .ok_or(CollectiveError::ProposalNotFound(proposal_id))?;
                to_json(&proposal)
            }
            Command::OpenProposals { category } => {
                to_json(&self.consensus.open_proposals(category.as_deref()))
            }
            Command::PendingVotes { agent } => to_json(&self.consensus.pending_votes_for(&agent)),
            Command::ExpireProposals => to_json(&self.consensus.expire_overdue()?),

            Command::DeclareIntent {
                agent,
                description,
                targets,
                ttl_hours,
            } => {
                let mut declaration = IntentDeclaration::new(agent, description).targets(targets);
                if let Some(hours) = ttl_hours {
                    if !hours.is_finite() || hours <= 0.0 {
                        return Err(CollectiveError::InvalidArgument(format!(
                            "invalid ttl_hours: {}",
                            hours
                        )));
                    }
                    declaration =
                        declaration.ttl(Duration::milliseconds((hours * 3_600_000.0).round() as i64));
                }
                let (intent, conflicts) = self.conflicts.declare_intent(declaration)?;
                Ok(json!({ "intent": to_json(&intent)?, "conflicts": to_json(&conflicts)? }))
            }
            Command::CheckConflicts { agent, targets } => {
                to_json(&self.conflicts.check_conflicts(&agent, &targets)?)
            }
            Command::CompleteWork { agent } => to_json(&self.conflicts.complete_work(&agent)?),
            Command::AbandonWork { agent } => to_json(&self.conflicts.abandon_work(&agent)?),
            Command::AgentIntent { agent } => to_json(&self.conflicts.agent_intent(&agent)),
            Command::ActiveIntents => to_json(&self.conflicts.active_intents()),
            Command::BlockedFiles => to_json(&self.conflicts.blocked_files()),
            Command::ResolveConflict {
                conflict_id,
                resolution,
            } => to_json(&self.resolve_conflict(&conflict_id, &resolution)?),
            Command::Conflicts { unresolved_only } => {
                to_json(&self.conflicts.conflicts(unresolved_only))
            }

            Command::RecordTask {
                agent,
                category,
                description,
                files,
                duration_minutes,
                success,
                quality,
                reverted,
                review_score,
                collaborators,
            } => {
                let mut report = TaskReport::new(agent, category, description)
                    .files(files)
                    .duration_minutes(duration_minutes)
                    .success(success)
                    .quality(quality)
                    .reverted(reverted)
                    .collaborators(collaborators);
                if let Some(score) = review_score {
                    report = report.review_score(score);
                }
                let record = self.record_task(report)?;
                let profile = self.profiles.profile(&record.agent);
                Ok(json!({ "task": to_json(&record)?, "profile": to_json(&profile)? }))
            }
            Command::GetProfile { agent } => to_json(&self.profiles.profile(&agent)),
            Command::Profiles => to_json(&self.profiles.profiles()),
            Command::AgentTasks { agent } => to_json(&self.profiles.tasks(&agent)?),
            Command::FindBestAgent { query } => to_json(&self.profiles.find_best_agent(&query)),
            Command::TaskEstimate { agent, category } => {
                to_json(&self.profiles.task_estimate(&agent, &category))
            }
            Command::Leaderboard { category } => {
                to_json(&self.profiles.leaderboard(category.as_deref()))
            }
            Command::SuggestPairing { agent, category } => {
                to_json(&self.profiles.suggest_pairing(&agent, &category))
            }

            Command::CommitWork { agent, task, files } => {
                to_json(&self.proofs.commit(&agent, &task, files)?)
            }
            Command::ProveWork { commitment_id } => to_json(&self.prove(&commitment_id).await?),
            Command::VerifyProof {
                agent,
                commitment_id,
            } => {
                let proof = self
                    .proofs
                    .proof(&agent, &commitment_id)?
                    .ok_or(CollectiveError::ProofNotFound(commitment_id))?;
                to_json(&self.proofs.verify(&proof).await?)
            }
            Command::AgentProofs { agent } => to_json(&self.proofs.agent_proofs(&agent)?),
            Command::OpenCommitments { agent } => {
                to_json(&self.proofs.open_commitments(agent.as_deref()))
            }

            Command::RecordEvent {
                event_type,
                agents,
                context,
                outcome,
                duration_minutes,
                quality,
                tags,
            } => {
                let report = EventReport::new(event_type, agents, outcome)
                    .context(context)
                    .duration_minutes(duration_minutes)
                    .quality(quality)
                    .tags(tags);
                to_json(&self.patterns.record_event(report)?)
            }
            Command::Suggest { query } => to_json(&self.patterns.suggest(&query)),
            Command::Patterns { pattern_type } => to_json(&self.patterns.patterns(pattern_type)),
            Command::PatternStats => to_json(&self.patterns.stats()),
            Command::Events { limit } => {
                let mut events = self.patterns.events();
                if let Some(limit) = limit {
                    let skip = events.len().saturating_sub(limit);
                    events.drain(..skip);
                }
                to_json(&events)
            }

            Command::ShareLore {
                agent,
                category,
                title,
                wisdom,
                tags,
            } => to_json(&self.knowledge.share_lore(&agent, &category, &title, &wisdom, tags)?),
            Command::Recall {
                query,
                category,
                limit,
            } => to_json(&self.knowledge.recall(&query, category.as_deref(), limit)),
            Command::Endorse { lore_id } => to_json(&self.knowledge.endorse(&lore_id)?),
            Command::RecordDecision { report } => to_json(&self.knowledge.record_decision(report)?),
            Command::Decisions { agent } => to_json(&self.knowledge.decisions_of(&agent)),
            Command::KnowledgeStats => to_json(&self.knowledge.stats()),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| CollectiveError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use crate::vcs::NoVcs;
    use swarm_store::MemoryStore;

    fn hub(feed_events: bool) -> Collective {
        let settings = CollectiveSettings {
            feed_events,
            ..CollectiveSettings::default()
        };
        Collective::with_store(Arc::new(MemoryStore::new()), settings, Arc::new(NoVcs)).unwrap()
    }

    fn command(value: Value) -> Command {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_rule_is_rejected() {
        let hub = hub(false);
        let err = hub
            .execute(command(json!({
                "op": "propose",
                "proposer": "a1",
                "title": "Pick a color",
                "rule": "coin-flip"
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(hub.consensus().open_proposals(None).is_empty());
    }

    #[tokio::test]
    async fn test_task_feeds_pattern_miner() {
        let hub = hub(true);
        hub.execute(command(json!({
            "op": "record_task",
            "agent": "a1",
            "category": "infra",
            "collaborators": ["a2"],
            "quality": 0.9
        })))
        .await
        .unwrap();

        let events = hub.patterns().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "task_complete");
        assert_eq!(events[0].agents, vec!["a1", "a2"]);
        assert_eq!(events[0].context.category.as_deref(), Some("infra"));
    }

    #[tokio::test]
    async fn test_no_feed_when_disabled() {
        let hub = hub(false);
        hub.execute(command(json!({"op": "record_task", "agent": "a1", "category": "infra"})))
            .await
            .unwrap();
        assert!(hub.patterns().events().is_empty());
        assert!(hub.profiles().profile("a1").is_some());
    }

    #[tokio::test]
    async fn test_missing_proof_is_not_found() {
        let hub = hub(false);
        let err = hub
            .execute(command(json!({"op": "verify_proof", "agent": "a1", "commitment_id": "nope"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_events_limit_keeps_latest() {
        let hub = hub(false);
        for event_type in ["first", "second", "third"] {
            hub.execute(command(json!({
                "op": "record_event",
                "event_type": event_type,
                "agents": ["a1"],
                "outcome": "success"
            })))
            .await
            .unwrap();
        }
        let events = hub
            .execute(command(json!({"op": "events", "limit": 2})))
            .await
            .unwrap();
        let types: Vec<&str> = events
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event_type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["second", "third"]);
    }
}
