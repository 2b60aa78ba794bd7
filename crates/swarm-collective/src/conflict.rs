//! Duplicate-work prevention through declared intents.
//!
//! Before starting work an agent declares what it is about to touch. The
//! declaration is compared against every other agent's live intent and any
//! overlap is reported as a [`Conflict`], graded by how specific the overlap
//! is: shared functions in a shared file are worse than a shared module,
//! which is worse than similar keywords.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use swarm_config::ConflictConfig;
use swarm_store::{Namespace, RecordStore, RecordStoreExt};
use tracing::{debug, info, warn};

use crate::similarity::{intersection, jaccard, normalize_idents, normalize_paths, parent_module};
use crate::types::{lock, new_id, AgentId, CollectiveError, ConflictId, Result};

const INTENTS_NS: &str = "conflict/intents";
const CONFLICTS_NS: &str = "conflict/conflicts";

const MODULE_THRESHOLD: f64 = 0.3;
const KEYWORD_LOW_THRESHOLD: f64 = 0.7;
const KEYWORD_INFO_THRESHOLD: f64 = 0.5;

/// Lifecycle of a work intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Being worked on; takes part in conflict checks until it expires.
    Active,
    /// The agent finished the work.
    Completed,
    /// The agent gave the work up.
    Abandoned,
}

/// How serious an overlap is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Blocking,
}

/// What a piece of work touches. Identifiers are normalised on use.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkTargets {
    pub files: BTreeSet<String>,
    pub modules: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
}

impl WorkTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.functions = functions.into_iter().map(Into::into).collect();
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Case-folded copy; modules are derived from files when none are given.
    pub fn normalized(&self) -> Self {
        let files = normalize_paths(&self.files);
        let modules = if self.modules.is_empty() {
            files.iter().filter_map(|f| parent_module(f)).collect()
        } else {
            normalize_idents(&self.modules)
        };
        Self {
            files,
            modules,
            functions: normalize_idents(&self.functions),
            keywords: normalize_idents(&self.keywords),
        }
    }
}

/// An agent's declared claim on a piece of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkIntent {
    pub agent: AgentId,
    pub description: String,
    #[serde(flatten)]
    pub targets: WorkTargets,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: IntentStatus,
}

impl WorkIntent {
    /// Active and not past its expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == IntentStatus::Active && now < self.expires_at
    }
}

/// A detected overlap between two intents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub id: ConflictId,
    /// Agent whose check found the overlap.
    pub agent: AgentId,
    /// Agent holding the existing intent.
    pub other_agent: AgentId,
    pub severity: Severity,
    pub reason: String,
    pub files: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    pub modules: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    /// Jaccard score of the dimension that triggered the conflict.
    pub similarity: f64,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl Conflict {
    fn new(agent: &str, other_agent: &str, severity: Severity, reason: String, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            agent: agent.to_string(),
            other_agent: other_agent.to_string(),
            severity,
            reason,
            files: BTreeSet::new(),
            functions: BTreeSet::new(),
            modules: BTreeSet::new(),
            keywords: BTreeSet::new(),
            similarity: 0.0,
            detected_at: now,
            resolved: false,
            resolution: None,
        }
    }
}

/// Parameters for [`ConflictDetector::declare_intent`].
#[derive(Debug, Clone)]
pub struct IntentDeclaration {
    pub agent: AgentId,
    pub description: String,
    pub targets: WorkTargets,
    /// `None` uses the detector's default lifetime.
    pub ttl: Option<Duration>,
}

impl IntentDeclaration {
    pub fn new(agent: impl Into<AgentId>, description: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            description: description.into(),
            targets: WorkTargets::default(),
            ttl: None,
        }
    }

    pub fn targets(mut self, targets: WorkTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = self.targets.files(files);
        self
    }

    pub fn functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = self.targets.functions(functions);
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = self.targets.keywords(keywords);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ConflictSettings {
    pub intent_ttl: Duration,
}

impl Default for ConflictSettings {
    fn default() -> Self {
        Self {
            intent_ttl: Duration::hours(4),
        }
    }
}

impl From<&ConflictConfig> for ConflictSettings {
    fn from(config: &ConflictConfig) -> Self {
        Self {
            intent_ttl: Duration::milliseconds((config.intent_ttl_hours * 3_600_000.0).round() as i64),
        }
    }
}

#[derive(Default)]
struct DetectorState {
    intents: BTreeMap<AgentId, WorkIntent>,
    conflicts: BTreeMap<ConflictId, Conflict>,
}

pub struct ConflictDetector {
    store: Arc<dyn RecordStore>,
    settings: ConflictSettings,
    intents_ns: Namespace,
    conflicts_ns: Namespace,
    state: Mutex<DetectorState>,
}

impl ConflictDetector {
    pub fn open(store: Arc<dyn RecordStore>, settings: ConflictSettings) -> Result<Self> {
        let intents_ns = Namespace::new(INTENTS_NS);
        let conflicts_ns = Namespace::new(CONFLICTS_NS);

        let mut state = DetectorState::default();
        for intent in store.list_records::<WorkIntent>(&intents_ns)? {
            state.intents.insert(intent.agent.clone(), intent);
        }
        for conflict in store.list_records::<Conflict>(&conflicts_ns)? {
            state.conflicts.insert(conflict.id.clone(), conflict);
        }
        debug!(
            "Loaded {} intents and {} conflicts",
            state.intents.len(),
            state.conflicts.len()
        );

        Ok(Self {
            store,
            settings,
            intents_ns,
            conflicts_ns,
            state: Mutex::new(state),
        })
    }

    /// Check for conflicts, then record (or replace) the agent's intent.
    pub fn declare_intent(&self, declaration: IntentDeclaration) -> Result<(WorkIntent, Vec<Conflict>)> {
        let now = Utc::now();
        let targets = declaration.targets.normalized();
        let ttl = declaration.ttl.unwrap_or(self.settings.intent_ttl);
        if ttl <= Duration::zero() {
            return Err(CollectiveError::InvalidArgument(
                "intent ttl must be positive".to_string(),
            ));
        }

        let mut state = lock(&self.state);
        let conflicts = self.detect(&mut state, &declaration.agent, &targets, now)?;

        let intent = WorkIntent {
            agent: declaration.agent,
            description: declaration.description,
            targets,
            started_at: now,
            expires_at: now + ttl,
            status: IntentStatus::Active,
        };
        self.store
            .put_record(&self.intents_ns, &intent.agent, &intent)?;
        state.intents.insert(intent.agent.clone(), intent.clone());

        info!(
            "{} declared intent on {} files ({} conflicts)",
            intent.agent,
            intent.targets.files.len(),
            conflicts.len()
        );
        Ok((intent, conflicts))
    }

    /// Compare targets against every other agent's live intent.
    ///
    /// Found conflicts are persisted for audit.
    pub fn check_conflicts(&self, agent: &str, targets: &WorkTargets) -> Result<Vec<Conflict>> {
        let mut state = lock(&self.state);
        self.detect(&mut state, agent, &targets.normalized(), Utc::now())
    }

    fn detect(
        &self,
        state: &mut DetectorState,
        agent: &str,
        targets: &WorkTargets,
        now: DateTime<Utc>,
    ) -> Result<Vec<Conflict>> {
        let mut found: Vec<Conflict> = state
            .intents
            .values()
            .filter(|other| other.agent != agent && other.is_live(now))
            .filter_map(|other| compare(agent, targets, other, now))
            .collect();
        found.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.other_agent.cmp(&b.other_agent))
        });

        for conflict in &found {
            self.store
                .put_record(&self.conflicts_ns, &conflict.id, conflict)?;
            state.conflicts.insert(conflict.id.clone(), conflict.clone());
            if conflict.severity >= Severity::High {
                warn!(
                    "{} conflicts with {}: {}",
                    conflict.agent, conflict.other_agent, conflict.reason
                );
            }
        }
        Ok(found)
    }

    pub fn complete_work(&self, agent: &str) -> Result<WorkIntent> {
        self.finish(agent, IntentStatus::Completed)
    }

    pub fn abandon_work(&self, agent: &str) -> Result<WorkIntent> {
        self.finish(agent, IntentStatus::Abandoned)
    }

    fn finish(&self, agent: &str, status: IntentStatus) -> Result<WorkIntent> {
        let now = Utc::now();
        let mut state = lock(&self.state);
        let intent = state
            .intents
            .get_mut(agent)
            .filter(|intent| intent.is_live(now))
            .ok_or_else(|| CollectiveError::IntentNotFound(agent.to_string()))?;

        let mut updated = intent.clone();
        updated.status = status;
        self.store.put_record(&self.intents_ns, agent, &updated)?;
        *intent = updated.clone();

        info!("{} finished intent ({:?})", agent, status);
        Ok(updated)
    }

    /// Live intent of one agent.
    pub fn agent_intent(&self, agent: &str) -> Option<WorkIntent> {
        let now = Utc::now();
        lock(&self.state)
            .intents
            .get(agent)
            .filter(|intent| intent.is_live(now))
            .cloned()
    }

    pub fn active_intents(&self) -> Vec<WorkIntent> {
        let now = Utc::now();
        lock(&self.state)
            .intents
            .values()
            .filter(|intent| intent.is_live(now))
            .cloned()
            .collect()
    }

    /// Files held by live intents, mapped to the holding agent.
    pub fn blocked_files(&self) -> BTreeMap<String, AgentId> {
        let now = Utc::now();
        let state = lock(&self.state);
        let mut blocked = BTreeMap::new();
        for intent in state.intents.values().filter(|i| i.is_live(now)) {
            for file in &intent.targets.files {
                blocked.insert(file.clone(), intent.agent.clone());
            }
        }
        blocked
    }

    /// Mark a conflict resolved. The only mutation a conflict ever sees.
    pub fn resolve_conflict(&self, conflict_id: &str, resolution: impl Into<String>) -> Result<Conflict> {
        let mut state = lock(&self.state);
        let conflict = state
            .conflicts
            .get_mut(conflict_id)
            .ok_or_else(|| CollectiveError::ConflictNotFound(conflict_id.to_string()))?;

        let mut updated = conflict.clone();
        updated.resolved = true;
        updated.resolution = Some(resolution.into());
        self.store
            .put_record(&self.conflicts_ns, conflict_id, &updated)?;
        *conflict = updated.clone();

        info!("Conflict {} resolved", conflict_id);
        Ok(updated)
    }

    /// Recorded conflicts, newest first.
    pub fn conflicts(&self, unresolved_only: bool) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = lock(&self.state)
            .conflicts
            .values()
            .filter(|c| !unresolved_only || !c.resolved)
            .cloned()
            .collect();
        conflicts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        conflicts
    }
}

fn joined(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Grade the overlap between `targets` and another agent's intent, most
/// specific dimension first.
fn compare(agent: &str, targets: &WorkTargets, other: &WorkIntent, now: DateTime<Utc>) -> Option<Conflict> {
    let theirs = &other.targets;

    let files = intersection(&targets.files, &theirs.files);
    if !files.is_empty() {
        let functions = intersection(&targets.functions, &theirs.functions);
        let (severity, reason) = if functions.is_empty() {
            (Severity::High, format!("Same file(s): {}", joined(&files)))
        } else {
            (
                Severity::Blocking,
                format!("Same file and function: {} in {}", joined(&functions), joined(&files)),
            )
        };
        let mut conflict = Conflict::new(agent, &other.agent, severity, reason, now);
        conflict.similarity = jaccard(&targets.files, &theirs.files);
        conflict.files = files;
        conflict.functions = functions;
        return Some(conflict);
    }

    let module_similarity = jaccard(&targets.modules, &theirs.modules);
    if module_similarity > MODULE_THRESHOLD {
        let modules = intersection(&targets.modules, &theirs.modules);
        let reason = format!("Same module(s): {}", joined(&modules));
        let mut conflict = Conflict::new(agent, &other.agent, Severity::Medium, reason, now);
        conflict.similarity = module_similarity;
        conflict.modules = modules;
        return Some(conflict);
    }

    let keyword_similarity = jaccard(&targets.keywords, &theirs.keywords);
    if keyword_similarity > KEYWORD_INFO_THRESHOLD {
        let severity = if keyword_similarity > KEYWORD_LOW_THRESHOLD {
            Severity::Low
        } else {
            Severity::Info
        };
        let keywords = intersection(&targets.keywords, &theirs.keywords);
        let reason = format!("Similar keywords: {}", joined(&keywords));
        let mut conflict = Conflict::new(agent, &other.agent, severity, reason, now);
        conflict.similarity = keyword_similarity;
        conflict.keywords = keywords;
        return Some(conflict);
    }

    None
}
