//! Shared pack knowledge: free-form lore agents pass on to each other, and a
//! log of the decisions they made along the way.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use swarm_store::{Namespace, RecordStore, RecordStoreExt};
use tracing::{debug, info};

use crate::similarity::normalize_ident;
use crate::types::{lock, new_id, AgentId, CollectiveError, Result};

const LORE_NS: &str = "memory/lore";
const DECISIONS_NS: &str = "memory/decisions";

pub const DEFAULT_RECALL_LIMIT: usize = 10;

/// A piece of knowledge shared with the pack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lore {
    pub id: String,
    pub agent: AgentId,
    pub category: String,
    pub title: String,
    pub wisdom: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub shared_at: DateTime<Utc>,
    /// Endorsements from other agents.
    #[serde(default)]
    pub respect: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Lore {
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.wisdom.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub id: String,
    pub agent: AgentId,
    pub decision: String,
    pub context: String,
    pub outcome: Option<String>,
    pub success: Option<bool>,
    #[serde(default)]
    pub lessons: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Parameters for [`KnowledgeBase::record_decision`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionReport {
    pub agent: AgentId,
    pub decision: String,
    pub context: String,
    pub outcome: Option<String>,
    pub success: Option<bool>,
    pub lessons: Vec<String>,
}

impl DecisionReport {
    pub fn new(agent: impl Into<AgentId>, decision: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            decision: decision.into(),
            context: context.into(),
            ..Self::default()
        }
    }

    pub fn outcome(mut self, outcome: impl Into<String>, success: bool) -> Self {
        self.outcome = Some(outcome.into());
        self.success = Some(success);
        self
    }

    pub fn lessons<I, S>(mut self, lessons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lessons = lessons.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeStats {
    pub lore_count: usize,
    pub decision_count: usize,
    pub categories: Vec<String>,
    pub agents: Vec<AgentId>,
}

#[derive(Default)]
struct KnowledgeState {
    lore: BTreeMap<String, Lore>,
    decisions: BTreeMap<AgentId, Vec<DecisionRecord>>,
}

pub struct KnowledgeBase {
    store: Arc<dyn RecordStore>,
    lore_ns: Namespace,
    decisions_ns: Namespace,
    state: Mutex<KnowledgeState>,
}

impl KnowledgeBase {
    pub fn open(store: Arc<dyn RecordStore>) -> Result<Self> {
        let lore_ns = Namespace::new(LORE_NS);
        let decisions_ns = Namespace::new(DECISIONS_NS);

        let lore = store
            .list_nested::<Lore>(&lore_ns)?
            .into_iter()
            .map(|l| (l.id.clone(), l))
            .collect();
        let mut decisions: BTreeMap<AgentId, Vec<DecisionRecord>> = BTreeMap::new();
        for record in store.list_nested::<DecisionRecord>(&decisions_ns)? {
            decisions.entry(record.agent.clone()).or_default().push(record);
        }
        for records in decisions.values_mut() {
            records.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        }

        Ok(Self {
            store,
            lore_ns,
            decisions_ns,
            state: Mutex::new(KnowledgeState { lore, decisions }),
        })
    }

    pub fn share_lore<I, S>(
        &self,
        agent: &str,
        category: &str,
        title: &str,
        wisdom: &str,
        tags: I,
    ) -> Result<Lore>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let category = normalize_ident(category);
        if agent.trim().is_empty() || category.is_empty() {
            return Err(CollectiveError::InvalidArgument(
                "lore needs an agent and a category".to_string(),
            ));
        }
        if title.trim().is_empty() && wisdom.trim().is_empty() {
            return Err(CollectiveError::InvalidArgument("lore is empty".to_string()));
        }

        let lore = Lore {
            id: new_id(),
            agent: agent.to_string(),
            category,
            title: title.to_string(),
            wisdom: wisdom.to_string(),
            tags: tags.into_iter().map(Into::into).collect(),
            shared_at: Utc::now(),
            respect: 0,
            metadata: BTreeMap::new(),
        };

        let mut state = lock(&self.state);
        self.store
            .put_record(&self.lore_ns.child(&lore.category), &lore.id, &lore)?;
        state.lore.insert(lore.id.clone(), lore.clone());
        info!("{} shared {} lore: {}", lore.agent, lore.category, lore.title);
        Ok(lore)
    }

    /// Lore whose title, wisdom or tags contain `query`, most respected first.
    pub fn recall(&self, query: &str, category: Option<&str>, limit: usize) -> Vec<Lore> {
        let needle = query.trim().to_lowercase();
        let category = category.map(normalize_ident);

        let mut found: Vec<Lore> = lock(&self.state)
            .lore
            .values()
            .filter(|l| category.as_ref().map(|c| &l.category == c).unwrap_or(true))
            .filter(|l| l.matches(&needle))
            .cloned()
            .collect();
        found.sort_by_key(|l| (Reverse(l.respect), Reverse(l.shared_at)));
        found.truncate(limit);
        debug!("Recalled {} lore for '{}'", found.len(), query);
        found
    }

    pub fn endorse(&self, lore_id: &str) -> Result<Lore> {
        let mut state = lock(&self.state);
        let mut lore = state
            .lore
            .get(lore_id)
            .cloned()
            .ok_or_else(|| CollectiveError::LoreNotFound(lore_id.to_string()))?;
        lore.respect += 1;
        self.store
            .put_record(&self.lore_ns.child(&lore.category), &lore.id, &lore)?;
        state.lore.insert(lore.id.clone(), lore.clone());
        Ok(lore)
    }

    pub fn record_decision(&self, report: DecisionReport) -> Result<DecisionRecord> {
        if report.agent.trim().is_empty() || report.decision.trim().is_empty() {
            return Err(CollectiveError::InvalidArgument(
                "a decision needs an agent and a description".to_string(),
            ));
        }
        let record = DecisionRecord {
            id: new_id(),
            agent: report.agent,
            decision: report.decision,
            context: report.context,
            outcome: report.outcome,
            success: report.success,
            lessons: report.lessons,
            recorded_at: Utc::now(),
        };

        let mut state = lock(&self.state);
        self.store
            .put_record(&self.decisions_ns.child(&record.agent), &record.id, &record)?;
        state
            .decisions
            .entry(record.agent.clone())
            .or_default()
            .push(record.clone());
        debug!("Recorded decision {} for {}", record.id, record.agent);
        Ok(record)
    }

    /// Decisions by `agent`, oldest first.
    pub fn decisions_of(&self, agent: &str) -> Vec<DecisionRecord> {
        lock(&self.state)
            .decisions
            .get(agent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stats(&self) -> KnowledgeStats {
        let state = lock(&self.state);
        let categories: BTreeSet<&str> = state.lore.values().map(|l| l.category.as_str()).collect();
        KnowledgeStats {
            lore_count: state.lore.len(),
            decision_count: state.decisions.values().map(Vec::len).sum(),
            categories: categories.into_iter().map(str::to_string).collect(),
            agents: state.decisions.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_store::FileStore;
    use tempfile::tempdir;

    #[test]
    fn test_recall_ranks_by_respect() {
        let dir = tempdir().unwrap();
        let kb = KnowledgeBase::open(Arc::new(FileStore::open(dir.path()).unwrap())).unwrap();

        let first = kb
            .share_lore("scout", "Debugging", "Circular imports", "Check the import graph", ["python"])
            .unwrap();
        let second = kb
            .share_lore("beta", "debugging", "Import cycles in Rust", "Split the crate", Vec::<String>::new())
            .unwrap();
        kb.share_lore("beta", "deploy", "Blue green", "Keep two stacks", ["IMPORT"])
            .unwrap();
        kb.endorse(&first.id).unwrap();

        let hits = kb.recall("IMPORT", Some("debugging"), DEFAULT_RECALL_LIMIT);
        let ids: Vec<&str> = hits.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert_eq!(hits[0].respect, 1);

        assert_eq!(kb.recall("import", None, 10).len(), 3);
        assert_eq!(kb.recall("import", None, 1).len(), 1);

        let reopened = KnowledgeBase::open(Arc::new(FileStore::open(dir.path()).unwrap())).unwrap();
        assert_eq!(reopened.recall("circular", None, 10)[0].respect, 1);
    }

    #[test]
    fn test_endorse_unknown_lore() {
        let dir = tempdir().unwrap();
        let kb = KnowledgeBase::open(Arc::new(FileStore::open(dir.path()).unwrap())).unwrap();
        let err = kb.endorse("missing").unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::NotFound);
    }

    #[test]
    fn test_decisions_and_stats() {
        let dir = tempdir().unwrap();
        let kb = KnowledgeBase::open(Arc::new(FileStore::open(dir.path()).unwrap())).unwrap();

        kb.record_decision(
            DecisionReport::new("beta", "Used async over threads", "High concurrency API")
                .outcome("50% faster", true)
                .lessons(["measure first"]),
        )
        .unwrap();
        kb.record_decision(DecisionReport::new("beta", "Added a cache", "Slow lookups"))
            .unwrap();
        kb.share_lore("scout", "tracking", "Trail", "Follow the logs", ["logs"])
            .unwrap();

        let decisions = kb.decisions_of("beta");
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].success, Some(true));
        assert!(kb.decisions_of("scout").is_empty());

        let stats = kb.stats();
        assert_eq!(stats.lore_count, 1);
        assert_eq!(stats.decision_count, 2);
        assert_eq!(stats.categories, vec!["tracking"]);
        assert_eq!(stats.agents, vec!["beta"]);
    }
}
