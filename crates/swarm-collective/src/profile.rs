//! Learned capability profiles.
//!
//! Every completed task is recorded once and folded into the agent's
//! profile: success rate, per-category scores, file and module expertise and
//! who they work well with. Profiles are then used to route new work to the
//! agent most likely to do it well.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use swarm_store::{Namespace, RecordStore, RecordStoreExt};
use tracing::{debug, info};

use crate::similarity::{file_stem, normalize_ident, normalize_path};
use crate::types::{lock, new_id, AgentId, CollectiveError, Result, TaskId};

const TASKS_NS: &str = "profiles/tasks";
const AGENTS_NS: &str = "profiles/agents";

const FAILED_TASK_SCORE: f64 = 0.3;
const REVERTED_PENALTY: f64 = 0.5;
const RECENT_HOURS_WINDOW: usize = 50;
const MAX_LISTED: usize = 3;
const STRENGTH_SCORE: f64 = 0.6;
const WEAKNESS_SCORE: f64 = 0.5;
const MIN_CATEGORY_COUNT: u32 = 2;
const MODULE_STRENGTH: f64 = 2.0;

const CATEGORY_WEIGHT: f64 = 2.0;
const SUCCESS_RATE_WEIGHT: f64 = 0.5;
const EXPERIENCE_SATURATION: f64 = 10.0;
const EXPERTISE_SATURATION: f64 = 5.0;

/// Path components that say nothing about what the code does.
const GENERIC_COMPONENTS: &[&str] = &["src", "lib", "test", "tests", "mod", "__init__", "index"];

/// A completed unit of work, as reported by the agent.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub agent: AgentId,
    pub category: String,
    pub description: String,
    pub files: Vec<String>,
    pub duration_minutes: f64,
    pub success: bool,
    pub quality: f64,
    pub reverted: bool,
    pub review_score: Option<f64>,
    pub collaborators: Vec<AgentId>,
}

impl TaskReport {
    pub fn new(agent: impl Into<AgentId>, category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            category: category.into(),
            description: description.into(),
            files: Vec::new(),
            duration_minutes: 0.0,
            success: true,
            quality: 1.0,
            reverted: false,
            review_score: None,
            collaborators: Vec::new(),
        }
    }

    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn duration_minutes(mut self, minutes: f64) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    pub fn reverted(mut self, reverted: bool) -> Self {
        self.reverted = reverted;
        self
    }

    pub fn review_score(mut self, score: f64) -> Self {
        self.review_score = Some(score);
        self
    }

    pub fn collaborators<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        self.collaborators = agents.into_iter().map(Into::into).collect();
        self
    }
}

/// Immutable record of a completed task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub agent: AgentId,
    pub category: String,
    pub description: String,
    pub files: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub success: bool,
    pub quality: f64,
    pub reverted: bool,
    pub review_score: Option<f64>,
    pub collaborators: Vec<AgentId>,
}

impl TaskRecord {
    /// Score a task contributes to category and expertise accumulators.
    pub fn task_score(&self) -> f64 {
        let mut score = if self.success {
            self.quality
        } else {
            FAILED_TASK_SCORE
        };
        if self.reverted {
            score *= REVERTED_PENALTY;
        }
        score
    }
}

/// An agent's record in one task category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryStats {
    /// Running mean of task scores.
    pub score: f64,
    /// Tasks recorded in this category.
    pub count: u32,
    /// Recency-weighted: each new sample is averaged with the previous value.
    pub avg_duration_minutes: f64,
}

/// Learned capability summary for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    pub agent: AgentId,
    pub total_tasks: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub categories: BTreeMap<String, CategoryStats>,
    pub file_expertise: BTreeMap<String, f64>,
    pub module_expertise: BTreeMap<String, f64>,
    /// Tasks done together, by collaborator.
    pub collaborators: BTreeMap<AgentId, u32>,
    /// UTC hours of the most recent completions.
    pub recent_hours: Vec<u32>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl AgentProfile {
    fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            total_tasks: 0,
            successes: 0,
            success_rate: 0.0,
            categories: BTreeMap::new(),
            file_expertise: BTreeMap::new(),
            module_expertise: BTreeMap::new(),
            collaborators: BTreeMap::new(),
            recent_hours: Vec::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    fn absorb(&mut self, task: &TaskRecord) {
        let score = task.task_score();

        self.total_tasks += 1;
        if task.success {
            self.successes += 1;
        }
        self.success_rate = f64::from(self.successes) / f64::from(self.total_tasks);

        let stats = self.categories.entry(task.category.clone()).or_default();
        stats.count += 1;
        let n = f64::from(stats.count);
        stats.score = (stats.score * (n - 1.0) + score) / n;
        stats.avg_duration_minutes = if stats.count == 1 {
            task.duration_minutes
        } else {
            (stats.avg_duration_minutes + task.duration_minutes) / 2.0
        };

        for file in &task.files {
            let path = normalize_path(file);
            if path.is_empty() {
                continue;
            }
            *self.file_expertise.entry(path.clone()).or_insert(0.0) += score;
            *self
                .module_expertise
                .entry(expertise_module(&path))
                .or_insert(0.0) += score;
        }

        for collaborator in &task.collaborators {
            if collaborator != &self.agent {
                *self.collaborators.entry(collaborator.clone()).or_insert(0) += 1;
            }
        }

        self.recent_hours.push(task.completed_at.hour());
        if self.recent_hours.len() > RECENT_HOURS_WINDOW {
            let excess = self.recent_hours.len() - RECENT_HOURS_WINDOW;
            self.recent_hours.drain(..excess);
        }

        self.recompute_strengths();
        self.updated_at = Utc::now();
    }

    fn recompute_strengths(&mut self) {
        let mut ranked: Vec<(&String, &CategoryStats)> = self.categories.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.1.count.cmp(&a.1.count))
        });

        let mut strengths: Vec<String> = ranked
            .iter()
            .filter(|(_, s)| s.score > STRENGTH_SCORE && s.count >= MIN_CATEGORY_COUNT)
            .take(MAX_LISTED)
            .map(|(c, _)| (*c).clone())
            .collect();

        let mut modules: Vec<(&String, &f64)> = self.module_expertise.iter().collect();
        modules.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(Ordering::Equal));
        for (module, _) in modules
            .into_iter()
            .filter(|(_, e)| **e > MODULE_STRENGTH)
            .take(MAX_LISTED)
        {
            if !strengths.contains(module) {
                strengths.push(module.clone());
            }
        }

        // weakest first
        self.weaknesses = ranked
            .iter()
            .rev()
            .filter(|(_, s)| s.score < WEAKNESS_SCORE && s.count >= MIN_CATEGORY_COUNT)
            .take(MAX_LISTED)
            .map(|(c, _)| (*c).clone())
            .collect();
        self.strengths = strengths;
    }
}

/// The most meaningful component of a path: the file stem, or the nearest
/// directory when the stem is generic.
pub fn expertise_module(path: &str) -> String {
    let normalized = normalize_path(path);
    let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let stem = segments.pop().and_then(file_stem);

    stem.into_iter()
        .chain(segments.into_iter().rev().map(str::to_string))
        .find(|part| !GENERIC_COMPONENTS.contains(&part.as_str()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// What a new piece of work needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentQuery {
    pub category: Option<String>,
    pub files: Vec<String>,
    pub modules: Vec<String>,
    pub exclude: BTreeSet<AgentId>,
}

impl AgentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
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

    pub fn exclude(mut self, agent: impl Into<AgentId>) -> Self {
        self.exclude.insert(agent.into());
        self
    }

    fn has_criteria(&self) -> bool {
        self.category.is_some() || !self.files.is_empty() || !self.modules.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMatch {
    pub agent: AgentId,
    /// Weighted average of the matched signals, in `[0, 1]`.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub agent: AgentId,
    pub score: f64,
    pub count: u32,
}

pub struct AgentProfileStore {
    store: Arc<dyn RecordStore>,
    tasks_ns: Namespace,
    agents_ns: Namespace,
    profiles: Mutex<BTreeMap<AgentId, AgentProfile>>,
}

impl AgentProfileStore {
    pub fn open(store: Arc<dyn RecordStore>) -> Result<Self> {
        let tasks_ns = Namespace::new(TASKS_NS);
        let agents_ns = Namespace::new(AGENTS_NS);
        let profiles: BTreeMap<AgentId, AgentProfile> = store
            .list_records::<AgentProfile>(&agents_ns)?
            .into_iter()
            .map(|p| (p.agent.clone(), p))
            .collect();
        debug!("Loaded {} agent profiles", profiles.len());

        Ok(Self {
            store,
            tasks_ns,
            agents_ns,
            profiles: Mutex::new(profiles),
        })
    }

    /// Persist a completed task and fold it into the agent's profile.
    pub fn record_task(&self, report: TaskReport) -> Result<TaskRecord> {
        if report.agent.trim().is_empty() {
            return Err(CollectiveError::InvalidArgument("agent id is empty".to_string()));
        }
        if !report.duration_minutes.is_finite() || report.duration_minutes < 0.0 {
            return Err(CollectiveError::InvalidArgument(format!(
                "invalid duration: {}",
                report.duration_minutes
            )));
        }
        if report.quality.is_nan() {
            return Err(CollectiveError::InvalidArgument("quality is NaN".to_string()));
        }

        let category = match normalize_ident(&report.category) {
            c if c.is_empty() => "general".to_string(),
            c => c,
        };
        let completed_at = Utc::now();
        let started_at =
            completed_at - Duration::milliseconds((report.duration_minutes * 60_000.0).round() as i64);

        let record = TaskRecord {
            id: new_id(),
            agent: report.agent,
            category,
            description: report.description,
            files: report.files,
            started_at,
            completed_at,
            duration_minutes: report.duration_minutes,
            success: report.success,
            quality: report.quality.clamp(0.0, 1.0),
            reverted: report.reverted,
            review_score: report.review_score,
            collaborators: report.collaborators,
        };

        let mut profiles = lock(&self.profiles);
        self.store
            .put_record(&self.tasks_ns.child(&record.agent), &record.id, &record)?;

        let mut profile = profiles
            .get(&record.agent)
            .cloned()
            .unwrap_or_else(|| AgentProfile::new(&record.agent));
        profile.absorb(&record);
        self.store
            .put_record(&self.agents_ns, &profile.agent, &profile)?;
        profiles.insert(profile.agent.clone(), profile);

        info!(
            "Recorded {} task for {} (success={}, score={:.2})",
            record.category,
            record.agent,
            record.success,
            record.task_score()
        );
        Ok(record)
    }

    pub fn profile(&self, agent: &str) -> Option<AgentProfile> {
        lock(&self.profiles).get(agent).cloned()
    }

    pub fn profiles(&self) -> Vec<AgentProfile> {
        lock(&self.profiles).values().cloned().collect()
    }

    /// Task history of one agent, oldest first.
    pub fn tasks(&self, agent: &str) -> Result<Vec<TaskRecord>> {
        let mut tasks: Vec<TaskRecord> = self.store.list_records(&self.tasks_ns.child(agent))?;
        tasks.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(tasks)
    }

    /// The agent best suited to the query.
    ///
    /// When the query names a category, files or modules, only agents with a
    /// matching signal are candidates. Without criteria, agents compete on
    /// success rate alone.
    pub fn find_best_agent(&self, query: &AgentQuery) -> Option<AgentMatch> {
        let category = query.category.as_deref().map(normalize_ident);
        let files: Vec<String> = query
            .files
            .iter()
            .map(|f| normalize_path(f))
            .filter(|f| !f.is_empty())
            .collect();
        let modules: Vec<String> = if query.modules.is_empty() {
            files.iter().map(|f| expertise_module(f)).collect()
        } else {
            query.modules.iter().map(|m| normalize_ident(m)).collect()
        };
        let needs_signal = query.has_criteria();

        let profiles = lock(&self.profiles);
        let mut candidates: Vec<AgentMatch> = profiles
            .values()
            .filter(|p| !query.exclude.contains(&p.agent))
            .filter_map(|profile| {
                let mut score = 0.0;
                let mut factors = 0.0;
                let mut matched = false;

                if let Some(stats) = category.as_ref().and_then(|c| profile.categories.get(c)) {
                    let experience = (f64::from(stats.count) / EXPERIENCE_SATURATION).min(1.0);
                    score += stats.score * experience * CATEGORY_WEIGHT;
                    factors += CATEGORY_WEIGHT;
                    matched = true;
                }
                for file in &files {
                    if let Some(expertise) = profile.file_expertise.get(file) {
                        score += (expertise / EXPERTISE_SATURATION).min(1.0);
                        factors += 1.0;
                        matched = true;
                    }
                }
                for module in &modules {
                    if let Some(expertise) = profile.module_expertise.get(module) {
                        score += (expertise / EXPERTISE_SATURATION).min(1.0);
                        factors += 1.0;
                        matched = true;
                    }
                }

                if needs_signal && !matched {
                    return None;
                }

                score += profile.success_rate * SUCCESS_RATE_WEIGHT;
                factors += SUCCESS_RATE_WEIGHT;
                Some(AgentMatch {
                    agent: profile.agent.clone(),
                    score: score / factors,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.agent.cmp(&b.agent))
        });
        candidates.into_iter().next()
    }

    /// Expected minutes for the agent to finish a task in `category`.
    pub fn task_estimate(&self, agent: &str, category: &str) -> Option<f64> {
        lock(&self.profiles)
            .get(agent)
            .and_then(|p| p.categories.get(&normalize_ident(category)))
            .map(|stats| stats.avg_duration_minutes)
    }

    /// Agents ranked by category score, or by overall success rate.
    pub fn leaderboard(&self, category: Option<&str>) -> Vec<LeaderboardEntry> {
        let category = category.map(normalize_ident);
        let mut board: Vec<LeaderboardEntry> = lock(&self.profiles)
            .values()
            .filter_map(|p| {
                let (score, count) = match &category {
                    Some(c) => p
                        .categories
                        .get(c)
                        .map(|s| (s.score, s.count))
                        .unwrap_or((0.0, 0)),
                    None => (p.success_rate, p.total_tasks),
                };
                (count > 0).then(|| LeaderboardEntry {
                    agent: p.agent.clone(),
                    score,
                    count,
                })
            })
            .collect();

        board.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.agent.cmp(&b.agent))
        });
        board
    }

    /// A good partner for `agent`: their most frequent collaborator, else the
    /// strongest other agent in the category.
    pub fn suggest_pairing(&self, agent: &str, category: &str) -> Option<AgentId> {
        let frequent = lock(&self.profiles).get(agent).and_then(|profile| {
            profile
                .collaborators
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(collaborator, _)| collaborator.clone())
        });

        frequent.or_else(|| {
            self.find_best_agent(&AgentQuery::new().category(category).exclude(agent))
                .map(|m| m.agent)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_store::{FileStore, MemoryStore};
    use tempfile::tempdir;

    fn store() -> AgentProfileStore {
        AgentProfileStore::open(Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_expertise_module() {
        assert_eq!(expertise_module("src/auth/login.py"), "login");
        assert_eq!(expertise_module("src/auth/__init__.py"), "auth");
        assert_eq!(expertise_module("crates/core/src/lib.rs"), "core");
        assert_eq!(expertise_module("src/"), "unknown");
    }

    #[test]
    fn test_debugging_becomes_strength() {
        let profiles = store();
        for _ in 0..3 {
            profiles
                .record_task(
                    TaskReport::new("a1", "Debugging", "fix flaky test")
                        .files(["src/auth.py"])
                        .duration_minutes(30.0)
                        .quality(0.9),
                )
                .unwrap();
        }

        let profile = profiles.profile("a1").unwrap();
        let stats = &profile.categories["debugging"];
        assert_eq!(stats.count, 3);
        assert!((stats.score - 0.9).abs() < 1e-9);
        assert!(profile.strengths.contains(&"debugging".to_string()));
        // 3 x 0.9 accumulated on the module
        assert!(profile.strengths.contains(&"auth".to_string()));
        assert_eq!(profile.recent_hours.len(), 3);
    }

    #[test]
    fn test_similar_agent_ids_keep_separate_histories() {
        let dir = tempdir().unwrap();
        let open = || AgentProfileStore::open(Arc::new(FileStore::open(dir.path()).unwrap())).unwrap();

        let profiles = open();
        profiles
            .record_task(TaskReport::new("ops bot", "deploy", "ship release"))
            .unwrap();
        profiles
            .record_task(TaskReport::new("ops_bot", "deploy", "roll back").success(false))
            .unwrap();
        drop(profiles);

        let reopened = open();
        assert_eq!(reopened.profiles().len(), 2);
        assert_eq!(reopened.profile("ops bot").unwrap().total_tasks, 1);
        assert_eq!(reopened.profile("ops_bot").unwrap().success_rate, 0.0);
        let spaced = reopened.tasks("ops bot").unwrap();
        assert_eq!(spaced.len(), 1);
        assert_eq!(spaced[0].description, "ship release");
        assert_eq!(reopened.tasks("ops_bot").unwrap().len(), 1);
    }

    #[test]
    fn test_success_rate_is_exact() {
        let profiles = store();
        let outcomes = [true, false, true, true, false, true, true];
        for success in outcomes {
            profiles
                .record_task(TaskReport::new("a1", "feature", "x").success(success))
                .unwrap();
        }
        let profile = profiles.profile("a1").unwrap();
        assert_eq!(profile.total_tasks, 7);
        assert_eq!(profile.successes, 5);
        assert!((profile.success_rate - 5.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_task_score_penalties() {
        let profiles = store();
        let failed = profiles
            .record_task(TaskReport::new("a1", "refactor", "x").success(false))
            .unwrap();
        assert!((failed.task_score() - 0.3).abs() < 1e-9);

        let reverted = profiles
            .record_task(TaskReport::new("a1", "refactor", "y").quality(0.8).reverted(true))
            .unwrap();
        assert!((reverted.task_score() - 0.4).abs() < 1e-9);

        let profile = profiles.profile("a1").unwrap();
        assert!((profile.categories["refactor"].score - 0.35).abs() < 1e-9);
        assert_eq!(profile.weaknesses, vec!["refactor".to_string()]);
    }

    #[test]
    fn test_duration_average_weights_recent_samples() {
        let profiles = store();
        for minutes in [10.0, 20.0, 40.0] {
            profiles
                .record_task(TaskReport::new("a1", "docs", "x").duration_minutes(minutes))
                .unwrap();
        }
        // ((10 + 20) / 2 + 40) / 2
        assert_eq!(profiles.task_estimate("a1", "DOCS"), Some(27.5));
        assert_eq!(profiles.task_estimate("a1", "infra"), None);
    }

    #[test]
    fn test_invalid_reports_rejected() {
        let profiles = store();
        assert!(matches!(
            profiles.record_task(TaskReport::new("a1", "x", "y").duration_minutes(-1.0)),
            Err(CollectiveError::InvalidArgument(_))
        ));
        assert!(matches!(
            profiles.record_task(TaskReport::new(" ", "x", "y")),
            Err(CollectiveError::InvalidArgument(_))
        ));
        assert!(profiles.profiles().is_empty());
    }

    #[test]
    fn test_find_best_agent() {
        let profiles = store();
        assert!(profiles.find_best_agent(&AgentQuery::new()).is_none());

        for _ in 0..5 {
            profiles
                .record_task(
                    TaskReport::new("db-expert", "database", "migration")
                        .files(["migrations/001.sql"])
                        .quality(0.95),
                )
                .unwrap();
        }
        profiles
            .record_task(TaskReport::new("generalist", "frontend", "css").quality(1.0))
            .unwrap();

        let best = profiles
            .find_best_agent(&AgentQuery::new().category("database"))
            .unwrap();
        assert_eq!(best.agent, "db-expert");
        assert!(best.score > 0.0 && best.score <= 1.0);

        let by_file = profiles
            .find_best_agent(&AgentQuery::new().files(["Migrations/001.sql"]))
            .unwrap();
        assert_eq!(by_file.agent, "db-expert");

        assert!(profiles
            .find_best_agent(&AgentQuery::new().category("security"))
            .is_none());
        assert!(profiles
            .find_best_agent(&AgentQuery::new().category("database").exclude("db-expert"))
            .is_none());
    }

    #[test]
    fn test_leaderboard_and_pairing() {
        let profiles = store();
        profiles
            .record_task(TaskReport::new("a1", "infra", "x").collaborators(["a2", "a3"]))
            .unwrap();
        profiles
            .record_task(TaskReport::new("a1", "infra", "y").collaborators(["a3"]))
            .unwrap();
        profiles
            .record_task(TaskReport::new("a2", "infra", "z").success(false))
            .unwrap();

        let board = profiles.leaderboard(Some("infra"));
        assert_eq!(board[0].agent, "a1");
        assert_eq!(board[0].count, 2);
        assert_eq!(board.len(), 2);

        assert_eq!(profiles.suggest_pairing("a1", "infra").as_deref(), Some("a3"));
        // a2 has no collaborators, falls back to the best infra agent
        assert_eq!(profiles.suggest_pairing("a2", "infra").as_deref(), Some("a1"));
        assert_eq!(profiles.tasks("a1").unwrap().len(), 2);
    }
}
