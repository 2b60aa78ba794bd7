//! Mining recurring coordination patterns out of the event log.
//!
//! Every coordination outcome is appended to an event log. Once the log is
//! long enough, each new event triggers a full re-mine over the whole log,
//! looking for four kinds of regularity:
//!
//! - **pairing**: agent groups that keep succeeding together
//! - **sequence**: categories that go well when done one after another
//! - **timing**: hours of the day where work tends to be best
//! - **context**: categories with a consistently high success rate
//!
//! Mined patterns are upserted by a content-derived id; they are refined as
//! evidence accumulates and never deleted.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use swarm_config::PatternsConfig;
use swarm_store::{Namespace, RecordStore, RecordStoreExt};
use tracing::{debug, info, warn};

use crate::similarity::{normalize_ident, normalize_paths};
use crate::types::{lock, AgentId, CollectiveError, EventId, PatternId, Result};

const EVENTS_NS: &str = "patterns/events";
const PATTERNS_NS: &str = "patterns/mined";

const MIN_PATTERN_EVENTS: usize = 3;
const PAIRING_SUCCESS_RATE: f64 = 0.8;
const PAIRING_QUALITY: f64 = 0.7;
const SEQUENCE_QUALITY: f64 = 0.7;
const PEAK_HOUR_QUALITY: f64 = 0.85;
const MAX_PEAK_HOURS: usize = 3;
const CONTEXT_MIN_EVENTS: usize = 5;
const CONTEXT_SUCCESS_RATE: f64 = 0.8;
const CONTEXT_TOP_AGENTS: usize = 3;
const EXAMPLE_EVENTS: usize = 5;

const CONTEXT_CONFIDENCE: f64 = 0.9;
const PAIRING_CONFIDENCE: f64 = 0.85;
const TIMING_CONFIDENCE: f64 = 0.7;
const MIN_CONFIDENCE: f64 = 0.5;
const MAX_SUGGESTIONS: usize = 5;

const UNKNOWN_CATEGORY: &str = "unknown";

/// How a coordination event ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The goal was met.
    Success,
    /// The goal was not met.
    Failure,
    /// Some of the goal was met. Counts against success rates.
    Partial,
}

/// Situation an event happened in. Known keys are typed; anything else is
/// kept verbatim in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub files: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EventContext {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    fn normalized(mut self) -> Self {
        self.category = self
            .category
            .map(|c| normalize_ident(&c))
            .filter(|c| !c.is_empty());
        self.files = normalize_paths(&self.files);
        self
    }
}

/// One recorded outcome of agents coordinating. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinationEvent {
    pub id: EventId,
    pub event_type: String,
    pub agents: Vec<AgentId>,
    pub context: EventContext,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
    pub duration_minutes: f64,
    pub quality: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CoordinationEvent {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    fn category_or_unknown(&self) -> &str {
        self.context.category.as_deref().unwrap_or(UNKNOWN_CATEGORY)
    }
}

/// Parameters for [`PatternMiner::record_event`].
#[derive(Debug, Clone)]
pub struct EventReport {
    pub event_type: String,
    pub agents: Vec<AgentId>,
    pub context: EventContext,
    pub outcome: Outcome,
    pub duration_minutes: f64,
    pub quality: f64,
    pub tags: Vec<String>,
    /// When the event happened; `None` means now.
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventReport {
    pub fn new<I, S>(event_type: impl Into<String>, agents: I, outcome: Outcome) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        Self {
            event_type: event_type.into(),
            agents: agents.into_iter().map(Into::into).collect(),
            context: EventContext::default(),
            outcome,
            duration_minutes: 0.0,
            quality: 1.0,
            tags: Vec::new(),
            timestamp: None,
        }
    }

    pub fn context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.context.category = Some(category.into());
        self
    }

    pub fn duration_minutes(mut self, minutes: f64) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Pairing,
    Sequence,
    Timing,
    Context,
}

impl PatternType {
    pub const ALL: [PatternType; 4] = [Self::Pairing, Self::Sequence, Self::Timing, Self::Context];
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pairing => "pairing",
            Self::Sequence => "sequence",
            Self::Timing => "timing",
            Self::Context => "context",
        };
        f.write_str(name)
    }
}

/// What has to hold for a pattern to apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternConditions {
    Pairing {
        agents: Vec<AgentId>,
        category: Option<String>,
    },
    Sequence {
        first_category: String,
        second_category: String,
    },
    Timing {
        peak_hours: Vec<u32>,
    },
    Context {
        category: String,
    },
}

/// A mined regularity over coordination events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    pub description: String,
    pub conditions: PatternConditions,
    pub actions: Vec<String>,
    pub success_rate: f64,
    pub occurrence_count: usize,
    pub avg_quality: f64,
    pub example_events: Vec<EventId>,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Pattern {
    pub fn pattern_type(&self) -> PatternType {
        match self.conditions {
            PatternConditions::Pairing { .. } => PatternType::Pairing,
            PatternConditions::Sequence { .. } => PatternType::Sequence,
            PatternConditions::Timing { .. } => PatternType::Timing,
            PatternConditions::Context { .. } => PatternType::Context,
        }
    }

    /// Same evidence, ignoring when it was seen.
    fn same_evidence(&self, other: &Pattern) -> bool {
        self.conditions == other.conditions
            && self.actions == other.actions
            && self.success_rate == other.success_rate
            && self.occurrence_count == other.occurrence_count
            && self.avg_quality == other.avg_quality
            && self.example_events == other.example_events
    }
}

/// Current situation to match patterns against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionQuery {
    pub category: Option<String>,
    pub files: Vec<String>,
    /// Candidate agent pool.
    pub agents: Option<Vec<AgentId>>,
}

impl SuggestionQuery {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        self.agents = Some(agents.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub pattern_id: PatternId,
    pub pattern_name: String,
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_actions: Vec<String>,
    pub expected_outcome: String,
    pub similar_past_events: Vec<EventId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternSummary {
    pub id: PatternId,
    pub name: String,
    pub success_rate: f64,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinerStats {
    pub event_count: usize,
    pub pattern_count: usize,
    pub by_type: BTreeMap<String, usize>,
    pub top_patterns: Vec<PatternSummary>,
}

#[derive(Debug, Clone)]
pub struct MinerSettings {
    /// Events required before mining starts.
    pub min_events: usize,
    pub sequence_window: Duration,
}

impl Default for MinerSettings {
    fn default() -> Self {
        Self {
            min_events: 5,
            sequence_window: Duration::hours(2),
        }
    }
}

impl From<&PatternsConfig> for MinerSettings {
    fn from(config: &PatternsConfig) -> Self {
        Self {
            min_events: config.min_events,
            sequence_window: Duration::minutes(config.sequence_window_minutes),
        }
    }
}

#[derive(Default)]
struct MinerState {
    events: Vec<CoordinationEvent>,
    patterns: BTreeMap<PatternId, Pattern>,
}

pub struct PatternMiner {
    store: Arc<dyn RecordStore>,
    settings: MinerSettings,
    events_ns: Namespace,
    patterns_ns: Namespace,
    state: Mutex<MinerState>,
}

impl PatternMiner {
    pub fn open(store: Arc<dyn RecordStore>, settings: MinerSettings) -> Result<Self> {
        let events_ns = Namespace::new(EVENTS_NS);
        let patterns_ns = Namespace::new(PATTERNS_NS);

        let mut events: Vec<CoordinationEvent> = store.list_records(&events_ns)?;
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        let patterns: BTreeMap<PatternId, Pattern> = store
            .list_records::<Pattern>(&patterns_ns)?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        debug!("Loaded {} events and {} patterns", events.len(), patterns.len());

        Ok(Self {
            store,
            settings,
            events_ns,
            patterns_ns,
            state: Mutex::new(MinerState { events, patterns }),
        })
    }

    /// Append an event and re-mine once the log is long enough.
    ///
    /// The event is durable once this returns `Ok`. A failed mining pass is
    /// logged and retried on the next event.
    pub fn record_event(&self, report: EventReport) -> Result<CoordinationEvent> {
        if report.event_type.trim().is_empty() {
            return Err(CollectiveError::InvalidArgument("event type is empty".to_string()));
        }
        if report.quality.is_nan() || !report.duration_minutes.is_finite() || report.duration_minutes < 0.0 {
            return Err(CollectiveError::InvalidArgument(
                "quality and duration must be finite, duration non-negative".to_string(),
            ));
        }

        let agents: BTreeSet<AgentId> = report
            .agents
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        let event = CoordinationEvent {
            id: uuid::Uuid::now_v7().to_string(),
            event_type: report.event_type,
            agents: agents.into_iter().collect(),
            context: report.context.normalized(),
            outcome: report.outcome,
            timestamp: report.timestamp.unwrap_or_else(Utc::now),
            duration_minutes: report.duration_minutes,
            quality: report.quality.clamp(0.0, 1.0),
            tags: report.tags,
        };

        let mut state = lock(&self.state);
        self.store.put_record(&self.events_ns, &event.id, &event)?;
        let position = state
            .events
            .partition_point(|e| e.timestamp <= event.timestamp);
        state.events.insert(position, event.clone());
        debug!(
            "Recorded {} event ({:?}) for {:?}",
            event.event_type, event.outcome, event.agents
        );

        if state.events.len() >= self.settings.min_events {
            if let Err(e) = self.remine(&mut state) {
                warn!("Pattern mining failed after event {}: {}", event.id, e);
            }
        }
        Ok(event)
    }

    fn remine(&self, state: &mut MinerState) -> Result<()> {
        let now = Utc::now();
        for mut pattern in mine(&state.events, &self.settings, now) {
            match state.patterns.get(&pattern.id) {
                Some(existing) if existing.same_evidence(&pattern) => continue,
                Some(existing) => pattern.discovered_at = existing.discovered_at,
                None => info!("Discovered {} pattern: {}", pattern.pattern_type(), pattern.name),
            }
            self.store
                .put_record(&self.patterns_ns, &pattern.id, &pattern)?;
            state.patterns.insert(pattern.id.clone(), pattern);
        }
        Ok(())
    }

    /// Patterns relevant to the query, most confident first.
    pub fn suggest(&self, query: &SuggestionQuery) -> Vec<Suggestion> {
        self.suggest_at(query, Utc::now())
    }

    /// [`suggest`](Self::suggest) evaluated as if the current time were `now`.
    pub fn suggest_at(&self, query: &SuggestionQuery, now: DateTime<Utc>) -> Vec<Suggestion> {
        let category = query
            .category
            .as_deref()
            .map(normalize_ident)
            .filter(|c| !c.is_empty());
        let pool: Option<BTreeSet<&str>> = query
            .agents
            .as_ref()
            .filter(|a| !a.is_empty())
            .map(|agents| agents.iter().map(String::as_str).collect());
        let hour = now.hour();

        let state = lock(&self.state);
        let mut suggestions: Vec<Suggestion> = state
            .patterns
            .values()
            .filter_map(|pattern| {
                let (confidence, reasoning) = match &pattern.conditions {
                    PatternConditions::Context { category: c } if category.as_ref() == Some(c) => (
                        pattern.success_rate * CONTEXT_CONFIDENCE,
                        format!("Pattern '{}' matches category {}", pattern.name, c),
                    ),
                    PatternConditions::Pairing {
                        agents,
                        category: paired_in,
                    } => {
                        let matched = match &pool {
                            Some(pool) => agents.iter().all(|a| pool.contains(a.as_str())),
                            None => category.is_some() && paired_in.as_ref() == category.as_ref(),
                        };
                        if !matched {
                            return None;
                        }
                        (
                            pattern.success_rate * PAIRING_CONFIDENCE,
                            format!("{} have succeeded together before", agents.join(" and ")),
                        )
                    }
                    PatternConditions::Timing { peak_hours } if peak_hours.contains(&hour) => (
                        TIMING_CONFIDENCE,
                        "Current time is a peak productivity hour".to_string(),
                    ),
                    _ => return None,
                };

                (confidence >= MIN_CONFIDENCE).then(|| Suggestion {
                    pattern_id: pattern.id.clone(),
                    pattern_name: pattern.name.clone(),
                    pattern_type: pattern.pattern_type(),
                    confidence,
                    reasoning,
                    suggested_actions: pattern.actions.clone(),
                    expected_outcome: format!(
                        "{:.0}% success rate based on {} past events",
                        pattern.success_rate * 100.0,
                        pattern.occurrence_count
                    ),
                    similar_past_events: pattern.example_events.clone(),
                })
            })
            .collect();

        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.pattern_id.cmp(&b.pattern_id))
        });
        suggestions.truncate(MAX_SUGGESTIONS);
        suggestions
    }

    /// Known patterns, best success rate first.
    pub fn patterns(&self, pattern_type: Option<PatternType>) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = lock(&self.state)
            .patterns
            .values()
            .filter(|p| pattern_type.map(|t| p.pattern_type() == t).unwrap_or(true))
            .cloned()
            .collect();
        sort_by_success(&mut patterns);
        patterns
    }

    pub fn events(&self) -> Vec<CoordinationEvent> {
        lock(&self.state).events.clone()
    }

    pub fn stats(&self) -> MinerStats {
        let state = lock(&self.state);
        let mut by_type: BTreeMap<String, usize> = PatternType::ALL
            .iter()
            .map(|t| (t.to_string(), 0))
            .collect();
        for pattern in state.patterns.values() {
            *by_type.entry(pattern.pattern_type().to_string()).or_insert(0) += 1;
        }

        let mut ranked: Vec<&Pattern> = state.patterns.values().collect();
        ranked.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        MinerStats {
            event_count: state.events.len(),
            pattern_count: state.patterns.len(),
            by_type,
            top_patterns: ranked
                .into_iter()
                .take(MAX_SUGGESTIONS)
                .map(|p| PatternSummary {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    success_rate: p.success_rate,
                    occurrences: p.occurrence_count,
                })
                .collect(),
        }
    }
}

fn sort_by_success(patterns: &mut [Pattern]) {
    patterns.sort_by(|a, b| {
        b.success_rate
            .partial_cmp(&a.success_rate)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn last_ids<'a>(events: impl DoubleEndedIterator<Item = &'a CoordinationEvent>, n: usize) -> Vec<EventId> {
    let mut ids: Vec<EventId> = events.rev().take(n).map(|e| e.id.clone()).collect();
    ids.reverse();
    ids
}

/// Most frequent value, ties broken by the smallest value.
fn most_common<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(value, _)| value.to_string())
}

/// Run every mining pass over `events` (sorted by time).
fn mine(events: &[CoordinationEvent], settings: &MinerSettings, now: DateTime<Utc>) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    patterns.extend(mine_pairings(events, now));
    patterns.extend(mine_sequences(events, settings.sequence_window, now));
    patterns.extend(mine_timing(events, now));
    patterns.extend(mine_contexts(events, now));
    patterns
}

fn new_pattern(id: String, name: String, description: String, conditions: PatternConditions, now: DateTime<Utc>) -> Pattern {
    Pattern {
        id,
        name,
        description,
        conditions,
        actions: Vec::new(),
        success_rate: 0.0,
        occurrence_count: 0,
        avg_quality: 0.0,
        example_events: Vec::new(),
        discovered_at: now,
        last_seen: now,
    }
}

fn mine_pairings(events: &[CoordinationEvent], now: DateTime<Utc>) -> Vec<Pattern> {
    let mut groups: BTreeMap<&[AgentId], Vec<&CoordinationEvent>> = BTreeMap::new();
    for event in events.iter().filter(|e| e.agents.len() >= 2) {
        groups.entry(event.agents.as_slice()).or_default().push(event);
    }

    groups
        .into_iter()
        .filter_map(|(agents, group)| {
            let successes: Vec<&CoordinationEvent> =
                group.iter().copied().filter(|e| e.is_success()).collect();
            if successes.len() < MIN_PATTERN_EVENTS {
                return None;
            }
            let success_rate = successes.len() as f64 / group.len() as f64;
            let avg_quality = mean(successes.iter().map(|e| e.quality));
            if success_rate < PAIRING_SUCCESS_RATE || avg_quality < PAIRING_QUALITY {
                return None;
            }

            let category = most_common(successes.iter().filter_map(|e| e.context.category.as_deref()));
            let mut pattern = new_pattern(
                format!("pairing:{}", agents.join("+")),
                format!("Successful pairing: {}", agents.join(" + ")),
                format!("Agents {} work well together", agents.join(" and ")),
                PatternConditions::Pairing {
                    agents: agents.to_vec(),
                    category,
                },
                now,
            );
            pattern.actions = vec![format!("Pair {}", agents.join(" with "))];
            pattern.success_rate = success_rate;
            pattern.occurrence_count = successes.len();
            pattern.avg_quality = avg_quality;
            pattern.example_events = last_ids(successes.iter().copied(), EXAMPLE_EVENTS);
            Some(pattern)
        })
        .collect()
}

fn mine_sequences(events: &[CoordinationEvent], window: Duration, now: DateTime<Utc>) -> Vec<Pattern> {
    let successes: Vec<&CoordinationEvent> = events.iter().filter(|e| e.is_success()).collect();
    let mut sequences: BTreeMap<(&str, &str), Vec<(&CoordinationEvent, &CoordinationEvent)>> =
        BTreeMap::new();

    for (i, &first) in successes.iter().enumerate() {
        for &second in &successes[i + 1..] {
            if second.timestamp - first.timestamp > window {
                break;
            }
            sequences
                .entry((first.category_or_unknown(), second.category_or_unknown()))
                .or_default()
                .push((first, second));
        }
    }

    sequences
        .into_iter()
        .filter_map(|((first_category, second_category), pairs)| {
            if pairs.len() < MIN_PATTERN_EVENTS {
                return None;
            }
            let avg_quality = mean(pairs.iter().map(|(a, b)| (a.quality + b.quality) / 2.0));
            if avg_quality < SEQUENCE_QUALITY {
                return None;
            }

            let mut pattern = new_pattern(
                format!("sequence:{}->{}", first_category, second_category),
                format!("Sequence: {} -> {}", first_category, second_category),
                format!(
                    "Doing {} before {} leads to better outcomes",
                    first_category, second_category
                ),
                PatternConditions::Sequence {
                    first_category: first_category.to_string(),
                    second_category: second_category.to_string(),
                },
                now,
            );
            pattern.actions = vec![
                format!("Do {} task first", first_category),
                format!("Then do {} task", second_category),
            ];
            pattern.success_rate = 1.0;
            pattern.occurrence_count = pairs.len();
            pattern.avg_quality = avg_quality;
            pattern.example_events = last_ids(pairs.iter().map(|(first, _)| *first), 3);
            Some(pattern)
        })
        .collect()
}

fn mine_timing(events: &[CoordinationEvent], now: DateTime<Utc>) -> Vec<Pattern> {
    let mut hourly: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for event in events.iter().filter(|e| e.is_success()) {
        hourly.entry(event.timestamp.hour()).or_default().push(event.quality);
    }

    let mut peaks: Vec<(u32, f64, usize)> = hourly
        .into_iter()
        .filter(|(_, qualities)| qualities.len() >= MIN_PATTERN_EVENTS)
        .map(|(hour, qualities)| (hour, mean(qualities.iter().copied()), qualities.len()))
        .filter(|(_, avg, _)| *avg >= PEAK_HOUR_QUALITY)
        .collect();
    if peaks.is_empty() {
        return Vec::new();
    }
    peaks.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    peaks.truncate(MAX_PEAK_HOURS);

    let mut peak_hours: Vec<u32> = peaks.iter().map(|(hour, _, _)| *hour).collect();
    peak_hours.sort_unstable();
    let in_peak: Vec<&CoordinationEvent> = events
        .iter()
        .filter(|e| peak_hours.contains(&e.timestamp.hour()))
        .collect();
    let successes = in_peak.iter().filter(|e| e.is_success()).count();
    let hours = peak_hours
        .iter()
        .map(|h| format!("{:02}:00", h))
        .collect::<Vec<_>>()
        .join(", ");

    let mut pattern = new_pattern(
        "timing:peak-hours".to_string(),
        "Peak productivity hours".to_string(),
        format!("Best work happens at hours (UTC): {}", hours),
        PatternConditions::Timing {
            peak_hours: peak_hours.clone(),
        },
        now,
    );
    pattern.actions = vec![format!("Schedule complex tasks for {}", hours)];
    pattern.success_rate = successes as f64 / in_peak.len() as f64;
    pattern.occurrence_count = peaks.iter().map(|(_, _, n)| n).sum();
    pattern.avg_quality = mean(peaks.iter().map(|(_, avg, _)| *avg));
    pattern.example_events = last_ids(
        in_peak.iter().copied().filter(|e| e.is_success()),
        EXAMPLE_EVENTS,
    );
    vec![pattern]
}

fn mine_contexts(events: &[CoordinationEvent], now: DateTime<Utc>) -> Vec<Pattern> {
    let mut by_category: BTreeMap<&str, Vec<&CoordinationEvent>> = BTreeMap::new();
    for event in events {
        if let Some(category) = event.context.category.as_deref() {
            by_category.entry(category).or_default().push(event);
        }
    }

    by_category
        .into_iter()
        .filter_map(|(category, group)| {
            if group.len() < CONTEXT_MIN_EVENTS {
                return None;
            }
            let successes: Vec<&CoordinationEvent> =
                group.iter().copied().filter(|e| e.is_success()).collect();
            let success_rate = successes.len() as f64 / group.len() as f64;
            if success_rate < CONTEXT_SUCCESS_RATE {
                return None;
            }

            let mut agent_counts: BTreeMap<&str, usize> = BTreeMap::new();
            for event in &successes {
                for agent in &event.agents {
                    *agent_counts.entry(agent.as_str()).or_insert(0) += 1;
                }
            }
            let mut best: Vec<(&str, usize)> = agent_counts.into_iter().collect();
            best.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            best.truncate(CONTEXT_TOP_AGENTS);
            let best: Vec<&str> = best.into_iter().map(|(agent, _)| agent).collect();

            let mut pattern = new_pattern(
                format!("context:{}", category),
                format!("Experts for {}", category),
                if best.is_empty() {
                    format!("{} work succeeds consistently", category)
                } else {
                    format!("Best agents for {}: {}", category, best.join(", "))
                },
                PatternConditions::Context {
                    category: category.to_string(),
                },
                now,
            );
            if let Some(top) = best.first() {
                pattern.actions = vec![format!("Assign {} tasks to {}", category, top)];
            }
            pattern.success_rate = success_rate;
            pattern.occurrence_count = group.len();
            pattern.avg_quality = mean(successes.iter().map(|e| e.quality));
            pattern.example_events = last_ids(group.iter().copied(), EXAMPLE_EVENTS);
            Some(pattern)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use swarm_store::{FileStore, MemoryStore};
    use tempfile::tempdir;

    fn miner() -> PatternMiner {
        PatternMiner::open(Arc::new(MemoryStore::new()), MinerSettings::default()).unwrap()
    }

    fn at_hour(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_no_mining_before_min_events() {
        let miner = miner();
        for _ in 0..4 {
            miner
                .record_event(
                    EventReport::new("task_complete", ["a1", "a2"], Outcome::Success).category("infra"),
                )
                .unwrap();
        }
        assert!(miner.patterns(None).is_empty());
        assert_eq!(miner.stats().event_count, 4);
    }

    #[test]
    fn test_pairing_pattern_suggested_for_category() {
        let miner = miner();
        for _ in 0..5 {
            miner
                .record_event(
                    EventReport::new("task_complete", ["a2", "a1"], Outcome::Success)
                        .category("Infra")
                        .quality(0.9),
                )
                .unwrap();
        }

        let pairing = miner.patterns(Some(PatternType::Pairing));
        assert_eq!(pairing.len(), 1);
        assert_eq!(pairing[0].id, "pairing:a1+a2");
        assert_eq!(pairing[0].occurrence_count, 5);

        let suggestions = miner.suggest(&SuggestionQuery::category("infra"));
        let pair = suggestions
            .iter()
            .find(|s| s.pattern_type == PatternType::Pairing)
            .expect("pairing suggestion");
        assert!(pair.confidence > 0.5);
        assert!(pair.reasoning.contains("a1 and a2"));
        assert!(suggestions.iter().any(|s| s.pattern_id == "context:infra"));
    }

    #[test]
    fn test_large_team_pairing_persists() {
        let dir = tempdir().unwrap();
        let agents: Vec<String> = (0..30).map(|i| format!("agent-{:02}", i)).collect();
        let open = || {
            let store = Arc::new(FileStore::open(dir.path()).unwrap());
            PatternMiner::open(store, MinerSettings::default()).unwrap()
        };

        let miner = open();
        for _ in 0..7 {
            miner
                .record_event(
                    EventReport::new("task_complete", agents.clone(), Outcome::Success)
                        .category("infra")
                        .quality(0.9),
                )
                .unwrap();
        }
        let pairing = miner.patterns(Some(PatternType::Pairing));
        assert_eq!(pairing.len(), 1);
        assert_eq!(pairing[0].occurrence_count, 7);
        let id = pairing[0].id.clone();
        drop(miner);

        let reopened = open();
        assert_eq!(reopened.stats().event_count, 7);
        let restored = reopened.patterns(Some(PatternType::Pairing));
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, id);
    }

    #[test]
    fn test_pairing_requires_agent_pool_match() {
        let miner = miner();
        for _ in 0..5 {
            miner
                .record_event(
                    EventReport::new("review", ["a1", "a2"], Outcome::Success).category("review"),
                )
                .unwrap();
        }

        let with_pool = miner.suggest(&SuggestionQuery::default().with_agents(["a1", "a2", "a3"]));
        assert!(with_pool.iter().any(|s| s.pattern_id == "pairing:a1+a2"));

        let partial_pool = miner.suggest(&SuggestionQuery::default().with_agents(["a1", "a3"]));
        assert!(partial_pool.iter().all(|s| s.pattern_type != PatternType::Pairing));
    }

    #[test]
    fn test_low_success_pairs_are_not_patterns() {
        let miner = miner();
        for outcome in [
            Outcome::Success,
            Outcome::Success,
            Outcome::Success,
            Outcome::Failure,
            Outcome::Failure,
        ] {
            miner
                .record_event(EventReport::new("task_complete", ["a1", "a2"], outcome))
                .unwrap();
        }
        assert!(miner.patterns(Some(PatternType::Pairing)).is_empty());
    }

    #[test]
    fn test_sequence_pattern_within_window() {
        let miner = miner();
        for day in 1..=3 {
            miner
                .record_event(
                    EventReport::new("task_complete", ["a1"], Outcome::Success)
                        .category("design")
                        .at(at_hour(day, 9, 0)),
                )
                .unwrap();
            miner
                .record_event(
                    EventReport::new("task_complete", ["a1"], Outcome::Success)
                        .category("build")
                        .at(at_hour(day, 10, 30)),
                )
                .unwrap();
        }

        let sequences = miner.patterns(Some(PatternType::Sequence));
        let ids: Vec<&str> = sequences.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["sequence:design->build"]);
        assert_eq!(sequences[0].occurrence_count, 3);
        // sequences are never suggested directly
        assert!(miner
            .suggest(&SuggestionQuery::category("design"))
            .iter()
            .all(|s| s.pattern_type != PatternType::Sequence));
    }

    #[test]
    fn test_timing_pattern_matches_current_hour() {
        let miner = miner();
        for day in 1..=4 {
            miner
                .record_event(
                    EventReport::new("task_complete", [format!("a{}", day)], Outcome::Success)
                        .category(format!("c{}", day))
                        .quality(0.95)
                        .at(at_hour(day, 14, 0)),
                )
                .unwrap();
        }
        miner
            .record_event(
                EventReport::new("task_complete", ["a9"], Outcome::Failure).at(at_hour(5, 3, 0)),
            )
            .unwrap();

        let timing = miner.patterns(Some(PatternType::Timing));
        assert_eq!(timing.len(), 1);
        assert_eq!(
            timing[0].conditions,
            PatternConditions::Timing {
                peak_hours: vec![14]
            }
        );

        let at_peak = miner.suggest_at(&SuggestionQuery::default(), at_hour(9, 14, 30));
        assert_eq!(at_peak.len(), 1);
        assert_eq!(at_peak[0].confidence, 0.7);
        assert!(miner
            .suggest_at(&SuggestionQuery::default(), at_hour(9, 8, 0))
            .is_empty());
    }

    #[test]
    fn test_context_pattern_and_stats() {
        let miner = miner();
        for agent in ["a1", "a1", "a1", "a2", "a3", "a4"] {
            miner
                .record_event(
                    EventReport::new("task_complete", [agent], Outcome::Success).category("docs"),
                )
                .unwrap();
        }

        let context = miner.patterns(Some(PatternType::Context));
        assert_eq!(context[0].id, "context:docs");
        assert_eq!(context[0].actions, vec!["Assign docs tasks to a1"]);
        assert_eq!(context[0].description, "Best agents for docs: a1, a2, a3");

        let stats = miner.stats();
        assert_eq!(stats.event_count, 6);
        assert_eq!(stats.by_type["context"], 1);
        assert_eq!(stats.by_type["pairing"], 0);
        assert!(stats.top_patterns.iter().any(|p| p.id == "context:docs"));
    }

    #[test]
    fn test_remining_refines_existing_pattern() {
        let miner = miner();
        for _ in 0..5 {
            miner
                .record_event(EventReport::new("x", ["a1"], Outcome::Success).category("ops"))
                .unwrap();
        }
        let first = miner.patterns(Some(PatternType::Context))[0].clone();
        miner
            .record_event(EventReport::new("x", ["a1"], Outcome::Failure).category("ops"))
            .unwrap();
        let refined = miner.patterns(Some(PatternType::Context))[0].clone();

        assert_eq!(refined.occurrence_count, 6);
        assert!(refined.success_rate < first.success_rate);
        assert_eq!(refined.discovered_at, first.discovered_at);
    }

    #[test]
    fn test_context_extra_keys_roundtrip() {
        let json = serde_json::json!({"category": "Infra", "files": ["A.rs"], "ticket": 42});
        let context: EventContext = serde_json::from_value(json).unwrap();
        assert_eq!(context.extra.get("ticket"), Some(&serde_json::json!(42)));

        let miner = miner();
        let event = miner
            .record_event(EventReport::new("x", ["a1"], Outcome::Partial).context(context))
            .unwrap();
        assert_eq!(event.context.category.as_deref(), Some("infra"));
        assert!(event.context.files.contains("a.rs"));
    }
}
