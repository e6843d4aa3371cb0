// src/persistence.rs

//! JSON state blob: wire schema, explicit schema-version migration and the
//! normalisation pass that runs on every load.

use crate::config::EngineConfig;
use crate::constants::*;
use crate::difficulty::difficulty_level_to_score;
use crate::error::{EngineError, Result};
use crate::models::{CoreAdaptiveState, QuestionHistoryEntry, SectionPerformanceEntry, SubSectionPerformance};
use crate::scheduler::sanitize_stability;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// --- Wire Schema ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema_version: Option<u32>,
    // Stored as [id, entry] pairs rather than an object.
    #[serde(default, alias = "questionHistoryArray")]
    question_history: Vec<(String, StoredHistoryEntry)>,
    #[serde(default)]
    section_performance: BTreeMap<String, StoredSection>,
    #[serde(default)]
    total_questions_answered: u64,
    #[serde(default)]
    recent_results: Vec<bool>,
    #[serde(default)]
    last_session_questions: Vec<String>,
    #[serde(default)]
    current_difficulty: Option<String>,
    #[serde(default)]
    difficulty_score: Option<f64>,
    #[serde(default)]
    session_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    session_answered: u32,
    #[serde(default)]
    session_correct: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredHistoryEntry {
    #[serde(default)]
    attempts: u32,
    #[serde(default)]
    correct_count: u32,
    #[serde(default)]
    last_result: bool,
    last_attempted: DateTime<Utc>,
    #[serde(default = "default_ease")]
    ease_factor: f64,
    #[serde(default, deserialize_with = "lenient_whole")]
    interval: u64,
    #[serde(default)]
    next_review_date: Option<DateTime<Utc>>,
    #[serde(default)]
    stability: Option<f64>,
    #[serde(default)]
    lapses: Option<u32>,
    #[serde(default, deserialize_with = "lenient_optional_whole")]
    last_response_time_ms: Option<u64>,
    #[serde(default, deserialize_with = "lenient_optional_whole")]
    average_response_time_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSection {
    #[serde(default)]
    questions_attempted: u32,
    #[serde(default)]
    questions_correct: Option<u32>,
    #[serde(default)]
    accuracy: f64,
    #[serde(default)]
    recent_accuracy: f64,
    #[serde(default)]
    needs_work: bool,
    #[serde(default)]
    last_practiced: Option<DateTime<Utc>>,
    #[serde(default)]
    mastered_concepts: Vec<String>,
    #[serde(default)]
    struggle_concepts: Vec<String>,
    #[serde(default)]
    sub_section_performance: BTreeMap<String, StoredSubSection>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSubSection {
    #[serde(default)]
    questions_attempted: u32,
    #[serde(default)]
    questions_correct: Option<u32>,
    #[serde(default)]
    accuracy: f64,
    #[serde(default)]
    needs_work: bool,
}

fn default_ease() -> f64 {
    EASE_FACTOR_DEFAULT
}

/// Older writers stored running means as fractional milliseconds.
fn lenient_optional_whole<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.map(to_whole))
}

fn lenient_whole<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(to_whole(f64::deserialize(deserializer)?))
}

fn to_whole(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

// --- Public Interface ---

/// Serializes the state as a version-2 blob. Keys are written in sorted order,
/// so equal states produce byte-identical blobs.
pub fn serialize_state(state: &CoreAdaptiveState) -> Result<String> {
    let stored = StoredState {
        schema_version: Some(SCHEMA_VERSION_CURRENT),
        question_history: state
            .question_history
            .iter()
            .map(|(id, e)| (id.clone(), StoredHistoryEntry::from(e)))
            .collect(),
        section_performance: state
            .section_performance
            .iter()
            .map(|(id, p)| (id.clone(), StoredSection::from(p)))
            .collect(),
        total_questions_answered: state.total_questions_answered,
        recent_results: state.recent_results.iter().copied().collect(),
        last_session_questions: state.last_session_questions.iter().cloned().collect(),
        current_difficulty: Some(state.current_difficulty().as_str().to_string()),
        difficulty_score: Some(state.difficulty_score()),
        session_start_time: state.session_start_time,
        session_answered: state.session_answered,
        session_correct: state.session_correct,
    };
    Ok(serde_json::to_string(&stored)?)
}

/// Parses a blob of any supported schema version, migrates it forward and
/// normalises it against `config`.
pub fn deserialize_state(json: &str, config: &EngineConfig) -> Result<CoreAdaptiveState> {
    let stored: StoredState = serde_json::from_str(json)?;
    let version = stored.schema_version.unwrap_or(SCHEMA_VERSION_LEGACY);
    let stored = migrate(stored, version)?;
    Ok(normalize(into_state(stored), config))
}

// --- Migration ---

fn migrate(mut stored: StoredState, version: u32) -> Result<StoredState> {
    match version {
        SCHEMA_VERSION_LEGACY => {
            info!(
                "[Store] Migrating state blob v{} -> v{} ({} history entries)",
                SCHEMA_VERSION_LEGACY,
                SCHEMA_VERSION_CURRENT,
                stored.question_history.len()
            );
            backfill_v1(&mut stored);
            stored.schema_version = Some(SCHEMA_VERSION_CURRENT);
            Ok(stored)
        }
        SCHEMA_VERSION_CURRENT => Ok(stored),
        other => Err(EngineError::UnsupportedSchema(other)),
    }
}

/// v1 blobs predate stability, lapses, response times, the difficulty score
/// and the correct-answer counters on sections.
fn backfill_v1(stored: &mut StoredState) {
    for (_, e) in stored.question_history.iter_mut() {
        e.stability.get_or_insert(if e.last_result {
            STABILITY_INITIAL_CORRECT
        } else {
            STABILITY_INITIAL_INCORRECT
        });
        e.lapses.get_or_insert(e.attempts.saturating_sub(e.correct_count));
        e.last_response_time_ms.get_or_insert(0);
        e.average_response_time_ms.get_or_insert(0);
    }

    if stored.difficulty_score.is_none() {
        let label = stored.current_difficulty.as_deref().unwrap_or("medium");
        stored.difficulty_score = Some(difficulty_level_to_score(label));
    }

    for section in stored.section_performance.values_mut() {
        section
            .questions_correct
            .get_or_insert(derive_correct(section.accuracy, section.questions_attempted));
        for sub in section.sub_section_performance.values_mut() {
            sub.questions_correct
                .get_or_insert(derive_correct(sub.accuracy, sub.questions_attempted));
        }
    }
}

fn derive_correct(accuracy: f64, attempted: u32) -> u32 {
    if !accuracy.is_finite() {
        return 0;
    }
    (accuracy.clamp(0.0, 1.0) * f64::from(attempted)).round() as u32
}

// --- Conversion ---

fn into_state(stored: StoredState) -> CoreAdaptiveState {
    let question_history = stored
        .question_history
        .into_iter()
        .map(|(id, e)| {
            let entry = e.into_entry(&id);
            (id, entry)
        })
        .collect();

    let section_performance = stored
        .section_performance
        .into_iter()
        .map(|(id, s)| {
            let entry = s.into_entry(&id);
            (id, entry)
        })
        .collect();

    let mut state = CoreAdaptiveState {
        question_history,
        section_performance,
        total_questions_answered: stored.total_questions_answered,
        recent_results: stored.recent_results.into_iter().collect(),
        last_session_questions: stored.last_session_questions.into_iter().collect(),
        session_start_time: stored.session_start_time,
        session_answered: stored.session_answered,
        session_correct: stored.session_correct,
        difficulty_score: DIFFICULTY_SCORE_DEFAULT,
    };
    let score = stored.difficulty_score.unwrap_or_else(|| {
        difficulty_level_to_score(stored.current_difficulty.as_deref().unwrap_or("medium"))
    });
    state.set_difficulty_score(score);
    state
}

impl StoredHistoryEntry {
    fn into_entry(self, question_id: &str) -> QuestionHistoryEntry {
        let interval = u32::try_from(self.interval).unwrap_or(INTERVAL_MAX).min(INTERVAL_MAX);
        let next_review_date = self
            .next_review_date
            .unwrap_or_else(|| {
                self.last_attempted
                    .checked_add_signed(Duration::days(i64::from(interval)))
                    .unwrap_or(self.last_attempted)
            });
        QuestionHistoryEntry {
            question_id: question_id.to_string(),
            attempts: self.attempts,
            correct_count: self.correct_count,
            last_result: self.last_result,
            last_attempted: self.last_attempted,
            ease_factor: self.ease_factor,
            interval,
            next_review_date,
            stability: self.stability.unwrap_or(if self.last_result {
                STABILITY_INITIAL_CORRECT
            } else {
                STABILITY_INITIAL_INCORRECT
            }),
            lapses: self.lapses.unwrap_or(0),
            last_response_time_ms: self.last_response_time_ms.unwrap_or(0),
            average_response_time_ms: self.average_response_time_ms.unwrap_or(0),
        }
    }
}

impl From<&QuestionHistoryEntry> for StoredHistoryEntry {
    fn from(e: &QuestionHistoryEntry) -> Self {
        StoredHistoryEntry {
            attempts: e.attempts,
            correct_count: e.correct_count,
            last_result: e.last_result,
            last_attempted: e.last_attempted,
            ease_factor: e.ease_factor,
            interval: u64::from(e.interval),
            next_review_date: Some(e.next_review_date),
            stability: Some(e.stability),
            lapses: Some(e.lapses),
            last_response_time_ms: Some(e.last_response_time_ms),
            average_response_time_ms: Some(e.average_response_time_ms),
        }
    }
}

impl StoredSection {
    fn into_entry(self, section_id: &str) -> SectionPerformanceEntry {
        let questions_correct = self
            .questions_correct
            .unwrap_or_else(|| derive_correct(self.accuracy, self.questions_attempted));
        SectionPerformanceEntry {
            section_id: section_id.to_string(),
            questions_attempted: self.questions_attempted,
            questions_correct,
            accuracy: self.accuracy,
            recent_accuracy: self.recent_accuracy,
            needs_work: self.needs_work,
            last_practiced: self.last_practiced,
            mastered_concepts: self.mastered_concepts,
            struggle_concepts: self.struggle_concepts,
            sub_section_performance: self
                .sub_section_performance
                .into_iter()
                .map(|(id, sub)| {
                    let questions_correct = sub
                        .questions_correct
                        .unwrap_or_else(|| derive_correct(sub.accuracy, sub.questions_attempted));
                    let entry = SubSectionPerformance {
                        questions_attempted: sub.questions_attempted,
                        questions_correct,
                        accuracy: sub.accuracy,
                        needs_work: sub.needs_work,
                    };
                    (id, entry)
                })
                .collect(),
        }
    }
}

impl From<&SectionPerformanceEntry> for StoredSection {
    fn from(p: &SectionPerformanceEntry) -> Self {
        StoredSection {
            questions_attempted: p.questions_attempted,
            questions_correct: Some(p.questions_correct),
            accuracy: p.accuracy,
            recent_accuracy: p.recent_accuracy,
            needs_work: p.needs_work,
            last_practiced: p.last_practiced,
            mastered_concepts: p.mastered_concepts.clone(),
            struggle_concepts: p.struggle_concepts.clone(),
            sub_section_performance: p
                .sub_section_performance
                .iter()
                .map(|(id, sub)| {
                    let stored = StoredSubSection {
                        questions_attempted: sub.questions_attempted,
                        questions_correct: Some(sub.questions_correct),
                        accuracy: sub.accuracy,
                        needs_work: sub.needs_work,
                    };
                    (id.clone(), stored)
                })
                .collect(),
        }
    }
}

// --- Normalisation ---

/// Re-establishes the state invariants on anything read from storage.
/// Idempotent, and a no-op on states produced by the engine itself.
fn normalize(mut state: CoreAdaptiveState, config: &EngineConfig) -> CoreAdaptiveState {
    let mut repaired = 0usize;

    for entry in state.question_history.values_mut() {
        let before = entry.clone();
        entry.correct_count = entry.correct_count.min(entry.attempts);
        entry.ease_factor = if entry.ease_factor.is_finite() {
            entry.ease_factor.max(EASE_FACTOR_MIN)
        } else {
            EASE_FACTOR_DEFAULT
        };
        entry.stability = sanitize_stability(entry.stability);
        if *entry != before {
            repaired += 1;
        }
    }

    for section_id in &config.sections {
        state
            .section_performance
            .entry(section_id.clone())
            .or_insert_with(|| SectionPerformanceEntry::new(section_id.as_str()));
    }
    for perf in state.section_performance.values_mut() {
        perf.refresh(config.weakness_threshold);
        if !perf.recent_accuracy.is_finite() {
            perf.recent_accuracy = 0.0;
        }
        perf.recent_accuracy = perf.recent_accuracy.clamp(0.0, 1.0);
        for sub in perf.sub_section_performance.values_mut() {
            sub.refresh(config.weakness_threshold);
        }
    }

    while state.recent_results.len() > config.recent_window_size {
        state.recent_results.pop_front();
    }
    while state.last_session_questions.len() > config.recent_question_window {
        state.last_session_questions.pop_front();
    }
    if state.session_start_time.is_none() {
        state.session_answered = 0;
        state.session_correct = 0;
    }
    state.session_correct = state.session_correct.min(state.session_answered);

    let score = state.difficulty_score();
    state.set_difficulty_score(score);

    if repaired > 0 {
        debug!("[Store] Normalised {} history entr(ies) on load", repaired);
    }
    state
}
