// src/models.rs

use crate::config::EngineConfig;
use crate::constants::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

// --- Difficulty ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy = 1,
    Medium = 2,
    Hard = 3,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
        }
    }
}

impl FromStr for DifficultyLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" | "beginner" | "foundational" => Ok(DifficultyLevel::Easy),
            "medium" | "intermediate" | "moderate" => Ok(DifficultyLevel::Medium),
            "hard" | "advanced" | "tough" => Ok(DifficultyLevel::Hard),
            other => Err(format!("unknown difficulty label '{}'", other)),
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Answer Input ---

/// How an answer is graded. A timed answer goes through the quality-based
/// SM-2 path, a binary one through the simpler correct/incorrect path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSignal {
    Binary(bool),
    Timed { correct: bool, response_time_ms: u64 },
}

impl AnswerSignal {
    /// A zero response time means "not measured".
    pub fn from_parts(correct: bool, response_time_ms: Option<u64>) -> Self {
        match response_time_ms {
            Some(ms) if ms > 0 => AnswerSignal::Timed {
                correct,
                response_time_ms: ms,
            },
            _ => AnswerSignal::Binary(correct),
        }
    }

    pub fn is_correct(&self) -> bool {
        match *self {
            AnswerSignal::Binary(correct) => correct,
            AnswerSignal::Timed { correct, .. } => correct,
        }
    }

    pub fn response_time_ms(&self) -> Option<u64> {
        match *self {
            AnswerSignal::Binary(_) => None,
            AnswerSignal::Timed {
                response_time_ms, ..
            } => Some(response_time_ms),
        }
    }
}

/// SM-2 recall quality, always within `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub fn clamped(value: i32) -> Self {
        Quality(value.clamp(0, QUALITY_MAX as i32) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_pass(&self) -> bool {
        self.0 >= QUALITY_PASS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerLog {
    pub question_id: String,
    pub section_id: String,
    pub sub_section_id: Option<String>,
    pub signal: AnswerSignal,
    pub concepts: Vec<String>,
}

impl AnswerLog {
    pub fn new(
        question_id: impl Into<String>,
        section_id: impl Into<String>,
        signal: AnswerSignal,
    ) -> Self {
        AnswerLog {
            question_id: question_id.into(),
            section_id: section_id.into(),
            sub_section_id: None,
            signal,
            concepts: Vec::new(),
        }
    }

    pub fn with_sub_section(mut self, sub_section_id: impl Into<String>) -> Self {
        self.sub_section_id = Some(sub_section_id.into());
        self
    }

    pub fn with_concepts<I, S>(mut self, concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.concepts = concepts.into_iter().map(Into::into).collect();
        self
    }
}

// --- Internal State Models ---

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionHistoryEntry {
    pub question_id: String,
    pub attempts: u32,
    pub correct_count: u32,
    pub last_result: bool,
    pub last_attempted: DateTime<Utc>,
    pub ease_factor: f64,
    pub interval: u32,
    pub next_review_date: DateTime<Utc>,
    pub stability: f64,
    pub lapses: u32,
    pub last_response_time_ms: u64,
    pub average_response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubSectionPerformance {
    pub questions_attempted: u32,
    pub questions_correct: u32,
    pub accuracy: f64,
    /// Accuracy under `weakness_threshold`. Weak-area ranking uses the
    /// higher `target_accuracy` instead.
    pub needs_work: bool,
}

impl SubSectionPerformance {
    pub fn new() -> Self {
        SubSectionPerformance {
            questions_attempted: 0,
            questions_correct: 0,
            accuracy: 0.0,
            needs_work: true,
        }
    }

    pub fn record(&mut self, is_correct: bool, weakness_threshold: f64) {
        self.questions_attempted += 1;
        if is_correct {
            self.questions_correct += 1;
        }
        self.refresh(weakness_threshold);
    }

    pub fn refresh(&mut self, weakness_threshold: f64) {
        self.questions_correct = self.questions_correct.min(self.questions_attempted);
        self.accuracy = ratio(self.questions_correct, self.questions_attempted);
        self.needs_work = self.accuracy < weakness_threshold;
    }
}

impl Default for SubSectionPerformance {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionPerformanceEntry {
    pub section_id: String,
    pub questions_attempted: u32,
    pub questions_correct: u32,
    pub accuracy: f64,
    pub recent_accuracy: f64,
    /// Accuracy under `weakness_threshold`; see `pedagogy::get_weak_sections`
    /// for the separate `target_accuracy` cut.
    pub needs_work: bool,
    pub last_practiced: Option<DateTime<Utc>>,
    pub mastered_concepts: Vec<String>,
    pub struggle_concepts: Vec<String>,
    pub sub_section_performance: BTreeMap<String, SubSectionPerformance>,
}

impl SectionPerformanceEntry {
    pub fn new(section_id: impl Into<String>) -> Self {
        SectionPerformanceEntry {
            section_id: section_id.into(),
            questions_attempted: 0,
            questions_correct: 0,
            accuracy: 0.0,
            recent_accuracy: 0.0,
            needs_work: true,
            last_practiced: None,
            mastered_concepts: Vec::new(),
            struggle_concepts: Vec::new(),
            sub_section_performance: BTreeMap::new(),
        }
    }

    pub fn refresh(&mut self, weakness_threshold: f64) {
        self.questions_correct = self.questions_correct.min(self.questions_attempted);
        self.accuracy = ratio(self.questions_correct, self.questions_attempted);
        self.needs_work = self.accuracy < weakness_threshold;
    }
}

/// The whole per-track engine state. Every mutation goes through
/// `pedagogy::record_answer` or the session functions, which take the state by
/// value and hand back the successor.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreAdaptiveState {
    pub question_history: BTreeMap<String, QuestionHistoryEntry>,
    pub section_performance: BTreeMap<String, SectionPerformanceEntry>,
    pub total_questions_answered: u64,
    pub recent_results: VecDeque<bool>,
    pub last_session_questions: VecDeque<String>,
    pub session_start_time: Option<DateTime<Utc>>,
    pub session_answered: u32,
    pub session_correct: u32,
    pub(crate) difficulty_score: f64,
}

impl CoreAdaptiveState {
    pub fn new(config: &EngineConfig) -> Self {
        let section_performance = config
            .sections
            .iter()
            .map(|s| (s.clone(), SectionPerformanceEntry::new(s.as_str())))
            .collect();

        CoreAdaptiveState {
            question_history: BTreeMap::new(),
            section_performance,
            total_questions_answered: 0,
            recent_results: VecDeque::new(),
            last_session_questions: VecDeque::new(),
            session_start_time: None,
            session_answered: 0,
            session_correct: 0,
            difficulty_score: DIFFICULTY_SCORE_DEFAULT,
        }
    }

    pub fn difficulty_score(&self) -> f64 {
        self.difficulty_score
    }

    /// Always the bucket of `difficulty_score`; never stored separately.
    pub fn current_difficulty(&self) -> DifficultyLevel {
        crate::difficulty::difficulty_score_to_level(self.difficulty_score)
    }

    pub(crate) fn set_difficulty_score(&mut self, score: f64) {
        self.difficulty_score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            DIFFICULTY_SCORE_DEFAULT
        };
    }
}

// --- Selection ---

/// Minimal view of a question the selector needs. The section is supplied
/// separately through a projection so callers keep their own schema.
pub trait Candidate {
    fn id(&self) -> &str;
    fn difficulty(&self) -> &str;
    fn sub_section(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DifficultyTarget {
    /// Track the learner's current `difficulty_score`.
    Adaptive,
    Fixed(DifficultyLevel),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCriteria {
    pub count: usize,
    pub sections: Option<Vec<String>>,
    pub sub_sections: Option<Vec<String>>,
    pub difficulty: DifficultyTarget,
    pub exclude_recent: bool,
    pub prioritize_weak_areas: bool,
    pub include_review_due: bool,
    pub exam_weighted: bool,
    /// Tie-break shuffle seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl SelectionCriteria {
    pub fn new(count: usize) -> Self {
        SelectionCriteria {
            count,
            sections: None,
            sub_sections: None,
            difficulty: DifficultyTarget::Adaptive,
            exclude_recent: false,
            prioritize_weak_areas: true,
            include_review_due: true,
            exam_weighted: false,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    ReviewDue,
    WeakArea,
    Balanced,
    DifficultyMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedQuestion<'a, Q> {
    pub question: &'a Q,
    pub section_id: String,
    pub reason: SelectionReason,
    pub priority: f64,
}

// --- Summaries ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionBreakdown {
    pub section: String,
    pub accuracy: f64,
    pub questions_attempted: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_questions: u64,
    pub overall_accuracy: f64,
    pub recent_accuracy: f64,
    pub current_difficulty: DifficultyLevel,
    pub difficulty_score: f64,
    pub readiness_score: u32,
    pub section_breakdown: Vec<SectionBreakdown>,
    pub weak_sections: Vec<String>,
    pub strong_sections: Vec<String>,
    pub due_for_review: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub duration_secs: i64,
    pub questions_answered: u32,
    pub questions_correct: u32,
    pub accuracy: f64,
}

pub(crate) fn ratio(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_labels_accept_synonyms() {
        assert_eq!("Beginner".parse::<DifficultyLevel>(), Ok(DifficultyLevel::Easy));
        assert_eq!("moderate".parse::<DifficultyLevel>(), Ok(DifficultyLevel::Medium));
        assert_eq!(" TOUGH ".parse::<DifficultyLevel>(), Ok(DifficultyLevel::Hard));
        assert!("impossible".parse::<DifficultyLevel>().is_err());
    }

    #[test]
    fn zero_response_time_is_binary() {
        assert_eq!(AnswerSignal::from_parts(true, Some(0)), AnswerSignal::Binary(true));
        assert_eq!(AnswerSignal::from_parts(false, None), AnswerSignal::Binary(false));
        let timed = AnswerSignal::from_parts(true, Some(5_000));
        assert_eq!(timed.response_time_ms(), Some(5_000));
        assert!(timed.is_correct());
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(Quality::clamped(-4).value(), 0);
        assert_eq!(Quality::clamped(9).value(), 5);
        assert!(Quality::clamped(3).is_pass());
        assert!(!Quality::clamped(2).is_pass());
    }

    #[test]
    fn sub_section_counts_stay_consistent() {
        let mut sub = SubSectionPerformance::new();
        sub.record(true, 0.7);
        sub.record(false, 0.7);
        assert_eq!(sub.questions_attempted, 2);
        assert_eq!(sub.questions_correct, 1);
        assert_eq!(sub.accuracy, 0.5);
        assert!(sub.needs_work);
    }
}
