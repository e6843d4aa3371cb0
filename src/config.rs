// src/config.rs

use crate::constants::*;
use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Per-track engine configuration. Built once with [`create_engine_config`]
/// and shared read-only by every engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub storage_key: String,
    pub sections: Vec<String>,
    /// Relative exam weight keyed by section or sub-section id.
    pub section_weights: HashMap<String, f64>,
    pub target_accuracy: f64,
    pub easy_threshold: f64,
    pub hard_threshold: f64,
    pub recent_window_size: usize,
    pub recent_question_window: usize,
    pub readiness_target_questions: u64,
    pub weakness_threshold: f64,
    pub strong_threshold: f64,
    pub min_questions_for_strong: u32,
    pub target_time_per_question_ms: u64,
    pub retrievability_threshold: f64,
}

/// Optional tuning knobs. Deserializes from the camelCase JSON a host keeps
/// next to its content catalog.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverrides {
    pub target_accuracy: Option<f64>,
    pub easy_threshold: Option<f64>,
    pub hard_threshold: Option<f64>,
    pub recent_window_size: Option<usize>,
    pub recent_question_window: Option<usize>,
    pub readiness_target_questions: Option<u64>,
    pub weakness_threshold: Option<f64>,
    pub strong_threshold: Option<f64>,
    pub min_questions_for_strong: Option<u32>,
    pub target_time_per_question_ms: Option<u64>,
    pub retrievability_threshold: Option<f64>,
}

impl ConfigOverrides {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl EngineConfig {
    /// Config with every threshold at its default. Not validated; use
    /// [`create_engine_config`] for the checked constructor.
    pub fn with_defaults(
        storage_key: impl Into<String>,
        sections: Vec<String>,
        section_weights: HashMap<String, f64>,
    ) -> Self {
        EngineConfig {
            storage_key: storage_key.into(),
            sections,
            section_weights,
            target_accuracy: DEFAULT_TARGET_ACCURACY,
            easy_threshold: DEFAULT_EASY_THRESHOLD,
            hard_threshold: DEFAULT_HARD_THRESHOLD,
            recent_window_size: DEFAULT_RECENT_WINDOW_SIZE,
            recent_question_window: DEFAULT_RECENT_QUESTION_WINDOW,
            readiness_target_questions: DEFAULT_READINESS_TARGET_QUESTIONS,
            weakness_threshold: DEFAULT_WEAKNESS_THRESHOLD,
            strong_threshold: DEFAULT_STRONG_THRESHOLD,
            min_questions_for_strong: DEFAULT_MIN_QUESTIONS_FOR_STRONG,
            target_time_per_question_ms: DEFAULT_TARGET_TIME_PER_QUESTION_MS,
            retrievability_threshold: DEFAULT_RETRIEVABILITY_THRESHOLD,
        }
    }

    pub fn apply(mut self, overrides: &ConfigOverrides) -> Self {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = overrides.$field { self.$field = v; })*
            };
        }
        take!(
            target_accuracy,
            easy_threshold,
            hard_threshold,
            recent_window_size,
            recent_question_window,
            readiness_target_questions,
            weakness_threshold,
            strong_threshold,
            min_questions_for_strong,
            target_time_per_question_ms,
            retrievability_threshold,
        );
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if self.storage_key.trim().is_empty() {
            return invalid("storage key is empty".into());
        }
        if self.sections.is_empty() {
            return invalid("no sections configured".into());
        }
        if let Some(dup) = self
            .sections
            .iter()
            .enumerate()
            .find(|(i, s)| self.sections[..*i].contains(*s))
            .map(|(_, s)| s)
        {
            return invalid(format!("duplicate section '{}'", dup));
        }
        for (name, value) in [
            ("targetAccuracy", self.target_accuracy),
            ("easyThreshold", self.easy_threshold),
            ("hardThreshold", self.hard_threshold),
            ("weaknessThreshold", self.weakness_threshold),
            ("strongThreshold", self.strong_threshold),
            ("retrievabilityThreshold", self.retrievability_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.hard_threshold > self.easy_threshold {
            return invalid(format!(
                "hardThreshold ({}) exceeds easyThreshold ({})",
                self.hard_threshold, self.easy_threshold
            ));
        }
        if self.recent_window_size == 0 {
            return invalid("recentWindowSize must be positive".into());
        }
        if self.readiness_target_questions == 0 {
            return invalid("readinessTargetQuestions must be positive".into());
        }
        if self.target_time_per_question_ms == 0 {
            return invalid("targetTimePerQuestionMs must be positive".into());
        }
        if let Some((key, w)) = self
            .section_weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return invalid(format!("weight for '{}' is not a non-negative number: {}", key, w));
        }
        Ok(())
    }

    pub fn section_weight(&self, section_id: &str) -> f64 {
        self.section_weights
            .get(section_id)
            .copied()
            .unwrap_or(SECTION_WEIGHT_DEFAULT)
    }

    pub fn sub_section_weight(&self, sub_section_id: &str) -> f64 {
        self.section_weights
            .get(sub_section_id)
            .copied()
            .unwrap_or(SUB_SECTION_WEIGHT_DEFAULT)
    }
}

/// Builds a validated config.
///
/// # Panics
/// On an invalid configuration (empty sections, thresholds out of range...).
/// A broken config is a programming error in the exam track definition.
pub fn create_engine_config(
    storage_key: impl Into<String>,
    sections: Vec<String>,
    section_weights: HashMap<String, f64>,
    overrides: ConfigOverrides,
) -> EngineConfig {
    let config = EngineConfig::with_defaults(storage_key, sections, section_weights).apply(&overrides);
    if let Err(e) = config.validate() {
        panic!("{}", e);
    }
    config
}
