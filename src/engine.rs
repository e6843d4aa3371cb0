// src/engine.rs

use crate::config::EngineConfig;
use crate::models::{
    AnswerLog, Candidate, CoreAdaptiveState, PerformanceSummary, SelectedQuestion, SelectionCriteria,
    SessionSummary,
};
use crate::pedagogy;
use crate::selector;
use crate::storage::{load_state, reset_state, save_state, StateStorage};
use chrono::Utc;
use log::info;

/// One exam track: its config, its current state and the storage the state is
/// saved to. Callers that share an engine across threads must serialise access
/// themselves (e.g. behind a `Mutex`).
pub struct AdaptiveEngine<S: StateStorage> {
    config: EngineConfig,
    state: CoreAdaptiveState,
    storage: S,
}

impl<S: StateStorage> AdaptiveEngine<S> {
    /// Loads the saved state for `config.storage_key`, or starts fresh.
    pub fn load(config: EngineConfig, storage: S) -> Self {
        let state = load_state(&storage, &config);
        info!(
            "Engine ready for '{}' ({} sections, {} answers so far)",
            config.storage_key,
            config.sections.len(),
            state.total_questions_answered
        );
        AdaptiveEngine { config, state, storage }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &CoreAdaptiveState {
        &self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Records an answer and saves. A failed save is logged; the in-memory
    /// state is updated regardless.
    pub fn record_answer(&mut self, answer: &AnswerLog) -> &CoreAdaptiveState {
        let state = std::mem::replace(&mut self.state, CoreAdaptiveState::new(&self.config));
        self.state = pedagogy::record_answer(state, &self.config, answer, Utc::now());
        self.save();
        &self.state
    }

    pub fn select_questions<'a, Q, F>(
        &self,
        candidates: &'a [Q],
        criteria: &SelectionCriteria,
        section_of: F,
    ) -> Vec<SelectedQuestion<'a, Q>>
    where
        Q: Candidate,
        F: Fn(&Q) -> String,
    {
        selector::select_questions(candidates, &self.state, &self.config, criteria, section_of, Utc::now())
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        pedagogy::get_performance_summary(&self.state, &self.config, Utc::now())
    }

    pub fn questions_due_for_review(&self) -> Vec<String> {
        pedagogy::get_questions_due_for_review(&self.state, self.config.retrievability_threshold, Utc::now())
    }

    pub fn weak_sections(&self) -> Vec<String> {
        pedagogy::get_weak_sections(&self.state, &self.config)
    }

    pub fn weak_sub_sections(&self) -> Vec<String> {
        pedagogy::get_weak_sub_sections(&self.state, &self.config)
    }

    pub fn start_session(&mut self) {
        let state = std::mem::replace(&mut self.state, CoreAdaptiveState::new(&self.config));
        self.state = pedagogy::start_session(state, Utc::now());
        self.save();
    }

    pub fn end_session(&mut self) -> SessionSummary {
        let state = std::mem::replace(&mut self.state, CoreAdaptiveState::new(&self.config));
        let (state, summary) = pedagogy::end_session(state, Utc::now());
        self.state = state;
        self.save();
        summary
    }

    /// Best-effort save of the current state.
    pub fn save(&self) -> bool {
        save_state(&self.storage, &self.state, &self.config.storage_key)
    }

    /// Forgets everything recorded for this track.
    pub fn reset(&mut self) {
        self.state = reset_state(&self.storage, &self.config);
    }

    pub fn into_parts(self) -> (EngineConfig, CoreAdaptiveState, S) {
        (self.config, self.state, self.storage)
    }
}
