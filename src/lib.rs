// src/lib.rs

//! Adaptive learning engine for exam preparation.
//!
//! Tracks every answered question with SM-2 scheduling and an exponential
//! forgetting curve, keeps a continuous difficulty score, aggregates accuracy
//! per exam section and sub-section, and picks prioritized practice sets.
//! State is a plain value persisted as a versioned JSON blob.

pub mod config;
pub mod constants;
pub mod database;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod models;
pub mod pedagogy;
pub mod persistence;
pub mod repository;
pub mod scheduler;
pub mod selector;
pub mod storage;

pub use config::{create_engine_config, ConfigOverrides, EngineConfig};
pub use difficulty::{adjust_difficulty_score, difficulty_level_to_score, difficulty_score_to_level};
pub use engine::AdaptiveEngine;
pub use error::{EngineError, Result};
pub use models::{
    AnswerLog, AnswerSignal, Candidate, CoreAdaptiveState, DifficultyLevel, DifficultyTarget,
    PerformanceSummary, Quality, QuestionHistoryEntry, SectionBreakdown, SectionPerformanceEntry,
    SelectedQuestion, SelectionCriteria, SelectionReason, SessionSummary, SubSectionPerformance,
};
pub use pedagogy::{
    end_session, get_performance_summary, get_questions_due_for_review, get_weak_sections,
    get_weak_sub_sections, record_answer, start_session, sub_section_accuracy,
};
pub use persistence::{deserialize_state, serialize_state};
pub use scheduler::{
    calculate_retrievability, calculate_sm2_with_quality, create_history, record_response_time,
    response_to_quality, update_history,
};
pub use selector::{select_questions, shuffle};
pub use storage::{load_state, reset_state, save_state, MemoryStorage, SqliteStorage, StateStorage};
