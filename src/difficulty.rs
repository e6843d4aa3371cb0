// src/difficulty.rs

//! Continuous difficulty tracking. The learner's level is a single score in
//! `[0, 1]`; the easy/medium/hard label is always derived from it.

use crate::config::EngineConfig;
use crate::constants::*;
use crate::models::DifficultyLevel;
use log::debug;
use std::str::FromStr;

/// Moves `current_score` a fixed fraction of the way toward a target picked
/// from the windowed accuracy: 1.0 when the learner clears `easy_threshold`,
/// 0.0 at or under `hard_threshold`, the accuracy itself in between.
/// Fewer than `DIFFICULTY_MIN_SAMPLES` results leave the score untouched.
pub fn adjust_difficulty_score<'a, I>(recent_results: I, current_score: f64, config: &EngineConfig) -> f64
where
    I: IntoIterator<Item = &'a bool>,
    I::IntoIter: DoubleEndedIterator,
{
    let window: Vec<bool> = recent_results
        .into_iter()
        .rev()
        .take(config.recent_window_size)
        .copied()
        .collect();
    let current = if current_score.is_finite() {
        current_score.clamp(0.0, 1.0)
    } else {
        DIFFICULTY_SCORE_DEFAULT
    };

    if window.len() < DIFFICULTY_MIN_SAMPLES {
        return current;
    }

    let accuracy = window.iter().filter(|r| **r).count() as f64 / window.len() as f64;
    let target = if accuracy >= config.easy_threshold {
        1.0
    } else if accuracy <= config.hard_threshold {
        0.0
    } else {
        accuracy
    };

    let next = (current + DIFFICULTY_STEP * (target - current)).clamp(0.0, 1.0);
    debug!(
        "[Difficulty] Window accuracy {:.2} over {} -> target {:.2}, score {:.3} -> {:.3}",
        accuracy,
        window.len(),
        target,
        current,
        next
    );
    next
}

/// Tertile buckets at 1/3 and 2/3.
pub fn difficulty_score_to_level(score: f64) -> DifficultyLevel {
    if score < DIFFICULTY_EASY_CEILING {
        DifficultyLevel::Easy
    } else if score < DIFFICULTY_MEDIUM_CEILING {
        DifficultyLevel::Medium
    } else {
        DifficultyLevel::Hard
    }
}

pub fn level_score(level: DifficultyLevel) -> f64 {
    match level {
        DifficultyLevel::Easy => DIFFICULTY_SCORE_EASY,
        DifficultyLevel::Medium => DIFFICULTY_SCORE_MEDIUM,
        DifficultyLevel::Hard => DIFFICULTY_SCORE_HARD,
    }
}

/// Numeric score for an externally supplied difficulty label. Unknown labels
/// count as medium.
pub fn difficulty_level_to_score(label: &str) -> f64 {
    DifficultyLevel::from_str(label)
        .map(level_score)
        .unwrap_or(DIFFICULTY_SCORE_MEDIUM)
}
