// src/scheduler.rs

//! Per-question scheduling: SM-2 ease/interval updates, the stability model
//! behind knowledge decay, and the retrievability estimate.

use crate::constants::*;
use crate::models::{AnswerSignal, Quality, QuestionHistoryEntry};
use chrono::{DateTime, Duration, Utc};
use log::debug;

// --- History Lifecycle ---

/// First answer to a question.
pub fn create_history(question_id: &str, is_correct: bool, now: DateTime<Utc>) -> QuestionHistoryEntry {
    QuestionHistoryEntry {
        question_id: question_id.to_string(),
        attempts: 1,
        correct_count: u32::from(is_correct),
        last_result: is_correct,
        last_attempted: now,
        ease_factor: EASE_FACTOR_DEFAULT,
        interval: 0,
        next_review_date: now,
        stability: if is_correct {
            STABILITY_INITIAL_CORRECT
        } else {
            STABILITY_INITIAL_INCORRECT
        },
        lapses: u32::from(!is_correct),
        last_response_time_ms: 0,
        average_response_time_ms: 0,
    }
}

/// Every answer after the first. Timed answers are graded on the 0-5 quality
/// scale, binary ones take the coarse correct/incorrect path, so the same
/// answer sequence yields different ease trajectories depending on whether
/// timing was captured.
pub fn update_history(
    entry: QuestionHistoryEntry,
    signal: AnswerSignal,
    target_time_ms: u64,
    now: DateTime<Utc>,
) -> QuestionHistoryEntry {
    match signal {
        AnswerSignal::Binary(correct) => update_binary(entry, correct, now),
        AnswerSignal::Timed {
            correct,
            response_time_ms,
        } => {
            let quality = response_to_quality(correct, response_time_ms, target_time_ms);
            let updated = calculate_sm2_with_quality(entry, quality, now);
            record_response_time(updated, response_time_ms)
        }
    }
}

/// Folds a measured response time into the running mean over `attempts`.
pub fn record_response_time(mut entry: QuestionHistoryEntry, response_time_ms: u64) -> QuestionHistoryEntry {
    entry.last_response_time_ms = response_time_ms;
    entry.average_response_time_ms = if entry.attempts > 1 {
        let n = entry.attempts as f64;
        let prev_total = entry.average_response_time_ms as f64 * (n - 1.0);
        ((prev_total + response_time_ms as f64) / n).round() as u64
    } else {
        response_time_ms
    };
    entry
}

// --- SM-2 ---

fn update_binary(mut entry: QuestionHistoryEntry, is_correct: bool, now: DateTime<Utc>) -> QuestionHistoryEntry {
    let old_ease = entry.ease_factor;
    let old_interval = entry.interval;

    register_attempt(&mut entry, is_correct, now);

    if is_correct {
        entry.interval = next_interval(entry.interval, entry.ease_factor);
        entry.ease_factor = (entry.ease_factor + EASE_FACTOR_INCREMENT_CORRECT).max(EASE_FACTOR_MIN);
        entry.stability = strengthen(entry.stability, 1.0 + STABILITY_GROWTH_BINARY * entry.ease_factor);
    } else {
        entry.ease_factor = (entry.ease_factor - EASE_FACTOR_DECREMENT_INCORRECT).max(EASE_FACTOR_MIN);
        apply_lapse(&mut entry);
    }
    entry.next_review_date = now + Duration::days(i64::from(entry.interval));

    debug!(
        "[SM-2 Binary] Question {}: Correct: {}, Ease {:.2} -> {:.2}, Interval {}d -> {}d, Stability {:.2}",
        entry.question_id, is_correct, old_ease, entry.ease_factor, old_interval, entry.interval, entry.stability
    );
    entry
}

/// Canonical SM-2 step for an explicit quality grade.
///
/// `EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))`, floored at 1.3.
/// Grades below 3 are lapses: interval back to 1, stability decays.
pub fn calculate_sm2_with_quality(
    mut entry: QuestionHistoryEntry,
    quality: Quality,
    now: DateTime<Utc>,
) -> QuestionHistoryEntry {
    let old_ease = entry.ease_factor;
    let old_interval = entry.interval;
    let q = f64::from(quality.value());
    let passed = quality.is_pass();

    register_attempt(&mut entry, passed, now);

    let miss = QUALITY_MAX as f64 - q;
    let delta = 0.1 - miss * (0.08 + miss * 0.02);

    if passed {
        entry.interval = next_interval(entry.interval, entry.ease_factor);
        entry.ease_factor = (entry.ease_factor + delta).max(EASE_FACTOR_MIN);
        let growth = 1.0 + (q - 2.0) * STABILITY_GROWTH_PER_QUALITY * entry.ease_factor;
        entry.stability = strengthen(entry.stability, growth);
    } else {
        entry.ease_factor = (entry.ease_factor + delta).max(EASE_FACTOR_MIN);
        apply_lapse(&mut entry);
    }
    entry.next_review_date = now + Duration::days(i64::from(entry.interval));

    debug!(
        "[SM-2 Quality] Question {}: q={}, Ease {:.2} -> {:.2}, Interval {}d -> {}d, Stability {:.2}",
        entry.question_id,
        quality.value(),
        old_ease,
        entry.ease_factor,
        old_interval,
        entry.interval,
        entry.stability
    );
    entry
}

/// Grades an answer from its correctness and how long it took relative to
/// the per-question target. Wrong answers that took longer score slightly
/// higher than snap guesses.
pub fn response_to_quality(is_correct: bool, response_time_ms: u64, target_time_ms: u64) -> Quality {
    let target = target_time_ms.max(1) as f64;
    let ratio = response_time_ms as f64 / target;

    let q = if is_correct {
        if ratio < 0.5 {
            5
        } else if ratio < 1.0 {
            4
        } else {
            3
        }
    } else if ratio < 0.25 {
        0
    } else if ratio < 0.75 {
        1
    } else {
        2
    };
    Quality::clamped(q)
}

fn register_attempt(entry: &mut QuestionHistoryEntry, is_correct: bool, now: DateTime<Utc>) {
    entry.attempts = entry.attempts.saturating_add(1);
    if is_correct {
        entry.correct_count = entry.correct_count.saturating_add(1);
    }
    entry.correct_count = entry.correct_count.min(entry.attempts);
    entry.last_result = is_correct;
    entry.last_attempted = now;
}

fn next_interval(current: u32, ease_factor: f64) -> u32 {
    match current {
        0 => INTERVAL_FIRST,
        1 => INTERVAL_SECOND,
        n => ((f64::from(n) * ease_factor).round() as u32)
            .max(n + 1)
            .min(INTERVAL_MAX),
    }
}

fn apply_lapse(entry: &mut QuestionHistoryEntry) {
    entry.interval = INTERVAL_LAPSE;
    entry.lapses = entry.lapses.saturating_add(1);
    entry.stability = (sanitize_stability(entry.stability) * STABILITY_LAPSE_MULTIPLIER).max(STABILITY_MIN);
}

fn strengthen(stability: f64, growth: f64) -> f64 {
    (sanitize_stability(stability) * growth.max(1.0)).clamp(STABILITY_MIN, STABILITY_MAX)
}

pub(crate) fn sanitize_stability(stability: f64) -> f64 {
    if stability.is_finite() && stability > 0.0 {
        stability.clamp(STABILITY_MIN, STABILITY_MAX)
    } else {
        STABILITY_INITIAL_CORRECT
    }
}

// --- Knowledge Decay ---

/// Exponential forgetting curve `R = exp(-t / S)`, `t` in days since the last
/// attempt and `S` the entry's stability. Returns a value in `(0, 1]`.
pub fn calculate_retrievability(entry: &QuestionHistoryEntry, now: DateTime<Utc>) -> f64 {
    let elapsed_ms = (now - entry.last_attempted).num_milliseconds().max(0);
    let elapsed_days = elapsed_ms as f64 / DAY_MILLIS;
    let r = (-elapsed_days / sanitize_stability(entry.stability)).exp();
    // exp underflows to 0.0 after ~745 half-lives; keep the open lower bound.
    r.max(f64::MIN_POSITIVE)
}
