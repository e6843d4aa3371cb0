// src/pedagogy.rs

use crate::config::EngineConfig;
use crate::constants::*;
use crate::difficulty::adjust_difficulty_score;
use crate::models::{
    ratio, AnswerLog, CoreAdaptiveState, PerformanceSummary, SectionBreakdown,
    SectionPerformanceEntry, SessionSummary, SubSectionPerformance,
};
use crate::scheduler::{calculate_retrievability, create_history, record_response_time, update_history};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// --- Public Interface ---

/// Records one answer and returns the successor state. This is the only
/// place the learning state changes; the caller persists the result.
pub fn record_answer(
    mut state: CoreAdaptiveState,
    config: &EngineConfig,
    answer: &AnswerLog,
    now: DateTime<Utc>,
) -> CoreAdaptiveState {
    let is_correct = answer.signal.is_correct();
    info!(
        "Recording answer for Question {} (Section {}): correct={}",
        answer.question_id, answer.section_id, is_correct
    );

    // 1. Question history (SM-2 + decay)
    update_question_logic(&mut state, config, answer, now);

    // 2. Counters and sliding windows
    state.total_questions_answered += 1;
    push_bounded(&mut state.recent_results, is_correct, config.recent_window_size);
    push_bounded(
        &mut state.last_session_questions,
        answer.question_id.clone(),
        config.recent_question_window,
    );
    if state.session_start_time.is_some() {
        state.session_answered += 1;
        if is_correct {
            state.session_correct += 1;
        }
    }

    // 3. Section / sub-section performance
    update_section_logic(&mut state, config, answer, now);

    // 4. Difficulty
    let old_score = state.difficulty_score();
    let new_score = adjust_difficulty_score(&state.recent_results, old_score, config);
    state.set_difficulty_score(new_score);
    debug!(
        "[Difficulty Result] Score {:.3} -> {:.3} ({})",
        old_score,
        state.difficulty_score(),
        state.current_difficulty()
    );

    state
}

/// Question ids whose retrievability has fallen under `threshold`, most
/// forgotten first. Correctly answered questions come back too once they
/// decay.
pub fn get_questions_due_for_review(state: &CoreAdaptiveState, threshold: f64, now: DateTime<Utc>) -> Vec<String> {
    let mut due: Vec<(&str, f64)> = state
        .question_history
        .iter()
        .map(|(id, entry)| (id.as_str(), calculate_retrievability(entry, now)))
        .filter(|(_, r)| *r < threshold)
        .collect();

    due.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    debug!("[Review] {} question(s) under retrievability {:.2}", due.len(), threshold);
    due.into_iter().map(|(id, _)| id.to_string()).collect()
}

/// Configured sections below `target_accuracy`, worst first. Sections with
/// fewer than `MIN_SECTION_ATTEMPTS_FOR_WEAKNESS` answers are left out.
///
/// The bar is intentionally higher than the one behind `needs_work`
/// (`weakness_threshold`): a section between the two is still picked for
/// practice without being marked as needing work.
pub fn get_weak_sections(state: &CoreAdaptiveState, config: &EngineConfig) -> Vec<String> {
    let candidates = config.sections.iter().filter_map(|id| {
        state
            .section_performance
            .get(id)
            .filter(|p| p.questions_attempted >= MIN_SECTION_ATTEMPTS_FOR_WEAKNESS)
            .map(|p| (id.clone(), p.accuracy, config.section_weight(id)))
    });
    rank_weak(candidates, config.target_accuracy)
}

/// Same rule one level down, across every configured section. A sub-section
/// id filed under several sections is judged once, on its merged counts.
pub fn get_weak_sub_sections(state: &CoreAdaptiveState, config: &EngineConfig) -> Vec<String> {
    let mut totals: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for perf in config.sections.iter().filter_map(|id| state.section_performance.get(id)) {
        for (id, sub) in &perf.sub_section_performance {
            let t = totals.entry(id.as_str()).or_insert((0, 0));
            t.0 += sub.questions_correct;
            t.1 += sub.questions_attempted;
        }
    }
    let candidates = totals
        .into_iter()
        .filter(|(_, (_, attempted))| *attempted >= MIN_SUB_SECTION_ATTEMPTS_FOR_WEAKNESS)
        .map(|(id, (correct, attempted))| {
            (id.to_string(), ratio(correct, attempted), config.sub_section_weight(id))
        });
    rank_weak(candidates, config.target_accuracy)
}

pub fn get_performance_summary(
    state: &CoreAdaptiveState,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> PerformanceSummary {
    let section_breakdown = config
        .sections
        .iter()
        .filter_map(|id| state.section_performance.get(id))
        .map(|p| SectionBreakdown {
            section: p.section_id.clone(),
            accuracy: p.accuracy,
            questions_attempted: p.questions_attempted,
        })
        .collect();

    let (correct, attempts) = state
        .question_history
        .values()
        .fold((0u64, 0u64), |(c, a), e| (c + u64::from(e.correct_count), a + u64::from(e.attempts)));
    let overall_accuracy = if attempts == 0 {
        0.0
    } else {
        correct as f64 / attempts as f64
    };
    let recent_accuracy = recent_accuracy(state);

    let coverage = (state.total_questions_answered as f64 / config.readiness_target_questions as f64 * 100.0)
        .min(100.0);
    let readiness_score =
        (recent_accuracy * 100.0 * READINESS_ACCURACY_WEIGHT + coverage * READINESS_COVERAGE_WEIGHT).round() as u32;

    let strong_sections = config
        .sections
        .iter()
        .filter(|id| {
            state.section_performance.get(*id).map_or(false, |p| {
                p.accuracy >= config.strong_threshold && p.questions_attempted >= config.min_questions_for_strong
            })
        })
        .cloned()
        .collect();

    PerformanceSummary {
        total_questions: state.total_questions_answered,
        overall_accuracy,
        recent_accuracy,
        current_difficulty: state.current_difficulty(),
        difficulty_score: state.difficulty_score(),
        readiness_score,
        section_breakdown,
        weak_sections: get_weak_sections(state, config),
        strong_sections,
        due_for_review: get_questions_due_for_review(state, config.retrievability_threshold, now).len(),
    }
}

// --- Sessions ---

pub fn start_session(mut state: CoreAdaptiveState, now: DateTime<Utc>) -> CoreAdaptiveState {
    if state.session_start_time.is_some() {
        warn!("Starting a session while one is already open; counters reset");
    }
    state.session_start_time = Some(now);
    state.session_answered = 0;
    state.session_correct = 0;
    info!("Session started at {}", now);
    state
}

/// Closes the current session. Without an open session the summary is all
/// zeros.
pub fn end_session(mut state: CoreAdaptiveState, now: DateTime<Utc>) -> (CoreAdaptiveState, SessionSummary) {
    let summary = match state.session_start_time.take() {
        Some(started) => SessionSummary {
            duration_secs: (now - started).num_seconds().max(0),
            questions_answered: state.session_answered,
            questions_correct: state.session_correct,
            accuracy: ratio(state.session_correct, state.session_answered),
        },
        None => {
            warn!("end_session called without an open session");
            SessionSummary {
                duration_secs: 0,
                questions_answered: 0,
                questions_correct: 0,
                accuracy: 0.0,
            }
        }
    };
    state.session_answered = 0;
    state.session_correct = 0;

    info!(
        "Session ended: {}s, {} answered, accuracy {:.2}",
        summary.duration_secs, summary.questions_answered, summary.accuracy
    );
    (state, summary)
}

// --- Internal Algorithm Logic ---

fn update_question_logic(state: &mut CoreAdaptiveState, config: &EngineConfig, answer: &AnswerLog, now: DateTime<Utc>) {
    let is_correct = answer.signal.is_correct();

    let updated = match state.question_history.remove(&answer.question_id) {
        Some(existing) => {
            debug!(
                "[SM-2 Input] Question {}: Attempts {}, Ease {:.2}, Interval {}d, Signal {:?}",
                answer.question_id, existing.attempts, existing.ease_factor, existing.interval, answer.signal
            );
            update_history(existing, answer.signal, config.target_time_per_question_ms, now)
        }
        None => {
            debug!("[SM-2 Input] Question {}: first attempt", answer.question_id);
            let entry = create_history(&answer.question_id, is_correct, now);
            match answer.signal.response_time_ms() {
                Some(ms) => record_response_time(entry, ms),
                None => entry,
            }
        }
    };

    info!(
        "[SM-2 Result] Question {}: Ease {:.2}, Interval {}d, Stability {:.2}, Lapses {}",
        updated.question_id, updated.ease_factor, updated.interval, updated.stability, updated.lapses
    );
    state.question_history.insert(answer.question_id.clone(), updated);
}

fn update_section_logic(state: &mut CoreAdaptiveState, config: &EngineConfig, answer: &AnswerLog, now: DateTime<Utc>) {
    let is_correct = answer.signal.is_correct();
    let recent = recent_accuracy(state);

    if !config.sections.contains(&answer.section_id) {
        warn!(
            "Answer for unconfigured section '{}'; tracking it anyway",
            answer.section_id
        );
    }

    let perf = state
        .section_performance
        .entry(answer.section_id.clone())
        .or_insert_with(|| SectionPerformanceEntry::new(answer.section_id.as_str()));
    let old_accuracy = perf.accuracy;

    perf.questions_attempted += 1;
    if is_correct {
        perf.questions_correct += 1;
    }
    perf.refresh(config.weakness_threshold);
    perf.recent_accuracy = recent;
    perf.last_practiced = Some(now);

    if let Some(sub_id) = &answer.sub_section_id {
        let sub = perf
            .sub_section_performance
            .entry(sub_id.clone())
            .or_insert_with(SubSectionPerformance::new);
        sub.record(is_correct, config.weakness_threshold);
    }

    update_concepts(perf, &answer.concepts, is_correct);

    info!(
        "[Section Result] {}: Accuracy {:.3} -> {:.3} (Attempts: {}, Needs work: {})",
        perf.section_id, old_accuracy, perf.accuracy, perf.questions_attempted, perf.needs_work
    );
}

fn update_concepts(perf: &mut SectionPerformanceEntry, concepts: &[String], is_correct: bool) {
    for concept in concepts {
        if is_correct {
            if !perf.mastered_concepts.contains(concept) {
                perf.mastered_concepts.push(concept.clone());
            }
            perf.struggle_concepts.retain(|c| c != concept);
        } else if !perf.struggle_concepts.contains(concept) {
            perf.struggle_concepts.push(concept.clone());
        }
    }
}

fn rank_weak<I>(candidates: I, target_accuracy: f64) -> Vec<String>
where
    I: Iterator<Item = (String, f64, f64)>,
{
    let mut weak: Vec<(String, f64, f64)> = candidates
        .filter(|(_, accuracy, _)| *accuracy < target_accuracy)
        .map(|(id, accuracy, weight)| (id, target_accuracy - accuracy, weight))
        .collect();

    // Largest gap first; exam weight breaks ties.
    weak.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal))
    });
    weak.into_iter().map(|(id, _, _)| id).collect()
}

fn recent_accuracy(state: &CoreAdaptiveState) -> f64 {
    let total = state.recent_results.len() as u32;
    let correct = state.recent_results.iter().filter(|r| **r).count() as u32;
    ratio(correct, total)
}

fn push_bounded<T>(queue: &mut std::collections::VecDeque<T>, item: T, bound: usize) {
    queue.push_back(item);
    while queue.len() > bound {
        queue.pop_front();
    }
}

/// Accuracy per sub-section across every section, for hosts that render a
/// flat blueprint view.
pub fn sub_section_accuracy(state: &CoreAdaptiveState) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for perf in state.section_performance.values() {
        for (id, sub) in &perf.sub_section_performance {
            let t = totals.entry(id.clone()).or_insert((0, 0));
            t.0 += sub.questions_correct;
            t.1 += sub.questions_attempted;
        }
    }
    totals
        .into_iter()
        .map(|(id, (correct, attempted))| (id, ratio(correct, attempted)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerSignal, DifficultyLevel};
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::with_defaults(
            "pedagogy-test",
            vec!["SEC1".into(), "SEC2".into(), "SEC3".into()],
            HashMap::from([("SEC1".into(), 40.0), ("SEC2".into(), 35.0), ("SEC3".into(), 25.0)]),
        )
    }

    fn answer(id: &str, section: &str, correct: bool) -> AnswerLog {
        AnswerLog::new(id, section, AnswerSignal::Binary(correct))
    }

    fn record_many(mut state: CoreAdaptiveState, c: &EngineConfig, section: &str, results: &[bool]) -> CoreAdaptiveState {
        for (i, ok) in results.iter().enumerate() {
            let id = format!("{}-{}", section.to_lowercase(), i);
            state = record_answer(state, c, &answer(&id, section, *ok), t0());
        }
        state
    }

    #[test]
    fn fresh_state_has_every_section() {
        let c = config();
        let s = CoreAdaptiveState::new(&c);
        assert_eq!(s.section_performance.len(), 3);
        assert_eq!(s.total_questions_answered, 0);
        assert_eq!(s.current_difficulty(), DifficultyLevel::Medium);
        assert!(s.question_history.is_empty());
    }

    #[test]
    fn record_updates_history_and_section() {
        let c = config();
        let s = record_answer(CoreAdaptiveState::new(&c), &c, &answer("q1", "SEC1", true), t0());
        assert_eq!(s.total_questions_answered, 1);
        assert_eq!(s.question_history["q1"].attempts, 1);
        let p = &s.section_performance["SEC1"];
        assert_eq!(p.questions_attempted, 1);
        assert_eq!(p.questions_correct, 1);
        assert_eq!(p.accuracy, 1.0);
        assert!(!p.needs_work);
        assert_eq!(p.last_practiced, Some(t0()));
    }

    #[test]
    fn recent_results_are_bounded() {
        let c = config();
        let s = record_many(CoreAdaptiveState::new(&c), &c, "SEC1", &[true; 25]);
        assert_eq!(s.recent_results.len(), c.recent_window_size);
        assert_eq!(s.total_questions_answered, 25);
    }

    #[test]
    fn sub_sections_are_created_lazily() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        assert!(s.section_performance["SEC1"].sub_section_performance.is_empty());
        s = record_answer(s, &c, &answer("q1", "SEC1", true).with_sub_section("SEC1-A"), t0());
        s = record_answer(s, &c, &answer("q2", "SEC1", false).with_sub_section("SEC1-A"), t0());
        let sub = &s.section_performance["SEC1"].sub_section_performance["SEC1-A"];
        assert_eq!(sub.questions_attempted, 2);
        assert_eq!(sub.accuracy, 0.5);
        assert_eq!(sub_section_accuracy(&s)["SEC1-A"], 0.5);
    }

    #[test]
    fn concepts_move_between_lists() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        s = record_answer(s, &c, &answer("q1", "SEC1", false).with_concepts(["leases"]), t0());
        assert_eq!(s.section_performance["SEC1"].struggle_concepts, vec!["leases".to_string()]);
        s = record_answer(s, &c, &answer("q2", "SEC1", true).with_concepts(["leases"]), t0());
        let p = &s.section_performance["SEC1"];
        assert!(p.struggle_concepts.is_empty());
        assert_eq!(p.mastered_concepts, vec!["leases".to_string()]);
    }

    #[test]
    fn weak_sections_need_samples_and_rank_by_gap() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        s = record_many(s, &c, "SEC1", &[true, false, false, false]); // 0.25
        s = record_many(s, &c, "SEC2", &[true, true, false, false]); // 0.50
        s = record_many(s, &c, "SEC3", &[false, false]); // too few
        assert_eq!(get_weak_sections(&s, &c), vec!["SEC1".to_string(), "SEC2".to_string()]);
    }

    #[test]
    fn strong_sections_are_not_weak() {
        let c = config();
        let s = record_many(CoreAdaptiveState::new(&c), &c, "SEC1", &[true; 6]);
        assert!(get_weak_sections(&s, &c).is_empty());
    }

    #[test]
    fn weak_sub_sections_need_their_own_samples() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        for i in 0..5 {
            let a = answer(&format!("a{}", i), "SEC1", i == 0).with_sub_section("SEC1-A");
            s = record_answer(s, &c, &a, t0());
        }
        for i in 0..4 {
            let a = answer(&format!("b{}", i), "SEC1", false).with_sub_section("SEC1-B");
            s = record_answer(s, &c, &a, t0());
        }
        assert_eq!(get_weak_sub_sections(&s, &c), vec!["SEC1-A".to_string()]);
    }

    #[test]
    fn shared_sub_section_is_ranked_once_on_merged_counts() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        for section in ["SEC1", "SEC2"] {
            for i in 0..3 {
                let a = answer(&format!("{}-shared-{}", section, i), section, false).with_sub_section("SHARED");
                s = record_answer(s, &c, &a, t0());
            }
        }
        assert_eq!(s.section_performance["SEC1"].sub_section_performance["SHARED"].questions_attempted, 3);
        assert_eq!(get_weak_sub_sections(&s, &c), vec!["SHARED".to_string()]);
    }

    #[test]
    fn weak_section_between_thresholds_is_not_flagged() {
        let c = config();
        assert!(c.weakness_threshold < c.target_accuracy);
        let mut results = vec![true; 18];
        results.extend([false; 7]);
        let s = record_many(CoreAdaptiveState::new(&c), &c, "SEC1", &results);
        let p = &s.section_performance["SEC1"];
        assert_eq!(p.accuracy, 0.72);
        assert!(!p.needs_work);
        assert_eq!(get_weak_sections(&s, &c), vec!["SEC1".to_string()]);
    }

    #[test]
    fn due_review_includes_decayed_correct_answers() {
        let c = config();
        let s = record_answer(CoreAdaptiveState::new(&c), &c, &answer("q1", "SEC1", true), t0());
        assert!(get_questions_due_for_review(&s, 0.85, t0()).is_empty());
        let later = t0() + Duration::days(3);
        assert_eq!(get_questions_due_for_review(&s, 0.85, later), vec!["q1".to_string()]);
    }

    #[test]
    fn due_review_orders_by_urgency() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        s = record_answer(s, &c, &answer("sturdy", "SEC1", true), t0());
        s = record_answer(s, &c, &answer("fragile", "SEC1", false), t0());
        let due = get_questions_due_for_review(&s, 0.85, t0() + Duration::days(1));
        assert_eq!(due, vec!["fragile".to_string(), "sturdy".to_string()]);
    }

    #[test]
    fn summary_reports_readiness() {
        let c = config();
        let s = record_many(CoreAdaptiveState::new(&c), &c, "SEC1", &[true; 10]);
        let summary = get_performance_summary(&s, &c, t0());
        assert_eq!(summary.total_questions, 10);
        assert_eq!(summary.overall_accuracy, 1.0);
        // 60 * 1.0 + 0.4 * (10 / 1500 * 100)
        assert_eq!(summary.readiness_score, 60);
        assert_eq!(summary.section_breakdown.len(), 3);
        assert!(summary.strong_sections.is_empty());
    }

    #[test]
    fn session_counts_answers_since_start() {
        let c = config();
        let mut s = record_many(CoreAdaptiveState::new(&c), &c, "SEC1", &[true, true]);
        s = start_session(s, t0());
        s = record_many(s, &c, "SEC2", &[true, false, true, true]);
        let (s, summary) = end_session(s, t0() + Duration::minutes(25));
        assert_eq!(summary.duration_secs, 25 * 60);
        assert_eq!(summary.questions_answered, 4);
        assert_eq!(summary.questions_correct, 3);
        assert_eq!(summary.accuracy, 0.75);
        assert!(s.session_start_time.is_none());
    }

    #[test]
    fn end_without_start_is_zeroed() {
        let c = config();
        let (s, summary) = end_session(CoreAdaptiveState::new(&c), t0());
        assert_eq!(summary.duration_secs, 0);
        assert_eq!(summary.questions_answered, 0);
        assert!(s.session_start_time.is_none());
    }
}
