// src/selector.rs

use crate::config::EngineConfig;
use crate::constants::*;
use crate::difficulty::{difficulty_level_to_score, level_score};
use crate::models::{Candidate, CoreAdaptiveState, DifficultyTarget, SelectedQuestion, SelectionCriteria, SelectionReason};
use crate::pedagogy::{get_weak_sections, get_weak_sub_sections};
use crate::scheduler::calculate_retrievability;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering;
use std::collections::HashSet;

struct Pooled<'a, Q> {
    question: &'a Q,
    section: String,
    retrievability: Option<f64>,
}

// --- Public Interface ---

/// Builds a prioritized practice set from `candidates`.
///
/// Buckets fill in order:
/// 1. Review-due: seen questions whose retrievability dropped under the
///    threshold, most forgotten first, capped at a fifth of the set.
/// 2. Weak areas: unseen or due questions from weak sub-sections, then weak
///    sections, at most two per area.
/// 3. Difficulty match: the rest, closest tagged difficulty to the target
///    first (optionally balanced across sections first).
///
/// Candidates are shuffled before bucketing so equal-ranked items come out in
/// a fresh order each call; pass `criteria.seed` for a reproducible order.
/// Never returns more than `criteria.count` or `candidates.len()` items.
pub fn select_questions<'a, Q, F>(
    candidates: &'a [Q],
    state: &CoreAdaptiveState,
    config: &EngineConfig,
    criteria: &SelectionCriteria,
    section_of: F,
    now: DateTime<Utc>,
) -> Vec<SelectedQuestion<'a, Q>>
where
    Q: Candidate,
    F: Fn(&Q) -> String,
{
    let limit = criteria.count.min(candidates.len());
    if limit == 0 {
        return Vec::new();
    }
    let threshold = config.retrievability_threshold;
    let mut rng = selection_rng(criteria.seed);

    let mut pool = build_pool(candidates, state, criteria, &section_of, now);
    pool.shuffle(&mut rng);
    debug!("[Select] Pool of {} candidate(s) for {} slot(s)", pool.len(), limit);

    let mut selected: Vec<SelectedQuestion<'a, Q>> = Vec::with_capacity(limit);
    let mut used: HashSet<&'a str> = HashSet::new();

    // 1. Review (Memory Protection)
    if criteria.include_review_due {
        let cap = ((criteria.count as f64 * REVIEW_SHARE).ceil() as usize).min(limit);
        let mut due: Vec<(&Pooled<'a, Q>, f64)> = pool
            .iter()
            .filter_map(|p| p.retrievability.filter(|r| *r < threshold).map(|r| (p, r)))
            .collect();
        due.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        for (p, r) in due {
            if selected.len() >= cap {
                break;
            }
            let priority = PRIORITY_REVIEW_BASE + (1.0 - r) * PRIORITY_REVIEW_URGENCY;
            take(&mut selected, &mut used, p, SelectionReason::ReviewDue, priority);
        }
        debug!("[Select] Review-due bucket: {}", selected.len());
    }

    // 2. Weak areas (Remediation)
    if criteria.prioritize_weak_areas && selected.len() < limit {
        let areas: Vec<(String, bool)> = get_weak_sub_sections(state, config)
            .into_iter()
            .map(|a| (a, true))
            .chain(get_weak_sections(state, config).into_iter().map(|a| (a, false)))
            .collect();
        let before = selected.len();

        for (area, is_sub) in &areas {
            if selected.len() >= limit {
                break;
            }
            let weight = if *is_sub {
                config.sub_section_weight(area)
            } else {
                config.section_weight(area)
            };
            let mut taken = 0;
            for p in &pool {
                if taken >= MAX_PER_WEAK_AREA || selected.len() >= limit {
                    break;
                }
                if used.contains(p.question.id()) {
                    continue;
                }
                let in_area = if *is_sub {
                    p.question.sub_section() == Some(area.as_str())
                } else {
                    p.section == *area
                };
                let unseen_or_due = p.retrievability.map_or(true, |r| r < threshold);
                if in_area && unseen_or_due {
                    take(
                        &mut selected,
                        &mut used,
                        p,
                        SelectionReason::WeakArea,
                        PRIORITY_WEAK_AREA_BASE + weight,
                    );
                    taken += 1;
                }
            }
        }
        debug!(
            "[Select] Weak-area bucket: {} from {} weak area(s)",
            selected.len() - before,
            areas.len()
        );
    }

    // 3. Difficulty match (Fill)
    if selected.len() < limit {
        let target = match criteria.difficulty {
            DifficultyTarget::Adaptive => state.difficulty_score(),
            DifficultyTarget::Fixed(level) => level_score(level),
        };
        let mut scored: Vec<(&Pooled<'a, Q>, f64)> = pool
            .iter()
            .filter(|p| !used.contains(p.question.id()))
            .map(|p| {
                let closeness = 1.0 - (difficulty_level_to_score(p.question.difficulty()) - target).abs();
                (p, closeness)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        if criteria.exam_weighted {
            let sections: &[String] = criteria.sections.as_deref().unwrap_or(&config.sections);
            let remaining = limit - selected.len();
            let per_section = if sections.is_empty() {
                0
            } else {
                (remaining + sections.len() - 1) / sections.len()
            };
            for section in sections {
                let mut taken = 0;
                for (p, _) in &scored {
                    if taken >= per_section || selected.len() >= limit {
                        break;
                    }
                    if p.section != *section || used.contains(p.question.id()) {
                        continue;
                    }
                    take(&mut selected, &mut used, p, SelectionReason::Balanced, PRIORITY_BALANCED);
                    taken += 1;
                }
            }
        }

        for (p, _) in &scored {
            if selected.len() >= limit {
                break;
            }
            if used.contains(p.question.id()) {
                continue;
            }
            take(
                &mut selected,
                &mut used,
                p,
                SelectionReason::DifficultyMatch,
                PRIORITY_DIFFICULTY_MATCH,
            );
        }
        debug!("[Select] Target difficulty {:.2}", target);
    }

    selected.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(Ordering::Equal));
    selected.truncate(limit);

    info!(
        "Selected {} of {} requested question(s) from {} candidate(s)",
        selected.len(),
        criteria.count,
        candidates.len()
    );
    selected
}

/// Uniform in-place permutation. `Some(seed)` makes the order reproducible.
pub fn shuffle<T>(items: &mut [T], seed: Option<u64>) {
    items.shuffle(&mut selection_rng(seed));
}

// --- Internal Logic ---

fn selection_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn build_pool<'a, Q, F>(
    candidates: &'a [Q],
    state: &CoreAdaptiveState,
    criteria: &SelectionCriteria,
    section_of: &F,
    now: DateTime<Utc>,
) -> Vec<Pooled<'a, Q>>
where
    Q: Candidate,
    F: Fn(&Q) -> String,
{
    let recent: HashSet<&str> = if criteria.exclude_recent {
        state.last_session_questions.iter().map(String::as_str).collect()
    } else {
        HashSet::new()
    };
    let sub_filter = criteria.sub_sections.as_ref().filter(|subs| !subs.is_empty());
    let mut seen: HashSet<&str> = HashSet::new();

    candidates
        .iter()
        .filter(|q| seen.insert(q.id()))
        .filter(|q| !recent.contains(q.id()))
        .filter(|q| match sub_filter {
            Some(subs) => q.sub_section().map_or(false, |sub| subs.iter().any(|s| s == sub)),
            None => true,
        })
        .filter_map(|q| {
            let section = section_of(q);
            if let Some(sections) = &criteria.sections {
                if !sections.contains(&section) {
                    return None;
                }
            }
            Some(Pooled {
                question: q,
                section,
                retrievability: state
                    .question_history
                    .get(q.id())
                    .map(|e| calculate_retrievability(e, now)),
            })
        })
        .collect()
}

fn take<'a, Q>(
    selected: &mut Vec<SelectedQuestion<'a, Q>>,
    used: &mut HashSet<&'a str>,
    p: &Pooled<'a, Q>,
    reason: SelectionReason,
    priority: f64,
) where
    Q: Candidate,
{
    used.insert(p.question.id());
    selected.push(SelectedQuestion {
        question: p.question,
        section_id: p.section.clone(),
        reason,
        priority,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerLog, AnswerSignal, DifficultyLevel, QuestionHistoryEntry};
    use crate::pedagogy::record_answer;
    use crate::scheduler::create_history;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq)]
    struct Card {
        id: String,
        section: String,
        sub: Option<String>,
        difficulty: String,
    }

    impl Candidate for Card {
        fn id(&self) -> &str {
            &self.id
        }
        fn difficulty(&self) -> &str {
            &self.difficulty
        }
        fn sub_section(&self) -> Option<&str> {
            self.sub.as_deref()
        }
    }

    fn card(id: &str, section: &str, difficulty: &str) -> Card {
        Card {
            id: id.into(),
            section: section.into(),
            sub: None,
            difficulty: difficulty.into(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::with_defaults(
            "selector-test",
            vec!["SEC1".into(), "SEC2".into()],
            HashMap::from([("SEC1".into(), 60.0), ("SEC2".into(), 40.0)]),
        )
    }

    fn section_of(c: &Card) -> String {
        c.section.clone()
    }

    /// History entry whose retrievability at `t0()` equals `r` (stability 1 day).
    fn entry_with_retrievability(id: &str, r: f64) -> QuestionHistoryEntry {
        let elapsed_ms = (-r.ln() * DAY_MILLIS) as i64;
        let mut e = create_history(id, true, t0() - Duration::milliseconds(elapsed_ms));
        e.stability = 1.0;
        e
    }

    fn pool() -> Vec<Card> {
        vec![
            card("e1", "SEC1", "easy"),
            card("e2", "SEC2", "easy"),
            card("m1", "SEC1", "medium"),
            card("m2", "SEC2", "medium"),
            card("h1", "SEC1", "hard"),
            card("h2", "SEC2", "hard"),
        ]
    }

    #[test]
    fn respects_count_and_pool_size() {
        let c = config();
        let s = CoreAdaptiveState::new(&c);
        let cards = pool();
        let mut criteria = SelectionCriteria::new(3);
        criteria.seed = Some(7);
        assert_eq!(select_questions(&cards, &s, &c, &criteria, section_of, t0()).len(), 3);

        criteria.count = 50;
        assert_eq!(select_questions(&cards, &s, &c, &criteria, section_of, t0()).len(), 6);

        criteria.count = 0;
        assert!(select_questions(&cards, &s, &c, &criteria, section_of, t0()).is_empty());
    }

    #[test]
    fn most_forgotten_review_wins_the_slot() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        s.question_history.insert("faded".into(), entry_with_retrievability("faded", 0.3));
        s.question_history.insert("fresh".into(), entry_with_retrievability("fresh", 0.9));
        let cards = vec![card("fresh", "SEC1", "medium"), card("faded", "SEC1", "medium")];

        let mut criteria = SelectionCriteria::new(1);
        criteria.seed = Some(1);
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].question.id, "faded");
        assert_eq!(picked[0].reason, SelectionReason::ReviewDue);

        criteria.count = 2;
        let both = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        assert_eq!(both[0].question.id, "faded");
        assert!(both[0].priority > both[1].priority);
        assert!((both[0].priority - 135.0).abs() < 1e-6);
    }

    #[test]
    fn review_bucket_is_skipped_when_disabled() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        s.question_history.insert("faded".into(), entry_with_retrievability("faded", 0.1));
        let cards = vec![card("faded", "SEC1", "medium")];
        let mut criteria = SelectionCriteria::new(1);
        criteria.include_review_due = false;
        criteria.prioritize_weak_areas = false;
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        assert_eq!(picked[0].reason, SelectionReason::DifficultyMatch);
    }

    #[test]
    fn weak_sections_get_reinforced() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        for i in 0..4 {
            let a = AnswerLog::new(format!("old{}", i), "SEC2", AnswerSignal::Binary(false));
            s = record_answer(s, &c, &a, t0());
        }
        let cards = pool();
        let mut criteria = SelectionCriteria::new(4);
        criteria.include_review_due = false;
        criteria.seed = Some(3);
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());

        let weak: Vec<_> = picked.iter().filter(|p| p.reason == SelectionReason::WeakArea).collect();
        assert_eq!(weak.len(), 2);
        assert!(weak.iter().all(|p| p.section_id == "SEC2"));
        assert!((weak[0].priority - 120.0).abs() < 1e-9);
        assert_eq!(picked[0].reason, SelectionReason::WeakArea);
    }

    #[test]
    fn fills_by_nearest_difficulty() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        s.set_difficulty_score(0.9);
        let cards = vec![card("m1", "SEC1", "medium"), card("e1", "SEC1", "easy")];
        let mut criteria = SelectionCriteria::new(1);
        criteria.seed = Some(11);
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        // No "hard" left: medium is the closest to 0.9.
        assert_eq!(picked[0].question.id, "m1");

        criteria.difficulty = DifficultyTarget::Fixed(DifficultyLevel::Easy);
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        assert_eq!(picked[0].question.id, "e1");
    }

    #[test]
    fn section_filter_and_projection() {
        let c = config();
        let s = CoreAdaptiveState::new(&c);
        let cards = pool();
        let mut criteria = SelectionCriteria::new(10);
        criteria.sections = Some(vec!["SEC2".into()]);
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|p| p.section_id == "SEC2" && p.question.section == "SEC2"));
    }

    #[test]
    fn sub_section_filter_uses_candidate_tags() {
        let c = config();
        let s = CoreAdaptiveState::new(&c);
        let mut cards = pool();
        cards[0].sub = Some("SEC1-A".into());
        cards[2].sub = Some("SEC1-B".into());
        let mut criteria = SelectionCriteria::new(10);
        criteria.sub_sections = Some(vec!["SEC1-A".into()]);
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].question.id, "e1");
    }

    #[test]
    fn exclude_recent_drops_recent_questions() {
        let c = config();
        let mut s = CoreAdaptiveState::new(&c);
        s = record_answer(s, &c, &AnswerLog::new("m1", "SEC1", AnswerSignal::Binary(true)), t0());
        let cards = pool();
        let mut criteria = SelectionCriteria::new(10);
        criteria.exclude_recent = true;
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        assert_eq!(picked.len(), 5);
        assert!(picked.iter().all(|p| p.question.id != "m1"));
    }

    #[test]
    fn exam_weighted_balances_sections() {
        let c = config();
        let s = CoreAdaptiveState::new(&c);
        let cards = pool();
        let mut criteria = SelectionCriteria::new(4);
        criteria.exam_weighted = true;
        criteria.seed = Some(5);
        let picked = select_questions(&cards, &s, &c, &criteria, section_of, t0());
        assert_eq!(picked.len(), 4);
        assert!(picked.iter().all(|p| p.reason == SelectionReason::Balanced));
        let sec1 = picked.iter().filter(|p| p.section_id == "SEC1").count();
        assert_eq!(sec1, 2);
    }

    #[test]
    fn same_seed_same_order() {
        let c = config();
        let s = CoreAdaptiveState::new(&c);
        let cards: Vec<Card> = (0..20).map(|i| card(&format!("q{}", i), "SEC1", "medium")).collect();
        let mut criteria = SelectionCriteria::new(8);
        criteria.seed = Some(42);
        let a: Vec<String> = select_questions(&cards, &s, &c, &criteria, section_of, t0())
            .into_iter()
            .map(|p| p.question.id.clone())
            .collect();
        let b: Vec<String> = select_questions(&cards, &s, &c, &criteria, section_of, t0())
            .into_iter()
            .map(|p| p.question.id.clone())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_candidate_ids_are_selected_once() {
        let c = config();
        let s = CoreAdaptiveState::new(&c);
        let cards = vec![card("q1", "SEC1", "easy"), card("q1", "SEC1", "easy")];
        let picked = select_questions(&cards, &s, &c, &SelectionCriteria::new(2), section_of, t0());
        assert_eq!(picked.len(), 1);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut items: Vec<u32> = (0..50).collect();
        shuffle(&mut items, Some(9));
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());

        let mut empty: Vec<u32> = Vec::new();
        shuffle(&mut empty, None);
        assert!(empty.is_empty());
    }
}
