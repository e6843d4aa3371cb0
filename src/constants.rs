// src/constants.rs

// --- Time Constants ---
pub const DAY_MILLIS: f64 = 86_400_000.0;
pub const DEFAULT_TARGET_TIME_PER_QUESTION_MS: u64 = 120_000; // 2 minutes

// --- Spaced Repetition (SM-2) Parameters ---
pub const EASE_FACTOR_MIN: f64 = 1.3;
pub const EASE_FACTOR_DEFAULT: f64 = 2.5;

// Binary path adjustments (no response time available)
pub const EASE_FACTOR_INCREMENT_CORRECT: f64 = 0.1;
pub const EASE_FACTOR_DECREMENT_INCORRECT: f64 = 0.2;

// Interval ladder: 0 -> 1 -> 6 -> round(interval * ease)
pub const INTERVAL_FIRST: u32 = 1;
pub const INTERVAL_SECOND: u32 = 6;
pub const INTERVAL_LAPSE: u32 = 1;
pub const INTERVAL_MAX: u32 = 36_500; // Days

// Quality scale (0..=5), passing grade is 3
pub const QUALITY_MAX: u8 = 5;
pub const QUALITY_PASS: u8 = 3;

// --- Knowledge Decay ---
pub const STABILITY_MIN: f64 = 0.4; // Days
pub const STABILITY_MAX: f64 = 365.0; // Days
pub const STABILITY_INITIAL_CORRECT: f64 = 1.0;
pub const STABILITY_INITIAL_INCORRECT: f64 = 0.4;
pub const STABILITY_GROWTH_BINARY: f64 = 0.1; // x (1 + k * ease)
pub const STABILITY_GROWTH_PER_QUALITY: f64 = 0.05; // x (1 + (q - 2) * k * ease)
pub const STABILITY_LAPSE_MULTIPLIER: f64 = 0.5;

// --- Difficulty ---
pub const DIFFICULTY_SCORE_DEFAULT: f64 = 0.5;
pub const DIFFICULTY_STEP: f64 = 0.2; // Fraction of remaining distance per adjustment
pub const DIFFICULTY_MIN_SAMPLES: usize = 3;
pub const DIFFICULTY_EASY_CEILING: f64 = 1.0 / 3.0;
pub const DIFFICULTY_MEDIUM_CEILING: f64 = 2.0 / 3.0;
pub const DIFFICULTY_SCORE_EASY: f64 = 0.17;
pub const DIFFICULTY_SCORE_MEDIUM: f64 = 0.5;
pub const DIFFICULTY_SCORE_HARD: f64 = 0.83;

// --- Engine Config Defaults ---
pub const DEFAULT_TARGET_ACCURACY: f64 = 0.75;
pub const DEFAULT_EASY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_HARD_THRESHOLD: f64 = 0.60;
pub const DEFAULT_RECENT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_RECENT_QUESTION_WINDOW: usize = 50;
pub const DEFAULT_READINESS_TARGET_QUESTIONS: u64 = 1500;
pub const DEFAULT_WEAKNESS_THRESHOLD: f64 = 0.70;
pub const DEFAULT_STRONG_THRESHOLD: f64 = 0.80;
pub const DEFAULT_MIN_QUESTIONS_FOR_STRONG: u32 = 50;
pub const DEFAULT_RETRIEVABILITY_THRESHOLD: f64 = 0.85;

// --- Weak Area Detection ---
pub const MIN_SECTION_ATTEMPTS_FOR_WEAKNESS: u32 = 3;
pub const MIN_SUB_SECTION_ATTEMPTS_FOR_WEAKNESS: u32 = 5;
pub const SECTION_WEIGHT_DEFAULT: f64 = 1.0;
pub const SUB_SECTION_WEIGHT_DEFAULT: f64 = 10.0;

// --- Selection ---
pub const REVIEW_SHARE: f64 = 0.2; // Max share of a set given to review-due items
pub const MAX_PER_WEAK_AREA: usize = 2;
pub const PRIORITY_REVIEW_BASE: f64 = 100.0;
pub const PRIORITY_REVIEW_URGENCY: f64 = 50.0;
pub const PRIORITY_WEAK_AREA_BASE: f64 = 80.0;
pub const PRIORITY_BALANCED: f64 = 50.0;
pub const PRIORITY_DIFFICULTY_MATCH: f64 = 30.0;

// --- Readiness ---
pub const READINESS_ACCURACY_WEIGHT: f64 = 0.6;
pub const READINESS_COVERAGE_WEIGHT: f64 = 0.4;

// --- Persistence ---
pub const SCHEMA_VERSION_LEGACY: u32 = 1;
pub const SCHEMA_VERSION_CURRENT: u32 = 2;
