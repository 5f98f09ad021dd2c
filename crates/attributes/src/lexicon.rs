//! Lexical proxies for actionability, empathy and positivity.
//!
//! These are keyword counters, not semantic judgments. The caps and the
//! matching rules (regex word matches for actions, plain substrings for the
//! other two) determine score magnitude and must stay as they are.

use regex::Regex;
use std::sync::LazyLock;

pub const ACTIONABILITY_CAP: f64 = 3.0;
pub const EMPATHY_CAP: f64 = 3.0;
pub const POSITIVITY_CAP: f64 = 4.0;

static ACTION_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)\b(can|will|could|should|try|start|practice|focus|work|plan)\b")
            .expect("action verb pattern"),
        Regex::new(r"(?i)\b(하자|해보자|할 수 있다|하겠다|시작하다)\b")
            .expect("localized action pattern"),
    ]
});

pub const EMPATHY_KEYWORDS: [&str; 10] = [
    "understand",
    "feel",
    "okay",
    "normal",
    "valid",
    "이해",
    "괜찮",
    "힘들",
    "당연",
    "자연스러운",
];

pub const POSITIVE_WORDS: [&str; 12] = [
    "can",
    "will",
    "able",
    "succeed",
    "good",
    "better",
    "improve",
    "할 수 있",
    "잘",
    "개선",
    "성장",
    "가능",
];

/// Number of action-verb matches across both patterns.
#[must_use]
pub fn action_matches(text: &str) -> usize {
    ACTION_PATTERNS
        .iter()
        .map(|pattern| pattern.find_iter(text).count())
        .sum()
}

/// Number of distinct lexicon entries present as substrings of the lower-cased text.
#[must_use]
pub fn keyword_hits(text: &str, lexicon: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    lexicon.iter().filter(|kw| lowered.contains(*kw)).count()
}

#[must_use]
pub fn capped(count: usize, cap: f64) -> f64 {
    (count as f64 / cap).min(1.0)
}

#[must_use]
pub fn actionability(text: &str) -> f64 {
    capped(action_matches(text), ACTIONABILITY_CAP)
}

#[must_use]
pub fn empathy(text: &str) -> f64 {
    capped(keyword_hits(text, &EMPATHY_KEYWORDS), EMPATHY_CAP)
}

#[must_use]
pub fn positivity(text: &str) -> f64 {
    capped(keyword_hits(text, &POSITIVE_WORDS), POSITIVITY_CAP)
}

/// Round half away from zero to 3 decimals.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
