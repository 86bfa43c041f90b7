//! Spam scoring from surface heuristics.
//!
//! Deterministic and pure: shouting, emoji walls, exclamation runs, urgency
//! phrases and financial promises each add to a score clamped to 0-10. At or
//! above the configured threshold the message gets a medium-severity signal.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::PolicyTables;
use crate::models::{DetectionSignal, Severity, SignalKind};

/// Maximum spam score; per-heuristic contributions are clamped to this.
pub const MAX_SCORE: u8 = 10;

/// "$500/day"-style financial promises.
fn money_promise_regex() -> &'static Regex {
    static MONEY: OnceLock<Regex> = OnceLock::new();
    MONEY.get_or_init(|| {
        Regex::new(r"(?i)[$€£]\s*\d[\d,]*\s*(?:/|per\s+)(?:hour|day|week|month)").unwrap()
    })
}

pub struct SpamScorer {
    urgency_phrases: Vec<String>,
    promo_phrases: Vec<String>,
    threshold: u8,
}

impl SpamScorer {
    pub fn new(tables: &PolicyTables, threshold: u8) -> Self {
        Self {
            urgency_phrases: tables
                .urgency_phrases
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            promo_phrases: tables
                .promo_phrases
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            threshold,
        }
    }

    /// Medium-severity signal when the score clears the threshold.
    pub fn check(&self, text: &str) -> Option<DetectionSignal> {
        let score = self.score(text);
        if score < self.threshold {
            return None;
        }
        Some(DetectionSignal::certain(
            SignalKind::Spam,
            format!("spam score {}", score),
            Severity::Medium,
            format!("spam heuristics scored {}/{}", score, MAX_SCORE),
        ))
    }

    /// Heuristic spam score, clamped to 0-10.
    pub fn score(&self, text: &str) -> u8 {
        let mut score: u32 = 0;
        let lowered = text.to_ascii_lowercase();

        // Shouting. Only meaningful with enough letters to shout.
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        if letters >= 10 {
            let upper = text.chars().filter(|c| c.is_uppercase()).count();
            let ratio = upper as f32 / letters as f32;
            if ratio > 0.6 {
                score += 3;
            } else if ratio > 0.4 {
                score += 2;
            }
        }

        // Exclamation runs.
        let max_run = longest_run(text, '!');
        if max_run >= 3 {
            score += 2;
        } else if max_run == 2 {
            score += 1;
        }

        // Emoji walls.
        let emoji = text.chars().filter(|c| is_emoji(*c)).count();
        if emoji >= 5 {
            score += 2;
        } else if emoji >= 3 {
            score += 1;
        }

        // Urgency vocabulary, two points each.
        let urgency_hits = self
            .urgency_phrases
            .iter()
            .filter(|p| lowered.contains(p.as_str()))
            .count();
        score += 2 * urgency_hits.min(2) as u32;

        // Promotional vocabulary, two points each.
        let promo_hits = self
            .promo_phrases
            .iter()
            .filter(|p| lowered.contains(p.as_str()))
            .count();
        score += 2 * promo_hits.min(2) as u32;

        // Financial promises.
        if money_promise_regex().is_match(text) {
            score += 2;
        }

        score.min(MAX_SCORE as u32) as u8
    }
}

fn longest_run(text: &str, target: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == target {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x1F1E6..=0x1F1FF | 0xFE0F
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PolicyTables, DEFAULT_SPAM_THRESHOLD};

    fn scorer() -> SpamScorer {
        SpamScorer::new(&PolicyTables::default(), DEFAULT_SPAM_THRESHOLD)
    }

    #[test]
    fn plain_text_scores_zero() {
        assert_eq!(scorer().score("hey, how was your weekend?"), 0);
        assert_eq!(scorer().score(""), 0);
    }

    #[test]
    fn classic_spam_clears_threshold() {
        let s = scorer();
        let text = "LIMITED TIME OFFER!!! EASY MONEY $500/day ACT NOW 🚀🚀🚀🚀🚀";
        let score = s.score(text);
        assert!(score >= DEFAULT_SPAM_THRESHOLD, "score was {}", score);
        let signal = s.check(text).expect("should flag");
        assert_eq!(signal.severity, Severity::Medium);
        assert_eq!(signal.kind, SignalKind::Spam);
    }

    #[test]
    fn shouting_alone_is_not_spam() {
        let s = scorer();
        let text = "WHY IS THE SERVER DOWN AGAIN";
        assert!(s.check(text).is_none(), "score {}", s.score(text));
    }

    #[test]
    fn short_uppercase_not_counted_as_shouting() {
        // "OK!!" has too few letters for the ratio heuristic.
        assert!(scorer().score("OK!!") <= 2);
    }

    #[test]
    fn money_promise_detected() {
        let s = scorer();
        assert!(s.score("earn $1,000/week from your phone") >= 2);
        assert!(s.score("earn € 300 per day guaranteed") >= 2);
    }

    #[test]
    fn exclamation_runs_scored() {
        assert_eq!(longest_run("wow!!! nice", '!'), 3);
        assert_eq!(longest_run("a! b! c!", '!'), 1);
    }

    #[test]
    fn score_never_exceeds_max() {
        let text = "ACT NOW!!! LIMITED TIME!!! EASY MONEY!!! PASSIVE INCOME \
                    $999/day 🚀🚀🚀🚀🚀🚀 CLICK NOW LAST CHANCE FINANCIAL FREEDOM";
        assert!(scorer().score(text) <= MAX_SCORE);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::config::{PolicyTables, DEFAULT_SPAM_THRESHOLD};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// The score is bounded and deterministic for arbitrary input.
        #[test]
        fn prop_score_bounded_and_pure(text in "\\PC{0,200}") {
            let s = SpamScorer::new(&PolicyTables::default(), DEFAULT_SPAM_THRESHOLD);
            let first = s.score(&text);
            prop_assert!(first <= MAX_SCORE);
            prop_assert_eq!(first, s.score(&text));
        }

        /// check() fires exactly when the score clears the threshold.
        #[test]
        fn prop_check_consistent_with_score(text in "\\PC{0,200}") {
            let s = SpamScorer::new(&PolicyTables::default(), DEFAULT_SPAM_THRESHOLD);
            let flagged = s.check(&text).is_some();
            prop_assert_eq!(flagged, s.score(&text) >= DEFAULT_SPAM_THRESHOLD);
        }
    }
}
