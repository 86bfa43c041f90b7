//! Lexical pattern matching.
//!
//! Two layers, both built once at startup from the policy tables: an
//! Aho-Corasick automaton over every banned keyword (one pass over the
//! message regardless of table size) and a `RegexSet` of structural patterns
//! for shapes a keyword list cannot express. Pure: no side effects, no
//! allocation beyond the returned signals.

use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::{Regex, RegexSet};

use crate::config::PolicyTables;
use crate::error::{ModSentryError, Result};
use crate::models::{DetectionSignal, Severity, SignalKind};

/// Remove `@handle` mentions so usernames never trip keyword matches.
pub fn strip_mentions(text: &str) -> String {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    let re = MENTION.get_or_init(|| Regex::new(r"@\w+").unwrap());
    re.replace_all(text, " ").into_owned()
}

/// Multi-pattern scanner over the banned-keyword and structural-pattern
/// tables.
pub struct PatternMatcher {
    keywords: AhoCorasick,
    /// Severity of keyword i, parallel to the automaton's pattern order.
    keyword_severities: Vec<Severity>,
    keyword_terms: Vec<String>,
    structural: RegexSet,
    /// Individually compiled copies of the set, used to pull out the
    /// matched text once the set reports a hit.
    structural_regexes: Vec<Regex>,
    structural_severities: Vec<Severity>,
    whitelist: Vec<String>,
}

impl PatternMatcher {
    pub fn new(tables: &PolicyTables) -> Result<Self> {
        let mut keyword_terms = Vec::new();
        let mut keyword_severities = Vec::new();
        for (list, severity) in [
            (&tables.critical_keywords, Severity::Critical),
            (&tables.high_keywords, Severity::High),
            (&tables.medium_keywords, Severity::Medium),
        ] {
            for term in list {
                keyword_terms.push(term.to_ascii_lowercase());
                keyword_severities.push(severity);
            }
        }

        let keywords = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&keyword_terms)
            .map_err(|e| ModSentryError::KeywordTable(e.to_string()))?;

        let mut structural_patterns = Vec::new();
        let mut structural_severities = Vec::new();
        for (list, severity) in [
            (&tables.critical_patterns, Severity::Critical),
            (&tables.high_patterns, Severity::High),
            (&tables.medium_patterns, Severity::Medium),
        ] {
            for pattern in list {
                structural_patterns.push(pattern.clone());
                structural_severities.push(severity);
            }
        }

        let structural = RegexSet::new(&structural_patterns)?;
        let structural_regexes = structural_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let whitelist = tables
            .whitelist_phrases
            .iter()
            .map(|p| p.to_ascii_lowercase())
            .collect();

        Ok(Self {
            keywords,
            keyword_severities,
            keyword_terms,
            structural,
            structural_regexes,
            structural_severities,
            whitelist,
        })
    }

    /// First whitelist phrase contained in the text, if any. A hit means the
    /// message discusses a sensitive topic legitimately and skips content
    /// checks entirely.
    pub fn whitelist_hit(&self, text: &str) -> Option<&str> {
        let lowered = text.to_ascii_lowercase();
        self.whitelist
            .iter()
            .find(|phrase| lowered.contains(phrase.as_str()))
            .map(|s| s.as_str())
    }

    /// Scan the text and return every keyword and structural hit.
    pub fn scan(&self, text: &str) -> Vec<DetectionSignal> {
        let mut signals = Vec::new();
        let bytes = text.as_bytes();

        for mat in self.keywords.find_overlapping_iter(text) {
            // Keyword hits inside a longer word do not count: "lean" must
            // not fire inside "clean".
            if !on_word_boundary(bytes, mat.start(), mat.end()) {
                continue;
            }
            let idx = mat.pattern().as_usize();
            let term = &self.keyword_terms[idx];
            let severity = self.keyword_severities[idx];
            if signals
                .iter()
                .any(|s: &DetectionSignal| s.matched == *term)
            {
                continue;
            }
            signals.push(DetectionSignal::certain(
                SignalKind::Pattern,
                term.clone(),
                severity,
                format!("banned keyword: {}", term),
            ));
        }

        for idx in self.structural.matches(text) {
            let matched = self.structural_regexes[idx]
                .find(text)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| self.structural_regexes[idx].as_str().to_string());
            signals.push(DetectionSignal::certain(
                SignalKind::Pattern,
                matched.clone(),
                self.structural_severities[idx],
                format!("structural pattern: {}", matched),
            ));
        }

        signals
    }
}

/// A keyword match only counts when neither neighbor is alphanumeric.
fn on_word_boundary(bytes: &[u8], start: usize, end: usize) -> bool {
    let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
    let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
    before_ok && after_ok
}
