//! Vouch recognition and sanitization.
//!
//! Reputation statements ("vouch for @user, legit seller") often contain
//! trade vocabulary that would otherwise be deleted. Instead of losing the
//! reputation signal, the transport can repost a sanitized copy with the
//! banned terms masked. Both functions here are pure text transforms.

use regex::Regex;

use crate::config::PolicyTables;
use crate::error::Result;

/// Vocabulary that marks a message as a reputation statement. Recognition
/// vocabulary, not policy, so it is not part of the policy tables.
const VOUCH_TERMS: &[&str] = &[
    "vouch",
    "vouched",
    "vouches",
    "vouching",
    "rep",
    "reputable",
    "legit",
    "trusted",
    "verified",
    "confirmed",
    "endorsed",
    "recommend",
    "good trade",
    "legit seller",
    "not scam",
];

/// Placeholder written over each masked term.
const MASK: &str = "[removed]";

pub struct VouchFilter {
    vouch_re: Regex,
    /// One alternation over every banned keyword, so sanitization is a
    /// single pass regardless of table size.
    sanitize_re: Option<Regex>,
}

impl VouchFilter {
    pub fn new(tables: &PolicyTables) -> Result<Self> {
        let vouch_alt = VOUCH_TERMS
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let vouch_re = Regex::new(&format!(r"(?i)\b(?:{})\b", vouch_alt))?;

        let mut banned: Vec<String> = Vec::new();
        for list in [
            &tables.critical_keywords,
            &tables.high_keywords,
            &tables.medium_keywords,
        ] {
            banned.extend(list.iter().map(|t| regex::escape(t)));
        }
        let sanitize_re = if banned.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)\b(?:{})\b", banned.join("|")))?)
        };

        Ok(Self {
            vouch_re,
            sanitize_re,
        })
    }

    /// Whether the text reads as a reputation statement about a named user.
    pub fn is_vouch(&self, text: &str) -> bool {
        text.contains('@') && self.vouch_re.is_match(text)
    }

    /// Mask every banned term with `[removed]`.
    pub fn sanitize(&self, text: &str) -> String {
        match &self.sanitize_re {
            Some(re) => re.replace_all(text, MASK).into_owned(),
            None => text.to_string(),
        }
    }
}
