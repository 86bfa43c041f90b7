//! URL reputation checking.
//!
//! Extracts URLs from message text, resolves each to a host, and checks the
//! host against the static scam-domain and shortener tables. Purely local:
//! no DNS, no network lookups.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::config::PolicyTables;
use crate::models::{DetectionSignal, Severity, SignalKind};

/// Full links only: used for the link rate-limit count.
fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r#"(?i)(?:https?://|www\.)[^\s<>"]+"#).unwrap())
}

/// Anything shaped like a host, scheme or not: "bit.ly/abc" must still be
/// checked against the shortener table.
fn host_candidate_regex() -> &'static Regex {
    static HOST: OnceLock<Regex> = OnceLock::new();
    HOST.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:https?://)?(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}(?:/[^\s<>"]*)?"#)
            .unwrap()
    })
}

/// Number of links in the text, for the link sliding window.
pub fn count_links(text: &str) -> usize {
    link_regex().find_iter(text).count()
}

/// Checks extracted hosts against the scam-domain and shortener tables.
pub struct UrlReputationChecker {
    scam_domains: HashSet<String>,
    shorteners: HashSet<String>,
}

impl UrlReputationChecker {
    pub fn new(tables: &PolicyTables) -> Self {
        Self {
            scam_domains: tables
                .scam_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            shorteners: tables
                .url_shorteners
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Scan the text for URLs and return a signal per flagged host.
    pub fn check(&self, text: &str) -> Vec<DetectionSignal> {
        let mut signals = Vec::new();
        let mut seen = HashSet::new();

        for candidate in host_candidate_regex().find_iter(text) {
            let Some(host) = extract_host(candidate.as_str()) else {
                continue;
            };
            if !seen.insert(host.clone()) {
                continue;
            }

            if self.matches_table(&host, &self.scam_domains) {
                signals.push(DetectionSignal::certain(
                    SignalKind::Url,
                    host.clone(),
                    Severity::High,
                    format!("known scam domain: {}", host),
                ));
            } else if self.matches_table(&host, &self.shorteners) {
                signals.push(DetectionSignal::certain(
                    SignalKind::Url,
                    host.clone(),
                    Severity::Medium,
                    format!("url shortener: {}", host),
                ));
            }
        }

        signals
    }

    /// Exact host match, or a subdomain of a listed domain.
    fn matches_table(&self, host: &str, table: &HashSet<String>) -> bool {
        if table.contains(host) {
            return true;
        }
        table
            .iter()
            .any(|domain| host.ends_with(&format!(".{}", domain)))
    }
}

/// Resolve a URL-shaped candidate to its lowercase host.
fn extract_host(candidate: &str) -> Option<String> {
    let with_scheme = if candidate.starts_with("http://") || candidate.starts_with("https://") {
        candidate.to_string()
    } else {
        format!("http://{}", candidate)
    };

    let parsed = Url::parse(&with_scheme).ok()?;
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}
