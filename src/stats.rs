//! Aggregated moderation statistics.
//!
//! Cheap atomic counters fed by the pipeline on every evaluation; a
//! `snapshot()` produces a serializable view for whatever renders it
//! (status command, dashboard, log line). Counters are monotonic for the
//! process lifetime.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::models::{Severity, Verdict};

#[derive(Default)]
pub struct StatsCollector {
    total_evaluated: AtomicU64,
    total_removed: AtomicU64,
    severity_low: AtomicU64,
    severity_medium: AtomicU64,
    severity_high: AtomicU64,
    severity_critical: AtomicU64,
    users_muted: AtomicU64,
    vouches_sanitized: AtomicU64,
    ai_failures: AtomicU64,
    reasons: DashMap<String, u64>,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_evaluated: u64,
    pub total_removed: u64,
    pub severity_counts: BTreeMap<String, u64>,
    /// Most frequent violation reasons, descending, capped at five.
    pub top_reasons: Vec<(String, u64)>,
    pub users_muted: u64,
    pub vouches_sanitized: u64,
    pub ai_failures: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one evaluated message and, if it confirmed a violation, its
    /// severity and reason.
    pub fn record_verdict(&self, verdict: &Verdict) {
        self.total_evaluated.fetch_add(1, Ordering::Relaxed);
        if !verdict.is_violation() {
            return;
        }

        self.total_removed.fetch_add(1, Ordering::Relaxed);
        let counter = match verdict.severity {
            Severity::Low => &self.severity_low,
            Severity::Medium => &self.severity_medium,
            Severity::High => &self.severity_high,
            Severity::Critical => &self.severity_critical,
            Severity::None => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if !verdict.reason.is_empty() {
            *self.reasons.entry(verdict.reason.clone()).or_insert(0) += 1;
        }
    }

    pub fn record_mute(&self) {
        self.users_muted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_vouch_sanitized(&self) {
        self.vouches_sanitized.fetch_add(1, Ordering::Relaxed);
    }

    /// A classifier call failed or timed out and the pipeline degraded.
    pub fn record_ai_failure(&self) {
        self.ai_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut severity_counts = BTreeMap::new();
        for (severity, counter) in [
            (Severity::Low, &self.severity_low),
            (Severity::Medium, &self.severity_medium),
            (Severity::High, &self.severity_high),
            (Severity::Critical, &self.severity_critical),
        ] {
            severity_counts.insert(severity.as_str().to_string(), counter.load(Ordering::Relaxed));
        }

        let mut top_reasons: Vec<(String, u64)> = self
            .reasons
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        top_reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_reasons.truncate(5);

        StatsSnapshot {
            total_evaluated: self.total_evaluated.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
            severity_counts,
            top_reasons,
            users_muted: self.users_muted.load(Ordering::Relaxed),
            vouches_sanitized: self.vouches_sanitized.load(Ordering::Relaxed),
            ai_failures: self.ai_failures.load(Ordering::Relaxed),
        }
    }
}
