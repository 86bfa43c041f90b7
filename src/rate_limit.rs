//! Per-user sliding-window rate limiting.
//!
//! Two windows per user: messages (default 5 per 10s) and links (default 3
//! per 30s). Windows are created lazily on first message and pruned on every
//! access; exceeding either cap is a behavioral violation independent of
//! message content. State lives in a sharded concurrent map keyed by user id.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::models::{DetectionSignal, Severity, SignalKind};

/// One user's recent activity. Timestamps outside their window are pruned
/// at read time.
#[derive(Debug, Default)]
struct RateWindow {
    message_times: VecDeque<DateTime<Utc>>,
    link_times: VecDeque<DateTime<Utc>>,
}

/// Outcome of recording one message against the windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCheck {
    pub message_exceeded: bool,
    pub link_exceeded: bool,
}

impl RateCheck {
    pub fn exceeded(&self) -> bool {
        self.message_exceeded || self.link_exceeded
    }

    /// Medium-severity behavioral signal, if either cap was exceeded.
    pub fn into_signal(self) -> Option<DetectionSignal> {
        if !self.exceeded() {
            return None;
        }
        let what = if self.message_exceeded && self.link_exceeded {
            "message and link flood"
        } else if self.message_exceeded {
            "message flood"
        } else {
            "link flood"
        };
        Some(DetectionSignal::certain(
            SignalKind::Rate,
            what,
            Severity::Medium,
            format!("rate limit exceeded: {}", what),
        ))
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<u64, RateWindow>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Record one message (with its link count) and report whether either
    /// window is now over its cap. The message is recorded either way, so a
    /// flooding user stays limited until they actually slow down.
    pub fn check_and_record(&self, user_id: u64, link_count: usize, now: DateTime<Utc>) -> RateCheck {
        let mut window = self.windows.entry(user_id).or_default();

        prune(&mut window.message_times, now, self.config.message_window_secs);
        prune(&mut window.link_times, now, self.config.link_window_secs);

        window.message_times.push_back(now);
        for _ in 0..link_count {
            window.link_times.push_back(now);
        }

        RateCheck {
            message_exceeded: window.message_times.len() > self.config.message_cap,
            link_exceeded: window.link_times.len() > self.config.link_cap,
        }
    }

    /// Number of users with a live window. Pruning is lazy, so this is an
    /// upper bound.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}

fn prune(times: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window_secs: i64) {
    let cutoff = now - Duration::seconds(window_secs);
    while times.front().is_some_and(|t| *t <= cutoff) {
        times.pop_front();
    }
}
