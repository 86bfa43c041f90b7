//! Strike tracking and mute escalation.
//!
//! Per-user ladder: clean → warned(1) → warned(2) → muted, with strikes
//! resetting after 24h of good behavior and mutes expiring on their own.
//! There are no background timers; decay and expiry are observed lazily when
//! the user's state is next touched. In-memory only: a restart is an
//! amnesty by design.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::StrikePolicy;
use crate::models::Severity;

/// A user's disciplinary state as observed at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Clean,
    Warned(u8),
    Muted { until: DateTime<Utc> },
}

/// Result of recording one violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeTransition {
    pub state: UserState,
    /// Set when this violation caused a mute.
    pub mute_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct StrikeState {
    strikes: u8,
    last_strike: Option<DateTime<Utc>>,
    mute_until: Option<DateTime<Utc>>,
}

pub struct StrikeTracker {
    policy: StrikePolicy,
    states: DashMap<u64, StrikeState>,
}

impl StrikeTracker {
    pub fn new(policy: StrikePolicy) -> Self {
        Self {
            policy,
            states: DashMap::new(),
        }
    }

    /// Record a confirmed violation and return the resulting state.
    ///
    /// Critical violations mute immediately when the policy says so. A
    /// violation while already muted does not stack another mute.
    pub fn record_violation(
        &self,
        user_id: u64,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> StrikeTransition {
        let mut entry = self.states.entry(user_id).or_default();
        self.normalize(&mut entry, now);

        if let Some(until) = entry.mute_until {
            return StrikeTransition {
                state: UserState::Muted { until },
                mute_until: None,
            };
        }

        if severity == Severity::Critical && self.policy.critical_immediate_mute {
            let until = now + Duration::minutes(self.policy.mute_minutes);
            entry.strikes = 0;
            entry.last_strike = Some(now);
            entry.mute_until = Some(until);
            return StrikeTransition {
                state: UserState::Muted { until },
                mute_until: Some(until),
            };
        }

        entry.strikes = entry.strikes.saturating_add(1);
        entry.last_strike = Some(now);

        if entry.strikes >= self.policy.max_strikes {
            let until = now + Duration::minutes(self.policy.mute_minutes);
            entry.strikes = 0;
            entry.mute_until = Some(until);
            return StrikeTransition {
                state: UserState::Muted { until },
                mute_until: Some(until),
            };
        }

        StrikeTransition {
            state: UserState::Warned(entry.strikes),
            mute_until: None,
        }
    }

    /// The user's state as of `now`, applying lazy decay and mute expiry.
    pub fn state_of(&self, user_id: u64, now: DateTime<Utc>) -> UserState {
        let Some(mut entry) = self.states.get_mut(&user_id) else {
            return UserState::Clean;
        };
        self.normalize(&mut entry, now);

        if let Some(until) = entry.mute_until {
            return UserState::Muted { until };
        }
        match entry.strikes {
            0 => UserState::Clean,
            n => UserState::Warned(n),
        }
    }

    /// Users currently muted as of `now`.
    pub fn active_mutes(&self, now: DateTime<Utc>) -> usize {
        self.states
            .iter()
            .filter(|e| e.mute_until.is_some_and(|until| until > now))
            .count()
    }

    /// Clamp corrupt counts, expire mutes, decay stale strikes. Stored
    /// state is never allowed to escape in a bad shape.
    fn normalize(&self, state: &mut StrikeState, now: DateTime<Utc>) {
        if state.strikes > self.policy.max_strikes {
            state.strikes = 0;
            state.last_strike = None;
        }

        if state.mute_until.is_some_and(|until| until <= now) {
            state.mute_until = None;
        }

        let reset_cutoff = now - Duration::hours(self.policy.reset_hours);
        if state.last_strike.is_some_and(|t| t <= reset_cutoff) {
            state.strikes = 0;
            state.last_strike = None;
        }
    }
}
