//! Core data models for the moderation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound group-chat message, as handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct Message {
    pub user_id: u64,
    pub chat_id: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(user_id: u64, chat_id: u64, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id,
            chat_id,
            text: text.into(),
            timestamp,
        }
    }
}

/// Violation severity, ordered from harmless to zero-tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// String form used in logs and aggregated stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse from the classifier's string form. Unknown values map to Medium,
    /// the classifier prompt's own fallback.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "none" | "safe" => Self::None,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

/// Which detector produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Pattern,
    Url,
    Spam,
    Rate,
    Ai,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Url => "url",
            Self::Spam => "spam",
            Self::Rate => "rate",
            Self::Ai => "ai",
        }
    }
}

/// One detector's raw output for one message. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSignal {
    pub kind: SignalKind,
    /// Matched term, flagged host, or classifier category.
    pub matched: String,
    pub severity: Severity,
    /// Confidence in [0, 1]. Deterministic detectors report 1.0.
    pub confidence: f32,
    /// Human-readable explanation.
    pub reason: String,
}

impl DetectionSignal {
    /// A signal from a deterministic (non-AI) detector, confirmed by construction.
    pub fn certain(
        kind: SignalKind,
        matched: impl Into<String>,
        severity: Severity,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            matched: matched.into(),
            severity,
            confidence: 1.0,
            reason: reason.into(),
        }
    }
}

/// Final fused result for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub severity: Severity,
    pub confidence: f32,
    pub reason: String,
    /// Every signal that contributed, including ones below their gate.
    pub signals: Vec<DetectionSignal>,
}

impl Verdict {
    /// The clean verdict: nothing cleared its confidence gate.
    pub fn none(signals: Vec<DetectionSignal>) -> Self {
        Self {
            severity: Severity::None,
            confidence: 0.0,
            reason: String::new(),
            signals,
        }
    }

    pub fn is_violation(&self) -> bool {
        self.severity > Severity::None
    }
}

/// What the transport should do with the message and its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ActionDirective {
    /// Leave the message alone.
    None,
    /// Delete the message.
    Delete,
    /// Delete the message and mute the sender until the given instant.
    DeleteAndMute { until: DateTime<Utc> },
}
