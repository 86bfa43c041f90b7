//! Decision fusion.
//!
//! Combines the raw detector signals for one message into a single verdict.
//! A signal "confirms" when its confidence clears the gate for its severity;
//! critical clears unconditionally. Among confirming signals the highest
//! severity wins, confidence breaking ties. Deterministic and pure.

use crate::config::ConfidenceGates;
use crate::models::{DetectionSignal, Severity, Verdict};

pub struct DecisionFusion {
    gates: ConfidenceGates,
}

impl DecisionFusion {
    pub fn new(gates: ConfidenceGates) -> Self {
        Self { gates }
    }

    /// Minimum confidence a signal of this severity needs to confirm.
    fn gate(&self, severity: Severity) -> f32 {
        match severity {
            // Zero tolerance: a critical signal confirms at any confidence.
            Severity::Critical => 0.0,
            Severity::High => self.gates.high,
            Severity::Medium => self.gates.medium,
            Severity::Low => self.gates.low,
            // A none-severity signal can never confirm.
            Severity::None => f32::INFINITY,
        }
    }

    /// Fuse signals into the final verdict. Every signal is kept on the
    /// verdict for the record, including ones below their gate.
    pub fn fuse(&self, signals: Vec<DetectionSignal>) -> Verdict {
        let winner = signals
            .iter()
            .filter(|s| s.confidence >= self.gate(s.severity))
            .max_by(|a, b| {
                a.severity
                    .cmp(&b.severity)
                    .then(a.confidence.total_cmp(&b.confidence))
            })
            .cloned();

        match winner {
            Some(signal) => Verdict {
                severity: signal.severity,
                confidence: signal.confidence,
                reason: signal.reason,
                signals,
            },
            None => Verdict::none(signals),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalKind;

    fn fusion() -> DecisionFusion {
        DecisionFusion::new(ConfidenceGates::default())
    }

    fn ai_signal(severity: Severity, confidence: f32) -> DetectionSignal {
        DetectionSignal {
            kind: SignalKind::Ai,
            matched: "test".to_string(),
            severity,
            confidence,
            reason: "ai verdict".to_string(),
        }
    }

    #[test]
    fn no_signals_yields_none() {
        let verdict = fusion().fuse(vec![]);
        assert_eq!(verdict.severity, Severity::None);
        assert!(!verdict.is_violation());
    }

    #[test]
    fn critical_confirms_at_any_confidence() {
        let verdict = fusion().fuse(vec![ai_signal(Severity::Critical, 0.01)]);
        assert_eq!(verdict.severity, Severity::Critical);
    }

    #[test]
    fn low_below_gate_rejected() {
        let verdict = fusion().fuse(vec![ai_signal(Severity::Low, 0.79)]);
        assert_eq!(verdict.severity, Severity::None);
        // The rejected signal is still recorded.
        assert_eq!(verdict.signals.len(), 1);
    }

    #[test]
    fn low_at_gate_confirms() {
        let verdict = fusion().fuse(vec![ai_signal(Severity::Low, 0.80)]);
        assert_eq!(verdict.severity, Severity::Low);
    }

    #[test]
    fn high_gate_boundary() {
        assert_eq!(
            fusion().fuse(vec![ai_signal(Severity::High, 0.69)]).severity,
            Severity::None
        );
        assert_eq!(
            fusion().fuse(vec![ai_signal(Severity::High, 0.70)]).severity,
            Severity::High
        );
    }

    #[test]
    fn highest_confirming_severity_wins() {
        let verdict = fusion().fuse(vec![
            DetectionSignal::certain(SignalKind::Pattern, "free money", Severity::Medium, "kw"),
            DetectionSignal::certain(SignalKind::Url, "free-bitcoin.io", Severity::High, "scam"),
            ai_signal(Severity::Low, 0.95),
        ]);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.reason, "scam");
        assert_eq!(verdict.signals.len(), 3);
    }

    #[test]
    fn unconfirmed_high_loses_to_confirmed_medium() {
        // AI high at 0.5 misses its gate; the deterministic medium wins.
        let verdict = fusion().fuse(vec![
            ai_signal(Severity::High, 0.5),
            DetectionSignal::certain(SignalKind::Spam, "spam score 8", Severity::Medium, "spam"),
        ]);
        assert_eq!(verdict.severity, Severity::Medium);
    }

    #[test]
    fn deterministic_signals_always_confirm() {
        for severity in [Severity::Medium, Severity::High, Severity::Critical] {
            let verdict = fusion().fuse(vec![DetectionSignal::certain(
                SignalKind::Pattern,
                "x",
                severity,
                "kw",
            )]);
            assert_eq!(verdict.severity, severity);
        }
    }
}
