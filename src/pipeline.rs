//! The moderation pipeline.
//!
//! One entry point, `evaluate`, runs the full decision sequence for a
//! message: per-user serialization guard, rate check, whitelist
//! short-circuit, cheap detectors, conditional AI call, fusion, strike
//! update. Exactly one verdict and at most one strike mutation per message.
//! The AI call is the only suspension point and fails open: on timeout or
//! error the pipeline proceeds with the deterministic signals.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{DisabledClassifier, GroqClassifier, SemanticClassifier};
use crate::config::ModerationConfig;
use crate::error::Result;
use crate::fusion::DecisionFusion;
use crate::models::{ActionDirective, DetectionSignal, Message, Severity, Verdict};
use crate::patterns::{strip_mentions, PatternMatcher};
use crate::rate_limit::RateLimiter;
use crate::spam::SpamScorer;
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::strikes::StrikeTracker;
use crate::urls::{count_links, UrlReputationChecker};
use crate::vouch::VouchFilter;

/// Structured record of one moderation decision, emitted per message.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationRecord {
    pub event_id: Uuid,
    pub user_id: u64,
    pub chat_id: u64,
    /// sha256 of the raw text; the text itself is never logged.
    pub content_hash: String,
    pub severity: Severity,
    pub action: ActionDirective,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub signals: Vec<DetectionSignal>,
}

/// Everything the transport needs to act on one message.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub directive: ActionDirective,
    pub verdict: Verdict,
    pub record: ModerationRecord,
    /// The message reads as a reputation statement about a named user.
    pub is_vouch: bool,
    /// Sanitized copy to repost, set when a vouch was removed for content.
    pub sanitized_text: Option<String>,
}

pub struct ModerationPipeline {
    config: ModerationConfig,
    patterns: PatternMatcher,
    urls: UrlReputationChecker,
    spam: SpamScorer,
    vouch: VouchFilter,
    fusion: DecisionFusion,
    rate_limiter: RateLimiter,
    strikes: StrikeTracker,
    classifier: Arc<dyn SemanticClassifier>,
    stats: Arc<StatsCollector>,
    /// Per-user guards so two messages from the same user never interleave
    /// their evaluations. Distinct users proceed in parallel.
    user_guards: DashMap<u64, Arc<Mutex<()>>>,
}

impl ModerationPipeline {
    /// Build the pipeline with an explicit classifier.
    pub fn new(config: ModerationConfig, classifier: Arc<dyn SemanticClassifier>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            patterns: PatternMatcher::new(&config.tables)?,
            urls: UrlReputationChecker::new(&config.tables),
            spam: SpamScorer::new(&config.tables, config.spam_threshold),
            vouch: VouchFilter::new(&config.tables)?,
            fusion: DecisionFusion::new(config.gates),
            rate_limiter: RateLimiter::new(config.rate),
            strikes: StrikeTracker::new(config.strikes),
            classifier,
            stats: Arc::new(StatsCollector::new()),
            user_guards: DashMap::new(),
            config,
        })
    }

    /// Build the pipeline with the classifier the configuration implies:
    /// Groq when AI moderation is enabled, the disabled stub otherwise.
    pub fn from_config(config: ModerationConfig) -> Result<Self> {
        let classifier: Arc<dyn SemanticClassifier> = if config.ai.enabled {
            Arc::new(GroqClassifier::new(&config.ai))
        } else {
            Arc::new(DisabledClassifier)
        };
        Self::new(config, classifier)
    }

    /// Evaluate one message and decide what to do with it.
    pub async fn evaluate(&self, message: &Message) -> Result<Evaluation> {
        let guard = self
            .user_guards
            .entry(message.user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _serialized = guard.lock().await;

        let now = message.timestamp;

        // Flooding is a behavioral violation: content checks (and the
        // whitelist) do not apply, and even blank messages count against
        // the window.
        let rate_check = self
            .rate_limiter
            .check_and_record(message.user_id, count_links(&message.text), now);
        if let Some(rate_signal) = rate_check.into_signal() {
            let verdict = self.fusion.fuse(vec![rate_signal]);
            return Ok(self.finish(message, verdict));
        }

        // Empty or whitespace-only text carries nothing to moderate.
        if message.text.trim().is_empty() {
            return Ok(self.finish(message, Verdict::none(vec![])));
        }

        if let Some(phrase) = self.patterns.whitelist_hit(&message.text) {
            debug!(user_id = message.user_id, phrase, "whitelist short-circuit");
            return Ok(self.finish(message, Verdict::none(vec![])));
        }

        let mut signals = self.detect(&message.text);

        // The AI layer only runs when the cheap detectors left room for
        // doubt: a critical hit already decides the message.
        let have_critical = signals.iter().any(|s| s.severity == Severity::Critical);
        if self.classifier.is_enabled() && !have_critical {
            match tokio::time::timeout(
                Duration::from_secs(self.config.ai.timeout_secs),
                self.classifier.classify(&message.text),
            )
            .await
            {
                Ok(Ok(classification)) => {
                    signals.extend(classification.into_signal());
                }
                Ok(Err(e)) => {
                    self.stats.record_ai_failure();
                    warn!(error = %e, "classifier failed, continuing without AI signal");
                }
                Err(_) => {
                    self.stats.record_ai_failure();
                    warn!(
                        timeout_secs = self.config.ai.timeout_secs,
                        "classifier timed out, continuing without AI signal"
                    );
                }
            }
        }

        let verdict = self.fusion.fuse(signals);
        Ok(self.finish(message, verdict))
    }

    /// Run the pure detectors (patterns, URLs, spam) over the text.
    /// Mentions are stripped for keyword scanning only; URL and spam
    /// heuristics see the original text.
    pub fn detect(&self, text: &str) -> Vec<DetectionSignal> {
        let mut signals = self.patterns.scan(&strip_mentions(text));
        signals.extend(self.urls.check(text));
        signals.extend(self.spam.check(text));
        signals
    }

    /// Apply the strike machine, build the record, count stats, log.
    fn finish(&self, message: &Message, verdict: Verdict) -> Evaluation {
        let now = message.timestamp;

        let directive = if verdict.is_violation() {
            let transition = self
                .strikes
                .record_violation(message.user_id, verdict.severity, now);
            match transition.mute_until {
                Some(until) => {
                    self.stats.record_mute();
                    ActionDirective::DeleteAndMute { until }
                }
                None => ActionDirective::Delete,
            }
        } else {
            ActionDirective::None
        };

        let is_vouch = verdict.is_violation() && self.vouch.is_vouch(&message.text);
        let sanitized_text = if is_vouch {
            self.stats.record_vouch_sanitized();
            Some(self.vouch.sanitize(&message.text))
        } else {
            None
        };

        let record = ModerationRecord {
            event_id: Uuid::new_v4(),
            user_id: message.user_id,
            chat_id: message.chat_id,
            content_hash: content_hash(&message.text),
            severity: verdict.severity,
            action: directive,
            reason: verdict.reason.clone(),
            timestamp: now,
            signals: verdict.signals.clone(),
        };

        self.stats.record_verdict(&verdict);

        if verdict.is_violation() {
            info!(
                event_id = %record.event_id,
                user_id = record.user_id,
                chat_id = record.chat_id,
                severity = verdict.severity.as_str(),
                confidence = verdict.confidence,
                reason = %verdict.reason,
                content_hash = %record.content_hash,
                is_vouch,
                "violation"
            );
        } else {
            debug!(
                event_id = %record.event_id,
                user_id = record.user_id,
                chat_id = record.chat_id,
                "clean"
            );
        }

        Evaluation {
            directive,
            verdict,
            record,
            is_vouch,
            sanitized_text,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Users muted as of `now`, from the strike tracker.
    pub fn active_mutes(&self, now: DateTime<Utc>) -> usize {
        self.strikes.active_mutes(now)
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, ClassifyError, ClassifyResult};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    struct StubClassifier(Classification);

    #[async_trait]
    impl SemanticClassifier for StubClassifier {
        async fn classify(&self, _text: &str) -> ClassifyResult<Classification> {
            Ok(self.0.clone())
        }
    }

    struct HangingClassifier;

    #[async_trait]
    impl SemanticClassifier for HangingClassifier {
        async fn classify(&self, _text: &str) -> ClassifyResult<Classification> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ClassifyError::Timeout)
        }
    }

    fn pipeline() -> ModerationPipeline {
        ModerationPipeline::new(ModerationConfig::default(), Arc::new(DisabledClassifier))
            .expect("pipeline builds")
    }

    fn msg(user_id: u64, text: &str) -> Message {
        Message::new(user_id, 42, text, Utc::now())
    }

    #[tokio::test]
    async fn clean_message_passes() {
        let p = pipeline();
        let eval = p.evaluate(&msg(1, "good morning everyone")).await.unwrap();
        assert_eq!(eval.directive, ActionDirective::None);
        assert!(!eval.verdict.is_violation());
    }

    #[tokio::test]
    async fn empty_message_passes() {
        let p = pipeline();
        let eval = p.evaluate(&msg(1, "   ")).await.unwrap();
        assert_eq!(eval.directive, ActionDirective::None);
        assert_eq!(eval.verdict.severity, Severity::None);
    }

    #[tokio::test]
    async fn shortener_link_deleted_at_medium() {
        let p = pipeline();
        let eval = p
            .evaluate(&msg(1, "free crypto here bit.ly/freemoney123"))
            .await
            .unwrap();
        assert_eq!(eval.verdict.severity, Severity::Medium);
        assert_eq!(eval.directive, ActionDirective::Delete);
    }

    #[tokio::test]
    async fn fake_passports_high_delete_and_strike() {
        let p = pipeline();
        let eval = p
            .evaluate(&msg(1, "selling fake passports, dm me"))
            .await
            .unwrap();
        assert_eq!(eval.verdict.severity, Severity::High);
        assert_eq!(eval.directive, ActionDirective::Delete);

        let stats = p.stats();
        assert_eq!(stats.total_removed, 1);
        assert_eq!(stats.severity_counts["high"], 1);
    }

    #[tokio::test]
    async fn whitelist_phrase_bypasses_detectors() {
        let p = pipeline();
        let eval = p
            .evaluate(&msg(1, "join our drug awareness seminar about cocaine"))
            .await
            .unwrap();
        assert_eq!(eval.directive, ActionDirective::None);
        assert!(!eval.verdict.is_violation());
    }

    #[tokio::test]
    async fn critical_keyword_mutes_immediately() {
        let p = pipeline();
        let eval = p.evaluate(&msg(1, "selling cp link in dm")).await.unwrap();
        assert_eq!(eval.verdict.severity, Severity::Critical);
        assert!(matches!(
            eval.directive,
            ActionDirective::DeleteAndMute { .. }
        ));
        assert_eq!(p.stats().users_muted, 1);
    }

    #[tokio::test]
    async fn third_strike_mutes() {
        let p = pipeline();
        let base = Utc::now();
        for i in 0..2 {
            // Space the violations out so the rate limiter stays quiet.
            let m = Message::new(1, 42, "fake passport for sale", base + ChronoDuration::seconds(60 * i));
            let eval = p.evaluate(&m).await.unwrap();
            assert_eq!(eval.directive, ActionDirective::Delete);
        }
        let m = Message::new(1, 42, "fake passport for sale", base + ChronoDuration::seconds(120));
        let eval = p.evaluate(&m).await.unwrap();
        match eval.directive {
            ActionDirective::DeleteAndMute { until } => {
                assert_eq!(until, m.timestamp + ChronoDuration::minutes(60));
            }
            other => panic!("expected mute, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn whitespace_flood_is_rate_limited() {
        let p = pipeline();
        let base = Utc::now();
        for i in 0..5 {
            let m = Message::new(1, 42, "   ", base + ChronoDuration::milliseconds(10 * i));
            let eval = p.evaluate(&m).await.unwrap();
            assert_eq!(eval.directive, ActionDirective::None);
        }
        // Blank messages still fill the window: the sixth is a flood.
        let m = Message::new(1, 42, " \t ", base + ChronoDuration::milliseconds(60));
        let eval = p.evaluate(&m).await.unwrap();
        assert_eq!(eval.verdict.severity, Severity::Medium);
        assert_eq!(eval.directive, ActionDirective::Delete);

        // And a non-empty follow-up inside the window is limited too.
        let m = Message::new(1, 42, "hello", base + ChronoDuration::milliseconds(80));
        let eval = p.evaluate(&m).await.unwrap();
        assert!(eval
            .verdict
            .signals
            .iter()
            .any(|s| s.kind == crate::models::SignalKind::Rate));
    }

    #[tokio::test]
    async fn sixth_message_rate_limited() {
        let p = pipeline();
        let base = Utc::now();
        for i in 0..5 {
            let m = Message::new(1, 42, "hello", base + ChronoDuration::milliseconds(100 * i));
            let eval = p.evaluate(&m).await.unwrap();
            assert_eq!(eval.directive, ActionDirective::None);
        }
        let m = Message::new(1, 42, "hello", base + ChronoDuration::milliseconds(600));
        let eval = p.evaluate(&m).await.unwrap();
        assert_eq!(eval.verdict.severity, Severity::Medium);
        assert_eq!(eval.directive, ActionDirective::Delete);
        assert!(eval
            .verdict
            .signals
            .iter()
            .any(|s| s.kind == crate::models::SignalKind::Rate));
    }

    #[tokio::test]
    async fn ai_critical_confirms_at_any_confidence() {
        let classifier = StubClassifier(Classification {
            violation: true,
            severity: "critical".to_string(),
            confidence: 0.01,
            category: "csam".to_string(),
            reason: "zero tolerance".to_string(),
        });
        let p = ModerationPipeline::new(ModerationConfig::default(), Arc::new(classifier)).unwrap();

        let eval = p.evaluate(&msg(1, "some borderline text")).await.unwrap();
        assert_eq!(eval.verdict.severity, Severity::Critical);
        assert!(matches!(
            eval.directive,
            ActionDirective::DeleteAndMute { .. }
        ));
    }

    #[tokio::test]
    async fn ai_low_below_gate_rejected() {
        let classifier = StubClassifier(Classification {
            violation: true,
            severity: "low".to_string(),
            confidence: 0.79,
            category: "mild".to_string(),
            reason: "borderline".to_string(),
        });
        let p = ModerationPipeline::new(ModerationConfig::default(), Arc::new(classifier)).unwrap();

        let eval = p.evaluate(&msg(1, "some borderline text")).await.unwrap();
        assert_eq!(eval.directive, ActionDirective::None);
        // The rejected signal is still on the verdict for the record.
        assert_eq!(eval.verdict.signals.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ai_timeout_fails_open() {
        let p =
            ModerationPipeline::new(ModerationConfig::default(), Arc::new(HangingClassifier))
                .unwrap();

        let eval = p.evaluate(&msg(1, "perfectly ordinary text")).await.unwrap();
        assert_eq!(eval.directive, ActionDirective::None);
        assert_eq!(eval.verdict.severity, Severity::None);
        assert_eq!(p.stats().ai_failures, 1);
    }

    #[tokio::test]
    async fn vouch_with_banned_word_gets_sanitized_copy() {
        let p = pipeline();
        let eval = p
            .evaluate(&msg(1, "vouch for @alice, great bulk deals every time"))
            .await
            .unwrap();
        assert_eq!(eval.directive, ActionDirective::Delete);
        assert!(eval.is_vouch);
        let sanitized = eval.sanitized_text.expect("sanitized copy");
        assert!(sanitized.contains("[removed]"));
        assert!(sanitized.contains("@alice"));
        assert_eq!(p.stats().vouches_sanitized, 1);
    }

    #[tokio::test]
    async fn clean_vouch_not_flagged() {
        let p = pipeline();
        let eval = p
            .evaluate(&msg(1, "vouch for @alice, smooth experience"))
            .await
            .unwrap();
        assert_eq!(eval.directive, ActionDirective::None);
        assert!(!eval.is_vouch);
        assert!(eval.sanitized_text.is_none());
    }

    #[tokio::test]
    async fn mention_of_banned_word_not_a_violation() {
        let p = pipeline();
        let eval = p.evaluate(&msg(1, "welcome @kys_gamer to the chat")).await.unwrap();
        assert_eq!(eval.directive, ActionDirective::None);
    }

    #[tokio::test]
    async fn record_carries_hash_and_signals() {
        let p = pipeline();
        let eval = p.evaluate(&msg(5, "fake passport here")).await.unwrap();
        assert_eq!(eval.record.user_id, 5);
        assert_eq!(eval.record.chat_id, 42);
        assert_eq!(eval.record.content_hash.len(), 64);
        assert!(!eval.record.signals.is_empty());
        assert_eq!(eval.record.action, eval.directive);
    }

    #[test]
    fn detection_is_pure_and_idempotent() {
        let p = pipeline();
        let text = "selling fake passports at bit.ly/xyz ACT NOW!!!";
        let first = p.detect(text);
        let second = p.detect(text);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn distinct_users_do_not_share_strikes() {
        let p = pipeline();
        let base = Utc::now();
        for i in 0..3u64 {
            let m = Message::new(i + 1, 42, "fake passport for sale", base);
            let eval = p.evaluate(&m).await.unwrap();
            // Each user is on their first strike: delete, no mute.
            assert_eq!(eval.directive, ActionDirective::Delete);
        }
        assert_eq!(p.active_mutes(base), 0);
    }

    #[tokio::test]
    async fn concurrent_evaluations_complete() {
        let p = Arc::new(pipeline());
        let mut handles = Vec::new();
        for user in 0..16u64 {
            let p = Arc::clone(&p);
            handles.push(tokio::spawn(async move {
                let m = Message::new(user, 42, "hello there", Utc::now());
                p.evaluate(&m).await.unwrap()
            }));
        }
        for handle in handles {
            let eval = handle.await.unwrap();
            assert_eq!(eval.directive, ActionDirective::None);
        }
        assert_eq!(p.stats().total_evaluated, 16);
    }
}
