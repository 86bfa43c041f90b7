//! Configuration loading from environment.
//!
//! Sensitive values (classifier API key) come from environment variables;
//! policy tables can be overridden from a JSON file. Everything is validated
//! up front: a malformed table or out-of-range threshold refuses to start
//! rather than run with undefined policy.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModSentryError, Result};

/// Default hard timeout for one classifier call, in seconds.
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 3;

/// Default spam score (0-10) at which a message is flagged.
pub const DEFAULT_SPAM_THRESHOLD: u8 = 7;

/// Main configuration for the moderation engine.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub ai: AiConfig,
    pub gates: ConfidenceGates,
    pub rate: RateLimitConfig,
    pub strikes: StrikePolicy,
    /// Spam score at or above which a medium-severity signal is produced.
    pub spam_threshold: u8,
    pub tables: PolicyTables,
}

/// Semantic classifier settings.
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// Whether the AI layer runs at all. When false the pipeline simply
    /// receives no AI signal.
    pub enabled: bool,
    pub api_key: String,
    pub model: String,
    /// Hard per-call timeout. The pipeline never waits longer than this.
    pub timeout_secs: u64,
    /// Outbound request pacing toward the classifier API.
    pub requests_per_minute: u32,
}

/// Confidence required before an AI signal of a given severity confirms a
/// violation. Critical severity always confirms; deterministic detectors
/// report confidence 1.0 and clear every gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceGates {
    pub high: f32,
    pub medium: f32,
    pub low: f32,
}

impl Default for ConfidenceGates {
    fn default() -> Self {
        // Defaults inherited from the deployed policy; tune per community.
        Self {
            high: 0.70,
            medium: 0.75,
            low: 0.80,
        }
    }
}

/// Sliding-window rate limit caps.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Messages allowed per message window.
    pub message_cap: usize,
    pub message_window_secs: i64,
    /// Links allowed per link window.
    pub link_cap: usize,
    pub link_window_secs: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            message_cap: 5,
            message_window_secs: 10,
            link_cap: 3,
            link_window_secs: 30,
        }
    }
}

/// Strike escalation policy.
#[derive(Debug, Clone, Copy)]
pub struct StrikePolicy {
    /// Strikes at which the user is muted and the count resets.
    pub max_strikes: u8,
    /// Hours without a violation after which strikes reset to zero.
    pub reset_hours: i64,
    /// Mute duration applied on strike-out.
    pub mute_minutes: i64,
    /// Critical violations mute immediately, bypassing the ladder.
    pub critical_immediate_mute: bool,
}

impl Default for StrikePolicy {
    fn default() -> Self {
        Self {
            max_strikes: 3,
            reset_hours: 24,
            mute_minutes: 60,
            critical_immediate_mute: true,
        }
    }
}

/// Static policy tables: banned terms, structural patterns, domain lists,
/// whitelist and spam phrase lists. Loaded once, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTables {
    /// Zero-tolerance terms. Any hit is a critical violation.
    #[serde(default)]
    pub critical_keywords: Vec<String>,
    /// Illegal goods, extreme harassment.
    #[serde(default)]
    pub high_keywords: Vec<String>,
    /// Transaction phrases, spam and scam vocabulary.
    #[serde(default)]
    pub medium_keywords: Vec<String>,
    /// Structural regexes, grouped by the severity they carry.
    #[serde(default)]
    pub critical_patterns: Vec<String>,
    #[serde(default)]
    pub high_patterns: Vec<String>,
    #[serde(default)]
    pub medium_patterns: Vec<String>,
    /// Known scam hosts. Matching host yields a high-severity signal.
    #[serde(default)]
    pub scam_domains: Vec<String>,
    /// URL shortener hosts. Elevated risk, not proof: medium severity.
    #[serde(default)]
    pub url_shorteners: Vec<String>,
    /// Phrases that bypass all content checks (educational content etc).
    #[serde(default)]
    pub whitelist_phrases: Vec<String>,
    /// Urgency phrases scored by the spam heuristics.
    #[serde(default)]
    pub urgency_phrases: Vec<String>,
    /// Promotional / financial-promise phrases scored by the spam heuristics.
    #[serde(default)]
    pub promo_phrases: Vec<String>,
}

impl Default for PolicyTables {
    fn default() -> Self {
        default_tables()
    }
}

impl ModerationConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `ENABLE_AI_MODERATION`: "true"/"false" (default: true when key set)
    /// - `GROQ_API_KEY`: classifier API key (required if AI enabled)
    /// - `AI_MODEL`: classifier model name
    /// - `AI_TIMEOUT_SECS`: hard classifier timeout (default: 3)
    /// - `AI_REQUESTS_PER_MINUTE`: outbound pacing (default: 60)
    /// - `CONFIDENCE_GATE_HIGH` / `_MEDIUM` / `_LOW`: AI confidence gates
    /// - `MESSAGE_RATE_LIMIT`, `RATE_LIMIT_WINDOW`: message window cap/size
    /// - `LINK_RATE_LIMIT`, `LINK_RATE_WINDOW`: link window cap/size
    /// - `MAX_STRIKES`, `STRIKE_RESET_HOURS`, `MUTE_DURATION_MINUTES`
    /// - `SPAM_SCORE_THRESHOLD`: spam flag threshold (default: 7)
    /// - `POLICY_TABLES_PATH`: JSON file overriding the built-in tables
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GROQ_API_KEY").unwrap_or_default();
        let enabled = env_parse("ENABLE_AI_MODERATION").unwrap_or(!api_key.is_empty());
        if enabled && api_key.is_empty() {
            return Err(ModSentryError::Config(
                "ENABLE_AI_MODERATION is set but GROQ_API_KEY is not".to_string(),
            ));
        }

        let ai = AiConfig {
            enabled,
            api_key,
            model: env::var("AI_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            timeout_secs: env_parse("AI_TIMEOUT_SECS").unwrap_or(DEFAULT_AI_TIMEOUT_SECS),
            requests_per_minute: env_parse("AI_REQUESTS_PER_MINUTE").unwrap_or(60),
        };

        let defaults = ConfidenceGates::default();
        let gates = ConfidenceGates {
            high: env_parse("CONFIDENCE_GATE_HIGH").unwrap_or(defaults.high),
            medium: env_parse("CONFIDENCE_GATE_MEDIUM").unwrap_or(defaults.medium),
            low: env_parse("CONFIDENCE_GATE_LOW").unwrap_or(defaults.low),
        };

        let rate_defaults = RateLimitConfig::default();
        let rate = RateLimitConfig {
            message_cap: env_parse("MESSAGE_RATE_LIMIT").unwrap_or(rate_defaults.message_cap),
            message_window_secs: env_parse("RATE_LIMIT_WINDOW")
                .unwrap_or(rate_defaults.message_window_secs),
            link_cap: env_parse("LINK_RATE_LIMIT").unwrap_or(rate_defaults.link_cap),
            link_window_secs: env_parse("LINK_RATE_WINDOW")
                .unwrap_or(rate_defaults.link_window_secs),
        };

        let strike_defaults = StrikePolicy::default();
        let strikes = StrikePolicy {
            max_strikes: env_parse("MAX_STRIKES").unwrap_or(strike_defaults.max_strikes),
            reset_hours: env_parse("STRIKE_RESET_HOURS").unwrap_or(strike_defaults.reset_hours),
            mute_minutes: env_parse("MUTE_DURATION_MINUTES")
                .unwrap_or(strike_defaults.mute_minutes),
            critical_immediate_mute: env_parse("CRITICAL_IMMEDIATE_MUTE")
                .unwrap_or(strike_defaults.critical_immediate_mute),
        };

        let tables = match env::var("POLICY_TABLES_PATH") {
            Ok(path) => load_tables_from_file(&path)?,
            Err(_) => default_tables(),
        };

        let config = Self {
            ai,
            gates,
            rate,
            strikes,
            spam_threshold: env_parse("SPAM_SCORE_THRESHOLD").unwrap_or(DEFAULT_SPAM_THRESHOLD),
            tables,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every threshold and table for sanity. Called by `from_env`;
    /// hand-built configs (tests, embedding) should call it too.
    pub fn validate(&self) -> Result<()> {
        for (name, gate) in [
            ("high", self.gates.high),
            ("medium", self.gates.medium),
            ("low", self.gates.low),
        ] {
            if !(0.0..=1.0).contains(&gate) {
                return Err(ModSentryError::Config(format!(
                    "confidence gate '{}' must be in [0,1], got {}",
                    name, gate
                )));
            }
        }

        if self.rate.message_cap == 0 || self.rate.link_cap == 0 {
            return Err(ModSentryError::Config(
                "rate limit caps must be positive".to_string(),
            ));
        }
        if self.rate.message_window_secs <= 0 || self.rate.link_window_secs <= 0 {
            return Err(ModSentryError::Config(
                "rate limit windows must be positive".to_string(),
            ));
        }

        if self.strikes.max_strikes == 0 {
            return Err(ModSentryError::Config(
                "max_strikes must be at least 1".to_string(),
            ));
        }
        if self.strikes.mute_minutes <= 0 || self.strikes.reset_hours <= 0 {
            return Err(ModSentryError::Config(
                "mute duration and strike reset window must be positive".to_string(),
            ));
        }

        if self.spam_threshold > 10 {
            return Err(ModSentryError::Config(format!(
                "spam threshold must be 0-10, got {}",
                self.spam_threshold
            )));
        }

        // Compile every structural pattern now so a typo fails startup, not
        // the first message.
        for pattern in self
            .tables
            .critical_patterns
            .iter()
            .chain(&self.tables.high_patterns)
            .chain(&self.tables.medium_patterns)
        {
            regex::Regex::new(pattern).map_err(|e| {
                ModSentryError::Config(format!("invalid structural pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            ai: AiConfig {
                enabled: false,
                api_key: String::new(),
                model: "llama-3.1-8b-instant".to_string(),
                timeout_secs: DEFAULT_AI_TIMEOUT_SECS,
                requests_per_minute: 60,
            },
            gates: ConfidenceGates::default(),
            rate: RateLimitConfig::default(),
            strikes: StrikePolicy::default(),
            spam_threshold: DEFAULT_SPAM_THRESHOLD,
            tables: default_tables(),
        }
    }
}

/// Load policy tables from a JSON file.
fn load_tables_from_file(path: &str) -> Result<PolicyTables> {
    let path = Path::new(path);
    let content = fs::read_to_string(path)
        .map_err(|e| ModSentryError::Config(format!("failed to read policy tables: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| ModSentryError::Config(format!("failed to parse policy tables: {}", e)))
}

/// Parse an environment variable into any FromStr type.
fn env_parse<T: FromStr>(var_name: &str) -> Option<T> {
    env::var(var_name).ok().and_then(|s| s.parse().ok())
}

/// Built-in policy tables. Treated as configuration data, not code: server
/// operators replace them via `POLICY_TABLES_PATH`.
fn default_tables() -> PolicyTables {
    let vecs = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    PolicyTables {
        critical_keywords: vecs(&[
            "cp link",
            "child porn",
            "underage nudes",
            "preteen",
            "kiddie porn",
        ]),
        high_keywords: vecs(&[
            // Illegal substances and trade
            "cocaine",
            "heroin",
            "fentanyl",
            "buy weed",
            "weed for sale",
            "sell weed",
            "meth for sale",
            "buy meth",
            "oxy for sale",
            "buy xanax",
            "xanax for sale",
            // Weapons
            "gun for sale",
            "buy a gun",
            "ghost gun",
            "explosives",
            // Documents and fraud
            "fake passport",
            "fake id",
            "forged documents",
            "cloned cards",
            "counterfeit",
            "bank logs",
            // Extreme harassment
            "kys",
            "kill yourself",
            "you should die",
            // Criminal services
            "hitman",
            "ddos",
            "botnet",
            "hacker for hire",
        ]),
        medium_keywords: vecs(&[
            // Transaction intent
            "for sale",
            "price list",
            "wtb",
            "hit me up",
            "dm me",
            "bulk deals",
            "wholesale",
            // Scam vocabulary
            "get rich quick",
            "free money",
            "guaranteed returns",
            "crypto pump",
            "pyramid scheme",
            "ponzi",
            "escort",
            "premium snapchat",
            // Evasion tells
            "stealth shipping",
            "discreet drop",
            "no cops",
            "serious buyers only",
        ]),
        critical_patterns: vecs(&[
            r"(?i)\b(?:young|underage|minor|child)\s+(?:nude|naked|nsfw|porn|xxx)\b",
        ]),
        high_patterns: vecs(&[
            r"(?i)\b(?:selling|buying|offering|supplying)\s+(?:cocaine|heroin|meth|fentanyl|xanax|weed|drugs)\b",
            r"(?i)\b(?:counterfeit|fake|forged)\s+(?:money|bills|passports?|ids?|documents)\b",
            r"(?i)\b(?:hack|crack|phish|clone)\s+(?:accounts?|passwords?|credit\s*cards?|wallets?)\b",
            r"(?i)\b(?:carding|dumps|fullz|cvv)\b",
        ]),
        medium_patterns: vecs(&[
            r"(?i)\b(?:guaranteed|100%|instant)\s+(?:profit|returns?|income)\b",
            r"(?i)\b(?:double|triple|10x|100x)\s+your\s+(?:money|crypto|investment)\b",
            r"(?i)(?:send|invest|deposit)\s+\d+.*(?:receive|get|earn)\s+\d+",
            r"(?i)\b(?:pump|moonshot)\s+(?:incoming|soon|alert|signal)\b",
        ]),
        scam_domains: vecs(&[
            "free-bitcoin.io",
            "btc-giveaway.com",
            "eth-airdrop.net",
            "crypto-moon.io",
            "pump-signal.net",
            "guaranteed-profit.com",
            "get-rich-quick.biz",
            "make-money-fast.net",
            "forex-signals.club",
            "verify-account-now.com",
            "secure-wallet-update.com",
            "claim-reward-here.net",
            "account-suspended-fix.com",
            "airdrop-now.xyz",
            "moonshot-alert.io",
        ]),
        url_shorteners: vecs(&[
            "bit.ly",
            "tinyurl.com",
            "shorturl.at",
            "ow.ly",
            "is.gd",
            "buff.ly",
            "adf.ly",
            "bit.do",
            "cutt.ly",
            "rebrand.ly",
            "clk.im",
            "x.co",
            "goo.gl",
            "su.pr",
            "mcaf.ee",
        ]),
        whitelist_phrases: vecs(&[
            "anti-drug campaign",
            "drug awareness",
            "say no to drugs",
            "drug prevention",
            "drugs are bad",
            "weapon safety",
            "firearm safety course",
            "gun control discussion",
            "child protection",
            "child safety",
            "scam awareness",
            "scam alert",
            "avoid scams",
            "bitcoin education",
            "crypto basics",
            "blockchain technology",
            "fake passport in movie",
            "counterfeit money in movies",
            "kys in game",
            "kill yourself in video games",
            "banned keywords",
        ]),
        urgency_phrases: vecs(&[
            "limited time",
            "act now",
            "click now",
            "claim now",
            "last chance",
            "hurry up",
            "only today",
            "before it's gone",
            "don't miss out",
        ]),
        promo_phrases: vecs(&[
            "easy money",
            "passive income",
            "work from home",
            "financial freedom",
            "double your money",
            "guaranteed profit",
            "join my telegram",
            "dm for details",
        ]),
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_phrase() -> impl Strategy<Value = String> {
        "[a-z]{3,12}( [a-z]{3,12})?"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Policy tables survive the JSON round trip used for file-based
        /// overrides.
        #[test]
        fn prop_tables_json_roundtrip(
            high in prop::collection::vec(arb_phrase(), 0..8),
            shorteners in prop::collection::vec("[a-z]{2,8}\\.[a-z]{2,3}", 0..8),
        ) {
            let tables = PolicyTables {
                high_keywords: high.clone(),
                url_shorteners: shorteners.clone(),
                ..PolicyTables::default()
            };

            let json = serde_json::to_string(&tables).expect("serialize");
            let parsed: PolicyTables = serde_json::from_str(&json).expect("deserialize");

            prop_assert_eq!(parsed.high_keywords, high);
            prop_assert_eq!(parsed.url_shorteners, shorteners);
        }

        /// Gates anywhere in [0,1] validate; anything outside does not.
        #[test]
        fn prop_gate_validation(high in -0.5f32..1.5f32) {
            let mut config = ModerationConfig::default();
            config.gates.high = high;

            let valid = (0.0..=1.0).contains(&high);
            prop_assert_eq!(config.validate().is_ok(), valid);
        }
    }
}
