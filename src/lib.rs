//! modsentry: a real-time content-moderation decision engine for group chats.
//!
//! Given a message (text, sender, timestamp, chat), the pipeline decides
//! within tight latency bounds whether it violates policy, how severe the
//! violation is, and what to do with the sender. Detection is multi-signal:
//! lexical pattern matching, URL reputation, spam heuristics, per-user rate
//! limiting, and an optional AI semantic classifier, fused into a single
//! severity + confidence verdict. Discipline escalates through a strike
//! ladder with time-based decay and temporary mutes.
//!
//! The crate is transport-agnostic: wire `ModerationPipeline::evaluate` into
//! whatever delivers messages and act on the returned directive.

pub mod classifier;
pub mod config;
pub mod error;
pub mod fusion;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod rate_limit;
pub mod spam;
pub mod stats;
pub mod strikes;
pub mod urls;
pub mod vouch;

pub use config::ModerationConfig;
pub use error::{ModSentryError, Result};
pub use models::{ActionDirective, Message, Severity, Verdict};
pub use pipeline::{Evaluation, ModerationPipeline};
