//! modsentry entry point.
//!
//! Runs the moderation pipeline against lines read from stdin, one message
//! per line, and prints the decision for each. Lines may be prefixed with
//! `<user_id>:` to simulate different senders; unprefixed lines come from
//! user 1. On EOF the aggregated stats are printed.

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modsentry::models::Message;
use modsentry::pipeline::ModerationPipeline;
use modsentry::{ModerationConfig, Result};

const DEMO_CHAT_ID: u64 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // RUST_LOG controls verbosity: e.g. RUST_LOG=modsentry=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        built_at = env!("BUILD_TIMESTAMP"),
        commit = option_env!("GIT_COMMIT").unwrap_or("unknown"),
        "modsentry starting"
    );

    let config = ModerationConfig::from_env()?;
    tracing::info!(
        ai_enabled = config.ai.enabled,
        spam_threshold = config.spam_threshold,
        "configuration loaded"
    );

    let pipeline = ModerationPipeline::from_config(config)?;
    tracing::info!("pipeline ready, reading messages from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let (user_id, text) = parse_line(&line);
        let message = Message::new(user_id, DEMO_CHAT_ID, text, Utc::now());

        match pipeline.evaluate(&message).await {
            Ok(evaluation) => {
                println!(
                    "user {} -> {} ({}), action: {}",
                    user_id,
                    evaluation.verdict.severity.as_str(),
                    if evaluation.verdict.reason.is_empty() {
                        "ok"
                    } else {
                        evaluation.verdict.reason.as_str()
                    },
                    serde_json::to_string(&evaluation.directive)?
                );
                if let Some(sanitized) = evaluation.sanitized_text {
                    println!("  repost sanitized vouch: {}", sanitized);
                }
            }
            Err(e) => tracing::error!(error = %e, "evaluation failed"),
        }
    }

    let stats = pipeline.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Split an optional `<user_id>:` prefix off a demo input line.
fn parse_line(line: &str) -> (u64, &str) {
    if let Some((prefix, rest)) = line.split_once(':') {
        if let Ok(user_id) = prefix.trim().parse::<u64>() {
            return (user_id, rest.trim_start());
        }
    }
    (1, line)
}
