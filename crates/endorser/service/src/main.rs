//! Endorser CLI
//!
//! Offline entry points to the claim core:
//! - `chain`: digest a list of claims with the rolling hash chain
//! - `scrub`: redact a JSON document for a viewer
//! - `ingest`: replay pre-verified envelopes through the resolver

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use endorser_chain::{chain, ChainEntry};
use endorser_redaction::scrub;
use endorser_service::{telemetry, ClaimService, ServiceConfig, SignedEnvelope};
use endorser_types::SequenceId;
use endorser_visibility::VisibleSet;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Endorser CLI
#[derive(Parser)]
#[command(name = "endorser")]
#[command(about = "Endorser - versioned claims, fulfillment links and identity redaction", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ENDORSER_CONFIG")]
    config: Option<String>,

    /// Log level (overrides the configuration)
    #[arg(long, env = "ENDORSER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ENDORSER_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Digest a JSON array of `{sequenceId, payload}` entries
    Chain {
        file: PathBuf,

        /// Digest to continue from
        #[arg(long, default_value = "")]
        seed: String,
    },

    /// Redact every identifier the viewer may not see
    Scrub {
        file: PathBuf,

        /// Viewer identifier; omit for an anonymous viewer
        #[arg(long)]
        viewer: Option<String>,

        /// Identifiers that granted the viewer visibility (repeatable)
        #[arg(long = "sees")]
        sees: Vec<String>,
    },

    /// Submit pre-verified envelopes, one JSON object per line
    Ingest { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    telemetry::init(&config.logging)?;

    match cli.command {
        Commands::Chain { file, seed } => {
            let entries: Vec<ChainEntry> = serde_json::from_str(&read(&file)?)
                .with_context(|| format!("{} is not a list of chain entries", file.display()))?;
            println!("{}", chain(&seed, &entries));
        }
        Commands::Scrub { file, viewer, sees } => {
            let value: Value = serde_json::from_str(&read(&file)?)
                .with_context(|| format!("{} is not JSON", file.display()))?;
            let visible = match viewer {
                Some(viewer) => VisibleSet::new(viewer, sees),
                None => VisibleSet::anonymous(),
            };
            println!("{}", serde_json::to_string_pretty(&scrub(&visible, &value))?);
        }
        Commands::Ingest { file } => ingest(&config, &file).await?,
    }
    Ok(())
}

async fn ingest(config: &ServiceConfig, file: &Path) -> Result<()> {
    let service = ClaimService::from_config(config).await?;
    let text = read(file)?;

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match service.submit(&SignedEnvelope::new(line)).await {
            Ok(receipt) => println!("{}", serde_json::to_string(&receipt)?),
            Err(err) => {
                warn!(line = number + 1, code = err.code(), "envelope not accepted");
                println!("{}", serde_json::to_string(&err.body())?);
            }
        }
    }

    let digest = service.hash_chain("", SequenceId::FIRST, None).await?;
    println!("{}", serde_json::json!({ "chainDigest": digest }));
    Ok(())
}

fn read(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
}
