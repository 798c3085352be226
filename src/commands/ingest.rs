//! Ingest command - read runtime messages from stdin
//!
//! One JSON message per line, as a content script would post them:
//! `{"type":"PAGE_HARVESTED","payload":{"url":...,"title":...,"text":...}}`

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::warn;

use mnemosyne::offload::RuntimeMessage;
use mnemosyne::{HarvestOutcome, Mnemosyne};

pub async fn run(app: &Mnemosyne, json: bool) -> Result<()> {
    let mut saved = 0usize;
    let mut failed = 0usize;

    for (index, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let message: RuntimeMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping malformed message");
                failed += 1;
                continue;
            }
        };

        match app.handle_message(message).await {
            Some(HarvestOutcome::Saved { url }) => {
                saved += 1;
                if !json {
                    println!("{} {}", "✓".green(), url);
                }
            }
            Some(HarvestOutcome::Abandoned { url, reason }) => {
                failed += 1;
                if !json {
                    println!("{} {} ({})", "✗".red(), url, reason.dimmed());
                }
            }
            None => warn!(line = index + 1, "Skipping message not handled during ingestion"),
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "saved": saved, "failed": failed }))?
        );
    } else {
        println!();
        println!("{} {} saved, {} failed", "→".dimmed(), saved, failed);
    }

    if saved == 0 && failed > 0 {
        bail!("No messages could be ingested");
    }
    Ok(())
}
