//! Harvest command - remember one page

use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use mnemosyne::{compose_semantic_text, HarvestOutcome, Mnemosyne, PagePayload, PageParts};

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Page URL (the record key)
    pub url: String,

    #[arg(long, help = "Page title")]
    pub title: String,

    #[arg(long, help = "Pre-composed semantic text (skips composition)")]
    pub text: Option<String>,

    #[arg(long, help = "Meta description")]
    pub description: Option<String>,

    #[arg(long, help = "First heading on the page")]
    pub heading: Option<String>,

    #[arg(long, help = "Body text (read from stdin when omitted)")]
    pub body: Option<String>,

    #[arg(long, help = "Favicon URL")]
    pub favicon: Option<String>,

    #[arg(long, help = "JSON output")]
    pub json: bool,
}

pub async fn run(app: &Mnemosyne, args: HarvestArgs) -> Result<()> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let body = match args.body {
                Some(body) => body,
                None => {
                    let mut body = String::new();
                    std::io::stdin()
                        .read_to_string(&mut body)
                        .context("Failed to read page body from stdin")?;
                    body
                }
            };
            let parts = PageParts {
                title: args.title.clone(),
                description: args.description.unwrap_or_default(),
                heading: args.heading.unwrap_or_default(),
                body,
            };
            compose_semantic_text(&parts, app.config().body_chars)
        }
    };

    let payload = PagePayload {
        url: args.url,
        title: args.title,
        text,
        favicon: args.favicon,
    };

    report(app.handle_harvest(payload).await, args.json)
}

/// Print a harvest outcome; abandoned harvests fail the command.
pub fn report(outcome: HarvestOutcome, json: bool) -> Result<()> {
    if json {
        let value = match &outcome {
            HarvestOutcome::Saved { url } => serde_json::json!({ "status": "saved", "url": url }),
            HarvestOutcome::Abandoned { url, reason } => {
                serde_json::json!({ "status": "abandoned", "url": url, "error": reason })
            }
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    match outcome {
        HarvestOutcome::Saved { url } => {
            if !json {
                println!("{} Memory saved: {}", "✓".green(), url.cyan());
            }
            Ok(())
        }
        HarvestOutcome::Abandoned { url, reason } => {
            bail!("Harvest of {} abandoned: {}", url, reason)
        }
    }
}
