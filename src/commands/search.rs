//! Search command - hybrid semantic + keyword search

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tracing::info;

use mnemosyne::{snippet, Mnemosyne, ScoredRecord, TimeFilter};

use super::{colored_score, format_timestamp};

/// Result shape for JSON output
#[derive(Serialize)]
struct SearchResultJson<'a> {
    url: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    favicon: Option<&'a str>,
    snippet: String,
    timestamp: i64,
    score: f32,
    semantic_score: f32,
    keyword_boost: f32,
}

pub async fn run(
    app: &Mnemosyne,
    query: &str,
    filter: Option<TimeFilter>,
    limit: Option<usize>,
    dashboard: bool,
    json: bool,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        if !json {
            println!("{} Nothing to search for", "→".dimmed());
        } else {
            println!("[]");
        }
        return Ok(());
    }

    let config = app.config();
    let filter = filter.unwrap_or(config.default_time_filter);
    let limit = limit.unwrap_or(if dashboard {
        config.dashboard_limit
    } else {
        config.search_limit
    });

    if !app.model_loaded() {
        info!("Embedding model not loaded yet; this search loads it");
        if !json {
            eprintln!("{} Loading embedding model...", "→".dimmed());
        }
    }

    let results = app.search(query, filter, limit).await?;

    if json {
        let json_results: Vec<_> = results
            .iter()
            .map(|r| to_json(r, config.snippet_chars))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{} No memories found for: {}", "→".dimmed(), query.cyan());
        return Ok(());
    }

    println!(
        "{} {} results for: {} ({})",
        "→".dimmed(),
        results.len(),
        query.cyan(),
        filter
    );
    println!();

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] {}",
            (i + 1).to_string().bold(),
            colored_score(result.score),
            result.record.title.cyan()
        );
        println!("   {}", result.record.url.dimmed());

        if dashboard {
            println!("   {}", format_timestamp(result.record.timestamp));
            println!("   {}", snippet(&result.record.text, config.snippet_chars).dimmed());
        }
        println!();
    }

    Ok(())
}

fn to_json(result: &ScoredRecord, snippet_chars: usize) -> SearchResultJson<'_> {
    SearchResultJson {
        url: &result.record.url,
        title: &result.record.title,
        favicon: result.record.favicon.as_deref(),
        snippet: snippet(&result.record.text, snippet_chars),
        timestamp: result.record.timestamp,
        score: result.score,
        semantic_score: result.semantic_score,
        keyword_boost: result.keyword_boost,
    }
}
