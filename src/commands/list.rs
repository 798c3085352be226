//! List command - every memory, newest first

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use mnemosyne::Mnemosyne;

use super::format_timestamp;

#[derive(Serialize)]
pub struct MemoryInfoJson {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    pub timestamp: i64,
}

pub async fn collect(app: &Mnemosyne, limit: Option<usize>) -> Result<Vec<MemoryInfoJson>> {
    let records = app.list().await?;

    Ok(records
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|r| MemoryInfoJson {
            url: r.url,
            title: r.title,
            favicon: r.favicon,
            timestamp: r.timestamp,
        })
        .collect())
}

pub async fn run(app: &Mnemosyne, limit: Option<usize>, json: bool) -> Result<()> {
    let memories = collect(app, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&memories)?);
        return Ok(());
    }

    if memories.is_empty() {
        println!("{} No memories yet", "→".dimmed());
        return Ok(());
    }

    for memory in &memories {
        println!(
            "{}  {}",
            format_timestamp(memory.timestamp).dimmed(),
            memory.title.cyan()
        );
        println!("                  {}", memory.url);
    }
    println!();
    println!("{} {} memories", "→".dimmed(), memories.len());

    Ok(())
}
