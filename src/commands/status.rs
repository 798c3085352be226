//! Status command - store totals

use std::path::Path;

use anyhow::Result;
use colored::*;
use serde::Serialize;

use mnemosyne::search::vectordb::SCHEMA_VERSION;
use mnemosyne::Mnemosyne;

use super::format_timestamp;

#[derive(Serialize)]
pub struct MemoryStatus {
    pub memories: usize,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
    pub dimensions: Option<usize>,
    pub schema_version: i64,
    pub model_loaded: bool,
    pub database: String,
    pub database_bytes: u64,
    pub default_time_filter: String,
}

pub async fn collect(app: &Mnemosyne, database: &Path) -> Result<MemoryStatus> {
    let stats = app.stats().await?;
    let database_bytes = std::fs::metadata(database).map(|m| m.len()).unwrap_or(0);

    Ok(MemoryStatus {
        memories: stats.record_count,
        oldest: stats.oldest,
        newest: stats.newest,
        dimensions: stats.dimensions,
        schema_version: stats.schema_version,
        model_loaded: app.model_loaded(),
        database: database.display().to_string(),
        database_bytes,
        default_time_filter: app.config().default_time_filter.to_string(),
    })
}

pub async fn run(app: &Mnemosyne, database: &Path, json: bool) -> Result<()> {
    let status = collect(app, database).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }

    Ok(())
}

fn print_status(status: &MemoryStatus) {
    println!("{}", "Memory Status".bold());
    println!("{}", "=".repeat(50));
    println!();
    println!("   {:<16} {}", "Memories", status.memories);
    println!("   {:<16} {}", "Oldest", status.oldest.map(format_timestamp).unwrap_or_else(|| "-".to_string()));
    println!("   {:<16} {}", "Newest", status.newest.map(format_timestamp).unwrap_or_else(|| "-".to_string()));
    println!(
        "   {:<16} {}",
        "Dimensions",
        status.dimensions.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("   {:<16} {}", "Default filter", status.default_time_filter);
    println!(
        "   {:<16} {}",
        "Model",
        if status.model_loaded { "loaded".green() } else { "not loaded".dimmed() }
    );
    println!();

    println!("{}", "Storage".cyan());
    println!("{}", "-".repeat(30));
    println!("   {:<16} {}", "Database", status.database);
    println!("   {:<16} {:.1} KB", "Size", status.database_bytes as f64 / 1024.0);

    if status.schema_version == SCHEMA_VERSION {
        println!("   {:<16} v{}", "Schema", status.schema_version);
    } else {
        println!("   {:<16} {}", "Schema", format!("v{} (expected v{})", status.schema_version, SCHEMA_VERSION).yellow());
    }
    println!();
    println!("{}", "=".repeat(50));
}
