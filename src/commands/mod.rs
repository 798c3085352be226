//! CLI commands

pub mod delete;
pub mod harvest;
pub mod ingest;
pub mod list;
pub mod search;
pub mod status;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Local};
use colored::{ColoredString, Colorize};

use mnemosyne::{Config, DataPaths, Mnemosyne};

/// Resolved data directory and config for one CLI invocation
pub struct AppContext {
    pub paths: DataPaths,
    pub config: Config,
}

impl AppContext {
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let paths = match data_dir {
            Some(root) => DataPaths::from_root(root),
            None => DataPaths::new(),
        };
        let config = Config::load(&paths.config)?;
        Ok(Self { paths, config })
    }

    /// Open the memory service. Needs a Tokio runtime.
    pub fn open(&self) -> Result<Mnemosyne> {
        Mnemosyne::open(&self.paths, self.config.clone())
    }
}

/// `0.873` → `"87%"`. Boosted scores can go past 100%.
pub fn format_score(score: f32) -> String {
    format!("{}%", (score * 100.0).round() as i64)
}

pub fn colored_score(score: f32) -> ColoredString {
    let text = format_score(score);
    if score > 0.8 {
        text.green()
    } else if score > 0.6 {
        text.yellow()
    } else {
        text.dimmed()
    }
}

/// Local date and time of an epoch-millisecond timestamp
pub fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
