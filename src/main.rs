mod commands;
#[cfg(feature = "mcp")]
mod mcp;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::harvest::HarvestArgs;
use commands::AppContext;
use mnemosyne::TimeFilter;

/// Log filter variable, checked before `RUST_LOG`
const LOG_ENV: &str = "MNEMOSYNE_LOG";

#[derive(Parser)]
#[command(name = "mnemosyne")]
#[command(about = "Semantic memory of the pages you read", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Data directory (default: $MNEMOSYNE_HOME or ~/.mnemosyne)")]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Debug logging on stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remember a page
    Harvest(HarvestArgs),
    /// Remember pages from PAGE_HARVESTED messages on stdin (one per line)
    Ingest {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Hybrid semantic + keyword search
    #[command(alias = "s")]
    Search {
        query: String,
        #[arg(long, short, help = "Time window: all, 24h, 7d, 30d")]
        filter: Option<TimeFilter>,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, short, help = "Dashboard view (more results, dates, snippets)")]
        dashboard: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Forget a page
    Delete {
        url: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// List memories, newest first
    List {
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show store totals
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    // ===== MCP Server =====
    /// Start MCP server for Claude integration
    #[cfg(feature = "mcp")]
    Mcp {
        #[arg(long, help = "Show Claude configuration instructions")]
        install: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = AppContext::load(cli.data_dir)?;

    match cli.command {
        #[cfg(feature = "mcp")]
        Commands::Mcp { install: true } => {
            print_mcp_install_instructions(&ctx);
            Ok(())
        }
        command => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(dispatch(ctx, command))
        }
    }
}

async fn dispatch(ctx: AppContext, command: Commands) -> anyhow::Result<()> {
    let app = Arc::new(ctx.open()?);

    let result = match command {
        Commands::Harvest(args) => commands::harvest::run(&app, args).await,
        Commands::Ingest { json } => commands::ingest::run(&app, json).await,
        Commands::Search {
            query,
            filter,
            limit,
            dashboard,
            json,
        } => commands::search::run(&app, &query, filter, limit, dashboard, json).await,
        Commands::Delete { url, json } => commands::delete::run(&app, &url, json).await,
        Commands::List { limit, json } => commands::list::run(&app, limit, json).await,
        Commands::Status { json } => commands::status::run(&app, &ctx.paths.database, json).await,

        // MCP Server
        #[cfg(feature = "mcp")]
        Commands::Mcp { .. } => mcp::run_mcp_server(Arc::clone(&app), ctx.paths.database.clone()).await,
    };

    app.shutdown();
    result
}

/// Logs go to stderr; stdout carries command output and the MCP transport.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "mcp")]
fn print_mcp_install_instructions(ctx: &AppContext) {
    use colored::Colorize;

    let data_dir = ctx.paths.root.to_string_lossy().to_string();

    let binary_path = std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "mnemosyne".to_string());

    println!("{}", "MCP Server Installation Guide".bold().cyan());
    println!();
    println!("Add the following to your Claude configuration:");
    println!();
    println!("{}", "For Claude Desktop (~/.config/claude/claude_desktop_config.json):".dimmed());
    println!(r#"{{
  "mcpServers": {{
    "mnemosyne": {{
      "command": "{}",
      "args": ["--data-dir", "{}", "mcp"]
    }}
  }}
}}"#, binary_path, data_dir);
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Hybrid semantic + keyword search over visited pages", "memory_search".green());
    println!("  • {} - Remember a page", "memory_harvest".green());
    println!("  • {} - Forget a page by URL", "memory_delete".green());
    println!("  • {} - List memories, newest first", "memory_list".green());
    println!("  • {} - Store totals", "memory_status".green());
}
