use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use services::{Clock, UsageLedger};
use storage::repository::Storage;
use usage_core::model::{DEFAULT_RECENT_LIMIT, TokenUsage, UsagePoint, UsageRecord};

mod config;
mod error;

use config::AppConfig;
use error::AppError;

/// Token usage and cost ledger for LLM completion calls.
#[derive(Parser, Debug)]
#[command(name = "usage-ledger", version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (default: ./usage-ledger.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database URL or path; overrides `database_url`.
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Price a completed call and append it to the history.
    Record {
        #[arg(long, allow_hyphen_values = true)]
        prompt: i64,
        #[arg(long, allow_hyphen_values = true)]
        completion: i64,
        /// Reported total; defaults to prompt + completion.
        #[arg(long, allow_hyphen_values = true)]
        total: Option<i64>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Price a call without recording it.
    Cost {
        #[arg(long, allow_hyphen_values = true)]
        prompt: i64,
        #[arg(long, allow_hyphen_values = true)]
        completion: i64,
        #[arg(long)]
        model: Option<String>,
    },
    /// Print every recorded call, oldest first.
    History,
    /// Print aggregate statistics.
    Stats,
    /// Print the most recent calls as a token and cost series.
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },
    /// Discard the recorded history.
    Reset,
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "usage_ledger={log_level},services={log_level},storage={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if is_memory_or_uri(trimmed) || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

// `sqlite:file:` URIs (shared-cache memory databases and the like) are
// handed to SQLite as-is.
fn is_memory_or_uri(url: &str) -> bool {
    url == "sqlite::memory:" || url.starts_with("sqlite:file:")
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), AppError> {
    if is_memory_or_uri(db_url) {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| AppError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(AppError::InvalidDbUrl {
            raw: db_url.to_string(),
        });
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_record(record: &UsageRecord) {
    println!(
        "{}  {:<16} prompt={} completion={} total={} cost={}",
        record.timestamp(),
        record.model(),
        record.prompt_tokens(),
        record.completion_tokens(),
        record.total_tokens(),
        record.cost()
    );
}

fn format_point(point: &UsagePoint) -> String {
    format!(
        "{}  tokens={} cost={}",
        point.time_label(),
        point.tokens,
        point.cost
    )
}

async fn open_ledger(config: &AppConfig, db_override: Option<&str>) -> Result<UsageLedger, AppError> {
    let raw_url = db_override.unwrap_or(&config.database_url);
    if raw_url.trim().is_empty() {
        return Err(AppError::InvalidDbUrl {
            raw: raw_url.to_string(),
        });
    }
    let db_url = normalize_sqlite_url(raw_url);
    debug!(db_url = %db_url, "opening usage store");

    // Keep SQLite setup in the binary glue so services stay storage-agnostic.
    prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url).await?;

    Ok(UsageLedger::new(
        Arc::clone(&storage.kv),
        config.pricing_table()?,
        Clock::default_clock(),
        config.ledger_options(),
    ))
}

async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;
    init_tracing(&config.log_level);

    if let Commands::Cost {
        prompt,
        completion,
        model,
    } = &cli.command
    {
        let usage =
            TokenUsage::try_from_signed(*prompt, *completion, prompt.saturating_add(*completion))?;
        let model = model.as_deref().unwrap_or(&config.default_model);
        let cost = usage_core::model::compute_cost(&config.pricing_table()?, &usage, model);
        println!("{cost}");
        return Ok(());
    }

    let ledger = open_ledger(&config, cli.db.as_deref()).await?;

    match cli.command {
        Commands::Record {
            prompt,
            completion,
            total,
            model,
        } => {
            let model = model.unwrap_or_else(|| config.default_model.clone());
            let total = total.unwrap_or_else(|| prompt.saturating_add(completion));
            match ledger
                .record_signed_usage(prompt, completion, total, &model)
                .await
            {
                Ok(record) => print_record(&record),
                Err(err) => {
                    if let Some(record) = err.unsaved_record() {
                        println!("cost={} (not saved)", record.cost());
                    }
                    return Err(err.into());
                }
            }
        }
        Commands::History => {
            for record in ledger.history().await? {
                print_record(&record);
            }
        }
        Commands::Stats => {
            let stats = ledger.stats().await?;
            println!("total cost:         {}", stats.total_cost);
            println!("total tokens:       {}", stats.total_tokens);
            println!("total calls:        {}", stats.total_calls);
            println!("avg tokens / call:  {}", stats.average_tokens_per_call);
        }
        Commands::Recent { limit } => {
            for point in ledger.recent(limit).await? {
                println!("{}", format_point(&point));
            }
        }
        Commands::Reset => {
            let discarded = ledger.reset().await?;
            println!("discarded {discarded} records");
        }
        Commands::Cost { .. } => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
