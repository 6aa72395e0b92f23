mod config;
mod error;
mod matcher;
mod notify;
mod pipeline;
mod record;
mod search;
mod seen;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Settings;
use crate::matcher::Matcher;
use crate::notify::EmailNotifier;
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::search::SearchClient;

#[derive(Parser)]
#[command(name = "tender_watch", about = "Procurement notice watcher: match, dedupe, email")]
struct Cli {
    /// Config file (default: ./tender_watch.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the search API once and email new matches
    Run {
        /// Stop after this many pages
        #[arg(short = 'n', long)]
        max_pages: Option<u32>,
        /// Treat every match as new for this run (env: IGNORE_SEEN=1)
        #[arg(long)]
        ignore_seen: bool,
        /// Email every match, seen or not, and record nothing (env: FORCE_EMAIL_ALL=1)
        #[arg(long)]
        force_all: bool,
        /// Match and log only; no email, no state change
        #[arg(long)]
        dry_run: bool,
        /// Print every match of this run as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Evaluate the rules against a saved record (JSON file)
    Check {
        path: PathBuf,
    },
    /// Show the seen-id store
    Seen {
        /// Print every id
        #[arg(short, long)]
        list: bool,
    },
    /// Print effective settings
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    let result = match cli.command {
        Commands::Run {
            max_pages,
            ignore_seen,
            force_all,
            dry_run,
            json,
        } => {
            if let Some(n) = max_pages {
                settings.api.max_pages = n;
            }
            settings.run.ignore_seen |= ignore_seen;
            settings.run.force_all |= force_all;
            settings.run.dry_run |= dry_run;
            run_scan(&settings, json).await
        }
        Commands::Check { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let item: serde_json::Value =
                serde_json::from_str(&raw).with_context(|| format!("{:?} is not JSON", path))?;
            let matcher = Matcher::new(&settings.rules)?;

            let codes = matcher.extract_codes(&item);
            let outcome = matcher.evaluate(&item);
            println!("Id:         {}", record::identifier(&item).unwrap_or_else(|| "-".into()));
            println!("Title:      {}", record::display_title(&item));
            println!("URL:        {}", record::best_url(&item).unwrap_or_default());
            println!("CPV:        {}", if codes.is_empty() { "None".to_string() } else { codes.join(", ") });
            println!("Keyword:    {}", outcome.keyword);
            println!("Code:       {}", outcome.code);
            println!("Suppressed: {}", outcome.suppressed);
            println!(
                "Match:      {}{}",
                outcome.is_match(),
                if outcome.is_match() {
                    format!(" ({})", outcome.strategies().join(" + "))
                } else {
                    String::new()
                }
            );
            Ok(())
        }
        Commands::Seen { list } => {
            let store = seen::open(&settings.state)?;
            let ids = store.load();
            println!("Store: {}", store.describe());
            println!("Seen:  {}", ids.len());
            if ids.is_empty() {
                println!("No ids recorded yet.");
            } else if list {
                for id in ids.iter() {
                    println!("  {}", id);
                }
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_scan(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let matcher = Matcher::new(&settings.rules).context("Invalid rule set")?;
    let store = seen::open(&settings.state).context("Failed to open seen store")?;
    let source = SearchClient::new(settings.api.clone())?;
    let notifier = EmailNotifier::new(settings.email.clone());

    info!(
        max_pages = settings.api.max_pages,
        days_back = settings.api.days_back,
        ignore_seen = settings.run.ignore_seen,
        force_all = settings.run.force_all,
        dry_run = settings.run.dry_run,
        "Starting scan"
    );
    let pipeline = Pipeline::new(
        &source,
        &matcher,
        store.as_ref(),
        &notifier,
        PipelineOptions::from_settings(settings),
    );
    let report = pipeline.run().await?;

    println!(
        "Scanned {} items on {} pages ({} failed, {} skipped without id).",
        report.items_scanned, report.pages_fetched, report.failed_pages, report.skipped
    );
    println!(
        "Matches: {} total, {} new. Notified: {}. State saved: {}.",
        report.all_matches.len(),
        report.new_matches.len(),
        report.notified,
        if report.persisted { "yes" } else { "no" }
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&report.all_matches)?);
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
