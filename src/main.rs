use anyhow::{Context, Result};
use clap::Parser;
use show_urls::config::AppConfig;
use show_urls::updater::{RunOptions, RunSummary};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "show-urls",
    version,
    about = "Populate show URLs in the shows database from a CSV file"
)]
struct Cli {
    /// CSV file with a header row: show date (YYYY-MM-DD) and show URL
    #[arg(short, long)]
    file: PathBuf,

    /// Fill shows without a URL from related shows (repeats of the same episode)
    #[arg(short, long)]
    backfill: bool,

    /// Give shows still without a URL a generated NPR.org link
    #[arg(short, long)]
    generate: bool,

    /// Show what would be updated without writing to DB
    #[arg(long)]
    dry_run: bool,

    /// Path to the SQLite database
    #[arg(long, env = "SHOW_URLS_DB")]
    db_path: Option<PathBuf>,

    /// Config file (defaults to ~/.config/show-urls/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };

    let loaded = show_urls::loader::load(&cli.file)
        .with_context(|| format!("Failed to load {}", cli.file.display()))?;
    if loaded.rows.is_empty() {
        println!("No shows found in {}", cli.file.display());
    }

    // Resolve database path: CLI/env > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(show_urls::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = show_urls::db::Database::open(&db_path).context("Failed to open database")?;

    let opts = RunOptions {
        backfill: cli.backfill,
        generate: cli.generate || config.backfill.generate,
        dry_run: cli.dry_run,
    };
    if opts.dry_run {
        println!("DRY RUN — no changes will be written to the database");
    }

    let summary = show_urls::updater::run(&db, &loaded.rows, opts).context("Update failed")?;
    db.close().context("Failed to close database")?;

    print_summary(loaded.rows.len(), loaded.skipped.len(), &summary);
    if opts.dry_run {
        println!("(dry run — re-run without --dry-run to write changes)");
    }

    Ok(())
}

fn print_summary(read: usize, skipped: usize, summary: &RunSummary) {
    let direct = &summary.direct;
    println!(
        "Update complete: {} rows read, {} skipped, {} updated, {} unchanged, {} not found, {} failed",
        read,
        skipped,
        direct.updated,
        direct.unchanged,
        direct.not_matched.len(),
        direct.failed
    );
    for date in &direct.not_matched {
        println!("  not found: {date}");
    }

    if let Some(backfill) = &summary.backfill {
        println!(
            "Backfill complete: {} filled, {} without a related URL, {} failed",
            backfill.filled,
            backfill.unresolved.len(),
            backfill.failed
        );
        if summary.generate.is_none() {
            for show in &backfill.unresolved {
                println!("  no URL: {}", show.date);
            }
        }
    }

    if let Some(generate) = &summary.generate {
        println!(
            "Generated URLs: {} set, {} failed",
            generate.generated, generate.failed
        );
    }
}
