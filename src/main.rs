use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use housefinder::api::{self, AppState};
use housefinder::common_scraper::{ingest_and_store, IngestionOptions, DEFAULT_PAGES};
use housefinder::config::{delay_from_secs, period_from_hours, AppConfig};
use housefinder::fetcher::{Pacing, DEFAULT_USER_AGENT};
use housefinder::scheduler::{self, ScheduleConfig};
use housefinder::scrapers::{HttpSourceProvider, SourceProvider};
use housefinder::store::{GroupField, Store};
use housefinder::utils;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Housefinder - second-hand housing listing harvester")]
struct Args {
    /// Path to the SQLite listing database
    #[arg(long, env = "HOUSEFINDER_DATABASE", default_value = "houses.db", global = true)]
    database: PathBuf,

    /// Minimum delay between page requests, in seconds
    #[arg(long, env = "HOUSEFINDER_MIN_DELAY", default_value = "1", global = true)]
    min_delay: f64,

    /// Maximum delay between page requests, in seconds
    #[arg(long, env = "HOUSEFINDER_MAX_DELAY", default_value = "3", global = true)]
    max_delay: f64,

    /// Request timeout in seconds
    #[arg(long, env = "HOUSEFINDER_TIMEOUT", default_value = "30", global = true)]
    timeout: u64,

    /// User agent sent with every request
    #[arg(long, env = "HOUSEFINDER_USER_AGENT", default_value = DEFAULT_USER_AGENT, global = true)]
    user_agent: String,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API together with the weekly scheduled scrape
    Serve {
        /// Address to listen on
        #[arg(long, env = "HOUSEFINDER_BIND", default_value = "0.0.0.0:5000")]
        bind: SocketAddr,

        /// City code scraped by the scheduler
        #[arg(long, env = "HOUSEFINDER_SCHEDULE_SOURCE", default_value = "bj")]
        schedule_source: String,

        /// Pages fetched by each scheduled scrape
        #[arg(long, env = "HOUSEFINDER_SCHEDULE_PAGES", default_value_t = DEFAULT_PAGES)]
        schedule_pages: u32,

        /// Hours between scheduled scrapes
        #[arg(long, env = "HOUSEFINDER_SCHEDULE_HOURS", default_value = "168")]
        schedule_hours: u64,

        /// Do not start the scheduler
        #[arg(long)]
        no_schedule: bool,
    },

    /// Scrape one source now and store new listings
    Scrape {
        /// City code, e.g. bj, sh, hf
        source_key: String,

        /// Number of listing pages to fetch
        #[arg(short, long, default_value_t = DEFAULT_PAGES)]
        pages: u32,
    },

    /// Export all stored listings as CSV
    Export {
        /// Path to output CSV file
        #[arg(short, long, default_value = "houses.csv")]
        output: String,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.debug);

    let mut config = AppConfig {
        database: args.database.clone(),
        pacing: Pacing::new(
            delay_from_secs("--min-delay", args.min_delay)?,
            delay_from_secs("--max-delay", args.max_delay)?,
        ),
        request_timeout: Duration::from_secs(args.timeout),
        user_agent: args.user_agent.clone(),
        ..AppConfig::default()
    };

    match args.command {
        Command::Serve {
            bind,
            schedule_source,
            schedule_pages,
            schedule_hours,
            no_schedule,
        } => {
            config.bind = bind;
            config.schedule_enabled = !no_schedule;
            config.schedule = ScheduleConfig {
                source_key: schedule_source,
                pages: schedule_pages,
                period: period_from_hours(schedule_hours)?,
            };

            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(serve(config))
        }
        Command::Scrape { source_key, pages } => scrape(&config, &source_key, pages),
        Command::Export { output } => export(&config, &output),
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "housefinder=debug,tower_http=debug"
    } else {
        "housefinder=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

async fn serve(config: AppConfig) -> Result<()> {
    let store = Arc::new(Store::open(&config.database)?);
    let provider: Arc<dyn SourceProvider> =
        Arc::new(HttpSourceProvider::new(config.request_template()));
    let mut state = AppState::new(store.clone(), provider.clone());

    let schedule = if config.schedule_enabled {
        let handle = scheduler::start_scheduler(store, provider, config.schedule.clone()).await?;
        if let Some(next) = handle.next_run() {
            info!("Next scheduled scrape at {}", next);
        }
        state = state.with_schedule(handle.next_run_cell());
        Some(handle)
    } else {
        info!("Scheduler disabled");
        None
    };

    api::serve(config.bind, state).await?;

    if let Some(handle) = schedule {
        handle.shutdown().await?;
    }
    Ok(())
}

fn scrape(config: &AppConfig, source_key: &str, pages: u32) -> Result<()> {
    println!("Housefinder - scraping {} ({} pages)", source_key, pages);
    println!("{}", "=".repeat(40));

    let store = Store::open(&config.database)?;
    let provider = HttpSourceProvider::new(config.request_template());
    let source = provider.open(source_key)?;

    let bar = ProgressBar::new(u64::from(pages));
    bar.set_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
            .context("Invalid progress template")?,
    );

    let outcome = ingest_and_store(
        &store,
        source.as_ref(),
        &IngestionOptions::with_pages(pages),
        Some(&bar),
    )?;
    bar.finish_with_message("done");

    println!("\n=== Summary ===");
    println!("Listings found: {}", outcome.found);
    println!("New listings stored: {}", outcome.inserted);
    if outcome.pages_failed > 0 {
        println!("Pages that failed to load: {}", outcome.pages_failed);
    }
    println!("Total listings in database: {}", store.count()?);
    for (room_type, count) in store.count_by_group(GroupField::RoomType)? {
        println!("  {:<12} {}", room_type, count);
    }

    Ok(())
}

fn export(config: &AppConfig, output: &str) -> Result<()> {
    let store = Store::open(&config.database)?;
    let listings = store.list_all()?;
    if listings.is_empty() {
        println!("No listings stored yet.");
        return Ok(());
    }

    utils::save_listings_to_csv(&listings, output)?;
    println!("Exported {} listings to {}", listings.len(), output);
    Ok(())
}
