use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use ticker_mentions::collector::{Collector, CollectorSettings};
use ticker_mentions::config::AppConfig;
use ticker_mentions::db::Database;
use ticker_mentions::error::MentionError;
use ticker_mentions::logging::{init_logging, OperationTimer};
use ticker_mentions::models::{CrawlMode, OutputFormat, SessionReport, SortMode};
use ticker_mentions::reddit::RedditClient;
use ticker_mentions::registry::{bootstrap, CsvSymbolSource, IexSymbolSource};
use ticker_mentions::repository::{MentionSink, SymbolSource};
use ticker_mentions::report::{write_activity, write_activity_to_file};
use ticker_mentions::service::{exit_code, PollingService, StopHandle, StopSignal};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file, highest precedence after the environment
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Populate the ticker registry from IEX Cloud or a CSV file
    Bootstrap {
        /// CSV file with `symbol,name` headers instead of IEX Cloud
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Refresh even if the registry is already populated
        #[arg(long)]
        force: bool,
    },
    /// Backfill history from a ranked listing
    ColdStart {
        /// Listing order (hot, new or top)
        #[arg(long)]
        sort: Option<String>,

        /// Time window for `top` (hour, day, week, month, year, all)
        #[arg(long)]
        window: Option<String>,

        /// Number of submissions to fetch
        #[arg(long)]
        submissions: Option<usize>,

        /// "Load more comments" expansions per submission
        #[arg(long)]
        comments: Option<usize>,
    },
    /// Run one incremental session
    Crawl {
        /// Number of submissions to fetch
        #[arg(long)]
        submissions: Option<usize>,

        /// "Load more comments" expansions per submission
        #[arg(long)]
        comments: Option<usize>,
    },
    /// Poll for new submissions until interrupted
    Watch {
        /// Seconds between sessions
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Export hourly activity of the most mentioned tickers
    Report {
        /// Number of tickers to include
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Output format (txt, csv or json)
        #[arg(short, long, default_value = "txt")]
        format: String,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show row counts and the high-water mark
    Stats,
    /// Delete every stored mention and reset the crawl cursor
    PurgeMentions {
        /// Required acknowledgement
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.downcast_ref::<MentionError>().map_or(1, exit_code);
            let component = e.downcast_ref::<MentionError>().map_or("ticker-mentions", MentionError::component);
            error!(component, error = %format!("{e:#}"), "Command failed");
            eprintln!("error [{component}]: {e:#}");
            ExitCode::from(code)
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config =
        AppConfig::load_from(cli.config.as_deref()).map_err(|e| MentionError::Configuration(format!("{e:#}")))?;

    // Initialize logging
    let log_file = config.logging.file_path.as_ref().map(PathBuf::from);
    let _guard = init_logging(Some(config.get_log_level().as_str()), log_file.as_deref(), &config.logging.format)?;

    info!("Starting ticker-mentions");

    // Initialize database with configuration
    let db = Arc::new(Database::with_pool(
        &config.get_database_url(),
        config.database.max_connections,
        Duration::from_secs(config.database.connection_timeout_secs),
    )?);

    // Process command
    match cli.command {
        Commands::Bootstrap { csv, force } => bootstrap_registry(&config, &db, csv, force).await,
        Commands::ColdStart {
            sort,
            window,
            submissions,
            comments,
        } => {
            let sort = SortMode::parse(
                sort.as_deref().unwrap_or(&config.crawl.cold_start_sort),
                window.as_deref().unwrap_or(&config.crawl.top_window),
            )?;
            let submissions = submissions.unwrap_or(config.crawl.cold_start_submission_limit);
            let comments = comments.unwrap_or(config.crawl.cold_start_comment_limit);
            crawl_once(&config, db, CrawlMode::ColdStart(sort), submissions, comments).await
        },
        Commands::Crawl { submissions, comments } => {
            let submissions = submissions.unwrap_or(config.crawl.incremental_submission_limit);
            let comments = comments.unwrap_or(config.crawl.incremental_comment_limit);
            crawl_once(&config, db, CrawlMode::Incremental, submissions, comments).await
        },
        Commands::Watch { interval } => {
            let interval = Duration::from_secs(interval.unwrap_or(config.crawl.poll_interval_secs).max(1));
            watch(&config, db, interval).await
        },
        Commands::Report { top, format, output } => {
            let format: OutputFormat = format.parse()?;
            export_report(&db, top, format, output)
        },
        Commands::Stats => show_stats(&config, &db).await,
        Commands::PurgeMentions { confirm } => {
            if !confirm {
                bail!(MentionError::Configuration(
                    "purge-mentions deletes every stored mention; pass --confirm to proceed".to_string()
                ));
            }
            let deleted = db.purge_mentions()?;
            println!("Deleted {deleted} mentions");
            Ok(())
        },
    }
}

/// Populate the ticker registry
async fn bootstrap_registry(config: &AppConfig, db: &Arc<Database>, csv: Option<PathBuf>, force: bool) -> Result<()> {
    let timer = OperationTimer::new("bootstrap");
    let csv = csv.or_else(|| config.registry.csv_path.as_ref().map(PathBuf::from));

    let source: Box<dyn SymbolSource> = if let Some(path) = csv {
        info!(path = %path.display(), "Loading symbols from CSV");
        Box::new(CsvSymbolSource::new(path))
    } else {
        let token = config.get_iex_token().ok_or_else(|| {
            MentionError::Configuration("no symbol source: set registry.iex_token (or IEX_TOKEN) or pass --csv".into())
        })?;
        Box::new(IexSymbolSource::new(
            &config.registry.iex_base_url,
            &token,
            Duration::from_secs(config.source.request_timeout_secs),
            config.source.retry_policy(),
        )?)
    };

    let report = bootstrap(source.as_ref(), db.as_ref(), force).await?;
    if report.already_populated {
        println!("Ticker table already populated; pass --force to refresh");
    } else {
        println!(
            "Registry updated: {} listed, {} written, {} invalid, {} duplicates",
            report.listed, report.written, report.invalid, report.duplicates
        );
    }
    timer.finish();
    Ok(())
}

fn build_collector(config: &AppConfig, db: Arc<Database>) -> Result<Collector> {
    let source = RedditClient::new(&config.source).context("Failed to create content source")?;
    Ok(Collector::new(Arc::new(source), db, CollectorSettings::from(&config.crawl)))
}

/// Forward Ctrl-C to the stop handle
fn stop_on_ctrl_c(handle: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight submissions");
            handle.stop();
        }
    });
}

async fn crawl_once(
    config: &AppConfig, db: Arc<Database>, mode: CrawlMode, submissions: usize, comments: usize,
) -> Result<()> {
    let mut collector = build_collector(config, db)?;
    let (handle, stop) = StopSignal::new();
    stop_on_ctrl_c(handle);

    let report = collector.run(mode, submissions, comments, &stop).await?;
    print_session(&report);
    Ok(())
}

async fn watch(config: &AppConfig, db: Arc<Database>, interval: Duration) -> Result<()> {
    let collector = build_collector(config, db)?;
    let (handle, stop) = StopSignal::new();
    stop_on_ctrl_c(handle);

    let mut service = PollingService::new(
        collector,
        interval,
        config.crawl.incremental_submission_limit,
        config.crawl.incremental_comment_limit,
    );
    let sessions = service.run(stop).await?;
    println!("Stopped after {sessions} sessions");
    Ok(())
}

fn export_report(db: &Database, top: usize, format: OutputFormat, output: Option<PathBuf>) -> Result<()> {
    let rows = db.ticker_activity(top)?;
    match output {
        Some(path) => {
            write_activity_to_file(&rows, format, &path)?;
            info!(rows = rows.len(), path = %path.display(), "Report written");
        },
        None => write_activity(&rows, format, std::io::stdout().lock())?,
    }
    Ok(())
}

async fn show_stats(config: &AppConfig, db: &Database) -> Result<()> {
    let stats = db.stats()?;
    let mark = db.get_high_water_mark(&config.source.community).await?;

    println!("tickers:      {}", stats.tickers);
    println!("submissions:  {}", stats.submissions);
    println!("comments:     {}", stats.comments);
    println!("mentions:     {}", stats.mentions);
    match mark {
        Some(mark) => println!("high-water mark (r/{}): {mark}", config.source.community),
        None => println!("high-water mark (r/{}): none", config.source.community),
    }
    Ok(())
}

fn print_session(report: &SessionReport) {
    println!(
        "Processed {} submissions ({} skipped, {} cancelled), scanned {} comments, inserted {} new mentions",
        report.submissions_processed,
        report.submissions_skipped,
        report.submissions_cancelled,
        report.comments_scanned,
        report.mentions_inserted
    );
}
