use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use price_sentinel::config::AppConfig;
use price_sentinel::failure_tracker::FailureTracker;
use price_sentinel::fetcher::ReqwestTransport;
use price_sentinel::plugins::{EmailNotifier, LogNotifier, Notifier};
use price_sentinel::reports::Reporter;
use price_sentinel::store::{HistoryStore, SqliteHistoryStore};
use price_sentinel::{ConfigHandle, ItemOutcome, Monitor, MonitorScheduler, PassReport, PassRunner};

#[derive(Parser, Debug)]
#[command(name = "price-sentinel", version, about = "Watch listing pages for price changes")]
struct Cli {
    /// Load configuration from this file instead of config/default + RUN_MODE
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted
    Run {
        /// Skip the pass that normally runs at startup
        #[arg(long)]
        no_initial_pass: bool,
    },

    /// Run one monitoring pass and exit
    Check,

    /// Show recent and persistent failures
    Failures {
        /// Look-back window in days
        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },

    /// Build and send a summary now
    Summary {
        #[arg(value_enum)]
        kind: SummaryKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SummaryKind {
    Daily,
    Weekly,
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::from_env(),
    };
    config.context("Failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("price_sentinel=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exported on port {}", config.metrics.port);
    }

    let store: Arc<dyn HistoryStore> =
        Arc::new(SqliteHistoryStore::connect(&config.database.url, config.database.max_connections).await?);
    let notifier = build_notifier(&config)?;
    let monitor = Arc::new(Monitor::new(Arc::new(ReqwestTransport::new()?), Arc::clone(&store), notifier));
    let handle = Arc::new(ConfigHandle::new(config));
    let runner = PassRunner::new(monitor, Arc::clone(&handle));

    match cli.command {
        Command::Run { no_initial_pass } => run(runner, cli.config, no_initial_pass).await,
        Command::Check => {
            if let Some(report) = runner.run_pass().await? {
                print_pass(&report);
            }
            Ok(())
        }
        Command::Failures { days } => {
            let snapshot = handle.current().await;
            print_failures(store, &snapshot.config, days).await
        }
        Command::Summary { kind } => {
            let sent = match kind {
                SummaryKind::Daily => runner.send_daily_failure_summary().await?,
                SummaryKind::Weekly => runner.send_weekly_summary().await?,
            };
            if !sent {
                println!("Nothing to report");
            }
            Ok(())
        }
    }
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    let symbol = &config.scraper.currency_symbol;
    if config.notifications.smtp.is_some() {
        info!("Sending alerts by email");
        Ok(Arc::new(EmailNotifier::new(&config.notifications, symbol)?))
    } else {
        warn!("No SMTP settings configured, alerts will only be logged");
        Ok(Arc::new(LogNotifier::new(symbol)))
    }
}

async fn run(runner: PassRunner, config_path: Option<PathBuf>, no_initial_pass: bool) -> Result<()> {
    info!("Starting Price Sentinel...");

    let mut scheduler = MonitorScheduler::new(runner.clone()).await?;
    scheduler.start().await?;

    if !no_initial_pass {
        if let Err(e) = runner.run_pass().await {
            error!("Initial pass failed: {}", e);
        }
    }

    wait_for_shutdown(&scheduler, config_path.as_ref()).await?;

    info!("Shutting down...");
    scheduler.shutdown().await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(scheduler: &MonitorScheduler, config_path: Option<&PathBuf>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return Ok(result?),
            _ = hangup.recv() => reload(scheduler, config_path).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_scheduler: &MonitorScheduler, _config_path: Option<&PathBuf>) -> Result<()> {
    Ok(tokio::signal::ctrl_c().await?)
}

/// A bad file leaves the running configuration untouched.
#[cfg_attr(not(unix), allow(dead_code))]
async fn reload(scheduler: &MonitorScheduler, config_path: Option<&PathBuf>) {
    info!("Reloading configuration");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Keeping current configuration: {:#}", e);
            return;
        }
    };

    if let Err(e) = scheduler.runner().config().reload(config).await {
        error!("Keeping current configuration: {}", e);
        return;
    }

    if let Err(e) = scheduler.reschedule().await {
        error!("Failed to reschedule jobs: {}", e);
    }
}

fn print_pass(report: &PassReport) {
    for item in &report.items {
        let status = match &item.outcome {
            ItemOutcome::Baseline { price } => format!("baseline {}", price),
            ItemOutcome::Unchanged { price } => format!("unchanged at {}", price),
            ItemOutcome::PriceChanged { previous, price, alerted } => {
                format!("{} -> {}{}", previous, price, if *alerted { " (alerted)" } else { "" })
            }
            ItemOutcome::Failed {
                error_kind,
                consecutive_failures,
                ..
            } => format!("failed: {} (streak {})", error_kind, consecutive_failures),
            ItemOutcome::Skipped => "skipped".to_string(),
        };
        println!("{:<40} {}", item.name, status);
    }

    println!(
        "\n{} checked, {} ok, {} failed, {} alert(s)",
        report.items.len(),
        report.succeeded(),
        report.failed(),
        report.alerts_sent()
    );
}

async fn print_failures(store: Arc<dyn HistoryStore>, config: &AppConfig, days: u32) -> Result<()> {
    let now = Utc::now();
    let reporter = Reporter::new(Arc::clone(&store));

    match reporter.daily_failure_summary(&config.items, days * 24, now).await? {
        Some(digest) => {
            println!("Failures in the last {} day(s):", days);
            for item in &digest.items {
                let name = item.item_name.as_deref().unwrap_or(&item.item_url);
                println!("  {} ({} failure(s))", name, item.failures.len());
                for failure in &item.failures {
                    println!(
                        "    {}  {:<18} {}",
                        failure.failed_at.format("%Y-%m-%d %H:%M"),
                        failure.error_kind.as_str(),
                        failure.message
                    );
                }
            }
        }
        None => println!("No failures in the last {} day(s)", days),
    }

    let persistent = FailureTracker::new(store).persistent_failures(days, now).await?;
    if !persistent.is_empty() {
        println!("\nFailing for more than {} day(s) without a successful check:", days);
        for failure in persistent {
            let name = config
                .find_item(&failure.item_url)
                .map(|item| item.name.as_str())
                .unwrap_or(&failure.item_url);
            println!(
                "  {} since {} ({} failure(s))",
                name,
                failure.first_failure.format("%Y-%m-%d"),
                failure.failure_count
            );
        }
    }

    Ok(())
}
