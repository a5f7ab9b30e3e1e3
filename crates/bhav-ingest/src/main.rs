//! Bhav Ingest - exchange data downloader and scheduler

use anyhow::{Context, Result};
use bhav_common::logging::{init_logging, LogConfig, LogLevel};
use bhav_common::types::parse_date;
use bhav_ingest::config::{AppConfig, SettingsStore};
use bhav_ingest::scheduler::SchedulerOptions;
use bhav_ingest::{IngestService, JobType};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bhav-ingest")]
#[command(author, version, about = "Exchange bhavcopy downloader, scheduler and transformer")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daily scheduler until Ctrl-C
    Daemon,

    /// Download every weekday in a date range
    Download {
        /// First date, YYYY-MM-DD
        #[arg(long)]
        from: String,

        /// Last date, YYYY-MM-DD (defaults to --from)
        #[arg(long)]
        to: Option<String>,

        /// Job type: nse-bhavcopy, nse-delivery or bse-bhavcopy
        #[arg(long, default_value = "nse-bhavcopy")]
        job: String,
    },

    /// Transform a downloaded file into a spreadsheet
    Transform {
        /// Path, or a file name inside the download directory
        file: String,
    },

    /// Show the schedule the stored settings produce
    Status,

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the current settings
    Show,

    /// Update settings and reload the scheduler if the schedule changed
    Set {
        /// Daily run time, HH:MM (24-hour)
        #[arg(long)]
        time: Option<String>,

        /// Enable or disable the daily run
        #[arg(long)]
        enabled: Option<bool>,

        /// Always fetch this date, YYYY-MM-DD
        #[arg(long, conflicts_with = "clear_manual_date")]
        manual_date: Option<String>,

        /// Go back to fetching today's file
        #[arg(long)]
        clear_manual_date: bool,

        #[arg(long)]
        download_path: Option<String>,

        #[arg(long)]
        processed_path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("bhav-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    if let Err(e) = run(cli).await {
        error!(error = %format!("{:#}", e), "Command failed");
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let app_config = AppConfig::from_env()?;
    let store = SettingsStore::new(&app_config.settings_file);
    let service = IngestService::from_store(store, SchedulerOptions::default())
        .context("Failed to initialize ingest service")?;

    match cli.command {
        Command::Daemon => run_daemon(&service, app_config.settings_poll).await,
        Command::Download { from, to, job } => {
            let from = parse_date(&from)?;
            let to = match to {
                Some(to) => parse_date(&to)?,
                None => from,
            };
            let job: JobType = job.parse()?;
            let report = service.acquire_range(from, to, job).await?;
            print_json(&report)
        },
        Command::Transform { file } => {
            let result = service.transform(&file).await?;
            print_json(&result)
        },
        Command::Status => {
            service.start_scheduler().await?;
            print_json(&service.scheduler_status().await)
        },
        Command::Settings { action } => run_settings(&service, action).await,
    }
}

async fn run_settings(service: &IngestService, action: SettingsCommand) -> Result<()> {
    match action {
        SettingsCommand::Show => print_json(&service.get_settings()?),
        SettingsCommand::Set {
            time,
            enabled,
            manual_date,
            clear_manual_date,
            download_path,
            processed_path,
        } => {
            let mut settings = service.get_settings()?;
            if let Some(time) = time {
                settings.scheduler_time = time;
            }
            if let Some(enabled) = enabled {
                settings.scheduler_enabled = enabled;
            }
            if let Some(date) = manual_date {
                settings.scheduler_manual_date = Some(parse_date(&date)?);
            }
            if clear_manual_date {
                settings.scheduler_manual_date = None;
            }
            if let Some(path) = download_path {
                settings.download_path = path;
            }
            if let Some(path) = processed_path {
                settings.processed_path = path;
            }

            let report = service.save_settings(settings).await?;
            print_json(&report)
        },
    }
}

async fn run_daemon(service: &IngestService, poll: Duration) -> Result<()> {
    let state = service
        .start_scheduler()
        .await
        .context("Failed to start scheduler; no scheduled downloads will run")?;
    let timer = service.scheduler().spawn();
    info!(?state, poll_secs = poll.as_secs(), "Daemon running, press Ctrl-C to stop");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut poll_timer = tokio::time::interval(poll);
    poll_timer.tick().await;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
            _ = poll_timer.tick() => {
                if let Err(e) = service.sync_settings().await {
                    warn!(error = %e, "Could not apply settings, keeping current schedule");
                }
            }
        }
    }

    service.stop_scheduler().await;
    timer.abort();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
