//! CLI entry point for the traffic telemetry sync.
//!
//! Provides one-shot import passes, a sequential scheduler loop and a
//! listing of the series published in the catalog.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use traffic_sync::{
    config::SyncConfig,
    engine::{bucket::Calendar, types::IntervalKind},
    fetch::{BasicClient, HttpClient, auth::BasicAuth},
    infra::{frost::FrostClient, keycloak::KeycloakTokenSource, thermicam::ThermiCamClient},
    pipeline::{self, RunSummary, SyncContext},
    registry::load_cameras,
};

/// Local (hour, minute) after which the nightly pass runs.
const LONG_RUN_AT: (u32, u32) = (0, 32);

#[derive(Parser)]
#[command(name = "traffic_sync")]
#[command(about = "Publishes aggregated traffic camera telemetry to a SensorThings catalog", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 5-minute and hourly series for the last two hours, daily for the last two days
    Run,
    /// Weekly, monthly and yearly series
    RunLong {
        /// First day to import (defaults to LONG_RUN_START)
        #[arg(long, value_name = "YYYY-MM-DD")]
        since: Option<NaiveDate>,
    },
    /// Rebuild every interval kind
    Archive {
        /// First day to import (defaults to ARCHIVE_START)
        #[arg(long, value_name = "YYYY-MM-DD")]
        since: Option<NaiveDate>,
    },
    /// Run every five minutes, plus the long pass once a day
    Schedule,
    /// List the series published in the catalog
    ListSeries,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/traffic_sync.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("traffic_sync.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Run => {
            let ctx = sync_context(&config)?;
            pipeline::short_run(&ctx, Utc::now()).await?.into_result()?;
        }
        Commands::RunLong { since } => {
            let ctx = sync_context(&config)?;
            let start = day_start(since.unwrap_or(config.long_run_start));
            pipeline::long_run(&ctx, start).await?.into_result()?;
        }
        Commands::Archive { since } => {
            let ctx = sync_context(&config)?;
            let start = day_start(since.unwrap_or(config.archive_start));
            info!(start = %start, "Starting archive import");
            pipeline::archive(&ctx, start).await?.into_result()?;
        }
        Commands::Schedule => {
            let ctx = sync_context(&config)?;
            schedule(&ctx, &config).await;
        }
        Commands::ListSeries => {
            let catalog = catalog_client(&config)?;
            let cameras = load_cameras(&catalog).await?;
            for camera in &cameras {
                for series in &camera.series {
                    info!(
                        camera_id = %camera.camera_id,
                        thing = %camera.thing_id,
                        datastream = %series.datastream_id,
                        zone = %series.key.scope.zone,
                        mode = %series.key.mode,
                        measurement = ?series.key.measurement,
                        interval = %series.key.interval,
                        "Series"
                    );
                }
            }
        }
    }

    Ok(())
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn http_client(config: &SyncConfig) -> Result<BasicClient> {
    BasicClient::with_timeout(config.http_timeout).context("failed to build HTTP client")
}

fn catalog_client(config: &SyncConfig) -> Result<FrostClient> {
    let http = http_client(config)?;
    let http: Box<dyn HttpClient> = match &config.catalog.user {
        Some(user) => {
            let password = config.catalog.password.as_deref().unwrap_or_default();
            Box::new(BasicAuth::new(http, user, password).context("invalid FROST credentials")?)
        }
        None => Box::new(http),
    };
    Ok(FrostClient::new(&config.catalog.server, http))
}

fn sync_context(config: &SyncConfig) -> Result<SyncContext> {
    let telemetry = config.require_telemetry()?;
    let tokens = KeycloakTokenSource::new(
        &telemetry.auth_url,
        &telemetry.realm,
        &telemetry.client_id,
        &telemetry.client_secret,
        Box::new(http_client(config)?),
    );
    let cameras = ThermiCamClient::new(&telemetry.url, Box::new(http_client(config)?), tokens);

    Ok(SyncContext {
        catalog: Box::new(catalog_client(config)?),
        telemetry: Box::new(cameras),
        calendar: Calendar::new(config.timezone),
        limits: config.limits,
    })
}

/// Runs passes back to back so they never overlap. A failed pass is logged
/// and the loop carries on with the next slot.
async fn schedule(ctx: &SyncContext, config: &SyncConfig) {
    let local_now = Utc::now().with_timezone(&config.timezone);
    let mut last_long_run = long_run_due(local_now.time()).then(|| local_now.date_naive());
    info!(tz = %config.timezone, "Scheduler started");

    loop {
        let now = Utc::now();
        log_outcome("run", pipeline::short_run(ctx, now).await);

        let local = now.with_timezone(&config.timezone);
        if long_run_due(local.time()) && last_long_run != Some(local.date_naive()) {
            let start = day_start(config.long_run_start);
            log_outcome("run-long", pipeline::long_run(ctx, start).await);
            last_long_run = Some(local.date_naive());
        }

        let next = ctx.calendar.bucket_start(Utc::now(), IntervalKind::FiveMinutes)
            + TimeDelta::minutes(5);
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!(next = %next, "Waiting for next slot");
        tokio::time::sleep(wait).await;
    }
}

fn long_run_due(local: NaiveTime) -> bool {
    (local.hour(), local.minute()) >= LONG_RUN_AT
}

fn log_outcome(pass: &str, outcome: traffic_sync::error::Result<RunSummary>) {
    match outcome.and_then(RunSummary::into_result) {
        Ok(summary) => info!(
            pass,
            operations = summary.report.operations_sent,
            "Pass completed"
        ),
        Err(e) if e.is_fatal_to_run() => error!(pass, error = %e, "Pass aborted"),
        Err(e) => warn!(pass, error = %e, "Pass finished with divergent buckets"),
    }
}
