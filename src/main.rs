// main.rs — sprintd entrypoint: config, logging, storage, refresh loop.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;

use sprintd::config::EngineConfig;
use sprintd::fetch::SpoolFetcher;
use sprintd::jobs::run_refresh_loop;
use sprintd::score::ScoreEngine;
use sprintd::sprints::{SprintCache, SprintCalendar};
use sprintd::storage::Storage;

#[derive(Parser)]
#[command(
    name = "sprintd",
    about = "Sprint metrics engine: scores team activity and caches it per sprint",
    version
)]
struct Args {
    /// Data directory for the SQLite cache and config.toml
    #[arg(long, env = "SPRINTD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Directory activity snapshots land in ({start}_{end}.json)
    #[arg(long, env = "SPRINTD_SPOOL_DIR")]
    spool_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SPRINTD_LOG")]
    log: Option<String>,

    /// Also write logs to this file path (rotated daily)
    #[arg(long, env = "SPRINTD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config resolves first so the TOML log/log_format knobs reach the
    // subscriber; load_toml reports parse failures on stderr because no
    // subscriber exists yet.
    let config = EngineConfig::new(args.data_dir, args.spool_dir, args.log);

    let _file_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "sprintd starting");
    info!(
        data_dir = %config.data_dir.display(),
        spool_dir = %config.spool_dir.display(),
        interval_secs = config.refresh.interval_secs,
        window_count = config.refresh.window_count,
        "config loaded"
    );

    let scoring = config
        .scoring
        .to_scoring_config()
        .context("invalid [scoring] configuration")?;
    let calendar = SprintCalendar::new(config.calendar.anchor, config.calendar.duration_days)
        .context("invalid [calendar] configuration")?;

    let storage = Arc::new(
        Storage::open(&config.data_dir, config.observability.slow_query_threshold_ms).await?,
    );
    let fetcher = Arc::new(SpoolFetcher::new(&config.spool_dir));
    let cache = Arc::new(SprintCache::new(
        storage.clone(),
        fetcher,
        ScoreEngine::new(scoring),
        calendar,
    ));

    tokio::spawn(run_refresh_loop(
        cache,
        storage,
        config.refresh.interval_secs,
        config.refresh.window_count,
    ));

    info!("sprintd ready");
    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown signal received, sprintd stopping");
    Ok(())
}

/// Initialize tracing: stdout always, plus an optional daily-rotated file.
/// Returns the appender guard; dropping it stops the background writer, so
/// main holds it for the life of the process.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::new(log_level);
    let json = log_format.eq_ignore_ascii_case("json");

    let Some(path) = log_file else {
        if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .init();
        }
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sprintd.log".to_string());
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {e}, falling back to stdout",
            dir.display()
        );
        if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .init();
        }
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .with(fmt::layer().json().with_ansi(false).with_writer(non_blocking))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .with(fmt::layer().compact().with_ansi(false).with_writer(non_blocking))
            .init();
    }
    Some(guard)
}
