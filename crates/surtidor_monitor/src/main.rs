//! Main entry point for the Biopetrol station monitor.
//!
//! Usage:
//!   surtidor-monitor run --surtidor CHACO            # Watch one station
//!   surtidor-monitor run --surtidor CHACO --dry-run  # Log alerts instead of sending them
//!   surtidor-monitor test-alert                      # Send one Telegram message and one call

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use station_monitor::dispatcher::{test_alert_message, test_call_message};
use station_monitor::{
    ConfigOverrides, MonitorConfig, MonitorError, ShutdownSignal, StationId, StationRecord,
};

mod logging;
mod monitor_manager;

use monitor_manager::{MonitorManager, build_dispatcher};

#[derive(Parser)]
#[command(
    name = "surtidor-monitor",
    version,
    about = "⛽ Biopetrol station monitor with Telegram and phone-call alerts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll stations and alert on every new fuel load
    Run {
        /// Station to monitor (repeat for several)
        #[arg(short, long = "surtidor", required = true)]
        surtidor: Vec<String>,

        /// Seconds between polls of each station
        #[arg(short, long)]
        interval: Option<u64>,

        /// Total call attempts per alert
        #[arg(long)]
        max_retries: Option<u32>,

        /// Seconds to wait after a busy line
        #[arg(long)]
        retry_delay: Option<u64>,

        /// CallMeBot voice/language code
        #[arg(long)]
        lang: Option<String>,

        /// Append log output to this file as well
        #[arg(long)]
        log_file: Option<String>,

        /// Log alerts instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Send one test Telegram message and place one test call
    TestAlert {
        /// Station name shown in the test message
        #[arg(short, long, default_value = "ESTACION_TEST")]
        station: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            surtidor,
            interval,
            max_retries,
            retry_delay,
            lang,
            log_file,
            dry_run,
        } => {
            let overrides = ConfigOverrides {
                stations: surtidor,
                poll_interval_secs: interval,
                max_call_retries: max_retries,
                retry_delay_secs: retry_delay,
                call_language: lang,
                log_file,
            };
            let config = load_config(overrides, cli.verbose)?;
            run(config, dry_run).await;
        }
        Commands::TestAlert { station } => {
            let overrides = ConfigOverrides {
                stations: vec![station],
                ..Default::default()
            };
            let config = load_config(overrides, cli.verbose)?;
            test_alert(&config).await?;
        }
    }

    Ok(())
}

/// Resolve the configuration and start the logger. An invalid configuration
/// is logged and ends the process with status 1.
fn load_config(overrides: ConfigOverrides, verbose: bool) -> Result<MonitorConfig> {
    let config = MonitorConfig::from_env(overrides);

    logging::init(
        verbose,
        config.as_ref().ok().and_then(|c| c.log_file.as_deref()),
    )
    .context("Failed to open log file")?;

    match config.map_err(config_failure) {
        Ok(config) => Ok(config),
        Err(status) => std::process::exit(status),
    }
}

/// Process exit status for an unusable configuration.
const CONFIG_ERROR_STATUS: i32 = 1;

/// Log a configuration error and pick the exit status for it.
fn config_failure(error: MonitorError) -> i32 {
    log::error!("❌ {}", error);
    CONFIG_ERROR_STATUS
}

async fn run(config: MonitorConfig, dry_run: bool) {
    log::info!("🚀 Starting Biopetrol station monitor...");

    let dispatcher = match build_dispatcher(&config, dry_run) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            log::error!("❌ Failed to initialize alert channels: {}", e);
            log::error!("💡 Set TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID and CALLMEBOT_USER, or use --dry-run");
            std::process::exit(1);
        }
    };

    let mut manager = MonitorManager::new(config, dispatcher);
    if let Err(e) = manager.start().await {
        log::error!("❌ Failed to start monitor: {}", e);
        std::process::exit(1);
    }

    wait_for_shutdown_signal().await;
    log::info!("🛑 Shutdown requested");

    let records = manager.stop().await;
    log_summary(&records);
}

async fn test_alert(config: &MonitorConfig) -> Result<()> {
    let station = config
        .stations
        .first()
        .cloned()
        .unwrap_or_else(|| StationId::new("ESTACION_TEST"));
    let dispatcher = build_dispatcher(config, false)?;

    log::info!("Sending test message to Telegram...");
    dispatcher
        .telegram()
        .send_message(&test_alert_message(&station))
        .await
        .context("Telegram test message failed")?;
    log::info!("✅ Telegram message sent");

    log::info!("Placing test phone call...");
    let report = dispatcher
        .retry()
        .call_with_retry(
            dispatcher.phone(),
            &test_call_message(),
            dispatcher.call_language(),
            &mut ShutdownSignal::never(),
        )
        .await;

    if !report.succeeded() {
        anyhow::bail!(
            "Test call did not go through: {}",
            serde_json::to_string(&report)?
        );
    }

    log::info!("✅ Test call placed after {} attempt(s)", report.attempts.len());
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => log::warn!("SIGTERM handler unavailable, only Ctrl-C stops the monitor: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
    }
}

fn log_summary(records: &[StationRecord]) {
    for record in records {
        log::info!(
            "📊 [{}] last state: {}, alerts sent: {}, last checked: {}, last alert: {}",
            record.id,
            record.last_known_state,
            record.notifications_sent,
            record
                .last_checked_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            record
                .last_notified_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        );
    }
}
