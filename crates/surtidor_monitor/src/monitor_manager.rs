use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use notification_services::{CallMeBotClient, TelegramClient};
use station_monitor::mock_services::{MockPhoneCaller, MockTelegramSender};
use station_monitor::{
    BiopetrolClient, Dispatcher, MonitorConfig, MonitorError, PhoneCaller, PollScheduler,
    Shutdown, StationRecord, StatusFetcher, TelegramSender,
};

/// Build the alert dispatcher, with real channels or logging mocks.
pub fn build_dispatcher(config: &MonitorConfig, dry_run: bool) -> Result<Dispatcher, MonitorError> {
    let (telegram, phone): (Arc<dyn TelegramSender>, Arc<dyn PhoneCaller>) = if dry_run {
        info!("Dry run: Telegram and phone alerts are only logged");
        (Arc::new(MockTelegramSender), Arc::new(MockPhoneCaller))
    } else {
        (
            Arc::new(TelegramClient::from_env()?),
            Arc::new(CallMeBotClient::from_env()?),
        )
    };

    Ok(Dispatcher::new(
        telegram,
        phone,
        config.retry_protocol(),
        config.call_language.clone(),
    ))
}

/// Owns the background poll scheduler for the `run` command
pub struct MonitorManager {
    config: MonitorConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: Option<Shutdown>,
    scheduler_handle: Option<JoinHandle<Vec<StationRecord>>>,
}

impl MonitorManager {
    /// Create a new monitor manager
    pub fn new(config: MonitorConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            shutdown: None,
            scheduler_handle: None,
        }
    }

    /// Announce the run and start polling in a background task
    pub async fn start(&mut self) -> Result<(), MonitorError> {
        info!("Starting station monitor");

        let fetcher: Arc<dyn StatusFetcher> = Arc::new(
            BiopetrolClient::new(self.config.biopetrol_url.clone())
                .map_err(|e| MonitorError::Config(e.to_string()))?,
        );

        self.dispatcher
            .announce_start(&self.config.stations, self.config.poll_interval_secs)
            .await;

        let (shutdown, signal) = Shutdown::new();
        let scheduler = PollScheduler::new(
            self.config.scheduler_config(),
            fetcher,
            self.dispatcher.clone(),
        );

        self.scheduler_handle = Some(tokio::spawn(scheduler.run(signal)));
        self.shutdown = Some(shutdown);

        info!(
            "Monitoring {} every {}s",
            self.config
                .stations
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.config.poll_interval_secs
        );
        Ok(())
    }

    /// Signal every station task to stop, wait for them and announce the stop
    pub async fn stop(&mut self) -> Vec<StationRecord> {
        info!("Stopping station monitor");

        if let Some(shutdown) = self.shutdown.take() {
            shutdown.trigger();
        }

        let records = match self.scheduler_handle.take() {
            Some(handle) => match handle.await {
                Ok(records) => records,
                Err(e) => {
                    error!("Poll scheduler ended abnormally: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        self.dispatcher.announce_stop(&self.config.stations).await;

        info!("Station monitor stopped");
        records
    }
}

impl Drop for MonitorManager {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler_handle.take() {
            handle.abort();
        }
    }
}
