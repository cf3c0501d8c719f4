use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::monitor_types::{DispatchResult, NormalizedState, StationId, StationRecord};
use crate::normalizer::normalize_fetch;
use crate::notification_service::StatusFetcher;
use crate::shutdown::ShutdownSignal;

/// Fetch failures in a row before the log escalates from warn to error.
const FAILURE_ESCALATION_THRESHOLD: u32 = 3;

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Stations to poll, one task each
    pub stations: Vec<StationId>,
    /// Time between the starts of two cycles of one station
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stations: Vec::new(),
            poll_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Drives one independent poll loop per station
pub struct PollScheduler {
    config: SchedulerConfig,
    fetcher: Arc<dyn StatusFetcher>,
    dispatcher: Arc<Dispatcher>,
}

impl PollScheduler {
    /// Create a scheduler.
    pub fn new(
        config: SchedulerConfig,
        fetcher: Arc<dyn StatusFetcher>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            fetcher,
            dispatcher,
        }
    }

    /// Poll every station until shutdown, then return the final records in
    /// configuration order. Ids repeated ignoring case get a single task.
    pub async fn run(self, shutdown: ShutdownSignal) -> Vec<StationRecord> {
        info!(
            "Starting poll scheduler for {} station(s) every {}s",
            self.config.stations.len(),
            self.config.poll_interval.as_secs()
        );

        let mut seen = HashSet::new();
        let handles: Vec<(StationId, JoinHandle<StationRecord>)> = self
            .config
            .stations
            .iter()
            .filter(|station_id| {
                let first = seen.insert(station_id.as_str().to_uppercase());
                if !first {
                    warn!("[{}] listed more than once, polling it once", station_id);
                }
                first
            })
            .map(|station_id| {
                let worker = StationWorker {
                    record: StationRecord::new(station_id.clone()),
                    fetcher: self.fetcher.clone(),
                    dispatcher: self.dispatcher.clone(),
                    poll_interval: self.config.poll_interval,
                    shutdown: shutdown.clone(),
                };
                (station_id.clone(), tokio::spawn(worker.run()))
            })
            .collect();

        let mut records = Vec::with_capacity(handles.len());
        for (station_id, handle) in handles {
            match handle.await {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!("[{}] poll task ended abnormally: {}", station_id, e);
                    records.push(StationRecord::new(station_id));
                }
            }
        }

        info!("Poll scheduler stopped");
        records
    }
}

/// One station's poll loop. Cycles never overlap: the next one starts only
/// after the previous fetch and any dispatch have finished.
struct StationWorker {
    record: StationRecord,
    fetcher: Arc<dyn StatusFetcher>,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
    shutdown: ShutdownSignal,
}

impl StationWorker {
    async fn run(mut self) -> StationRecord {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.triggered() => break,
                _ = ticker.tick() => {}
            }

            self.poll_once().await;

            if self.shutdown.is_triggered() {
                break;
            }
        }

        debug!("[{}] poll loop stopped", self.record.id);
        self.record
    }

    async fn poll_once(&mut self) -> Option<DispatchResult> {
        let station_id = self.record.id.clone();
        let fetched = self.fetcher.fetch(&station_id).await;

        if let Err(e) = &fetched {
            let failures = self.record.consecutive_fetch_failures + 1;
            if failures >= FAILURE_ESCALATION_THRESHOLD {
                error!("[{}] fetch failed ({} in a row): {}", station_id, failures, e);
            } else {
                warn!("[{}] fetch failed, retrying next interval: {}", station_id, e);
            }
        }

        let observation = normalize_fetch(fetched);
        if let Some(reading) = &observation.reading {
            match observation.state {
                NormalizedState::LoadAvailable => {
                    info!("[{}] available: {}", station_id, reading.availability)
                }
                NormalizedState::NoStock => info!("[{}] no stock", station_id),
                NormalizedState::Unknown => warn!(
                    "[{}] unrecognised availability text: {:?}",
                    station_id, reading.availability
                ),
            }
        }

        let event = self.record.observe(observation, Utc::now())?;
        let result = self
            .dispatcher
            .dispatch(&event, &mut self.record, &mut self.shutdown)
            .await;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_retry::CallRetryProtocol;
    use crate::monitor_types::{FetchError, StationReading};
    use crate::notification_service::{PhoneCaller, TelegramSender};
    use crate::shutdown::Shutdown;
    use async_trait::async_trait;
    use notification_services::{CallOutcome, NotificationError};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Serves scripted availability text per station; an exhausted script
    /// repeats its last entry.
    struct ScriptedFetcher {
        scripts: Mutex<HashMap<String, VecDeque<Result<&'static str, ()>>>>,
        delay: Duration,
    }

    impl ScriptedFetcher {
        fn new(scripts: Vec<(&str, Vec<Result<&'static str, ()>>)>, delay: Duration) -> Self {
            Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|(id, s)| (id.to_string(), s.into()))
                        .collect(),
                ),
                delay,
            }
        }
    }

    #[async_trait]
    impl StatusFetcher for ScriptedFetcher {
        async fn fetch(&self, station_id: &StationId) -> Result<StationReading, FetchError> {
            tokio::time::sleep(self.delay).await;
            let next = {
                let mut scripts = self.scripts.lock().unwrap();
                let script = scripts.get_mut(station_id.as_str()).unwrap();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    *script.front().unwrap()
                }
            };
            next.map(|text| StationReading {
                name: station_id.to_string(),
                availability: text.to_string(),
                ..Default::default()
            })
            .map_err(|_| FetchError::Http("timeout".into()))
        }
    }

    #[derive(Default)]
    struct RecordingTelegram {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TelegramSender for RecordingTelegram {
        async fn send_message(&self, message: &str) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    /// Busy forever for stations whose name appears in `busy_for`.
    struct LineCaller {
        busy_for: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PhoneCaller for LineCaller {
        async fn call(&self, message: &str, _language: &str) -> CallOutcome {
            self.calls.lock().unwrap().push(message.to_string());
            if self.busy_for.iter().any(|id| message.contains(id)) {
                CallOutcome::Busy
            } else {
                CallOutcome::Success
            }
        }
    }

    fn scheduler(
        stations: &[&str],
        fetcher: ScriptedFetcher,
        telegram: Arc<RecordingTelegram>,
        caller: Arc<LineCaller>,
    ) -> PollScheduler {
        let dispatcher = Dispatcher::new(
            telegram,
            caller,
            CallRetryProtocol::new(3, Duration::from_secs(60)),
            "es",
        );
        PollScheduler::new(
            SchedulerConfig {
                stations: stations.iter().map(|s| StationId::new(*s)).collect(),
                poll_interval: Duration::from_secs(300),
            },
            Arc::new(fetcher),
            Arc::new(dispatcher),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_load_notifies_once() {
        let fetcher = ScriptedFetcher::new(
            vec![("CHACO", vec![Ok("0 Lts."), Ok("5000"), Ok("5000"), Ok("4800")])],
            Duration::ZERO,
        );
        let telegram = Arc::new(RecordingTelegram::default());
        let caller = Arc::new(LineCaller {
            busy_for: vec![],
            calls: Mutex::new(Vec::new()),
        });
        let (shutdown, signal) = Shutdown::new();
        let task = tokio::spawn(
            scheduler(&["CHACO"], fetcher, telegram.clone(), caller.clone()).run(signal),
        );

        tokio::time::sleep(Duration::from_secs(300 * 5 + 1)).await;
        shutdown.trigger();
        let records = task.await.unwrap();

        assert_eq!(telegram.sent.lock().unwrap().len(), 1);
        assert_eq!(caller.calls.lock().unwrap().len(), 1);
        assert_eq!(records[0].notifications_sent, 1);
        assert_eq!(records[0].last_known_state, NormalizedState::LoadAvailable);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failures_do_not_refire() {
        let fetcher = ScriptedFetcher::new(
            vec![("CHACO", vec![Ok("5000"), Err(()), Err(()), Ok("5000")])],
            Duration::ZERO,
        );
        let telegram = Arc::new(RecordingTelegram::default());
        let caller = Arc::new(LineCaller {
            busy_for: vec![],
            calls: Mutex::new(Vec::new()),
        });
        let (shutdown, signal) = Shutdown::new();
        let task = tokio::spawn(
            scheduler(&["CHACO"], fetcher, telegram.clone(), caller.clone()).run(signal),
        );

        tokio::time::sleep(Duration::from_secs(300 * 4 + 1)).await;
        shutdown.trigger();
        let records = task.await.unwrap();

        assert_eq!(caller.calls.lock().unwrap().len(), 1);
        assert_eq!(records[0].consecutive_fetch_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_station_does_not_delay_others() {
        let fetcher = ScriptedFetcher::new(
            vec![
                ("CHACO", vec![Ok("5000")]),
                ("FORMOSA", vec![Ok("0"), Ok("3000")]),
            ],
            Duration::ZERO,
        );
        let telegram = Arc::new(RecordingTelegram::default());
        let caller = Arc::new(LineCaller {
            busy_for: vec!["CHACO"],
            calls: Mutex::new(Vec::new()),
        });
        let (shutdown, signal) = Shutdown::new();
        let task = tokio::spawn(
            scheduler(&["CHACO", "FORMOSA"], fetcher, telegram.clone(), caller.clone())
                .run(signal),
        );

        // CHACO is stuck in its busy-retry waits (0s, 60s, 120s); FORMOSA's
        // second poll at 300s must still happen on time.
        tokio::time::sleep(Duration::from_secs(301)).await;
        {
            let calls = caller.calls.lock().unwrap();
            assert!(calls.iter().any(|m| m.contains("FORMOSA")));
            assert_eq!(calls.iter().filter(|m| m.contains("CHACO")).count(), 3);
        }

        shutdown.trigger();
        let records = task.await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_str(), "CHACO");
        assert_eq!(records[1].notifications_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_call_retry() {
        let fetcher = ScriptedFetcher::new(vec![("CHACO", vec![Ok("5000")])], Duration::ZERO);
        let telegram = Arc::new(RecordingTelegram::default());
        let caller = Arc::new(LineCaller {
            busy_for: vec!["CHACO"],
            calls: Mutex::new(Vec::new()),
        });
        let (shutdown, signal) = Shutdown::new();
        let task = tokio::spawn(
            scheduler(&["CHACO"], fetcher, telegram, caller.clone()).run(signal),
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown.trigger();
        let started = tokio::time::Instant::now();
        let records = task.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(caller.calls.lock().unwrap().len(), 1);
        assert!(records[0].last_notified_at.is_some());
    }
}
