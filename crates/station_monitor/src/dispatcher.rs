use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tracing::{error, info, warn};

use crate::call_retry::CallRetryProtocol;
use crate::monitor_types::{ChangeEvent, DispatchResult, StationId, StationRecord};
use crate::notification_service::{PhoneCaller, TelegramSender};
use crate::shutdown::ShutdownSignal;

/// Sends the Telegram alert and runs the call retry protocol for a change event.
pub struct Dispatcher {
    telegram: Arc<dyn TelegramSender>,
    phone: Arc<dyn PhoneCaller>,
    retry: CallRetryProtocol,
    call_language: String,
}

impl Dispatcher {
    /// Create a dispatcher over the two alert channels.
    pub fn new(
        telegram: Arc<dyn TelegramSender>,
        phone: Arc<dyn PhoneCaller>,
        retry: CallRetryProtocol,
        call_language: impl Into<String>,
    ) -> Self {
        Self {
            telegram,
            phone,
            retry,
            call_language: call_language.into(),
        }
    }

    /// Notify operators about `event`.
    ///
    /// `last_notified_at` is stamped before either channel is tried. A failed
    /// Telegram send is logged and the call still goes out.
    pub async fn dispatch(
        &self,
        event: &ChangeEvent,
        record: &mut StationRecord,
        shutdown: &mut ShutdownSignal,
    ) -> DispatchResult {
        record.last_notified_at = Some(Utc::now());
        record.notifications_sent += 1;

        info!(
            "[{}] dispatching new-load alert ({} -> {})",
            event.station_id, event.from_state, event.to_state
        );

        let telegram_sent = match self
            .telegram
            .send_message(&alert_message(event))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("[{}] Telegram alert failed: {}", event.station_id, e);
                false
            }
        };

        let call = self
            .retry
            .call_with_retry(
                self.phone.as_ref(),
                &call_message(&event.station_id),
                &self.call_language,
                shutdown,
            )
            .await;

        let result = DispatchResult {
            station_id: event.station_id.clone(),
            telegram_sent,
            call,
        };

        if result.succeeded() {
            info!(
                "[{}] alert delivered (telegram: {}, call attempts: {})",
                event.station_id,
                telegram_sent,
                result.call.attempts.len()
            );
        } else {
            warn!(
                "[{}] call channel did not reach the operator: {}",
                event.station_id,
                serde_json::to_string(&result).unwrap_or_default()
            );
        }

        result
    }

    /// Best-effort notice that monitoring has begun.
    pub async fn announce_start(&self, stations: &[StationId], interval_secs: u64) {
        self.send_notice(&start_message(stations, interval_secs, Local::now()))
            .await;
    }

    /// Best-effort notice that monitoring has stopped.
    pub async fn announce_stop(&self, stations: &[StationId]) {
        self.send_notice(&stop_message(stations)).await;
    }

    async fn send_notice(&self, message: &str) {
        if let Err(e) = self.telegram.send_message(message).await {
            warn!("Telegram notice not delivered: {}", e);
        }
    }

    /// Telegram channel, for the manual verification command.
    pub fn telegram(&self) -> &dyn TelegramSender {
        self.telegram.as_ref()
    }

    /// Phone channel, for the manual verification command.
    pub fn phone(&self) -> &dyn PhoneCaller {
        self.phone.as_ref()
    }

    /// Retry settings in use.
    pub fn retry(&self) -> &CallRetryProtocol {
        &self.retry
    }

    /// Language code passed to the phone channel.
    pub fn call_language(&self) -> &str {
        &self.call_language
    }
}

/// HTML alert sent to Telegram for a new load.
pub fn alert_message(event: &ChangeEvent) -> String {
    let reading = event.reading.clone().unwrap_or_default();
    let name = if reading.name.is_empty() {
        event.station_id.to_string()
    } else {
        reading.name
    };
    let observed: DateTime<Local> = event.observed_at.with_timezone(&Local);

    format!(
        "🚨 <b>ALERTA DE COMBUSTIBLE DISPONIBLE</b> 🚨\n\n\
         📍 <b>Estación:</b> {}\n\
         ⛽ <b>Disponible:</b> {}\n\
         🕒 <b>Actualizado:</b> {}\n\
         📌 <b>Dirección:</b> {}\n\n\
         <i>Verificado el {}</i>",
        escape_html(&name),
        escape_html(or_na(&reading.availability)),
        escape_html(or_na(reading.measured_at.as_deref().unwrap_or(""))),
        escape_html(or_na(reading.address.as_deref().unwrap_or(""))),
        observed.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Sentence read aloud by the phone call.
pub fn call_message(station_id: &StationId) -> String {
    format!(
        "Alerta. Hay nueva carga de combustible disponible en el surtidor {}.",
        station_id
    )
}

/// Telegram message of the manual test alert.
pub fn test_alert_message(station_id: &StationId) -> String {
    format!(
        "🚨 <b>ALERTA DE PRUEBA</b> 🚨\n\n\
         📍 <b>Estación:</b> {}\n\n\
         <i>Esta es una alerta de prueba generada manualmente</i>",
        escape_html(station_id.as_str())
    )
}

/// Sentence read aloud by the manual test call.
pub fn test_call_message() -> String {
    "Alerta de prueba. Esto es una prueba del sistema de monitoreo de combustible.".to_string()
}

fn start_message(stations: &[StationId], interval_secs: u64, now: DateTime<Local>) -> String {
    format!(
        "🔄 <b>MONITOREO INICIADO</b>\n\n\
         Estoy monitoreando {} cada {}.\n\
         Recibirás una notificación y una llamada cuando haya una nueva carga.\n\n\
         <i>Iniciado el {}</i>",
        station_list(stations),
        describe_interval(interval_secs),
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

fn stop_message(stations: &[StationId]) -> String {
    format!(
        "⛔ <b>MONITOREO DETENIDO</b>\n\nEl monitoreo de {} ha sido detenido.",
        station_list(stations)
    )
}

fn station_list(stations: &[StationId]) -> String {
    let names = stations
        .iter()
        .map(|id| format!("<b>{}</b>", escape_html(id.as_str())))
        .collect::<Vec<_>>()
        .join(", ");

    if stations.len() == 1 {
        format!("el surtidor {}", names)
    } else {
        format!("los surtidores {}", names)
    }
}

fn describe_interval(secs: u64) -> String {
    if secs % 60 == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minuto".to_string()
        } else {
            format!("{} minutos", minutes)
        }
    } else {
        format!("{} segundos", secs)
    }
}

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() { "N/A" } else { value }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor_types::{CallResolution, NormalizedState, StationReading};
    use async_trait::async_trait;
    use notification_services::{CallOutcome, NotificationError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTelegram {
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TelegramSender for RecordingTelegram {
        async fn send_message(&self, message: &str) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push(message.to_string());
            if self.fail {
                Err(NotificationError::TelegramTransport("connection reset".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CountingCaller {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PhoneCaller for CountingCaller {
        async fn call(&self, message: &str, language: &str) -> CallOutcome {
            self.calls
                .lock()
                .unwrap()
                .push((message.to_string(), language.to_string()));
            CallOutcome::Success
        }
    }

    fn event() -> ChangeEvent {
        ChangeEvent {
            station_id: StationId::new("CHACO"),
            from_state: NormalizedState::NoStock,
            to_state: NormalizedState::LoadAvailable,
            observed_at: Utc::now(),
            reading: Some(StationReading {
                name: "BIOPETROL CHACO".into(),
                availability: "12.500 Lts.".into(),
                measured_at: Some("17:30".into()),
                address: Some("Av. Test 123".into()),
            }),
        }
    }

    fn dispatcher(telegram: Arc<RecordingTelegram>, caller: Arc<CountingCaller>) -> Dispatcher {
        Dispatcher::new(telegram, caller, CallRetryProtocol::default(), "es-ES-Standard-A")
    }

    #[tokio::test]
    async fn telegram_failure_does_not_block_call() {
        let telegram = Arc::new(RecordingTelegram {
            fail: true,
            ..Default::default()
        });
        let caller = Arc::new(CountingCaller::default());
        let dispatcher = dispatcher(telegram.clone(), caller.clone());
        let mut record = StationRecord::new(StationId::new("CHACO"));

        let result = dispatcher
            .dispatch(&event(), &mut record, &mut ShutdownSignal::never())
            .await;

        assert!(!result.telegram_sent);
        assert_eq!(result.call.resolution, CallResolution::Succeeded);
        assert_eq!(caller.calls.lock().unwrap().len(), 1);
        assert_eq!(telegram.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_stamps_record_and_uses_language() {
        let telegram = Arc::new(RecordingTelegram::default());
        let caller = Arc::new(CountingCaller::default());
        let dispatcher = dispatcher(telegram, caller.clone());
        let mut record = StationRecord::new(StationId::new("CHACO"));

        let result = dispatcher
            .dispatch(&event(), &mut record, &mut ShutdownSignal::never())
            .await;

        assert!(result.telegram_sent);
        assert!(result.succeeded());
        assert!(record.last_notified_at.is_some());
        assert_eq!(record.notifications_sent, 1);

        let calls = caller.calls.lock().unwrap();
        assert!(calls[0].0.contains("CHACO"));
        assert_eq!(calls[0].1, "es-ES-Standard-A");
    }

    #[test]
    fn alert_message_includes_station_details() {
        let message = alert_message(&event());
        assert!(message.contains("BIOPETROL CHACO"));
        assert!(message.contains("12.500 Lts."));
        assert!(message.contains("Av. Test 123"));
    }

    #[test]
    fn alert_message_without_reading_falls_back_to_id() {
        let mut event = event();
        event.reading = None;
        let message = alert_message(&event);
        assert!(message.contains("CHACO"));
        assert!(message.contains("N/A"));
    }

    #[test]
    fn test_alert_is_marked_as_test() {
        let message = test_alert_message(&StationId::new("ESTACION_TEST"));
        assert!(message.contains("PRUEBA"));
        assert!(message.contains("ESTACION_TEST"));
        assert!(test_call_message().starts_with("Alerta de prueba"));
    }

    #[test]
    fn notices_describe_stations_and_interval() {
        let stations = vec![StationId::new("CHACO"), StationId::new("FORMOSA")];
        let message = start_message(&stations, 300, Local::now());
        assert!(message.contains("los surtidores <b>CHACO</b>, <b>FORMOSA</b>"));
        assert!(message.contains("5 minutos"));
        assert!(stop_message(&stations[..1]).contains("el surtidor <b>CHACO</b>"));
    }
}
