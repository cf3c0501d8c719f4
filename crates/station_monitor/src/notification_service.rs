use async_trait::async_trait;
use notification_services::{CallMeBotClient, CallOutcome, NotificationError, TelegramClient};

use crate::monitor_types::{FetchError, StationId, StationReading};

/// Trait for station status sources
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Read the current availability data of one station.
    async fn fetch(&self, station_id: &StationId) -> Result<StationReading, FetchError>;
}

/// Trait for instant-message alert channels
#[async_trait]
pub trait TelegramSender: Send + Sync {
    /// Deliver one message to the operators' chat.
    async fn send_message(&self, message: &str) -> Result<(), NotificationError>;
}

/// Trait for voice-call alert channels
#[async_trait]
pub trait PhoneCaller: Send + Sync {
    /// Place one call reading `message` aloud in `language`.
    async fn call(&self, message: &str, language: &str) -> CallOutcome;
}

#[async_trait]
impl TelegramSender for TelegramClient {
    async fn send_message(&self, message: &str) -> Result<(), NotificationError> {
        TelegramClient::send_message(self, message).await
    }
}

#[async_trait]
impl PhoneCaller for CallMeBotClient {
    async fn call(&self, message: &str, language: &str) -> CallOutcome {
        CallMeBotClient::call(self, message, language).await
    }
}
