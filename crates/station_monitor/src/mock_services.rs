use async_trait::async_trait;
use notification_services::{CallOutcome, NotificationError};
use tracing::info;

use crate::notification_service::{PhoneCaller, TelegramSender};

/// Mock Telegram channel for dry runs
pub struct MockTelegramSender;

#[async_trait]
impl TelegramSender for MockTelegramSender {
    async fn send_message(&self, message: &str) -> Result<(), NotificationError> {
        info!("💬 [MOCK TELEGRAM] Message:\n{}", message);
        Ok(())
    }
}

/// Mock phone channel for dry runs
pub struct MockPhoneCaller;

#[async_trait]
impl PhoneCaller for MockPhoneCaller {
    async fn call(&self, message: &str, language: &str) -> CallOutcome {
        info!("📞 [MOCK CALL] ({}) {}", language, message);
        CallOutcome::Success
    }
}
