use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info};

use crate::types::{NotificationError, TelegramConfig};

/// Client for the Telegram Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    config: TelegramConfig,
}

/// Envelope returned by every Bot API call.
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramClient {
    /// Create a new Telegram client.
    pub fn new(config: TelegramConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotificationError::TelegramTransport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create a client from `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`.
    pub fn from_env() -> Result<Self, NotificationError> {
        Self::new(TelegramConfig::from_env()?)
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    /// Send an HTML-formatted message to the configured chat.
    pub async fn send_message(&self, text: &str) -> Result<(), NotificationError> {
        let params = [
            ("chat_id", self.config.chat_id.as_str()),
            ("text", text),
            ("parse_mode", "HTML"),
        ];

        let response = self
            .client
            .post(self.send_message_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| NotificationError::TelegramTransport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotificationError::TelegramTransport(e.to_string()))?;

        match interpret_response(status.as_u16(), &body) {
            Ok(()) => {
                info!("Telegram message delivered to chat {}", self.config.chat_id);
                Ok(())
            }
            Err(e) => {
                error!("Telegram rejected message: {}", e);
                Err(e)
            }
        }
    }
}

/// Map a Bot API response onto success or a `TelegramApi` error.
fn interpret_response(status: u16, body: &str) -> Result<(), NotificationError> {
    let parsed: Option<TelegramResponse> = serde_json::from_str(body).ok();

    match parsed {
        Some(TelegramResponse { ok: true, .. }) if (200..300).contains(&status) => Ok(()),
        Some(TelegramResponse { description, .. }) => Err(NotificationError::TelegramApi {
            status,
            description: description.unwrap_or_else(|| "no description".to_string()),
        }),
        None => Err(NotificationError::TelegramApi {
            status,
            description: body.chars().take(200).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TelegramClient {
        TelegramClient::new(TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "-100".to_string(),
            api_base_url: "https://api.telegram.org/".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn builds_send_message_url() {
        assert_eq!(
            client().send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn accepts_ok_response() {
        assert!(interpret_response(200, r#"{"ok":true,"result":{}}"#).is_ok());
    }

    #[test]
    fn surfaces_api_description() {
        let err = interpret_response(400, r#"{"ok":false,"description":"chat not found"}"#)
            .unwrap_err();
        match err {
            NotificationError::TelegramApi {
                status,
                description,
            } => {
                assert_eq!(status, 400);
                assert_eq!(description, "chat not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_json_body_is_an_error() {
        assert!(interpret_response(502, "<html>Bad Gateway</html>").is_err());
    }
}
