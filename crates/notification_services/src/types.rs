use serde::Serialize;
use std::fmt;

/// Errors raised by the notification channels.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// A required setting is missing from the environment.
    #[error("Missing configuration: {0} is not set")]
    MissingConfig(&'static str),

    /// The HTTP request to Telegram failed before a response was received.
    #[error("Telegram request failed: {0}")]
    TelegramTransport(String),

    /// Telegram answered but refused the message.
    #[error("Telegram API error ({status}): {description}")]
    TelegramApi {
        /// HTTP status returned by the Bot API.
        status: u16,
        /// Error description returned by the Bot API.
        description: String,
    },

    /// The HTTP request to CallMeBot failed before a response was received.
    #[error("CallMeBot request failed: {0}")]
    CallTransport(String),
}

/// Result of a single phone-call request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CallOutcome {
    /// The call was placed.
    Success,
    /// The destination line is occupied; worth retrying later.
    Busy,
    /// Any non-transient failure (network, auth, rejected request).
    Error(String),
}

impl CallOutcome {
    /// Whether this outcome is the transient busy condition.
    pub fn is_busy(&self) -> bool {
        matches!(self, CallOutcome::Busy)
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Success => write!(f, "success"),
            CallOutcome::Busy => write!(f, "busy"),
            CallOutcome::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Credentials for the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub bot_token: String,
    /// Chat (user or group) receiving the alerts.
    pub chat_id: String,
    /// Base URL of the Bot API, overridable for tests.
    pub api_base_url: String,
}

impl TelegramConfig {
    /// Default Bot API endpoint.
    pub const DEFAULT_API_BASE_URL: &'static str = "https://api.telegram.org";

    /// Load credentials from `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`.
    pub fn from_env() -> Result<Self, NotificationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load credentials through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotificationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = required(&lookup, "TELEGRAM_BOT_TOKEN")?;
        let chat_id = required(&lookup, "TELEGRAM_CHAT_ID")?;

        Ok(Self {
            bot_token,
            chat_id,
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
        })
    }
}

/// Settings for the CallMeBot voice-call API.
#[derive(Debug, Clone)]
pub struct CallMeBotConfig {
    /// Telegram username (with `@`) or phone number registered with CallMeBot.
    pub user: String,
    /// Endpoint that starts a call.
    pub api_url: String,
    /// How many times CallMeBot repeats the text within one call.
    pub repeat: u8,
}

impl CallMeBotConfig {
    /// Default call endpoint.
    pub const DEFAULT_API_URL: &'static str = "http://api.callmebot.com/start.php";

    /// Load settings from `CALLMEBOT_USER`.
    pub fn from_env() -> Result<Self, NotificationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotificationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = required(&lookup, "CALLMEBOT_USER")?;

        Ok(Self {
            user,
            api_url: Self::DEFAULT_API_URL.to_string(),
            repeat: 2,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, NotificationError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(NotificationError::MissingConfig(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn telegram_config_requires_both_keys() {
        let env: HashMap<&str, &str> = [("TELEGRAM_BOT_TOKEN", "123:abc")].into();
        let result = TelegramConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert!(matches!(
            result,
            Err(NotificationError::MissingConfig("TELEGRAM_CHAT_ID"))
        ));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let result = CallMeBotConfig::from_lookup(|_| Some("   ".to_string()));
        assert!(matches!(
            result,
            Err(NotificationError::MissingConfig("CALLMEBOT_USER"))
        ));
    }

    #[test]
    fn call_outcome_serializes_with_reason() {
        let json = serde_json::to_value(CallOutcome::Error("401".into())).unwrap();
        assert_eq!(json["outcome"], "error");
        assert_eq!(json["reason"], "401");
    }
}
