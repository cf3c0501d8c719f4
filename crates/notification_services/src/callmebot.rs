use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::types::{CallMeBotConfig, CallOutcome, NotificationError};

/// Client for the CallMeBot voice-call API.
///
/// CallMeBot answers every request with a short HTML/text page; whether the
/// call went through has to be read from that text.
#[derive(Debug, Clone)]
pub struct CallMeBotClient {
    client: Client,
    config: CallMeBotConfig,
}

impl CallMeBotClient {
    /// Create a new CallMeBot client.
    pub fn new(config: CallMeBotConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| NotificationError::CallTransport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create a client from `CALLMEBOT_USER`.
    pub fn from_env() -> Result<Self, NotificationError> {
        Self::new(CallMeBotConfig::from_env()?)
    }

    /// Ask CallMeBot to call the configured user and read `message` aloud.
    pub async fn call(&self, message: &str, language: &str) -> CallOutcome {
        info!("Requesting CallMeBot call to {}", self.config.user);

        let repeat = self.config.repeat.to_string();
        let params = [
            ("user", self.config.user.as_str()),
            ("text", message),
            ("lang", language),
            ("rpt", repeat.as_str()),
        ];

        let response = match self
            .client
            .get(&self.config.api_url)
            .query(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("CallMeBot request failed: {}", e);
                return CallOutcome::Error(NotificationError::CallTransport(e.to_string()).to_string());
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return CallOutcome::Error(format!("unreadable response: {}", e)),
        };

        debug!("CallMeBot responded {}: {}", status, body.trim());
        classify_call_response(status, &body)
    }
}

const BUSY_MARKERS: &[&str] = &["busy", "ocupad", "in progress", "try again later"];
const ERROR_MARKERS: &[&str] = &[
    "error",
    "invalid",
    "not authorized",
    "not authorised",
    "unauthorized",
    "not allowed",
    "blocked",
];

/// Classify a CallMeBot response into success, busy line or hard error.
///
/// Busy markers win over error markers: CallMeBot reports an occupied line
/// with wording such as "Error: line busy".
pub fn classify_call_response(status: u16, body: &str) -> CallOutcome {
    let text = body.to_lowercase();

    if BUSY_MARKERS.iter().any(|marker| text.contains(marker)) {
        return CallOutcome::Busy;
    }

    if !(200..300).contains(&status) {
        return CallOutcome::Error(format!("HTTP {}", status));
    }

    if ERROR_MARKERS.iter().any(|marker| text.contains(marker)) {
        let summary: String = body.trim().chars().take(160).collect();
        return CallOutcome::Error(summary);
    }

    CallOutcome::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_call_is_success() {
        assert_eq!(
            classify_call_response(200, "Call queued successfully"),
            CallOutcome::Success
        );
    }

    #[test]
    fn busy_line_is_transient() {
        assert_eq!(
            classify_call_response(200, "Line busy, try again later"),
            CallOutcome::Busy
        );
        assert_eq!(
            classify_call_response(200, "Error: the line is BUSY"),
            CallOutcome::Busy
        );
    }

    #[test]
    fn auth_failure_is_error() {
        let outcome = classify_call_response(200, "Error: user not authorized. Send /start");
        assert!(matches!(outcome, CallOutcome::Error(_)));
    }

    #[test]
    fn http_failure_is_error() {
        assert_eq!(
            classify_call_response(503, "Service Unavailable"),
            CallOutcome::Error("HTTP 503".to_string())
        );
    }
}
