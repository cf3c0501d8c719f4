//! Bounded, fixed-delay retry around the phone-call primitive.
//!
//! Only a busy line is considered transient. Any other failure ends the
//! protocol immediately so a broken setup does not burn the call budget.

use std::time::Duration;

use chrono::Utc;
use notification_services::CallOutcome;
use tracing::{error, info, warn};

use crate::monitor_types::{CallAttempt, CallReport, CallResolution};
use crate::notification_service::PhoneCaller;
use crate::shutdown::ShutdownSignal;

/// Retry settings for one call dispatch.
#[derive(Debug, Clone)]
pub struct CallRetryProtocol {
    /// Total attempt budget; 0 behaves like 1
    pub max_retries: u32,
    /// Fixed wait between a busy attempt and the next one
    pub retry_delay: Duration,
}

impl Default for CallRetryProtocol {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

impl CallRetryProtocol {
    /// Create a protocol with the given budget and delay.
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Call until success, a hard error, an exhausted budget or shutdown.
    pub async fn call_with_retry(
        &self,
        caller: &dyn PhoneCaller,
        message: &str,
        language: &str,
        shutdown: &mut ShutdownSignal,
    ) -> CallReport {
        let mut attempts = Vec::new();
        let mut attempt_number = 1;

        loop {
            let outcome = caller.call(message, language).await;
            attempts.push(CallAttempt {
                attempt_number,
                outcome: outcome.clone(),
                timestamp: Utc::now(),
            });

            match outcome {
                CallOutcome::Success => {
                    info!("Call placed on attempt {}", attempt_number);
                    return CallReport {
                        attempts,
                        resolution: CallResolution::Succeeded,
                    };
                }
                CallOutcome::Error(reason) => {
                    error!("Call failed on attempt {}: {}", attempt_number, reason);
                    return CallReport {
                        attempts,
                        resolution: CallResolution::Exhausted,
                    };
                }
                CallOutcome::Busy if attempt_number >= self.max_retries => {
                    warn!(
                        "Line busy on attempt {}, no retries left",
                        attempt_number
                    );
                    return CallReport {
                        attempts,
                        resolution: CallResolution::Exhausted,
                    };
                }
                CallOutcome::Busy => {
                    warn!(
                        "Line busy, retrying in {} seconds (attempt {}/{})",
                        self.retry_delay.as_secs(),
                        attempt_number,
                        self.max_retries
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = shutdown.triggered() => {
                    warn!(
                        "Shutdown while waiting to retry call; alert \"{}\" was not answered",
                        message
                    );
                    return CallReport {
                        attempts,
                        resolution: CallResolution::Aborted,
                    };
                }
            }

            attempt_number += 1;
        }
    }
}
