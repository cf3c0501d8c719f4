use std::fmt;

use chrono::{DateTime, Utc};
use notification_services::CallOutcome;
use serde::{Deserialize, Serialize};

/// Identifier of a monitored station, as typed by the operator (e.g. `CHACO`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    /// Create a station id, trimming surrounding whitespace.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// The id as typed.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a station name printed on the page refers to this station.
    pub fn matches_name(&self, name: &str) -> bool {
        !self.0.is_empty() && name.to_uppercase().contains(&self.0.to_uppercase())
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Semantic availability state of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedState {
    /// The station reports no fuel.
    NoStock,
    /// The station reports fuel available.
    LoadAvailable,
    /// Nothing usable was read.
    Unknown,
}

impl fmt::Display for NormalizedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedState::NoStock => write!(f, "no stock"),
            NormalizedState::LoadAvailable => write!(f, "load available"),
            NormalizedState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Raw data extracted for one station from the listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationReading {
    /// Station name as printed on the page
    pub name: String,
    /// Availability column text (e.g. `12.500 Lts.`)
    pub availability: String,
    /// Time the station last reported its level
    pub measured_at: Option<String>,
    /// Street address
    pub address: Option<String>,
}

/// Result of normalising one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Classified state
    pub state: NormalizedState,
    /// Set when the fetch itself failed, as opposed to unreadable text
    pub fetch_failed: bool,
    /// The reading behind the state, absent on fetch failure
    pub reading: Option<StationReading>,
}

impl Observation {
    /// Observation for a failed fetch.
    pub fn fetch_failure() -> Self {
        Self {
            state: NormalizedState::Unknown,
            fetch_failed: true,
            reading: None,
        }
    }
}

/// Per-station tracking state, owned by that station's poll task.
#[derive(Debug, Clone, Serialize)]
pub struct StationRecord {
    /// Station being tracked
    pub id: StationId,
    /// Last state read from a successful fetch
    pub last_known_state: NormalizedState,
    /// When the station was last polled, successful or not
    pub last_checked_at: Option<DateTime<Utc>>,
    /// When a notification was last dispatched
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Fetch failures since the last successful fetch
    pub consecutive_fetch_failures: u32,
    /// Number of change events dispatched during this run
    pub notifications_sent: u32,
}

impl StationRecord {
    /// Fresh record; starts Unknown so a station already loaded at startup is reported.
    pub fn new(id: StationId) -> Self {
        Self {
            id,
            last_known_state: NormalizedState::Unknown,
            last_checked_at: None,
            last_notified_at: None,
            consecutive_fetch_failures: 0,
            notifications_sent: 0,
        }
    }
}

/// Edge-triggered transition into `LoadAvailable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    /// Station that changed
    pub station_id: StationId,
    /// State before the transition
    pub from_state: NormalizedState,
    /// State after the transition (always `LoadAvailable`)
    pub to_state: NormalizedState,
    /// When the transition was observed
    pub observed_at: DateTime<Utc>,
    /// Page data that triggered the event
    pub reading: Option<StationReading>,
}

/// One request to the phone-call primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallAttempt {
    /// 1-based attempt number
    pub attempt_number: u32,
    /// What the call primitive returned
    pub outcome: CallOutcome,
    /// When the attempt completed
    pub timestamp: DateTime<Utc>,
}

/// Terminal state of the call retry protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResolution {
    /// A call went through.
    Succeeded,
    /// Retry budget spent on busy lines, or a hard error.
    Exhausted,
    /// Shutdown arrived while waiting to retry.
    Aborted,
}

/// Ordered attempts of one call dispatch and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallReport {
    /// Attempts in the order they were made
    pub attempts: Vec<CallAttempt>,
    /// Terminal state
    pub resolution: CallResolution,
}

impl CallReport {
    /// Outcome of the last attempt, if any attempt was made.
    pub fn final_outcome(&self) -> Option<&CallOutcome> {
        self.attempts.last().map(|attempt| &attempt.outcome)
    }

    /// Whether the call eventually went through.
    pub fn succeeded(&self) -> bool {
        self.resolution == CallResolution::Succeeded
    }
}

/// Summary of one notification dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    /// Station the alert was about
    pub station_id: StationId,
    /// Whether the Telegram alert was accepted
    pub telegram_sent: bool,
    /// Phone call attempts and resolution
    pub call: CallReport,
}

impl DispatchResult {
    /// Whether the phone channel reached the operator.
    pub fn succeeded(&self) -> bool {
        self.call.succeeded()
    }
}

/// Errors raised while fetching a station's status.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure, including timeouts
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("HTTP {0} from station page")]
    Status(u16),

    /// The page contained no station cards
    #[error("No station cards found on page")]
    EmptyPage,

    /// The requested station is not listed
    #[error("Station '{0}' not listed on page")]
    StationNotFound(String),
}

/// Errors surfaced by the monitor outside of a single poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Invalid or missing configuration; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// A notification channel could not be set up
    #[error("Notification channel error: {0}")]
    Notification(#[from] notification_services::NotificationError),
}
