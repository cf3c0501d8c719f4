//! # Station Monitor
//!
//! This crate watches fuel station availability and alerts operators when a
//! new load arrives. It polls each configured station on its own schedule,
//! normalizes the reported availability, detects the transition into
//! "load available" and dispatches a Telegram message plus a phone call.

/// Shared types for station monitoring
mod monitor_types;
pub use monitor_types::*;

/// Availability text classification
pub mod normalizer;

/// Edge-triggered state tracking per station
mod tracker;

/// Cooperative shutdown signal
pub mod shutdown;
pub use shutdown::{Shutdown, ShutdownSignal};

/// Channel and fetcher traits
pub mod notification_service;
pub use notification_service::{PhoneCaller, StatusFetcher, TelegramSender};

/// Mock channels for dry runs
pub mod mock_services;

/// Busy-line retry around phone calls
pub mod call_retry;
pub use call_retry::CallRetryProtocol;

/// Alert fan-out to Telegram and phone
pub mod dispatcher;
pub use dispatcher::Dispatcher;

/// Biopetrol station page client
pub mod biopetrol_client;
pub use biopetrol_client::BiopetrolClient;

/// Per-station poll loops
pub mod scheduler;
pub use scheduler::{PollScheduler, SchedulerConfig};

/// Environment and command-line configuration
pub mod config;
pub use config::{ConfigOverrides, MonitorConfig};
