use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::monitor_types::{ChangeEvent, NormalizedState, Observation, StationRecord};

impl StationRecord {
    /// Fold one observation into the record.
    ///
    /// Returns a [`ChangeEvent`] only on a transition into `LoadAvailable`.
    /// Fetch failures leave `last_known_state` alone so they can neither hide
    /// nor fabricate a transition; `last_checked_at` is always refreshed.
    pub fn observe(&mut self, observation: Observation, now: DateTime<Utc>) -> Option<ChangeEvent> {
        self.last_checked_at = Some(now);

        if observation.fetch_failed {
            self.consecutive_fetch_failures += 1;
            debug!(
                "[{}] fetch failed ({} in a row), keeping state {}",
                self.id, self.consecutive_fetch_failures, self.last_known_state
            );
            return None;
        }

        self.consecutive_fetch_failures = 0;
        let previous = self.last_known_state;
        let current = observation.state;

        if current == NormalizedState::LoadAvailable && previous != NormalizedState::LoadAvailable {
            self.last_known_state = current;
            info!("[{}] state change: {} -> {}", self.id, previous, current);

            return Some(ChangeEvent {
                station_id: self.id.clone(),
                from_state: previous,
                to_state: current,
                observed_at: now,
                reading: observation.reading,
            });
        }

        if previous != current {
            info!("[{}] state change: {} -> {}", self.id, previous, current);
        }
        self.last_known_state = current;
        None
    }
}
