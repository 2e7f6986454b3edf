//! Alert fatigue suppression
//!
//! Tracks admitted alerts per `(node_id, metric_name)` source over a sliding
//! window. Once a source has `threshold` admitted alerts inside the window,
//! further occurrences are muted until the oldest one slides out. Muted
//! occurrences are not counted, so a sustained breach is rate-limited rather
//! than silenced.

use super::alert::Alert;
use crate::models::serde_secs;
use crate::store::ConcurrentStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_FATIGUE_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FATIGUE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// Alerts admitted per window before suppression starts
    pub threshold: u32,
    #[serde(with = "serde_secs")]
    pub window: Duration,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FATIGUE_THRESHOLD,
            window: DEFAULT_FATIGUE_WINDOW,
        }
    }
}

/// Point-in-time view of one source's window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FatigueCounter {
    /// Alerts admitted inside the current window
    pub count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct SourceWindow {
    admitted: VecDeque<DateTime<Utc>>,
    last_seen: DateTime<Utc>,
}

impl SourceWindow {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            admitted: VecDeque::new(),
            last_seen: at,
        }
    }

    fn slide(&mut self, at: DateTime<Utc>, window: chrono::Duration) {
        while self
            .admitted
            .front()
            .is_some_and(|first| at.signed_duration_since(*first) >= window)
        {
            self.admitted.pop_front();
        }
    }

    fn counter(&self) -> FatigueCounter {
        FatigueCounter {
            count: u32::try_from(self.admitted.len()).unwrap_or(u32::MAX),
            first_seen: self.admitted.front().copied().unwrap_or(self.last_seen),
            last_seen: self.last_seen,
        }
    }
}

type SourceKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct FatigueReducer {
    config: FatigueConfig,
    windows: ConcurrentStore<SourceKey, SourceWindow>,
}

impl FatigueReducer {
    pub fn new(config: FatigueConfig) -> Self {
        Self {
            config,
            windows: ConcurrentStore::new(),
        }
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.window).unwrap_or_else(|_| chrono::Duration::zero())
    }

    /// Record an occurrence and decide whether it should be muted.
    ///
    /// The alert's creation time is the observation time.
    pub fn should_suppress(&self, alert: &Alert) -> bool {
        let at = alert.created_at;
        let window = self.window();
        let threshold = usize::try_from(self.config.threshold).unwrap_or(usize::MAX);

        let (suppress, admitted) = self.windows.upsert(
            alert.source_key(),
            || SourceWindow::new(at),
            |source| {
                source.slide(at, window);
                source.last_seen = source.last_seen.max(at);
                if source.admitted.len() >= threshold {
                    (true, source.admitted.len())
                } else {
                    source.admitted.push_back(at);
                    (false, source.admitted.len())
                }
            },
        );

        if suppress {
            debug!(
                node_id = %alert.node_id,
                metric = %alert.metric_name,
                admitted = admitted,
                "Suppressing repetitive alert"
            );
        }
        suppress
    }

    pub fn counter(&self, node_id: &str, metric_name: &str) -> Option<FatigueCounter> {
        self.windows
            .get(&(node_id.to_string(), metric_name.to_string()))
            .map(|source| source.counter())
    }

    /// Drop sources that have been quiet for a full window
    pub fn prune(&self, now: DateTime<Utc>) {
        let window = self.window();
        self.windows
            .retain(|_, source| now.signed_duration_since(source.last_seen) < window);
    }

    pub fn tracked_sources(&self) -> usize {
        self.windows.len()
    }
}
