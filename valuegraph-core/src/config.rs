//! Runtime configuration.
//!
//! [`GraphConfig`] carries the two timing knobs of the engine:
//! - `scan_interval`: pause between scan ticks (default 200ms)
//! - `update_deadline`: per-update deadline after which a node's
//!   cancellation signal fires on its own (default 10s)

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest scan interval the loop will sleep for.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(1);

/// Timing configuration shared by the graph and the scan loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Pause between the end of one scan tick and the start of the next.
    ///
    /// Clamped to [`MIN_SCAN_INTERVAL`] by [`GraphConfig::scan_interval_clamped`].
    pub scan_interval: Duration,

    /// Deadline applied to each node update, measured from the moment the
    /// node's computation starts.
    pub update_deadline: Duration,
}

impl GraphConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// ```
    /// use std::time::Duration;
    /// use valuegraph_core::GraphConfig;
    ///
    /// let cfg = GraphConfig::from_json(r#"{"scan_interval":{"secs":1,"nanos":0}}"#).unwrap();
    /// assert_eq!(cfg.scan_interval, Duration::from_secs(1));
    /// assert_eq!(cfg.update_deadline, Duration::from_secs(10));
    /// ```
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the scan interval.
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Sets the per-update deadline.
    pub fn with_update_deadline(mut self, deadline: Duration) -> Self {
        self.update_deadline = deadline;
        self
    }

    /// Scan interval with a floor of [`MIN_SCAN_INTERVAL`].
    #[inline]
    pub fn scan_interval_clamped(&self) -> Duration {
        self.scan_interval.max(MIN_SCAN_INTERVAL)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(200),
            update_deadline: Duration::from_secs(10),
        }
    }
}
