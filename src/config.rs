use std::time::Duration;

/// Timing knobs for a watch session, with tunable thresholds.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Focused time required before the reward unlocks
    pub target_duration: Duration,

    /// Poll cadence of the focus accumulator
    pub poll_interval: Duration,

    /// Largest tick delta accepted as genuine focused time; a delta at or
    /// above this is a suspend/backgrounding gap and is discarded
    pub slack_bound: Duration,

    /// Countdown before navigating to the subject's destination link after a
    /// credited completion
    pub redirect_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            target_duration: Duration::from_secs(35),
            poll_interval: Duration::from_millis(200),
            slack_bound: Duration::from_millis(1500),
            redirect_delay: Duration::from_secs(5),
        }
    }
}

impl WatchConfig {
    pub fn target_ms(&self) -> u64 {
        self.target_duration.as_millis() as u64
    }

    pub fn slack_ms(&self) -> u64 {
        self.slack_bound.as_millis() as u64
    }
}
