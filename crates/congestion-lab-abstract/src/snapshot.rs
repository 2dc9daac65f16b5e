use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SimConfig;

/// Operating state of the link derived from its utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    #[default]
    Normal,
    Warning,
    Congested,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Normal => f.write_str("Normal"),
            LinkStatus::Warning => f.write_str("Warning"),
            LinkStatus::Congested => f.write_str("Congested"),
        }
    }
}

/// Lifecycle of the tick source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    #[default]
    Idle,
    Running,
    Paused,
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockState::Idle => f.write_str("IDLE"),
            ClockState::Running => f.write_str("RUNNING"),
            ClockState::Paused => f.write_str("PAUSED"),
        }
    }
}

/// One point of the throughput/loss time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Simulated time of the tick that produced the sample.
    pub timestamp_ms: u64,
    /// Packets delivered during that tick.
    pub throughput: u64,
    /// Packets dropped since the last reset.
    pub loss: u64,
}

/// Consistent copy of everything a presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sent_total: u64,
    pub delivered_total: u64,
    pub dropped_total: u64,
    /// `None` when the protocol has no congestion window.
    pub window_size: Option<u32>,
    pub status: LinkStatus,
    /// Configured rate over capacity, in percent.
    pub utilization: f64,
    pub clock: ClockState,
    pub ticks: u64,
    pub config: SimConfig,
    /// Oldest first.
    pub samples: Vec<Sample>,
}

impl Snapshot {
    pub fn latest_sample(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Fraction of sent packets that were dropped, 0 when nothing was sent.
    pub fn loss_ratio(&self) -> f64 {
        if self.sent_total == 0 {
            0.0
        } else {
            self.dropped_total as f64 / self.sent_total as f64
        }
    }
}
