use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// Transport flavour being simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Window-limited sender with slow-start growth and multiplicative backoff.
    #[default]
    Tcp,
    /// Fixed-rate sender that never adapts.
    Udp,
}

impl Protocol {
    pub fn toggled(self) -> Self {
        match self {
            Protocol::Tcp => Protocol::Udp,
            Protocol::Udp => Protocol::Tcp,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// Per-tick inputs of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Configured send rate in packets per interval.
    pub packet_rate: u32,
    /// Packets the link can carry per interval.
    pub network_capacity: u32,
    pub protocol: Protocol,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            packet_rate: 50,
            network_capacity: 100,
            protocol: Protocol::Tcp,
        }
    }
}

impl SimConfig {
    pub fn new(packet_rate: u32, network_capacity: u32, protocol: Protocol) -> Self {
        Self {
            packet_rate,
            network_capacity,
            protocol,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_rate == 0 {
            return Err(ConfigError::invalid("packet_rate", "must be at least 1"));
        }
        if self.network_capacity == 0 {
            return Err(ConfigError::invalid(
                "network_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// AIMD constants applied to the TCP window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionPolicy {
    /// Additive growth per tick without overload.
    pub increase_step: u32,
    /// Multiplicative factor applied to the window on overload.
    pub decrease_factor: f64,
}

impl Default for CongestionPolicy {
    fn default() -> Self {
        Self {
            increase_step: 1,
            decrease_factor: 0.7,
        }
    }
}

impl CongestionPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.increase_step == 0 {
            return Err(ConfigError::invalid("increase_step", "must be at least 1"));
        }
        if !self.decrease_factor.is_finite()
            || self.decrease_factor <= 0.0
            || self.decrease_factor >= 1.0
        {
            return Err(ConfigError::invalid(
                "decrease_factor",
                format!("must lie in (0, 1), got {}", self.decrease_factor),
            ));
        }
        Ok(())
    }
}

/// Utilization percentages at which the link changes status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilizationThresholds {
    /// Lower bound (inclusive) of the warning band.
    pub warning: f64,
    /// Lower bound (inclusive) of the congested band.
    pub congested: f64,
}

impl Default for UtilizationThresholds {
    fn default() -> Self {
        Self {
            warning: 60.0,
            congested: 85.0,
        }
    }
}

impl UtilizationThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.warning.is_finite() || !self.congested.is_finite() {
            return Err(ConfigError::invalid("thresholds", "must be finite"));
        }
        if self.warning < 0.0 || self.warning > self.congested {
            return Err(ConfigError::invalid(
                "thresholds",
                format!(
                    "expected 0 <= warning <= congested, got warning={} congested={}",
                    self.warning, self.congested
                ),
            ));
        }
        Ok(())
    }
}

/// Engine tunables that do not change while a simulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Wall-clock period between ticks while running.
    pub tick_interval_ms: u64,
    /// Number of samples kept for charting.
    pub history_capacity: usize,
    pub policy: CongestionPolicy,
    pub thresholds: UtilizationThresholds,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            history_capacity: 8,
            policy: CongestionPolicy::default(),
            thresholds: UtilizationThresholds::default(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "tick_interval_ms",
                "must be at least 1",
            ));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::invalid(
                "history_capacity",
                "must be at least 1",
            ));
        }
        self.policy.validate()?;
        self.thresholds.validate()
    }
}

/// On-disk layout of a lab configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub simulation: SimConfig,
    pub engine: EngineSettings,
}

impl LabConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulation.validate()?;
        self.engine.validate()
    }
}
