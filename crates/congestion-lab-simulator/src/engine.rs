use congestion_lab_abstract::{
    ConfigError, EngineSettings, LinkStatus, Protocol, Sample, SimConfig, Snapshot,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classifier::UtilizationClassifier;
use crate::clock::SimulationClock;
use crate::controller::{CongestionController, StepOutcome};
use crate::metrics::MetricsBuffer;

/// Mutable counters of a run. Only [`Simulation::tick`] advances them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationState {
    pub sent_total: u64,
    pub delivered_total: u64,
    pub dropped_total: u64,
    /// Congestion window; frozen while the protocol is UDP.
    pub window_size: u32,
    pub running: bool,
    pub ticks: u64,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            sent_total: 0,
            delivered_total: 0,
            dropped_total: 0,
            window_size: 1,
            running: false,
            ticks: 0,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub protocol: Protocol,
    pub outcome: StepOutcome,
    pub sample: Sample,
    pub status: LinkStatus,
}

/// Result of [`Simulation::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigChange {
    pub previous: SimConfig,
    /// The protocol changed, so the run was reset.
    pub reset: bool,
}

/// The simulation core: configuration, clock lifecycle, counters and history.
///
/// Single-owner; [`crate::service::SimulationService`] shares it between a
/// ticking task and readers.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimConfig,
    settings: EngineSettings,
    controller: CongestionController,
    classifier: UtilizationClassifier,
    clock: SimulationClock,
    state: SimulationState,
    metrics: MetricsBuffer,
    status: LinkStatus,
    utilization: f64,
}

impl Simulation {
    pub fn new(config: SimConfig, settings: EngineSettings) -> Result<Self, ConfigError> {
        config.validate()?;
        settings.validate()?;

        let classifier = UtilizationClassifier::new(settings.thresholds);
        let utilization =
            UtilizationClassifier::utilization(config.packet_rate, config.network_capacity)?;

        Ok(Self {
            config,
            settings,
            controller: CongestionController::new(settings.policy),
            classifier,
            clock: SimulationClock::new(Duration::from_millis(settings.tick_interval_ms)),
            state: SimulationState::default(),
            metrics: MetricsBuffer::new(settings.history_capacity),
            status: classifier.status_for(utilization),
            utilization,
        })
    }

    pub fn with_config(config: SimConfig) -> Result<Self, ConfigError> {
        Self::new(config, EngineSettings::default())
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn metrics(&self) -> &MetricsBuffer {
        &self.metrics
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Replace the configuration. Invalid input leaves everything untouched.
    ///
    /// Switching protocol resets the run so the window and counters restart
    /// under the new policy. Lowering the rate below the current window clamps
    /// the window.
    pub fn configure(&mut self, config: SimConfig) -> Result<ConfigChange, ConfigError> {
        if let Err(err) = config.validate() {
            warn!("Rejected configuration {:?}: {}", config, err);
            return Err(err);
        }
        let utilization =
            UtilizationClassifier::utilization(config.packet_rate, config.network_capacity)?;

        let previous = std::mem::replace(&mut self.config, config);
        self.utilization = utilization;
        self.status = self.classifier.status_for(utilization);
        info!(
            "Configured {}: rate={} capacity={} ({:.1}% utilization, {})",
            config.protocol, config.packet_rate, config.network_capacity, utilization, self.status
        );

        let protocol_changed = previous.protocol != config.protocol;
        if protocol_changed {
            info!(
                "Protocol switched from {} to {}, resetting",
                previous.protocol, config.protocol
            );
            self.reset();
        } else if self.state.window_size > config.packet_rate {
            debug!(
                "Clamping window {} to new packet rate {}",
                self.state.window_size, config.packet_rate
            );
            self.state.window_size = config.packet_rate;
        }

        Ok(ConfigChange {
            previous,
            reset: protocol_changed,
        })
    }

    /// Returns the epoch of the new run, `None` when already running.
    pub fn start(&mut self) -> Option<u64> {
        let epoch = self.clock.start()?;
        self.state.running = true;
        info!("Simulation started (epoch {})", epoch);
        Some(epoch)
    }

    pub fn pause(&mut self) -> bool {
        if !self.clock.pause() {
            return false;
        }
        self.state.running = false;
        info!("Simulation paused after {} ticks", self.state.ticks);
        true
    }

    /// Back to the zero state: idle clock, zero counters, window 1, no samples.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.state = SimulationState::default();
        self.metrics.clear();
        info!("Simulation reset");
    }

    /// Advance one interval.
    pub fn tick(&mut self) -> Result<TickReport, ConfigError> {
        let protocol = self.config.protocol;
        let outcome = self.controller.step(
            protocol,
            self.config.packet_rate,
            self.config.network_capacity,
            self.state.window_size,
        )?;

        let previous_delivered = self.state.delivered_total;
        self.state.sent_total += u64::from(outcome.sending_rate);
        self.state.delivered_total += u64::from(outcome.delivered);
        self.state.dropped_total += u64::from(outcome.dropped);
        if let Some(window) = outcome.window_size {
            self.state.window_size = window;
        }
        self.state.ticks += 1;

        let sample = Sample {
            timestamp_ms: self.state.ticks * self.settings.tick_interval_ms,
            throughput: self.state.delivered_total.saturating_sub(previous_delivered),
            loss: self.state.dropped_total,
        };
        self.metrics.push(sample);

        debug!(
            "Tick {} [{}]: sent={} delivered={} dropped={} window={:?}",
            self.state.ticks,
            protocol,
            outcome.sending_rate,
            outcome.delivered,
            outcome.dropped,
            outcome.window_size
        );

        Ok(TickReport {
            tick: self.state.ticks,
            protocol,
            outcome,
            sample,
            status: self.status,
        })
    }

    /// Tick on behalf of the tick source started for `epoch`; `None` if that
    /// source is no longer current.
    pub fn tick_in_epoch(&mut self, epoch: u64) -> Option<Result<TickReport, ConfigError>> {
        if !self.clock.accepts(epoch) {
            return None;
        }
        Some(self.tick())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sent_total: self.state.sent_total,
            delivered_total: self.state.delivered_total,
            dropped_total: self.state.dropped_total,
            window_size: match self.config.protocol {
                Protocol::Tcp => Some(self.state.window_size),
                Protocol::Udp => None,
            },
            status: self.status,
            utilization: self.utilization,
            clock: self.clock.state(),
            ticks: self.state.ticks,
            config: self.config,
            samples: self.metrics.snapshot(),
        }
    }
}
