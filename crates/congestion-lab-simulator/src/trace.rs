use congestion_lab_abstract::{EngineSettings, LinkStatus, Protocol, SimConfig, Snapshot};
use serde::Serialize;

use crate::engine::{Simulation, TickReport};

/// Per-tick line of a trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    pub protocol: Protocol,
    pub sending_rate: u32,
    pub delivered: u32,
    pub dropped: u32,
    pub drop_rate: f64,
    pub window_size: Option<u32>,
    pub status: LinkStatus,
}

impl From<&TickReport> for TickRecord {
    fn from(report: &TickReport) -> Self {
        Self {
            tick: report.tick,
            protocol: report.protocol,
            sending_rate: report.outcome.sending_rate,
            delivered: report.outcome.delivered,
            dropped: report.outcome.dropped,
            drop_rate: report.outcome.drop_rate,
            window_size: report.outcome.window_size,
            status: report.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub settings: EngineSettings,
    /// Ticks applied over the whole run, resets included.
    pub ticks: u64,
    pub final_snapshot: Snapshot,
    pub window_history: Vec<u32>,
    pub records: Vec<TickRecord>,
}

/// Collects tick records while a run is in progress.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    records: Vec<TickRecord>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: &TickReport) {
        self.records.push(TickRecord::from(report));
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    pub fn window_history(&self) -> Vec<u32> {
        self.records.iter().filter_map(|r| r.window_size).collect()
    }

    pub fn max_window(&self) -> Option<u32> {
        self.records.iter().filter_map(|r| r.window_size).max()
    }

    pub fn into_report(self, sim: &Simulation) -> SimulationReport {
        self.into_report_from(*sim.settings(), sim.snapshot())
    }

    pub fn into_report_from(self, settings: EngineSettings, snapshot: Snapshot) -> SimulationReport {
        SimulationReport {
            config: snapshot.config,
            settings,
            ticks: self.records.len() as u64,
            window_history: self.window_history(),
            final_snapshot: snapshot,
            records: self.records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_tracks_windows_of_tcp_ticks_only() {
        let mut sim = Simulation::with_config(SimConfig::new(10, 5, Protocol::Tcp)).unwrap();
        let mut recorder = TraceRecorder::new();
        for _ in 0..6 {
            recorder.record(&sim.tick().unwrap());
        }
        assert_eq!(recorder.window_history(), vec![2, 3, 4, 5, 6, 4]);
        assert_eq!(recorder.max_window(), Some(6));

        sim.configure(SimConfig::new(10, 5, Protocol::Udp)).unwrap();
        recorder.record(&sim.tick().unwrap());
        let report = recorder.into_report(&sim);
        assert_eq!(report.ticks, 7);
        assert_eq!(report.window_history.len(), 6);
        assert_eq!(report.records[6].window_size, None);
        assert_eq!(report.final_snapshot.ticks, 1);
    }
}
