use crate::config::{CongestionPolicy, Protocol, SimConfig};
use crate::snapshot::LinkStatus;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub packet_rate: Option<u32>,
    pub network_capacity: Option<u32>,
    pub protocol: Option<Protocol>,
    pub increase_step: Option<u32>,
    pub decrease_factor: Option<f64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.packet_rate {
            config.packet_rate = v;
        }
        if let Some(v) = self.network_capacity {
            config.network_capacity = v;
        }
        if let Some(v) = self.protocol {
            config.protocol = v;
        }
    }

    pub fn apply_policy(&self, policy: &mut CongestionPolicy) {
        if let Some(v) = self.increase_step {
            policy.increase_step = v;
        }
        if let Some(v) = self.decrease_factor {
            policy.decrease_factor = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Apply `count` ticks back to back
    Tick { count: u32 },
    /// Reconfigure mid-run; unset fields keep their current value
    Configure {
        packet_rate: Option<u32>,
        network_capacity: Option<u32>,
        protocol: Option<Protocol>,
    },
    /// Return to the zero state
    Reset,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that the cumulative sent counter is within range
    SentTotal { min: u64, max: Option<u64> },
    /// Assert that the cumulative delivered counter is within range
    DeliveredTotal { min: u64, max: Option<u64> },
    /// Assert that the cumulative dropped counter is within range
    DroppedTotal { min: u64, max: Option<u64> },
    /// Assert that the largest window observed after any tick is within range
    WindowMax { min: u32, max: Option<u32> },
    /// Assert that the window eventually drops from at least `from_at_least` down to at most `to_at_most`
    WindowDrop { from_at_least: u32, to_at_most: u32 },
    /// Assert the window size at the end of the run
    FinalWindow { expected: u32 },
    /// Assert the link status at the end of the run
    Status { expected: LinkStatus },
    /// Assert how many samples the metrics history holds at the end of the run
    SampleCount { expected: usize },
    /// Assert the throughput of the newest sample
    LastThroughput { expected: u64 },
}
