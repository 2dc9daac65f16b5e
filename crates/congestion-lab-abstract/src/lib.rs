pub mod config;
pub mod error;
pub mod scenario;
pub mod snapshot;

pub use config::{
    CongestionPolicy, EngineSettings, LabConfig, Protocol, SimConfig, UtilizationThresholds,
};
pub use error::ConfigError;
pub use scenario::{SimConfigOverride, TestAction, TestAssertion, TestScenario};
pub use snapshot::{ClockState, LinkStatus, Sample, Snapshot};
