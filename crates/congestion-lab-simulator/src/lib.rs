pub mod classifier;
pub mod clock;
pub mod controller;
pub mod engine;
pub mod metrics;
pub mod service;

#[cfg(feature = "tui")]
pub mod tui;

pub mod scenario_runner;
pub mod trace;
pub mod traffic;

pub use classifier::UtilizationClassifier;
pub use clock::{SimulationClock, Ticker};
pub use controller::{CongestionController, StepOutcome};
pub use engine::{ConfigChange, Simulation, SimulationState, TickReport};
pub use metrics::MetricsBuffer;
pub use service::SimulationService;
pub use trace::{SimulationReport, TickRecord, TraceRecorder};
pub use traffic::TrafficAnimator;
