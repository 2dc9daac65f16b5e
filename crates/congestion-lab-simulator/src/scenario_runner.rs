use anyhow::{Context, anyhow, bail};
use congestion_lab_abstract::{
    EngineSettings, Protocol, SimConfig, TestAction, TestAssertion, TestScenario,
};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulation;
use crate::trace::{SimulationReport, TraceRecorder};

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
}

pub fn parse_scenario(content: &str) -> anyhow::Result<TestScenario> {
    toml::from_str(content).context("Failed to parse scenario")
}

pub fn run_scenario(path: &Path, settings: EngineSettings) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run_loaded_scenario(&scenario, settings)
}

/// Build the simulation a scenario starts from.
pub fn build_simulation(
    scenario: &TestScenario,
    mut settings: EngineSettings,
) -> anyhow::Result<Simulation> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    scenario.config.apply_policy(&mut settings.policy);
    Simulation::new(config, settings).context("Invalid scenario configuration")
}

pub fn run_loaded_scenario(
    scenario: &TestScenario,
    settings: EngineSettings,
) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut sim = build_simulation(scenario, settings)?;
    let mut recorder = TraceRecorder::new();

    for action in &scenario.actions {
        match action {
            TestAction::Tick { count } => {
                for _ in 0..*count {
                    let report = sim.tick()?;
                    recorder.record(&report);
                    check_invariants(&sim)?;
                }
            }
            TestAction::Configure {
                packet_rate,
                network_capacity,
                protocol,
            } => {
                let current = *sim.config();
                let next = SimConfig {
                    packet_rate: packet_rate.unwrap_or(current.packet_rate),
                    network_capacity: network_capacity.unwrap_or(current.network_capacity),
                    protocol: protocol.unwrap_or(current.protocol),
                };
                sim.configure(next)
                    .with_context(|| format!("Scenario reconfiguration to {:?} rejected", next))?;
            }
            TestAction::Reset => sim.reset(),
        }
    }

    for assertion in &scenario.assertions {
        check_assertion(assertion, &sim, &recorder)?;
    }

    info!("Test Scenario Passed!");
    Ok(recorder.into_report(&sim))
}

fn check_invariants(sim: &Simulation) -> anyhow::Result<()> {
    let state = sim.state();
    if state.delivered_total + state.dropped_total != state.sent_total {
        bail!(
            "Invariant violated at tick {}: delivered {} + dropped {} != sent {}",
            state.ticks,
            state.delivered_total,
            state.dropped_total,
            state.sent_total
        );
    }
    let rate = sim.config().packet_rate;
    if sim.config().protocol == Protocol::Tcp && !(1..=rate).contains(&state.window_size) {
        bail!(
            "Invariant violated at tick {}: window {} outside 1..={}",
            state.ticks,
            state.window_size,
            rate
        );
    }
    Ok(())
}

fn check_range(what: &str, value: u64, min: u64, max: Option<u64>) -> anyhow::Result<()> {
    if value < min {
        bail!("Assertion Failed: {} is {}, expected min {}", what, value, min);
    }
    if let Some(max) = max
        && value > max
    {
        bail!("Assertion Failed: {} is {}, expected max {}", what, value, max);
    }
    Ok(())
}

fn check_assertion(
    assertion: &TestAssertion,
    sim: &Simulation,
    recorder: &TraceRecorder,
) -> anyhow::Result<()> {
    let snapshot = sim.snapshot();
    match assertion {
        TestAssertion::SentTotal { min, max } => {
            check_range("sent total", snapshot.sent_total, *min, *max)
        }
        TestAssertion::DeliveredTotal { min, max } => {
            check_range("delivered total", snapshot.delivered_total, *min, *max)
        }
        TestAssertion::DroppedTotal { min, max } => {
            check_range("dropped total", snapshot.dropped_total, *min, *max)
        }
        TestAssertion::WindowMax { min, max } => {
            let max_win = recorder.max_window().unwrap_or(0);
            check_range(
                "window max",
                u64::from(max_win),
                u64::from(*min),
                max.map(u64::from),
            )
        }
        TestAssertion::WindowDrop {
            from_at_least,
            to_at_most,
        } => {
            let mut seen_high = false;
            let mut seen_drop = false;
            for w in recorder.window_history() {
                if !seen_high && w >= *from_at_least {
                    seen_high = true;
                } else if seen_high && w <= *to_at_most {
                    seen_drop = true;
                    break;
                }
            }
            if !seen_high || !seen_drop {
                bail!(
                    "Assertion Failed: window did not drop from >= {} down to <= {}",
                    from_at_least,
                    to_at_most
                );
            }
            Ok(())
        }
        TestAssertion::FinalWindow { expected } => match snapshot.window_size {
            Some(w) if w == *expected => Ok(()),
            other => Err(anyhow!(
                "Assertion Failed: final window {:?}, expected {}",
                other,
                expected
            )),
        },
        TestAssertion::Status { expected } => {
            if snapshot.status != *expected {
                bail!(
                    "Assertion Failed: status {}, expected {}",
                    snapshot.status,
                    expected
                );
            }
            Ok(())
        }
        TestAssertion::SampleCount { expected } => {
            if snapshot.samples.len() != *expected {
                bail!(
                    "Assertion Failed: {} samples, expected {}",
                    snapshot.samples.len(),
                    expected
                );
            }
            Ok(())
        }
        TestAssertion::LastThroughput { expected } => {
            let last = snapshot.latest_sample().map(|s| s.throughput);
            if last != Some(*expected) {
                bail!(
                    "Assertion Failed: last throughput {:?}, expected {}",
                    last,
                    expected
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_CONGESTION: &str = r#"
name = "tcp-congestion"
description = "Slow start into a narrow link, then backoff"

[config]
packet_rate = 10
network_capacity = 5
protocol = "tcp"

[[actions]]
type = "tick"
count = 30

[[assertions]]
type = "window_max"
min = 6
max = 6

[[assertions]]
type = "window_drop"
from_at_least = 6
to_at_most = 4

[[assertions]]
type = "status"
expected = "congested"

[[assertions]]
type = "sample_count"
expected = 8
"#;

    #[test]
    fn tcp_scenario_passes() {
        let scenario = parse_scenario(TCP_CONGESTION).unwrap();
        let report = run_loaded_scenario(&scenario, EngineSettings::default()).unwrap();
        assert_eq!(report.ticks, 30);
        assert_eq!(report.records.len(), 30);
        assert!(report.window_history.iter().all(|w| (1..=10).contains(w)));
    }

    #[test]
    fn udp_scenario_with_reconfigure_and_reset() {
        let scenario = parse_scenario(
            r#"
name = "udp"

[config]
packet_rate = 20
network_capacity = 10
protocol = "udp"

[[actions]]
type = "tick"
count = 5

[[actions]]
type = "reset"

[[actions]]
type = "configure"
network_capacity = 40

[[actions]]
type = "tick"
count = 3

[[assertions]]
type = "sent_total"
min = 60
max = 60

[[assertions]]
type = "dropped_total"
min = 0
max = 0

[[assertions]]
type = "last_throughput"
expected = 20

[[assertions]]
type = "status"
expected = "normal"
"#,
        )
        .unwrap();
        let report = run_loaded_scenario(&scenario, EngineSettings::default()).unwrap();
        assert_eq!(report.ticks, 8);
        assert!(report.window_history.is_empty());
    }

    #[test]
    fn failing_assertion_is_reported() {
        let scenario = parse_scenario(
            r#"
name = "too-optimistic"

[config]
packet_rate = 20
network_capacity = 10
protocol = "udp"

[[actions]]
type = "tick"
count = 2

[[assertions]]
type = "dropped_total"
min = 0
max = 5
"#,
        )
        .unwrap();
        let err = run_loaded_scenario(&scenario, EngineSettings::default()).unwrap_err();
        assert!(err.to_string().contains("dropped total"));
    }

    #[test]
    fn policy_overrides_reach_the_controller() {
        let scenario = parse_scenario(
            r#"
name = "half-backoff"

[config]
packet_rate = 10
network_capacity = 5
increase_step = 2
decrease_factor = 0.5

[[actions]]
type = "tick"
count = 4

[[assertions]]
type = "final_window"
expected = 3
"#,
        )
        .unwrap();
        // Windows 1 -> 3 -> 5 -> 7, then 7 overloads and halves to 3.
        run_loaded_scenario(&scenario, EngineSettings::default()).unwrap();
    }

    #[test]
    fn invalid_reconfigure_fails_the_run() {
        let scenario = parse_scenario(
            r#"
name = "bad"

[[actions]]
type = "configure"
packet_rate = 0
"#,
        )
        .unwrap();
        assert!(run_loaded_scenario(&scenario, EngineSettings::default()).is_err());
    }
}
