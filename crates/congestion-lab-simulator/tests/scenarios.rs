use congestion_lab_abstract::{EngineSettings, LabConfig, Protocol};
use congestion_lab_simulator::scenario_runner::run_scenario;
use std::path::PathBuf;

fn scenario_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios")
}

#[test]
fn bundled_scenarios_pass() {
    for name in [
        "tcp_congestion.toml",
        "udp_congestion.toml",
        "protocol_switch.toml",
    ] {
        let path = scenario_dir().join(name);
        let report = run_scenario(&path, EngineSettings::default())
            .unwrap_or_else(|err| panic!("{name}: {err:#}"));
        let snap = &report.final_snapshot;
        assert_eq!(snap.delivered_total + snap.dropped_total, snap.sent_total);
    }
}

#[test]
fn missing_scenario_file_is_an_error() {
    let err = run_scenario(&scenario_dir().join("nope.toml"), EngineSettings::default())
        .unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read scenario file"));
}

#[test]
fn sample_lab_config_parses() {
    let content = std::fs::read_to_string(scenario_dir().join("lab.toml")).unwrap();
    let lab: LabConfig = toml::from_str(&content).unwrap();
    lab.validate().unwrap();
    assert_eq!(lab.simulation.protocol, Protocol::Tcp);
    assert_eq!(lab.engine, EngineSettings::default());
}
