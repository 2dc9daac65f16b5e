use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use congestion_lab_abstract::{LabConfig, Protocol};
use congestion_lab_simulator::tui::{MemoryLogBuffer, TuiApp};
use congestion_lab_simulator::{
    Simulation, SimulationReport, SimulationService, TraceRecorder, scenario_runner,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ProtocolArg {
    Tcp,
    Udp,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tcp => Protocol::Tcp,
            ProtocolArg::Udp => Protocol::Udp,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Congestion lab: TCP vs UDP over a constrained link")]
struct Args {
    /// Load simulation and engine settings from a TOML file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Packets offered per interval.
    #[arg(long)]
    packet_rate: Option<u32>,

    /// Packets the link carries per interval.
    #[arg(long)]
    network_capacity: Option<u32>,

    #[arg(long, value_enum)]
    protocol: Option<ProtocolArg>,

    /// Milliseconds between ticks of the real-time clock.
    #[arg(long)]
    tick_interval_ms: Option<u64>,

    /// Number of ticks for a headless run.
    #[arg(long, default_value_t = 20)]
    ticks: u32,

    /// Drive the headless run through the real-time clock instead of stepping.
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Run a scenario file and check its assertions.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Launch the terminal UI.
    #[arg(long, default_value_t = false)]
    tui: bool,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_buffer = init_logging(args.tui);
    info!("congestion-lab-sim-cli starting…");

    if args.scenario.is_some() && args.tui {
        anyhow::bail!("--scenario and --tui cannot be used together");
    }

    let lab = args.lab_config()?;

    let report = if let Some(path) = &args.scenario {
        scenario_runner::run_scenario(path, lab.engine)?
    } else if args.tui {
        run_tui(lab, log_buffer)?
    } else if args.realtime {
        run_realtime(lab, args.ticks)?
    } else {
        run_headless(lab, args.ticks)?
    };

    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn lab_config(&self) -> Result<LabConfig> {
        let mut lab = match &self.config {
            Some(path) => load_lab_config(path)?,
            None => LabConfig::default(),
        };

        if let Some(rate) = self.packet_rate {
            lab.simulation.packet_rate = rate;
        }
        if let Some(capacity) = self.network_capacity {
            lab.simulation.network_capacity = capacity;
        }
        if let Some(protocol) = self.protocol {
            lab.simulation.protocol = protocol.into();
        }
        if let Some(interval) = self.tick_interval_ms {
            lab.engine.tick_interval_ms = interval;
        }

        lab.validate().context("Invalid configuration")?;
        Ok(lab)
    }
}

fn init_logging(use_tui: bool) -> Option<MemoryLogBuffer> {
    if use_tui {
        let buffer = MemoryLogBuffer::new();
        let writer = buffer.clone();
        tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .init();
        Some(buffer)
    } else {
        tracing_subscriber::fmt::init();
        None
    }
}

fn run_headless(lab: LabConfig, ticks: u32) -> Result<SimulationReport> {
    let mut sim = Simulation::new(lab.simulation, lab.engine)?;
    let mut recorder = TraceRecorder::new();

    info!("Starting headless simulation of {} ticks…", ticks);
    for _ in 0..ticks {
        let report = sim.tick()?;
        info!(
            "tick {:>4}: sent={:<5} delivered={:<5} dropped={:<5} window={}",
            report.tick,
            report.outcome.sending_rate,
            report.outcome.delivered,
            report.outcome.dropped,
            format_window(report.outcome.window_size)
        );
        recorder.record(&report);
    }
    info!("Simulation complete.");

    Ok(recorder.into_report(&sim))
}

fn run_realtime(lab: LabConfig, ticks: u32) -> Result<SimulationReport> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the tokio runtime")?;

    let sim = Simulation::new(lab.simulation, lab.engine)?;
    let service = SimulationService::new(sim, runtime.handle().clone());
    let mut recorder = TraceRecorder::new();

    info!(
        "Starting real-time simulation of {} ticks every {} ms…",
        ticks, lab.engine.tick_interval_ms
    );
    runtime.block_on(async {
        let mut reports = service.tick_reports();
        if ticks == 0 {
            return;
        }
        service.start();

        while let Some(report) = reports.recv().await {
            info!(
                "tick {:>4}: sent={:<5} delivered={:<5} dropped={:<5} window={} status={}",
                report.tick,
                report.outcome.sending_rate,
                report.outcome.delivered,
                report.outcome.dropped,
                format_window(report.outcome.window_size),
                report.status
            );
            recorder.record(&report);
            if report.tick >= u64::from(ticks) {
                break;
            }
        }

        service.pause();
        // Ticks committed before the pause are already queued.
        while let Ok(report) = reports.try_recv() {
            recorder.record(&report);
        }
    });
    info!("Simulation complete.");

    Ok(recorder.into_report_from(lab.engine, service.snapshot()))
}

fn run_tui(lab: LabConfig, logs: Option<MemoryLogBuffer>) -> Result<SimulationReport> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the tokio runtime")?;

    let sim = Simulation::new(lab.simulation, lab.engine)?;
    let service = SimulationService::new(sim, runtime.handle().clone());

    let mut reports = service.tick_reports();
    let mut app = TuiApp::new(service, logs);
    app.run()?;
    let service = app.into_service();
    service.pause();

    let mut recorder = TraceRecorder::new();
    while let Ok(report) = reports.try_recv() {
        recorder.record(&report);
    }
    Ok(recorder.into_report_from(lab.engine, service.snapshot()))
}

fn format_window(window: Option<u32>) -> String {
    window
        .map(|w| w.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

fn log_summary(report: &SimulationReport) {
    let snap = &report.final_snapshot;
    info!(
        "{} at rate {} over capacity {}: sent={} delivered={} dropped={} ({:.1}% loss), status={}",
        snap.config.protocol,
        snap.config.packet_rate,
        snap.config.network_capacity,
        snap.sent_total,
        snap.delivered_total,
        snap.dropped_total,
        snap.loss_ratio() * 100.0,
        snap.status
    );
}

fn load_lab_config(path: &Path) -> Result<LabConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let lab: LabConfig = toml::from_str(&content).context("Failed to parse config file")?;
    Ok(lab)
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    info!("Trace written to {}", path.display());
    Ok(())
}
