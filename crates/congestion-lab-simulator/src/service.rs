use congestion_lab_abstract::{ClockState, ConfigError, SimConfig, Snapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::clock::Ticker;
use crate::engine::{ConfigChange, Simulation, TickReport};

type TickSinks = Arc<Mutex<Vec<mpsc::UnboundedSender<TickReport>>>>;

/// A [`Simulation`] driven by a real-time tick source.
///
/// All mutation happens under one lock, so [`snapshot`](Self::snapshot) never
/// observes half a tick. Every committed change is also published on a watch
/// channel for consumers that prefer to be notified.
pub struct SimulationService {
    shared: Arc<Mutex<Simulation>>,
    /// Held for the whole of every lifecycle change, always before `shared`.
    ticker: Mutex<Option<Ticker>>,
    publisher: watch::Sender<Snapshot>,
    sinks: TickSinks,
    runtime: Handle,
}

impl SimulationService {
    /// `runtime` hosts the tick task; the service itself never blocks on it.
    pub fn new(simulation: Simulation, runtime: Handle) -> Self {
        let (publisher, _) = watch::channel(simulation.snapshot());
        Self {
            shared: Arc::new(Mutex::new(simulation)),
            ticker: Mutex::new(None),
            publisher,
            sinks: Arc::new(Mutex::new(Vec::new())),
            runtime,
        }
    }

    pub fn configure(&self, config: SimConfig) -> Result<ConfigChange, ConfigError> {
        let mut ticker = self.ticker.lock();
        let change = {
            let mut sim = self.shared.lock();
            let change = sim.configure(config)?;
            self.publish(&sim);
            change
        };
        if change.reset {
            stop(&mut ticker);
        }
        Ok(change)
    }

    /// Start ticking. Returns false if the clock was already running.
    pub fn start(&self) -> bool {
        let mut ticker = self.ticker.lock();
        let mut sim = self.shared.lock();
        let Some(epoch) = sim.start() else {
            debug!("Ignoring start: clock already running");
            return false;
        };
        self.publish(&sim);
        let period = sim.clock().period();
        drop(sim);

        let shared = Arc::clone(&self.shared);
        let publisher = self.publisher.clone();
        let sinks = Arc::clone(&self.sinks);
        let next = Ticker::spawn(&self.runtime, period, move || {
            let mut sim = shared.lock();
            match sim.tick_in_epoch(epoch) {
                None => false,
                Some(Ok(report)) => {
                    publisher.send_replace(sim.snapshot());
                    forward(&sinks, &report);
                    true
                }
                Some(Err(err)) => {
                    warn!("Tick rejected, stopping clock: {}", err);
                    false
                }
            }
        });

        if let Some(previous) = ticker.replace(next) {
            previous.stop();
        }
        true
    }

    /// Returns false if the clock was not running.
    pub fn pause(&self) -> bool {
        let mut ticker = self.ticker.lock();
        let paused = {
            let mut sim = self.shared.lock();
            let paused = sim.pause();
            if paused {
                self.publish(&sim);
            }
            paused
        };
        if paused {
            stop(&mut ticker);
        }
        paused
    }

    pub fn reset(&self) {
        let mut ticker = self.ticker.lock();
        {
            let mut sim = self.shared.lock();
            sim.reset();
            self.publish(&sim);
        }
        stop(&mut ticker);
    }

    /// Apply one tick by hand. Refused while the clock is running so ticks
    /// never come from two sources at once.
    pub fn step(&self) -> Result<Option<TickReport>, ConfigError> {
        let mut sim = self.shared.lock();
        if sim.clock().is_running() {
            warn!("Manual step ignored while the clock is running");
            return Ok(None);
        }
        let report = sim.tick()?;
        self.publish(&sim);
        forward(&self.sinks, &report);
        info!(
            "Manual step {}: delivered={} dropped={}",
            report.tick, report.outcome.delivered, report.outcome.dropped
        );
        Ok(Some(report))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.lock().snapshot()
    }

    /// Receiver updated after every tick and lifecycle change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.publisher.subscribe()
    }

    /// Every tick applied from now on, clock driven or manual, in order.
    pub fn tick_reports(&self) -> mpsc::UnboundedReceiver<TickReport> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sinks.lock().push(tx);
        rx
    }

    pub fn config(&self) -> SimConfig {
        *self.shared.lock().config()
    }

    pub fn clock_state(&self) -> ClockState {
        self.shared.lock().clock().state()
    }

    /// Stop the tick task and hand back the simulation.
    pub fn into_simulation(self) -> Simulation {
        let mut ticker = self.ticker.lock();
        let mut sim = self.shared.lock().clone();
        stop(&mut ticker);
        sim.pause();
        sim
    }

    fn publish(&self, sim: &Simulation) {
        self.publisher.send_replace(sim.snapshot());
    }
}

impl Drop for SimulationService {
    fn drop(&mut self) {
        stop(self.ticker.get_mut());
    }
}

fn stop(ticker: &mut Option<Ticker>) {
    if let Some(ticker) = ticker.take() {
        ticker.stop();
    }
}

/// Sent under the simulation lock so receivers see ticks in order.
fn forward(sinks: &TickSinks, report: &TickReport) {
    sinks.lock().retain(|tx| tx.send(report.clone()).is_ok());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceRecorder;
    use congestion_lab_abstract::{EngineSettings, LinkStatus, Protocol};
    use std::time::Duration;

    fn service(rate: u32, capacity: u32, protocol: Protocol) -> SimulationService {
        let sim = Simulation::with_config(SimConfig::new(rate, capacity, protocol)).unwrap();
        SimulationService::new(sim, Handle::current())
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_does_not_tick_synchronously() {
        let svc = service(20, 10, Protocol::Udp);
        assert!(svc.start());
        assert_eq!(svc.snapshot().ticks, 0);
        advance(500).await;
        assert_eq!(svc.snapshot().ticks, 0);
        assert_eq!(svc.clock_state(), ClockState::Running);
        advance(600).await;
        assert_eq!(svc.snapshot().ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_start_keeps_a_single_tick_source() {
        let svc = service(20, 10, Protocol::Udp);
        assert!(svc.start());
        advance(400).await;
        assert!(!svc.start());
        advance(3_200).await;
        let snap = svc.snapshot();
        assert_eq!(snap.ticks, 3);
        assert_eq!(snap.sent_total, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_future_ticks_and_keeps_state() {
        let svc = service(10, 5, Protocol::Tcp);
        svc.start();
        advance(2_500).await;
        assert!(svc.pause());
        assert!(!svc.pause());
        let paused = svc.snapshot();
        assert_eq!(paused.ticks, 2);
        assert_eq!(paused.clock, ClockState::Paused);

        advance(5_000).await;
        assert_eq!(svc.snapshot(), paused);

        svc.start();
        advance(1_500).await;
        assert_eq!(svc.snapshot().ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_zeroes_state_and_stops_ticking() {
        let svc = service(10, 5, Protocol::Tcp);
        svc.start();
        advance(4_500).await;
        assert_eq!(svc.snapshot().ticks, 4);

        svc.reset();
        advance(3_000).await;
        let snap = svc.snapshot();
        assert_eq!(snap.clock, ClockState::Idle);
        assert_eq!(
            (snap.sent_total, snap.delivered_total, snap.dropped_total),
            (0, 0, 0)
        );
        assert_eq!(snap.window_size, Some(1));
        assert!(snap.samples.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_switch_mid_run_resets_to_idle() {
        let svc = service(10, 5, Protocol::Tcp);
        svc.start();
        advance(3_500).await;
        let change = svc.configure(SimConfig::new(10, 5, Protocol::Udp)).unwrap();
        assert!(change.reset);
        advance(3_000).await;
        let snap = svc.snapshot();
        assert_eq!(snap.ticks, 0);
        assert_eq!(snap.clock, ClockState::Idle);
        assert_eq!(snap.window_size, None);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_change_mid_run_keeps_ticking() {
        let svc = service(10, 100, Protocol::Tcp);
        svc.start();
        advance(2_500).await;
        svc.configure(SimConfig::new(90, 100, Protocol::Tcp)).unwrap();
        advance(1_000).await;
        let snap = svc.snapshot();
        assert_eq!(snap.ticks, 3);
        assert_eq!(snap.status, LinkStatus::Congested);
        assert_eq!(snap.clock, ClockState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_configure_is_rejected_without_side_effects() {
        let svc = service(10, 5, Protocol::Tcp);
        svc.start();
        advance(1_500).await;
        let before = svc.snapshot();
        assert!(svc.configure(SimConfig::new(10, 0, Protocol::Tcp)).is_err());
        assert_eq!(svc.snapshot(), before);
        assert_eq!(svc.config(), SimConfig::new(10, 5, Protocol::Tcp));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_step_only_while_not_running() {
        let svc = service(20, 10, Protocol::Udp);
        let report = svc.step().unwrap().unwrap();
        assert_eq!(report.outcome.dropped, 10);
        svc.start();
        assert!(svc.step().unwrap().is_none());
        assert_eq!(svc.snapshot().ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_each_tick() {
        let svc = service(20, 10, Protocol::Udp);
        let mut rx = svc.subscribe();
        svc.start();
        rx.borrow_and_update();

        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.ticks, 1);
        assert_eq!(snap.delivered_total + snap.dropped_total, snap.sent_total);
        assert_eq!(snap.samples.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_stay_consistent_across_many_ticks() {
        let svc = service(12, 7, Protocol::Tcp);
        svc.start();
        for _ in 0..40 {
            advance(250).await;
            let snap = svc.snapshot();
            assert_eq!(snap.delivered_total + snap.dropped_total, snap.sent_total);
            let window = snap.window_size.unwrap();
            assert!((1..=12).contains(&window));
            assert!(snap.samples.len() <= 8);
        }
        advance(100).await;
        assert_eq!(svc.snapshot().ticks, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn into_simulation_stops_the_clock() {
        let svc = service(20, 10, Protocol::Udp);
        svc.start();
        advance(2_500).await;
        let sim = svc.into_simulation();
        assert_eq!(sim.state().ticks, 2);
        assert_eq!(sim.clock().state(), ClockState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_reports_cover_ticks_coalesced_in_snapshots() {
        let svc = service(20, 10, Protocol::Udp);
        let mut reports = svc.tick_reports();
        let mut updates = svc.subscribe();
        svc.start();
        updates.borrow_and_update();

        advance(2_500).await;
        svc.pause();
        assert_eq!(updates.borrow_and_update().ticks, 2);

        let mut recorder = TraceRecorder::new();
        while let Ok(report) = reports.try_recv() {
            recorder.record(&report);
        }
        let ticks: Vec<u64> = recorder.records().iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![1, 2]);

        let report = recorder.into_report_from(EngineSettings::default(), svc.snapshot());
        assert_eq!(report.ticks, 2);
        assert_eq!(report.final_snapshot.ticks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_steps_are_forwarded() {
        let svc = service(10, 5, Protocol::Tcp);
        let mut reports = svc.tick_reports();
        svc.step().unwrap();
        svc.step().unwrap();
        assert_eq!(reports.try_recv().unwrap().tick, 1);
        assert_eq!(reports.try_recv().unwrap().tick, 2);
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_start_and_pause_leaves_a_live_tick_source() {
        let settings = EngineSettings {
            tick_interval_ms: 1,
            ..EngineSettings::default()
        };
        for _ in 0..300 {
            let sim = Simulation::new(SimConfig::new(20, 10, Protocol::Udp), settings).unwrap();
            let svc = Arc::new(SimulationService::new(sim, Handle::current()));

            let first = {
                let svc = Arc::clone(&svc);
                tokio::task::spawn_blocking(move || {
                    svc.start();
                })
            };
            let second = {
                let svc = Arc::clone(&svc);
                tokio::task::spawn_blocking(move || {
                    svc.pause();
                    svc.start();
                })
            };
            first.await.unwrap();
            second.await.unwrap();

            assert_eq!(svc.clock_state(), ClockState::Running);
            let before = svc.snapshot().ticks;
            let mut updates = svc.subscribe();
            let advanced = tokio::time::timeout(Duration::from_secs(2), async {
                loop {
                    if updates.borrow_and_update().ticks > before {
                        break;
                    }
                    updates.changed().await.unwrap();
                }
            })
            .await;
            assert!(advanced.is_ok(), "running clock stopped ticking");
            svc.reset();
        }
    }
}
