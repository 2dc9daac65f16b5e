use congestion_lab_abstract::ClockState;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Idle / Running / Paused lifecycle of the periodic tick source.
///
/// Every transition into `Running` opens a new epoch. A tick source is bound
/// to the epoch it was started for and [`SimulationClock::accepts`] only lets
/// that one through, so a source that lost a race with `pause`/`reset` can
/// never commit a stray tick.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    state: ClockState,
    epoch: u64,
    period: Duration,
}

impl SimulationClock {
    pub fn new(period: Duration) -> Self {
        Self {
            state: ClockState::Idle,
            epoch: 0,
            period,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    /// Enter `Running`. Returns the new epoch, or `None` if already running.
    pub fn start(&mut self) -> Option<u64> {
        if self.state == ClockState::Running {
            return None;
        }
        self.epoch += 1;
        self.state = ClockState::Running;
        Some(self.epoch)
    }

    /// Returns false when there was nothing to pause.
    pub fn pause(&mut self) -> bool {
        if self.state != ClockState::Running {
            return false;
        }
        self.state = ClockState::Paused;
        true
    }

    pub fn reset(&mut self) {
        self.state = ClockState::Idle;
    }

    /// Whether a tick source started for `epoch` may still commit ticks.
    pub fn accepts(&self, epoch: u64) -> bool {
        self.state == ClockState::Running && self.epoch == epoch
    }
}

/// A tokio task invoking a callback once per period.
///
/// The first call happens one full period after [`Ticker::spawn`]. Calls never
/// overlap since the task awaits each one before scheduling the next.
#[derive(Debug)]
pub struct Ticker {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// `on_tick` returns false to end the task.
    pub fn spawn<F>(runtime: &Handle, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let first = Instant::now() + period;
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    // Also resolves when the sender is dropped.
                    _ = &mut stop_rx => {
                        debug!("Ticker stopped");
                        break;
                    }

                    _ = interval.tick() => {
                        if !on_tick() {
                            debug!("Ticker finished: tick source no longer current");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Ask the task to stop before its next tick. A tick already in progress completes.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
