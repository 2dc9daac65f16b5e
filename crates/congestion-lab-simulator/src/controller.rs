use congestion_lab_abstract::{CongestionPolicy, ConfigError, Protocol};
use serde::Serialize;

/// Backoff products are evaluated in parts-per-million so that e.g. 10 * 0.7 floors to 7.
const FACTOR_SCALE: u64 = 1_000_000;

/// Result of one interval worth of sending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepOutcome {
    pub sending_rate: u32,
    pub delivered: u32,
    pub dropped: u32,
    /// Share of `sending_rate` that exceeded the capacity.
    pub drop_rate: f64,
    /// Window for the next interval, `None` for protocols without one.
    pub window_size: Option<u32>,
}

impl StepOutcome {
    pub fn overloaded(&self) -> bool {
        self.dropped > 0
    }
}

/// Per-interval AIMD approximation of TCP next to a fixed-rate UDP sender.
#[derive(Debug, Clone, Copy, Default)]
pub struct CongestionController {
    policy: CongestionPolicy,
}

impl CongestionController {
    pub fn new(policy: CongestionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CongestionPolicy {
        &self.policy
    }

    /// Compute what happens during one interval.
    ///
    /// `window_size` is only consulted for TCP. The returned window is kept in
    /// `1..=packet_rate`.
    pub fn step(
        &self,
        protocol: Protocol,
        packet_rate: u32,
        network_capacity: u32,
        window_size: u32,
    ) -> Result<StepOutcome, ConfigError> {
        if packet_rate == 0 {
            return Err(ConfigError::invalid("packet_rate", "must be at least 1"));
        }
        if network_capacity == 0 {
            return Err(ConfigError::invalid(
                "network_capacity",
                "must be at least 1",
            ));
        }

        let window = window_size.clamp(1, packet_rate);
        let sending_rate = match protocol {
            Protocol::Tcp => packet_rate.min(window),
            Protocol::Udp => packet_rate,
        };
        let overload = sending_rate.saturating_sub(network_capacity);

        if overload == 0 {
            return Ok(StepOutcome {
                sending_rate,
                delivered: sending_rate,
                dropped: 0,
                drop_rate: 0.0,
                window_size: match protocol {
                    Protocol::Tcp => Some(self.grow(window, packet_rate)),
                    Protocol::Udp => None,
                },
            });
        }

        let drop_rate = overload as f64 / sending_rate as f64;
        // floor(rate * (1 - overload / rate)) is exactly rate - overload.
        let delivered = sending_rate - overload;
        Ok(StepOutcome {
            sending_rate,
            delivered,
            dropped: sending_rate - delivered,
            drop_rate,
            window_size: match protocol {
                Protocol::Tcp => Some(self.back_off(window).min(packet_rate)),
                Protocol::Udp => None,
            },
        })
    }

    fn grow(&self, window: u32, packet_rate: u32) -> u32 {
        window
            .saturating_add(self.policy.increase_step)
            .min(packet_rate)
    }

    fn back_off(&self, window: u32) -> u32 {
        // Factors just below 1 must still shrink the window.
        let factor = (self.policy.decrease_factor * FACTOR_SCALE as f64)
            .round()
            .min((FACTOR_SCALE - 1) as f64) as u64;
        let shrunk = u64::from(window) * factor / FACTOR_SCALE;
        (shrunk as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> CongestionController {
        CongestionController::default()
    }

    #[test]
    fn tcp_without_overload_grows_by_one() {
        let out = controller().step(Protocol::Tcp, 10, 5, 1).unwrap();
        assert_eq!(out.sending_rate, 1);
        assert_eq!(out.delivered, 1);
        assert_eq!(out.dropped, 0);
        assert_eq!(out.window_size, Some(2));
        assert!(!out.overloaded());
    }

    #[test]
    fn tcp_window_growth_is_clamped_at_packet_rate() {
        let out = controller().step(Protocol::Tcp, 10, 100, 10).unwrap();
        assert_eq!(out.sending_rate, 10);
        assert_eq!(out.window_size, Some(10));
    }

    #[test]
    fn tcp_backoff_applies_multiplicative_decrease() {
        let out = controller().step(Protocol::Tcp, 20, 5, 10).unwrap();
        assert_eq!(out.sending_rate, 10);
        assert_eq!(out.delivered, 5);
        assert_eq!(out.dropped, 5);
        assert_eq!(out.window_size, Some(7));
        assert!((out.drop_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn tcp_backoff_never_goes_below_one() {
        let out = controller().step(Protocol::Tcp, 10, 1, 2).unwrap();
        assert_eq!(out.sending_rate, 2);
        assert_eq!(out.delivered, 1);
        assert_eq!(out.window_size, Some(1));
    }

    #[test]
    fn udp_ignores_the_window() {
        let out = controller().step(Protocol::Udp, 20, 10, 1).unwrap();
        assert_eq!(out.sending_rate, 20);
        assert_eq!(out.delivered, 10);
        assert_eq!(out.dropped, 10);
        assert_eq!(out.window_size, None);
        assert!((out.drop_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn custom_policy_is_honoured() {
        let ctl = CongestionController::new(CongestionPolicy {
            increase_step: 3,
            decrease_factor: 0.5,
        });
        assert_eq!(
            ctl.step(Protocol::Tcp, 50, 100, 4).unwrap().window_size,
            Some(7)
        );
        assert_eq!(
            ctl.step(Protocol::Tcp, 50, 5, 9).unwrap().window_size,
            Some(4)
        );
    }

    #[test]
    fn backoff_floors_exactly_for_tenths() {
        let ctl = controller();
        for (window, expected) in [(10, 7), (20, 14), (30, 21), (3, 2), (1, 1)] {
            assert_eq!(ctl.back_off(window), expected, "window {window}");
        }
    }

    #[test]
    fn backoff_shrinks_for_factors_close_to_one() {
        let policy = CongestionPolicy {
            increase_step: 1,
            decrease_factor: 0.999_999_9,
        };
        assert!(policy.validate().is_ok());
        let ctl = CongestionController::new(policy);
        assert_eq!(ctl.back_off(10), 9);
        assert_eq!(
            ctl.step(Protocol::Tcp, 20, 5, 10).unwrap().window_size,
            Some(9)
        );
    }

    #[test]
    fn zero_inputs_are_invalid() {
        assert!(controller().step(Protocol::Tcp, 0, 5, 1).is_err());
        assert!(controller().step(Protocol::Udp, 5, 0, 1).is_err());
    }

    #[test]
    fn conservation_holds_across_the_input_domain() {
        let ctl = controller();
        for rate in 1..=30 {
            for capacity in 1..=30 {
                for window in 1..=rate {
                    for protocol in [Protocol::Tcp, Protocol::Udp] {
                        let out = ctl.step(protocol, rate, capacity, window).unwrap();
                        assert_eq!(out.delivered + out.dropped, out.sending_rate);
                        assert!(out.delivered <= capacity);
                        if let Some(w) = out.window_size {
                            assert!((1..=rate).contains(&w));
                        }
                    }
                }
            }
        }
    }
}
