use congestion_lab_abstract::{ConfigError, LinkStatus, UtilizationThresholds};

/// Maps the configured load of a link onto [`LinkStatus`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UtilizationClassifier {
    thresholds: UtilizationThresholds,
}

impl UtilizationClassifier {
    pub fn new(thresholds: UtilizationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &UtilizationThresholds {
        &self.thresholds
    }

    /// Configured rate as a percentage of capacity.
    pub fn utilization(packet_rate: u32, network_capacity: u32) -> Result<f64, ConfigError> {
        if network_capacity == 0 {
            return Err(ConfigError::invalid(
                "network_capacity",
                "must be at least 1",
            ));
        }
        Ok(f64::from(packet_rate) * 100.0 / f64::from(network_capacity))
    }

    pub fn classify(
        &self,
        packet_rate: u32,
        network_capacity: u32,
    ) -> Result<LinkStatus, ConfigError> {
        let utilization = Self::utilization(packet_rate, network_capacity)?;
        Ok(self.status_for(utilization))
    }

    pub fn status_for(&self, utilization: f64) -> LinkStatus {
        if utilization >= self.thresholds.congested {
            LinkStatus::Congested
        } else if utilization >= self.thresholds.warning {
            LinkStatus::Warning
        } else {
            LinkStatus::Normal
        }
    }
}
