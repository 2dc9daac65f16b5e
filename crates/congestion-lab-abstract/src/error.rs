use thiserror::Error;

/// Rejection reasons for configuration handed to the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field is outside the domain the engine accepts (e.g. a zero rate).
    #[error("invalid input: {field} {reason}")]
    InvalidInput {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}
