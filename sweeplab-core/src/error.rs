//! Error types for the sweeplab-core crate.

use crate::training::runner::PartialSweep;
use thiserror::Error;

/// Top-level error type for sweep operations.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid sweep axis '{0}': must be 's' or 'lr'")]
    InvalidSweepAxis(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Non-finite loss {value} at batch {batch}")]
    NonFiniteLoss { batch: usize, value: f64 },

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// A trial failed midway. Rows, finished trials and skipped repetitions
    /// recorded before the failure are kept.
    #[error("Trial {trial} (repetition {repetition}, value {value}) failed: {source}")]
    TrialFailed {
        repetition: usize,
        trial: usize,
        value: f64,
        partial: Box<PartialSweep>,
        #[source]
        source: Box<SweepError>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SweepError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn empty_dataset(msg: impl Into<String>) -> Self {
        Self::EmptyDataset(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether this error came from a misconfigured sweep rather than from training itself.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidSweepAxis(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_classification() {
        assert!(SweepError::InvalidSweepAxis("x".into()).is_usage_error());
        assert!(SweepError::config("bad").is_usage_error());
        assert!(!SweepError::NonFiniteLoss { batch: 3, value: f64::NAN }.is_usage_error());
    }

    #[test]
    fn test_display_names_axis() {
        let err = SweepError::InvalidSweepAxis("size".into());
        assert_eq!(
            err.to_string(),
            "Invalid sweep axis 'size': must be 's' or 'lr'"
        );
    }
}
