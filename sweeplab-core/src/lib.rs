//! # sweeplab-core: training-loop control and metric logging for scaling-law sweeps
//!
//! The crate drives one or more training trials per sweep value and records
//! loss curves into a single metric table:
//!
//! - [`training::schedule`]: warmup / inverse-square-root learning-rate curve
//! - [`training::evaluator`]: held-out evaluation behind a scoped inference guard
//! - [`training::driver`]: per-batch optimisation with evaluation at a fixed cadence
//! - [`training::runner`]: the sweep loop, one fresh trial per value
//! - [`training::metrics`]: append-only observations and derived columns
//!
//! Numeric work sits behind the [`backend`] traits; [`reference`] provides a
//! candle-based implementation of them.

pub mod backend;
pub mod config;
pub mod error;
pub mod reference;
pub mod training;

// Re-exports
pub use config::SweepConfig;
pub use error::SweepError;
pub use training::{
    DriverSettings, EpochDriver, ExperimentRunner, FinalizedTable, MetricTable, RunStore,
    SweepAxis, SweepOutcome, SweepPlan,
};
