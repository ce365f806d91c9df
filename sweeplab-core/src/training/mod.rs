//! Training protocol: schedules, the epoch driver, evaluation, sweeps and metric tables.

pub mod driver;
pub mod evaluator;
pub mod metrics;
pub mod runner;
pub mod schedule;
pub mod store;
pub mod sweep;
pub mod targets;

pub use driver::{DriverSettings, EpochDriver, EpochSummary, Trial, TrialKey};
pub use evaluator::{EvalObserver, InferenceMode, evaluate};
pub use metrics::{DerivedRow, FinalizedTable, MetricTable, Observation};
pub use runner::{
    ExperimentRunner, PartialSweep, SkippedRepetition, SweepOutcome, TrialFactory, TrialRecord,
};
pub use schedule::{LambdaLr, LrMultiplier, ScheduleState, WarmupInverseSqrt, rate};
pub use store::{RunManifest, RunStore};
pub use sweep::{SweepAxis, SweepPlan, TrialSpec};
pub use targets::label_smoothed;
