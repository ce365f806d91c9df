//! Experiment runner: a fresh trial per sweep value, one shared metric table.

use crate::backend::{BatchLoader, Criterion, Model, Optimizer};
use crate::error::SweepError;
use crate::training::driver::{EpochDriver, EpochSummary, Trial, TrialKey};
use crate::training::metrics::{FinalizedTable, MetricTable};
use crate::training::sweep::{SweepAxis, SweepPlan, TrialSpec};
use serde::{Deserialize, Serialize};

/// Builds the collaborators for one trial.
pub trait TrialFactory {
    type Model: Model<Input = <Self::Loader as BatchLoader>::Input>;
    type Optimizer: Optimizer<
        <Self::Criterion as Criterion<
            <Self::Model as Model>::Output,
            <Self::Loader as BatchLoader>::Target,
        >>::Loss,
    >;
    type Criterion: Criterion<<Self::Model as Model>::Output, <Self::Loader as BatchLoader>::Target>;
    type Loader: BatchLoader;

    fn build(
        &mut self,
        spec: &TrialSpec,
    ) -> Result<Trial<Self::Model, Self::Optimizer, Self::Criterion, Self::Loader>, SweepError>;
}

/// A repetition that never ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRepetition {
    pub repetition: usize,
    pub reason: String,
}

/// Result of one finished trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub spec: TrialSpec,
    pub summary: EpochSummary,
}

/// Everything a completed sweep produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub table: FinalizedTable,
    pub trials: Vec<TrialRecord>,
    pub skipped: Vec<SkippedRepetition>,
}

/// What a sweep had recorded when a trial failed.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSweep {
    pub table: MetricTable,
    pub trials: Vec<TrialRecord>,
    pub skipped: Vec<SkippedRepetition>,
}

impl PartialSweep {
    /// Finalize the rows logged so far, keeping the trial records.
    pub fn finalize(self, batch_size: usize) -> SweepOutcome {
        SweepOutcome {
            table: self.table.add_derived_columns(batch_size),
            trials: self.trials,
            skipped: self.skipped,
        }
    }
}

/// Runs every repetition of a plan through the epoch driver.
pub struct ExperimentRunner {
    plan: SweepPlan,
    driver: EpochDriver,
}

impl ExperimentRunner {
    pub fn new(plan: SweepPlan, driver: EpochDriver) -> Self {
        Self { plan, driver }
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    /// Run the sweep and finalize its table.
    ///
    /// An unrecognised axis selector skips the repetition and is reported in
    /// the outcome. Any training failure aborts the sweep with
    /// [`SweepError::TrialFailed`], which carries a [`PartialSweep`] with the
    /// rows, trial records and skipped repetitions gathered so far.
    pub fn run<F: TrialFactory>(&self, factory: &mut F) -> Result<SweepOutcome, SweepError> {
        let mut table = MetricTable::new();
        let mut trials = Vec::new();
        let mut skipped = Vec::new();

        for repetition in 0..self.plan.repetitions {
            let axis = match self.plan.resolve_axis() {
                Ok(axis) => axis,
                Err(e) => {
                    tracing::error!(repetition, error = %e, "Skipping repetition");
                    skipped.push(SkippedRepetition {
                        repetition,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for spec in self.plan.trials(axis, repetition) {
                tracing::info!(
                    repetition,
                    axis = %axis,
                    hyperparameter = spec.hyperparameter,
                    model_size = spec.model_size,
                    learning_rate = spec.learning_rate,
                    "Starting trial"
                );
                let key = TrialKey {
                    hyperparameter: spec.hyperparameter,
                    model_size: spec.model_size,
                };
                let result = factory
                    .build(&spec)
                    .and_then(|mut trial| self.driver.run(&mut trial, key, &mut table));
                match result {
                    Ok(summary) => trials.push(TrialRecord { spec, summary }),
                    Err(source) => {
                        return Err(SweepError::TrialFailed {
                            repetition,
                            trial: spec.index,
                            value: match axis {
                                SweepAxis::LearningRate => spec.hyperparameter,
                                SweepAxis::ModelSize => spec.model_size,
                            },
                            partial: Box::new(PartialSweep {
                                table,
                                trials,
                                skipped,
                            }),
                            source: Box::new(source),
                        });
                    }
                }
            }
        }

        let table = table.add_derived_columns(self.driver.settings().batch_size);
        tracing::info!(
            rows = table.len(),
            trials = trials.len(),
            skipped = skipped.len(),
            "Sweep finished"
        );
        Ok(SweepOutcome {
            table,
            trials,
            skipped,
        })
    }
}
