//! Epoch driver: one optimizer step per batch, evaluation at a fixed cadence.

use crate::backend::{BatchLoader, Criterion, LossValue, Model, Optimizer};
use crate::error::SweepError;
use crate::training::evaluator::{EvalObserver, InferenceMode, evaluate};
use crate::training::metrics::MetricTable;
use crate::training::schedule::LambdaLr;
use serde::{Deserialize, Serialize};

/// Everything one sweep value trains with. Built fresh for every trial.
pub struct Trial<M, O, C, L>
where
    M: Model,
    L: BatchLoader,
{
    pub model: M,
    pub optimizer: O,
    pub criterion: C,
    pub train_loader: L,
    pub eval_loader: L,
    pub schedule: Option<LambdaLr>,
    pub observer: Option<Box<dyn EvalObserver<M::Output, L::Target>>>,
}

/// Values copied into every row a trial logs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialKey {
    pub hyperparameter: f64,
    pub model_size: f64,
}

/// Cadence and bookkeeping shared by every trial of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Evaluate after every `log_interval` batches.
    pub log_interval: usize,
    /// Training batch size, used to turn batch indices into example counts.
    pub batch_size: usize,
    pub epochs: usize,
}

impl DriverSettings {
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.log_interval == 0 {
            return Err(SweepError::config("log_interval must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(SweepError::config("batch_size must be at least 1"));
        }
        if self.epochs == 0 {
            return Err(SweepError::config("epochs must be at least 1"));
        }
        Ok(())
    }
}

/// What a finished trial looked like.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epochs: usize,
    pub batches: usize,
    pub observations: usize,
    /// Zero when no batch ran.
    pub mean_train_loss: f64,
    pub final_lr: f64,
}

/// Runs the training/evaluation state machine for one trial.
#[derive(Debug, Clone, Copy)]
pub struct EpochDriver {
    settings: DriverSettings,
}

impl EpochDriver {
    pub fn new(settings: DriverSettings) -> Result<Self, SweepError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Train for the configured number of epochs, appending a row to `table`
    /// at every evaluation point.
    ///
    /// Batch indices count across epochs, so the logging cadence and the
    /// `step` column never restart within a trial.
    pub fn run<M, O, C, L>(
        &self,
        trial: &mut Trial<M, O, C, L>,
        key: TrialKey,
        table: &mut MetricTable,
    ) -> Result<EpochSummary, SweepError>
    where
        M: Model<Input = L::Input>,
        C: Criterion<M::Output, L::Target>,
        O: Optimizer<C::Loss>,
        L: BatchLoader,
    {
        let Trial {
            model,
            optimizer,
            criterion,
            train_loader,
            eval_loader,
            schedule,
            observer,
        } = trial;

        let mut batch_index = 0usize;
        let mut observations = 0usize;
        let mut loss_sum = 0.0;
        let mut interval_loss = 0.0;
        let mut interval_batches = 0usize;

        for epoch in 0..self.settings.epochs {
            tracing::debug!(
                epoch,
                batches = train_loader.num_batches(),
                model_size = key.model_size,
                "Starting epoch"
            );

            for batch in train_loader.batches() {
                let batch = batch?;
                optimizer.zero_grad()?;
                let predictions = model.forward(&batch.inputs)?;
                let loss = criterion.loss(&predictions, &batch.targets)?;
                let train_loss = loss.scalar()?;
                if !train_loss.is_finite() {
                    return Err(SweepError::NonFiniteLoss {
                        batch: batch_index,
                        value: train_loss,
                    });
                }
                optimizer.backward_step(&loss)?;
                if let Some(schedule) = schedule.as_mut() {
                    schedule.step(&mut *optimizer);
                }

                loss_sum += train_loss;
                interval_loss += train_loss;
                interval_batches += 1;

                if (batch_index + 1) % self.settings.log_interval == 0 {
                    let eval_loss = {
                        let guard = InferenceMode::enter(&mut *model);
                        evaluate(&guard, &*criterion, &mut *eval_loader, observer.as_deref())?
                    };
                    let step = (batch_index * self.settings.batch_size) as u64;
                    table.log(
                        key.hyperparameter,
                        key.model_size,
                        step,
                        train_loss,
                        eval_loss,
                    );
                    observations += 1;

                    tracing::info!(
                        batch = batch_index + 1,
                        model_size = key.model_size,
                        hyperparameter = key.hyperparameter,
                        train_loss = interval_loss / interval_batches as f64,
                        eval_loss,
                        lr = optimizer.lr(),
                        "Evaluated"
                    );
                    interval_loss = 0.0;
                    interval_batches = 0;
                }
                batch_index += 1;
            }
        }

        Ok(EpochSummary {
            epochs: self.settings.epochs,
            batches: batch_index,
            observations,
            mean_train_loss: if batch_index > 0 {
                loss_sum / batch_index as f64
            } else {
                0.0
            },
            final_lr: optimizer.lr(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LearningRate, ModelMode};
    use crate::training::evaluator::tests::{PassThrough, ScalarModel, VecLoader};
    use crate::training::schedule::WarmupInverseSqrt;

    struct CountingOptimizer {
        lr: f64,
        steps: usize,
        cleared: usize,
    }

    impl LearningRate for CountingOptimizer {
        fn lr(&self) -> f64 {
            self.lr
        }

        fn set_lr(&mut self, lr: f64) {
            self.lr = lr;
        }
    }

    impl Optimizer<f64> for CountingOptimizer {
        fn zero_grad(&mut self) -> Result<(), SweepError> {
            self.cleared += 1;
            Ok(())
        }

        fn backward_step(&mut self, _loss: &f64) -> Result<(), SweepError> {
            assert_eq!(self.cleared, self.steps + 1, "gradients not cleared before the step");
            self.steps += 1;
            Ok(())
        }
    }

    fn trial(
        train_batches: usize,
    ) -> Trial<ScalarModel, CountingOptimizer, PassThrough, VecLoader> {
        Trial {
            model: ScalarModel::new(),
            optimizer: CountingOptimizer {
                lr: 0.1,
                steps: 0,
                cleared: 0,
            },
            criterion: PassThrough,
            train_loader: VecLoader::new(vec![1.0; train_batches]),
            eval_loader: VecLoader::new(vec![0.5, 1.5]),
            schedule: None,
            observer: None,
        }
    }

    fn settings(log_interval: usize, epochs: usize) -> DriverSettings {
        DriverSettings {
            log_interval,
            batch_size: 128,
            epochs,
        }
    }

    const KEY: TrialKey = TrialKey {
        hyperparameter: 0.01,
        model_size: 4.0,
    };

    #[test]
    fn test_logs_at_interval_boundaries() {
        let driver = EpochDriver::new(settings(50, 1)).unwrap();
        let mut trial = trial(120);
        let mut table = MetricTable::new();
        let summary = driver.run(&mut trial, KEY, &mut table).unwrap();

        assert_eq!(table.len(), 2);
        let steps: Vec<u64> = table.rows().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![49 * 128, 99 * 128]);
        assert_eq!(summary.batches, 120);
        assert_eq!(summary.observations, 2);
        assert_eq!(trial.optimizer.steps, 120);
        assert_eq!(trial.eval_loader.passes, 2);
    }

    #[test]
    fn test_rows_carry_losses_and_key() {
        let driver = EpochDriver::new(settings(2, 1)).unwrap();
        let mut trial = trial(4);
        let mut table = MetricTable::new();
        driver.run(&mut trial, KEY, &mut table).unwrap();

        for row in table.rows() {
            assert_eq!(row.hyperparameter, 0.01);
            assert_eq!(row.model_size, 4.0);
            assert_eq!(row.train_loss, 1.0);
            assert!((row.eval_loss - 1.0).abs() < 1e-12);
        }
        assert_eq!(trial.model.mode, ModelMode::Train);
    }

    #[test]
    fn test_cadence_spans_epochs() {
        let driver = EpochDriver::new(settings(3, 2)).unwrap();
        let mut trial = trial(5);
        let mut table = MetricTable::new();
        let summary = driver.run(&mut trial, KEY, &mut table).unwrap();

        let steps: Vec<u64> = table.rows().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![2 * 128, 5 * 128, 8 * 128]);
        assert_eq!(summary.batches, 10);
        assert_eq!(trial.train_loader.passes, 2);
    }

    #[test]
    fn test_schedule_steps_once_per_batch() {
        let driver = EpochDriver::new(settings(100, 1)).unwrap();
        let mut trial = trial(7);
        let curve = WarmupInverseSqrt::new(16.0, 1.0, 4);
        trial.schedule = Some(LambdaLr::new(1.0, curve, &mut trial.optimizer));
        let mut table = MetricTable::new();
        let summary = driver.run(&mut trial, KEY, &mut table).unwrap();

        let schedule = trial.schedule.as_ref().unwrap();
        assert_eq!(schedule.state().step(), 7);
        assert_eq!(summary.final_lr, schedule.current_lr());
        assert!(table.is_empty());
    }

    #[test]
    fn test_nan_training_loss_is_fatal_and_keeps_rows() {
        let driver = EpochDriver::new(settings(1, 1)).unwrap();
        let mut trial = trial(0);
        trial.train_loader = VecLoader::new(vec![1.0, 2.0, f64::NAN, 4.0]);
        let mut table = MetricTable::new();
        let err = driver.run(&mut trial, KEY, &mut table).unwrap_err();

        assert!(matches!(err, SweepError::NonFiniteLoss { batch: 2, .. }));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(EpochDriver::new(settings(0, 1)).is_err());
    }
}
