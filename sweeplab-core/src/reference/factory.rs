//! Builds reference-backend trials from the sweep configuration.

use super::data::{LabelledSet, MemoryLoader, SyntheticTask};
use super::loss::CrossEntropy;
use super::mlp::Mlp;
use super::optim::Adam;
use super::preview::{TokenPreview, Vocabulary};
use crate::backend::{BatchLoader, Model};
use crate::config::SweepConfig;
use crate::error::SweepError;
use crate::training::driver::Trial;
use crate::training::evaluator::EvalObserver;
use crate::training::runner::TrialFactory;
use crate::training::schedule::{LambdaLr, WarmupInverseSqrt};
use crate::training::sweep::TrialSpec;
use candle_core::{Device, Tensor};

const EVAL_SEED_OFFSET: u64 = 0xE7A1;
const SHUFFLE_SEED_OFFSET: u64 = 0x5EED;

/// Builds reference-backend trials from a [`SweepConfig`].
///
/// The task and the evaluation set are fixed for the whole sweep, so every
/// trial is scored against the same held-out examples. Training data,
/// weights and shuffling are seeded per trial.
pub struct ReferenceFactory {
    config: SweepConfig,
    task: SyntheticTask,
    eval_set: LabelledSet,
}

impl ReferenceFactory {
    pub fn new(config: SweepConfig) -> Result<Self, SweepError> {
        config.validate()?;
        let data = &config.data;
        let seed = config.experiment.seed;
        let task = SyntheticTask::new(data.features, data.classes, data.noise, seed)?;
        let eval_set = task.sample(data.eval_samples, seed.wrapping_add(EVAL_SEED_OFFSET));
        Ok(Self {
            config,
            task,
            eval_set,
        })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }
}

impl TrialFactory for ReferenceFactory {
    type Model = Mlp;
    type Optimizer = Adam;
    type Criterion = CrossEntropy;
    type Loader = MemoryLoader;

    fn build(
        &mut self,
        spec: &TrialSpec,
    ) -> Result<Trial<Mlp, Adam, CrossEntropy, MemoryLoader>, SweepError> {
        let width = spec.model_size.round();
        if width < 1.0 {
            return Err(SweepError::config(format!(
                "model size {} rounds to an empty hidden layer",
                spec.model_size
            )));
        }
        let experiment = &self.config.experiment;
        let data = &self.config.data;

        let train_set = self
            .task
            .sample(data.train_samples, spec.seed)
            .repeat(experiment.data_augment);
        let train_loader = MemoryLoader::train(
            train_set,
            experiment.batch_size,
            spec.seed.wrapping_add(SHUFFLE_SEED_OFFSET),
        )?
        .with_drop_last(data.drop_last);
        let eval_loader = MemoryLoader::eval(self.eval_set.clone(), experiment.eval_batch_size)?;

        let model = Mlp::new(
            data.features,
            width as usize,
            data.classes,
            spec.seed,
            &Device::Cpu,
        )?;
        let mut optimizer = Adam::new(model.vars(), spec.learning_rate)?;
        let schedule = if self.config.schedule.enabled {
            let s = &self.config.schedule;
            let curve = WarmupInverseSqrt::new(s.d_model.unwrap_or(spec.model_size), s.factor, s.warmup);
            Some(LambdaLr::new(spec.learning_rate, curve, &mut optimizer))
        } else {
            None
        };
        let observer: Option<Box<dyn EvalObserver<Tensor, Tensor>>> = if data.preview {
            Some(Box::new(TokenPreview::new(Vocabulary::numbered(
                "class",
                data.classes,
            ))))
        } else {
            None
        };

        tracing::debug!(
            width = width as usize,
            parameters = model.parameter_count(),
            train_batches = train_loader.num_batches(),
            "Built reference trial"
        );

        Ok(Trial {
            model,
            optimizer,
            criterion: CrossEntropy::new(data.classes).with_smoothing(data.label_smoothing),
            train_loader,
            eval_loader,
            schedule,
            observer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LearningRate;
    use crate::training::schedule::rate;
    use crate::training::sweep::{SweepAxis, SweepPlan};

    fn small_config() -> SweepConfig {
        let mut config = SweepConfig::default();
        config.data.train_samples = 40;
        config.data.eval_samples = 20;
        config.data.features = 4;
        config.data.classes = 3;
        config.experiment.batch_size = 8;
        config.experiment.eval_batch_size = 16;
        config
    }

    fn spec(model_size: f64) -> TrialSpec {
        SweepPlan::new("s", vec![model_size])
            .with_base_rate(0.04)
            .trials(SweepAxis::ModelSize, 0)[0]
    }

    #[test]
    fn test_trial_shapes_follow_config() {
        let mut config = small_config();
        config.experiment.data_augment = 2;
        let mut factory = ReferenceFactory::new(config).unwrap();
        let trial = factory.build(&spec(4.0)).unwrap();

        assert_eq!(trial.model.width(), 4);
        assert_eq!(trial.train_loader.len(), 80);
        assert_eq!(trial.train_loader.num_batches(), 10);
        assert_eq!(trial.eval_loader.num_batches(), 2);
        assert!((trial.optimizer.lr() - 0.02).abs() < 1e-15);
        assert!(trial.schedule.is_none());
        assert!(trial.observer.is_none());
        assert_eq!(trial.model.parameter_count(), 4 * 4 + 4 + 4 * 3 + 3);
    }

    #[test]
    fn test_schedule_sets_initial_rate() {
        let mut config = small_config();
        config.schedule.enabled = true;
        config.schedule.warmup = 10;
        config.data.preview = true;
        let mut factory = ReferenceFactory::new(config).unwrap();
        let trial = factory.build(&spec(4.0)).unwrap();

        let expected = 0.02 * rate(0, 4.0, 1.0, 10);
        assert!((trial.optimizer.lr() - expected).abs() < 1e-15);
        assert!(trial.observer.is_some());
    }

    #[test]
    fn test_rejects_sub_unit_width() {
        let mut factory = ReferenceFactory::new(small_config()).unwrap();
        assert!(factory.build(&spec(0.4)).is_err());
    }

    #[test]
    fn test_eval_set_shared_across_trials() {
        let mut factory = ReferenceFactory::new(small_config()).unwrap();
        let mut a = factory.build(&spec(2.0)).unwrap();
        let mut b = factory.build(&spec(8.0)).unwrap();
        let labels = |loader: &mut MemoryLoader| -> Vec<u32> {
            loader
                .batches()
                .flat_map(|b| b.unwrap().targets.to_vec1::<u32>().unwrap())
                .collect()
        };
        assert_eq!(labels(&mut a.eval_loader), labels(&mut b.eval_loader));
    }

    #[test]
    fn test_drop_last_reaches_train_loader() {
        let mut config = small_config();
        config.data.train_samples = 44;
        let mut factory = ReferenceFactory::new(config.clone()).unwrap();
        assert_eq!(factory.build(&spec(4.0)).unwrap().train_loader.num_batches(), 6);

        config.data.drop_last = true;
        let mut factory = ReferenceFactory::new(config).unwrap();
        let mut trial = factory.build(&spec(4.0)).unwrap();
        assert_eq!(trial.train_loader.num_batches(), 5);
        assert_eq!(trial.train_loader.batches().count(), 5);
        // Evaluation always sees every held-out example.
        assert_eq!(trial.eval_loader.num_batches(), 2);
    }

    #[test]
    fn test_optimizer_updates_model_weights() {
        use crate::backend::{Criterion, Optimizer};

        let mut factory = ReferenceFactory::new(small_config()).unwrap();
        let mut trial = factory.build(&spec(4.0)).unwrap();
        let batch = trial.train_loader.batches().next().unwrap().unwrap();
        let before = trial.model.forward(&batch.inputs).unwrap();
        let loss = trial.criterion.loss(&before, &batch.targets).unwrap();
        trial.optimizer.backward_step(&loss).unwrap();
        let after = trial.model.forward(&batch.inputs).unwrap();
        let moved = (after - before)
            .unwrap()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(moved > 0.0);
    }
}
