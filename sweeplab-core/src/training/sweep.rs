//! Sweep axes and the trials a sweep expands into.

use crate::error::SweepError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which hyperparameter a sweep varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAxis {
    /// Vary the base learning rate at a fixed model size (`"lr"`).
    LearningRate,
    /// Vary the model size at a fixed base learning rate (`"s"`).
    ModelSize,
}

impl SweepAxis {
    pub fn selector(&self) -> &'static str {
        match self {
            Self::LearningRate => "lr",
            Self::ModelSize => "s",
        }
    }
}

impl FromStr for SweepAxis {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lr" => Ok(Self::LearningRate),
            "s" => Ok(Self::ModelSize),
            other => Err(SweepError::InvalidSweepAxis(other.to_string())),
        }
    }
}

impl fmt::Display for SweepAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

/// A planned sweep. The axis is kept as the raw selector and only resolved
/// when the sweep runs, so a bad selector is reported per repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    pub id: String,
    pub axis: String,
    pub values: Vec<f64>,
    pub repetitions: usize,
    /// Model size used while sweeping learning rates.
    pub model_size: f64,
    /// Base learning rate used while sweeping model sizes.
    pub base_rate: f64,
    pub seed: u64,
}

/// One fully resolved training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialSpec {
    pub repetition: usize,
    /// Position of the value within the sweep.
    pub index: usize,
    /// Logged hyperparameter: the unscaled base learning rate.
    pub hyperparameter: f64,
    pub model_size: f64,
    /// Rate handed to the optimizer: `hyperparameter / sqrt(model_size)`.
    pub learning_rate: f64,
    pub seed: u64,
}

impl SweepPlan {
    pub fn new(axis: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            axis: axis.into(),
            values,
            repetitions: 1,
            model_size: 1.0,
            base_rate: 0.01,
            seed: 42,
        }
    }

    pub fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn with_model_size(mut self, model_size: f64) -> Self {
        self.model_size = model_size;
        self
    }

    pub fn with_base_rate(mut self, base_rate: f64) -> Self {
        self.base_rate = base_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn resolve_axis(&self) -> Result<SweepAxis, SweepError> {
        self.axis.parse()
    }

    /// Trials of one repetition along `axis`, in sweep order.
    pub fn trials(&self, axis: SweepAxis, repetition: usize) -> Vec<TrialSpec> {
        self.values
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                let (hyperparameter, model_size) = match axis {
                    SweepAxis::LearningRate => (value, self.model_size),
                    SweepAxis::ModelSize => (self.base_rate, value),
                };
                TrialSpec {
                    repetition,
                    index,
                    hyperparameter,
                    model_size,
                    learning_rate: hyperparameter / model_size.sqrt(),
                    seed: self.trial_seed(repetition, index),
                }
            })
            .collect()
    }

    fn trial_seed(&self, repetition: usize, index: usize) -> u64 {
        let offset = (repetition * self.values.len() + index) as u64;
        self.seed.wrapping_add(offset.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}
