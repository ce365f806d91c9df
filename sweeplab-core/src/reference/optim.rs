//! Adam over candle variables.

use crate::backend::{LearningRate, Optimizer};
use crate::error::SweepError;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};

/// Adam with betas `(0.9, 0.98)` and epsilon `1e-9`.
///
/// candle's `AdamW` with weight decay switched off.
pub struct Adam {
    inner: AdamW,
    steps: u64,
}

impl Adam {
    pub fn new(vars: Vec<Var>, lr: f64) -> Result<Self, SweepError> {
        let inner = AdamW::new(
            vars,
            ParamsAdamW {
                lr,
                beta1: 0.9,
                beta2: 0.98,
                eps: 1e-9,
                weight_decay: 0.0,
            },
        )?;
        Ok(Self { inner, steps: 0 })
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl LearningRate for Adam {
    fn lr(&self) -> f64 {
        self.inner.learning_rate()
    }

    fn set_lr(&mut self, lr: f64) {
        self.inner.set_learning_rate(lr);
    }
}

impl Optimizer<Tensor> for Adam {
    fn backward_step(&mut self, loss: &Tensor) -> Result<(), SweepError> {
        self.inner.backward_step(loss)?;
        self.steps += 1;
        Ok(())
    }
}
