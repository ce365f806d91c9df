//! Softmax cross-entropy on candle tensors.

use crate::backend::{Criterion, LossValue};
use crate::error::SweepError;
use crate::training::targets::label_smoothed;
use candle_core::{DType, Tensor};
use candle_nn::{loss, ops};

impl LossValue for Tensor {
    fn scalar(&self) -> Result<f64, SweepError> {
        Ok(self.to_dtype(DType::F64)?.to_scalar::<f64>()?)
    }
}

/// Mean cross-entropy of `[batch, classes]` logits against `u32` labels.
///
/// With smoothing the labels become soft targets and the loss is
/// `-sum(target * log_softmax(logits)) / batch`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossEntropy {
    pub classes: usize,
    pub smoothing: f64,
}

impl CrossEntropy {
    pub fn new(classes: usize) -> Self {
        Self {
            classes,
            smoothing: 0.0,
        }
    }

    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }
}

impl Criterion<Tensor, Tensor> for CrossEntropy {
    type Loss = Tensor;

    fn loss(&self, logits: &Tensor, labels: &Tensor) -> Result<Tensor, SweepError> {
        let (n, classes) = logits.dims2()?;
        if n == 0 {
            return Err(SweepError::empty_dataset("cross-entropy over an empty batch"));
        }
        if labels.dims() != [n] || classes != self.classes {
            return Err(SweepError::shape(format!(
                "logits {n}x{classes} vs labels {:?} over {} classes",
                labels.dims(),
                self.classes
            )));
        }
        let indices: Vec<usize> = labels
            .to_vec1::<u32>()?
            .into_iter()
            .map(|l| l as usize)
            .collect();
        if let Some(&bad) = indices.iter().find(|&&l| l >= self.classes) {
            return Err(SweepError::shape(format!(
                "label {bad} outside {} classes",
                self.classes
            )));
        }

        if self.smoothing <= 0.0 {
            return Ok(loss::cross_entropy(logits, labels)?);
        }
        let soft: Vec<f32> = label_smoothed(&indices, self.classes, self.smoothing)?
            .into_iter()
            .map(|v| v as f32)
            .collect();
        let targets = Tensor::from_vec(soft, (n, classes), logits.device())?;
        let log_probs = ops::log_softmax(logits, 1)?;
        Ok((log_probs * targets)?
            .sum_all()?
            .affine(-1.0 / n as f64, 0.0)?)
    }
}
