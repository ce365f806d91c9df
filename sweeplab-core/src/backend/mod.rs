//! Collaborator traits for the numeric library that actually trains models.
//!
//! The training protocol only needs a model that runs forward, a loss function
//! whose result the optimizer can backpropagate from, an optimizer holding
//! handles to the model's parameters, and a restartable source of batches.
//! Tensors, autodiff and devices stay behind these traits; the reference
//! backend in [`crate::reference`] fills them in with candle.

use crate::error::SweepError;
use serde::{Deserialize, Serialize};

/// Whether a model is being trained or only queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMode {
    Train,
    Inference,
}

/// A loss produced by a [`Criterion`].
///
/// Autodiff backends hand back a tensor that still owns its graph, so the
/// same value can be read as a number and passed to
/// [`Optimizer::backward_step`].
pub trait LossValue {
    fn scalar(&self) -> Result<f64, SweepError>;
}

impl LossValue for f64 {
    fn scalar(&self) -> Result<f64, SweepError> {
        Ok(*self)
    }
}

/// One `(input, target)` pair produced by a loader.
#[derive(Debug, Clone)]
pub struct Batch<I, T> {
    pub inputs: I,
    pub targets: T,
}

/// A trainable model.
pub trait Model {
    type Input;
    type Output;

    /// Compute predictions. Never updates parameters.
    fn forward(&self, input: &Self::Input) -> Result<Self::Output, SweepError>;

    fn mode(&self) -> ModelMode;

    fn set_mode(&mut self, mode: ModelMode);

    /// Number of trainable scalars.
    fn parameter_count(&self) -> usize;
}

/// Read and write access to a learning rate. All a schedule needs.
pub trait LearningRate {
    fn lr(&self) -> f64;

    fn set_lr(&mut self, lr: f64);
}

/// An optimizer bound to a model's parameters, updating them from losses of type `L`.
pub trait Optimizer<L: LossValue>: LearningRate {
    /// Clear accumulated gradients before the next forward pass.
    ///
    /// Backends that build fresh gradients on every backward pass keep the default.
    fn zero_grad(&mut self) -> Result<(), SweepError> {
        Ok(())
    }

    /// Backpropagate from `loss` and apply one update.
    fn backward_step(&mut self, loss: &L) -> Result<(), SweepError>;
}

/// A loss function comparing predictions `P` against targets `T`.
pub trait Criterion<P, T> {
    type Loss: LossValue;

    fn loss(&self, predictions: &P, targets: &T) -> Result<Self::Loss, SweepError>;
}

/// A lazy, restartable, finite source of batches.
///
/// Every call to [`BatchLoader::batches`] starts a fresh pass over the data.
/// Training loaders may reorder between passes; evaluation loaders must not.
pub trait BatchLoader {
    type Input;
    type Target;

    #[allow(clippy::type_complexity)]
    fn batches(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Batch<Self::Input, Self::Target>, SweepError>> + '_>;

    /// Number of batches one pass yields.
    fn num_batches(&self) -> usize;
}
