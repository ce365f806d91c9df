//! Held-out evaluation in inference mode.

use crate::backend::{BatchLoader, Criterion, LossValue, Model, ModelMode};
use crate::error::SweepError;
use std::ops::Deref;

/// Scoped inference mode for a model.
///
/// Entering switches the model to [`ModelMode::Inference`]; dropping the guard
/// switches it back to [`ModelMode::Train`], whichever way the scope exits.
/// Only shared access to the model is available while the guard is alive.
pub struct InferenceMode<'a, M: Model> {
    model: &'a mut M,
}

impl<'a, M: Model> InferenceMode<'a, M> {
    pub fn enter(model: &'a mut M) -> Self {
        model.set_mode(ModelMode::Inference);
        Self { model }
    }

    pub fn model(&self) -> &M {
        self.model
    }
}

impl<M: Model> Deref for InferenceMode<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model
    }
}

impl<M: Model> Drop for InferenceMode<'_, M> {
    fn drop(&mut self) {
        self.model.set_mode(ModelMode::Train);
    }
}

/// Optional hook shown the first evaluation batch, for human inspection.
pub trait EvalObserver<P, T> {
    fn on_first_batch(&self, predictions: &P, targets: &T);
}

/// Mean per-batch loss of `model` over one pass of `loader`.
pub fn evaluate<M, C, L>(
    model: &InferenceMode<'_, M>,
    criterion: &C,
    loader: &mut L,
    observer: Option<&dyn EvalObserver<M::Output, L::Target>>,
) -> Result<f64, SweepError>
where
    M: Model<Input = L::Input>,
    C: Criterion<M::Output, L::Target>,
    L: BatchLoader,
{
    let mut total = 0.0;
    let mut batches = 0usize;

    for batch in loader.batches() {
        let batch = batch?;
        let predictions = model.forward(&batch.inputs)?;
        let value = criterion.loss(&predictions, &batch.targets)?.scalar()?;
        if !value.is_finite() {
            return Err(SweepError::NonFiniteLoss {
                batch: batches,
                value,
            });
        }
        if batches == 0
            && let Some(observer) = observer
        {
            observer.on_first_batch(&predictions, &batch.targets);
        }
        total += value;
        batches += 1;
    }

    if batches == 0 {
        return Err(SweepError::empty_dataset("evaluation loader yielded no batches"));
    }
    tracing::debug!(batches, mean_loss = total / batches as f64, "Evaluation finished");
    Ok(total / batches as f64)
}
