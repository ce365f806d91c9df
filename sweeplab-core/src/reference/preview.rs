//! Human-readable preview of evaluation predictions.

use crate::error::SweepError;
use crate::training::evaluator::EvalObserver;
use candle_core::{D, Tensor};

/// Maps class or token ids to something a human can read.
pub trait TokenLookup {
    fn token(&self, id: usize) -> String;
}

/// Lookup backed by an explicit vocabulary. Unknown ids render as `<id>`.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    tokens: Vec<String>,
}

impl Vocabulary {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// `class_0`, `class_1`, ...
    pub fn numbered(prefix: &str, size: usize) -> Self {
        Self::new((0..size).map(|i| format!("{prefix}_{i}")).collect())
    }
}

impl TokenLookup for Vocabulary {
    fn token(&self, id: usize) -> String {
        self.tokens
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("<{id}>"))
    }
}

/// Logs the predicted and target tokens of the first evaluation batch.
pub struct TokenPreview<L: TokenLookup> {
    lookup: L,
    limit: usize,
}

impl<L: TokenLookup> TokenPreview<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup, limit: 8 }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Rendered `(predicted, target)` pairs, at most `limit` of them.
    pub fn render(
        &self,
        logits: &Tensor,
        targets: &Tensor,
    ) -> Result<Vec<(String, String)>, SweepError> {
        let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
        let targets = targets.to_vec1::<u32>()?;
        Ok(predicted
            .into_iter()
            .zip(targets)
            .take(self.limit)
            .map(|(p, t)| (self.lookup.token(p as usize), self.lookup.token(t as usize)))
            .collect())
    }
}

impl<L: TokenLookup> EvalObserver<Tensor, Tensor> for TokenPreview<L> {
    fn on_first_batch(&self, predictions: &Tensor, targets: &Tensor) {
        match self.render(predictions, targets) {
            Ok(pairs) => {
                for (i, (predicted, target)) in pairs.into_iter().enumerate() {
                    tracing::info!(example = i, %predicted, %target, "Evaluation preview");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not render evaluation preview"),
        }
    }
}
