//! Metric table: append-only observations and the columns derived from them.

use serde::{Deserialize, Serialize};
use std::io::Write;

/// One logged row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Swept hyperparameter value (base learning rate for both sweep axes).
    pub hyperparameter: f64,
    pub model_size: f64,
    /// Examples seen when the row was logged: zero-based batch index times batch size.
    pub step: u64,
    pub train_loss: f64,
    pub eval_loss: f64,
}

/// Ordered observations for one sweep. Rows are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTable {
    rows: Vec<Observation>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Append one observation.
    pub fn log(
        &mut self,
        hyperparameter: f64,
        model_size: f64,
        step: u64,
        train_loss: f64,
        eval_loss: f64,
    ) {
        self.push(Observation {
            hyperparameter,
            model_size,
            step,
            train_loss,
            eval_loss,
        });
    }

    pub fn push(&mut self, observation: Observation) {
        self.rows.push(observation);
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finalize the table, computing every derived column over all rows.
    ///
    /// Consumes the table: once a sweep is finalized nothing more is logged.
    pub fn add_derived_columns(self, batch_size: usize) -> FinalizedTable {
        let sizes: Vec<f64> = self.rows.iter().map(|r| r.model_size).collect();
        let eval: Vec<f64> = self.rows.iter().map(|r| r.eval_loss).collect();
        let train: Vec<f64> = self.rows.iter().map(|r| r.train_loss).collect();
        let eval_min = running_min_by_group(&sizes, &eval);
        let train_min = running_min_by_group(&sizes, &train);

        let rows = self
            .rows
            .into_iter()
            .zip(eval_min.into_iter().zip(train_min))
            .map(|(obs, (eval_min, train_min))| {
                let squared = obs.model_size * obs.model_size;
                DerivedRow {
                    hyperparameter: obs.hyperparameter,
                    model_size: obs.model_size,
                    step: obs.step,
                    train_loss: obs.train_loss,
                    eval_loss: obs.eval_loss,
                    eval_min,
                    train_min,
                    compute: squared * obs.step as f64 * batch_size as f64,
                    params: squared.round(),
                }
            })
            .collect();

        FinalizedTable { batch_size, rows }
    }
}

/// Model sizes are compared exactly; sweeps use integer-valued widths.
pub fn same_model_size(a: f64, b: f64) -> bool {
    a == b
}

/// Running minimum of `values`, restarted whenever `groups` changes from the
/// previous row.
pub fn running_min_by_group(groups: &[f64], values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut current: Option<(f64, f64)> = None;

    for (&group, &value) in groups.iter().zip(values) {
        let minimum = match current {
            Some((g, m)) if same_model_size(g, group) => m.min(value),
            _ => value,
        };
        current = Some((group, minimum));
        out.push(minimum);
    }
    out
}

/// An observation plus its derived columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedRow {
    pub hyperparameter: f64,
    pub model_size: f64,
    pub step: u64,
    pub train_loss: f64,
    pub eval_loss: f64,
    pub eval_min: f64,
    pub train_min: f64,
    /// `model_size² × step × batch_size`.
    pub compute: f64,
    /// `round(model_size²)`.
    pub params: f64,
}

/// A finalized metric table. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedTable {
    batch_size: usize,
    rows: Vec<DerivedRow>,
}

impl FinalizedTable {
    pub fn rows(&self) -> &[DerivedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn eval_min(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.eval_min).collect()
    }

    pub fn train_min(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.train_min).collect()
    }

    pub fn compute(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.compute).collect()
    }

    pub fn params(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.params).collect()
    }

    /// Last row of every contiguous model-size group, in table order.
    ///
    /// Its `eval_min` is the best evaluation loss that group reached.
    pub fn group_summaries(&self) -> Vec<&DerivedRow> {
        let mut out: Vec<&DerivedRow> = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            let last_of_group = self
                .rows
                .get(i + 1)
                .is_none_or(|next| !same_model_size(next.model_size, row.model_size));
            if last_of_group {
                out.push(row);
            }
        }
        out
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut w = csv::Writer::from_writer(writer);
        for row in &self.rows {
            w.serialize(row)?;
        }
        w.flush()?;
        Ok(())
    }
}
