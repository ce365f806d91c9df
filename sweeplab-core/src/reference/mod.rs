//! CPU reference backend on candle.
//!
//! Implements the [`crate::backend`] traits so sweeps run end to end: a
//! one-hidden-layer classifier whose width is the model size, built from
//! `candle_nn::Linear` layers in a `VarMap`; cross-entropy with optional label
//! smoothing; Adam through candle's `AdamW`; and a synthetic labelled dataset.

pub mod data;
pub mod factory;
pub mod loss;
pub mod mlp;
pub mod optim;
pub mod preview;

pub use data::{LabelledSet, MAX_NOISE, MemoryLoader, SyntheticTask};
pub use factory::ReferenceFactory;
pub use loss::CrossEntropy;
pub use mlp::Mlp;
pub use optim::Adam;
pub use preview::{TokenLookup, TokenPreview, Vocabulary};
