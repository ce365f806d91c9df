//! Synthetic labelled data and in-memory batch loaders.

use crate::backend::{Batch, BatchLoader};
use crate::error::SweepError;
use candle_core::{Device, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

/// Largest accepted noise half-width.
pub const MAX_NOISE: f64 = 1e3;

/// A classification task: one prototype per class, examples scattered around it.
#[derive(Debug, Clone)]
pub struct SyntheticTask {
    features: usize,
    classes: usize,
    noise: f32,
    prototypes: Vec<f32>,
}

impl SyntheticTask {
    pub fn new(features: usize, classes: usize, noise: f64, seed: u64) -> Result<Self, SweepError> {
        if features == 0 || classes == 0 {
            return Err(SweepError::config(
                "synthetic task needs at least one feature and one class",
            ));
        }
        if !(0.0..=MAX_NOISE).contains(&noise) {
            return Err(SweepError::config(format!(
                "noise must lie in [0, {MAX_NOISE}], got {noise}"
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let prototypes = (0..features * classes)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        Ok(Self {
            features,
            classes,
            noise: noise as f32,
            prototypes,
        })
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Draw `samples` labelled examples.
    pub fn sample(&self, samples: usize, seed: u64) -> LabelledSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut inputs = Vec::with_capacity(samples * self.features);
        let mut labels = Vec::with_capacity(samples);
        for _ in 0..samples {
            let label = rng.gen_range(0..self.classes);
            let proto = &self.prototypes[label * self.features..(label + 1) * self.features];
            for &p in proto {
                let jitter = if self.noise > 0.0 {
                    rng.gen_range(-self.noise..self.noise)
                } else {
                    0.0
                };
                inputs.push(p + jitter);
            }
            labels.push(label as u32);
        }
        LabelledSet {
            features: self.features,
            inputs,
            labels,
        }
    }
}

/// Examples stored row-major alongside their class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledSet {
    features: usize,
    inputs: Vec<f32>,
    labels: Vec<u32>,
}

impl LabelledSet {
    pub fn new(features: usize, inputs: Vec<f32>, labels: Vec<u32>) -> Result<Self, SweepError> {
        if inputs.len() != features * labels.len() {
            return Err(SweepError::shape(format!(
                "{} inputs do not split into {} examples of {features} features",
                inputs.len(),
                labels.len()
            )));
        }
        Ok(Self {
            features,
            inputs,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// The set concatenated with itself `times` times.
    pub fn repeat(&self, times: usize) -> Self {
        Self {
            features: self.features,
            inputs: self.inputs.repeat(times),
            labels: self.labels.repeat(times),
        }
    }

    fn gather(&self, indices: &[usize], device: &Device) -> Result<Batch<Tensor, Tensor>, SweepError> {
        let mut data = Vec::with_capacity(indices.len() * self.features);
        for &i in indices {
            data.extend_from_slice(&self.inputs[i * self.features..(i + 1) * self.features]);
        }
        let labels: Vec<u32> = indices.iter().map(|&i| self.labels[i]).collect();
        Ok(Batch {
            inputs: Tensor::from_vec(data, (indices.len(), self.features), device)?,
            targets: Tensor::from_vec(labels, indices.len(), device)?,
        })
    }
}

/// Batches over an in-memory [`LabelledSet`].
///
/// A training loader reshuffles at the start of every pass; an evaluation
/// loader always yields the same batches in the same order. Batches are
/// built on the CPU device.
#[derive(Debug, Clone)]
pub struct MemoryLoader {
    set: LabelledSet,
    batch_size: usize,
    drop_last: bool,
    order: Vec<usize>,
    shuffle: Option<StdRng>,
    device: Device,
}

impl MemoryLoader {
    pub fn train(set: LabelledSet, batch_size: usize, seed: u64) -> Result<Self, SweepError> {
        Self::build(set, batch_size, Some(StdRng::seed_from_u64(seed)))
    }

    pub fn eval(set: LabelledSet, batch_size: usize) -> Result<Self, SweepError> {
        Self::build(set, batch_size, None)
    }

    fn build(set: LabelledSet, batch_size: usize, shuffle: Option<StdRng>) -> Result<Self, SweepError> {
        if batch_size == 0 {
            return Err(SweepError::config("batch_size must be at least 1"));
        }
        let order = (0..set.len()).collect();
        Ok(Self {
            set,
            batch_size,
            drop_last: false,
            order,
            shuffle,
            device: Device::Cpu,
        })
    }

    /// Skip a trailing batch smaller than `batch_size`.
    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl BatchLoader for MemoryLoader {
    type Input = Tensor;
    type Target = Tensor;

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch<Tensor, Tensor>, SweepError>> + '_> {
        if let Some(rng) = self.shuffle.as_mut() {
            self.order.shuffle(rng);
        }
        let set = &self.set;
        let device = &self.device;
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;
        Box::new(
            self.order
                .chunks(batch_size)
                .filter(move |chunk| !drop_last || chunk.len() == batch_size)
                .map(move |chunk| set.gather(chunk, device)),
        )
    }

    fn num_batches(&self) -> usize {
        if self.drop_last {
            self.set.len() / self.batch_size
        } else {
            self.set.len().div_ceil(self.batch_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(n: usize) -> LabelledSet {
        let inputs = (0..n).map(|i| i as f32).collect();
        LabelledSet::new(1, inputs, (0..n as u32).collect()).unwrap()
    }

    fn pass_labels(loader: &mut MemoryLoader) -> Vec<u32> {
        loader
            .batches()
            .flat_map(|b| b.unwrap().targets.to_vec1::<u32>().unwrap())
            .collect()
    }

    #[test]
    fn test_eval_loader_is_fixed() {
        let mut loader = MemoryLoader::eval(set(5), 2).unwrap();
        assert_eq!(loader.num_batches(), 3);
        let first = pass_labels(&mut loader);
        assert_eq!(first, vec![0, 1, 2, 3, 4]);
        assert_eq!(pass_labels(&mut loader), first);
    }

    #[test]
    fn test_train_loader_reshuffles_each_pass() {
        let mut loader = MemoryLoader::train(set(64), 8, 3).unwrap();
        let a = pass_labels(&mut loader);
        let b = pass_labels(&mut loader);
        assert_ne!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_last() {
        let mut loader = MemoryLoader::train(set(5), 2, 0).unwrap().with_drop_last(true);
        assert_eq!(loader.num_batches(), 2);
        let sizes: Vec<usize> = loader
            .batches()
            .map(|b| b.unwrap().targets.dims1().unwrap())
            .collect();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[test]
    fn test_batch_inputs_follow_labels() {
        let mut loader = MemoryLoader::train(set(10), 4, 1).unwrap();
        for batch in loader.batches() {
            let batch = batch.unwrap();
            assert_eq!(batch.inputs.dims()[1], 1);
            let inputs = batch.inputs.flatten_all().unwrap().to_vec1::<f32>().unwrap();
            let labels = batch.targets.to_vec1::<u32>().unwrap();
            for (x, label) in inputs.into_iter().zip(labels) {
                assert_eq!(x, label as f32);
            }
        }
    }

    #[test]
    fn test_repeat_and_sampling() {
        let task = SyntheticTask::new(3, 4, 0.1, 9).unwrap();
        let data = task.sample(10, 1);
        assert_eq!(data.len(), 10);
        assert!(data.labels().iter().all(|&l| l < 4));
        assert_eq!(task.sample(10, 1), data);
        assert_eq!(data.repeat(3).len(), 30);
    }

    #[test]
    fn test_noise_is_bounded() {
        assert!(SyntheticTask::new(3, 4, MAX_NOISE, 0).is_ok());
        for noise in [1e308, f64::INFINITY, f64::NAN, -1.0] {
            assert!(SyntheticTask::new(3, 4, noise, 0).is_err(), "noise {noise} accepted");
        }
    }

    #[test]
    fn test_rejects_zero_batch() {
        assert!(MemoryLoader::eval(set(3), 0).is_err());
    }
}
