//! One-hidden-layer ReLU classifier whose hidden width is the model size.

use crate::backend::{Model, ModelMode};
use crate::error::SweepError;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Linear, Module, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `features -> width -> classes` with a ReLU between the layers.
///
/// Weights live in a [`VarMap`]; build the optimizer over [`Mlp::vars`].
pub struct Mlp {
    hidden: Linear,
    output: Linear,
    varmap: VarMap,
    width: usize,
    mode: ModelMode,
}

impl Mlp {
    /// Glorot-uniform weights and zero biases, drawn from `seed`.
    pub fn new(
        features: usize,
        width: usize,
        classes: usize,
        seed: u64,
        device: &Device,
    ) -> Result<Self, SweepError> {
        if features == 0 || width == 0 || classes == 0 {
            return Err(SweepError::shape(format!(
                "cannot build a {features}-{width}-{classes} classifier"
            )));
        }
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let hidden = candle_nn::linear(features, width, vb.pp("hidden"))?;
        let output = candle_nn::linear(width, classes, vb.pp("output"))?;

        // candle's CPU initialisers cannot be seeded, so overwrite them in place.
        let mut rng = StdRng::seed_from_u64(seed);
        for (name, inputs, outputs) in [("hidden", features, width), ("output", width, classes)] {
            varmap.set_one(
                format!("{name}.weight"),
                glorot_uniform(inputs, outputs, &mut rng, device)?,
            )?;
            varmap.set_one(
                format!("{name}.bias"),
                Tensor::zeros(outputs, DType::F32, device)?,
            )?;
        }

        Ok(Self {
            hidden,
            output,
            varmap,
            width,
            mode: ModelMode::Train,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Trainable variables, shared with the layers.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}

fn glorot_uniform(
    inputs: usize,
    outputs: usize,
    rng: &mut StdRng,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let limit = (6.0 / (inputs + outputs) as f64).sqrt() as f32;
    let data: Vec<f32> = (0..inputs * outputs)
        .map(|_| rng.gen_range(-limit..limit))
        .collect();
    Tensor::from_vec(data, (outputs, inputs), device)
}

impl Model for Mlp {
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, input: &Tensor) -> Result<Tensor, SweepError> {
        let h = self.hidden.forward(input)?.relu()?;
        Ok(self.output.forward(&h)?)
    }

    fn mode(&self) -> ModelMode {
        self.mode
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.mode = mode;
    }

    fn parameter_count(&self) -> usize {
        self.vars().iter().map(|v| v.elem_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(mlp: &Mlp, name: &str) -> Vec<f32> {
        let data = mlp.varmap().data().lock().unwrap();
        data[name].as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn test_shapes_and_parameter_count() {
        let mlp = Mlp::new(3, 5, 2, 0, &Device::Cpu).unwrap();
        assert_eq!(mlp.width(), 5);
        assert_eq!(mlp.parameter_count(), 3 * 5 + 5 + 5 * 2 + 2);
        let x = Tensor::full(0.1f32, (4, 3), &Device::Cpu).unwrap();
        let y = mlp.forward(&x).unwrap();
        assert_eq!(y.dims(), &[4, 2]);
        let wrong = Tensor::zeros((1, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(mlp.forward(&wrong), Err(SweepError::Tensor(_))));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = Mlp::new(4, 8, 3, 11, &Device::Cpu).unwrap();
        let b = Mlp::new(4, 8, 3, 11, &Device::Cpu).unwrap();
        let c = Mlp::new(4, 8, 3, 12, &Device::Cpu).unwrap();
        assert_eq!(weights(&a, "hidden.weight"), weights(&b, "hidden.weight"));
        assert_ne!(weights(&a, "hidden.weight"), weights(&c, "hidden.weight"));
        assert!(weights(&a, "output.bias").iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_layers_see_overwritten_weights() {
        let mlp = Mlp::new(2, 3, 2, 5, &Device::Cpu).unwrap();
        // Zero biases and a zero input leave nothing for the layers to add.
        let x = Tensor::zeros((1, 2), DType::F32, &Device::Cpu).unwrap();
        let y = mlp.forward(&x).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(y, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rejects_empty_layer() {
        assert!(matches!(
            Mlp::new(3, 0, 2, 0, &Device::Cpu),
            Err(SweepError::Shape(_))
        ));
    }
}
