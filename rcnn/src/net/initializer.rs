use crate::dtype::DTypeFloat;
use crate::net::layer::LayerType;
use crate::tensor::{Dim1, Dim2, Dim3, Dim4, Dims, Tensor, Tensor1, Tensor2, Tensor3, Tensor4};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;

pub const DEFAULT_BIAS: f64 = 0.01;
pub const DEFAULT_PRELU_ALPHA: f64 = 0.25;

/// Source of the initial parameter values for every layer of a network.
pub trait NetInitializer<F: DTypeFloat> {
    /// Filter bank shaped (filters, depth, k, k).
    fn get_filters(&mut self, layer_idx: usize, dims: Dim4) -> Tensor4<F>;
    /// Weight matrix shaped (outputs, fan_in).
    fn get_weights(&mut self, layer_idx: usize, dims: Dim2) -> Tensor2<F>;
    fn get_biases(&mut self, layer_type: LayerType, layer_idx: usize, dims: Dim1) -> Tensor1<F>;
    /// Per-channel slopes shaped (depth, 1, 1).
    fn get_alpha(&mut self, layer_idx: usize, dims: Dim3) -> Tensor3<F>;
}

/// He-normal weights, constant biases and slopes.
pub struct RandomNetInitializer {
    rng: StdRng,
}

impl RandomNetInitializer {
    pub fn seed_from_u64(seed: u64) -> Self {
        RandomNetInitializer {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_rng(rng: StdRng) -> Self {
        RandomNetInitializer { rng }
    }

    fn sample_normal<F: DTypeFloat, D: Dims>(&mut self, fan_in: usize, dims: D) -> Tensor<F, D> {
        let std = (2.0 / fan_in as f64).sqrt();
        let dist = Normal::new(0.0, std).expect("std is finite and positive");
        let vec: Vec<F> = dist
            .sample_iter(&mut self.rng)
            .take(dims.tensor_len())
            .map(F::from_f64)
            .collect();
        Tensor::from_vec(vec, dims)
    }
}

impl Default for RandomNetInitializer {
    fn default() -> Self {
        RandomNetInitializer {
            rng: StdRng::from_entropy(),
        }
    }
}

impl<F: DTypeFloat> NetInitializer<F> for RandomNetInitializer {
    fn get_filters(&mut self, _layer_idx: usize, dims: Dim4) -> Tensor4<F> {
        let Dim4(_, depth, kh, kw) = dims;
        self.sample_normal(kh * kw * depth, dims)
    }

    fn get_weights(&mut self, _layer_idx: usize, dims: Dim2) -> Tensor2<F> {
        self.sample_normal(dims.cols(), dims)
    }

    fn get_biases(&mut self, _layer_type: LayerType, _layer_idx: usize, dims: Dim1) -> Tensor1<F> {
        Tensor::filled(F::from_f64(DEFAULT_BIAS), dims)
    }

    fn get_alpha(&mut self, _layer_idx: usize, dims: Dim3) -> Tensor3<F> {
        Tensor::filled(F::from_f64(DEFAULT_PRELU_ALPHA), dims)
    }
}

/// Fills every parameter with the same value. Handy for deterministic tests.
pub struct ConstantNetInitializer {
    pub weight: f64,
    pub bias: f64,
    pub alpha: f64,
}

impl<F: DTypeFloat> NetInitializer<F> for ConstantNetInitializer {
    fn get_filters(&mut self, _layer_idx: usize, dims: Dim4) -> Tensor4<F> {
        Tensor::filled(F::from_f64(self.weight), dims)
    }

    fn get_weights(&mut self, _layer_idx: usize, dims: Dim2) -> Tensor2<F> {
        Tensor::filled(F::from_f64(self.weight), dims)
    }

    fn get_biases(&mut self, _layer_type: LayerType, _layer_idx: usize, dims: Dim1) -> Tensor1<F> {
        Tensor::filled(F::from_f64(self.bias), dims)
    }

    fn get_alpha(&mut self, _layer_idx: usize, dims: Dim3) -> Tensor3<F> {
        Tensor::filled(F::from_f64(self.alpha), dims)
    }
}
