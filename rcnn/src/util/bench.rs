//! Seeded fixtures shared by the benchmarks.

use crate::dtype::DTypeFloat;
use crate::net::initializer::RandomNetInitializer;
use crate::net::layer::{ConvLayer, ConvLayerParams, LayerParams};
use crate::net::{Network, INPUT_SHAPE};
use crate::tensor::{Dim3, Tensor3};
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::StandardNormal;

pub const SHAPE_INPUT: Dim3 = INPUT_SHAPE;
pub const SHAPE_HIDDEN: Dim3 = Dim3(16, 12, 12);
const SEED: u64 = 0x8371943;

pub fn random_input<F>(shape: Dim3) -> Tensor3<F>
where
    StandardNormal: Distribution<F>,
{
    let mut rng = StdRng::seed_from_u64(SEED);
    Tensor3::from_distribution(&mut rng, StandardNormal, shape)
}

/// A 3x3 convolution over `input` producing `filters` channels.
pub fn conv_layer<F: DTypeFloat>(input: Dim3, filters: usize) -> ConvLayer<F> {
    let mut init = RandomNetInitializer::seed_from_u64(SEED);
    match ConvLayerParams::new(filters, 3).create_layer(0, input, &mut init) {
        Ok(layer) => layer,
        Err(e) => panic!("invalid benchmark geometry: {e}"),
    }
}

pub fn network<F: DTypeFloat>() -> Network<F> {
    match Network::new(&mut RandomNetInitializer::seed_from_u64(SEED)) {
        Ok(net) => net,
        Err(e) => panic!("failed to build benchmark network: {e}"),
    }
}
