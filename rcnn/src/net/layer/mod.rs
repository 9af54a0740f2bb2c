mod concrete;
mod conv;
mod fully_connected;
mod max_pool;
mod prelu;

use crate::dtype::DTypeFloat;
use crate::error::{Error, Result};
use crate::net::initializer::NetInitializer;
use crate::persist::ParamArchive;
use crate::tensor::{Dim3, Tensor3};
use std::fmt::{Debug, Display, Formatter};

pub use concrete::{ConcreteLayer, ConcreteLayerParams};
pub use conv::{ConvLayer, ConvLayerParams};
pub use fully_connected::{FullyConnectedLayer, FullyConnectedLayerParams};
pub use max_pool::{MaxPoolLayer, MaxPoolLayerParams};
pub use prelu::{PReLULayer, PReLULayerParams};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LayerType {
    Conv,
    MaxPool,
    PReLU,
    FullyConnected,
}

impl LayerType {
    pub fn name(&self) -> &'static str {
        match self {
            LayerType::Conv => "conv",
            LayerType::MaxPool => "max_pool",
            LayerType::PReLU => "prelu",
            LayerType::FullyConnected => "fc",
        }
    }
}

impl Display for LayerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub trait LayerParams<F: DTypeFloat>: Clone + Debug {
    type Layer: Layer<F>;

    fn create_layer(
        &self,
        layer_idx: usize,
        input_shape: Dim3,
        initializer: &mut dyn NetInitializer<F>,
    ) -> Result<Self::Layer>;
}

/// One stage of the network. Every layer consumes and produces a (depth, height, width) tensor.
pub trait Layer<F: DTypeFloat>: Debug {
    fn forward(&mut self, input: &Tensor3<F>) -> Result<Tensor3<F>>;

    /// Returns the gradient w.r.t. `input` given the gradient w.r.t. this layer's output.
    ///
    /// `input` must be the tensor the matching `forward` call consumed. Parameter
    /// gradients are collected inside the layer until the next `update`.
    fn backward(&mut self, input: &Tensor3<F>, output_error: &Tensor3<F>) -> Result<Tensor3<F>>;

    /// Applies the collected gradients scaled by `learn_rate` and resets them to zero.
    fn update(&mut self, learn_rate: F);

    fn clear_gradients(&mut self);

    /// True when some gradient buffer holds a non-zero value.
    fn has_pending_gradients(&self) -> bool;

    fn layer_type(&self) -> LayerType;
    fn input_shape(&self) -> Dim3;
    fn output_shape(&self) -> Dim3;

    fn num_params(&self) -> usize {
        0
    }

    fn save_params(&self, _prefix: &str, _archive: &mut ParamArchive) {}

    fn load_params(&mut self, _prefix: &str, _archive: &ParamArchive) -> Result<()> {
        Ok(())
    }
}

#[inline]
pub(crate) fn check_shape(context: &'static str, expected: Dim3, actual: &Dim3) -> Result<()> {
    if &expected != actual {
        Err(Error::shape_mismatch(context, expected, actual))
    } else {
        Ok(())
    }
}

#[inline]
pub(crate) fn param_key(prefix: &str, field: &str) -> String {
    format!("{prefix}.{field}")
}
