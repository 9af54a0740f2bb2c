use super::{
    ConvLayer, ConvLayerParams, FullyConnectedLayer, FullyConnectedLayerParams, Layer, LayerParams, LayerType,
    MaxPoolLayer, MaxPoolLayerParams, PReLULayer, PReLULayerParams,
};
use crate::dtype::DTypeFloat;
use crate::error::Result;
use crate::net::initializer::NetInitializer;
use crate::persist::ParamArchive;
use crate::tensor::{Dim3, Tensor3};
use std::fmt::{Debug, Formatter};

// LayerParams has an associated type, so it cannot be boxed as a trait object.
// The closed set of layer kinds is dispatched through these enums instead.

#[derive(Clone, Debug, PartialEq)]
pub enum ConcreteLayerParams {
    Conv(ConvLayerParams),
    MaxPool(MaxPoolLayerParams),
    PReLU(PReLULayerParams),
    FullyConnected(FullyConnectedLayerParams),
}

impl<F: DTypeFloat> LayerParams<F> for ConcreteLayerParams {
    type Layer = ConcreteLayer<F>;

    fn create_layer(
        &self,
        layer_idx: usize,
        input_shape: Dim3,
        initializer: &mut dyn NetInitializer<F>,
    ) -> Result<Self::Layer> {
        Ok(match self {
            ConcreteLayerParams::Conv(params) => {
                ConcreteLayer::Conv(params.create_layer(layer_idx, input_shape, initializer)?)
            }
            ConcreteLayerParams::MaxPool(params) => {
                ConcreteLayer::MaxPool(params.create_layer(layer_idx, input_shape, initializer)?)
            }
            ConcreteLayerParams::PReLU(params) => {
                ConcreteLayer::PReLU(params.create_layer(layer_idx, input_shape, initializer)?)
            }
            ConcreteLayerParams::FullyConnected(params) => {
                ConcreteLayer::FullyConnected(params.create_layer(layer_idx, input_shape, initializer)?)
            }
        })
    }
}

#[derive(Clone)]
pub enum ConcreteLayer<F: DTypeFloat> {
    Conv(ConvLayer<F>),
    MaxPool(MaxPoolLayer<F>),
    PReLU(PReLULayer<F>),
    FullyConnected(FullyConnectedLayer<F>),
}

impl<F: DTypeFloat> ConcreteLayer<F> {
    fn inner(&self) -> &dyn Layer<F> {
        match self {
            ConcreteLayer::Conv(inner) => inner,
            ConcreteLayer::MaxPool(inner) => inner,
            ConcreteLayer::PReLU(inner) => inner,
            ConcreteLayer::FullyConnected(inner) => inner,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Layer<F> {
        match self {
            ConcreteLayer::Conv(inner) => inner,
            ConcreteLayer::MaxPool(inner) => inner,
            ConcreteLayer::PReLU(inner) => inner,
            ConcreteLayer::FullyConnected(inner) => inner,
        }
    }
}

impl<F: DTypeFloat> Layer<F> for ConcreteLayer<F> {
    #[inline]
    fn forward(&mut self, input: &Tensor3<F>) -> Result<Tensor3<F>> {
        self.inner_mut().forward(input)
    }

    #[inline]
    fn backward(&mut self, input: &Tensor3<F>, output_error: &Tensor3<F>) -> Result<Tensor3<F>> {
        self.inner_mut().backward(input, output_error)
    }

    #[inline]
    fn update(&mut self, learn_rate: F) {
        self.inner_mut().update(learn_rate)
    }

    #[inline]
    fn clear_gradients(&mut self) {
        self.inner_mut().clear_gradients()
    }

    #[inline]
    fn has_pending_gradients(&self) -> bool {
        self.inner().has_pending_gradients()
    }

    #[inline]
    fn layer_type(&self) -> LayerType {
        self.inner().layer_type()
    }

    #[inline]
    fn input_shape(&self) -> Dim3 {
        self.inner().input_shape()
    }

    #[inline]
    fn output_shape(&self) -> Dim3 {
        self.inner().output_shape()
    }

    #[inline]
    fn num_params(&self) -> usize {
        self.inner().num_params()
    }

    fn save_params(&self, prefix: &str, archive: &mut ParamArchive) {
        self.inner().save_params(prefix, archive)
    }

    fn load_params(&mut self, prefix: &str, archive: &ParamArchive) -> Result<()> {
        self.inner_mut().load_params(prefix, archive)
    }
}

impl<F: DTypeFloat> Debug for ConcreteLayer<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self.inner(), f)
    }
}
