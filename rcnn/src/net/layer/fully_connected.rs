use super::{check_shape, param_key, ConcreteLayerParams, Layer, LayerParams, LayerType};
use crate::dtype::DTypeFloat;
use crate::error::{Error, Result};
use crate::net::initializer::NetInitializer;
use crate::persist::ParamArchive;
use crate::tensor::{Dim1, Dim2, Dim3, Dims, Tensor1, Tensor2, Tensor3};
use std::fmt::{Debug, Formatter};

#[derive(Clone, Debug, PartialEq)]
pub struct FullyConnectedLayerParams {
    pub size: usize,
}

impl<F: DTypeFloat> LayerParams<F> for FullyConnectedLayerParams {
    type Layer = FullyConnectedLayer<F>;

    fn create_layer(
        &self,
        layer_idx: usize,
        input_shape: Dim3,
        initializer: &mut dyn NetInitializer<F>,
    ) -> Result<Self::Layer> {
        let output_size = self.size;
        let input_size = input_shape.tensor_len();
        if output_size == 0 || input_size == 0 {
            return Err(Error::InvalidGeometry(format!(
                "fully connected layer of size {output_size} cannot take input {input_shape}"
            )));
        }
        let weight_dims = Dim2(output_size, input_size);
        let weights = initializer.get_weights(layer_idx, weight_dims);
        let biases = initializer.get_biases(LayerType::FullyConnected, layer_idx, Dim1(output_size));
        assert_eq!(weights.dims(), &weight_dims);
        assert_eq!(biases.dims(), &Dim1(output_size));
        log::debug!("layer {layer_idx}: fc {input_shape} -> {output_size}");
        Ok(FullyConnectedLayer {
            input_shape,
            output_size,
            weight_grad: Tensor2::zeroed(weight_dims),
            bias_grad: Tensor1::zeroed(Dim1(output_size)),
            weights,
            biases,
        })
    }
}

impl From<FullyConnectedLayerParams> for ConcreteLayerParams {
    fn from(value: FullyConnectedLayerParams) -> Self {
        ConcreteLayerParams::FullyConnected(value)
    }
}

/// Dense layer over the flattened input. The output is shaped (1, 1, size).
#[derive(Clone)]
pub struct FullyConnectedLayer<F: DTypeFloat> {
    input_shape: Dim3,
    output_size: usize,
    weights: Tensor2<F>,
    biases: Tensor1<F>,
    weight_grad: Tensor2<F>,
    bias_grad: Tensor1<F>,
}

impl<F: DTypeFloat> FullyConnectedLayer<F> {
    #[inline]
    pub fn weights(&self) -> &Tensor2<F> {
        &self.weights
    }
    #[inline]
    pub fn weights_mut(&mut self) -> &mut Tensor2<F> {
        &mut self.weights
    }
    #[inline]
    pub fn biases(&self) -> &Tensor1<F> {
        &self.biases
    }
    #[inline]
    pub fn biases_mut(&mut self) -> &mut Tensor1<F> {
        &mut self.biases
    }
    #[inline]
    pub fn weight_gradients(&self) -> &Tensor2<F> {
        &self.weight_grad
    }
    #[inline]
    pub fn bias_gradients(&self) -> &Tensor1<F> {
        &self.bias_grad
    }

    #[inline]
    fn input_size(&self) -> usize {
        self.input_shape.tensor_len()
    }
}

impl<F: DTypeFloat> Layer<F> for FullyConnectedLayer<F> {
    fn forward(&mut self, input: &Tensor3<F>) -> Result<Tensor3<F>> {
        check_shape("fc forward input", self.input_shape, input.dims())?;
        let mut output = Tensor3::from_vec(self.biases.as_ref().to_vec(), Dim3(1, 1, self.output_size));
        F::gemm(
            F::ONE,
            self.weights.as_ref(),
            *self.weights.dims(),
            false,
            input.as_ref(),
            Dim2(self.input_size(), 1),
            false,
            F::ONE,
            output.as_mut(),
            Dim2(self.output_size, 1),
        );
        Ok(output)
    }

    fn backward(&mut self, input: &Tensor3<F>, output_error: &Tensor3<F>) -> Result<Tensor3<F>> {
        check_shape("fc backward input", self.input_shape, input.dims())?;
        check_shape("fc backward output error", self.output_shape(), output_error.dims())?;
        let (n_out, n_in) = (self.output_size, self.input_size());

        // dW += dout (outer) x
        let weight_dims = *self.weight_grad.dims();
        F::gemm(
            F::ONE,
            output_error.as_ref(),
            Dim2(n_out, 1),
            false,
            input.as_ref(),
            Dim2(1, n_in),
            false,
            F::ONE,
            self.weight_grad.as_mut(),
            weight_dims,
        );
        for (g, &e) in self.bias_grad.iter_mut().zip(output_error.iter()) {
            *g += e;
        }

        let mut input_error = Tensor3::zeroed(self.input_shape);
        F::gemm(
            F::ONE,
            self.weights.as_ref(),
            *self.weights.dims(),
            true,
            output_error.as_ref(),
            Dim2(n_out, 1),
            false,
            F::ZERO,
            input_error.as_mut(),
            Dim2(n_in, 1),
        );
        Ok(input_error)
    }

    fn update(&mut self, learn_rate: F) {
        for (w, &g) in self.weights.iter_mut().zip(self.weight_grad.iter()) {
            *w -= learn_rate * g;
        }
        for (b, &g) in self.biases.iter_mut().zip(self.bias_grad.iter()) {
            *b -= learn_rate * g;
        }
        self.clear_gradients();
    }

    fn clear_gradients(&mut self) {
        self.weight_grad.fill_zero();
        self.bias_grad.fill_zero();
    }

    fn has_pending_gradients(&self) -> bool {
        !(self.weight_grad.is_zero() && self.bias_grad.is_zero())
    }

    #[inline]
    fn layer_type(&self) -> LayerType {
        LayerType::FullyConnected
    }

    #[inline]
    fn input_shape(&self) -> Dim3 {
        self.input_shape
    }

    #[inline]
    fn output_shape(&self) -> Dim3 {
        Dim3(1, 1, self.output_size)
    }

    fn num_params(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn save_params(&self, prefix: &str, archive: &mut ParamArchive) {
        archive.insert(param_key(prefix, "weights"), &self.weights);
        archive.insert(param_key(prefix, "biases"), &self.biases);
        archive.insert(param_key(prefix, "weights_grad"), &self.weight_grad);
        archive.insert(param_key(prefix, "biases_grad"), &self.bias_grad);
    }

    fn load_params(&mut self, prefix: &str, archive: &ParamArchive) -> Result<()> {
        let weight_dims = *self.weights.dims();
        let bias_dims = *self.biases.dims();
        let weights = archive.get(&param_key(prefix, "weights"), weight_dims)?;
        let biases = archive.get(&param_key(prefix, "biases"), bias_dims)?;
        let weight_grad = archive.get(&param_key(prefix, "weights_grad"), weight_dims)?;
        let bias_grad = archive.get(&param_key(prefix, "biases_grad"), bias_dims)?;
        self.weights = weights;
        self.biases = biases;
        self.weight_grad = weight_grad;
        self.bias_grad = bias_grad;
        Ok(())
    }
}

impl<F: DTypeFloat> Debug for FullyConnectedLayer<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullyConnectedLayer")
            .field("input_shape", &self.input_shape)
            .field("size", &self.output_size)
            .field("weights", &self.weights)
            .field("biases", &self.biases)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::initializer::ConstantNetInitializer;

    fn layer(input: Dim3, size: usize) -> FullyConnectedLayer<f64> {
        let mut init = ConstantNetInitializer {
            weight: 0.0,
            bias: 0.0,
            alpha: 0.25,
        };
        FullyConnectedLayerParams { size }.create_layer(0, input, &mut init).unwrap()
    }

    #[test]
    fn test_forward_flattens_input() {
        let mut l = layer(Dim3(2, 1, 2), 2);
        l.weights_mut().as_mut().copy_from_slice(&[1., 2., 3., 4., -1., 0., 1., 0.]);
        l.biases_mut().as_mut().copy_from_slice(&[0.5, -0.5]);
        let input = Tensor3::from_vec(vec![1., 1., 2., -1.], Dim3(2, 1, 2));
        let out = l.forward(&input).unwrap();
        assert_eq!(out.dims(), &Dim3(1, 1, 2));
        assert_eq!(out.as_ref(), &[5.5, 0.5]);
    }

    #[test]
    fn test_backward_accumulates_until_update() {
        let mut l = layer(Dim3(1, 1, 3), 2);
        l.weights_mut().as_mut().copy_from_slice(&[1., 0., 2., 0., 1., -1.]);
        let input = Tensor3::from_vec(vec![1., 2., 3.], Dim3(1, 1, 3));
        let dout = Tensor3::from_vec(vec![1., -1.], Dim3(1, 1, 2));

        let din = l.backward(&input, &dout).unwrap();
        assert_eq!(din.dims(), &Dim3(1, 1, 3));
        assert_eq!(din.as_ref(), &[1., -1., 3.]);
        assert_eq!(l.weight_gradients().as_ref(), &[1., 2., 3., -1., -2., -3.]);
        assert_eq!(l.bias_gradients().as_ref(), &[1., -1.]);

        l.backward(&input, &dout).unwrap();
        assert_eq!(l.bias_gradients().as_ref(), &[2., -2.]);

        l.update(0.5);
        assert!(!l.has_pending_gradients());
        assert_eq!(l.weights().as_ref(), &[0., -2., -1., 1., 3., 2.]);
        assert_eq!(l.biases().as_ref(), &[-1., 1.]);
    }

    #[test]
    fn test_wrong_input_shape() {
        let mut l = layer(Dim3(1, 1, 3), 2);
        let res = l.forward(&Tensor3::zeroed(Dim3(1, 3, 1)));
        assert!(matches!(res, Err(Error::ShapeMismatch { .. })));
    }
}
