use super::{check_shape, param_key, ConcreteLayerParams, Layer, LayerParams, LayerType};
use crate::dtype::DTypeFloat;
use crate::error::{Error, Result};
use crate::net::initializer::NetInitializer;
use crate::persist::ParamArchive;
use crate::tensor::{Dim3, Tensor3};
use std::fmt::{Debug, Formatter};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PReLULayerParams;

impl<F: DTypeFloat> LayerParams<F> for PReLULayerParams {
    type Layer = PReLULayer<F>;

    fn create_layer(
        &self,
        layer_idx: usize,
        input_shape: Dim3,
        initializer: &mut dyn NetInitializer<F>,
    ) -> Result<Self::Layer> {
        if input_shape.depth() == 0 {
            return Err(Error::InvalidGeometry(format!("prelu needs at least one channel, got {input_shape}")));
        }
        let alpha_dims = Dim3(input_shape.depth(), 1, 1);
        let alpha = initializer.get_alpha(layer_idx, alpha_dims);
        assert_eq!(alpha.dims(), &alpha_dims);
        log::debug!("layer {layer_idx}: prelu {input_shape}");
        Ok(PReLULayer {
            shape: input_shape,
            alpha,
            alpha_grad: Tensor3::zeroed(alpha_dims),
        })
    }
}

impl From<PReLULayerParams> for ConcreteLayerParams {
    fn from(value: PReLULayerParams) -> Self {
        ConcreteLayerParams::PReLU(value)
    }
}

/// Parametric ReLU with one learnable negative-side slope per channel.
///
/// Unlike the other layers, the slope gradient is overwritten by every backward
/// call rather than summed, so it must be consumed by `update` before the next one.
#[derive(Clone)]
pub struct PReLULayer<F: DTypeFloat> {
    shape: Dim3,
    alpha: Tensor3<F>,
    alpha_grad: Tensor3<F>,
}

impl<F: DTypeFloat> PReLULayer<F> {
    #[inline]
    pub fn alpha(&self) -> &Tensor3<F> {
        &self.alpha
    }
    #[inline]
    pub fn alpha_mut(&mut self) -> &mut Tensor3<F> {
        &mut self.alpha
    }
    #[inline]
    pub fn alpha_gradients(&self) -> &Tensor3<F> {
        &self.alpha_grad
    }

    #[inline]
    fn plane(&self) -> usize {
        self.shape.height() * self.shape.width()
    }
}

impl<F: DTypeFloat> Layer<F> for PReLULayer<F> {
    fn forward(&mut self, input: &Tensor3<F>) -> Result<Tensor3<F>> {
        check_shape("prelu forward input", self.shape, input.dims())?;
        let mut output = input.clone();
        let plane = self.plane();
        for (out_plane, &a) in output.as_mut().chunks_exact_mut(plane).zip(self.alpha.iter()) {
            for o in out_plane.iter_mut() {
                let x = *o;
                *o = x.max(F::ZERO) + a * x.min(F::ZERO);
            }
        }
        Ok(output)
    }

    fn backward(&mut self, input: &Tensor3<F>, output_error: &Tensor3<F>) -> Result<Tensor3<F>> {
        check_shape("prelu backward input", self.shape, input.dims())?;
        check_shape("prelu backward output error", self.shape, output_error.dims())?;
        let mut input_error = Tensor3::zeroed(self.shape);
        let plane = self.plane();
        let channels = input_error
            .as_mut()
            .chunks_exact_mut(plane)
            .zip(input.as_ref().chunks_exact(plane))
            .zip(output_error.as_ref().chunks_exact(plane));
        for (((ie, x), err), (&a, g)) in channels.zip(self.alpha.iter().zip(self.alpha_grad.iter_mut())) {
            let mut grad = F::ZERO;
            for ((ie, &x), &e) in ie.iter_mut().zip(x).zip(err) {
                if x <= F::ZERO {
                    *ie = e * a;
                    grad += e * x;
                } else {
                    *ie = e;
                }
            }
            *g = grad;
        }
        Ok(input_error)
    }

    fn update(&mut self, learn_rate: F) {
        for (a, &g) in self.alpha.iter_mut().zip(self.alpha_grad.iter()) {
            *a -= learn_rate * g;
        }
        self.clear_gradients();
    }

    fn clear_gradients(&mut self) {
        self.alpha_grad.fill_zero();
    }

    fn has_pending_gradients(&self) -> bool {
        !self.alpha_grad.is_zero()
    }

    #[inline]
    fn layer_type(&self) -> LayerType {
        LayerType::PReLU
    }

    #[inline]
    fn input_shape(&self) -> Dim3 {
        self.shape
    }

    #[inline]
    fn output_shape(&self) -> Dim3 {
        self.shape
    }

    fn num_params(&self) -> usize {
        self.alpha.len()
    }

    fn save_params(&self, prefix: &str, archive: &mut ParamArchive) {
        archive.insert(param_key(prefix, "alpha"), &self.alpha);
        archive.insert(param_key(prefix, "alpha_grad"), &self.alpha_grad);
    }

    fn load_params(&mut self, prefix: &str, archive: &ParamArchive) -> Result<()> {
        let dims = *self.alpha.dims();
        let alpha = archive.get(&param_key(prefix, "alpha"), dims)?;
        let alpha_grad = archive.get(&param_key(prefix, "alpha_grad"), dims)?;
        self.alpha = alpha;
        self.alpha_grad = alpha_grad;
        Ok(())
    }
}

impl<F: DTypeFloat> Debug for PReLULayer<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PReLULayer")
            .field("shape", &self.shape)
            .field("alpha", &self.alpha)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::initializer::RandomNetInitializer;

    fn layer(shape: Dim3) -> PReLULayer<f64> {
        let mut init = RandomNetInitializer::seed_from_u64(0);
        PReLULayerParams.create_layer(0, shape, &mut init).unwrap()
    }

    #[test]
    fn test_forward_per_channel() {
        let mut l = layer(Dim3(2, 1, 3));
        l.alpha_mut()[[1, 0, 0]] = 0.5;
        let input = Tensor3::from_vec(vec![-4., 0., 2., -4., 0., 2.], Dim3(2, 1, 3));
        let out = l.forward(&input).unwrap();
        assert_eq!(out.as_ref(), &[-1., 0., 2., -2., 0., 2.]);
    }

    #[test]
    fn test_backward() {
        let mut l = layer(Dim3(1, 2, 2));
        let input = Tensor3::from_vec(vec![-2., 3., 0., -1.], Dim3(1, 2, 2));
        let dout = Tensor3::from_vec(vec![1., 2., 3., 4.], Dim3(1, 2, 2));
        let din = l.backward(&input, &dout).unwrap();
        assert_eq!(din.as_ref(), &[0.25, 2., 0.75, 1.]);
        // sum of dout * x where x <= 0: 1 * -2 + 3 * 0 + 4 * -1
        assert_eq!(l.alpha_gradients().as_ref(), &[-6.]);
    }

    #[test]
    fn test_alpha_gradient_is_overwritten() {
        let mut l = layer(Dim3(1, 1, 2));
        let input = Tensor3::from_vec(vec![-1., 1.], Dim3(1, 1, 2));
        let dout = Tensor3::from_vec(vec![1., 1.], Dim3(1, 1, 2));
        l.backward(&input, &dout).unwrap();
        l.backward(&input, &dout).unwrap();
        assert_eq!(l.alpha_gradients().as_ref(), &[-1.]);
        l.update(0.1);
        assert!(!l.has_pending_gradients());
        assert!((l.alpha()[0] - 0.35).abs() < 1e-12);
    }
}
