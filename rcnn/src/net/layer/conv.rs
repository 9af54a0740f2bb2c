use super::{check_shape, param_key, ConcreteLayerParams, Layer, LayerParams, LayerType};
use crate::dtype::DTypeFloat;
use crate::error::{Error, Result};
use crate::net::initializer::NetInitializer;
use crate::persist::ParamArchive;
use crate::tensor::{Dim1, Dim2, Dim3, Dim4, Tensor1, Tensor2, Tensor3, Tensor4};
use std::fmt::{Debug, Formatter};

#[derive(Clone, Debug, PartialEq)]
pub struct ConvLayerParams {
    pub filters: usize,
    pub kernel_size: usize,
    pub padding: usize,
    pub stride: usize,
}

impl ConvLayerParams {
    /// `filters` square `kernel_size` filters, unpadded, stride 1.
    pub fn new(filters: usize, kernel_size: usize) -> Self {
        ConvLayerParams {
            filters,
            kernel_size,
            padding: 0,
            stride: 1,
        }
    }
}

/// Spatial extent of a convolution output: `(input - kernel + 2 * padding) / stride + 1`,
/// which has to come out as a non-negative integer.
pub fn conv_output_size(input: usize, kernel: usize, padding: usize, stride: usize) -> Result<usize> {
    if kernel == 0 || stride == 0 {
        return Err(Error::InvalidGeometry(format!(
            "kernel size ({kernel}) and stride ({stride}) must be positive"
        )));
    }
    let padded = input + 2 * padding;
    if padded < kernel {
        return Err(Error::InvalidGeometry(format!(
            "kernel {kernel} larger than padded input {padded}"
        )));
    }
    if (padded - kernel) % stride != 0 {
        return Err(Error::InvalidGeometry(format!(
            "({input} - {kernel} + 2 * {padding}) is not divisible by stride {stride}"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

impl<F: DTypeFloat> LayerParams<F> for ConvLayerParams {
    type Layer = ConvLayer<F>;

    fn create_layer(
        &self,
        layer_idx: usize,
        input_shape: Dim3,
        initializer: &mut dyn NetInitializer<F>,
    ) -> Result<Self::Layer> {
        let &ConvLayerParams {
            filters,
            kernel_size,
            padding,
            stride,
        } = self;
        if filters == 0 || input_shape.depth() == 0 {
            return Err(Error::InvalidGeometry(format!(
                "convolution needs at least one filter and one input channel, got {filters} filters for input {input_shape}"
            )));
        }
        let output_shape = Dim3(
            filters,
            conv_output_size(input_shape.height(), kernel_size, padding, stride)?,
            conv_output_size(input_shape.width(), kernel_size, padding, stride)?,
        );
        let filter_dims = Dim4(filters, input_shape.depth(), kernel_size, kernel_size);
        let weights = initializer.get_filters(layer_idx, filter_dims);
        let biases = initializer.get_biases(LayerType::Conv, layer_idx, Dim1(filters));
        assert_eq!(weights.dims(), &filter_dims);
        assert_eq!(biases.dims(), &Dim1(filters));
        log::debug!("layer {layer_idx}: conv {input_shape} -> {output_shape}");
        Ok(ConvLayer {
            input_shape,
            output_shape,
            padding,
            stride,
            kernel_size,
            weight_grad: Tensor4::zeroed(filter_dims),
            bias_grad: Tensor1::zeroed(Dim1(filters)),
            weights,
            biases,
        })
    }
}

impl From<ConvLayerParams> for ConcreteLayerParams {
    fn from(value: ConvLayerParams) -> Self {
        ConcreteLayerParams::Conv(value)
    }
}

#[derive(Clone)]
pub struct ConvLayer<F: DTypeFloat> {
    input_shape: Dim3,
    output_shape: Dim3,
    padding: usize,
    stride: usize,
    kernel_size: usize,
    weights: Tensor4<F>,
    biases: Tensor1<F>,
    weight_grad: Tensor4<F>,
    bias_grad: Tensor1<F>,
}

impl<F: DTypeFloat> ConvLayer<F> {
    #[inline]
    pub fn weights(&self) -> &Tensor4<F> {
        &self.weights
    }
    #[inline]
    pub fn weights_mut(&mut self) -> &mut Tensor4<F> {
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
    pub fn weight_gradients(&self) -> &Tensor4<F> {
        &self.weight_grad
    }
    #[inline]
    pub fn bias_gradients(&self) -> &Tensor1<F> {
        &self.bias_grad
    }

    /// Filter bank viewed as a (filters, depth * k * k) matrix.
    #[inline]
    fn filter_matrix_dims(&self) -> Dim2 {
        let k = self.kernel_size;
        Dim2(self.output_shape.depth(), self.input_shape.depth() * k * k)
    }

    #[inline]
    fn output_matrix_dims(&self) -> Dim2 {
        Dim2(self.output_shape.depth(), self.output_shape.height() * self.output_shape.width())
    }

    /// Unrolls every receptive field of the padded input into one column.
    fn im2col(&self, padded: &Tensor3<F>) -> Tensor2<F> {
        let &Dim3(depth, ph, pw) = padded.dims();
        let (k, s) = (self.kernel_size, self.stride);
        let (out_h, out_w) = (self.output_shape.height(), self.output_shape.width());
        let n = out_h * out_w;
        let mut cols = Tensor2::zeroed(Dim2(depth * k * k, n));
        let src = padded.as_ref();
        let dst = cols.as_mut();
        for d in 0..depth {
            for ky in 0..k {
                for kx in 0..k {
                    let row = ((d * k + ky) * k + kx) * n;
                    for y in 0..out_h {
                        let src_row = (d * ph + y * s + ky) * pw + kx;
                        for x in 0..out_w {
                            dst[row + y * out_w + x] = src[src_row + x * s];
                        }
                    }
                }
            }
        }
        cols
    }

    /// Scatters columns back onto a padded input-sized buffer, summing overlaps.
    fn col2im(&self, cols: &Tensor2<F>) -> Tensor3<F> {
        let depth = self.input_shape.depth();
        let p = self.padding;
        let (ph, pw) = (self.input_shape.height() + 2 * p, self.input_shape.width() + 2 * p);
        let (k, s) = (self.kernel_size, self.stride);
        let (out_h, out_w) = (self.output_shape.height(), self.output_shape.width());
        let n = out_h * out_w;
        let mut padded = Tensor3::zeroed(Dim3(depth, ph, pw));
        let src = cols.as_ref();
        let dst = padded.as_mut();
        for d in 0..depth {
            for ky in 0..k {
                for kx in 0..k {
                    let row = ((d * k + ky) * k + kx) * n;
                    for y in 0..out_h {
                        let dst_row = (d * ph + y * s + ky) * pw + kx;
                        for x in 0..out_w {
                            dst[dst_row + x * s] += src[row + y * out_w + x];
                        }
                    }
                }
            }
        }
        padded
    }
}

impl<F: DTypeFloat> Layer<F> for ConvLayer<F> {
    fn forward(&mut self, input: &Tensor3<F>) -> Result<Tensor3<F>> {
        check_shape("conv forward input", self.input_shape, input.dims())?;
        let cols = self.im2col(&input.zero_padded(self.padding));
        let mut output = Tensor3::zeroed(self.output_shape);
        let plane = self.output_shape.height() * self.output_shape.width();
        for (out_plane, &b) in output.as_mut().chunks_exact_mut(plane).zip(self.biases.iter()) {
            out_plane.fill(b);
        }
        let out_dims = self.output_matrix_dims();
        F::gemm(
            F::ONE,
            self.weights.as_ref(),
            self.filter_matrix_dims(),
            false,
            cols.as_ref(),
            *cols.dims(),
            false,
            F::ONE,
            output.as_mut(),
            out_dims,
        );
        Ok(output)
    }

    fn backward(&mut self, input: &Tensor3<F>, output_error: &Tensor3<F>) -> Result<Tensor3<F>> {
        check_shape("conv backward input", self.input_shape, input.dims())?;
        check_shape("conv backward output error", self.output_shape, output_error.dims())?;
        let cols = self.im2col(&input.zero_padded(self.padding));
        let filter_dims = self.filter_matrix_dims();
        let out_dims = self.output_matrix_dims();

        // dW += dout * cols^T
        F::gemm(
            F::ONE,
            output_error.as_ref(),
            out_dims,
            false,
            cols.as_ref(),
            *cols.dims(),
            true,
            F::ONE,
            self.weight_grad.as_mut(),
            filter_dims,
        );

        let plane = out_dims.cols();
        for (g, err_plane) in self.bias_grad.iter_mut().zip(output_error.as_ref().chunks_exact(plane)) {
            *g += err_plane.iter().fold(F::ZERO, |acc, &e| acc + e);
        }

        // dcols = W^T * dout
        let mut col_error = Tensor2::zeroed(*cols.dims());
        let col_dims = *col_error.dims();
        F::gemm(
            F::ONE,
            self.weights.as_ref(),
            filter_dims,
            true,
            output_error.as_ref(),
            out_dims,
            false,
            F::ZERO,
            col_error.as_mut(),
            col_dims,
        );
        Ok(self.col2im(&col_error).unpadded(self.padding))
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
        LayerType::Conv
    }

    #[inline]
    fn input_shape(&self) -> Dim3 {
        self.input_shape
    }

    #[inline]
    fn output_shape(&self) -> Dim3 {
        self.output_shape
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
        let filter_dims = *self.weights.dims();
        let bias_dims = *self.biases.dims();
        let weights = archive.get(&param_key(prefix, "weights"), filter_dims)?;
        let biases = archive.get(&param_key(prefix, "biases"), bias_dims)?;
        let weight_grad = archive.get(&param_key(prefix, "weights_grad"), filter_dims)?;
        let bias_grad = archive.get(&param_key(prefix, "biases_grad"), bias_dims)?;
        self.weights = weights;
        self.biases = biases;
        self.weight_grad = weight_grad;
        self.bias_grad = bias_grad;
        Ok(())
    }
}

impl<F: DTypeFloat> Debug for ConvLayer<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvLayer")
            .field("input_shape", &self.input_shape)
            .field("output_shape", &self.output_shape)
            .field("kernel_size", &self.kernel_size)
            .field("padding", &self.padding)
            .field("stride", &self.stride)
            .field("weights", &self.weights)
            .field("biases", &self.biases)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::initializer::{ConstantNetInitializer, RandomNetInitializer};

    fn layer(input: Dim3, params: ConvLayerParams, seed: u64) -> ConvLayer<f64> {
        let mut init = RandomNetInitializer::seed_from_u64(seed);
        params.create_layer(0, input, &mut init).unwrap()
    }

    /// Direct translation of the convolution definition, used as the reference.
    fn naive_forward(l: &ConvLayer<f64>, input: &Tensor3<f64>) -> Tensor3<f64> {
        let padded = input.zero_padded(l.padding);
        let mut out = Tensor3::zeroed(l.output_shape);
        let Dim3(filters, out_h, out_w) = l.output_shape;
        let k = l.kernel_size;
        for f in 0..filters {
            for y in 0..out_h {
                for x in 0..out_w {
                    let mut sum = l.biases[f];
                    for d in 0..l.input_shape.depth() {
                        for ky in 0..k {
                            for kx in 0..k {
                                sum += l.weights[[f, d, ky, kx]] * padded[[d, y * l.stride + ky, x * l.stride + kx]];
                            }
                        }
                    }
                    out[[f, y, x]] = sum;
                }
            }
        }
        out
    }

    #[test]
    fn test_output_size_formula() {
        for input in 1..12 {
            for kernel in 1..5 {
                for padding in 0..3 {
                    for stride in 1..4 {
                        let res = conv_output_size(input, kernel, padding, stride);
                        let padded = input + 2 * padding;
                        if padded >= kernel && (padded - kernel) % stride == 0 {
                            assert_eq!(res.unwrap(), (padded - kernel) / stride + 1);
                        } else {
                            assert!(matches!(res, Err(Error::InvalidGeometry(_))));
                        }
                    }
                }
            }
        }
        assert!(conv_output_size(5, 0, 0, 1).is_err());
        assert!(conv_output_size(5, 3, 0, 0).is_err());
    }

    #[test]
    fn test_construction_rejects_bad_geometry() {
        let mut init = RandomNetInitializer::seed_from_u64(0);
        let params = ConvLayerParams {
            filters: 4,
            kernel_size: 3,
            padding: 0,
            stride: 2,
        };
        let res: Result<ConvLayer<f32>> = params.create_layer(0, Dim3(1, 6, 6), &mut init);
        assert!(matches!(res, Err(Error::InvalidGeometry(_))));
        let res: Result<ConvLayer<f32>> = params.create_layer(0, Dim3(1, 7, 7), &mut init);
        assert_eq!(res.unwrap().output_shape(), Dim3(4, 3, 3));
    }

    #[test]
    fn test_forward_matches_definition() {
        let params = ConvLayerParams {
            filters: 3,
            kernel_size: 3,
            padding: 1,
            stride: 2,
        };
        let mut l = layer(Dim3(2, 7, 7), params, 3);
        let mut init = RandomNetInitializer::seed_from_u64(11);
        let input: Tensor3<f64> = Tensor3::from_vec(
            NetInitializer::<f64>::get_weights(&mut init, 0, Dim2(1, 98)).into_vec(),
            Dim3(2, 7, 7),
        );
        let out = l.forward(&input).unwrap();
        assert_eq!(out.dims(), &Dim3(3, 4, 4));
        let expected = naive_forward(&l, &input);
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "{a} != {b}");
        }
    }

    #[test]
    fn test_forward_constant_filters() {
        let mut init = ConstantNetInitializer {
            weight: 1.0,
            bias: 0.5,
            alpha: 0.25,
        };
        let mut l: ConvLayer<f64> = ConvLayerParams::new(2, 2).create_layer(0, Dim3(1, 3, 3), &mut init).unwrap();
        let input = Tensor3::from_vec((1..=9).map(|x| x as f64).collect(), Dim3(1, 3, 3));
        let out = l.forward(&input).unwrap();
        // window sums: 1+2+4+5, 2+3+5+6, 4+5+7+8, 5+6+8+9
        assert_eq!(out.as_ref(), &[12.5, 16.5, 24.5, 28.5, 12.5, 16.5, 24.5, 28.5]);
    }

    #[test]
    fn test_forward_rejects_wrong_shape() {
        let mut l = layer(Dim3(1, 5, 5), ConvLayerParams::new(2, 3), 0);
        let res = l.forward(&Tensor3::zeroed(Dim3(1, 4, 5)));
        assert!(matches!(res, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_backward_accumulates_until_update() {
        let mut l = layer(Dim3(1, 4, 4), ConvLayerParams::new(2, 3), 5);
        let input = Tensor3::filled(1.0, Dim3(1, 4, 4));
        let dout = Tensor3::filled(1.0, Dim3(2, 2, 2));
        l.backward(&input, &dout).unwrap();
        let once = l.bias_gradients().clone();
        assert_eq!(once.as_ref(), &[4.0, 4.0]);
        l.backward(&input, &dout).unwrap();
        assert_eq!(l.bias_gradients().as_ref(), &[8.0, 8.0]);
        assert!(l.weight_gradients().iter().all(|&g| g == 8.0));

        let before = l.weights().clone();
        l.update(0.5);
        assert!(!l.has_pending_gradients());
        for (a, b) in l.weights().iter().zip(before.iter()) {
            assert!((b - a - 4.0).abs() < 1e-12);
        }
        assert_eq!(l.biases().as_ref(), &[0.01 - 4.0, 0.01 - 4.0]);
    }

    #[test]
    fn test_backward_padded_input_gradient_shape() {
        let params = ConvLayerParams {
            filters: 2,
            kernel_size: 3,
            padding: 1,
            stride: 1,
        };
        let mut l = layer(Dim3(3, 5, 5), params, 9);
        let input = Tensor3::filled(0.5, Dim3(3, 5, 5));
        let dout = Tensor3::filled(1.0, Dim3(2, 5, 5));
        let din = l.backward(&input, &dout).unwrap();
        assert_eq!(din.dims(), &Dim3(3, 5, 5));
        // the centre pixel sees every filter tap once per filter
        let centre: f64 = (0..2)
            .map(|f| (0..3).flat_map(|ky| (0..3).map(move |kx| (ky, kx))).map(|(ky, kx)| l.weights()[[f, 1, ky, kx]]).sum::<f64>())
            .sum();
        assert!((din[[1, 2, 2]] - centre).abs() < 1e-12);
    }
}
