use super::{check_shape, ConcreteLayerParams, Layer, LayerParams, LayerType};
use crate::dtype::DTypeFloat;
use crate::error::{Error, Result};
use crate::net::initializer::NetInitializer;
use crate::tensor::{Dim3, Tensor3};
use std::fmt::{Debug, Formatter};
use std::ops::Range;

#[derive(Clone, Debug, PartialEq)]
pub struct MaxPoolLayerParams {
    pub scale: usize,
}

impl<F: DTypeFloat> LayerParams<F> for MaxPoolLayerParams {
    type Layer = MaxPoolLayer<F>;

    fn create_layer(
        &self,
        layer_idx: usize,
        input_shape: Dim3,
        _initializer: &mut dyn NetInitializer<F>,
    ) -> Result<Self::Layer> {
        let scale = self.scale;
        if scale == 0 {
            return Err(Error::InvalidGeometry("pooling scale must be positive".to_string()));
        }
        let Dim3(depth, height, width) = input_shape;
        if depth == 0 || height == 0 || width == 0 {
            return Err(Error::InvalidGeometry(format!("cannot pool an empty input {input_shape}")));
        }
        let output_shape = Dim3(depth, height.div_ceil(scale), width.div_ceil(scale));
        log::debug!("layer {layer_idx}: max_pool {input_shape} -> {output_shape}");
        Ok(MaxPoolLayer {
            input_shape,
            output_shape,
            scale,
            window_h: height.div_ceil(output_shape.height()),
            window_w: width.div_ceil(output_shape.width()),
            last_forward: None,
        })
    }
}

impl From<MaxPoolLayerParams> for ConcreteLayerParams {
    fn from(value: MaxPoolLayerParams) -> Self {
        ConcreteLayerParams::MaxPool(value)
    }
}

/// Adaptive max pooling.
///
/// Output cell `i` reads the input rows `floor(i * in / out) .. min(start + ceil(in / out), in)`
/// (same for columns), so windows may overlap when the input does not divide evenly.
/// The forward pass records a 0/1 mask marking the first maximum of each window; the
/// backward pass routes each output gradient through that mask over the same window.
/// Where windows overlap, a marked cell also receives the gradient of every other
/// window covering it.
///
/// Window starts use integer division. This equals the truncated float ratio
/// `floor(i * (in / out))` whenever `out` divides `in`, which covers the network's
/// 24 -> 12 and 8 -> 4 pools. Some uneven sizes differ, the smallest being 122 with scale 9.
///
/// Backward is only valid for the input of the most recent forward call; any other
/// input fails with [`Error::BackwardWithoutForward`].
#[derive(Clone)]
pub struct MaxPoolLayer<F: DTypeFloat> {
    input_shape: Dim3,
    output_shape: Dim3,
    scale: usize,
    window_h: usize,
    window_w: usize,
    /// Input and mask of the most recent forward call.
    last_forward: Option<(Tensor3<F>, Tensor3<F>)>,
}

#[inline]
fn window(i: usize, input: usize, output: usize, size: usize) -> Range<usize> {
    let start = i * input / output;
    start..(start + size).min(input)
}

impl<F: DTypeFloat> MaxPoolLayer<F> {
    #[inline]
    pub fn scale(&self) -> usize {
        self.scale
    }

    /// Mask written by the most recent forward call.
    #[inline]
    pub fn mask(&self) -> Option<&Tensor3<F>> {
        self.last_forward.as_ref().map(|(_, mask)| mask)
    }

    #[inline]
    fn rows(&self, i: usize) -> Range<usize> {
        window(i, self.input_shape.height(), self.output_shape.height(), self.window_h)
    }

    #[inline]
    fn cols(&self, j: usize) -> Range<usize> {
        window(j, self.input_shape.width(), self.output_shape.width(), self.window_w)
    }
}

impl<F: DTypeFloat> Layer<F> for MaxPoolLayer<F> {
    fn forward(&mut self, input: &Tensor3<F>) -> Result<Tensor3<F>> {
        check_shape("max pool forward input", self.input_shape, input.dims())?;
        let Dim3(depth, out_h, out_w) = self.output_shape;
        let mut output = Tensor3::zeroed(self.output_shape);
        let mut mask = Tensor3::zeroed(self.input_shape);
        for d in 0..depth {
            for i in 0..out_h {
                let rows = self.rows(i);
                for j in 0..out_w {
                    let cols = self.cols(j);
                    let mut best = (rows.start, cols.start);
                    let mut max = input[[d, rows.start, cols.start]];
                    for y in rows.clone() {
                        for x in cols.clone() {
                            let v = input[[d, y, x]];
                            if v > max {
                                max = v;
                                best = (y, x);
                            }
                        }
                    }
                    output[[d, i, j]] = max;
                    mask[[d, best.0, best.1]] = F::ONE;
                }
            }
        }
        self.last_forward = Some((input.clone(), mask));
        Ok(output)
    }

    fn backward(&mut self, input: &Tensor3<F>, output_error: &Tensor3<F>) -> Result<Tensor3<F>> {
        check_shape("max pool backward input", self.input_shape, input.dims())?;
        check_shape("max pool backward output error", self.output_shape, output_error.dims())?;
        let mask = match &self.last_forward {
            Some((pooled, mask)) if pooled == input => mask,
            _ => return Err(Error::BackwardWithoutForward("max pooling")),
        };
        let Dim3(depth, out_h, out_w) = self.output_shape;
        let mut input_error = Tensor3::zeroed(self.input_shape);
        for d in 0..depth {
            for i in 0..out_h {
                let rows = self.rows(i);
                for j in 0..out_w {
                    let err = output_error[[d, i, j]];
                    for y in rows.clone() {
                        for x in self.cols(j) {
                            input_error[[d, y, x]] += err * mask[[d, y, x]];
                        }
                    }
                }
            }
        }
        Ok(input_error)
    }

    #[inline]
    fn update(&mut self, _learn_rate: F) {}

    #[inline]
    fn clear_gradients(&mut self) {}

    #[inline]
    fn has_pending_gradients(&self) -> bool {
        false
    }

    #[inline]
    fn layer_type(&self) -> LayerType {
        LayerType::MaxPool
    }

    #[inline]
    fn input_shape(&self) -> Dim3 {
        self.input_shape
    }

    #[inline]
    fn output_shape(&self) -> Dim3 {
        self.output_shape
    }
}

impl<F: DTypeFloat> Debug for MaxPoolLayer<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxPoolLayer")
            .field("input_shape", &self.input_shape)
            .field("output_shape", &self.output_shape)
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}
