use crate::activation::softmax;
use crate::config::TrainConfig;
use crate::dtype::DTypeFloat;
use crate::error::{Error, Result};
use crate::loss::LossFn;
use crate::net::initializer::NetInitializer;
use crate::net::layer::{
    ConcreteLayer, ConcreteLayerParams, ConvLayerParams, FullyConnectedLayerParams, Layer, LayerParams,
    MaxPoolLayerParams, PReLULayerParams,
};
use crate::persist::ParamArchive;
use crate::scoring::MulticlassScorer;
use crate::tensor::{Dim2, Dim3, Tensor1, Tensor2, Tensor3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt::{Debug, Formatter};
use std::path::Path;

pub mod initializer;
pub mod layer;

pub const IMAGE_SIDE: usize = 28;
pub const NUM_CLASSES: usize = 10;
pub const INPUT_SHAPE: Dim3 = Dim3(1, IMAGE_SIDE, IMAGE_SIDE);

/// One labelled grayscale image. Pixels may be raw (0..=255) or already in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct Sample<F> {
    pub image: Tensor2<F>,
    pub label: usize,
}

/// Every intermediate tensor of one forward pass.
#[derive(Clone, Debug)]
pub struct ForwardTrace<F: DTypeFloat> {
    pub input: Tensor3<F>,
    /// `outputs[i]` is the output of layer `i`.
    pub outputs: Vec<Tensor3<F>>,
    pub probabilities: Tensor1<F>,
}

impl<F: DTypeFloat> ForwardTrace<F> {
    /// The tensor layer `layer_idx` consumed.
    pub fn layer_input(&self, layer_idx: usize) -> &Tensor3<F> {
        match layer_idx {
            0 => &self.input,
            i => &self.outputs[i - 1],
        }
    }
}

#[derive(Clone, Debug)]
pub struct BackwardTrace<F: DTypeFloat> {
    pub forward: ForwardTrace<F>,
    /// Gradient of the loss w.r.t. the network input.
    pub input_error: Tensor3<F>,
    pub loss: F,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction<F> {
    pub digit: usize,
    pub confidence: F,
    pub probabilities: Tensor1<F>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrainSummary {
    pub samples: usize,
    pub mean_loss: f64,
    pub accuracy: f64,
}

/// Outcome of [`Network::load_or_init`].
#[derive(Clone, Debug, PartialEq)]
pub enum LoadStatus {
    Loaded,
    /// The parameters could not be read and the network kept its fresh initialization.
    Fresh { reason: String },
}

impl LoadStatus {
    #[inline]
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadStatus::Loaded)
    }
}

/// Scales raw 0..=255 pixels into [0, 1]. Images whose maximum is at most 1 are returned unchanged.
pub fn normalize_image<F: DTypeFloat>(image: &Tensor2<F>) -> Tensor2<F> {
    let mut image = image.clone();
    if image.max_value().is_some_and(|max| max > F::ONE) {
        let scale = F::from_f64(255.0);
        image.iter_mut().for_each(|p| *p /= scale);
    }
    image
}

fn image_tensor<F: DTypeFloat>(image: &Tensor2<F>) -> Result<Tensor3<F>> {
    let expected = Dim2(IMAGE_SIDE, IMAGE_SIDE);
    if image.dims() != &expected {
        return Err(Error::InvalidInput(format!(
            "expected a {IMAGE_SIDE}x{IMAGE_SIDE} image, got {}",
            image.dims()
        )));
    }
    normalize_image(image).reshape(INPUT_SHAPE)
}

/// Digit classifier over 28x28 grayscale images:
///
/// ```text
/// (1, 28, 28) -> [conv 16x3x3 -> prelu] x2 -> max pool 2
///             -> [conv 32x3x3 -> prelu] x2 -> max pool 2
///             -> fc 128 -> prelu -> fc 10 -> prelu -> softmax
/// ```
///
/// Training is online: every [`backward`](Network::backward) should be followed by one
/// [`update`](Network::update), which applies and clears the collected gradients.
#[derive(Clone)]
pub struct Network<F: DTypeFloat> {
    layers: Box<[ConcreteLayer<F>]>,
    loss: LossFn,
}

impl<F: DTypeFloat> Network<F> {
    pub fn new(initializer: &mut dyn NetInitializer<F>) -> Result<Self> {
        NetBuilder::new(INPUT_SHAPE, initializer)
            .with_layer(ConvLayerParams::new(16, 3))
            .with_layer(PReLULayerParams)
            .with_layer(ConvLayerParams::new(16, 3))
            .with_layer(PReLULayerParams)
            .with_layer(MaxPoolLayerParams { scale: 2 })
            .with_layer(ConvLayerParams::new(32, 3))
            .with_layer(PReLULayerParams)
            .with_layer(ConvLayerParams::new(32, 3))
            .with_layer(PReLULayerParams)
            .with_layer(MaxPoolLayerParams { scale: 2 })
            .with_layer(FullyConnectedLayerParams { size: 128 })
            .with_layer(PReLULayerParams)
            .with_layer(FullyConnectedLayerParams { size: NUM_CLASSES })
            .with_layer(PReLULayerParams)
            .build()
    }

    /// Builds a fresh network, then tries to load its parameters from `path`.
    ///
    /// A missing or unreadable file is not an error: the network keeps its initial
    /// parameters and the returned status says why.
    pub fn load_or_init<P: AsRef<Path>>(
        path: P,
        initializer: &mut dyn NetInitializer<F>,
    ) -> Result<(Self, LoadStatus)> {
        let mut net = Self::new(initializer)?;
        let path = path.as_ref();
        let status = match net.load_params(path) {
            Ok(()) => LoadStatus::Loaded,
            Err(e) => {
                log::warn!(
                    "could not load parameters from {}: {e}; continuing with freshly initialized parameters",
                    path.display()
                );
                LoadStatus::Fresh { reason: e.to_string() }
            }
        };
        Ok((net, status))
    }

    #[inline]
    pub fn layers(&self) -> &[ConcreteLayer<F>] {
        &self.layers
    }

    #[inline]
    pub fn input_shape(&self) -> Dim3 {
        self.layers[0].input_shape()
    }

    #[inline]
    pub fn output_shape(&self) -> Dim3 {
        self.layers[self.layers.len() - 1].output_shape()
    }

    /// Stable per-layer names, `layer{idx}_{kind}`, used as parameter key prefixes.
    pub fn layer_names(&self) -> Vec<String> {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, l)| format!("layer{i}_{}", l.layer_type()))
            .collect()
    }

    pub fn num_params(&self) -> usize {
        self.layers.iter().map(|l| l.num_params()).sum()
    }

    pub fn has_pending_gradients(&self) -> bool {
        self.layers.iter().any(|l| l.has_pending_gradients())
    }

    pub fn forward(&mut self, input: &Tensor3<F>) -> Result<ForwardTrace<F>> {
        let mut outputs: Vec<Tensor3<F>> = Vec::with_capacity(self.layers.len());
        for layer in self.layers.iter_mut() {
            let output = layer.forward(outputs.last().unwrap_or(input))?;
            outputs.push(output);
        }
        let probabilities = softmax(outputs.last().unwrap_or(input).as_ref());
        Ok(ForwardTrace {
            input: input.clone(),
            outputs,
            probabilities,
        })
    }

    /// Class probabilities for `input`, without keeping the intermediate tensors.
    pub fn predict(&mut self, input: &Tensor3<F>) -> Result<Tensor1<F>> {
        let mut iter = self.layers.iter_mut();
        let mut current = match iter.next() {
            Some(first) => first.forward(input)?,
            None => input.clone(),
        };
        for layer in iter {
            current = layer.forward(&current)?;
        }
        Ok(softmax(current.as_ref()))
    }

    /// Runs a forward pass and propagates `probabilities - one_hot(label)` back through
    /// every layer, collecting parameter gradients inside the layers.
    pub fn backward(&mut self, input: &Tensor3<F>, label: usize) -> Result<BackwardTrace<F>> {
        if label >= NUM_CLASSES {
            return Err(Error::InvalidLabel {
                label,
                classes: NUM_CLASSES,
            });
        }
        let forward = self.forward(input)?;
        let loss = self.loss.loss(&forward.probabilities, label)?;
        let mut error = self
            .loss
            .output_error(&forward.probabilities, label)?
            .reshape(self.output_shape())?;
        for (i, layer) in self.layers.iter_mut().enumerate().rev() {
            error = layer.backward(forward.layer_input(i), &error)?;
        }
        Ok(BackwardTrace {
            forward,
            input_error: error,
            loss,
        })
    }

    /// Applies the collected gradients of every layer, in topology order, and clears them.
    pub fn update(&mut self, learn_rate: F) {
        for layer in self.layers.iter_mut() {
            layer.update(learn_rate);
        }
    }

    pub fn clear_gradients(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.clear_gradients();
        }
    }

    /// One backward/update cycle per sample, in the given order.
    pub fn train<'a, I>(&mut self, learn_rate: F, samples: I) -> Result<TrainSummary>
    where
        I: IntoIterator<Item = &'a Sample<F>>,
    {
        self.train_logged(learn_rate, samples, TrainConfig::default().log_interval)
    }

    fn train_logged<'a, I>(&mut self, learn_rate: F, samples: I, log_interval: usize) -> Result<TrainSummary>
    where
        I: IntoIterator<Item = &'a Sample<F>>,
    {
        let mut count = 0usize;
        let mut correct = 0usize;
        let mut loss_sum = 0.0;
        for sample in samples {
            let input = image_tensor(&sample.image)?;
            let trace = self.backward(&input, sample.label)?;
            self.update(learn_rate);
            count += 1;
            loss_sum += trace.loss.as_f64();
            if trace.forward.probabilities.argmax() == Some(sample.label) {
                correct += 1;
            }
            if count % log_interval == 0 {
                log::debug!(
                    "trained {count} samples, mean loss {:.4}, accuracy {:.4}",
                    loss_sum / count as f64,
                    correct as f64 / count as f64
                );
            }
        }
        let (mean_loss, accuracy) = if count == 0 {
            (0.0, 0.0)
        } else {
            (loss_sum / count as f64, correct as f64 / count as f64)
        };
        Ok(TrainSummary {
            samples: count,
            mean_loss,
            accuracy,
        })
    }

    /// Trains for `config.epochs` passes over `samples`, reshuffling before each pass
    /// when `config.shuffle` is set.
    pub fn fit(&mut self, config: &TrainConfig, samples: &[Sample<F>]) -> Result<Vec<TrainSummary>> {
        config.validate()?;
        let learn_rate = F::from_f64(config.learn_rate);
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut summaries = Vec::with_capacity(config.epochs);
        for epoch in 0..config.epochs {
            if config.shuffle {
                order.shuffle(&mut rng);
            }
            let summary = self.train_logged(learn_rate, order.iter().map(|&i| &samples[i]), config.log_interval)?;
            log::info!(
                "epoch {epoch}: {} samples, mean loss {:.4}, accuracy {:.4}",
                summary.samples,
                summary.mean_loss,
                summary.accuracy
            );
            summaries.push(summary);
        }
        Ok(summaries)
    }

    pub fn evaluate<'a, I>(&mut self, samples: I) -> Result<MulticlassScorer>
    where
        I: IntoIterator<Item = &'a Sample<F>>,
    {
        let mut scorer = MulticlassScorer::new(NUM_CLASSES);
        for sample in samples {
            if sample.label >= NUM_CLASSES {
                return Err(Error::InvalidLabel {
                    label: sample.label,
                    classes: NUM_CLASSES,
                });
            }
            let probabilities = self.predict(&image_tensor(&sample.image)?)?;
            let predicted = probabilities.argmax().unwrap_or_default();
            scorer.record(sample.label, predicted);
        }
        log::info!(
            "evaluated {} samples, accuracy {:.4}",
            scorer.count(),
            scorer.accuracy()
        );
        Ok(scorer)
    }

    /// Classifies one 28x28 image with pixels either raw (0..=255) or already in [0, 1].
    pub fn recognize(&mut self, image: &Tensor2<F>) -> Result<Prediction<F>> {
        let probabilities = self.predict(&image_tensor(image)?)?;
        let digit = probabilities
            .argmax()
            .ok_or_else(|| Error::InvalidInput("network produced no probabilities".to_string()))?;
        Ok(Prediction {
            digit,
            confidence: probabilities[digit],
            probabilities,
        })
    }

    /// [`Network::recognize`] for an image given as nested pixel rows.
    pub fn recognize_rows(&mut self, rows: Vec<Vec<F>>) -> Result<Prediction<F>> {
        self.recognize(&Tensor2::from_rows(rows)?)
    }

    /// Every parameter and gradient accumulator, keyed by layer name.
    pub fn to_archive(&self) -> ParamArchive {
        let mut archive = ParamArchive::new();
        for (layer, name) in self.layers.iter().zip(self.layer_names()) {
            layer.save_params(&name, &mut archive);
        }
        archive
    }

    /// Replaces every parameter with the archive's values. Nothing changes unless every
    /// required array is present with the right shape.
    pub fn restore(&mut self, archive: &ParamArchive) -> Result<()> {
        let mut staged = self.layers.clone();
        for (layer, name) in staged.iter_mut().zip(self.layer_names()) {
            layer.load_params(&name, archive)?;
        }
        self.layers = staged;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let archive = self.to_archive();
        archive.save(path)?;
        log::info!("saved {} parameter arrays to {}", archive.len(), path.display());
        Ok(())
    }

    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let archive = ParamArchive::load(path)?;
        self.restore(&archive)?;
        log::info!("loaded {} parameter arrays from {}", archive.len(), path.display());
        Ok(())
    }
}

impl<F: DTypeFloat> Debug for Network<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("input_shape", &self.input_shape())
            .field("output_shape", &self.output_shape())
            .field("num_params", &self.num_params())
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}

pub(crate) struct NetBuilder<'a, F: DTypeFloat> {
    input_shape: Dim3,
    initializer: &'a mut dyn NetInitializer<F>,
    layers: Vec<ConcreteLayerParams>,
}

impl<'a, F: DTypeFloat> NetBuilder<'a, F> {
    pub fn new(input_shape: Dim3, initializer: &'a mut dyn NetInitializer<F>) -> Self {
        NetBuilder {
            input_shape,
            initializer,
            layers: Vec::new(),
        }
    }

    pub fn with_layer<T>(mut self, layer: T) -> Self
    where
        T: Into<ConcreteLayerParams>,
    {
        self.layers.push(layer.into());
        self
    }

    pub fn build(self) -> Result<Network<F>> {
        if self.layers.is_empty() {
            return Err(Error::InvalidGeometry("a network needs at least one layer".to_string()));
        }
        let mut shape = self.input_shape;
        let mut layers = Vec::with_capacity(self.layers.len());
        for (layer_idx, params) in self.layers.iter().enumerate() {
            let layer = params.create_layer(layer_idx, shape, &mut *self.initializer)?;
            shape = layer.output_shape();
            layers.push(layer);
        }
        if shape.depth() * shape.height() != 1 {
            return Err(Error::InvalidGeometry(format!(
                "the last layer must produce a (1, 1, n) vector, got {shape}"
            )));
        }
        Ok(Network {
            layers: layers.into_boxed_slice(),
            loss: LossFn::CrossEntropy,
        })
    }
}
