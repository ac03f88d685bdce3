//! Sequential network orchestration
//!
//! A [`Network`] owns an ordered chain of layers and a loss function. Layers are
//! appended with the `add_*` builder methods; each new layer takes the output
//! shape of the previous one (or the network input shape) as its input shape.
//!
//! Training is plain per-sample stochastic gradient descent:
//! forward through every layer, loss derivative, backward through every layer in
//! reverse order with each layer updating its own parameters.

use crate::error::{CnnError, Result};
use crate::layers::{
    ConvolutionLayer, DenseLayer, Layer, MaxPoolingLayer, OutputLayer, ReluLayer, SoftmaxGradient,
};
use crate::loss::LossFunction;
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Options for a call to [`Network::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Number of passes over the training data.
    pub epochs: usize,
    /// Must be at least 1. Values above 1 are accepted but parameters are
    /// still updated after every sample.
    pub batch_size: usize,
    /// Emit running loss and accuracy through `tracing::info!`.
    pub verbose: bool,
    /// Samples between progress lines when `verbose` is set.
    pub log_interval: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 1,
            verbose: false,
            log_interval: 100,
        }
    }
}

/// Average loss and accuracy over a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    /// Fraction of samples whose predicted class matches the label, in `[0, 1]`.
    pub accuracy: f64,
}

/// Summary of one training epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Average training loss over the epoch.
    pub loss: f64,
    /// Training accuracy over the epoch, measured on the training-time forward pass.
    pub accuracy: f64,
    /// Learning rate used during this epoch.
    pub learning_rate: f64,
    /// Evaluation on held-out data, when training with validation data.
    pub validation: Option<Evaluation>,
}

/// Per-epoch reports of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochReport>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochReport> {
        self.epochs.last()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.last().map(|report| report.loss)
    }

    pub fn final_accuracy(&self) -> Option<f64> {
        self.last().map(|report| report.accuracy)
    }
}

/// Ordered layer chain plus loss function and training state.
pub struct Network {
    input_shape: Vec<usize>,
    layers: Vec<Box<dyn Layer>>,
    loss: Box<dyn LossFunction>,
    learning_rate: f64,
    rng: StdRng,
}

impl Network {
    /// Create an empty network.
    ///
    /// The random generator used for weight initialization and shuffling is
    /// seeded from the operating system; use [`Network::with_seed`] for
    /// reproducible runs.
    pub fn new(input_shape: &[usize], learning_rate: f64, loss: impl LossFunction + 'static) -> Self {
        Self {
            input_shape: input_shape.to_vec(),
            layers: Vec::new(),
            loss: Box::new(loss),
            learning_rate,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reseed the random generator. Call before adding layers to make
    /// initialization reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Shape the next layer will receive.
    fn next_input_shape(&self) -> Vec<usize> {
        self.output_shape().to_vec()
    }

    fn push(&mut self, layer: Box<dyn Layer>) -> &mut Self {
        debug!(
            index = self.layers.len(),
            layer = layer.name(),
            input_shape = ?layer.input_shape(),
            output_shape = ?layer.output_shape(),
            "layer added"
        );
        self.layers.push(layer);
        self
    }

    /// Append a convolution layer with `filters` He-initialized filters.
    pub fn add_convolution_layer(&mut self, filter_shape: &[usize], filters: usize) -> Result<&mut Self> {
        let input_shape = self.next_input_shape();
        let layer = ConvolutionLayer::new(filter_shape, filters, &input_shape, &mut self.rng)?;
        Ok(self.push(Box::new(layer)))
    }

    /// Append a max-pooling layer.
    pub fn add_max_pooling_layer(&mut self, stride: &[usize], window: &[usize]) -> Result<&mut Self> {
        let input_shape = self.next_input_shape();
        let layer = MaxPoolingLayer::new(stride, window, &input_shape)?;
        Ok(self.push(Box::new(layer)))
    }

    /// Append a fully connected layer with `outputs` outputs.
    pub fn add_dense_layer(&mut self, outputs: usize) -> Result<&mut Self> {
        let input_shape = self.next_input_shape();
        let layer = DenseLayer::new(outputs, &input_shape, &mut self.rng)?;
        Ok(self.push(Box::new(layer)))
    }

    pub fn add_relu_layer(&mut self) -> Result<&mut Self> {
        let input_shape = self.next_input_shape();
        Ok(self.push(Box::new(ReluLayer::new(&input_shape))))
    }

    /// Append a softmax output layer using the exact Jacobian gradient.
    pub fn add_output_layer(&mut self) -> Result<&mut Self> {
        self.add_output_layer_with(SoftmaxGradient::default())
    }

    pub fn add_output_layer_with(&mut self, gradient: SoftmaxGradient) -> Result<&mut Self> {
        let input_shape = self.next_input_shape();
        Ok(self.push(Box::new(OutputLayer::with_gradient(&input_shape, gradient))))
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Output shape of the last layer, or the input shape of an empty network.
    pub fn output_shape(&self) -> &[usize] {
        self.layers
            .last()
            .map_or(self.input_shape.as_slice(), |layer| layer.output_shape())
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// One line per layer: index, kind, shapes and parameter count.
    pub fn summary(&self) -> Vec<String> {
        self.layers
            .iter()
            .enumerate()
            .map(|(index, layer)| {
                format!(
                    "{index}: {} {:?} -> {:?} ({} parameters)",
                    layer.name(),
                    layer.input_shape(),
                    layer.output_shape(),
                    layer.parameter_count()
                )
            })
            .collect()
    }

    /// Forward one input through every layer without recording training state.
    pub fn predict(&self, input: &Tensor) -> Result<Tensor> {
        self.check_input(input)?;
        self.layers
            .iter()
            .try_fold(input.clone(), |activation, layer| layer.forward(&activation))
    }

    /// Index of the most probable class (first maximum on ties).
    pub fn predict_index(&self, input: &Tensor) -> Result<usize> {
        self.predict(input)?
            .max_value_index()
            .ok_or_else(|| CnnError::EmptyResult("network produced an empty output".to_string()))
    }

    /// Train on `inputs`/`labels` for `options.epochs` epochs.
    ///
    /// Samples are visited in a fresh random order every epoch.
    /// `on_epoch_done` runs after each epoch and may change the learning rate
    /// used for the next one; the final rate is kept on the network.
    ///
    /// # Errors
    ///
    /// * [`CnnError::DatasetLengthMismatch`] if the slices differ in length
    /// * [`CnnError::EmptyResult`] for an empty dataset or a network without layers
    /// * [`CnnError::ShapeMismatch`] if a sample or label has the wrong shape
    /// * [`CnnError::InvalidConfig`] for a zero batch size or log interval
    pub fn fit<F>(
        &mut self,
        inputs: &[Tensor],
        labels: &[Tensor],
        options: &FitOptions,
        on_epoch_done: F,
    ) -> Result<TrainingHistory>
    where
        F: FnMut(&EpochReport, &mut f64),
    {
        self.train(inputs, labels, None, options, on_epoch_done)
    }

    /// Like [`Network::fit`], evaluating `validation_inputs`/`validation_labels`
    /// after every epoch.
    pub fn fit_with_validation<F>(
        &mut self,
        inputs: &[Tensor],
        labels: &[Tensor],
        validation_inputs: &[Tensor],
        validation_labels: &[Tensor],
        options: &FitOptions,
        on_epoch_done: F,
    ) -> Result<TrainingHistory>
    where
        F: FnMut(&EpochReport, &mut f64),
    {
        self.check_dataset(validation_inputs, validation_labels)?;
        self.train(
            inputs,
            labels,
            Some((validation_inputs, validation_labels)),
            options,
            on_epoch_done,
        )
    }

    fn train<F>(
        &mut self,
        inputs: &[Tensor],
        labels: &[Tensor],
        validation: Option<(&[Tensor], &[Tensor])>,
        options: &FitOptions,
        mut on_epoch_done: F,
    ) -> Result<TrainingHistory>
    where
        F: FnMut(&EpochReport, &mut f64),
    {
        if options.batch_size == 0 {
            return Err(CnnError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if options.log_interval == 0 {
            return Err(CnnError::InvalidConfig(
                "log_interval must be at least 1".to_string(),
            ));
        }
        if options.batch_size > 1 {
            warn!(
                batch_size = options.batch_size,
                "parameters are updated per sample; batch_size is ignored"
            );
        }
        self.check_dataset(inputs, labels)?;

        let mut learning_rate = self.learning_rate;
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut history = TrainingHistory::default();

        for epoch in 1..=options.epochs {
            order.shuffle(&mut self.rng);

            let mut epoch_loss = 0.0;
            let mut epoch_correct = 0usize;
            let mut window_loss = 0.0;
            let mut window_correct = 0usize;
            let mut window_len = 0usize;

            for (step, &index) in order.iter().enumerate() {
                let (loss, correct) = self.train_sample(&inputs[index], &labels[index], learning_rate)?;
                epoch_loss += loss;
                window_loss += loss;
                if correct {
                    epoch_correct += 1;
                    window_correct += 1;
                }
                window_len += 1;

                if options.verbose && window_len == options.log_interval {
                    info!(
                        epoch,
                        samples = step + 1,
                        loss = window_loss / window_len as f64,
                        accuracy = window_correct as f64 / window_len as f64,
                        "training progress"
                    );
                    window_loss = 0.0;
                    window_correct = 0;
                    window_len = 0;
                }
            }

            let samples = inputs.len() as f64;
            let evaluation = match validation {
                Some((validation_inputs, validation_labels)) => {
                    Some(self.validate(validation_inputs, validation_labels)?)
                }
                None => None,
            };
            let report = EpochReport {
                epoch,
                loss: epoch_loss / samples,
                accuracy: epoch_correct as f64 / samples,
                learning_rate,
                validation: evaluation,
            };
            if options.verbose {
                info!(
                    epoch,
                    loss = report.loss,
                    accuracy = report.accuracy,
                    learning_rate,
                    validation_loss = report.validation.map(|v| v.loss),
                    validation_accuracy = report.validation.map(|v| v.accuracy),
                    "epoch complete"
                );
            }

            on_epoch_done(&report, &mut learning_rate);
            history.epochs.push(report);
        }

        self.learning_rate = learning_rate;
        Ok(history)
    }

    /// Forward, loss derivative and backward for a single sample.
    /// Returns the sample loss and whether the prediction was correct.
    fn train_sample(&mut self, input: &Tensor, label: &Tensor, learning_rate: f64) -> Result<(f64, bool)> {
        let mut activation = input.clone();
        for layer in self.layers.iter_mut() {
            activation = layer.forward_train(&activation)?;
        }

        let loss = self.loss.total_loss(label, &activation)?;
        let correct = activation.max_value_index() == label.max_value_index();

        let mut gradient = self.loss.loss_derivative(label, &activation)?;
        for layer in self.layers.iter_mut().rev() {
            gradient = layer.backward(&gradient, learning_rate)?;
        }
        Ok((loss, correct))
    }

    /// Average loss and accuracy over a dataset.
    ///
    /// Uses the inference forward pass only and never changes the network.
    /// Samples are evaluated in parallel.
    pub fn validate(&self, inputs: &[Tensor], labels: &[Tensor]) -> Result<Evaluation> {
        self.check_dataset(inputs, labels)?;

        let (loss_sum, correct) = inputs
            .par_iter()
            .zip(labels.par_iter())
            .map(|(input, label)| -> Result<(f64, usize)> {
                let prediction = self.predict(input)?;
                let loss = self.loss.total_loss(label, &prediction)?;
                let correct = prediction.max_value_index() == label.max_value_index();
                Ok((loss, usize::from(correct)))
            })
            .try_reduce(|| (0.0, 0), |(l1, c1), (l2, c2)| Ok((l1 + l2, c1 + c2)))?;

        let samples = inputs.len() as f64;
        Ok(Evaluation {
            loss: loss_sum / samples,
            accuracy: correct as f64 / samples,
        })
    }

    fn check_input(&self, input: &Tensor) -> Result<()> {
        if input.shape() != self.input_shape.as_slice() {
            return Err(CnnError::shape_mismatch(
                "network input",
                &self.input_shape,
                input.shape(),
            ));
        }
        Ok(())
    }

    fn check_dataset(&self, inputs: &[Tensor], labels: &[Tensor]) -> Result<()> {
        if inputs.len() != labels.len() {
            return Err(CnnError::DatasetLengthMismatch {
                inputs: inputs.len(),
                labels: labels.len(),
            });
        }
        if inputs.is_empty() {
            return Err(CnnError::EmptyResult("dataset has no samples".to_string()));
        }
        if self.layers.is_empty() {
            return Err(CnnError::EmptyResult("network has no layers".to_string()));
        }
        let output_shape = self.output_shape();
        for (input, label) in inputs.iter().zip(labels) {
            self.check_input(input)?;
            if label.shape() != output_shape {
                return Err(CnnError::shape_mismatch(
                    "label",
                    output_shape,
                    label.shape(),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("input_shape", &self.input_shape)
            .field("layers", &self.summary())
            .field("learning_rate", &self.learning_rate)
            .finish()
    }
}
