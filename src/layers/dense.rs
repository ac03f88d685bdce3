//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer that performs the affine transformation
//! `out[k] = <W[.., k], input> + b[k]` for an input of any shape.

use crate::error::{CnnError, Result};
use crate::layers::{check_shape, recorded, Layer};
use crate::tensor::{shape_len, RegionIterator, Tensor};
use rand::Rng;
use tracing::debug;

/// Dense (fully connected) layer with weights and biases.
///
/// # Fields
///
/// * `weights` - Weight tensor of shape `input_shape ++ [output_length]`
/// * `biases` - Bias vector of shape `[output_length]`
/// * `input_shape` - Shape of the expected input
/// * `output_shape` - `[output_length]`
/// * `recent_input` - Input of the last training forward pass
///
/// # Example
///
/// ```
/// use rand::{rngs::StdRng, SeedableRng};
/// use rust_cnn::layers::{DenseLayer, Layer};
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let layer = DenseLayer::new(10, &[13, 13, 8], &mut rng).unwrap();
/// assert_eq!(layer.output_shape(), &[10]);
/// assert_eq!(layer.parameter_count(), 13 * 13 * 8 * 10 + 10);
/// ```
#[derive(Debug, Clone)]
pub struct DenseLayer {
    weights: Tensor,
    biases: Tensor,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    recent_input: Option<Tensor>,
}

impl DenseLayer {
    /// Create a new DenseLayer with He initialization.
    ///
    /// Weights are sampled from N(0, 1) and scaled by `sqrt(2 / fan_in)`,
    /// where `fan_in` is the number of input elements. Biases start at zero.
    ///
    /// # Errors
    ///
    /// [`CnnError::InvalidConfig`] if `output_length` is 0 or the input is empty.
    pub fn new<R: Rng + ?Sized>(
        output_length: usize,
        input_shape: &[usize],
        rng: &mut R,
    ) -> Result<Self> {
        if output_length == 0 {
            return Err(CnnError::InvalidConfig(
                "dense layer needs at least one output".to_string(),
            ));
        }
        let fan_in = shape_len(input_shape);
        if fan_in == 0 {
            return Err(CnnError::InvalidConfig(format!(
                "dense layer input {:?} has no elements",
                input_shape
            )));
        }

        let mut weight_shape = input_shape.to_vec();
        weight_shape.push(output_length);
        let weights = Tensor::random_normal(&weight_shape, (2.0 / fan_in as f64).sqrt(), rng);

        debug!(?input_shape, output_length, "dense layer created");

        Ok(Self {
            weights,
            biases: Tensor::zeros(&[output_length]),
            input_shape: input_shape.to_vec(),
            output_shape: vec![output_length],
            recent_input: None,
        })
    }

    /// Create a dense layer from explicit weights (`input_shape ++ [outputs]`) and biases.
    pub fn with_parameters(weights: Tensor, biases: Tensor) -> Result<Self> {
        let (&outputs, input_shape) = weights.shape().split_last().ok_or_else(|| {
            CnnError::InvalidConfig("dense weights need an output axis".to_string())
        })?;
        if biases.shape() != [outputs].as_slice() {
            return Err(CnnError::shape_mismatch(
                "dense biases",
                &[outputs],
                biases.shape(),
            ));
        }
        let input_shape = input_shape.to_vec();
        Ok(Self {
            weights,
            biases,
            input_shape,
            output_shape: vec![outputs],
            recent_input: None,
        })
    }

    pub fn output_length(&self) -> usize {
        self.output_shape[0]
    }

    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    pub fn biases(&self) -> &Tensor {
        &self.biases
    }
}

impl Layer for DenseLayer {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        check_shape("dense input", &self.input_shape, input)?;

        // One window of `input_shape` per output unit, in output order.
        let mut units = RegionIterator::new(&self.weights, &self.input_shape, &[])?;
        let mut values = Vec::with_capacity(self.output_length());
        while units.has_next() {
            let k = units.position();
            let weighted = units.next_values()?.inner_product(input)?;
            values.push(weighted + self.biases.get(k));
        }
        Tensor::new(self.output_shape.clone(), values)
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let output = self.forward(input)?;
        self.recent_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, gradient: &Tensor, learning_rate: f64) -> Result<Tensor> {
        check_shape("dense gradient", &self.output_shape, gradient)?;
        let input = recorded(&self.recent_input, "dense")?;

        let mut input_gradient = Tensor::zeros(&self.input_shape);
        let mut weight_gradients = Vec::with_capacity(self.output_length());
        for (k, &g) in gradient.values().iter().enumerate() {
            weight_gradients.push(input.mul_scalar(g));
            input_gradient.add_assign_scaled(&self.weights.channel(k)?, g)?;
        }

        let weight_gradients = Tensor::stack_last(&weight_gradients)?;
        self.weights
            .add_assign_scaled(&weight_gradients, -learning_rate)?;
        self.biases.add_assign_scaled(gradient, -learning_rate)?;

        Ok(input_gradient)
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}
