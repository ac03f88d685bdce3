//! N-dimensional convolution layer
//!
//! This module provides a ConvolutionLayer that slides a bank of learnable
//! filters over its input (cross-correlation, no kernel flip) and stacks the
//! resulting feature maps along a new trailing axis.

use crate::error::{CnnError, Result};
use crate::layers::{check_shape, recorded, Layer};
use crate::tensor::{cross_correlation_map, shape_len, Tensor};
use rand::Rng;
use tracing::debug;

/// Convolution layer with a bank of `depth` learnable filters.
///
/// # Fields
///
/// * `filters` - Filter bank of shape `filter_shape ++ [depth]`
/// * `filter_shape` - Extent of one filter, rank-padded to the input
/// * `cc_map_shape` - Shape of one cross-correlation map (`input - filter + 1` per axis)
/// * `input_shape` - Shape of the expected input
/// * `output_shape` - `cc_map_shape ++ [depth]`
/// * `recent_input` - Input of the last training forward pass
///
/// # Example
///
/// ```
/// use rand::{rngs::StdRng, SeedableRng};
/// use rust_cnn::layers::{ConvolutionLayer, Layer};
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let layer = ConvolutionLayer::new(&[3, 3], 8, &[28, 28], &mut rng).unwrap();
/// assert_eq!(layer.output_shape(), &[26, 26, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct ConvolutionLayer {
    filters: Tensor,
    filter_shape: Vec<usize>,
    cc_map_shape: Vec<usize>,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    recent_input: Option<Tensor>,
}

impl ConvolutionLayer {
    /// Create a convolution layer with He-initialized filters.
    ///
    /// Filter values are sampled from N(0, 1) and scaled by
    /// `sqrt(2 / product(input_shape))`.
    ///
    /// # Arguments
    ///
    /// * `filter_shape` - Extent of one filter; padded with trailing 1s to the input rank
    /// * `depth` - Number of filters
    /// * `input_shape` - Shape of the input this layer will receive
    /// * `rng` - Random number generator for filter initialization
    ///
    /// # Errors
    ///
    /// * [`CnnError::EmptyResult`] if `depth` is 0
    /// * [`CnnError::ShapeMismatch`] if the filter does not fit inside the input
    pub fn new<R: Rng + ?Sized>(
        filter_shape: &[usize],
        depth: usize,
        input_shape: &[usize],
        rng: &mut R,
    ) -> Result<Self> {
        if depth == 0 {
            return Err(CnnError::EmptyResult(
                "convolution layer needs at least one filter".to_string(),
            ));
        }
        let filter_shape = Self::checked_filter_shape(filter_shape, input_shape)?;

        let mut bank_shape = filter_shape.clone();
        bank_shape.push(depth);
        let scale = (2.0 / shape_len(input_shape) as f64).sqrt();
        let filters = Tensor::random_normal(&bank_shape, scale, rng);

        Ok(Self::assemble(filters, filter_shape, input_shape))
    }

    /// Create a convolution layer from an explicit filter bank.
    ///
    /// The last axis of `filters` indexes the filters; the remaining axes form the
    /// filter shape and must match the input rank.
    pub fn with_filters(filters: Tensor, input_shape: &[usize]) -> Result<Self> {
        let (&depth, filter_shape) = filters.shape().split_last().ok_or_else(|| {
            CnnError::EmptyResult("filter bank has no filter axis".to_string())
        })?;
        if depth == 0 {
            return Err(CnnError::EmptyResult(
                "convolution layer needs at least one filter".to_string(),
            ));
        }
        if filter_shape.len() != input_shape.len() {
            return Err(CnnError::shape_mismatch(
                "convolution filter bank rank",
                input_shape,
                filter_shape,
            ));
        }
        let filter_shape = Self::checked_filter_shape(filter_shape, input_shape)?;
        Ok(Self::assemble(filters, filter_shape, input_shape))
    }

    fn checked_filter_shape(filter_shape: &[usize], input_shape: &[usize]) -> Result<Vec<usize>> {
        if filter_shape.len() > input_shape.len() {
            return Err(CnnError::shape_mismatch(
                "convolution filter rank",
                input_shape,
                filter_shape,
            ));
        }
        let mut padded = filter_shape.to_vec();
        padded.resize(input_shape.len(), 1);
        let fits = padded
            .iter()
            .zip(input_shape)
            .all(|(&f, &i)| f >= 1 && f <= i);
        if !fits {
            return Err(CnnError::shape_mismatch(
                "convolution filter larger than input",
                input_shape,
                &padded,
            ));
        }
        Ok(padded)
    }

    fn assemble(filters: Tensor, filter_shape: Vec<usize>, input_shape: &[usize]) -> Self {
        let depth = filters.shape()[filters.rank() - 1];
        let cc_map_shape: Vec<usize> = input_shape
            .iter()
            .zip(&filter_shape)
            .map(|(&i, &f)| i - f + 1)
            .collect();
        let mut output_shape = cc_map_shape.clone();
        output_shape.push(depth);

        debug!(
            ?filter_shape,
            depth,
            ?input_shape,
            ?output_shape,
            "convolution layer created"
        );

        Self {
            filters,
            filter_shape,
            cc_map_shape,
            input_shape: input_shape.to_vec(),
            output_shape,
            recent_input: None,
        }
    }

    /// Number of filters.
    pub fn depth(&self) -> usize {
        self.output_shape[self.output_shape.len() - 1]
    }

    /// Shape of a single filter.
    pub fn filter_shape(&self) -> &[usize] {
        &self.filter_shape
    }

    /// The full filter bank (`filter_shape ++ [depth]`).
    pub fn filters(&self) -> &Tensor {
        &self.filters
    }
}

impl Layer for ConvolutionLayer {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        check_shape("convolution input", &self.input_shape, input)?;
        let rank = self.output_shape.len();

        let mut output: Option<Tensor> = None;
        for d in 0..self.depth() {
            let filter = self.filters.channel(d)?;
            let map = cross_correlation_map(input, &filter, &self.cc_map_shape, &[])?;
            output = Some(match output {
                None => map,
                Some(previous) => previous.append(&map, rank)?,
            });
        }

        let output = output.ok_or_else(|| {
            CnnError::EmptyResult("convolution produced no feature maps".to_string())
        })?;
        // A single map has no trailing filter axis yet.
        output.reshape(self.output_shape.clone())
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let output = self.forward(input)?;
        self.recent_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, gradient: &Tensor, learning_rate: f64) -> Result<Tensor> {
        check_shape("convolution gradient", &self.output_shape, gradient)?;
        let input = recorded(&self.recent_input, "convolution")?;

        let padding: Vec<usize> = self.filter_shape.iter().map(|&f| f - 1).collect();
        let mut input_gradient = input.zeroes();
        let mut filter_gradients = Vec::with_capacity(self.depth());

        for d in 0..self.depth() {
            // Each output channel of the gradient acts as a filter over the input.
            let gradient_map = gradient.channel(d)?;
            filter_gradients.push(cross_correlation_map(
                input,
                &gradient_map,
                &self.filter_shape,
                &[],
            )?);

            // d(input) = d(output) correlated with the flipped filter, padded back
            // out to the input extent.
            let flipped = self.filters.channel(d)?.flip();
            let contribution =
                cross_correlation_map(&gradient_map, &flipped, &self.input_shape, &padding)?;
            input_gradient.add_assign_scaled(&contribution, 1.0)?;
        }

        let filter_gradients = Tensor::stack_last(&filter_gradients)?;
        self.filters
            .add_assign_scaled(&filter_gradients, -learning_rate)?;

        Ok(input_gradient)
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn parameter_count(&self) -> usize {
        self.filters.len()
    }

    fn name(&self) -> &'static str {
        "convolution"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_convolution_output_shape() {
        let mut rng = StdRng::seed_from_u64(42);
        let layer = ConvolutionLayer::new(&[3, 3], 8, &[28, 28], &mut rng).unwrap();
        assert_eq!(layer.filter_shape(), &[3, 3]);
        assert_eq!(layer.output_shape(), &[26, 26, 8]);
        assert_eq!(layer.parameter_count(), 72);
    }

    #[test]
    fn test_convolution_pads_filter_rank() {
        let mut rng = StdRng::seed_from_u64(42);
        let layer = ConvolutionLayer::new(&[3, 3], 4, &[10, 10, 2], &mut rng).unwrap();
        assert_eq!(layer.filter_shape(), &[3, 3, 1]);
        assert_eq!(layer.output_shape(), &[8, 8, 2, 4]);
    }

    #[test]
    fn test_convolution_rejects_bad_configuration() {
        let mut rng = StdRng::seed_from_u64(42);
        assert!(matches!(
            ConvolutionLayer::new(&[3, 3], 0, &[8, 8], &mut rng),
            Err(CnnError::EmptyResult(_))
        ));
        assert!(matches!(
            ConvolutionLayer::new(&[9, 3], 1, &[8, 8], &mut rng),
            Err(CnnError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            ConvolutionLayer::new(&[3, 3, 3], 1, &[8, 8], &mut rng),
            Err(CnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_convolution_he_initialization_is_seeded() {
        let mut rng1 = StdRng::seed_from_u64(12345);
        let mut rng2 = StdRng::seed_from_u64(12345);
        let a = ConvolutionLayer::new(&[5, 5], 3, &[12, 12], &mut rng1).unwrap();
        let b = ConvolutionLayer::new(&[5, 5], 3, &[12, 12], &mut rng2).unwrap();
        assert_eq!(a.filters(), b.filters());
    }

    #[test]
    fn test_identity_filter_reproduces_input() {
        let filters = Tensor::new(vec![1, 1, 1], vec![1.0]).unwrap();
        let layer = ConvolutionLayer::with_filters(filters, &[3, 4]).unwrap();
        let input = Tensor::new(vec![3, 4], (0..12).map(|v| v as f64 * 0.5).collect()).unwrap();

        let output = layer.forward(&input).unwrap();
        assert_eq!(output.shape(), &[3, 4, 1]);
        assert_eq!(output.values(), input.values());
    }

    #[test]
    fn test_forward_stacks_filters() {
        // Two 1x1 filters: identity and doubling.
        let filters = Tensor::new(vec![1, 1, 2], vec![1.0, 2.0]).unwrap();
        let layer = ConvolutionLayer::with_filters(filters, &[2, 2]).unwrap();
        let input = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        let output = layer.forward(&input).unwrap();
        assert_eq!(output.shape(), &[2, 2, 2]);
        assert_eq!(output.channel(0).unwrap(), input);
        assert_eq!(output.channel(1).unwrap(), input.mul_scalar(2.0));
    }

    #[test]
    fn test_backward_before_forward_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut layer = ConvolutionLayer::new(&[2, 2], 1, &[3, 3], &mut rng).unwrap();
        let gradient = Tensor::zeros(&[2, 2, 1]);
        assert!(matches!(
            layer.backward(&gradient, 0.1),
            Err(CnnError::InvalidState(_))
        ));
    }

    #[test]
    fn test_backward_matches_numerical_gradient() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut layer = ConvolutionLayer::new(&[2, 2], 2, &[4, 3], &mut rng).unwrap();
        let input = Tensor::random_normal(&[4, 3], 1.0, &mut rng);
        // Loss = <output, weights> so d(loss)/d(output) = weights.
        let weights = Tensor::random_normal(layer.output_shape(), 1.0, &mut rng);
        let loss = |layer: &ConvolutionLayer, x: &Tensor| {
            layer.forward(x).unwrap().inner_product(&weights).unwrap()
        };

        let eps = 1e-6;
        let mut numerical = input.zeroes();
        for i in 0..input.len() {
            let mut plus = input.clone();
            plus.values_mut()[i] += eps;
            let mut minus = input.clone();
            minus.values_mut()[i] -= eps;
            numerical.values_mut()[i] = (loss(&layer, &plus) - loss(&layer, &minus)) / (2.0 * eps);
        }

        let before = layer.filters().clone();
        layer.forward_train(&input).unwrap();
        let analytical = layer.backward(&weights, 0.0).unwrap();
        assert_eq!(layer.filters(), &before);

        for (a, n) in analytical.values().iter().zip(numerical.values()) {
            assert_relative_eq!(*a, *n, epsilon = 1e-6, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_filter_update_follows_gradient() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut layer = ConvolutionLayer::new(&[2, 2], 1, &[3, 3], &mut rng).unwrap();
        let input = Tensor::random_normal(&[3, 3], 1.0, &mut rng);
        let weights = Tensor::random_normal(layer.output_shape(), 1.0, &mut rng);

        let before = layer.forward(&input).unwrap().inner_product(&weights).unwrap();
        layer.forward_train(&input).unwrap();
        layer.backward(&weights, 0.01).unwrap();
        let after = layer.forward(&input).unwrap().inner_product(&weights).unwrap();
        assert!(after < before);
    }
}
