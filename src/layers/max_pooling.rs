//! Max pooling layer implementation
//!
//! Each output cell holds the maximum of one (possibly strided) window of the
//! input. The position of that maximum is remembered during training so the
//! backward pass can route the gradient to exactly that input cell.

use crate::error::{CnnError, Result};
use crate::layers::{check_shape, recorded, Layer};
use crate::tensor::{index_to_coords, pad_shape, RegionIterator, StridingCoordIterator, Tensor};
use tracing::debug;

/// Max pooling over N-dimensional windows.
///
/// # Example
///
/// ```
/// use rust_cnn::layers::{Layer, MaxPoolingLayer};
///
/// let layer = MaxPoolingLayer::new(&[2, 2], &[2, 2], &[26, 26, 8]).unwrap();
/// assert_eq!(layer.output_shape(), &[13, 13, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct MaxPoolingLayer {
    strides: Vec<usize>,
    window: Vec<usize>,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    max_indices: Option<Vec<usize>>,
}

impl MaxPoolingLayer {
    /// Create a pooling layer.
    ///
    /// `strides` and `window` are padded with trailing 1s up to the input rank.
    /// Output extent per axis is `ceil((input - window + 1) / stride)`.
    pub fn new(strides: &[usize], window: &[usize], input_shape: &[usize]) -> Result<Self> {
        let rank = input_shape.len();
        if strides.len() > rank || window.len() > rank {
            return Err(CnnError::InvalidConfig(format!(
                "pooling strides {:?} / window {:?} exceed input rank {}",
                strides, window, rank
            )));
        }
        let strides = pad_shape(strides, rank);
        let window = pad_shape(window, rank);
        if strides.contains(&0) || window.contains(&0) {
            return Err(CnnError::InvalidConfig(format!(
                "pooling strides {:?} and window {:?} must be positive",
                strides, window
            )));
        }
        if window.iter().zip(input_shape).any(|(&w, &i)| w > i) {
            return Err(CnnError::shape_mismatch(
                "pooling window larger than input",
                input_shape,
                &window,
            ));
        }

        let output_shape: Vec<usize> = input_shape
            .iter()
            .zip(&window)
            .zip(&strides)
            .map(|((&i, &w), &s)| (i - w + 1).div_ceil(s))
            .collect();

        debug!(?strides, ?window, ?input_shape, ?output_shape, "max pooling layer created");

        Ok(Self {
            strides,
            window,
            input_shape: input_shape.to_vec(),
            output_shape,
            max_indices: None,
        })
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn window(&self) -> &[usize] {
        &self.window
    }

    /// Pool `input`, returning the output and the in-window flat index of every maximum.
    fn pool(&self, input: &Tensor) -> Result<(Tensor, Vec<usize>)> {
        check_shape("max pooling input", &self.input_shape, input)?;

        let mut regions = RegionIterator::with_strides(input, &self.window, &[], &self.strides)?;
        let mut values = Vec::with_capacity(regions.placements());
        let mut max_indices = Vec::with_capacity(regions.placements());
        while regions.has_next() {
            let region = regions.next_region()?;
            let index = region.max_value_index().ok_or_else(|| {
                CnnError::EmptyResult("max pooling window is empty".to_string())
            })?;
            max_indices.push(index);
            values.push(region.get(index));
        }

        Ok((Tensor::new(self.output_shape.clone(), values)?, max_indices))
    }
}

impl Layer for MaxPoolingLayer {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.pool(input).map(|(output, _)| output)
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let (output, max_indices) = self.pool(input)?;
        self.max_indices = Some(max_indices);
        Ok(output)
    }

    /// Route each output gradient to the input cell that held the window maximum.
    ///
    /// Pooling has no parameters, so `learning_rate` is unused.
    fn backward(&mut self, gradient: &Tensor, _learning_rate: f64) -> Result<Tensor> {
        check_shape("max pooling gradient", &self.output_shape, gradient)?;
        let max_indices = recorded(&self.max_indices, "max pooling")?;

        let mut input_gradient = Tensor::zeros(&self.input_shape);
        let last_origin: Vec<isize> = self
            .input_shape
            .iter()
            .zip(&self.window)
            .map(|(&i, &w)| (i - w) as isize)
            .collect();
        let mut origins =
            StridingCoordIterator::new(&vec![0; last_origin.len()], &last_origin, &self.strides)?;

        while origins.has_next() {
            let cell = origins.position();
            let origin = origins.next_coords()?;
            let local = index_to_coords(max_indices[cell], &self.window);
            let target: Vec<isize> = origin
                .iter()
                .zip(&local)
                .map(|(&o, &l)| o + l as isize)
                .collect();
            // Overlapping windows can pick the same cell; their gradients add up.
            input_gradient.add_at(&target, gradient.get(cell))?;
        }

        Ok(input_gradient)
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "max_pooling"
    }
}
