//! N-dimensional tensors and region iteration
//!
//! A [`Tensor`] owns a flat `f64` buffer and a shape. Coordinates map to flat
//! indices with a mixed-radix (Horner) encoding in which the last axis is the
//! most significant, so the first axis varies fastest in memory and
//! concatenating along the last axis is plain buffer concatenation.
//!
//! Region extraction always copies. A window taken out of a tensor never
//! aliases its source.

mod iter;
mod region;

pub use iter::{CoordIterator, StridingCoordIterator};
pub use region::{cross_correlation_map, fit_rank, RegionIterator, WindowValues};

use crate::error::{CnnError, Result};
use rand::Rng;
use rand_distr::StandardNormal;

/// Number of elements described by a shape.
pub fn shape_len(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Pad a shape with trailing 1s up to `rank`.
///
/// Shapes that are already at least `rank` long are returned unchanged.
pub fn pad_shape(shape: &[usize], rank: usize) -> Vec<usize> {
    let mut padded = shape.to_vec();
    while padded.len() < rank {
        padded.push(1);
    }
    padded
}

/// Encode a coordinate as a flat index, or `None` when it falls outside `shape`.
///
/// Coordinates shorter than the shape are treated as zero on the missing
/// axes; extra trailing coordinates must be zero (they address singleton axes).
pub fn coords_to_index(coords: &[isize], shape: &[usize]) -> Option<usize> {
    if coords.iter().skip(shape.len()).any(|&c| c != 0) {
        return None;
    }

    let mut index = 0usize;
    for axis in (0..shape.len()).rev() {
        let coord = coords.get(axis).copied().unwrap_or(0);
        if coord < 0 || coord as usize >= shape[axis] {
            return None;
        }
        index = index * shape[axis] + coord as usize;
    }
    Some(index)
}

/// Decode a flat index back into a coordinate for `shape`.
pub fn index_to_coords(mut index: usize, shape: &[usize]) -> Vec<usize> {
    let mut coords = Vec::with_capacity(shape.len());
    for &extent in shape {
        coords.push(index % extent);
        index /= extent;
    }
    coords
}

/// Dense N-dimensional array of `f64` values.
///
/// # Example
///
/// ```
/// use rust_cnn::tensor::Tensor;
///
/// let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// assert_eq!(t.at(&[1, 0]), 2.0);
/// assert_eq!(t.at(&[0, 1]), 3.0);
/// assert_eq!(t.at(&[-1, 0]), 0.0); // implicit zero padding
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl Tensor {
    /// Create a tensor from a shape and its flat values.
    ///
    /// # Errors
    ///
    /// [`CnnError::ShapeMismatch`] if `values.len()` is not the product of `shape`.
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if values.len() != shape_len(&shape) {
            return Err(CnnError::shape_mismatch(
                "Tensor::new",
                &shape,
                &[values.len()],
            ));
        }
        Ok(Self { shape, values })
    }

    /// Zero-initialized tensor.
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            values: vec![0.0; shape_len(shape)],
        }
    }

    /// Rank-1 tensor holding `values`.
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Samples every element from N(0, 1) and multiplies it by `scale`.
    pub fn random_normal<R: Rng + ?Sized>(shape: &[usize], scale: f64, rng: &mut R) -> Self {
        let values = (0..shape_len(shape))
            .map(|_| rng.sample::<f64, _>(StandardNormal) * scale)
            .collect();
        Self {
            shape: shape.to_vec(),
            values,
        }
    }

    /// One-hot rank-1 tensor with a 1 at `class`.
    pub fn one_hot(class: usize, classes: usize) -> Result<Self> {
        if class >= classes {
            return Err(CnnError::BoundsViolation(format!(
                "class {} out of range for {} classes",
                class, classes
            )));
        }
        let mut values = vec![0.0; classes];
        values[class] = 1.0;
        Ok(Self::from_vec(values))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Value at flat index `index`. Callers guarantee `index < len()`; outside the
    /// crate, read through [`Tensor::values`] or [`Tensor::at`].
    pub(crate) fn get(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// Value at `coords`, or 0 when the coordinate lies outside the tensor.
    pub fn at(&self, coords: &[isize]) -> f64 {
        match coords_to_index(coords, &self.shape) {
            Some(index) => self.values[index],
            None => 0.0,
        }
    }

    /// Write `value` at `coords`.
    ///
    /// # Errors
    ///
    /// [`CnnError::BoundsViolation`] if the coordinate is outside the tensor.
    pub fn set(&mut self, coords: &[isize], value: f64) -> Result<()> {
        let index = self.index_of(coords)?;
        self.values[index] = value;
        Ok(())
    }

    /// Add `value` to the element at `coords`.
    pub fn add_at(&mut self, coords: &[isize], value: f64) -> Result<()> {
        let index = self.index_of(coords)?;
        self.values[index] += value;
        Ok(())
    }

    pub fn set_index(&mut self, index: usize, value: f64) -> Result<()> {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CnnError::BoundsViolation(format!(
                "flat index {} outside tensor of {} elements",
                index,
                self.values.len()
            ))),
        }
    }

    fn index_of(&self, coords: &[isize]) -> Result<usize> {
        coords_to_index(coords, &self.shape).ok_or_else(|| {
            CnnError::BoundsViolation(format!(
                "coordinate {:?} outside tensor of shape {:?}",
                coords, self.shape
            ))
        })
    }

    /// Same tensor with a different shape of equal element count.
    pub fn reshape(self, shape: Vec<usize>) -> Result<Self> {
        Self::new(shape, self.values)
    }

    /// Same-shape tensor of zeros.
    pub fn zeroes(&self) -> Self {
        Self::zeros(&self.shape)
    }

    /// Copy of the inclusive box between two corners.
    ///
    /// The box may extend past the tensor; those cells read as 0.
    pub fn region(&self, corner1: &[isize], corner2: &[isize]) -> Result<Self> {
        let mut coords = CoordIterator::new(corner1, corner2)?;
        let shape = coords.extents();
        let mut values = Vec::with_capacity(shape_len(&shape));
        while coords.has_next() {
            values.push(self.at(coords.next_coords()?));
        }
        Ok(Self { shape, values })
    }

    /// Write `block` into this tensor with its first cell at `origin`.
    ///
    /// Cells of `block` that land outside this tensor are dropped.
    pub fn embed(&mut self, origin: &[isize], block: &Tensor) -> Result<()> {
        if origin.len() != block.rank() {
            return Err(CnnError::shape_mismatch(
                "Tensor::embed origin",
                block.shape(),
                &[origin.len()],
            ));
        }
        let far: Vec<isize> = origin
            .iter()
            .zip(block.shape())
            .map(|(&o, &e)| o + e as isize - 1)
            .collect();
        let mut coords = CoordIterator::new(origin, &far)?;
        while coords.has_next() {
            let source = coords.position();
            let target = coords.next_coords()?;
            if let Some(index) = coords_to_index(target, &self.shape) {
                self.values[index] = block.values[source];
            }
        }
        Ok(())
    }

    /// Reverse the element order along every axis.
    pub fn flip(&self) -> Self {
        // Reversing every axis of a mixed-radix layout reverses the flat buffer.
        let mut values = self.values.clone();
        values.reverse();
        Self {
            shape: self.shape.clone(),
            values,
        }
    }

    /// Elementwise `self + other * factor`.
    pub fn add(&self, other: &Tensor, factor: f64) -> Result<Self> {
        let mut result = self.clone();
        result.add_assign_scaled(other, factor)?;
        Ok(result)
    }

    /// In-place `self += other * factor`.
    pub fn add_assign_scaled(&mut self, other: &Tensor, factor: f64) -> Result<()> {
        self.ensure_same_shape("Tensor::add", other)?;
        for (value, &delta) in self.values.iter_mut().zip(&other.values) {
            *value += delta * factor;
        }
        Ok(())
    }

    pub fn mul_scalar(&self, scalar: f64) -> Self {
        Self {
            shape: self.shape.clone(),
            values: self.values.iter().map(|v| v * scalar).collect(),
        }
    }

    /// Elementwise product; shapes must match exactly.
    pub fn mul_elem(&self, other: &Tensor) -> Result<Self> {
        self.ensure_same_shape("Tensor::mul_elem", other)?;
        Ok(Self {
            shape: self.shape.clone(),
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| a * b)
                .collect(),
        })
    }

    /// Sum of elementwise products; only the element counts must agree.
    pub fn inner_product(&self, other: &Tensor) -> Result<f64> {
        if self.len() != other.len() {
            return Err(CnnError::shape_mismatch(
                "Tensor::inner_product",
                &self.shape,
                &other.shape,
            ));
        }
        Ok(self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .sum())
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Concatenate `other` after `self` along the last axis of a rank-`rank` result.
    ///
    /// Both operands are lifted to `rank` with trailing 1s first; every axis but
    /// the last must then agree.
    pub fn append(&self, other: &Tensor, rank: usize) -> Result<Self> {
        if rank == 0 || self.rank() > rank || other.rank() > rank {
            return Err(CnnError::shape_mismatch(
                format!("Tensor::append to rank {}", rank),
                &self.shape,
                &other.shape,
            ));
        }
        let left = pad_shape(&self.shape, rank);
        let right = pad_shape(&other.shape, rank);
        if left[..rank - 1] != right[..rank - 1] {
            return Err(CnnError::shape_mismatch("Tensor::append", &left, &right));
        }

        let mut shape = left;
        shape[rank - 1] += right[rank - 1];
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(&other.values);
        Ok(Self { shape, values })
    }

    /// Stack equally-shaped tensors along a new trailing axis.
    pub fn stack_last(tensors: &[Tensor]) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| CnnError::EmptyResult("nothing to stack".to_string()))?;
        let mut values = Vec::with_capacity(first.len() * tensors.len());
        for tensor in tensors {
            first.ensure_same_shape("Tensor::stack_last", tensor)?;
            values.extend_from_slice(&tensor.values);
        }
        let mut shape = first.shape.clone();
        shape.push(tensors.len());
        Ok(Self { shape, values })
    }

    /// Slice `index` of the last axis, with that axis removed.
    pub fn channel(&self, index: usize) -> Result<Self> {
        let (&depth, inner) = self
            .shape
            .split_last()
            .ok_or_else(|| CnnError::BoundsViolation("channel of a rank-0 tensor".to_string()))?;
        if index >= depth {
            return Err(CnnError::BoundsViolation(format!(
                "channel {} outside last axis of extent {}",
                index, depth
            )));
        }
        let block = shape_len(inner);
        Ok(Self {
            shape: inner.to_vec(),
            values: self.values[index * block..(index + 1) * block].to_vec(),
        })
    }

    /// Flat index of the largest value; the first one wins on ties.
    pub fn max_value_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (index, &value) in self.values.iter().enumerate() {
            if best.map_or(true, |b| value > self.values[b]) {
                best = Some(index);
            }
        }
        best
    }

    pub fn max_value(&self) -> Option<f64> {
        self.max_value_index().map(|index| self.values[index])
    }

    /// Same shape and every element within `epsilon`.
    pub fn approx_eq(&self, other: &Tensor, epsilon: f64) -> bool {
        self.shape == other.shape
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| (a - b).abs() <= epsilon)
    }

    fn ensure_same_shape(&self, context: &str, other: &Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(CnnError::shape_mismatch(context, &self.shape, &other.shape));
        }
        Ok(())
    }
}
