//! Window iteration and cross-correlation
//!
//! [`RegionIterator`] slides a fixed-size window over a tensor, optionally with
//! zero padding and per-axis strides. Each step yields either a copied window
//! tensor or a lazy [`WindowValues`] stream, which lets convolution compute
//! inner products without materializing every window.

use super::{coords_to_index, pad_shape, shape_len, CoordIterator, StridingCoordIterator, Tensor};
use crate::error::{CnnError, Result};

/// Bring a window shape to `rank`.
///
/// Shorter shapes get trailing 1s. Longer shapes may only drop trailing 1s.
pub fn fit_rank(shape: &[usize], rank: usize) -> Result<Vec<usize>> {
    if shape.len() <= rank {
        return Ok(pad_shape(shape, rank));
    }
    if shape[rank..].iter().all(|&extent| extent == 1) {
        return Ok(shape[..rank].to_vec());
    }
    Err(CnnError::shape_mismatch(
        format!("window of rank {} over rank {}", shape.len(), rank),
        &shape[..rank],
        shape,
    ))
}

/// Slides a window over a tensor.
///
/// Window origins run from `-padding` to `extent - window + padding` on every
/// axis (inclusive), advancing by `stride`. Cells outside the tensor read as 0.
#[derive(Debug, Clone)]
pub struct RegionIterator<'a> {
    tensor: &'a Tensor,
    window: Vec<usize>,
    origins: StridingCoordIterator,
}

impl<'a> RegionIterator<'a> {
    /// Unit-stride windows of shape `window` with the given padding.
    pub fn new(tensor: &'a Tensor, window: &[usize], padding: &[usize]) -> Result<Self> {
        Self::with_strides(tensor, window, padding, &[])
    }

    /// Strided windows. Missing padding entries are 0, missing strides are 1.
    pub fn with_strides(
        tensor: &'a Tensor,
        window: &[usize],
        padding: &[usize],
        strides: &[usize],
    ) -> Result<Self> {
        let rank = tensor.rank();
        let window = fit_rank(window, rank)?;
        if padding.len() > rank || strides.len() > rank {
            return Err(CnnError::InvalidConfig(format!(
                "padding {:?} / strides {:?} exceed tensor rank {}",
                padding, strides, rank
            )));
        }
        if window.contains(&0) {
            return Err(CnnError::InvalidConfig(format!(
                "window extents must be positive, got {:?}",
                window
            )));
        }

        let mut bottom = Vec::with_capacity(rank);
        let mut top = Vec::with_capacity(rank);
        for axis in 0..rank {
            let pad = padding.get(axis).copied().unwrap_or(0) as isize;
            let last = tensor.shape()[axis] as isize - window[axis] as isize + pad;
            if last < -pad {
                return Err(CnnError::EmptyResult(format!(
                    "window {:?} does not fit tensor {:?} with padding {:?}",
                    window,
                    tensor.shape(),
                    padding
                )));
            }
            bottom.push(-pad);
            top.push(last);
        }
        let strides: Vec<usize> = (0..rank)
            .map(|axis| strides.get(axis).copied().unwrap_or(1))
            .collect();
        let origins = StridingCoordIterator::new(&bottom, &top, &strides)?;

        Ok(Self {
            tensor,
            window,
            origins,
        })
    }

    pub fn has_next(&self) -> bool {
        self.origins.has_next()
    }

    /// Number of windows produced so far.
    pub fn position(&self) -> usize {
        self.origins.position()
    }

    /// Origin of the most recently produced window.
    pub fn origin(&self) -> &[isize] {
        self.origins.current()
    }

    /// Window shape, rank-padded to the tensor.
    pub fn window(&self) -> &[usize] {
        &self.window
    }

    /// Number of window placements along each axis.
    pub fn grid_shape(&self) -> Vec<usize> {
        self.origins.extents()
    }

    /// Total number of window placements.
    pub fn placements(&self) -> usize {
        shape_len(&self.grid_shape())
    }

    fn next_corners(&mut self) -> Result<(Vec<isize>, Vec<isize>)> {
        let origin = self.origins.next_coords()?.to_vec();
        let far = origin
            .iter()
            .zip(&self.window)
            .map(|(&o, &w)| o + w as isize - 1)
            .collect();
        Ok((origin, far))
    }

    /// Copy of the next window.
    pub fn next_region(&mut self) -> Result<Tensor> {
        let (origin, far) = self.next_corners()?;
        self.tensor.region(&origin, &far)
    }

    /// Lazy value stream over the next window.
    pub fn next_values(&mut self) -> Result<WindowValues<'a>> {
        let (origin, far) = self.next_corners()?;
        Ok(WindowValues {
            tensor: self.tensor,
            coords: CoordIterator::new(&origin, &far)?,
        })
    }
}

impl Iterator for RegionIterator<'_> {
    type Item = Tensor;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        self.next_region().ok()
    }
}

/// Values of one window, read lazily in window-local flat order.
#[derive(Debug, Clone)]
pub struct WindowValues<'a> {
    tensor: &'a Tensor,
    coords: CoordIterator,
}

impl WindowValues<'_> {
    /// Inner product of the window with a filter of the same element count.
    pub fn inner_product(mut self, filter: &Tensor) -> Result<f64> {
        if self.coords.len() != filter.len() {
            return Err(CnnError::shape_mismatch(
                "window inner product",
                &self.coords.extents(),
                filter.shape(),
            ));
        }
        let mut result = 0.0;
        for &weight in filter.values() {
            let coords = self.coords.next_coords()?;
            if let Some(index) = coords_to_index(coords, self.tensor.shape()) {
                result += self.tensor.values()[index] * weight;
            }
        }
        Ok(result)
    }
}

impl Iterator for WindowValues<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let coords = self.coords.next_coords().ok()?;
        Some(self.tensor.at(coords))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.coords.size_hint()
    }
}

/// Slide `filter` over `base` and record the inner product at every placement.
///
/// The filter is rank-padded to `base`. Placements span `-padding` to
/// `extent - filter + padding` on each axis, so the result has
/// `extent - filter + 2 * padding + 1` cells per axis. `output_shape`, padded
/// with trailing 1s to the base rank, must equal that grid axis by axis.
///
/// # Errors
///
/// * [`CnnError::EmptyResult`] if the filter fits nowhere.
/// * [`CnnError::ShapeMismatch`] if `output_shape` disagrees with the placement grid.
pub fn cross_correlation_map(
    base: &Tensor,
    filter: &Tensor,
    output_shape: &[usize],
    padding: &[usize],
) -> Result<Tensor> {
    let mut regions = RegionIterator::new(base, filter.shape(), padding)?;
    let grid = regions.grid_shape();
    let matches_grid = fit_rank(output_shape, base.rank()).map_or(false, |shape| shape == grid);
    if !matches_grid {
        return Err(CnnError::shape_mismatch(
            "cross-correlation map",
            output_shape,
            &grid,
        ));
    }

    let mut values = Vec::with_capacity(regions.placements());
    while regions.has_next() {
        values.push(regions.next_values()?.inner_product(filter)?);
    }
    Tensor::new(output_shape.to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sequential(shape: &[usize]) -> Tensor {
        let values = (0..shape_len(shape)).map(|v| v as f64).collect();
        Tensor::new(shape.to_vec(), values).unwrap()
    }

    #[test]
    fn test_fit_rank_pads_and_trims() {
        assert_eq!(fit_rank(&[3], 3).unwrap(), vec![3, 1, 1]);
        assert_eq!(fit_rank(&[3, 3, 1], 2).unwrap(), vec![3, 3]);
        assert!(fit_rank(&[3, 3, 2], 2).is_err());
    }

    #[test]
    fn test_region_iterator_counts_placements() {
        let t = Tensor::zeros(&[5, 4]);
        let regions = RegionIterator::new(&t, &[3, 3], &[]).unwrap();
        assert_eq!(regions.grid_shape(), vec![3, 2]);
        assert_eq!(regions.count(), 6);
    }

    #[test]
    fn test_region_iterator_with_padding() {
        let t = Tensor::zeros(&[4, 4]);
        let regions = RegionIterator::new(&t, &[3, 3], &[1, 1]).unwrap();
        assert_eq!(regions.grid_shape(), vec![4, 4]);
    }

    #[test]
    fn test_region_iterator_strided_windows() {
        let t = sequential(&[4, 4]);
        let mut regions = RegionIterator::with_strides(&t, &[2, 2], &[], &[2, 2]).unwrap();
        assert_eq!(regions.placements(), 4);

        let first = regions.next_region().unwrap();
        assert_eq!(regions.origin(), &[0, 0]);
        assert_eq!(first.values(), &[0.0, 1.0, 4.0, 5.0]);

        let second = regions.next_region().unwrap();
        assert_eq!(regions.origin(), &[2, 0]);
        assert_eq!(second.values(), &[2.0, 3.0, 6.0, 7.0]);
    }

    #[test]
    fn test_region_iterator_window_too_large() {
        let t = Tensor::zeros(&[2, 2]);
        assert!(matches!(
            RegionIterator::new(&t, &[3, 3], &[]),
            Err(CnnError::EmptyResult(_))
        ));
    }

    #[test]
    fn test_window_values_match_region() {
        let t = sequential(&[4, 3]);
        let mut a = RegionIterator::new(&t, &[2, 2], &[1, 0]).unwrap();
        let mut b = RegionIterator::new(&t, &[2, 2], &[1, 0]).unwrap();
        while a.has_next() {
            let lazy: Vec<f64> = a.next_values().unwrap().collect();
            let copied = b.next_region().unwrap();
            assert_eq!(lazy.as_slice(), copied.values());
        }
    }

    #[test]
    fn test_cross_correlation_known_values() {
        // 3x3 input, 2x2 filter of ones: each output is the sum of a 2x2 block.
        let base = sequential(&[3, 3]);
        let filter = Tensor::new(vec![2, 2], vec![1.0; 4]).unwrap();
        let map = cross_correlation_map(&base, &filter, &[2, 2], &[]).unwrap();
        assert_eq!(map.values(), &[8.0, 12.0, 20.0, 24.0]);
    }

    #[test]
    fn test_cross_correlation_with_padding_restores_extent() {
        let base = Tensor::new(vec![2, 2], vec![1.0; 4]).unwrap();
        let filter = Tensor::new(vec![2, 2], vec![1.0; 4]).unwrap();
        let map = cross_correlation_map(&base, &filter, &[3, 3], &[1, 1]).unwrap();
        assert_abs_diff_eq!(map.at(&[0, 0]), 1.0);
        assert_abs_diff_eq!(map.at(&[1, 1]), 4.0);
        assert_abs_diff_eq!(map.at(&[2, 1]), 2.0);
    }

    #[test]
    fn test_cross_correlation_rejects_wrong_output_shape() {
        let base = Tensor::zeros(&[4, 4]);
        let filter = Tensor::zeros(&[3, 3]);
        assert!(matches!(
            cross_correlation_map(&base, &filter, &[3, 3], &[]),
            Err(CnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_cross_correlation_rejects_same_count_different_grid() {
        // Four placements on a 2x2 grid; [4, 1] has the right count but the wrong axes.
        let base = Tensor::zeros(&[3, 3]);
        let filter = Tensor::zeros(&[2, 2]);
        assert!(matches!(
            cross_correlation_map(&base, &filter, &[4, 1], &[]),
            Err(CnnError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            cross_correlation_map(&base, &filter, &[1, 4], &[]),
            Err(CnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_cross_correlation_accepts_rank_padded_output() {
        let base = Tensor::zeros(&[3, 3, 2]);
        let filter = Tensor::zeros(&[2, 2]);
        let map = cross_correlation_map(&base, &filter, &[2, 2, 2], &[]).unwrap();
        assert_eq!(map.shape(), &[2, 2, 2]);
        let flat = cross_correlation_map(&Tensor::zeros(&[3, 3]), &filter, &[2, 2, 1], &[]).unwrap();
        assert_eq!(flat.shape(), &[2, 2, 1]);
    }
}
