//! Coordinate iterators over axis-aligned boxes
//!
//! Both iterators walk an inclusive box in odometer order with the first axis
//! varying fastest. This matches the memory layout of [`Tensor`](super::Tensor),
//! so the k-th coordinate produced over a box of shape `S` is flat index `k`
//! of a tensor with shape `S`.

use crate::error::{CnnError, Result};

/// Enumerates every integer coordinate inside an inclusive box exactly once.
///
/// The corners may be given in any order per axis; the lower value becomes the
/// start and the higher value the last visited value on that axis.
///
/// # Example
///
/// ```
/// use rust_cnn::tensor::CoordIterator;
///
/// let coords: Vec<Vec<isize>> = CoordIterator::new(&[0, 0], &[1, 1]).unwrap().collect();
/// assert_eq!(coords, vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]);
/// ```
#[derive(Debug, Clone)]
pub struct CoordIterator {
    start: Vec<isize>,
    end: Vec<isize>,
    current: Vec<isize>,
    position: usize,
    total: usize,
}

impl CoordIterator {
    /// Create an iterator over the inclusive box spanned by two corners.
    pub fn new(corner1: &[isize], corner2: &[isize]) -> Result<Self> {
        if corner1.len() != corner2.len() {
            return Err(CnnError::InvalidConfig(format!(
                "box corners have different ranks ({} and {})",
                corner1.len(),
                corner2.len()
            )));
        }

        let start: Vec<isize> = corner1
            .iter()
            .zip(corner2)
            .map(|(&a, &b)| a.min(b))
            .collect();
        let end: Vec<isize> = corner1
            .iter()
            .zip(corner2)
            .map(|(&a, &b)| a.max(b))
            .collect();
        let total = start
            .iter()
            .zip(&end)
            .map(|(&s, &e)| (e - s + 1) as usize)
            .product();

        Ok(Self {
            current: start.clone(),
            start,
            end,
            position: 0,
            total,
        })
    }

    /// Whether another coordinate remains.
    pub fn has_next(&self) -> bool {
        self.position < self.total
    }

    /// Number of coordinates produced so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The most recently produced coordinate.
    pub fn current(&self) -> &[isize] {
        &self.current
    }

    /// Extent of the box along each axis.
    pub fn extents(&self) -> Vec<usize> {
        self.start
            .iter()
            .zip(&self.end)
            .map(|(&s, &e)| (e - s + 1) as usize)
            .collect()
    }

    /// Advance the odometer and return the new coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`CnnError::BoundsViolation`] once the box is exhausted.
    pub fn next_coords(&mut self) -> Result<&[isize]> {
        if !self.has_next() {
            return Err(CnnError::BoundsViolation(format!(
                "coordinate iterator exhausted after {} coordinates",
                self.total
            )));
        }

        if self.position > 0 {
            for axis in 0..self.current.len() {
                if self.current[axis] < self.end[axis] {
                    self.current[axis] += 1;
                    break;
                }
                self.current[axis] = self.start[axis];
            }
        }
        self.position += 1;
        Ok(&self.current)
    }
}

impl Iterator for CoordIterator {
    type Item = Vec<isize>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_coords().ok().map(<[isize]>::to_vec)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CoordIterator {}

/// Coordinate iterator whose step along each axis is scaled by a stride.
///
/// Visits `corner1 + k * stride` for every `k` such that the result stays
/// inside the inclusive box. Used to move pooling windows by more than one
/// cell per step.
#[derive(Debug, Clone)]
pub struct StridingCoordIterator {
    origin: Vec<isize>,
    strides: Vec<usize>,
    steps: CoordIterator,
    current: Vec<isize>,
}

impl StridingCoordIterator {
    pub fn new(corner1: &[isize], corner2: &[isize], strides: &[usize]) -> Result<Self> {
        if corner1.len() != corner2.len() || corner1.len() != strides.len() {
            return Err(CnnError::InvalidConfig(format!(
                "striding box needs equal ranks, got corners {} / {} and strides {}",
                corner1.len(),
                corner2.len(),
                strides.len()
            )));
        }
        if strides.contains(&0) {
            return Err(CnnError::InvalidConfig(format!(
                "strides must be positive, got {:?}",
                strides
            )));
        }

        let origin: Vec<isize> = corner1
            .iter()
            .zip(corner2)
            .map(|(&a, &b)| a.min(b))
            .collect();
        let last_step: Vec<isize> = corner1
            .iter()
            .zip(corner2)
            .zip(strides)
            .map(|((&a, &b), &s)| (a - b).abs() / s as isize)
            .collect();
        let steps = CoordIterator::new(&vec![0; origin.len()], &last_step)?;

        Ok(Self {
            current: origin.clone(),
            origin,
            strides: strides.to_vec(),
            steps,
        })
    }

    pub fn has_next(&self) -> bool {
        self.steps.has_next()
    }

    pub fn position(&self) -> usize {
        self.steps.position()
    }

    pub fn current(&self) -> &[isize] {
        &self.current
    }

    /// Number of placements along each axis.
    pub fn extents(&self) -> Vec<usize> {
        self.steps.extents()
    }

    pub fn next_coords(&mut self) -> Result<&[isize]> {
        let step = self.steps.next_coords()?;
        for (axis, value) in self.current.iter_mut().enumerate() {
            *value = self.origin[axis] + step[axis] * self.strides[axis] as isize;
        }
        Ok(&self.current)
    }
}

impl Iterator for StridingCoordIterator {
    type Item = Vec<isize>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_coords().ok().map(<[isize]>::to_vec)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.steps.size_hint()
    }
}

impl ExactSizeIterator for StridingCoordIterator {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_iterator_visits_unit_square_in_order() {
        let coords: Vec<Vec<isize>> = CoordIterator::new(&[0, 0], &[1, 1]).unwrap().collect();
        assert_eq!(
            coords,
            vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]
        );
    }

    #[test]
    fn test_coord_iterator_normalizes_corners() {
        let forward: Vec<Vec<isize>> = CoordIterator::new(&[0, 2], &[2, 0]).unwrap().collect();
        let backward: Vec<Vec<isize>> = CoordIterator::new(&[2, 0], &[0, 2]).unwrap().collect();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 9);
    }

    #[test]
    fn test_coord_iterator_negative_corner() {
        let coords: Vec<Vec<isize>> = CoordIterator::new(&[-1], &[1]).unwrap().collect();
        assert_eq!(coords, vec![vec![-1], vec![0], vec![1]]);
    }

    #[test]
    fn test_coord_iterator_exhaustion_is_an_error() {
        let mut iter = CoordIterator::new(&[0], &[0]).unwrap();
        assert!(iter.has_next());
        assert_eq!(iter.next_coords().unwrap(), &[0]);
        assert!(!iter.has_next());
        assert!(matches!(
            iter.next_coords(),
            Err(CnnError::BoundsViolation(_))
        ));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_coord_iterator_position_tracks_count() {
        let mut iter = CoordIterator::new(&[0, 0, 0], &[1, 2, 3]).unwrap();
        assert_eq!(iter.len(), 24);
        let mut seen = 0;
        while iter.has_next() {
            iter.next_coords().unwrap();
            seen += 1;
            assert_eq!(iter.position(), seen);
        }
        assert_eq!(seen, 24);
    }

    #[test]
    fn test_coord_iterator_rank_mismatch() {
        assert!(CoordIterator::new(&[0, 0], &[1]).is_err());
    }

    #[test]
    fn test_striding_iterator_steps_by_stride() {
        let coords: Vec<Vec<isize>> = StridingCoordIterator::new(&[0, 0], &[2, 2], &[2, 2])
            .unwrap()
            .collect();
        assert_eq!(
            coords,
            vec![vec![0, 0], vec![2, 0], vec![0, 2], vec![2, 2]]
        );
    }

    #[test]
    fn test_striding_iterator_drops_partial_steps() {
        let iter = StridingCoordIterator::new(&[1], &[4], &[2]).unwrap();
        let coords: Vec<Vec<isize>> = iter.collect();
        assert_eq!(coords, vec![vec![1], vec![3]]);
    }

    #[test]
    fn test_striding_iterator_rejects_zero_stride() {
        assert!(matches!(
            StridingCoordIterator::new(&[0], &[3], &[0]),
            Err(CnnError::InvalidConfig(_))
        ));
    }
}
