//! Portable slice specifications and their hyperslab translation.
//!
//! A [`Slice`] is what callers hand to indexed reads and writes. Backends
//! consume the translated [`Hyperslab`]: offset/block/count/stride per
//! dimension, where `stride` is the gap left after each block.

use crate::{Error, Result};
use std::ops::Range;

/// Selection along one dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dim {
    /// Single index.
    Index(usize),
    /// Half-open range with an optional step.
    Range {
        start: usize,
        stop: usize,
        step: Option<usize>,
    },
    /// Every element of the dimension.
    Full,
}

impl Dim {
    #[must_use]
    pub fn stepped(start: usize, stop: usize, step: usize) -> Self {
        Dim::Range {
            start,
            stop,
            step: Some(step),
        }
    }
}

impl From<usize> for Dim {
    fn from(index: usize) -> Self {
        Dim::Index(index)
    }
}

impl From<Range<usize>> for Dim {
    fn from(range: Range<usize>) -> Self {
        Dim::Range {
            start: range.start,
            stop: range.end,
            step: None,
        }
    }
}

/// Slice specification for an indexed read or write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slice {
    /// Whole selection.
    All,
    /// Selection on the first dimension; remaining dimensions are taken whole.
    Single(Dim),
    /// One entry per leading dimension; remaining dimensions are taken whole.
    PerDim(Vec<Dim>),
}

impl Slice {
    #[must_use]
    pub fn index(index: usize) -> Self {
        Slice::Single(Dim::Index(index))
    }

    #[must_use]
    pub fn range(range: Range<usize>) -> Self {
        Slice::Single(range.into())
    }

    #[must_use]
    pub fn stepped(start: usize, stop: usize, step: usize) -> Self {
        Slice::Single(Dim::stepped(start, stop, step))
    }

    #[must_use]
    pub fn dims(dims: Vec<Dim>) -> Self {
        Slice::PerDim(dims)
    }
}

/// Rectangular, possibly strided region of an n-dimensional extent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hyperslab {
    pub offset: Vec<usize>,
    pub block: Vec<usize>,
    pub count: Vec<usize>,
    /// Gap after each block, not the absolute step.
    pub stride: Vec<usize>,
}

impl Hyperslab {
    /// Translates a slice against an extent; `Slice::All` yields `None`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSelection`] for a zero step, a reversed range,
    /// or more entries than the extent has dimensions.
    pub fn from_slice(slice: &Slice, shape: &[usize]) -> Result<Option<Self>> {
        let dims: &[Dim] = match slice {
            Slice::All => return Ok(None),
            Slice::Single(dim) => std::slice::from_ref(dim),
            Slice::PerDim(dims) => dims,
        };
        if dims.len() > shape.len() {
            return Err(Error::InvalidSelection(format!(
                "{} dimensions selected on an extent of rank {}",
                dims.len(),
                shape.len()
            )));
        }

        let mut slab = Hyperslab {
            offset: Vec::with_capacity(shape.len()),
            block: Vec::with_capacity(shape.len()),
            count: Vec::with_capacity(shape.len()),
            stride: Vec::with_capacity(shape.len()),
        };
        for (axis, &len) in shape.iter().enumerate() {
            let dim = dims.get(axis).unwrap_or(&Dim::Full);
            let (offset, block, count, stride) = match *dim {
                Dim::Index(index) => (index, 1, 1, 0),
                Dim::Full => (0, len, 1, 0),
                Dim::Range { start, stop, step } => {
                    if stop < start {
                        return Err(Error::InvalidSelection(format!(
                            "reversed range {start}:{stop}"
                        )));
                    }
                    match step {
                        None | Some(1) => (start, stop - start, 1, 0),
                        Some(0) => {
                            return Err(Error::InvalidSelection("zero step".to_string()));
                        }
                        Some(step) => (start, 1, (stop - start).div_ceil(step), step - 1),
                    }
                }
            };
            slab.offset.push(offset);
            slab.block.push(block);
            slab.count.push(count);
            slab.stride.push(stride);
        }
        Ok(Some(slab))
    }

    /// Hyperslab covering a whole extent.
    #[must_use]
    pub fn whole(shape: &[usize]) -> Self {
        Hyperslab {
            offset: vec![0; shape.len()],
            block: shape.to_vec(),
            count: vec![1; shape.len()],
            stride: vec![0; shape.len()],
        }
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.offset.len()
    }

    /// Shape of the selected region.
    #[must_use]
    pub fn selected_shape(&self) -> Vec<usize> {
        self.count
            .iter()
            .zip(&self.block)
            .map(|(count, block)| count * block)
            .collect()
    }

    /// Number of selected elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selected_shape().iter().product()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selected indices along `dim`, in increasing order.
    #[must_use]
    pub fn positions(&self, dim: usize) -> Vec<usize> {
        let step = self.block[dim] + self.stride[dim];
        (0..self.count[dim])
            .flat_map(|c| {
                let start = self.offset[dim] + c * step;
                start..start + self.block[dim]
            })
            .collect()
    }

    /// Selected indices for every dimension.
    #[must_use]
    pub fn all_positions(&self) -> Vec<Vec<usize>> {
        (0..self.rank()).map(|dim| self.positions(dim)).collect()
    }

    /// Checks that the region lies inside `shape`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSelection`] when any selected index is out of range.
    pub fn check_bounds(&self, shape: &[usize]) -> Result<()> {
        if shape.len() != self.rank() {
            return Err(Error::InvalidSelection(format!(
                "selection of rank {} on an extent of rank {}",
                self.rank(),
                shape.len()
            )));
        }
        for (dim, &len) in shape.iter().enumerate() {
            if self.count[dim] == 0 || self.block[dim] == 0 {
                continue;
            }
            let last = self.offset[dim]
                + (self.count[dim] - 1) * (self.block[dim] + self.stride[dim])
                + self.block[dim];
            if last > len {
                return Err(Error::InvalidSelection(format!(
                    "selection reaches index {} on dimension {dim} of length {len}",
                    last - 1
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepped_range() {
        let slab = Hyperslab::from_slice(&Slice::stepped(2, 10, 2), &[10])
            .unwrap()
            .unwrap();
        assert_eq!(slab.offset, vec![2]);
        assert_eq!(slab.block, vec![1]);
        assert_eq!(slab.count, vec![4]);
        assert_eq!(slab.stride, vec![1]);
        assert_eq!(slab.positions(0), vec![2, 4, 6, 8]);
    }

    #[test]
    fn test_uneven_step_rounds_up() {
        let slab = Hyperslab::from_slice(&Slice::stepped(1, 8, 3), &[8])
            .unwrap()
            .unwrap();
        assert_eq!(slab.count, vec![3]);
        assert_eq!(slab.stride, vec![2]);
        assert_eq!(slab.positions(0), vec![1, 4, 7]);
    }

    #[test]
    fn test_unit_range_and_index() {
        let slab = Hyperslab::from_slice(&Slice::range(3..7), &[10])
            .unwrap()
            .unwrap();
        assert_eq!((slab.offset[0], slab.block[0], slab.count[0], slab.stride[0]), (3, 4, 1, 0));

        let slab = Hyperslab::from_slice(&Slice::index(5), &[10]).unwrap().unwrap();
        assert_eq!((slab.offset[0], slab.block[0], slab.count[0], slab.stride[0]), (5, 1, 1, 0));
    }

    #[test]
    fn test_per_dimension_list() {
        let slice = Slice::dims(vec![Dim::Index(4), (0..3).into(), Dim::stepped(0, 6, 2)]);
        let slab = Hyperslab::from_slice(&slice, &[5, 3, 6]).unwrap().unwrap();
        assert_eq!(slab.offset, vec![4, 0, 0]);
        assert_eq!(slab.block, vec![1, 3, 1]);
        assert_eq!(slab.count, vec![1, 1, 3]);
        assert_eq!(slab.stride, vec![0, 0, 1]);
        assert_eq!(slab.selected_shape(), vec![1, 3, 3]);
    }

    #[test]
    fn test_trailing_dimensions_are_full() {
        let slab = Hyperslab::from_slice(&Slice::index(1), &[3, 2048]).unwrap().unwrap();
        assert_eq!(slab.selected_shape(), vec![1, 2048]);
        assert!(slab.check_bounds(&[3, 2048]).is_ok());
        assert!(slab.check_bounds(&[1, 2048]).is_err());
    }

    #[test]
    fn test_ellipsis_and_errors() {
        assert_eq!(Hyperslab::from_slice(&Slice::All, &[4]).unwrap(), None);
        assert!(Hyperslab::from_slice(&Slice::stepped(0, 4, 0), &[4]).is_err());
        assert!(Hyperslab::from_slice(&Slice::range(5..2), &[8]).is_err());
        let too_many = Slice::dims(vec![Dim::Index(0), Dim::Index(0)]);
        assert!(Hyperslab::from_slice(&too_many, &[4]).is_err());
    }
}
