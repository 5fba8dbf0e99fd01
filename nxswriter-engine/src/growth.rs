//! Shape arithmetic of the growing-field engine.
//!
//! Axis convention: the payload axes map, in order, onto the static axes of
//! the field (every axis except the growth axis). The growth axis receives
//! the single index of the newest slot, so a frame `[rows, cols]` lands at
//! `[last, 0:rows, 0:cols]` for `g=1`, `[0:rows, last, 0:cols]` for `g=2`
//! and `[0:rows, 0:cols, last]` for `g=3`.

use crate::layout::Strategy;
use nxswriter_core::{Dim, Error, Result, Slice};

/// Largest field rank a growing field may have.
pub const MAX_GROWING_RANK: usize = 3;

/// Field-level shape decisions made once, at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    /// Full declared shape, 0 at the growth axis and for unknown extents.
    pub shape: Vec<usize>,
    /// 0-based growth axis, if the field grows.
    pub growth_axis: Option<usize>,
}

impl FieldLayout {
    /// Inserts the growth axis into a per-step shape.
    ///
    /// `grows` is 1-based and clamped to the resulting rank.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] if a growing field would exceed
    /// [`MAX_GROWING_RANK`].
    pub fn new(step_shape: &[usize], growing: bool, grows: Option<usize>) -> Result<Self> {
        if !growing {
            return Ok(Self {
                shape: step_shape.to_vec(),
                growth_axis: None,
            });
        }
        let rank = step_shape.len() + 1;
        if rank > MAX_GROWING_RANK {
            return Err(Error::RankMismatch(format!(
                "a growing field of per-step shape {step_shape:?} would have rank {rank}"
            )));
        }
        let axis = grows.unwrap_or(1).clamp(1, rank) - 1;
        let mut shape = step_shape.to_vec();
        shape.insert(axis, 0);
        Ok(Self {
            shape,
            growth_axis: Some(axis),
        })
    }

    /// Extent the field is created with.
    ///
    /// A can-fail field starts at its full declared shape; any other field
    /// starts minimal (1 per known axis, 0 per unknown) and is extended by
    /// shape reconciliation. An empty shape becomes `[1]` for fields written
    /// once at open or close, `[0]` otherwise.
    #[must_use]
    pub fn creation_shape(&self, canfail: bool, strategy: Strategy) -> Vec<usize> {
        if self.shape.is_empty() {
            return match strategy {
                Strategy::Init | Strategy::Final => vec![1],
                Strategy::Step | Strategy::Postrun => vec![0],
            };
        }
        if canfail {
            self.shape.clone()
        } else {
            self.shape.iter().map(|&s| usize::from(s > 0)).collect()
        }
    }

    /// Chunk lengths: the declared extent, at least 1.
    #[must_use]
    pub fn chunk(&self) -> Vec<usize> {
        if self.shape.is_empty() {
            return vec![1];
        }
        self.shape.iter().map(|&s| s.max(1)).collect()
    }

    /// Axes other than the growth axis, for a field of `rank`.
    #[must_use]
    pub fn static_axes(&self, rank: usize) -> Vec<usize> {
        (0..rank).filter(|&axis| Some(axis) != self.growth_axis).collect()
    }
}

/// Payload shape expressed on `static_rank` axes.
///
/// Equal ranks map directly. Otherwise length-1 axes are dropped and the
/// rest is padded with leading 1s, so a `[1, n]` frame or a single-element
/// spectrum still fits. `None` if the payload has too many real axes.
#[must_use]
pub fn fit_to_rank(payload: &[usize], static_rank: usize) -> Option<Vec<usize>> {
    if payload.len() == static_rank {
        return Some(payload.to_vec());
    }
    let squeezed: Vec<usize> = payload.iter().copied().filter(|&n| n != 1).collect();
    if squeezed.len() > static_rank {
        return None;
    }
    let mut shape = vec![1; static_rank - squeezed.len()];
    shape.extend(squeezed);
    Some(shape)
}

/// Growth needed on each axis so the static extents hold `payload`.
///
/// Returns `(axis, extent)` pairs. A static axis shorter than the payload
/// grows by the deficit; a zero-length static axis grows by 1 even when the
/// payload says nothing about it. The growth axis is never touched.
#[must_use]
pub fn reconcile(current: &[usize], static_axes: &[usize], payload: Option<&[usize]>) -> Vec<(usize, usize)> {
    static_axes
        .iter()
        .enumerate()
        .filter_map(|(j, &axis)| {
            let len = current[axis];
            match payload.and_then(|p| p.get(j)) {
                Some(&want) if want > len => Some((axis, want - len)),
                _ if len == 0 => Some((axis, 1)),
                _ => None,
            }
        })
        .collect()
}

/// Region receiving one step: the newest slot on the growth axis and
/// `0..target[j]` on the static axes.
///
/// # Errors
/// Returns [`Error::RankMismatch`] if `target` does not cover the static
/// axes, and [`Error::InvalidSelection`] if the growth axis is still empty.
pub fn placement(current: &[usize], layout: &FieldLayout, target: &[usize]) -> Result<Slice> {
    let static_axes = layout.static_axes(current.len());
    if static_axes.len() != target.len() {
        return Err(Error::RankMismatch(format!(
            "payload shape {target:?} cannot be placed in a field of shape {current:?}"
        )));
    }
    let mut dims = Vec::with_capacity(current.len());
    let mut payload_axes = target.iter();
    for (axis, &len) in current.iter().enumerate() {
        if Some(axis) == layout.growth_axis {
            let last = len.checked_sub(1).ok_or_else(|| {
                Error::InvalidSelection(format!("growth axis {axis} has no slot yet"))
            })?;
            dims.push(Dim::Index(last));
        } else if let Some(&n) = payload_axes.next() {
            dims.push(Dim::from(0..n));
        }
    }
    Ok(Slice::dims(dims))
}

/// Sentinel extent: the current static extents with empty axes turned into 1.
#[must_use]
pub fn sentinel_shape(current: &[usize], layout: &FieldLayout) -> Vec<usize> {
    layout
        .static_axes(current.len())
        .into_iter()
        .map(|axis| current[axis].max(1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_axis_insertion() {
        let layout = FieldLayout::new(&[], true, None).unwrap();
        assert_eq!(layout.shape, vec![0]);
        assert_eq!(layout.growth_axis, Some(0));

        let layout = FieldLayout::new(&[100, 200], true, Some(2)).unwrap();
        assert_eq!(layout.shape, vec![100, 0, 200]);
        assert_eq!(layout.static_axes(3), vec![0, 2]);

        // clamped to the rank
        let layout = FieldLayout::new(&[2048], true, Some(7)).unwrap();
        assert_eq!(layout.shape, vec![2048, 0]);
        assert_eq!(layout.growth_axis, Some(1));

        assert!(matches!(
            FieldLayout::new(&[2, 3, 4], true, None),
            Err(Error::RankMismatch(_))
        ));
        let layout = FieldLayout::new(&[2, 3, 4], false, Some(1)).unwrap();
        assert_eq!(layout.growth_axis, None);
    }

    #[test]
    fn test_creation_shape_policy() {
        let layout = FieldLayout::new(&[2048], true, None).unwrap();
        assert_eq!(layout.creation_shape(false, Strategy::Step), vec![0, 1]);
        assert_eq!(layout.creation_shape(true, Strategy::Step), vec![0, 2048]);
        assert_eq!(layout.chunk(), vec![1, 2048]);

        let scalar = FieldLayout::new(&[], false, None).unwrap();
        assert_eq!(scalar.creation_shape(false, Strategy::Init), vec![1]);
        assert_eq!(scalar.creation_shape(false, Strategy::Final), vec![1]);
        assert_eq!(scalar.creation_shape(true, Strategy::Step), vec![0]);
        assert_eq!(scalar.chunk(), vec![1]);
    }

    #[test]
    fn test_fit_to_rank() {
        assert_eq!(fit_to_rank(&[3, 4], 2), Some(vec![3, 4]));
        assert_eq!(fit_to_rank(&[1, 2048], 1), Some(vec![2048]));
        assert_eq!(fit_to_rank(&[2048, 1], 1), Some(vec![2048]));
        assert_eq!(fit_to_rank(&[], 2), Some(vec![1, 1]));
        assert_eq!(fit_to_rank(&[5], 2), Some(vec![1, 5]));
        assert_eq!(fit_to_rank(&[1, 1], 0), Some(vec![]));
        assert_eq!(fit_to_rank(&[3, 4], 1), None);
    }

    #[test]
    fn test_reconcile() {
        // growth axis 0 is skipped, the spectrum axis grows by the deficit
        assert_eq!(reconcile(&[1, 1], &[1], Some(&[2048])), vec![(1, 2047)]);
        // zero-length axes bootstrap to 1
        assert_eq!(reconcile(&[1, 0, 0], &[1, 2], Some(&[1, 1])), vec![(1, 1), (2, 1)]);
        assert_eq!(reconcile(&[0], &[0], None), vec![(0, 1)]);
        // never shrinks
        assert!(reconcile(&[3, 10], &[1], Some(&[4])).is_empty());
    }

    #[test]
    fn test_placement_per_growth_axis() {
        let g1 = FieldLayout::new(&[100, 200], true, Some(1)).unwrap();
        let slice = placement(&[2, 100, 200], &g1, &[100, 200]).unwrap();
        assert_eq!(
            slice,
            Slice::dims(vec![Dim::Index(1), Dim::from(0..100), Dim::from(0..200)])
        );

        let g2 = FieldLayout::new(&[100, 200], true, Some(2)).unwrap();
        let slice = placement(&[100, 3, 200], &g2, &[100, 200]).unwrap();
        assert_eq!(
            slice,
            Slice::dims(vec![Dim::from(0..100), Dim::Index(2), Dim::from(0..200)])
        );

        let g3 = FieldLayout::new(&[100, 200], true, Some(3)).unwrap();
        let slice = placement(&[100, 200, 1], &g3, &[100, 200]).unwrap();
        assert_eq!(
            slice,
            Slice::dims(vec![Dim::from(0..100), Dim::from(0..200), Dim::Index(0)])
        );

        assert!(matches!(
            placement(&[2, 100, 200], &g1, &[100]),
            Err(Error::RankMismatch(_))
        ));
        assert!(matches!(
            placement(&[0, 100, 200], &g1, &[100, 200]),
            Err(Error::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_sentinel_shape() {
        let layout = FieldLayout::new(&[0], true, Some(1)).unwrap();
        assert_eq!(sentinel_shape(&[3, 0], &layout), vec![1]);
        assert_eq!(sentinel_shape(&[3, 2048], &layout), vec![2048]);
        let scalar = FieldLayout::new(&[], true, None).unwrap();
        assert!(sentinel_shape(&[5], &scalar).is_empty());
    }
}
