//! Stride arithmetic: default layouts, reshape factoring, contiguity.
//!
//! All strides here are in **bytes** and may be negative (reversed axis) or
//! zero (broadcast axis). Backstrides are `stride * (extent - 1)`, the span an
//! iterator subtracts when an axis wraps around.

use crate::{Result, StridedError};

/// Memory order of the default layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Row-major: last axis varies fastest.
    #[default]
    C,
    /// Column-major: first axis varies fastest.
    F,
}

/// Contiguity classification of a shape/stride pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contiguity {
    None,
    C,
    F,
    Both,
}

impl Contiguity {
    #[inline]
    pub fn is_c(self) -> bool {
        matches!(self, Contiguity::C | Contiguity::Both)
    }

    #[inline]
    pub fn is_f(self) -> bool {
        matches!(self, Contiguity::F | Contiguity::Both)
    }

    #[inline]
    pub fn is_contiguous(self) -> bool {
        self != Contiguity::None
    }
}

/// Default strides and backstrides for `shape` laid out in `order`.
///
/// The fastest axis gets `elsize`; every other axis gets the previous stride
/// times the previous extent. Zero-extent axes get `elsize` and contribute a
/// factor of one, which keeps the rest of the arithmetic well-defined.
pub fn default_strides(shape: &[usize], elsize: usize, order: Order) -> (Vec<isize>, Vec<isize>) {
    let rank = shape.len();
    let mut strides = vec![0isize; rank];
    let mut step = elsize as isize;
    let mut visit = |i: usize| {
        if shape[i] == 0 {
            strides[i] = elsize as isize;
        } else {
            strides[i] = step;
            step *= shape[i] as isize;
        }
    };
    match order {
        Order::C => (0..rank).rev().for_each(&mut visit),
        Order::F => (0..rank).for_each(&mut visit),
    }
    let backstrides = calc_backstrides(&strides, shape);
    (strides, backstrides)
}

/// `stride * (extent - 1)` for every axis.
pub fn calc_backstrides(strides: &[isize], shape: &[usize]) -> Vec<isize> {
    strides
        .iter()
        .zip(shape)
        .map(|(&s, &d)| s * (d as isize - 1))
        .collect()
}

/// Smallest start offset that keeps every element at a non-negative byte
/// offset when some strides are negative.
pub fn calc_start(shape: &[usize], strides: &[isize]) -> usize {
    shape
        .iter()
        .zip(strides)
        .filter(|(&d, &s)| s < 0 && d > 0)
        .map(|(&d, &s)| (-s) as usize * (d - 1))
        .sum()
}

/// [`calc_start`] that reports overflow instead of wrapping.
pub(crate) fn checked_start(shape: &[usize], strides: &[isize]) -> Result<usize> {
    shape
        .iter()
        .zip(strides)
        .filter(|(&d, &s)| s < 0 && d > 0)
        .try_fold(0usize, |acc, (&d, &s)| {
            s.unsigned_abs()
                .checked_mul(d - 1)
                .and_then(|span| acc.checked_add(span))
        })
        .ok_or(StridedError::OffsetOverflow)
}

/// [`calc_backstrides`] that reports overflow instead of wrapping.
pub(crate) fn checked_backstrides(strides: &[isize], shape: &[usize]) -> Result<Vec<isize>> {
    if strides.len() != shape.len() {
        return Err(StridedError::StrideLengthMismatch);
    }
    strides
        .iter()
        .zip(shape)
        .map(|(&s, &d)| {
            let d = isize::try_from(d).map_err(|_| StridedError::OffsetOverflow)?;
            s.checked_mul(d - 1).ok_or(StridedError::OffsetOverflow)
        })
        .collect()
}

/// Largest byte stride a default layout of `shape` can need: `elsize` times
/// every non-zero extent. Must fit in `isize` before [`default_strides`] is
/// called on `shape`.
pub(crate) fn checked_span(shape: &[usize], elsize: usize) -> Result<usize> {
    shape
        .iter()
        .filter(|&&d| d > 0)
        .try_fold(elsize, |acc, &d| acc.checked_mul(d))
        .filter(|&span| isize::try_from(span).is_ok())
        .ok_or(StridedError::OutOfMemory { bytes: usize::MAX })
}

fn is_contiguous_in(shape: &[usize], strides: &[isize], elsize: usize, order: Order) -> bool {
    if shape.contains(&0) {
        return true;
    }
    let mut expected = elsize as isize;
    let mut check = |i: usize| -> bool {
        // Unit axes are never stepped over, so their stride is irrelevant.
        if shape[i] == 1 {
            return true;
        }
        if strides[i] != expected {
            return false;
        }
        expected *= shape[i] as isize;
        true
    };
    match order {
        Order::C => (0..shape.len()).rev().all(&mut check),
        Order::F => (0..shape.len()).all(&mut check),
    }
}

#[inline]
pub fn is_c_contiguous(shape: &[usize], strides: &[isize], elsize: usize) -> bool {
    is_contiguous_in(shape, strides, elsize, Order::C)
}

#[inline]
pub fn is_f_contiguous(shape: &[usize], strides: &[isize], elsize: usize) -> bool {
    is_contiguous_in(shape, strides, elsize, Order::F)
}

/// Classify `shape`/`strides` as C-, F-, both- or non-contiguous.
///
/// Rank-0 shapes, shapes containing a zero extent, and shapes with at most
/// one non-unit extent laid out densely are contiguous in both orders.
pub fn classify_contiguity(shape: &[usize], strides: &[isize], elsize: usize) -> Contiguity {
    match (
        is_c_contiguous(shape, strides, elsize),
        is_f_contiguous(shape, strides, elsize),
    ) {
        (true, true) => Contiguity::Both,
        (true, false) => Contiguity::C,
        (false, true) => Contiguity::F,
        (false, false) => Contiguity::None,
    }
}

/// Express `new_shape` over the same memory as `old_shape`/`old_strides`
/// without copying.
///
/// Both shapes are scanned in `order`; each group of old axes merged or
/// split into a group of new axes must itself be contiguous. Returns `None`
/// when no such factoring exists, when the element counts differ, or when
/// the array is empty (callers lay out empty arrays with [`default_strides`]).
pub fn derive_strides_for_reshape(
    new_shape: &[usize],
    old_shape: &[usize],
    old_strides: &[isize],
    order: Order,
) -> Option<Vec<isize>> {
    let old_size: usize = old_shape.iter().product();
    let new_size: usize = new_shape.iter().product();
    if old_size != new_size || old_size == 0 || old_shape.len() != old_strides.len() {
        return None;
    }

    // Unit axes carry no layout information.
    let (old_dims, old_st): (Vec<usize>, Vec<isize>) = old_shape
        .iter()
        .zip(old_strides)
        .filter(|(&d, _)| d != 1)
        .map(|(&d, &s)| (d, s))
        .unzip();

    // Work in "fastest axis first" order so one loop serves both layouts.
    let (old_dims, old_st, new_dims): (Vec<usize>, Vec<isize>, Vec<usize>) = match order {
        Order::F => (old_dims, old_st, new_shape.to_vec()),
        Order::C => (
            old_dims.into_iter().rev().collect(),
            old_st.into_iter().rev().collect(),
            new_shape.iter().rev().copied().collect(),
        ),
    };

    let old_nd = old_dims.len();
    let new_nd = new_dims.len();
    let mut new_st = vec![0isize; new_nd];

    let (mut oi, mut oj, mut ni, mut nj) = (0usize, 1usize, 0usize, 1usize);
    while ni < new_nd && oi < old_nd {
        let mut np = new_dims[ni];
        let mut op = old_dims[oi];
        while np != op {
            if np < op {
                np *= *new_dims.get(nj)?;
                nj += 1;
            } else {
                op *= *old_dims.get(oj)?;
                oj += 1;
            }
        }
        for ok in oi..oj - 1 {
            if old_st[ok + 1] != old_dims[ok] as isize * old_st[ok] {
                return None;
            }
        }
        new_st[ni] = old_st[oi];
        for nk in ni + 1..nj {
            new_st[nk] = new_st[nk - 1] * new_dims[nk - 1] as isize;
        }
        ni = nj;
        nj += 1;
        oi = oj;
        oj += 1;
    }

    // Whatever is left of the new shape is unit axes.
    let tail = if ni > 0 {
        new_st[ni - 1] * new_dims[ni - 1] as isize
    } else {
        old_st.first().copied().unwrap_or(1)
    };
    for st in new_st.iter_mut().skip(ni) {
        *st = tail;
    }

    if order == Order::C {
        new_st.reverse();
    }
    Some(new_st)
}

/// Check that every element addressed by `shape`/`strides` starting at
/// `start` lies within `[0, len)` bytes, each element being `elsize` wide.
pub(crate) fn validate_bounds(
    len: usize,
    shape: &[usize],
    strides: &[isize],
    start: usize,
    elsize: usize,
) -> Result<()> {
    if shape.len() != strides.len() {
        return Err(StridedError::StrideLengthMismatch);
    }
    if shape.contains(&0) {
        return Ok(());
    }
    let start = isize::try_from(start).map_err(|_| StridedError::OffsetOverflow)?;
    let mut min_offset = start;
    let mut max_offset = start;
    for (&dim, &stride) in shape.iter().zip(strides) {
        if dim > 1 {
            let end = stride
                .checked_mul(dim as isize - 1)
                .ok_or(StridedError::OffsetOverflow)?;
            if end >= 0 {
                max_offset = max_offset
                    .checked_add(end)
                    .ok_or(StridedError::OffsetOverflow)?;
            } else {
                min_offset = min_offset
                    .checked_add(end)
                    .ok_or(StridedError::OffsetOverflow)?;
            }
        }
    }
    if min_offset < 0 || max_offset as usize + elsize > len {
        return Err(StridedError::OffsetOverflow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_default_strides_c() {
        let (s, b) = default_strides(&[2, 3, 4], 8, Order::C);
        assert_eq!(s, vec![96, 32, 8]);
        assert_eq!(b, vec![96, 64, 24]);
    }

    #[test]
    fn test_default_strides_f() {
        let (s, b) = default_strides(&[2, 3, 4], 8, Order::F);
        assert_eq!(s, vec![8, 16, 48]);
        assert_eq!(b, vec![8, 32, 144]);
    }

    #[test]
    fn test_default_strides_zero_extent() {
        let (s, _) = default_strides(&[3, 0, 2], 4, Order::C);
        assert_eq!(s, vec![8, 4, 4]);
        let (s, _) = default_strides(&[3, 0, 2], 4, Order::F);
        assert_eq!(s, vec![4, 4, 12]);
    }

    #[test]
    fn test_default_strides_scalar() {
        let (s, b) = default_strides(&[], 8, Order::C);
        assert!(s.is_empty());
        assert!(b.is_empty());
        assert_eq!(classify_contiguity(&[], &[], 8), Contiguity::Both);
    }

    #[test]
    fn test_default_strides_are_contiguous_in_their_order() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let rank = rng.gen_range(0..5);
            let shape: Vec<usize> = (0..rank).map(|_| rng.gen_range(0..5)).collect();
            let elsize = [1usize, 2, 4, 8, 16][rng.gen_range(0..5)];
            let (c, _) = default_strides(&shape, elsize, Order::C);
            let (f, _) = default_strides(&shape, elsize, Order::F);
            assert!(classify_contiguity(&shape, &c, elsize).is_c(), "{shape:?}");
            assert!(classify_contiguity(&shape, &f, elsize).is_f(), "{shape:?}");
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_contiguity(&[2, 3], &[24, 8], 8), Contiguity::C);
        assert_eq!(classify_contiguity(&[2, 3], &[8, 16], 8), Contiguity::F);
        assert_eq!(classify_contiguity(&[5], &[8], 8), Contiguity::Both);
        assert_eq!(classify_contiguity(&[1, 5, 1], &[40, 8, 8], 8), Contiguity::Both);
        assert_eq!(classify_contiguity(&[2, 3], &[48, 16], 8), Contiguity::None);
        assert_eq!(classify_contiguity(&[3], &[-8], 8), Contiguity::None);
        assert_eq!(classify_contiguity(&[2, 0], &[7, 3], 8), Contiguity::Both);
    }

    #[test]
    fn test_calc_start_negative_strides() {
        assert_eq!(calc_start(&[3, 4], &[32, -8]), 24);
        assert_eq!(calc_start(&[3, 4], &[-32, -8]), 88);
        assert_eq!(calc_start(&[3, 4], &[32, 8]), 0);
    }

    #[test]
    fn test_reshape_merge_c() {
        let (s, _) = default_strides(&[2, 3, 4], 8, Order::C);
        let got = derive_strides_for_reshape(&[6, 4], &[2, 3, 4], &s, Order::C);
        assert_eq!(got, Some(vec![32, 8]));
    }

    #[test]
    fn test_reshape_split_c() {
        let got = derive_strides_for_reshape(&[2, 3, 4], &[24], &[8], Order::C);
        assert_eq!(got, Some(vec![96, 32, 8]));
    }

    #[test]
    fn test_reshape_f_order() {
        let (s, _) = default_strides(&[2, 3, 4], 8, Order::F);
        let got = derive_strides_for_reshape(&[6, 4], &[2, 3, 4], &s, Order::F);
        assert_eq!(got, Some(vec![8, 48]));
    }

    #[test]
    fn test_reshape_strided_1d() {
        // every other element of a 12-vector
        let got = derive_strides_for_reshape(&[2, 3], &[6], &[16], Order::C);
        assert_eq!(got, Some(vec![48, 16]));
    }

    #[test]
    fn test_reshape_transposed_is_incompatible() {
        // [2,3,4] C-order transposed -> shape [4,3,2], strides [8,32,96]
        let got = derive_strides_for_reshape(&[6, 4], &[4, 3, 2], &[8, 32, 96], Order::C);
        assert_eq!(got, None);
    }

    #[test]
    fn test_reshape_with_unit_axes() {
        let got = derive_strides_for_reshape(&[1, 6, 1], &[2, 1, 3], &[24, 24, 8], Order::C);
        assert_eq!(got, Some(vec![48, 8, 8]));
    }

    #[test]
    fn test_reshape_size_mismatch() {
        assert_eq!(derive_strides_for_reshape(&[5], &[2, 3], &[24, 8], Order::C), None);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(validate_bounds(48, &[2, 3], &[24, 8], 0, 8).is_ok());
        assert!(validate_bounds(40, &[2, 3], &[24, 8], 0, 8).is_err());
        assert!(validate_bounds(48, &[3], &[-8], 16, 8).is_ok());
        assert!(validate_bounds(48, &[3], &[-8], 8, 8).is_err());
        assert!(validate_bounds(0, &[0, 3], &[24, 8], 0, 8).is_ok());
    }
}
