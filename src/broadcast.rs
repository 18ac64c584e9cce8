//! Broadcast shape agreement and broadcast stride computation.

use crate::{Result, StridedError};

/// Compute the broadcast shape of two shapes (right-aligned).
///
/// Returns `ShapeMismatch` if the shapes are incompatible.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let max_rank = a.len().max(b.len());
    let mut result = vec![0usize; max_rank];

    for i in 0..max_rank {
        let a_dim = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let b_dim = if i < b.len() { b[b.len() - 1 - i] } else { 1 };

        result[max_rank - 1 - i] = if a_dim == b_dim || b_dim == 1 {
            a_dim
        } else if a_dim == 1 {
            b_dim
        } else {
            return Err(StridedError::ShapeMismatch(a.to_vec(), b.to_vec()));
        };
    }

    Ok(result)
}

/// Strides and backstrides that walk an array of `orig_shape` as if it had
/// `res_shape`.
///
/// Unit axes of the source get stride 0 so every visit along them reuses
/// the same element; axes missing from the source are inserted with stride
/// 0 on the left (forward) or on the right (`backward`).
pub fn broadcast_strides(
    strides: &[isize],
    backstrides: &[isize],
    orig_shape: &[usize],
    res_shape: &[usize],
    backward: bool,
) -> Result<(Vec<isize>, Vec<isize>)> {
    let mismatch = || StridedError::ShapeMismatch(orig_shape.to_vec(), res_shape.to_vec());
    if orig_shape.len() > res_shape.len() {
        return Err(mismatch());
    }
    let pad = res_shape.len() - orig_shape.len();
    let lead = if backward { 0 } else { pad };

    let mut rstrides = vec![0isize; res_shape.len()];
    let mut rbackstrides = vec![0isize; res_shape.len()];
    for (i, &dim) in orig_shape.iter().enumerate() {
        let target = res_shape[lead + i];
        if dim == 1 {
            continue;
        }
        if dim != target {
            return Err(mismatch());
        }
        rstrides[lead + i] = strides[i];
        rbackstrides[lead + i] = backstrides[i];
    }
    Ok((rstrides, rbackstrides))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_shape() {
        assert_eq!(broadcast_shape(&[3], &[4, 3]).unwrap(), vec![4, 3]);
        assert_eq!(broadcast_shape(&[4, 1], &[1, 3]).unwrap(), vec![4, 3]);
        assert_eq!(broadcast_shape(&[], &[2, 2]).unwrap(), vec![2, 2]);
        assert!(matches!(
            broadcast_shape(&[2], &[3]),
            Err(StridedError::ShapeMismatch(_, _))
        ));
    }

    #[test]
    fn test_broadcast_strides_forward() {
        let (s, b) = broadcast_strides(&[8], &[16], &[3], &[4, 3], false).unwrap();
        assert_eq!(s, vec![0, 8]);
        assert_eq!(b, vec![0, 16]);
    }

    #[test]
    fn test_broadcast_strides_unit_axis() {
        let (s, b) = broadcast_strides(&[8, 8], &[24, 0], &[4, 1], &[4, 3], false).unwrap();
        assert_eq!(s, vec![8, 0]);
        assert_eq!(b, vec![24, 0]);
    }

    #[test]
    fn test_broadcast_strides_backward() {
        let (s, _) = broadcast_strides(&[8], &[24], &[4], &[4, 3], true).unwrap();
        assert_eq!(s, vec![8, 0]);
        assert!(broadcast_strides(&[8], &[24], &[4], &[4, 3], false).is_err());
    }

    #[test]
    fn test_broadcast_strides_rank_too_large() {
        assert!(broadcast_strides(&[8, 8], &[8, 8], &[2, 2], &[2], false).is_err());
    }
}
