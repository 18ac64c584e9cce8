//! View flags.

use crate::strides::{classify_contiguity, Contiguity};

/// Flags derived for every view at construction.
///
/// `writeable` is fixed once the view exists; the contiguity bits are
/// recomputed from shape and strides for each new view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayFlags {
    pub aligned: bool,
    pub writeable: bool,
    pub c_contiguous: bool,
    pub f_contiguous: bool,
}

impl ArrayFlags {
    pub fn compute(
        shape: &[usize],
        strides: &[isize],
        elsize: usize,
        alignment: usize,
        address: usize,
        writeable: bool,
    ) -> Self {
        let contiguity = classify_contiguity(shape, strides, elsize);
        let alignment = alignment.max(1) as isize;
        let aligned = address as isize % alignment == 0
            && strides.iter().all(|&s| s % alignment == 0);
        Self {
            aligned,
            writeable,
            c_contiguous: contiguity.is_c(),
            f_contiguous: contiguity.is_f(),
        }
    }

    #[inline]
    pub fn contiguity(&self) -> Contiguity {
        match (self.c_contiguous, self.f_contiguous) {
            (true, true) => Contiguity::Both,
            (true, false) => Contiguity::C,
            (false, true) => Contiguity::F,
            (false, false) => Contiguity::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_flags() {
        let f = ArrayFlags::compute(&[2, 3], &[24, 8], 8, 8, 0x1000, true);
        assert!(f.aligned && f.writeable && f.c_contiguous && !f.f_contiguous);
        assert_eq!(f.contiguity(), Contiguity::C);

        let f = ArrayFlags::compute(&[2, 3], &[24, 8], 8, 8, 0x1004, false);
        assert!(!f.aligned);
        assert!(!f.writeable);
    }

    #[test]
    fn test_misaligned_stride() {
        // float64 components of a packed record
        let f = ArrayFlags::compute(&[4], &[12], 8, 8, 0, true);
        assert!(!f.aligned);
        assert_eq!(f.contiguity(), Contiguity::None);
    }
}
