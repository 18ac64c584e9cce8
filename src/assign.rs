//! Bulk element assignment: fill, copy, setslice and dtype conversion.

use strided_dtype::{DTypeRef, Value};

use crate::broadcast::broadcast_shape;
use crate::strides::{checked_start, default_strides, validate_bounds};
use crate::view::{ArrayView, ViewKind};
use crate::{Result, StridedError};

#[inline]
fn same_encoding(a: &DTypeRef, b: &DTypeRef) -> bool {
    a.kind() == b.kind() && a.elsize() == b.elsize() && a.name() == b.name()
}

/// Copy `shape` elements from `src` (broadcast as needed) into `dst`.
///
/// Both sides are walked in `dst`'s order. The two views must not share a
/// storage.
fn copy_elements(dst: &ArrayView, src: &ArrayView, shape: &[usize]) -> Result<()> {
    debug_assert!(!dst.shares_storage(src));
    let (dst_it, mut d) = dst.create_iter(Some(shape), false)?;
    let (src_it, mut s) = src.create_iter(Some(shape), false)?;
    let src_it = src_it.with_order(dst.order());

    let (dst_dtype, src_dtype) = (dst.dtype(), src.dtype());
    let (d_el, s_el) = (dst_dtype.elsize(), src_dtype.elsize());
    let raw = same_encoding(&dst_dtype, &src_dtype) && !dst_dtype.is_reference();

    let src_bytes = src.storage().borrow()?;
    let mut dst_bytes = dst.storage().borrow_mut()?;
    while !dst_it.done(&d) {
        let (so, doff) = (s.offset, d.offset);
        if raw {
            dst_bytes[doff..doff + d_el].copy_from_slice(&src_bytes[so..so + s_el]);
        } else {
            let value = src_dtype.read(&src_bytes[so..so + s_el]);
            dst_dtype.store(&mut dst_bytes[doff..doff + d_el], &value)?;
        }
        dst_it.next(&mut d);
        src_it.next(&mut s);
    }
    Ok(())
}

impl ArrayView {
    /// Store `value` into every element.
    pub fn fill(&self, value: &Value) -> Result<()> {
        if !self.is_writeable() {
            return Err(StridedError::ReadOnlyViolation);
        }
        let dtype = self.dtype();
        let elsize = dtype.elsize();
        let dense = !matches!(self.kind(), ViewKind::Slice { .. })
            && (self.flags().c_contiguous || self.flags().f_contiguous);
        let mut bytes = self.storage().borrow_mut()?;
        if dense {
            dtype.fill(&mut bytes, value, self.start(), self.size(), elsize)?;
            return Ok(());
        }
        let (it, _) = self.create_iter(None, false)?;
        for offset in it.offsets() {
            dtype.store(&mut bytes[offset..offset + elsize], value)?;
        }
        Ok(())
    }

    /// A fresh owning array with the same shape, dtype and order, laid out
    /// with default strides.
    pub fn copy(&self) -> Result<ArrayView> {
        let out = ArrayView::allocate(self.shape(), self.dtype(), self.order(), false)?;
        copy_elements(&out, self, self.shape())?;
        Ok(out)
    }

    /// Assign `src` to every element of this view, broadcasting `src` to this
    /// view's shape.
    ///
    /// A source sharing storage with this view is copied first, so
    /// overlapping assignments see the source as it was before the write.
    pub fn setslice(&self, src: &ArrayView) -> Result<()> {
        if !self.is_writeable() {
            return Err(StridedError::ReadOnlyViolation);
        }
        if src.ndim() > 0 && self.ndim() == 0 {
            return Err(StridedError::ShapeMismatch(src.shape().to_vec(), vec![]));
        }
        let shape = broadcast_shape(self.shape(), src.shape())?;
        if shape != self.shape() {
            return Err(StridedError::ShapeMismatch(
                src.shape().to_vec(),
                self.shape().to_vec(),
            ));
        }
        if self.shares_storage(src) {
            log::debug!("setslice source aliases destination, copying {:?}", src.shape());
            let tmp = src.copy()?;
            return copy_elements(self, &tmp, &shape);
        }
        copy_elements(self, src, &shape)
    }

    /// Convert to a new owning array of `dtype`.
    ///
    /// The result keeps the relative stride pattern of this view when that
    /// pattern describes a dense block, and falls back to default strides
    /// otherwise.
    pub fn astype(&self, dtype: DTypeRef) -> Result<ArrayView> {
        let t_elsize = dtype.elsize() as isize;
        let pattern = self
            .strides()
            .iter()
            .filter(|&&s| s != 0)
            .map(|s| s.abs())
            .min()
            .filter(|_| !self.strides().contains(&0))
            .and_then(|mins| {
                self.strides()
                    .iter()
                    .map(|&s| s.checked_mul(t_elsize).map(|v| v / mins))
                    .collect::<Option<Vec<isize>>>()
            })
            .filter(|t_strides| {
                let nbytes = self.size() * dtype.elsize();
                checked_start(self.shape(), t_strides)
                    .and_then(|start| {
                        validate_bounds(nbytes, self.shape(), t_strides, start, dtype.elsize())
                    })
                    .is_ok()
            });

        let out = match pattern {
            Some(t_strides) => ArrayView::with_strides(self.shape(), dtype, self.order(), &t_strides)?,
            None => {
                let (strides, _) = default_strides(self.shape(), dtype.elsize(), self.order());
                ArrayView::with_strides(self.shape(), dtype, self.order(), &strides)?
            }
        };
        copy_elements(&out, self, self.shape())?;
        Ok(out)
    }
}
