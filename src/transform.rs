//! View-producing transformations: axis permutations, reshape, component
//! projection of complex elements and dtype reinterpretation.
//!
//! Every operation here returns a dependent view sharing the input's storage,
//! except where noted ([`ArrayView::reshape_or_copy`] on an incompatible
//! layout, [`ArrayView::get_imag`] on a non-complex dtype).

use strided_dtype::DTypeRef;

use crate::broadcast::broadcast_strides;
use crate::strides::{
    calc_backstrides, checked_backstrides, checked_span, default_strides,
    derive_strides_for_reshape, is_c_contiguous, is_f_contiguous, Order,
};
use crate::trace::GLOBAL_TRACER;
use crate::view::{check_reinterpret, ArrayView, ViewKind};
use crate::{Result, StridedError};

fn check_axis(axis: usize, rank: usize) -> Result<()> {
    if axis >= rank {
        return Err(StridedError::InvalidAxis { axis, rank });
    }
    Ok(())
}

impl ArrayView {
    // ========================================================================
    // Axis permutations
    // ========================================================================

    /// Reverse the order of all axes.
    pub fn transpose(&self) -> Result<ArrayView> {
        let perm: Vec<usize> = (0..self.ndim()).rev().collect();
        self.permute(&perm)
    }

    /// Reorder axes so that output axis `i` is input axis `axes[i]`.
    pub fn permute(&self, axes: &[usize]) -> Result<ArrayView> {
        let rank = self.ndim();
        if axes.len() != rank {
            return Err(StridedError::RankMismatch(axes.len(), rank));
        }
        let mut seen = vec![false; rank];
        for &axis in axes {
            check_axis(axis, rank)?;
            if std::mem::replace(&mut seen[axis], true) {
                return Err(StridedError::InvalidAxis { axis, rank });
            }
        }
        let shape = axes.iter().map(|&a| self.shape()[a]).collect();
        let strides = axes.iter().map(|&a| self.strides()[a]).collect();
        let backstrides = axes.iter().map(|&a| self.backstrides()[a]).collect();
        self.new_slice(self.start(), shape, strides, backstrides, None, true)
    }

    /// Exchange two axes.
    pub fn swap_axes(&self, axis1: usize, axis2: usize) -> Result<ArrayView> {
        let rank = self.ndim();
        check_axis(axis1, rank)?;
        check_axis(axis2, rank)?;
        let mut shape = self.shape().to_vec();
        let mut strides = self.strides().to_vec();
        let mut backstrides = self.backstrides().to_vec();
        shape.swap(axis1, axis2);
        strides.swap(axis1, axis2);
        backstrides.swap(axis1, axis2);
        self.new_slice(self.start(), shape, strides, backstrides, None, true)
    }

    // ========================================================================
    // Reshape
    // ========================================================================

    /// Reshape without copying.
    ///
    /// Fails with `IncompatibleReshape` when the current layout cannot be
    /// regrouped into `new_shape`; see [`reshape_or_copy`](Self::reshape_or_copy).
    pub fn reshape(&self, new_shape: &[usize]) -> Result<ArrayView> {
        let new_size: usize = new_shape.iter().product();
        if new_size != self.size() {
            return Err(StridedError::ShapeMismatch(
                self.shape().to_vec(),
                new_shape.to_vec(),
            ));
        }
        let elsize = self.elsize();
        let strides = if new_size == 0 {
            checked_span(new_shape, elsize)?;
            default_strides(new_shape, elsize, self.order()).0
        } else if self.ndim() == 0 {
            vec![elsize as isize; new_shape.len()]
        } else {
            derive_strides_for_reshape(new_shape, self.shape(), self.strides(), self.order())
                .ok_or_else(|| StridedError::IncompatibleReshape {
                    from: self.shape().to_vec(),
                    to: new_shape.to_vec(),
                })?
        };
        let backstrides = calc_backstrides(&strides, new_shape);
        self.new_slice(
            self.start(),
            new_shape.to_vec(),
            strides,
            backstrides,
            None,
            true,
        )
    }

    /// Shape assignment: a dependent view of the same elements under
    /// `new_shape`.
    ///
    /// Owning and non-owning arrays laid out by default in their order take
    /// default strides for `new_shape`. A dependent view of rank < 2, or one
    /// with no elements, steps through `new_shape` by its first stride. Any
    /// other array must be regroupable as in [`reshape`](Self::reshape).
    pub fn set_shape(&self, new_shape: &[usize]) -> Result<ArrayView> {
        let new_size: usize = new_shape.iter().product();
        if new_size != self.size() {
            return Err(StridedError::ShapeMismatch(
                self.shape().to_vec(),
                new_shape.to_vec(),
            ));
        }
        let elsize = self.elsize();
        let default_layout = match self.order() {
            Order::C => is_c_contiguous(self.shape(), self.strides(), elsize),
            Order::F => is_f_contiguous(self.shape(), self.strides(), elsize),
        };
        let is_slice = matches!(self.kind(), ViewKind::Slice { .. });
        let strides = match (is_slice, default_layout) {
            (true, _) if self.ndim() < 2 || self.size() == 0 => {
                let unit = elsize.max(1) as isize;
                let mut factor = self.strides().first().map_or(1, |&s| s / unit);
                let mut strides = vec![0isize; new_shape.len()];
                let mut visit = |i: usize| -> Result<()> {
                    strides[i] = factor
                        .checked_mul(unit)
                        .ok_or(StridedError::OffsetOverflow)?;
                    factor = factor
                        .checked_mul(new_shape[i].max(1) as isize)
                        .ok_or(StridedError::OffsetOverflow)?;
                    Ok(())
                };
                match self.order() {
                    Order::C => (0..new_shape.len()).rev().try_for_each(&mut visit)?,
                    Order::F => (0..new_shape.len()).try_for_each(&mut visit)?,
                }
                strides
            }
            (true, _) | (false, false) => {
                derive_strides_for_reshape(new_shape, self.shape(), self.strides(), self.order())
                    .ok_or_else(|| StridedError::IncompatibleReshape {
                        from: self.shape().to_vec(),
                        to: new_shape.to_vec(),
                    })?
            }
            (false, true) => {
                checked_span(new_shape, elsize)?;
                default_strides(new_shape, elsize, self.order()).0
            }
        };
        let backstrides = checked_backstrides(&strides, new_shape)?;
        self.new_slice(
            self.start(),
            new_shape.to_vec(),
            strides,
            backstrides,
            None,
            true,
        )
    }

    /// Reshape as a view when possible, otherwise reshape a contiguous copy.
    pub fn reshape_or_copy(&self, new_shape: &[usize]) -> Result<ArrayView> {
        match self.reshape(new_shape) {
            Err(StridedError::IncompatibleReshape { from, to }) => {
                log::debug!("reshape {from:?} -> {to:?} needs a copy");
                self.copy()?.reshape(new_shape)
            }
            other => other,
        }
    }

    // ========================================================================
    // Complex components
    // ========================================================================

    /// Real part. On complex dtypes a view with the component float dtype;
    /// otherwise a view of the array itself.
    pub fn get_real(&self) -> Result<ArrayView> {
        let dtype = self.dtype().component_dtype();
        self.new_slice(
            self.start(),
            self.shape().to_vec(),
            self.strides().to_vec(),
            self.backstrides().to_vec(),
            dtype,
            true,
        )
    }

    /// Imaginary part. On complex dtypes a view offset by one component;
    /// otherwise a fresh read-only array of zeros.
    pub fn get_imag(&self) -> Result<ArrayView> {
        let dtype = self.dtype();
        match dtype.component_dtype() {
            Some(component) => self.new_slice(
                self.start() + component.elsize(),
                self.shape().to_vec(),
                self.strides().to_vec(),
                self.backstrides().to_vec(),
                Some(component),
                true,
            ),
            None => {
                let (strides, backstrides) =
                    default_strides(self.shape(), dtype.elsize(), self.order());
                ArrayView::owning(
                    self.shape(),
                    dtype,
                    self.order(),
                    strides,
                    backstrides,
                    true,
                    &GLOBAL_TRACER,
                    false,
                )
            }
        }
    }

    pub fn set_real(&self, value: &ArrayView) -> Result<()> {
        self.get_real()?.setslice(value)
    }

    pub fn set_imag(&self, value: &ArrayView) -> Result<()> {
        self.get_imag()?.setslice(value)
    }

    // ========================================================================
    // Reinterpretation
    // ========================================================================

    /// View the bytes from this view's start as `new_shape` elements of
    /// `dtype`, with default strides in this view's order unless `strides`
    /// is given.
    pub fn get_view(
        &self,
        dtype: DTypeRef,
        new_shape: &[usize],
        strides: Option<&[isize]>,
    ) -> Result<ArrayView> {
        check_reinterpret(&self.dtype(), &dtype)?;
        let strides = match strides {
            Some(s) if s.len() != new_shape.len() => {
                return Err(StridedError::StrideLengthMismatch);
            }
            Some(s) => s.to_vec(),
            None => {
                checked_span(new_shape, dtype.elsize())?;
                default_strides(new_shape, dtype.elsize(), self.order()).0
            }
        };
        let backstrides = checked_backstrides(&strides, new_shape)?;
        self.new_slice(
            self.start(),
            new_shape.to_vec(),
            strides,
            backstrides,
            Some(dtype),
            true,
        )
    }

    /// Read-only view repeating this array's elements to fill `shape`.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<ArrayView> {
        let (strides, backstrides) =
            broadcast_strides(self.strides(), self.backstrides(), self.shape(), shape, false)?;
        self.new_slice(self.start(), shape.to_vec(), strides, backstrides, None, false)
    }
}
