//! Offset iteration over strided views.
//!
//! An [`ArrayIter`] is an immutable description of a traversal; the cursor
//! lives in a separate [`IterState`], so any number of independent passes can
//! be started from one iterator with [`ArrayIter::reset`].
//!
//! Each step advances the fastest axis (last for [`Order::C`], first for
//! [`Order::F`]). When an axis wraps, its backstride is subtracted and the
//! carry moves on to the next slower axis.

use crate::broadcast::broadcast_strides;
use crate::strides::Order;
use crate::view::ArrayView;
use crate::Result;

/// Traversal configuration: start offset, shape and (possibly broadcast) strides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayIter {
    start: usize,
    size: usize,
    shape: Vec<usize>,
    strides: Vec<isize>,
    backstrides: Vec<isize>,
    order: Order,
}

/// Cursor of one traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterState {
    /// Number of elements visited so far.
    pub index: usize,
    /// Multi-index of the current element.
    pub indices: Vec<usize>,
    /// Byte offset of the current element within the storage.
    pub offset: usize,
}

impl ArrayIter {
    pub fn new(
        start: usize,
        shape: Vec<usize>,
        strides: Vec<isize>,
        backstrides: Vec<isize>,
        order: Order,
    ) -> Self {
        debug_assert_eq!(shape.len(), strides.len());
        debug_assert_eq!(shape.len(), backstrides.len());
        let size = shape.iter().product();
        Self {
            start,
            size,
            shape,
            strides,
            backstrides,
            order,
        }
    }

    /// Same traversal, stepping axes in `order`.
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Number of offsets a full traversal produces.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    /// A fresh cursor at the first element.
    pub fn reset(&self) -> IterState {
        IterState {
            index: 0,
            indices: vec![0; self.shape.len()],
            offset: self.start,
        }
    }

    #[inline]
    pub fn done(&self, state: &IterState) -> bool {
        state.index >= self.size
    }

    /// Advance `state` by one element.
    pub fn next(&self, state: &mut IterState) {
        state.index += 1;
        let rank = self.shape.len();
        let mut offset = state.offset as isize;
        for k in 0..rank {
            let axis = match self.order {
                Order::C => rank - 1 - k,
                Order::F => k,
            };
            if state.indices[axis] + 1 < self.shape[axis] {
                state.indices[axis] += 1;
                offset += self.strides[axis];
                break;
            }
            state.indices[axis] = 0;
            offset -= self.backstrides[axis];
        }
        state.offset = offset as usize;
    }

    /// Lazily yield every offset of one traversal.
    pub fn offsets(&self) -> Offsets<'_> {
        Offsets {
            iter: self,
            state: self.reset(),
        }
    }
}

/// Iterator over the offsets of an [`ArrayIter`].
pub struct Offsets<'a> {
    iter: &'a ArrayIter,
    state: IterState,
}

impl Iterator for Offsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.iter.done(&self.state) {
            return None;
        }
        let offset = self.state.offset;
        self.iter.next(&mut self.state);
        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.iter.size.saturating_sub(self.state.index);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Offsets<'_> {}

impl ArrayView {
    /// Iterator over this view's element offsets.
    ///
    /// When `shape` has strictly more elements than the view, the view is
    /// broadcast to it: right-aligned, or left-aligned when `backward` is
    /// set. Otherwise the view's own shape is walked.
    pub fn create_iter(&self, shape: Option<&[usize]>, backward: bool) -> Result<(ArrayIter, IterState)> {
        let it = match shape {
            Some(target) if target.iter().product::<usize>() > self.size() => {
                let (strides, backstrides) = broadcast_strides(
                    self.strides(),
                    self.backstrides(),
                    self.shape(),
                    target,
                    backward,
                )?;
                ArrayIter::new(self.start(), target.to_vec(), strides, backstrides, self.order())
            }
            _ => ArrayIter::new(
                self.start(),
                self.shape().to_vec(),
                self.strides().to_vec(),
                self.backstrides().to_vec(),
                self.order(),
            ),
        };
        let state = it.reset();
        Ok((it, state))
    }
}
