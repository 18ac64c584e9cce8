//! Index resolution.
//!
//! An index expression arrives already split into primitive [`Chunk`]s. It
//! resolves either to the byte offset of a single element (every axis pinned
//! by an integer) or to a new dependent view.

use strided_dtype::Value;

use crate::view::ArrayView;
use crate::{Result, StridedError};

/// One primitive index component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Pin one axis; negative values count from the end.
    Index(isize),
    /// Python-style `start:stop:step` on one axis.
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
    },
    /// Insert a unit axis without consuming an input axis.
    NewAxis,
    /// Select a named field of a record dtype.
    Field(String),
}

impl Chunk {
    /// The full `:` slice.
    pub fn full() -> Self {
        Chunk::Slice {
            start: None,
            stop: None,
            step: 1,
        }
    }

    pub fn range(start: isize, stop: isize) -> Self {
        Chunk::Slice {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }
}

/// Outcome of resolving an index expression.
#[derive(Debug, Clone)]
pub enum Resolved {
    Offset(usize),
    View(ArrayView),
}

/// Outcome of [`ArrayView::getitem`].
#[derive(Debug, Clone)]
pub enum Item {
    Scalar(Value),
    View(ArrayView),
}

/// A slice normalized against one axis: first index, step and element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceBounds {
    pub start: isize,
    pub step: isize,
    pub len: usize,
}

/// Clamp `start:stop:step` to an axis of `extent` elements, the way Python
/// slices behave.
pub fn normalize_slice(
    start: Option<isize>,
    stop: Option<isize>,
    step: isize,
    extent: usize,
) -> Result<SliceBounds> {
    if step == 0 {
        return Err(StridedError::InvalidStep);
    }
    let n = extent as isize;
    let (lower, upper) = if step > 0 { (0, n) } else { (-1, n - 1) };
    let clamp = |v: isize| {
        if v < 0 {
            (v + n).max(lower)
        } else {
            v.min(upper)
        }
    };
    let start = start.map_or(if step > 0 { lower } else { upper }, clamp);
    let stop = stop.map_or(if step > 0 { upper } else { lower }, clamp);
    let len = if step > 0 && stop > start {
        (stop - start - 1) as usize / step.unsigned_abs() + 1
    } else if step < 0 && start > stop {
        (start - stop - 1) as usize / step.unsigned_abs() + 1
    } else {
        0
    };
    Ok(SliceBounds { start, step, len })
}

/// Wrap a negative index once and bounds-check it.
fn wrap_index(index: isize, axis: usize, extent: usize) -> Result<usize> {
    let wrapped = if index < 0 {
        index + extent as isize
    } else {
        index
    };
    if wrapped < 0 || wrapped >= extent as isize {
        return Err(StridedError::IndexOutOfBounds {
            axis,
            index,
            extent,
        });
    }
    Ok(wrapped as usize)
}

#[inline]
fn offset_by(base: usize, delta: isize) -> usize {
    (base as isize + delta) as usize
}

impl ArrayView {
    /// Byte offset of the element at `index` (one entry per axis).
    pub fn lookup(&self, index: &[isize]) -> Result<usize> {
        if index.len() != self.ndim() {
            return Err(StridedError::RankMismatch(index.len(), self.ndim()));
        }
        let mut offset = self.start();
        for (axis, &i) in index.iter().enumerate() {
            let i = wrap_index(i, axis, self.shape()[axis])?;
            offset = offset_by(offset, i as isize * self.strides()[axis]);
        }
        Ok(offset)
    }

    pub fn get_at(&self, index: &[isize]) -> Result<Value> {
        self.get_element(self.lookup(index)?)
    }

    pub fn set_at(&self, index: &[isize], value: &Value) -> Result<()> {
        self.set_element(self.lookup(index)?, value)
    }

    /// Resolve `chunks` to an element offset or a dependent view.
    pub fn resolve(&self, chunks: &[Chunk]) -> Result<Resolved> {
        if let Some(name) = chunks.iter().find_map(|c| match c {
            Chunk::Field(name) => Some(name),
            _ => None,
        }) {
            if chunks.len() != 1 {
                return Err(StridedError::FieldNotAlone(name.clone()));
            }
            return self.field_view(name).map(Resolved::View);
        }

        let rank = self.ndim();
        let consumed = chunks.iter().filter(|c| !matches!(c, Chunk::NewAxis)).count();
        if consumed > rank {
            if rank == 0 && chunks.iter().any(|c| matches!(c, Chunk::Index(_))) {
                return Err(StridedError::ZeroDimIndex);
            }
            if rank == 0 {
                return Err(StridedError::ZeroDimSlice);
            }
            return Err(StridedError::TooManyIndices {
                given: consumed,
                rank,
            });
        }

        if chunks.len() == rank && chunks.iter().all(|c| matches!(c, Chunk::Index(_))) {
            let index: Vec<isize> = chunks
                .iter()
                .filter_map(|c| match c {
                    Chunk::Index(i) => Some(*i),
                    _ => None,
                })
                .collect();
            return self.lookup(&index).map(Resolved::Offset);
        }

        self.slice_view(chunks).map(Resolved::View)
    }

    fn slice_view(&self, chunks: &[Chunk]) -> Result<ArrayView> {
        let mut start = self.start();
        let mut shape = Vec::with_capacity(self.ndim() + chunks.len());
        let mut strides = Vec::with_capacity(shape.capacity());
        let mut backstrides = Vec::with_capacity(shape.capacity());
        let mut axis = 0;
        for chunk in chunks {
            match chunk {
                Chunk::Index(i) => {
                    let i = wrap_index(*i, axis, self.shape()[axis])?;
                    start = offset_by(start, i as isize * self.strides()[axis]);
                    axis += 1;
                }
                Chunk::Slice {
                    start: lo,
                    stop: hi,
                    step,
                } => {
                    let b = normalize_slice(*lo, *hi, *step, self.shape()[axis])?;
                    let stride = self.strides()[axis];
                    if b.len > 0 {
                        start = offset_by(start, b.start * stride);
                    }
                    // A single element never steps, so the step can't overflow it.
                    let (step_stride, backstride) = if b.len <= 1 {
                        (stride, 0)
                    } else {
                        let s = stride
                            .checked_mul(b.step)
                            .ok_or(StridedError::OffsetOverflow)?;
                        let back = s
                            .checked_mul(b.len as isize - 1)
                            .ok_or(StridedError::OffsetOverflow)?;
                        (s, back)
                    };
                    shape.push(b.len);
                    strides.push(step_stride);
                    backstrides.push(backstride);
                    axis += 1;
                }
                Chunk::NewAxis => {
                    shape.push(1);
                    strides.push(0);
                    backstrides.push(0);
                }
                Chunk::Field(name) => return Err(StridedError::FieldNotAlone(name.clone())),
            }
        }
        shape.extend_from_slice(&self.shape()[axis..]);
        strides.extend_from_slice(&self.strides()[axis..]);
        backstrides.extend_from_slice(&self.backstrides()[axis..]);
        self.new_slice(start, shape, strides, backstrides, None, true)
    }

    fn field_view(&self, name: &str) -> Result<ArrayView> {
        let dtype = self.dtype();
        let field = dtype
            .fields()
            .and_then(|fields| fields.iter().find(|f| f.name == name))
            .ok_or_else(|| StridedError::FieldNotFound(name.to_string()))?;
        self.new_slice(
            self.start() + field.offset,
            self.shape().to_vec(),
            self.strides().to_vec(),
            self.backstrides().to_vec(),
            Some(field.dtype.clone()),
            true,
        )
    }

    /// Read a single element or take a view, depending on `chunks`.
    pub fn getitem(&self, chunks: &[Chunk]) -> Result<Item> {
        match self.resolve(chunks)? {
            Resolved::Offset(offset) => self.get_element(offset).map(Item::Scalar),
            Resolved::View(view) => Ok(Item::View(view)),
        }
    }

    /// Assign `value` to every element selected by `chunks`.
    pub fn setitem_value(&self, chunks: &[Chunk], value: &Value) -> Result<()> {
        match self.resolve(chunks)? {
            Resolved::Offset(offset) => self.set_element(offset, value),
            Resolved::View(view) => view.fill(value),
        }
    }

    /// Assign `src` (broadcast as needed) to the elements selected by `chunks`.
    pub fn setitem(&self, chunks: &[Chunk], src: &ArrayView) -> Result<()> {
        match self.resolve(chunks)? {
            Resolved::Offset(offset) => {
                if src.size() != 1 {
                    return Err(StridedError::ShapeMismatch(src.shape().to_vec(), vec![]));
                }
                let value = src.get_element(src.start())?;
                self.set_element(offset, &value)
            }
            Resolved::View(view) => view.setslice(src),
        }
    }
}
