//! The array view family.
//!
//! Every array is an [`ArrayView`]: a [`Storage`] handle plus dtype, start
//! offset, shape, strides and backstrides. How the view came to be is kept in
//! its [`ViewKind`]:
//!
//! - [`ViewKind::Owning`]: allocated its own storage.
//! - [`ViewKind::NonOwning`]: built over a caller-supplied storage.
//! - [`ViewKind::Slice`]: derived from another view. The recorded base is
//!   always the ultimate non-slice ancestor, so slicing a slice never builds
//!   a chain.
//!
//! All views of one buffer share the storage handle; the buffer outlives the
//! last of them and no longer.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use strided_dtype::{DTypeRef, Value};

use crate::flags::ArrayFlags;
use crate::storage::{self, Storage};
use crate::strides::{
    calc_backstrides, checked_backstrides, checked_span, checked_start, default_strides,
    validate_bounds, Order,
};
use crate::trace::{Tracer, GLOBAL_TRACER};
use crate::{Result, StridedError};

/// How a view relates to its storage.
#[derive(Clone)]
pub enum ViewKind {
    Owning,
    NonOwning,
    Slice { base: ArrayView },
}

struct ArrayInner {
    dtype: RefCell<DTypeRef>,
    storage: Storage,
    start: usize,
    shape: Vec<usize>,
    strides: Vec<isize>,
    backstrides: Vec<isize>,
    order: Order,
    flags: Cell<ArrayFlags>,
    kind: ViewKind,
}

/// An N-dimensional strided array over a shared byte buffer.
///
/// Cloning an `ArrayView` clones the handle, not the array: both clones are
/// the same array (see [`ArrayView::ptr_eq`]).
#[derive(Clone)]
pub struct ArrayView {
    inner: Rc<ArrayInner>,
}

impl fmt::Debug for ArrayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner.kind {
            ViewKind::Owning => "Owning",
            ViewKind::NonOwning => "NonOwning",
            ViewKind::Slice { .. } => "Slice",
        };
        f.debug_struct("ArrayView")
            .field("kind", &kind)
            .field("dtype", &self.dtype().name())
            .field("shape", &self.inner.shape)
            .field("strides", &self.inner.strides)
            .field("start", &self.inner.start)
            .field("order", &self.inner.order)
            .field("flags", &self.flags())
            .finish()
    }
}

fn checked_nbytes(shape: &[usize], elsize: usize) -> Result<usize> {
    shape
        .iter()
        .try_fold(elsize, |acc, &d| acc.checked_mul(d))
        .ok_or(StridedError::OutOfMemory { bytes: usize::MAX })
}

impl ArrayView {
    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        dtype: DTypeRef,
        storage: Storage,
        start: usize,
        shape: Vec<usize>,
        strides: Vec<isize>,
        backstrides: Vec<isize>,
        order: Order,
        writeable: bool,
        kind: ViewKind,
    ) -> Self {
        let flags = ArrayFlags::compute(
            &shape,
            &strides,
            dtype.elsize(),
            dtype.alignment(),
            storage.as_ptr() as usize + start,
            writeable,
        );
        Self {
            inner: Rc::new(ArrayInner {
                dtype: RefCell::new(dtype),
                storage,
                start,
                shape,
                strides,
                backstrides,
                order,
                flags: Cell::new(flags),
                kind,
            }),
        }
    }

    // ========================================================================
    // Owning arrays
    // ========================================================================

    /// Allocate an owning array with default strides for `order`.
    ///
    /// Reference dtypes are always zero-filled and registered with the
    /// global tracer.
    pub fn allocate(shape: &[usize], dtype: DTypeRef, order: Order, zero_fill: bool) -> Result<Self> {
        Self::allocate_in(shape, dtype, order, zero_fill, &GLOBAL_TRACER)
    }

    /// [`allocate`](Self::allocate), registering reference storage with `tracer`.
    pub fn allocate_in(
        shape: &[usize],
        dtype: DTypeRef,
        order: Order,
        zero_fill: bool,
        tracer: &Tracer,
    ) -> Result<Self> {
        checked_span(shape, dtype.elsize())?;
        let (strides, backstrides) = default_strides(shape, dtype.elsize(), order);
        Self::owning(shape, dtype, order, strides, backstrides, zero_fill, tracer, true)
    }

    /// Zero-filled owning array.
    pub fn zeros(shape: &[usize], dtype: DTypeRef, order: Order) -> Result<Self> {
        Self::allocate(shape, dtype, order, true)
    }

    /// Zero-filled owning array with explicit byte strides.
    ///
    /// The buffer holds exactly `product(shape)` elements, so `strides` must
    /// address a permutation of that block (negative strides allowed).
    pub fn with_strides(shape: &[usize], dtype: DTypeRef, order: Order, strides: &[isize]) -> Result<Self> {
        if strides.len() != shape.len() {
            return Err(StridedError::StrideLengthMismatch);
        }
        checked_span(shape, dtype.elsize())?;
        let backstrides = checked_backstrides(strides, shape)?;
        Self::owning(
            shape,
            dtype,
            order,
            strides.to_vec(),
            backstrides,
            true,
            &GLOBAL_TRACER,
            true,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn owning(
        shape: &[usize],
        dtype: DTypeRef,
        order: Order,
        strides: Vec<isize>,
        backstrides: Vec<isize>,
        zero_fill: bool,
        tracer: &Tracer,
        writeable: bool,
    ) -> Result<Self> {
        let elsize = dtype.elsize();
        let nbytes = checked_nbytes(shape, elsize)?;
        let start = checked_start(shape, &strides)?;
        let reference = dtype.is_reference();
        let storage = storage::allocate(nbytes, zero_fill || reference)?;
        validate_bounds(storage.len(), shape, &strides, start, elsize)?;
        if reference {
            let count = if elsize == 0 { 0 } else { nbytes / elsize };
            // SAFETY: the buffer was just zero-filled and holds `count`
            // object slots laid out back to back.
            unsafe { storage.attach_scan_descriptor(tracer, count, elsize) };
        }
        Ok(Self::from_parts(
            dtype,
            storage,
            start,
            shape.to_vec(),
            strides,
            backstrides,
            order,
            writeable,
            ViewKind::Owning,
        ))
    }

    /// Rank-0 owning array holding `value`.
    pub fn scalar(dtype: DTypeRef, value: impl Into<Value>) -> Result<Self> {
        let arr = Self::zeros(&[], dtype, Order::C)?;
        arr.set_element(arr.start(), &value.into())?;
        Ok(arr)
    }

    /// Owning array whose element at each multi-index is `f(index)`.
    pub fn from_fn(
        shape: &[usize],
        dtype: DTypeRef,
        order: Order,
        mut f: impl FnMut(&[usize]) -> Value,
    ) -> Result<Self> {
        let arr = Self::zeros(shape, dtype, order)?;
        let (it, mut state) = arr.create_iter(None, false)?;
        let it = it.with_order(Order::C);
        while !it.done(&state) {
            arr.set_element(state.offset, &f(&state.indices))?;
            it.next(&mut state);
        }
        Ok(arr)
    }

    // ========================================================================
    // Non-owning arrays and slices
    // ========================================================================

    /// View `storage` as an array without taking over its lifetime.
    #[allow(clippy::too_many_arguments)]
    pub fn from_storage(
        storage: Storage,
        dtype: DTypeRef,
        shape: &[usize],
        strides: &[isize],
        start: usize,
        order: Order,
        writeable: bool,
    ) -> Result<Self> {
        validate_bounds(storage.len(), shape, strides, start, dtype.elsize())?;
        check_reference_layout(&storage, &dtype, shape, strides, start)?;
        let backstrides = calc_backstrides(strides, shape);
        Ok(Self::from_parts(
            dtype,
            storage,
            start,
            shape.to_vec(),
            strides.to_vec(),
            backstrides,
            order,
            writeable,
            ViewKind::NonOwning,
        ))
    }

    /// Derive a dependent view sharing this view's storage.
    ///
    /// `writeable` can only narrow the parent's flag.
    pub(crate) fn new_slice(
        &self,
        start: usize,
        shape: Vec<usize>,
        strides: Vec<isize>,
        backstrides: Vec<isize>,
        dtype: Option<DTypeRef>,
        writeable: bool,
    ) -> Result<Self> {
        let dtype = dtype.unwrap_or_else(|| self.dtype());
        validate_bounds(self.inner.storage.len(), &shape, &strides, start, dtype.elsize())?;
        check_reference_layout(&self.inner.storage, &dtype, &shape, &strides, start)?;
        let base = match &self.inner.kind {
            ViewKind::Slice { base } => base.clone(),
            _ => self.clone(),
        };
        Ok(Self::from_parts(
            dtype,
            self.inner.storage.clone(),
            start,
            shape,
            strides,
            backstrides,
            self.inner.order,
            self.is_writeable() && writeable,
            ViewKind::Slice { base },
        ))
    }

    /// A read-only view of the same elements.
    pub fn read_only(&self) -> Result<Self> {
        self.new_slice(
            self.inner.start,
            self.inner.shape.clone(),
            self.inner.strides.clone(),
            self.inner.backstrides.clone(),
            None,
            false,
        )
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.inner.shape
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.inner.strides
    }

    #[inline]
    pub fn backstrides(&self) -> &[isize] {
        &self.inner.backstrides
    }

    /// Byte offset of the first element within the storage.
    #[inline]
    pub fn start(&self) -> usize {
        self.inner.start
    }

    #[inline]
    pub fn order(&self) -> Order {
        self.inner.order
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.inner.shape.len()
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.inner.shape.iter().product()
    }

    pub fn dtype(&self) -> DTypeRef {
        self.inner.dtype.borrow().clone()
    }

    #[inline]
    pub fn elsize(&self) -> usize {
        self.inner.dtype.borrow().elsize()
    }

    /// Size of the view in bytes.
    #[inline]
    pub fn nbytes(&self) -> usize {
        self.size() * self.elsize()
    }

    #[inline]
    pub fn flags(&self) -> ArrayFlags {
        self.inner.flags.get()
    }

    #[inline]
    pub fn is_writeable(&self) -> bool {
        self.flags().writeable
    }

    #[inline]
    pub fn kind(&self) -> &ViewKind {
        &self.inner.kind
    }

    /// The array this view was derived from, if it is a dependent view.
    pub fn base(&self) -> Option<&ArrayView> {
        match &self.inner.kind {
            ViewKind::Slice { base } => Some(base),
            _ => None,
        }
    }

    /// Identity comparison: are `a` and `b` handles to the same array?
    #[inline]
    pub fn ptr_eq(a: &ArrayView, b: &ArrayView) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Whether both views are rooted at the same storage.
    #[inline]
    pub fn shares_storage(&self, other: &ArrayView) -> bool {
        Storage::ptr_eq(&self.inner.storage, &other.inner.storage)
    }

    #[inline]
    pub(crate) fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    /// Run `f` with this view's storage; the view stays alive for the call.
    pub fn with_storage<R>(&self, f: impl FnOnce(&Storage) -> R) -> R {
        f(&self.inner.storage)
    }

    /// Replace the dtype of this array in place. Shape and strides are
    /// unchanged, so the element size must match.
    pub fn set_dtype(&self, dtype: DTypeRef) -> Result<()> {
        let current = self.dtype();
        if dtype.elsize() != current.elsize() {
            return Err(StridedError::DTypeSizeMismatch {
                expected: current.elsize(),
                found: dtype.elsize(),
            });
        }
        check_reinterpret(&current, &dtype)?;
        let flags = ArrayFlags::compute(
            self.shape(),
            self.strides(),
            dtype.elsize(),
            dtype.alignment(),
            self.inner.storage.as_ptr() as usize + self.inner.start,
            self.is_writeable(),
        );
        self.inner.flags.set(flags);
        *self.inner.dtype.borrow_mut() = dtype;
        Ok(())
    }

    // ========================================================================
    // Element access
    // ========================================================================

    /// Read the element at absolute byte `offset` in the storage.
    pub fn get_element(&self, offset: usize) -> Result<Value> {
        let dtype = self.dtype();
        let bytes = self.inner.storage.borrow()?;
        let end = element_end(offset, dtype.elsize(), bytes.len())?;
        Ok(dtype.read(&bytes[offset..end]))
    }

    /// Write the element at absolute byte `offset` in the storage.
    pub fn set_element(&self, offset: usize, value: &Value) -> Result<()> {
        if !self.is_writeable() {
            return Err(StridedError::ReadOnlyViolation);
        }
        self.write_element(offset, value)
    }

    /// `set_element` without the writeable check, for filling arrays this
    /// crate has just created read-only.
    pub(crate) fn write_element(&self, offset: usize, value: &Value) -> Result<()> {
        let dtype = self.dtype();
        let mut bytes = self.inner.storage.borrow_mut()?;
        let end = element_end(offset, dtype.elsize(), bytes.len())?;
        dtype.store(&mut bytes[offset..end], value)?;
        Ok(())
    }

    /// All elements in row-major logical order.
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        let (it, mut state) = self.create_iter(None, false)?;
        let it = it.with_order(Order::C);
        let dtype = self.dtype();
        let elsize = dtype.elsize();
        let bytes = self.inner.storage.borrow()?;
        let mut out = Vec::with_capacity(it.size());
        while !it.done(&state) {
            let end = element_end(state.offset, elsize, bytes.len())?;
            out.push(dtype.read(&bytes[state.offset..end]));
            it.next(&mut state);
        }
        Ok(out)
    }
}

#[inline]
fn element_end(offset: usize, elsize: usize, len: usize) -> Result<usize> {
    offset
        .checked_add(elsize)
        .filter(|&end| end <= len)
        .ok_or(StridedError::OffsetOverflow)
}

/// Reference slots may only be reinterpreted as reference slots.
pub(crate) fn check_reinterpret(from: &DTypeRef, to: &DTypeRef) -> Result<()> {
    if from.is_reference() != to.is_reference() {
        return Err(StridedError::ReferenceReinterpret {
            from: from.name().to_string(),
            to: to.name().to_string(),
        });
    }
    Ok(())
}

/// Reference elements must sit exactly on the traced slots of their storage,
/// and plain elements must never cover traced slots. Views without elements
/// touch no slots.
pub(crate) fn check_reference_layout(
    storage: &Storage,
    dtype: &DTypeRef,
    shape: &[usize],
    strides: &[isize],
    start: usize,
) -> Result<()> {
    if shape.contains(&0) {
        return Ok(());
    }
    let traced = storage.scan_descriptor().filter(|d| d.length() > 0);
    let aligned = match (dtype.is_reference(), traced) {
        (false, None) => true,
        (false, Some(_)) | (true, None) => false,
        (true, Some(descriptor)) => {
            let step = descriptor.step();
            step > 0
                && step == dtype.elsize()
                && start % step == 0
                && strides.iter().all(|&s| s % step as isize == 0)
        }
    };
    if !aligned {
        return Err(StridedError::ReferenceLayout {
            dtype: dtype.name().to_string(),
        });
    }
    Ok(())
}
