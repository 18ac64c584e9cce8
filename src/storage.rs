//! Shared raw byte buffers.
//!
//! A [`Storage`] is a reference-counted handle to one flat byte buffer. Every
//! view rooted at the buffer holds a handle, so the buffer is freed exactly
//! once, when the last handle goes away. Storages holding managed references
//! carry a [`ScanDescriptor`] registered with a [`Tracer`].
//!
//! Byte access goes through [`BytesRef`] / [`BytesMut`] guards which enforce
//! the usual shared-xor-exclusive rule at runtime.

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

use crate::trace::{ScanDescriptor, Tracer};
use crate::{Result, StridedError};

/// Alignment of every owned allocation; enough for any built-in element type.
pub const MAX_ALIGN: usize = std::mem::align_of::<u128>();

// ============================================================================
// Allocation statistics
// ============================================================================

/// Per-thread counters of owned allocations and releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub allocated: usize,
    pub released: usize,
    pub live_bytes: usize,
}

impl AllocStats {
    #[inline]
    pub fn live(&self) -> usize {
        self.allocated - self.released
    }
}

thread_local! {
    static ALLOC_STATS: Cell<AllocStats> = const {
        Cell::new(AllocStats { allocated: 0, released: 0, live_bytes: 0 })
    };
}

/// Snapshot of the current thread's allocation counters.
pub fn alloc_stats() -> AllocStats {
    ALLOC_STATS.with(Cell::get)
}

fn record(f: impl FnOnce(&mut AllocStats)) {
    ALLOC_STATS.with(|cell| {
        let mut stats = cell.get();
        f(&mut stats);
        cell.set(stats);
    });
}

// ============================================================================
// Storage
// ============================================================================

enum Backing {
    Owned(Layout),
    /// Zero-length owned buffer; nothing to free.
    Empty,
    /// Caller-supplied memory; never freed here.
    Borrowed,
}

struct StorageInner {
    ptr: NonNull<u8>,
    len: usize,
    backing: Backing,
    scan: RefCell<Option<Arc<ScanDescriptor>>>,
    released: Cell<bool>,
    /// `> 0`: number of shared guards, `-1`: one exclusive guard.
    borrow: Cell<isize>,
}

impl StorageInner {
    fn finalize(&self) {
        if self.released.replace(true) {
            return;
        }
        if let Some(scan) = self.scan.borrow_mut().take() {
            scan.finalize();
        }
        if let Backing::Owned(layout) = self.backing {
            log::trace!("releasing storage of {} bytes at {:p}", self.len, self.ptr);
            // SAFETY: allocated in `allocate` with this very layout, and the
            // `released` flag keeps this from running twice.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
        if !matches!(self.backing, Backing::Borrowed) {
            let len = self.len;
            record(|s| {
                s.released += 1;
                s.live_bytes -= len;
            });
        }
    }
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Handle to a shared byte buffer.
///
/// Cloning a `Storage` shares the buffer; the buffer lives until every clone
/// is dropped or [`released`](Storage::release).
#[derive(Clone)]
pub struct Storage {
    inner: Rc<StorageInner>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("ptr", &self.inner.ptr)
            .field("len", &self.inner.len)
            .field("owned", &!self.is_borrowed())
            .field("handles", &Rc::strong_count(&self.inner))
            .finish()
    }
}

/// Allocate a fresh buffer of `len` bytes, zero-filled when `zero_fill` is set.
pub fn allocate(len: usize, zero_fill: bool) -> Result<Storage> {
    if len == 0 {
        record(|s| s.allocated += 1);
        return Ok(Storage::from_inner(NonNull::dangling(), 0, Backing::Empty));
    }
    let layout =
        Layout::from_size_align(len, MAX_ALIGN).map_err(|_| StridedError::OutOfMemory { bytes: len })?;
    // SAFETY: `layout` has non-zero size.
    let raw = unsafe {
        if zero_fill {
            alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc(layout)
        }
    };
    let ptr = NonNull::new(raw).ok_or(StridedError::OutOfMemory { bytes: len })?;
    log::trace!("allocated storage of {len} bytes at {ptr:p} (zeroed: {zero_fill})");
    record(|s| {
        s.allocated += 1;
        s.live_bytes += len;
    });
    Ok(Storage::from_inner(ptr, len, Backing::Owned(layout)))
}

impl Storage {
    fn from_inner(ptr: NonNull<u8>, len: usize, backing: Backing) -> Self {
        Self {
            inner: Rc::new(StorageInner {
                ptr,
                len,
                backing,
                scan: RefCell::new(None),
                released: Cell::new(false),
                borrow: Cell::new(0),
            }),
        }
    }

    /// Wrap caller-owned memory. The buffer is never freed by this crate.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as
    /// any handle to the returned storage (or any view over it) is alive, and
    /// must not be accessed through other pointers while a guard is live.
    pub unsafe fn borrowed(ptr: NonNull<u8>, len: usize) -> Self {
        Self::from_inner(ptr, len, Backing::Borrowed)
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    #[inline]
    pub fn is_borrowed(&self) -> bool {
        matches!(self.inner.backing, Backing::Borrowed)
    }

    /// Base address of the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.ptr.as_ptr()
    }

    /// Number of live handles sharing this buffer.
    #[inline]
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Whether `a` and `b` are handles to the same buffer.
    #[inline]
    pub fn ptr_eq(a: &Storage, b: &Storage) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Register this buffer's `count` reference slots, `step` bytes apart,
    /// with `tracer`. The descriptor stays live until the buffer is released,
    /// at which point every slot is released.
    ///
    /// # Safety
    /// Each of the `count` slots must lie inside the buffer and be zero or
    /// hold a reference written by the object dtype.
    pub unsafe fn attach_scan_descriptor(&self, tracer: &Tracer, count: usize, step: usize) {
        let descriptor = ScanDescriptor::new(self.inner.ptr.as_ptr() as usize, count, step);
        tracer.register(&descriptor);
        if let Some(old) = self.inner.scan.borrow_mut().replace(descriptor) {
            old.retire();
        }
    }

    pub fn scan_descriptor(&self) -> Option<Arc<ScanDescriptor>> {
        self.inner.scan.borrow().clone()
    }

    /// Give up this handle. Returns `true` when it was the last one and the
    /// buffer has been freed; other handles keep the buffer alive otherwise.
    pub fn release(self) -> bool {
        let last = Rc::strong_count(&self.inner) == 1;
        drop(self);
        last
    }

    /// Shared byte access.
    pub fn borrow(&self) -> Result<BytesRef<'_>> {
        let n = self.inner.borrow.get();
        if n < 0 {
            return Err(StridedError::AlreadyBorrowed);
        }
        self.inner.borrow.set(n + 1);
        Ok(BytesRef { inner: &self.inner })
    }

    /// Exclusive byte access.
    pub(crate) fn borrow_mut(&self) -> Result<BytesMut<'_>> {
        if self.inner.borrow.get() != 0 {
            return Err(StridedError::AlreadyBorrowed);
        }
        self.inner.borrow.set(-1);
        Ok(BytesMut { inner: &self.inner })
    }
}

// ============================================================================
// Borrow guards
// ============================================================================

/// Shared borrow of a storage's bytes.
pub struct BytesRef<'a> {
    inner: &'a StorageInner,
}

impl Deref for BytesRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the buffer is live while a handle exists and the borrow
        // flag rules out a concurrent exclusive guard.
        unsafe { std::slice::from_raw_parts(self.inner.ptr.as_ptr(), self.inner.len) }
    }
}

impl Drop for BytesRef<'_> {
    fn drop(&mut self) {
        self.inner.borrow.set(self.inner.borrow.get() - 1);
    }
}

/// Exclusive borrow of a storage's bytes.
pub struct BytesMut<'a> {
    inner: &'a StorageInner,
}

impl Deref for BytesMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: see `BytesRef::deref`.
        unsafe { std::slice::from_raw_parts(self.inner.ptr.as_ptr(), self.inner.len) }
    }
}

impl DerefMut for BytesMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: the borrow flag makes this the only guard on the buffer.
        unsafe { std::slice::from_raw_parts_mut(self.inner.ptr.as_ptr(), self.inner.len) }
    }
}

impl Drop for BytesMut<'_> {
    fn drop(&mut self) {
        self.inner.borrow.set(0);
    }
}
