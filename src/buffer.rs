//! Raw byte access for buffer-protocol consumers.

use crate::view::ArrayView;
use crate::{Result, StridedError};

/// Byte-addressed window onto a view's storage.
///
/// Byte `0` is the view's start offset and the window spans the view's size
/// in bytes. Holding an `ArrayBuffer` keeps the view, and so the storage,
/// alive.
#[derive(Debug, Clone)]
pub struct ArrayBuffer {
    view: ArrayView,
    readonly: bool,
}

impl ArrayBuffer {
    /// Buffers over read-only views or reference elements are always read-only.
    pub fn new(view: &ArrayView, readonly: bool) -> Self {
        let readonly = readonly || !view.is_writeable() || view.dtype().is_reference();
        Self {
            view: view.clone(),
            readonly,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.view.nbytes()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn locate(&self, offset: usize) -> Result<usize> {
        if offset >= self.len() {
            return Err(StridedError::IndexOutOfBounds {
                axis: 0,
                index: offset as isize,
                extent: self.len(),
            });
        }
        let at = self.view.start() + offset;
        if at >= self.view.storage().len() {
            return Err(StridedError::OffsetOverflow);
        }
        Ok(at)
    }

    pub fn get_byte(&self, offset: usize) -> Result<u8> {
        let at = self.locate(offset)?;
        Ok(self.view.storage().borrow()?[at])
    }

    pub fn set_byte(&self, offset: usize, value: u8) -> Result<()> {
        if self.readonly {
            return Err(StridedError::ReadOnlyViolation);
        }
        let at = self.locate(offset)?;
        self.view.storage().borrow_mut()?[at] = value;
        Ok(())
    }

    /// Address of byte `0`. Valid only while this buffer is alive.
    pub fn raw_address(&self) -> *const u8 {
        self.view.storage().as_ptr().wrapping_add(self.view.start())
    }
}

impl ArrayView {
    pub fn get_buffer(&self, readonly: bool) -> ArrayBuffer {
        ArrayBuffer::new(self, readonly)
    }
}
