//! Managed references stored inside element slots.
//!
//! A reference slot is `size_of::<usize>()` bytes holding the address of an
//! [`ObjectCell`] whose strong count includes one reference owned by the
//! slot. A zero address is the null reference, so zero-filled storage is a
//! valid array of null references.

use std::any::Any;
use std::fmt;
use std::mem::{self, ManuallyDrop};
use std::sync::Arc;

/// Size in bytes of one reference slot.
pub const SLOT_SIZE: usize = mem::size_of::<usize>();

/// Heap cell behind an [`Object`].
pub struct ObjectCell {
    value: Box<dyn Any + Send + Sync>,
}

/// A shared, reference-counted managed object.
///
/// Equality is identity: two `Object`s are equal when they point at the same cell.
#[derive(Clone)]
pub struct Object(Arc<ObjectCell>);

impl Object {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Object(Arc::new(ObjectCell {
            value: Box::new(value),
        }))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.value.downcast_ref::<T>()
    }

    #[inline]
    pub fn ptr_eq(a: &Object, b: &Object) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Number of live strong references, slots included.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    fn into_addr(self) -> usize {
        Arc::into_raw(self.0) as usize
    }

    /// # Safety
    /// `addr` must come from [`Object::into_addr`] and own one strong count.
    unsafe fn from_addr(addr: usize) -> Self {
        Object(Arc::from_raw(addr as *const ObjectCell))
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Object::ptr_eq(self, other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({:p})", Arc::as_ptr(&self.0))
    }
}

#[inline]
fn slot_addr(slot: &[u8]) -> usize {
    bytemuck::pod_read_unaligned::<usize>(&slot[..SLOT_SIZE])
}

#[inline]
fn write_addr(slot: &mut [u8], addr: usize) {
    slot[..SLOT_SIZE].copy_from_slice(bytemuck::bytes_of(&addr));
}

/// Clone the reference held by `slot`.
///
/// # Safety
/// `slot` must be zero or hold an address written by [`store_slot`].
pub unsafe fn load_slot(slot: &[u8]) -> Option<Object> {
    let addr = slot_addr(slot);
    if addr == 0 {
        return None;
    }
    Arc::increment_strong_count(addr as *const ObjectCell);
    Some(Object::from_addr(addr))
}

/// Replace the reference held by `slot`, retaining `value` and releasing the
/// previous occupant.
///
/// # Safety
/// `slot` must be zero or hold an address written by a previous `store_slot`.
pub unsafe fn store_slot(slot: &mut [u8], value: Option<&Object>) {
    let new_addr = value.cloned().map_or(0, Object::into_addr);
    let old_addr = slot_addr(slot);
    write_addr(slot, new_addr);
    if old_addr != 0 {
        drop(Object::from_addr(old_addr));
    }
}

/// Release the reference held by `slot` and null it.
///
/// # Safety
/// Same contract as [`store_slot`].
pub unsafe fn release_slot(slot: &mut [u8]) {
    store_slot(slot, None);
}

/// Present the reference held by `slot` to `visit` without touching its count.
///
/// # Safety
/// Same contract as [`load_slot`]; the slot must stay live for the call.
pub unsafe fn visit_slot(slot: &[u8], visit: &mut dyn FnMut(&Object)) -> bool {
    let addr = slot_addr(slot);
    if addr == 0 {
        return false;
    }
    let borrowed = ManuallyDrop::new(Object::from_addr(addr));
    visit(&borrowed);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_load_release_counts() {
        let obj = Object::new(42u32);
        let mut slot = [0u8; SLOT_SIZE];
        unsafe {
            store_slot(&mut slot, Some(&obj));
            assert_eq!(obj.strong_count(), 2);
            let loaded = load_slot(&slot).unwrap();
            assert!(Object::ptr_eq(&loaded, &obj));
            assert_eq!(obj.strong_count(), 3);
            drop(loaded);
            release_slot(&mut slot);
        }
        assert_eq!(obj.strong_count(), 1);
        assert_eq!(slot, [0u8; SLOT_SIZE]);
    }

    #[test]
    fn test_overwrite_releases_previous() {
        let a = Object::new("a");
        let b = Object::new("b");
        let mut slot = [0u8; SLOT_SIZE];
        unsafe {
            store_slot(&mut slot, Some(&a));
            store_slot(&mut slot, Some(&b));
        }
        assert_eq!(a.strong_count(), 1);
        assert_eq!(b.strong_count(), 2);
        unsafe { release_slot(&mut slot) };
        assert_eq!(b.strong_count(), 1);
    }

    #[test]
    fn test_visit_slot_borrows() {
        let obj = Object::new(1.5f64);
        let mut slot = [0u8; SLOT_SIZE];
        let mut seen = 0;
        unsafe {
            store_slot(&mut slot, Some(&obj));
            visit_slot(&slot, &mut |o| {
                assert_eq!(o.downcast_ref::<f64>(), Some(&1.5));
                seen += 1;
            });
            assert_eq!(obj.strong_count(), 2);
            release_slot(&mut slot);
        }
        assert_eq!(seen, 1);
        assert!(!unsafe { visit_slot(&slot, &mut |_| unreachable!()) });
    }
}
