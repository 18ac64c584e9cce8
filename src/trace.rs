//! Reference tracing for storages whose elements are managed references.
//!
//! A [`ScanDescriptor`] records `{length, step, address}`: `length` reference
//! slots spaced `step` bytes apart starting at `address`. The owning storage
//! keeps `length` at the element count while the buffer is live and zeroes it
//! under the descriptor lock before the buffer is freed, so a collection pass
//! racing with finalization sees either a live buffer or an empty descriptor.

use std::sync::{Arc, Weak};

use strided_dtype::object::{self, SLOT_SIZE};
use strided_dtype::Object;

#[derive(Debug)]
struct ScanState {
    length: usize,
    step: usize,
    address: usize,
}

/// Out-of-band record telling a tracer where the references of one storage live.
#[derive(Debug)]
pub struct ScanDescriptor {
    state: spin::Mutex<ScanState>,
}

impl ScanDescriptor {
    pub(crate) fn new(address: usize, length: usize, step: usize) -> Arc<Self> {
        Arc::new(Self {
            state: spin::Mutex::new(ScanState {
                length,
                step,
                address,
            }),
        })
    }

    pub fn length(&self) -> usize {
        self.state.lock().length
    }

    pub fn step(&self) -> usize {
        self.state.lock().step
    }

    pub fn address(&self) -> usize {
        self.state.lock().address
    }

    /// Visit every non-null reference; returns how many were visited.
    fn scan(&self, visit: &mut dyn FnMut(&Object)) -> usize {
        let state = self.state.lock();
        let mut visited = 0;
        for i in 0..state.length {
            let addr = state.address + i * state.step;
            // SAFETY: while `length` is non-zero the buffer is live, and the
            // lock keeps finalization from freeing it under us.
            let slot = unsafe { std::slice::from_raw_parts(addr as *const u8, SLOT_SIZE) };
            if unsafe { object::visit_slot(slot, visit) } {
                visited += 1;
            }
        }
        visited
    }

    /// Release every reference, then zero `length`. Must run before the
    /// buffer behind `address` is freed.
    pub(crate) fn finalize(&self) {
        let mut state = self.state.lock();
        for i in 0..state.length {
            let addr = state.address + i * state.step;
            // SAFETY: the owning storage calls this exactly once, before
            // deallocating, and holds the only remaining handle to the buffer.
            let slot = unsafe { std::slice::from_raw_parts_mut(addr as *mut u8, SLOT_SIZE) };
            unsafe { object::release_slot(slot) };
        }
        state.length = 0;
    }

    /// Stop tracing without touching the slots.
    pub(crate) fn retire(&self) {
        self.state.lock().length = 0;
    }
}

/// Statistics from one [`Tracer::collect`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub descriptors: usize,
    pub references: usize,
}

/// Registry of scan descriptors, walked once per collection cycle.
#[derive(Debug)]
pub struct Tracer {
    registry: spin::Mutex<Vec<Weak<ScanDescriptor>>>,
}

/// Tracer used by allocations that do not name one explicitly.
pub static GLOBAL_TRACER: Tracer = Tracer::new();

impl Tracer {
    pub const fn new() -> Self {
        Self {
            registry: spin::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, descriptor: &Arc<ScanDescriptor>) {
        log::trace!(
            "registering scan descriptor: {} slots at {:#x}",
            descriptor.length(),
            descriptor.address()
        );
        let mut registry = self.registry.lock();
        registry.retain(|w| w.strong_count() > 0);
        registry.push(Arc::downgrade(descriptor));
    }

    /// Number of descriptors whose storage is still live.
    pub fn live_descriptors(&self) -> usize {
        self.registry
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|d| d.length() > 0)
            .count()
    }

    /// Visit every reference held by every live storage, each storage once.
    ///
    /// Descriptors of released storages are dropped from the registry.
    ///
    /// The descriptor locks order a collection only against finalization,
    /// not against element stores: slot writes go straight to the buffer.
    /// A collection running on another thread must therefore stop every
    /// thread that writes object elements for the duration of the pass.
    pub fn collect(&self, mut visit: impl FnMut(&Object)) -> CollectStats {
        let live: Vec<Arc<ScanDescriptor>> = {
            let mut registry = self.registry.lock();
            registry.retain(|w| w.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };
        let mut stats = CollectStats::default();
        for descriptor in live {
            if descriptor.length() == 0 {
                continue;
            }
            stats.descriptors += 1;
            stats.references += descriptor.scan(&mut visit);
        }
        log::trace!(
            "collection visited {} references in {} storages",
            stats.references,
            stats.descriptors
        );
        stats
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_zeroes_length_and_releases() {
        let obj = Object::new(3u8);
        let mut buf = vec![0u8; 2 * SLOT_SIZE];
        unsafe { object::store_slot(&mut buf[SLOT_SIZE..], Some(&obj)) };
        assert_eq!(obj.strong_count(), 2);

        let desc = ScanDescriptor::new(buf.as_ptr() as usize, 2, SLOT_SIZE);
        let tracer = Tracer::new();
        tracer.register(&desc);

        let mut seen = Vec::new();
        let stats = tracer.collect(|o| seen.push(o.clone()));
        assert_eq!(stats, CollectStats { descriptors: 1, references: 1 });
        assert!(Object::ptr_eq(&seen[0], &obj));
        drop(seen);

        desc.finalize();
        assert_eq!(desc.length(), 0);
        assert_eq!(obj.strong_count(), 1);
        assert_eq!(tracer.collect(|_| unreachable!()).descriptors, 0);
    }

    #[test]
    fn test_dead_descriptors_pruned() {
        let tracer = Tracer::new();
        let buf = vec![0u8; SLOT_SIZE];
        let desc = ScanDescriptor::new(buf.as_ptr() as usize, 1, SLOT_SIZE);
        tracer.register(&desc);
        assert_eq!(tracer.live_descriptors(), 1);
        drop(desc);
        assert_eq!(tracer.live_descriptors(), 0);
        assert_eq!(tracer.collect(|_| {}), CollectStats::default());
        assert!(tracer.registry.lock().is_empty());
    }

    #[test]
    fn test_register_prunes_dead_entries() {
        let tracer = Tracer::new();
        let buf = vec![0u8; SLOT_SIZE];
        for _ in 0..16 {
            let desc = ScanDescriptor::new(buf.as_ptr() as usize, 1, SLOT_SIZE);
            tracer.register(&desc);
        }
        let kept = ScanDescriptor::new(buf.as_ptr() as usize, 1, SLOT_SIZE);
        tracer.register(&kept);
        assert_eq!(tracer.registry.lock().len(), 1);
        assert_eq!(tracer.live_descriptors(), 1);
    }
}
