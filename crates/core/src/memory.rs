//! Memory accounting for the interpreter
//!
//! The VM owns every object it ever allocates through a [`Heap`], which
//! registers each allocation, keeps a per-heap byte total, and releases
//! everything at once when the heap is dropped. A pair of process-wide
//! atomic counters tracks bytes currently in use and the peak high-water
//! mark, updated by heaps and by chunk buffer growth.
//!
//! Growable buffers (chunk code and line arrays) follow a doubling policy
//! with a floor of eight entries.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::value::{Object, Value};

/// Smallest capacity a growable buffer starts with.
pub const MIN_CAPACITY: usize = 8;

/// Doubling growth policy: 0 -> 8 -> 16 -> 32 -> ...
pub fn grow_capacity(capacity: usize) -> usize {
    if capacity < MIN_CAPACITY {
        MIN_CAPACITY
    } else {
        capacity * 2
    }
}

/// Bytes currently tracked as allocated, process-wide.
static ALLOCATED: AtomicUsize = AtomicUsize::new(0);

/// Peak value of [`ALLOCATED`].
static PEAK: AtomicUsize = AtomicUsize::new(0);

/// Record `bytes` newly allocated and refresh the high-water mark.
pub fn track_alloc(bytes: usize) {
    let current = ALLOCATED.fetch_add(bytes, Ordering::Relaxed) + bytes;

    // Peak update via CAS loop: another thread may race us upward.
    let mut peak = PEAK.load(Ordering::Relaxed);
    while current > peak {
        match PEAK.compare_exchange_weak(peak, current, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => peak = observed,
        }
    }
}

/// Record `bytes` released. Saturates at zero rather than wrapping.
pub fn track_release(bytes: usize) {
    let _ = ALLOCATED.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(bytes))
    });
}

/// Bytes currently in use across all live heaps and chunk buffers.
pub fn allocated_bytes() -> usize {
    ALLOCATED.load(Ordering::Relaxed)
}

/// High-water mark of [`allocated_bytes`] for this process.
pub fn peak_allocated_bytes() -> usize {
    PEAK.load(Ordering::Relaxed)
}

/// Estimated heap footprint of one object, header plus owned payload.
///
/// Chunk buffers account for themselves as they grow, so a function here
/// contributes only its fixed-size parts and defaults array.
fn object_size(object: &Object) -> usize {
    let payload = match object {
        Object::Str(s) => s.as_str().len(),
        Object::Function(f) => {
            std::mem::size_of::<crate::value::Function>()
                + f.name.as_ref().map_or(0, |n| n.len())
                + f.defaults.len() * std::mem::size_of::<Value>()
        }
        Object::Exception(e) => e.name.len() + e.message.len(),
        _ => 0,
    };
    std::mem::size_of::<Object>() + payload
}

/// Owner of every object allocated by one compile-and-run pipeline.
///
/// `alloc` registers the object and hands back a cheap counted handle; the
/// registry keeps each object alive until the heap itself is dropped, at
/// which point the whole population is released and the process counters
/// are rolled back.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Value>,
    bytes: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `object` into the heap and return a handle to it.
    pub fn alloc(&mut self, object: Object) -> Value {
        let bytes = object_size(&object);
        track_alloc(bytes);
        self.bytes += bytes;

        let value: Value = Rc::new(object);
        self.objects.push(value.clone());
        value
    }

    /// Every object this heap owns, in allocation order.
    pub fn objects(&self) -> impl Iterator<Item = &Value> {
        self.objects.iter()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Bytes attributed to this heap's objects.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        track_release(self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::JaplString;

    #[test]
    fn test_grow_capacity_policy() {
        assert_eq!(grow_capacity(0), 8);
        assert_eq!(grow_capacity(7), 8);
        assert_eq!(grow_capacity(8), 16);
        assert_eq!(grow_capacity(16), 32);
    }

    #[test]
    fn test_heap_registers_allocations() {
        let mut heap = Heap::new();
        assert!(heap.is_empty());

        let a = heap.alloc(Object::Int(1));
        let b = heap.alloc(Object::Str(JaplString::new("hello".to_string())));
        assert_eq!(heap.len(), 2);
        assert!(heap.bytes() > 0);

        // The registry and the returned handles reference the same objects.
        let registered: Vec<_> = heap.objects().collect();
        assert!(registered.iter().any(|v| Rc::ptr_eq(v, &a)));
        assert!(registered.iter().any(|v| Rc::ptr_eq(v, &b)));
    }

    #[test]
    fn test_counters_track_heap_bytes() {
        let mut heap = Heap::new();
        heap.alloc(Object::Str(JaplString::new("x".repeat(1024))));
        assert!(heap.bytes() >= 1024);
        assert!(allocated_bytes() >= heap.bytes());
        assert!(peak_allocated_bytes() >= heap.bytes());
    }
}
