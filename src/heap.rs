//! Heap allocation of single values with a fail-fast failure policy.
//!
//! A failed allocation is not recoverable here: it escalates to
//! [`handle_alloc_error`], which terminates the process. A half-constructed
//! payload/count pair would break the handle invariants, so no partial state
//! ever becomes observable.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

/// Allocates room for a single `T` on the heap.
///
/// Zero-sized types do not allocate and yield a dangling, well-aligned
/// pointer. Never returns null; allocation failure is fatal.
pub(crate) fn alloc_one<T>() -> NonNull<T> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return NonNull::dangling();
    }

    // Safety: the layout has non-zero size.
    let ptr = unsafe { alloc(layout) };
    match NonNull::new(ptr.cast::<T>()) {
        Some(ptr) => ptr,
        None => handle_alloc_error(layout),
    }
}

/// Releases an allocation obtained from [`alloc_one`].
///
/// Does not drop the pointee.
///
/// # Safety
///
/// `ptr` must come from [`alloc_one::<T>`](alloc_one) and must not be used
/// afterwards.
pub(crate) unsafe fn dealloc_one<T>(ptr: NonNull<T>) {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return;
    }

    // Safety: allocated by `alloc_one` with this same layout.
    unsafe { dealloc(ptr.as_ptr().cast(), layout) };
}
