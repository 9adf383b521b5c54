//! Atomic share counting for [`SharedRef`](crate::SharedRef) pairs.

use std::process::abort;
use std::sync::atomic::Ordering::{Relaxed, Release, SeqCst};
use std::sync::atomic::{fence, AtomicUsize, Ordering};

/// A soft limit on the number of shares of one pair.
///
/// Going above this limit aborts the program, although not necessarily at
/// exactly `MAX_SHARES + 1` shares.
const MAX_SHARES: usize = isize::MAX as usize;

/// Atomic count of the live handles sharing one payload allocation.
///
/// Every handle copy goes through [`increase`](SharedCount::increase) and
/// every handle destruction through [`decrease`](SharedCount::decrease). The
/// single caller that observes the terminal decrement owns the pair
/// exclusively and frees it.
#[repr(transparent)]
#[derive(Debug)]
pub struct SharedCount(AtomicUsize);

impl SharedCount {
    /// Constructs a new count with one share.
    pub fn new() -> Self {
        Self(AtomicUsize::new(1))
    }

    /// Returns the current number of shares.
    ///
    /// The value is a snapshot for diagnostics; other threads may change it
    /// at any moment, so it must not drive ownership decisions.
    pub fn load(&self) -> usize {
        self.0.load(SeqCst)
    }

    /// Increases the share count by one.
    ///
    /// Aborts the program if the count is saturated.
    ///
    /// # Safety
    ///
    /// The caller must own a share of the pair guarded by this count.
    pub unsafe fn increase(&self) {
        // Relaxed suffices: a new share can only be created out of an
        // existing one, and handing a handle to another thread already
        // synchronizes.
        let old = self.0.fetch_add(1, Relaxed);

        // Saturation can only be reached by mem::forget-ing handles in a
        // loop; such a program gets aborted before the count can wrap and
        // cause an early free.
        if old > MAX_SHARES {
            abort();
        }
    }

    /// Decreases the share count by one.
    ///
    /// Returns `true` iff this was the terminal decrement, i.e. the count
    /// reached zero. Exactly one caller per pair observes `true`; it alone
    /// may free the pair. The Acquire fence issued on that path orders the
    /// frees after every other handle's last payload use.
    ///
    /// # Safety
    ///
    /// The caller must own a share of the pair guarded by this count and
    /// gives it up by calling this.
    pub unsafe fn decrease(&self) -> bool {
        // Release publishes this handle's payload accesses to the thread
        // that ends up performing the free.
        let old = self.0.fetch_sub(1, Release);
        debug_assert!(old != 0, "share count underflow");
        if old != 1 {
            return false;
        }

        // Pairs with the Release decrements of all other handles, so their
        // payload use happens-before the free.
        fence(Ordering::Acquire);
        true
    }
}

impl Default for SharedCount {
    fn default() -> Self {
        Self::new()
    }
}
