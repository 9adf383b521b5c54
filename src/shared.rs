//! Definition of the shared-ownership handle type.

use std::fmt::{Debug, Display, Formatter, Pointer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::count::SharedCount;
use crate::error::EmptyRefAccess;
use crate::heap;

#[cfg(test)]
mod test;

/// A value-like handle sharing ownership of a heap-allocated payload.
///
/// A non-empty handle points at a pair of heap allocations: the payload and
/// an atomic [`SharedCount`]. Cloning the handle shares the same pair and
/// increments the count; destroying it decrements the count; the handle
/// whose decrement brings the count to zero frees both allocations. Both
/// pointers exist together or not at all.
///
/// The empty state (see [`SharedRef::empty`]) owns nothing and is the
/// default. Checked accessors report [`EmptyRefAccess`] on an empty handle
/// rather than dereferencing it.
///
/// Only the share bookkeeping is synchronized. Reading the payload from
/// several threads is fine; mutating it concurrently is a data race the
/// caller must prevent, which is why [`SharedRef::get_mut_ref`] and
/// [`SharedRef::set`] are `unsafe`.
///
/// Most operations are associated functions, so that they never shadow
/// methods of the payload reachable through [`Deref`].
///
/// # Examples
///
/// ```
/// use shared_ref::SharedRef;
///
/// let first = SharedRef::new(42);
/// let second = first.clone();
/// assert_eq!(SharedRef::share_count(&first), 2);
///
/// drop(first);
/// assert_eq!(*second, 42);
/// assert_eq!(SharedRef::share_count(&second), 1);
/// ```
pub struct SharedRef<T> {
    pair: Option<Pair<T>>,
}

/// The shared allocations of one non-empty handle.
///
/// Holding a `Pair` means holding one accounted share of it.
struct Pair<T> {
    payload: NonNull<T>,
    count: NonNull<SharedCount>,
    _marker: PhantomData<T>,
}

impl<T> Clone for Pair<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Pair<T> {}

impl<T> SharedRef<T> {
    /// Constructs an empty handle, owning nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let empty = SharedRef::<i32>::empty();
    /// assert!(SharedRef::is_null(&empty));
    /// assert_eq!(SharedRef::share_count(&empty), 0);
    /// ```
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self { pair: None }
    }

    /// Allocates a payload on the heap, moves `value` into it and owns it
    /// with a fresh count of one.
    ///
    /// Allocation failure of either the payload or the count is fatal to the
    /// process; the handle is never observable with only one of the two
    /// allocations.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let five = SharedRef::new(5);
    /// assert_eq!(SharedRef::share_count(&five), 1);
    /// ```
    pub fn new(value: T) -> Self {
        let payload = heap::alloc_one::<T>();
        // Safety: fresh allocation, valid for a single write of `T`.
        unsafe { payload.as_ptr().write(value) };

        let count = heap::alloc_one::<SharedCount>();
        // Safety: fresh allocation, valid for a single write.
        unsafe { count.as_ptr().write(SharedCount::new()) };

        log::trace!("allocated shared pair (payload {:p})", payload);
        Self {
            pair: Some(Pair {
                payload,
                count,
                _marker: PhantomData,
            }),
        }
    }

    /// Takes over an already-allocated payload and owns it with a fresh
    /// count of one.
    ///
    /// The payload allocation is adopted as-is, without copying the value;
    /// only the count is allocated here, with the same fatal-on-failure
    /// policy as [`new`](SharedRef::new).
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let handle = SharedRef::from_box(Box::new(5));
    /// assert_eq!(*handle, 5);
    /// assert_eq!(SharedRef::share_count(&handle), 1);
    /// ```
    pub fn from_box(payload: Box<T>) -> Self {
        // A boxed payload has the exact allocation this handle frees.
        let payload = NonNull::from(Box::leak(payload));

        let count = heap::alloc_one::<SharedCount>();
        // Safety: fresh allocation, valid for a single write.
        unsafe { count.as_ptr().write(SharedCount::new()) };

        log::trace!("adopted boxed payload ({:p})", payload);
        Self {
            pair: Some(Pair {
                payload,
                count,
                _marker: PhantomData,
            }),
        }
    }

    /// Adopts an already-allocated payload and count as-is, without touching
    /// the count.
    ///
    /// This is the hand-off constructor: the supplier has already arranged
    /// the accounting, e.g. by splitting a handle with
    /// [`into_raw_parts`](SharedRef::into_raw_parts).
    ///
    /// # Safety
    ///
    /// - `payload` and `count` must originate from the same handle's
    ///   [`into_raw_parts`](SharedRef::into_raw_parts) (or allocations with
    ///   identical layouts and provenance), with the payload initialized.
    /// - The count must already include the share this handle takes over;
    ///   adopting the same share twice frees the pair twice.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let first = SharedRef::new(7);
    /// let parts = SharedRef::into_raw_parts(first.clone()).unwrap();
    ///
    /// // Safety: the parts carry the share `into_raw_parts` detached.
    /// let second = unsafe { SharedRef::from_raw_parts(parts.0, parts.1) };
    /// assert_eq!(SharedRef::share_count(&second), 2);
    /// assert!(SharedRef::ptr_eq(&first, &second));
    /// ```
    #[inline]
    pub unsafe fn from_raw_parts(payload: NonNull<T>, count: NonNull<SharedCount>) -> Self {
        Self {
            pair: Some(Pair {
                payload,
                count,
                _marker: PhantomData,
            }),
        }
    }

    /// Consumes the handle, returning its raw payload and count pointers
    /// without decrementing the count, or [`None`] if the handle is empty.
    ///
    /// The detached share must eventually be re-adopted with
    /// [`from_raw_parts`](SharedRef::from_raw_parts), or the pair leaks.
    #[inline]
    pub fn into_raw_parts(mut this: Self) -> Option<(NonNull<T>, NonNull<SharedCount>)> {
        let pair = this.pair.take();
        std::mem::forget(this);
        pair.map(|pair| (pair.payload, pair.count))
    }

    /// Returns `true` if the handle is empty.
    ///
    /// This is the null-sentinel comparison: it only inspects emptiness,
    /// never the payload value.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let mut handle = SharedRef::new(3);
    /// assert!(!SharedRef::is_null(&handle));
    ///
    /// SharedRef::release(&mut handle);
    /// assert!(SharedRef::is_null(&handle));
    /// ```
    #[inline]
    #[must_use]
    pub fn is_null(this: &Self) -> bool {
        this.pair.is_none()
    }

    /// Returns the number of live handles currently sharing this pair, or 0
    /// for an empty handle.
    ///
    /// The count is a diagnostic snapshot; with handles on other threads it
    /// may be stale by the time it is read.
    #[inline]
    pub fn share_count(this: &Self) -> usize {
        match &this.pair {
            // Safety: a live handle keeps its count allocation alive.
            Some(pair) => unsafe { pair.count.as_ref() }.load(),
            None => 0,
        }
    }

    /// Returns `true` if the two handles share the same pair.
    ///
    /// Two empty handles compare equal; an empty handle never shares a pair
    /// with a non-empty one.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let five = SharedRef::new(5);
    /// let same_five = five.clone();
    /// let other_five = SharedRef::new(5);
    ///
    /// assert!(SharedRef::ptr_eq(&five, &same_five));
    /// assert!(!SharedRef::ptr_eq(&five, &other_five));
    /// ```
    #[inline]
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        match (&this.pair, &other.pair) {
            // The count allocation identifies the pair: zero-sized payloads
            // of independent pairs all share one dangling address, while a
            // count is never zero-sized.
            (Some(a), Some(b)) => a.count.as_ptr() == b.count.as_ptr(),
            (None, None) => true,
            _ => false,
        }
    }

    /// Borrows the payload.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyRefAccess`] if the handle is empty.
    #[inline]
    pub fn get_ref(this: &Self) -> Result<&T, EmptyRefAccess> {
        match &this.pair {
            // Safety: a live handle keeps the payload allocation alive, and
            // no safe API hands out aliasing mutable borrows.
            Some(pair) => Ok(unsafe { pair.payload.as_ref() }),
            None => Err(EmptyRefAccess),
        }
    }

    /// Returns a copy of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyRefAccess`] if the handle is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let handle = SharedRef::new(String::from("abc"));
    /// let copy = SharedRef::get_copy(&handle).unwrap();
    /// assert_eq!(copy, "abc");
    /// ```
    #[inline]
    pub fn get_copy(this: &Self) -> Result<T, EmptyRefAccess>
    where
        T: Clone,
    {
        SharedRef::get_ref(this).cloned()
    }

    /// Mutably borrows the payload.
    ///
    /// The count is not consulted: the payload may be shared with other
    /// handles, possibly on other threads.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyRefAccess`] if the handle is empty.
    ///
    /// # Safety
    ///
    /// For the duration of the borrow no other access to the payload may
    /// happen through any handle sharing this pair, on any thread.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let handle = SharedRef::new(String::new());
    /// // Safety: no other payload access while the borrow lives.
    /// unsafe { SharedRef::get_mut_ref(&handle).unwrap().push_str("foo") };
    /// assert_eq!(*handle, "foo");
    /// ```
    #[inline]
    pub unsafe fn get_mut_ref(this: &Self) -> Result<&mut T, EmptyRefAccess> {
        match &this.pair {
            // Safety: the payload allocation is live; exclusivity of the
            // borrow is the caller's contract.
            Some(pair) => Ok(unsafe { &mut *pair.payload.as_ptr() }),
            None => Err(EmptyRefAccess),
        }
    }

    /// Overwrites the payload in place, dropping the old value.
    ///
    /// This mutates the pointee, not the binding: the count is untouched and
    /// every handle sharing the pair observes the new value.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyRefAccess`] if the handle is empty.
    ///
    /// # Safety
    ///
    /// No other access to the payload may happen through any handle sharing
    /// this pair while the write runs, on any thread.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let handle = SharedRef::new(1);
    /// let alias = handle.clone();
    /// // Safety: no concurrent payload access.
    /// unsafe { SharedRef::set(&handle, 2).unwrap() };
    /// assert_eq!(*alias, 2);
    /// assert_eq!(SharedRef::share_count(&alias), 2);
    /// ```
    #[inline]
    pub unsafe fn set(this: &Self, value: T) -> Result<(), EmptyRefAccess> {
        match &this.pair {
            Some(pair) => {
                // Safety: the payload allocation is live and initialized;
                // exclusivity of the write is the caller's contract.
                unsafe { *pair.payload.as_ptr() = value };
                Ok(())
            }
            None => Err(EmptyRefAccess),
        }
    }

    /// Gives up this handle's share of the pair and leaves the handle empty.
    ///
    /// If this was the last share, the count is freed first and then the
    /// payload is dropped and freed. Otherwise nothing beyond the decrement
    /// happens; another thread may be freeing the pair concurrently.
    ///
    /// Releasing an already-empty handle is a no-op, so an explicit release
    /// followed by the scope-exit drop is safe.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_ref::SharedRef;
    ///
    /// let mut handle = SharedRef::new(9);
    /// SharedRef::release(&mut handle);
    /// assert!(SharedRef::is_null(&handle));
    ///
    /// // Second release detects the empty handle and does nothing.
    /// SharedRef::release(&mut handle);
    /// ```
    pub fn release(this: &mut Self) {
        let Some(pair) = this.pair.take() else {
            return;
        };

        // Safety: the handle owned a share of the pair until this point.
        let last = unsafe { pair.count.as_ref().decrease() };
        if !last {
            return;
        }

        // Safety: the terminal decrement left us sole owner of the pair.
        unsafe { SharedRef::free_pair(pair) };
    }

    /// Frees the pair, count first, then the payload.
    ///
    /// # Safety
    ///
    /// Only the owner of the terminal decrement may call this, exactly once
    /// per pair.
    #[inline(never)]
    unsafe fn free_pair(pair: Pair<T>) {
        log::trace!("freeing shared pair (payload {:p})", pair.payload);

        // Safety: no live handle references the pair anymore; the count is
        // plain data, the payload is initialized and dropped exactly here.
        unsafe {
            heap::dealloc_one(pair.count);
            std::ptr::drop_in_place(pair.payload.as_ptr());
            heap::dealloc_one(pair.payload);
        }
    }
}

// Safety: sending a handle moves both read access (`T: Sync` on the source
// thread's remaining handles) and the potential last-drop of `T` (`T: Send`)
// across threads, same as an `Arc`.
unsafe impl<T: Send + Sync> Send for SharedRef<T> {}

// Safety: `&SharedRef<T>` only exposes `&T` and the atomic count; sharing it
// across threads needs `T: Sync`, and a clone taken through it can become the
// last owner on another thread, needing `T: Send`.
unsafe impl<T: Send + Sync> Sync for SharedRef<T> {}

impl<T> Clone for SharedRef<T> {
    /// Makes another handle to the same pair, incrementing the count.
    ///
    /// Cloning an empty handle yields an empty handle. The increment happens
    /// before the clone exists, so a handle assigned over its own clone
    /// (`h = h.clone()`) never observes a dead pair.
    #[inline]
    fn clone(&self) -> Self {
        if let Some(pair) = &self.pair {
            // Safety: we hold a live share of the pair.
            unsafe { pair.count.as_ref().increase() };
        }
        Self { pair: self.pair }
    }
}

impl<T> Drop for SharedRef<T> {
    #[inline]
    fn drop(&mut self) {
        SharedRef::release(self);
    }
}

impl<T> Default for SharedRef<T> {
    /// The empty handle.
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for SharedRef<T> {
    #[inline]
    fn from(value: T) -> Self {
        SharedRef::new(value)
    }
}

impl<T> Deref for SharedRef<T> {
    type Target = T;

    /// Shared member access to the payload.
    ///
    /// # Panics
    ///
    /// Panics if the handle is empty. Use [`SharedRef::get_ref`] for the
    /// checked form.
    #[inline]
    fn deref(&self) -> &T {
        match SharedRef::get_ref(self) {
            Ok(payload) => payload,
            Err(_) => panic!("dereferenced an empty shared reference"),
        }
    }
}

impl<T: PartialEq> PartialEq for SharedRef<T> {
    /// Deep value equality of the payloads, not pair identity.
    ///
    /// Two empty handles are equal; an empty handle never equals a non-empty
    /// one.
    fn eq(&self, other: &Self) -> bool {
        match (SharedRef::get_ref(self), SharedRef::get_ref(other)) {
            (Ok(a), Ok(b)) => a == b,
            (Err(_), Err(_)) => true,
            _ => false,
        }
    }
}

impl<T: Eq> Eq for SharedRef<T> {}

impl<T: Hash> Hash for SharedRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match SharedRef::get_ref(self) {
            Ok(payload) => {
                state.write_u8(1);
                payload.hash(state);
            }
            Err(_) => state.write_u8(0),
        }
    }
}

impl<T: Debug> Debug for SharedRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match SharedRef::get_ref(self) {
            Ok(payload) => Debug::fmt(payload, f),
            Err(_) => f.write_str("<nil>"),
        }
    }
}

impl<T: Display> Display for SharedRef<T> {
    /// Renders the payload; an empty handle renders `<nil>`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match SharedRef::get_ref(self) {
            Ok(payload) => Display::fmt(payload, f),
            Err(_) => f.write_str("<nil>"),
        }
    }
}

impl<T> Pointer for SharedRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ptr = match &self.pair {
            Some(pair) => pair.payload.as_ptr(),
            None => std::ptr::null_mut(),
        };
        Pointer::fmt(&ptr, f)
    }
}
