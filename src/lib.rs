//! Shared-ownership handles for runtime-managed heap values.
//!
//! The core type, [`SharedRef`], is a value-like handle over a pair of heap
//! allocations: a payload and an atomic share count. Every clone shares the
//! same pair and bumps the count; every destruction decrements it; the one
//! handle that observes the terminal decrement frees both allocations,
//! exactly once, without any external lock.
//!
//! Handles have a distinguished empty state that owns nothing. Accessors
//! are checked: using the payload of an empty handle reports
//! [`EmptyRefAccess`] instead of reading through a null pointer.
//!
//! Only the ownership bookkeeping is synchronized. Mutating the payload's
//! contents from handles on different threads is a data race unless the
//! caller brings its own discipline; the mutation accessors are `unsafe`
//! for that reason.
//!
//! # Examples
//!
//! ```
//! use shared_ref::SharedRef;
//!
//! let first = SharedRef::new(42);
//! let second = first.clone();
//! assert_eq!(SharedRef::share_count(&first), 2);
//!
//! drop(first);
//! assert_eq!(*second, 42);
//! assert_eq!(SharedRef::share_count(&second), 1);
//! ```
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    rustdoc::broken_intra_doc_links
)]

pub mod count;
pub mod error;
mod heap;
pub mod shared;

pub use count::SharedCount;
pub use error::EmptyRefAccess;
pub use shared::SharedRef;
