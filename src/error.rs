//! Errors reported by checked payload access.

use thiserror::Error;

/// The error returned when using the payload of an empty handle.
///
/// An empty [`SharedRef`](crate::SharedRef) owns nothing; every checked
/// accessor reports this error instead of reading through the missing
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("accessed the payload of an empty shared reference")]
pub struct EmptyRefAccess;
