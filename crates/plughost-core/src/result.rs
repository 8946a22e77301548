//! Result alias used across the host.

use crate::error::HostError;

/// Convenience alias for results carrying a [`HostError`].
pub type HostResult<T> = Result<T, HostError>;
