// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Errors that reach callers.
//!
//! Remote-tier failures never appear here: they are absorbed by the fallback
//! layer (see [`RemoteError`](crate::storage::traits::RemoteError)). What is
//! left is either a configuration mistake or a local-tier failure.

use thiserror::Error;

/// Failure of the in-process tier. Fatal for the operation that hit it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalStoreError {
    #[error("entry of {bytes} bytes exceeds the local memory budget of {budget} bytes")]
    Oversized { bytes: usize, budget: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A cache name that is not in the policy table.
    #[error("unknown cache name '{0}'")]
    UnknownCacheName(String),

    #[error("invalid cache policy '{name}': {reason}")]
    InvalidPolicy { name: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("local cache failure: {0}")]
    LocalStore(#[from] LocalStoreError),
}

impl CacheError {
    /// Configuration errors must stop startup; they are never retried.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownCacheName(_) | Self::InvalidPolicy { .. } | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_name_is_configuration_error() {
        let err = CacheError::UnknownCacheName("bogus".into());
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "unknown cache name 'bogus'");
    }

    #[test]
    fn test_local_failure_converts() {
        let err: CacheError = LocalStoreError::Oversized { bytes: 10, budget: 5 }.into();
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("10 bytes"));
    }
}
