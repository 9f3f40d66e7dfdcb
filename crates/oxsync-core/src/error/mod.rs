//! Error types for the oxsync-core crate
//!
//! This module re-exports all error types and their context structures so
//! callers can match on them without knowing which submodule raised them.

pub use crate::crypto::CryptoError;
pub use crate::fs::header::FormatError;
pub use crate::fs::name::{NameContext, NameError};
pub use crate::provider::error::{FileContext, ProviderError};
