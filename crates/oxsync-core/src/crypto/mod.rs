//! Key material for oxsync identities and file envelopes

pub mod identity;
pub mod kdf;
pub mod wallet;

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
///
/// # Security Classification
///
/// Some errors indicate potential **adversarial tampering** or **integrity violations**.
/// They are marked with `[INTEGRITY VIOLATION]` and should never be retried blindly.
#[derive(Error, Debug)]
pub enum CryptoError {
    // =========================================================================
    // INTEGRITY VIOLATIONS - Potential adversarial tampering
    // =========================================================================
    /// AES-GCM tag verification failed while opening a sealed payload.
    ///
    /// **[INTEGRITY VIOLATION]** The envelope or its header was modified, or the
    /// wrong key pair was supplied.
    #[error("[INTEGRITY VIOLATION] Envelope authentication failed - tampered or wrong key pair")]
    OpenFailed,

    /// The envelope names a sender whose DID does not match the supplied public key.
    #[error("[INTEGRITY VIOLATION] Envelope sender {claimed} does not match the public key")]
    SenderMismatch { claimed: String },

    /// X25519 produced an all-zero shared secret (low-order peer public key).
    #[error("[INTEGRITY VIOLATION] Key agreement was not contributory - invalid peer key")]
    NonContributory,

    // =========================================================================
    // PROGRAMMING ERRORS - Invalid parameters or implementation bugs
    // =========================================================================
    /// Sealing failed unexpectedly.
    #[error("Failed to seal payload: {0}")]
    SealFailed(String),

    /// HKDF rejected the requested output length.
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(&'static str),

    /// Key material had the wrong size.
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Key material could not be decoded from its text form.
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),
}

// Re-export commonly used types
pub use identity::{CryptoIdentity, PrivateKey, PublicIdentity, PublicKey};
pub use wallet::{NameKeys, Wallet};
