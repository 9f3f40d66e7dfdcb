//! The narrow interface the synchronization engine calls into.
//!
//! Sessions never touch key material or the ciphertext format directly. They
//! hand a path, the two roots and their identity to a [`CryptoBoundary`], and
//! the provider derives the counterpart name, seals or opens, and writes.

pub mod error;
mod wallet_provider;

use std::path::{Path, PathBuf};

use crate::crypto::identity::{CryptoIdentity, PrivateKey, PublicIdentity, PublicKey};

pub use error::{FileContext, ProviderError};
pub use wallet_provider::WalletProvider;

/// Arguments of an encrypt call.
#[derive(Debug, Clone, Copy)]
pub struct EncryptRequest<'a> {
    /// Sealing identity (did + private key)
    pub sender: &'a CryptoIdentity,
    /// Identity the envelope is addressed to
    pub recipient: &'a PublicIdentity,
    /// Plaintext file the bytes were read from
    pub source_path: &'a Path,
    pub plaintext: &'a [u8],
    /// Root of the plaintext tree
    pub source_root: &'a Path,
    /// Root of the ciphertext tree
    pub dest_root: &'a Path,
}

/// Result of a decrypt call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// Plaintext was written to this path.
    Written(PathBuf),
    /// The plaintext at this path was already at least as new; nothing written.
    UpToDate(PathBuf),
}

impl DecryptOutcome {
    /// The written path, or `None` when nothing was produced.
    pub fn written_path(&self) -> Option<&Path> {
        match self {
            DecryptOutcome::Written(path) => Some(path),
            DecryptOutcome::UpToDate(_) => None,
        }
    }
}

/// Operations the engine needs from the crypto provider.
///
/// Implementations must be safe to call from both session threads; the engine
/// serializes calls through its gate but does not rely on that for memory safety.
pub trait CryptoBoundary: Send + Sync {
    /// Derive an identity deterministically from `seed`.
    fn generate_identity(&self, seed: &str) -> Result<CryptoIdentity, ProviderError>;

    /// Generate a fresh random identity.
    fn random_identity(&self) -> Result<CryptoIdentity, ProviderError>;

    /// Seal `plaintext` into the destination root. Returns the ciphertext path.
    fn encrypt_file(&self, request: &EncryptRequest<'_>) -> Result<PathBuf, ProviderError>;

    /// Open a ciphertext file and write its plaintext under `dest_root`.
    fn decrypt_file(
        &self,
        encrypted_path: &Path,
        private_key: &PrivateKey,
        public_key: &PublicKey,
        dest_root: &Path,
    ) -> Result<DecryptOutcome, ProviderError>;

    /// A plaintext file under `source_root` was removed: remove it and its
    /// ciphertext under `dest_root`.
    fn delete_plaintext_counterpart(
        &self,
        did: &str,
        path: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> Result<(), ProviderError>;

    /// A ciphertext file under `source_root` was removed: remove it and its
    /// plaintext under `dest_root`.
    fn delete_ciphertext_counterpart(
        &self,
        path: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> Result<(), ProviderError>;
}
