//! Crypto boundary for oxsync.
//!
//! This crate owns everything the synchronization engine treats as an external
//! collaborator: X25519 identities, the process-local DID wallet, the sealed
//! ciphertext file format and the naming convention that links a plaintext file
//! to its ciphertext counterpart.
//!
//! The engine only talks to it through [`CryptoBoundary`].

pub mod crypto;
pub mod error;
pub mod fs;
pub mod provider;

pub use crypto::identity::{CryptoIdentity, PrivateKey, PublicIdentity, PublicKey, REFERENCE_SEED};
pub use provider::{CryptoBoundary, DecryptOutcome, EncryptRequest, WalletProvider};
