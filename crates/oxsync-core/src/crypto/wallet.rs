//! Process-local DID wallet.
//!
//! Maps each registered DID to the keys used for its ciphertext names. The
//! ciphertext header only carries the DID (`key_id`), never key material, so a
//! decrypting session resolves the name keys here.

use std::sync::Arc;

use dashmap::DashMap;
use ring::hmac;
use tracing::debug;
use zeroize::Zeroizing;

use super::CryptoError;
use super::identity::CryptoIdentity;
use super::kdf::hkdf_sha256;

/// AES-SIV-256 takes a 512-bit key (MAC key || encryption key).
pub const SIV_KEY_LENGTH: usize = 64;

const NAME_KEY_SALT: &[u8] = b"oxsync-name-keys-v1";

/// Keys for hashing and encrypting the relative names of one identity's files.
#[derive(Clone)]
pub struct NameKeys {
    hmac_key: hmac::Key,
    siv_key: Zeroizing<[u8; SIV_KEY_LENGTH]>,
}

impl NameKeys {
    /// Derive name keys from an identity's private key.
    pub fn derive(identity: &CryptoIdentity) -> Result<Self, CryptoError> {
        let ikm = identity.private_key().expose();
        let hmac_bytes = hkdf_sha256::<32>(NAME_KEY_SALT, ikm, b"name hmac")?;
        let siv_key = hkdf_sha256::<SIV_KEY_LENGTH>(NAME_KEY_SALT, ikm, b"name siv")?;
        Ok(Self {
            hmac_key: hmac::Key::new(hmac::HMAC_SHA256, &hmac_bytes[..]),
            siv_key,
        })
    }

    pub(crate) fn hmac_key(&self) -> &hmac::Key {
        &self.hmac_key
    }

    pub(crate) fn siv_key(&self) -> &[u8; SIV_KEY_LENGTH] {
        &self.siv_key
    }
}

impl std::fmt::Debug for NameKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NameKeys(<redacted>)")
    }
}

/// DID → name keys. Shared by every session in the process.
#[derive(Debug, Default)]
pub struct Wallet {
    keys: DashMap<String, Arc<NameKeys>>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity, deriving its name keys. Re-registering is a no-op.
    pub fn register(&self, identity: &CryptoIdentity) -> Result<Arc<NameKeys>, CryptoError> {
        if let Some(existing) = self.keys.get(identity.did()) {
            return Ok(Arc::clone(existing.value()));
        }
        let keys = Arc::new(NameKeys::derive(identity)?);
        debug!(did = %identity.did(), "Registered identity in wallet");
        Ok(Arc::clone(
            self.keys
                .entry(identity.did().to_string())
                .or_insert(keys)
                .value(),
        ))
    }

    pub fn name_keys(&self, did: &str) -> Option<Arc<NameKeys>> {
        self.keys.get(did).map(|entry| Arc::clone(entry.value()))
    }

    /// Every registered DID with its keys, for counterpart lookups without a header.
    pub fn all_name_keys(&self) -> Vec<(String, Arc<NameKeys>)> {
        self.keys
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
