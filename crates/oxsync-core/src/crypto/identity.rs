//! X25519 identities and their `did:key` identifiers.
//!
//! An identity is the (did, public key, private key) triple that one sync
//! direction uses to seal or open file envelopes. Identities are immutable once
//! created and owned by exactly one session.

#![forbid(unsafe_code)]

use std::fmt;

use data_encoding::BASE64URL_NOPAD;
use rand::RngCore;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use super::CryptoError;
use super::kdf::hkdf_sha256;

/// Length of X25519 public and private keys in bytes.
pub const X25519_KEY_LENGTH: usize = 32;

/// Seed used by the reference deployment so both directions derive the same identity.
///
/// Only meant for tests and reference parity. Real deployments must use
/// [`CryptoIdentity::random`] or an externally managed key.
pub const REFERENCE_SEED: &str = "6QN8DfuN9hjgHgPvLXqgzqYE3jRRGRrmJQZkd5tL8paR";

/// Multicodec prefix for `x25519-pub` (0xec, varint encoded).
const MULTICODEC_X25519_PUB: [u8; 2] = [0xec, 0x01];

/// Multibase prefix for unpadded base64url.
const MULTIBASE_BASE64URL: char = 'u';

const IDENTITY_SALT: &[u8] = b"oxsync-identity-v1";
const IDENTITY_INFO: &[u8] = b"x25519 static secret";

/// An X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; X25519_KEY_LENGTH]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LENGTH] {
        &self.0
    }

    /// Unpadded base64url text form.
    pub fn to_base64(&self) -> String {
        BASE64URL_NOPAD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64URL_NOPAD
            .decode(encoded.as_bytes())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let actual = bytes.len();
        let bytes: [u8; X25519_KEY_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: X25519_KEY_LENGTH,
                actual,
            })?;
        Ok(Self(bytes))
    }

    /// The `did:key` identifier for this key.
    pub fn did(&self) -> String {
        let mut multicodec = Vec::with_capacity(MULTICODEC_X25519_PUB.len() + X25519_KEY_LENGTH);
        multicodec.extend_from_slice(&MULTICODEC_X25519_PUB);
        multicodec.extend_from_slice(&self.0);
        format!("did:key:{MULTIBASE_BASE64URL}{}", BASE64URL_NOPAD.encode(&multicodec))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_base64()).finish()
    }
}

/// An X25519 private key. Zeroized on drop and never printed.
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<[u8; X25519_KEY_LENGTH]>);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(*self.0);
        PublicKey(x25519_dalek::PublicKey::from(&secret).to_bytes())
    }

    /// Static-static X25519 agreement with a peer public key.
    pub fn diffie_hellman(
        &self,
        peer: &PublicKey,
    ) -> Result<Zeroizing<[u8; X25519_KEY_LENGTH]>, CryptoError> {
        let secret = StaticSecret::from(*self.0);
        let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer.0));
        if !shared.was_contributory() {
            return Err(CryptoError::NonContributory);
        }
        Ok(Zeroizing::new(*shared.as_bytes()))
    }

    /// Raw key bytes, for deriving further key material.
    pub(crate) fn expose(&self) -> &[u8; X25519_KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// The shareable half of an identity: what a peer needs to seal for us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdentity {
    pub did: String,
    pub public_key: PublicKey,
}

/// A full identity: did, public key and private key.
#[derive(Clone)]
pub struct CryptoIdentity {
    did: String,
    public_key: PublicKey,
    private_key: PrivateKey,
}

impl CryptoIdentity {
    /// Derive an identity deterministically from a seed string.
    pub fn from_seed(seed: &str) -> Result<Self, CryptoError> {
        let bytes =
            hkdf_sha256::<X25519_KEY_LENGTH>(IDENTITY_SALT, seed.as_bytes(), IDENTITY_INFO)?;
        Ok(Self::from_private_key(PrivateKey::from_bytes(*bytes)))
    }

    /// Generate a fresh identity from OS randomness.
    pub fn random() -> Self {
        let mut bytes = Zeroizing::new([0u8; X25519_KEY_LENGTH]);
        rand::rng().fill_bytes(&mut bytes[..]);
        Self::from_private_key(PrivateKey::from_bytes(*bytes))
    }

    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        Self {
            did: public_key.did(),
            public_key,
            private_key,
        }
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            did: self.did.clone(),
            public_key: self.public_key,
        }
    }
}

impl fmt::Debug for CryptoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoIdentity")
            .field("did", &self.did)
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_deterministic() {
        let a = CryptoIdentity::from_seed(REFERENCE_SEED).unwrap();
        let b = CryptoIdentity::from_seed(REFERENCE_SEED).unwrap();
        assert_eq!(a.did(), b.did());
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.private_key().expose(), b.private_key().expose());
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = CryptoIdentity::from_seed("alpha").unwrap();
        let b = CryptoIdentity::from_seed("beta").unwrap();
        assert_ne!(a.did(), b.did());
    }

    #[test]
    fn test_did_format() {
        let identity = CryptoIdentity::from_seed(REFERENCE_SEED).unwrap();
        assert!(identity.did().starts_with("did:key:u"));
        assert_eq!(identity.did(), identity.public_key().did());
    }

    #[test]
    fn test_shared_secret_agrees() {
        let alice = CryptoIdentity::random();
        let bob = CryptoIdentity::random();
        let ab = alice.private_key().diffie_hellman(bob.public_key()).unwrap();
        let ba = bob.private_key().diffie_hellman(alice.public_key()).unwrap();
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn test_low_order_point_rejected() {
        let identity = CryptoIdentity::random();
        let zero = PublicKey::from_bytes([0u8; X25519_KEY_LENGTH]);
        assert!(matches!(
            identity.private_key().diffie_hellman(&zero),
            Err(CryptoError::NonContributory)
        ));
    }

    #[test]
    fn test_public_key_base64_roundtrip() {
        let identity = CryptoIdentity::random();
        let encoded = identity.public_key().to_base64();
        assert_eq!(PublicKey::from_base64(&encoded).unwrap(), *identity.public_key());
        assert!(matches!(
            PublicKey::from_base64("AAAA"),
            Err(CryptoError::InvalidKeyLength { expected: 32, .. })
        ));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let identity = CryptoIdentity::from_seed(REFERENCE_SEED).unwrap();
        let printed = format!("{identity:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(&BASE64URL_NOPAD.encode(identity.private_key().expose())));
    }
}
