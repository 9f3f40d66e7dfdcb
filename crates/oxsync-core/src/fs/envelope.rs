//! Sealing and opening file payloads between two X25519 identities.
//!
//! The content key is HKDF-SHA256 over the static-static X25519 shared secret,
//! salted per file. AES-256-GCM seals the payload with the header line as
//! associated data.

use aead::Payload;
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use tracing::{instrument, trace};
use zeroize::Zeroizing;

use super::header::Envelope;
use crate::crypto::CryptoError;
use crate::crypto::identity::{PrivateKey, PublicIdentity, PublicKey};
use crate::crypto::kdf::hkdf_sha256;

pub const SALT_LENGTH: usize = 32;
pub const NONCE_LENGTH: usize = 12;

const CONTENT_KEY_INFO: &[u8] = b"oxsync-content-v1";

fn content_cipher(
    private_key: &PrivateKey,
    peer: &PublicKey,
    salt: &[u8],
) -> Result<Aes256Gcm, CryptoError> {
    let shared = private_key.diffie_hellman(peer)?;
    let key = hkdf_sha256::<32>(salt, &shared[..], CONTENT_KEY_INFO)?;
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..])))
}

/// Seal `plaintext` from `sender_did` to `recipient`.
#[instrument(level = "trace", skip_all, fields(to = %recipient.did))]
pub fn seal(
    sender_private: &PrivateKey,
    sender_did: &str,
    recipient: &PublicIdentity,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Envelope, CryptoError> {
    let mut salt = vec![0u8; SALT_LENGTH];
    let mut nonce = vec![0u8; NONCE_LENGTH];
    let mut rng = rand::rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let cipher = content_cipher(sender_private, &recipient.public_key, &salt)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::SealFailed(e.to_string()))?;

    trace!(bytes = plaintext.len(), "Sealed payload");
    Ok(Envelope {
        from: sender_did.to_string(),
        to: recipient.did.clone(),
        salt,
        nonce,
        ciphertext,
    })
}

/// Open an envelope with the recipient's private key and the sender's public key.
pub fn open(
    envelope: &Envelope,
    recipient_private: &PrivateKey,
    sender_public: &PublicKey,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if envelope.from != sender_public.did() {
        return Err(CryptoError::SenderMismatch {
            claimed: envelope.from.clone(),
        });
    }
    if envelope.nonce.len() != NONCE_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: NONCE_LENGTH,
            actual: envelope.nonce.len(),
        });
    }

    let cipher = content_cipher(recipient_private, sender_public, &envelope.salt)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            Payload {
                msg: &envelope.ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::OpenFailed)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::identity::CryptoIdentity;

    #[test]
    fn test_seal_open_between_two_identities() {
        let alice = CryptoIdentity::random();
        let bob = CryptoIdentity::random();

        let envelope = seal(
            alice.private_key(),
            alice.did(),
            &bob.public_identity(),
            b"hdr",
            b"secret",
        )
        .unwrap();
        assert_eq!(envelope.from, alice.did());
        assert_eq!(envelope.to, bob.did());

        let opened = open(&envelope, bob.private_key(), alice.public_key(), b"hdr").unwrap();
        assert_eq!(&opened[..], b"secret");
    }

    #[test]
    fn test_wrong_aad_fails() {
        let me = CryptoIdentity::random();
        let envelope =
            seal(me.private_key(), me.did(), &me.public_identity(), b"hdr", b"x").unwrap();
        assert!(matches!(
            open(&envelope, me.private_key(), me.public_key(), b"other"),
            Err(CryptoError::OpenFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let me = CryptoIdentity::random();
        let mut envelope =
            seal(me.private_key(), me.did(), &me.public_identity(), b"", b"payload").unwrap();
        envelope.ciphertext[0] ^= 0x01;
        assert!(matches!(
            open(&envelope, me.private_key(), me.public_key(), b""),
            Err(CryptoError::OpenFailed)
        ));
    }

    #[test]
    fn test_sender_mismatch_detected() {
        let alice = CryptoIdentity::random();
        let mallory = CryptoIdentity::random();
        let envelope =
            seal(alice.private_key(), alice.did(), &alice.public_identity(), b"", b"x").unwrap();
        assert!(matches!(
            open(&envelope, alice.private_key(), mallory.public_key(), b""),
            Err(CryptoError::SenderMismatch { .. })
        ));
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_seal() {
        let me = CryptoIdentity::random();
        let a = seal(me.private_key(), me.did(), &me.public_identity(), b"", b"same").unwrap();
        let b = seal(me.private_key(), me.did(), &me.public_identity(), b"", b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}
