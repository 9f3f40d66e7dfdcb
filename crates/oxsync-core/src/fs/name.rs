//! Relative names and their ciphertext counterparts.
//!
//! A synchronized file is identified by its path relative to its root, with
//! `/` separators. The ciphertext file name is the HMAC of that relative name
//! (content addressing), so either side can compute the counterpart without
//! reading anything. The relative name itself travels inside the ciphertext
//! header, encrypted deterministically with AES-SIV.

use std::fmt;
use std::path::{Component, Path};

use aes_siv::{KeyInit, siv::Aes256Siv};
use base64::{Engine as _, engine::general_purpose};
use data_encoding::BASE32_NOPAD;
use ring::hmac;
use thiserror::Error;

use super::header::CIPHERTEXT_EXTENSION;
use crate::crypto::wallet::NameKeys;

/// Context for name operations, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct NameContext {
    /// The encrypted name (if available)
    pub encrypted_name: Option<String>,
    /// The relative cleartext name (if available)
    pub relative_name: Option<String>,
}

impl NameContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_encrypted_name(mut self, name: impl Into<String>) -> Self {
        self.encrypted_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_relative_name(mut self, name: impl Into<String>) -> Self {
        self.relative_name = Some(name.into());
        self
    }
}

impl fmt::Display for NameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref name) = self.relative_name {
            write!(f, "name '{name}'")
        } else if let Some(ref enc_name) = self.encrypted_name {
            // Truncate long encrypted names for readability
            if enc_name.len() > 40 {
                write!(f, "encrypted name '{}...'", &enc_name[..37])
            } else {
                write!(f, "encrypted name '{enc_name}'")
            }
        } else {
            write!(f, "(no context)")
        }
    }
}

/// Errors that can occur while deriving or decrypting relative names.
#[derive(Error, Debug)]
pub enum NameError {
    /// AES-SIV decryption failed.
    ///
    /// **[INTEGRITY VIOLATION]** The header was tampered with or sealed under a
    /// different identity's name keys.
    #[error("[INTEGRITY VIOLATION] Failed to decrypt {context}: authentication failed")]
    DecryptionFailed { context: NameContext },

    #[error("Invalid base64 encoding for {context}: {reason}")]
    Base64Decode { reason: String, context: NameContext },

    #[error("Invalid UTF-8 in {context}")]
    Utf8Decode { context: NameContext },

    /// The decrypted name would escape the destination root.
    #[error("Refusing unsafe relative {context}")]
    UnsafePath { context: NameContext },

    #[error("Path {path} is not inside root {root}")]
    OutsideRoot { path: String, root: String },

    #[error("Unexpected encryption failure for {context}")]
    EncryptionFailed { context: NameContext },
}

/// Relative name of `path` under `root`, `/`-separated.
pub fn relative_name(path: &Path, root: &Path) -> Result<String, NameError> {
    let outside = || NameError::OutsideRoot {
        path: path.display().to_string(),
        root: root.display().to_string(),
    };
    let relative = path.strip_prefix(root).map_err(|_| outside())?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| NameError::Utf8Decode {
                    context: NameContext::new().with_relative_name(relative.to_string_lossy()),
                })?;
                segments.push(segment);
            }
            Component::CurDir => {}
            _ => return Err(outside()),
        }
    }

    if segments.is_empty() {
        return Err(outside());
    }
    Ok(segments.join("/"))
}

/// Reject names that are empty, absolute, or contain `.`/`..` segments.
pub fn validate_relative_name(name: &str) -> Result<(), NameError> {
    let unsafe_path = || NameError::UnsafePath {
        context: NameContext::new().with_relative_name(name),
    };
    if name.is_empty() || name.contains('\\') || name.contains('\0') {
        return Err(unsafe_path());
    }
    for segment in name.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(unsafe_path());
        }
    }
    Ok(())
}

/// HMAC-SHA256 of the relative name, as unpadded Base32.
pub fn hash_relative_name(keys: &NameKeys, relative: &str) -> String {
    let tag = hmac::sign(keys.hmac_key(), relative.as_bytes());
    BASE32_NOPAD.encode(tag.as_ref())
}

/// File name of the ciphertext counterpart for a name hash.
pub fn ciphertext_file_name(name_hash: &str) -> String {
    format!("{name_hash}.{CIPHERTEXT_EXTENSION}")
}

/// Encrypt a relative name with AES-SIV, returned as base64url.
pub fn encrypt_relative_name(keys: &NameKeys, relative: &str) -> Result<String, NameError> {
    let context = || NameContext::new().with_relative_name(relative);
    let mut cipher = Aes256Siv::new_from_slice(keys.siv_key())
        .map_err(|_| NameError::EncryptionFailed { context: context() })?;

    let associated_data: &[&[u8]] = &[];
    let encrypted = cipher
        .encrypt(associated_data, relative.as_bytes())
        .map_err(|_| NameError::EncryptionFailed { context: context() })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(encrypted))
}

/// Decrypt and validate a relative name produced by [`encrypt_relative_name`].
pub fn decrypt_relative_name(keys: &NameKeys, encrypted_name: &str) -> Result<String, NameError> {
    let context = || NameContext::new().with_encrypted_name(encrypted_name);

    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(encrypted_name.as_bytes())
        .map_err(|e| NameError::Base64Decode {
            reason: e.to_string(),
            context: context(),
        })?;

    let mut cipher = Aes256Siv::new_from_slice(keys.siv_key())
        .map_err(|_| NameError::DecryptionFailed { context: context() })?;
    let associated_data: &[&[u8]] = &[];
    let decrypted = cipher
        .decrypt(associated_data, &decoded)
        .map_err(|_| NameError::DecryptionFailed { context: context() })?;

    let name =
        String::from_utf8(decrypted).map_err(|_| NameError::Utf8Decode { context: context() })?;
    validate_relative_name(&name)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::identity::{CryptoIdentity, REFERENCE_SEED};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn keys() -> NameKeys {
        NameKeys::derive(&CryptoIdentity::from_seed(REFERENCE_SEED).unwrap()).unwrap()
    }

    #[test]
    fn test_relative_name_strips_root() {
        let root = PathBuf::from("/home/user/plain");
        assert_eq!(relative_name(&root.join("a.txt"), &root).unwrap(), "a.txt");
        assert_eq!(relative_name(&root.join("docs/a.txt"), &root).unwrap(), "docs/a.txt");
    }

    #[test]
    fn test_relative_name_outside_root() {
        let root = PathBuf::from("/home/user/plain");
        assert!(matches!(
            relative_name(Path::new("/home/user/other/a.txt"), &root),
            Err(NameError::OutsideRoot { .. })
        ));
        assert!(matches!(relative_name(&root, &root), Err(NameError::OutsideRoot { .. })));
    }

    #[test]
    fn test_validate_rejects_traversal() {
        for bad in ["", "../x", "a/../../x", "/etc/passwd", "a//b", "./a", "a\\b"] {
            assert!(validate_relative_name(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(validate_relative_name("notes/a.txt").is_ok());
    }

    #[test]
    fn test_hash_is_stable_and_filesystem_safe() {
        let keys = keys();
        let a = hash_relative_name(&keys, "a.txt");
        assert_eq!(a, hash_relative_name(&keys, "a.txt"));
        assert_ne!(a, hash_relative_name(&keys, "b.txt"));
        assert!(a.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(ciphertext_file_name(&a), format!("{a}.oxs"));
    }

    #[test]
    fn test_decrypt_with_other_keys_fails() {
        let encrypted = encrypt_relative_name(&keys(), "a.txt").unwrap();
        let other = NameKeys::derive(&CryptoIdentity::random()).unwrap();
        assert!(matches!(
            decrypt_relative_name(&other, &encrypted),
            Err(NameError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_decrypt_rejects_unsafe_plaintext_name() {
        let keys = keys();
        let encrypted = encrypt_relative_name(&keys, "../escape.txt").unwrap();
        assert!(matches!(
            decrypt_relative_name(&keys, &encrypted),
            Err(NameError::UnsafePath { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_name_encryption_recovers_name(
            name in "[A-Za-z0-9 _.-]{1,40}(/[A-Za-z0-9_-]{1,12}){0,3}"
        ) {
            prop_assume!(validate_relative_name(&name).is_ok());
            let keys = keys();
            let encrypted = encrypt_relative_name(&keys, &name).unwrap();
            prop_assert_eq!(decrypt_relative_name(&keys, &encrypted).unwrap(), name);
        }

        #[test]
        fn prop_distinct_names_hash_distinctly(a in "[a-z]{1,16}", b in "[a-z]{1,16}") {
            prop_assume!(a != b);
            let keys = keys();
            prop_assert_ne!(hash_relative_name(&keys, &a), hash_relative_name(&keys, &b));
        }
    }
}
