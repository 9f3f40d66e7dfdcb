use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::fs::header::FormatError;
use crate::fs::name::NameError;

/// Context for file operations, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct FileContext {
    /// The plaintext path (if known)
    pub plaintext_path: Option<PathBuf>,
    /// The ciphertext path (if known)
    pub ciphertext_path: Option<PathBuf>,
}

impl FileContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_plaintext(mut self, path: impl Into<PathBuf>) -> Self {
        self.plaintext_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_ciphertext(mut self, path: impl Into<PathBuf>) -> Self {
        self.ciphertext_path = Some(path.into());
        self
    }
}

impl fmt::Display for FileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref path) = self.plaintext_path {
            parts.push(format!("plaintext {}", path.display()));
        }
        if let Some(ref path) = self.ciphertext_path {
            parts.push(format!("ciphertext {}", path.display()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors returned across the crypto boundary.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Name error: {0}")]
    Name(#[from] NameError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error for {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: FileContext,
    },

    /// The wallet holds no name keys for this DID.
    #[error("No wallet entry for identity {did}")]
    UnknownIdentity { did: String },

    /// The sealed payload names a different file than its header.
    ///
    /// **[INTEGRITY VIOLATION]** Header and envelope were spliced from different files.
    #[error("[INTEGRITY VIOLATION] Sealed file name does not match the header for {context}")]
    NameMismatch { context: FileContext },
}

impl From<io::Error> for ProviderError {
    fn from(source: io::Error) -> Self {
        ProviderError::Io {
            source,
            context: FileContext::new(),
        }
    }
}

impl ProviderError {
    /// Create an IO error with context
    #[must_use]
    pub fn io_with_context(source: io::Error, context: FileContext) -> Self {
        ProviderError::Io { source, context }
    }

    /// Whether this error indicates tampering rather than a transient condition.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            ProviderError::Crypto(
                CryptoError::OpenFailed
                    | CryptoError::SenderMismatch { .. }
                    | CryptoError::NonContributory
            ) | ProviderError::Name(NameError::DecryptionFailed { .. })
                | ProviderError::NameMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let context = FileContext::new()
            .with_plaintext("/plain/a.txt")
            .with_ciphertext("/enc/ABC.oxs");
        assert_eq!(context.to_string(), "plaintext /plain/a.txt, ciphertext /enc/ABC.oxs");
        assert_eq!(FileContext::new().to_string(), "(no context)");
    }

    #[test]
    fn test_integrity_classification() {
        assert!(ProviderError::Crypto(CryptoError::OpenFailed).is_integrity_violation());
        let io = ProviderError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!io.is_integrity_violation());
    }
}
