use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, trace, warn};
use zeroize::Zeroizing;

use super::{CryptoBoundary, DecryptOutcome, EncryptRequest, FileContext, ProviderError};
use crate::crypto::identity::{CryptoIdentity, PrivateKey, PublicKey};
use crate::crypto::wallet::{NameKeys, Wallet};
use crate::fs::envelope;
use crate::fs::header::{
    CiphertextHeader, FilePayload, encode_ciphertext_file, parse_ciphertext_file, parse_header,
};
use crate::fs::mtime::{is_newer, mirror_modification_time};
use crate::fs::name::{
    ciphertext_file_name, decrypt_relative_name, encrypt_relative_name, hash_relative_name,
    relative_name,
};

/// [`CryptoBoundary`] backed by a process-local [`Wallet`].
///
/// Every identity generated through the provider is registered in its wallet,
/// so both sessions of a process can resolve each other's name keys.
#[derive(Debug, Default)]
pub struct WalletProvider {
    wallet: Wallet,
}

impl WalletProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Register an externally created identity.
    pub fn register_identity(&self, identity: &CryptoIdentity) -> Result<(), ProviderError> {
        self.wallet.register(identity)?;
        Ok(())
    }

    fn keys_for(&self, did: &str) -> Result<std::sync::Arc<NameKeys>, ProviderError> {
        self.wallet
            .name_keys(did)
            .ok_or_else(|| ProviderError::UnknownIdentity { did: did.to_string() })
    }

    /// Plaintext under `plaintext_root` whose ciphertext name would be `ciphertext_path`.
    ///
    /// Used when the ciphertext is already gone and its header cannot be read.
    fn find_plaintext_for(
        &self,
        ciphertext_path: &Path,
        plaintext_root: &Path,
    ) -> Result<Option<PathBuf>, ProviderError> {
        let Some(target) = ciphertext_path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let candidates = self.wallet.all_name_keys();

        let entries = match fs::read_dir(plaintext_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ProviderError::io_with_context(
                    e,
                    FileContext::new().with_plaintext(plaintext_root),
                ));
            }
        };

        for entry in entries.flatten() {
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            for (did, keys) in &candidates {
                if ciphertext_file_name(&hash_relative_name(keys, &name)) == target {
                    trace!(%did, plaintext = %name, "Matched plaintext by name hash");
                    return Ok(Some(entry.path()));
                }
            }
        }
        Ok(None)
    }
}

/// Remove a file, treating "already gone" as success.
fn remove_if_exists(path: &Path, context: &FileContext) -> Result<bool, ProviderError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ProviderError::io_with_context(e, context.clone())),
    }
}

fn ciphertext_path(dest_root: &Path, keys: &NameKeys, relative: &str) -> PathBuf {
    dest_root.join(ciphertext_file_name(&hash_relative_name(keys, relative)))
}

impl CryptoBoundary for WalletProvider {
    fn generate_identity(&self, seed: &str) -> Result<CryptoIdentity, ProviderError> {
        let identity = CryptoIdentity::from_seed(seed)?;
        self.wallet.register(&identity)?;
        Ok(identity)
    }

    fn random_identity(&self) -> Result<CryptoIdentity, ProviderError> {
        let identity = CryptoIdentity::random();
        self.wallet.register(&identity)?;
        Ok(identity)
    }

    #[instrument(
        level = "debug",
        name = "provider::encrypt_file",
        skip_all,
        fields(path = %request.source_path.display())
    )]
    fn encrypt_file(&self, request: &EncryptRequest<'_>) -> Result<PathBuf, ProviderError> {
        let relative = relative_name(request.source_path, request.source_root)?;
        let keys = self.keys_for(request.sender.did())?;
        let output = ciphertext_path(request.dest_root, &keys, &relative);
        let context = FileContext::new()
            .with_plaintext(request.source_path)
            .with_ciphertext(&output);

        // Overwrite only if the plaintext is newer
        let newer = is_newer(request.source_path, &output)
            .map_err(|e| ProviderError::io_with_context(e, context.clone()))?;
        if !newer {
            trace!("Ciphertext already up to date");
            return Ok(output);
        }

        let header = CiphertextHeader::new(
            encrypt_relative_name(&keys, &relative)?,
            hash_relative_name(&keys, &relative),
            request.sender.did(),
        );
        let header_line = header.to_line()?;

        let payload = FilePayload {
            file_name: relative,
            file_data: request.plaintext.to_vec(),
        };
        let payload_json = Zeroizing::new(payload.to_json()?);
        let sealed = envelope::seal(
            request.sender.private_key(),
            request.sender.did(),
            request.recipient,
            &header_line,
            &payload_json,
        )?;

        let contents = encode_ciphertext_file(&header_line, &sealed)?;
        fs::write(&output, contents)
            .map_err(|e| ProviderError::io_with_context(e, context.clone()))?;
        mirror_modification_time(request.source_path, &output)
            .map_err(|e| ProviderError::io_with_context(e, context.clone()))?;

        debug!(ciphertext = %output.display(), bytes = request.plaintext.len(), "Encrypted file");
        Ok(output)
    }

    #[instrument(
        level = "debug",
        name = "provider::decrypt_file",
        skip_all,
        fields(path = %encrypted_path.display())
    )]
    fn decrypt_file(
        &self,
        encrypted_path: &Path,
        private_key: &PrivateKey,
        public_key: &PublicKey,
        dest_root: &Path,
    ) -> Result<DecryptOutcome, ProviderError> {
        let context = FileContext::new().with_ciphertext(encrypted_path);
        let bytes = fs::read(encrypted_path)
            .map_err(|e| ProviderError::io_with_context(e, context.clone()))?;
        let file = parse_ciphertext_file(&bytes)?;

        let keys = self.keys_for(&file.header.key_id)?;
        let relative = decrypt_relative_name(&keys, &file.header.encrypted_name)?;
        let output = dest_root.join(&relative);
        let context = context.with_plaintext(&output);

        // Overwrite only if the ciphertext is newer
        let newer = is_newer(encrypted_path, &output)
            .map_err(|e| ProviderError::io_with_context(e, context.clone()))?;
        if !newer {
            trace!(plaintext = %output.display(), "Plaintext already up to date");
            return Ok(DecryptOutcome::UpToDate(output));
        }

        let opened = envelope::open(&file.envelope, private_key, public_key, &file.header_line)?;
        let payload = FilePayload::from_json(&opened)?;
        if payload.file_name != relative
            || hash_relative_name(&keys, &relative) != file.header.name_hmac
        {
            return Err(ProviderError::NameMismatch { context });
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ProviderError::io_with_context(e, context.clone()))?;
        }
        fs::write(&output, &payload.file_data)
            .map_err(|e| ProviderError::io_with_context(e, context.clone()))?;
        mirror_modification_time(encrypted_path, &output)
            .map_err(|e| ProviderError::io_with_context(e, context.clone()))?;

        debug!(plaintext = %output.display(), bytes = payload.file_data.len(), "Decrypted file");
        Ok(DecryptOutcome::Written(output))
    }

    #[instrument(
        level = "debug",
        name = "provider::delete_plaintext",
        skip_all,
        fields(path = %path.display())
    )]
    fn delete_plaintext_counterpart(
        &self,
        did: &str,
        path: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> Result<(), ProviderError> {
        let relative = relative_name(path, source_root)?;
        let keys = self.keys_for(did)?;
        let ciphertext = ciphertext_path(dest_root, &keys, &relative);
        let context = FileContext::new().with_plaintext(path).with_ciphertext(&ciphertext);

        remove_if_exists(path, &context)?;
        if remove_if_exists(&ciphertext, &context)? {
            debug!(ciphertext = %ciphertext.display(), "Removed ciphertext counterpart");
        }
        Ok(())
    }

    #[instrument(
        level = "debug",
        name = "provider::delete_ciphertext",
        skip_all,
        fields(path = %path.display())
    )]
    fn delete_ciphertext_counterpart(
        &self,
        path: &Path,
        _source_root: &Path,
        dest_root: &Path,
    ) -> Result<(), ProviderError> {
        let context = FileContext::new().with_ciphertext(path);

        let from_header = match fs::read(path) {
            Ok(bytes) => match parse_header(&bytes) {
                Ok(header) => {
                    let keys = self.keys_for(&header.key_id)?;
                    Some(dest_root.join(decrypt_relative_name(&keys, &header.encrypted_name)?))
                }
                Err(e) => {
                    warn!(error = %e, "Unreadable ciphertext header, falling back to name scan");
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(ProviderError::io_with_context(e, context)),
        };

        // Usually the ciphertext is already gone when we hear about it, so the
        // plaintext has to be found by recomputing name hashes.
        let plaintext = match from_header {
            Some(found) => Some(found),
            None => self.find_plaintext_for(path, dest_root)?,
        };

        remove_if_exists(path, &context)?;
        if let Some(plaintext) = plaintext {
            let context = context.with_plaintext(&plaintext);
            if remove_if_exists(&plaintext, &context)? {
                debug!(plaintext = %plaintext.display(), "Removed plaintext counterpart");
            }
        }
        Ok(())
    }
}
