//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use oxsync_core::provider::ProviderError;
use oxsync_core::{
    CryptoBoundary, CryptoIdentity, DecryptOutcome, EncryptRequest, PrivateKey, PublicKey,
    REFERENCE_SEED, WalletProvider,
};
use oxsync_engine::{Direction, MutualExclusionGate, SessionContext, SyncConfig, SyncSession};
use parking_lot::Mutex;
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

/// One call across the crypto boundary, with the arguments the engine passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Encrypt {
        sender_did: String,
        recipient_did: String,
        source_path: PathBuf,
        plaintext: Vec<u8>,
        source_root: PathBuf,
        dest_root: PathBuf,
    },
    Decrypt {
        encrypted_path: PathBuf,
        dest_root: PathBuf,
    },
    DeletePlaintext {
        did: String,
        path: PathBuf,
        source_root: PathBuf,
        dest_root: PathBuf,
    },
    DeleteCiphertext {
        path: PathBuf,
        source_root: PathBuf,
        dest_root: PathBuf,
    },
}

/// Delegates to a real [`WalletProvider`] while recording every call and the
/// number of calls in flight at once.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    inner: WalletProvider,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call open for `delay` so overlapping calls would be visible.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn track<T>(&self, call: Call, f: impl FnOnce() -> T) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let result = f();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl CryptoBoundary for RecordingProvider {
    fn generate_identity(&self, seed: &str) -> Result<CryptoIdentity, ProviderError> {
        self.inner.generate_identity(seed)
    }

    fn random_identity(&self) -> Result<CryptoIdentity, ProviderError> {
        self.inner.random_identity()
    }

    fn encrypt_file(&self, request: &EncryptRequest<'_>) -> Result<PathBuf, ProviderError> {
        let call = Call::Encrypt {
            sender_did: request.sender.did().to_string(),
            recipient_did: request.recipient.did.clone(),
            source_path: request.source_path.to_path_buf(),
            plaintext: request.plaintext.to_vec(),
            source_root: request.source_root.to_path_buf(),
            dest_root: request.dest_root.to_path_buf(),
        };
        self.track(call, || self.inner.encrypt_file(request))
    }

    fn decrypt_file(
        &self,
        encrypted_path: &Path,
        private_key: &PrivateKey,
        public_key: &PublicKey,
        dest_root: &Path,
    ) -> Result<DecryptOutcome, ProviderError> {
        let call = Call::Decrypt {
            encrypted_path: encrypted_path.to_path_buf(),
            dest_root: dest_root.to_path_buf(),
        };
        self.track(call, || {
            self.inner.decrypt_file(encrypted_path, private_key, public_key, dest_root)
        })
    }

    fn delete_plaintext_counterpart(
        &self,
        did: &str,
        path: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> Result<(), ProviderError> {
        let call = Call::DeletePlaintext {
            did: did.to_string(),
            path: path.to_path_buf(),
            source_root: source_root.to_path_buf(),
            dest_root: dest_root.to_path_buf(),
        };
        self.track(call, || {
            self.inner.delete_plaintext_counterpart(did, path, source_root, dest_root)
        })
    }

    fn delete_ciphertext_counterpart(
        &self,
        path: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> Result<(), ProviderError> {
        let call = Call::DeleteCiphertext {
            path: path.to_path_buf(),
            source_root: source_root.to_path_buf(),
            dest_root: dest_root.to_path_buf(),
        };
        self.track(call, || {
            self.inner.delete_ciphertext_counterpart(path, source_root, dest_root)
        })
    }
}

/// A plaintext root, a ciphertext root and both sessions over them.
pub struct Harness {
    pub temp: TempDir,
    pub plain: PathBuf,
    pub enc: PathBuf,
    pub provider: Arc<RecordingProvider>,
    pub gate: Arc<MutualExclusionGate>,
    pub encrypting: SyncSession,
    pub decrypting: SyncSession,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(SyncConfig::default(), RecordingProvider::new())
    }

    pub fn with(config: SyncConfig, provider: RecordingProvider) -> Self {
        let temp = TempDir::new().unwrap();
        let plain = temp.path().join("plain");
        let enc = temp.path().join("enc");
        fs::create_dir(&plain).unwrap();
        fs::create_dir(&enc).unwrap();

        let provider = Arc::new(provider);
        let identity = provider.generate_identity(REFERENCE_SEED).unwrap();
        let peer = provider.generate_identity(REFERENCE_SEED).unwrap();

        let gate = Arc::new(MutualExclusionGate::new());
        let context = SessionContext {
            gate: Arc::clone(&gate),
            provider: Arc::clone(&provider) as Arc<dyn CryptoBoundary>,
            config: Arc::new(config),
        };
        let encrypting = SyncSession::new(
            Direction::Encrypting,
            &plain,
            &enc,
            identity.clone(),
            peer.public_identity(),
            context.clone(),
        );
        let decrypting = SyncSession::new(
            Direction::Decrypting,
            &enc,
            &plain,
            peer,
            identity.public_identity(),
            context,
        );

        Self {
            temp,
            plain,
            enc,
            provider,
            gate,
            encrypting,
            decrypting,
        }
    }

    /// Ciphertext files currently under the ciphertext root.
    pub fn ciphertexts(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = fs::read_dir(&self.enc)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "oxs"))
            .collect();
        found.sort();
        found
    }
}

/// In-memory sink for formatted log output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with logs on this thread captured at info level.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}
