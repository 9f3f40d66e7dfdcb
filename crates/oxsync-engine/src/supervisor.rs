//! Starts the two sync sessions and keeps their thread handles.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use oxsync_core::CryptoBoundary;
use oxsync_core::provider::ProviderError;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{IdentitySource, SyncConfig};
use crate::gate::{GateMetricsSnapshot, MutualExclusionGate};
use crate::session::{Direction, SessionContext, SessionExit, SyncSession};
use crate::watch::{Interrupter, WatchError, register_with_interval};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to prepare root {}: {source}", path.display())]
    Root {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Failed to create identity: {0}")]
    Identity(#[from] ProviderError),

    #[error("Failed to spawn session thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("The {0} session panicked")]
    SessionPanicked(Direction),
}

/// How each session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorReport {
    pub encrypting: SessionExit,
    pub decrypting: SessionExit,
}

/// Entry point for running a mirror between two roots.
pub struct Supervisor;

impl Supervisor {
    /// Create missing roots, register both watches and start both sessions.
    ///
    /// `source` is the plaintext root and `destination` the ciphertext root.
    pub fn start(
        source: &Path,
        destination: &Path,
        config: SyncConfig,
        provider: Arc<dyn CryptoBoundary>,
    ) -> Result<SupervisorHandle, SupervisorError> {
        for root in [source, destination] {
            std::fs::create_dir_all(root).map_err(|source| SupervisorError::Root {
                source,
                path: root.to_path_buf(),
            })?;
        }

        let (encrypting_identity, decrypting_identity) = match &config.identity {
            IdentitySource::FixedSeed(seed) => (
                provider.generate_identity(seed)?,
                provider.generate_identity(seed)?,
            ),
            IdentitySource::Random => (provider.random_identity()?, provider.random_identity()?),
        };
        let encrypt_peer = decrypting_identity.public_identity();
        let decrypt_peer = encrypting_identity.public_identity();

        let encrypt_watch = register_with_interval(source, config.poll_interval)?;
        let decrypt_watch = register_with_interval(destination, config.poll_interval)?;
        let interrupters = [encrypt_watch.interrupter(), decrypt_watch.interrupter()];

        let gate = Arc::new(MutualExclusionGate::new());
        let context = SessionContext {
            gate: Arc::clone(&gate),
            provider,
            config: Arc::new(config),
        };

        let mut encrypting = SyncSession::new(
            Direction::Encrypting,
            source,
            destination,
            encrypting_identity,
            encrypt_peer,
            context.clone(),
        );
        let mut decrypting = SyncSession::new(
            Direction::Decrypting,
            destination,
            source,
            decrypting_identity,
            decrypt_peer,
            context,
        );

        let encrypt_thread = thread::Builder::new()
            .name("oxsync-encrypt".into())
            .spawn(move || encrypting.run(encrypt_watch))
            .map_err(SupervisorError::Spawn)?;
        let decrypt_thread = match thread::Builder::new()
            .name("oxsync-decrypt".into())
            .spawn(move || decrypting.run(decrypt_watch))
        {
            Ok(handle) => handle,
            Err(e) => {
                interrupters[0].interrupt();
                let _ = encrypt_thread.join();
                return Err(SupervisorError::Spawn(e));
            }
        };

        info!(
            source = %source.display(),
            destination = %destination.display(),
            "Sync sessions started"
        );
        Ok(SupervisorHandle {
            encrypting: encrypt_thread,
            decrypting: decrypt_thread,
            interrupters,
            gate,
        })
    }
}

/// Handle to the running sessions.
#[derive(Debug)]
pub struct SupervisorHandle {
    encrypting: JoinHandle<SessionExit>,
    decrypting: JoinHandle<SessionExit>,
    interrupters: [Interrupter; 2],
    gate: Arc<MutualExclusionGate>,
}

impl SupervisorHandle {
    /// Interrupt both sessions. In-flight file operations complete first.
    pub fn shutdown(&self) {
        for interrupter in &self.interrupters {
            interrupter.interrupt();
        }
    }

    /// Whether both session threads have ended.
    pub fn is_finished(&self) -> bool {
        self.encrypting.is_finished() && self.decrypting.is_finished()
    }

    pub fn gate_metrics(&self) -> GateMetricsSnapshot {
        self.gate.metrics().snapshot()
    }

    /// Wait for both sessions to end.
    pub fn join(self) -> Result<SupervisorReport, SupervisorError> {
        let encrypting = self.encrypting.join().map_err(|_| {
            error!("Encrypting session panicked");
            SupervisorError::SessionPanicked(Direction::Encrypting)
        })?;
        let decrypting = self.decrypting.join().map_err(|_| {
            error!("Decrypting session panicked");
            SupervisorError::SessionPanicked(Direction::Decrypting)
        })?;
        Ok(SupervisorReport { encrypting, decrypting })
    }
}
