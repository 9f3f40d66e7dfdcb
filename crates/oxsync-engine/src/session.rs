//! Sync sessions: one per direction.
//!
//! A session watches its source directory and mirrors every change into its
//! destination through the crypto boundary. The encrypting session watches the
//! plaintext tree; the decrypting session watches the ciphertext tree. The two
//! never reference each other and only share the [`MutualExclusionGate`].

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use oxsync_core::provider::ProviderError;
use oxsync_core::{
    CryptoBoundary, CryptoIdentity, DecryptOutcome, EncryptRequest, PublicIdentity,
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{ReadMode, SyncConfig};
use crate::gate::MutualExclusionGate;
use crate::notification::{ChangeKind, ChangeNotification};
use crate::watch::{WatchError, WatchHandle};

/// Which way a session moves files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Plaintext source, ciphertext destination.
    Encrypting,
    /// Ciphertext source, plaintext destination.
    Decrypting,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Encrypting => "encrypting",
            Direction::Decrypting => "decrypting",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopped,
}

/// Why a session's run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The watch handle can no longer deliver notifications.
    WatchInvalidated,
    /// The blocking wait was interrupted for shutdown.
    Interrupted,
}

/// Per-event failures. These are logged and never stop the loop.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to read {}: {source}", path.display())]
    ReadFailure {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// The provider produced no output file.
    #[error("Decrypting {} produced no output", path.display())]
    DecryptFailure { path: PathBuf },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Why a notification was not forwarded to copy or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Overflow,
    Noise,
    Directory,
}

/// What a notification maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Skip(SkipReason),
    Copy(PathBuf),
    Delete(PathBuf),
}

/// The action reported in the per-file log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncAction::Created => "created",
            SyncAction::Modified => "modified",
            SyncAction::Deleted => "deleted",
        })
    }
}

/// Result of processing one notification.
#[derive(Debug)]
pub enum EventOutcome {
    Skipped(SkipReason),
    /// The file was mirrored and the action was reported.
    Synced(SyncAction),
    Failed(SessionError),
}

impl EventOutcome {
    pub fn action(&self) -> Option<SyncAction> {
        match self {
            EventOutcome::Synced(action) => Some(*action),
            _ => None,
        }
    }
}

/// Collaborators shared by both sessions.
#[derive(Clone)]
pub struct SessionContext {
    pub gate: Arc<MutualExclusionGate>,
    pub provider: Arc<dyn CryptoBoundary>,
    pub config: Arc<SyncConfig>,
}

/// One direction of the mirror.
pub struct SyncSession {
    source: PathBuf,
    destination: PathBuf,
    direction: Direction,
    identity: CryptoIdentity,
    /// Recipient when encrypting, sender when decrypting
    peer: PublicIdentity,
    context: SessionContext,
    state: SessionState,
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("direction", &self.direction)
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("did", &self.identity.did())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SyncSession {
    pub fn new(
        direction: Direction,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        identity: CryptoIdentity,
        peer: PublicIdentity,
        context: SessionContext,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            direction,
            identity,
            peer,
            context,
            state: SessionState::Stopped,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> &CryptoIdentity {
        &self.identity
    }

    /// Process notifications from `watch` until it is interrupted or becomes
    /// invalid. The session owns the handle for the rest of its life.
    #[instrument(
        name = "session::run",
        skip_all,
        fields(direction = %self.direction, source = %self.source.display())
    )]
    pub fn run(&mut self, mut watch: WatchHandle) -> SessionExit {
        self.state = SessionState::Running;
        info!(destination = %self.destination.display(), "Sync session started");

        let exit = loop {
            let batch = match watch.take() {
                Ok(batch) => batch,
                Err(WatchError::Interrupted) => {
                    info!("Sync session interrupted");
                    break SessionExit::Interrupted;
                }
                Err(e) => {
                    error!(error = %e, "Watch failed, stopping session");
                    break SessionExit::WatchInvalidated;
                }
            };

            self.process_batch(&batch);

            if !watch.reset() {
                error!("Watch handle is no longer valid, stopping session");
                break SessionExit::WatchInvalidated;
            }
        };

        self.state = SessionState::Stopped;
        exit
    }

    /// Handle a drained batch in delivery order.
    pub fn process_batch(&self, batch: &[ChangeNotification]) -> Vec<EventOutcome> {
        batch.iter().map(|notification| self.process(notification)).collect()
    }

    fn process(&self, notification: &ChangeNotification) -> EventOutcome {
        match self.classify(notification) {
            Dispatch::Skip(reason) => {
                match reason {
                    SkipReason::Overflow => {
                        warn!(
                            directory = %notification.containing_directory.display(),
                            "Notifications overflowed, some changes may have been missed"
                        );
                    }
                    SkipReason::Noise | SkipReason::Directory => {
                        trace!(name = %notification.relative_name, ?reason, "Skipping");
                    }
                }
                EventOutcome::Skipped(reason)
            }
            Dispatch::Copy(path) | Dispatch::Delete(path) => self.handle(notification.kind, &path),
        }
    }

    /// Decide whether a notification is skipped, copied or deleted.
    pub fn classify(&self, notification: &ChangeNotification) -> Dispatch {
        if notification.kind == ChangeKind::Overflow {
            return Dispatch::Skip(SkipReason::Overflow);
        }
        if self.context.config.is_noise(&notification.relative_name) {
            return Dispatch::Skip(SkipReason::Noise);
        }
        let path = notification.full_path();
        // A removed directory no longer exists on disk; trust the watcher's hint
        if notification.is_directory || path.is_dir() {
            return Dispatch::Skip(SkipReason::Directory);
        }
        match notification.kind {
            ChangeKind::Deleted => Dispatch::Delete(path),
            ChangeKind::Created | ChangeKind::Modified => Dispatch::Copy(path),
            ChangeKind::Overflow => Dispatch::Skip(SkipReason::Overflow),
        }
    }

    /// Apply one change and report it.
    ///
    /// Created and modified files are reported only when the copy succeeds;
    /// deletes are always reported.
    pub fn handle(&self, kind: ChangeKind, path: &Path) -> EventOutcome {
        let action = match kind {
            ChangeKind::Created => SyncAction::Created,
            ChangeKind::Modified => SyncAction::Modified,
            ChangeKind::Deleted => SyncAction::Deleted,
            ChangeKind::Overflow => return EventOutcome::Skipped(SkipReason::Overflow),
        };

        let outcome = if action == SyncAction::Deleted {
            if let Err(e) = self.delete_file(path) {
                warn!(path = %path.display(), error = %e, "Counterpart delete failed");
            }
            EventOutcome::Synced(action)
        } else {
            match self.copy_file(path) {
                Ok(()) => EventOutcome::Synced(action),
                Err(e) => {
                    match &e {
                        // An up-to-date counterpart is the normal end of a mirror round trip
                        SessionError::DecryptFailure { .. } => {
                            debug!(error = %e, "Nothing decrypted");
                        }
                        _ => warn!(path = %path.display(), error = %e, "Copy failed"),
                    }
                    EventOutcome::Failed(e)
                }
            }
        };

        if let EventOutcome::Synced(action) = outcome {
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            info!("The file, {name}, was {action}.");
        }
        outcome
    }

    /// Mirror `path` into the destination.
    pub fn copy_file(&self, path: &Path) -> Result<(), SessionError> {
        match self.direction {
            Direction::Encrypting => self.encrypt_and_store(path),
            Direction::Decrypting => self.decrypt_and_store(path),
        }
    }

    fn read_plaintext(&self, path: &Path) -> Result<Vec<u8>, SessionError> {
        let read_failure = |source: io::Error| SessionError::ReadFailure {
            source,
            path: path.to_path_buf(),
        };
        let mut file = File::open(path).map_err(read_failure)?;
        let max = self.context.config.max_chunk_size;

        match self.context.config.read_mode {
            ReadMode::SingleRead => {
                let mut buf = vec![0u8; max];
                let n = file.read(&mut buf).map_err(read_failure)?;
                buf.truncate(n);
                Ok(buf)
            }
            ReadMode::ToEnd => {
                let mut buf = Vec::with_capacity(max);
                file.read_to_end(&mut buf).map_err(read_failure)?;
                Ok(buf)
            }
        }
    }

    /// Read the plaintext and seal it into the destination root.
    ///
    /// A successful read counts as a copy even when it captured no bytes; an
    /// empty file is simply never handed to the provider.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn encrypt_and_store(&self, path: &Path) -> Result<(), SessionError> {
        let plaintext = self.read_plaintext(path)?;
        if plaintext.is_empty() {
            debug!("Nothing read, not encrypting");
            return Ok(());
        }

        let request = EncryptRequest {
            sender: &self.identity,
            recipient: &self.peer,
            source_path: path,
            plaintext: &plaintext,
            source_root: &self.source,
            dest_root: &self.destination,
        };
        let written = self
            .context
            .gate
            .run_exclusive(|| self.context.provider.encrypt_file(&request))?;
        debug!(ciphertext = %written.display(), bytes = plaintext.len(), "Stored ciphertext");
        Ok(())
    }

    /// Open the ciphertext and write its plaintext into the destination root.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn decrypt_and_store(&self, path: &Path) -> Result<(), SessionError> {
        let outcome = self.context.gate.run_exclusive(|| {
            self.context.provider.decrypt_file(
                path,
                self.identity.private_key(),
                &self.peer.public_key,
                &self.destination,
            )
        })?;
        match outcome {
            DecryptOutcome::Written(output) => {
                debug!(plaintext = %output.display(), "Stored plaintext");
                Ok(())
            }
            DecryptOutcome::UpToDate(_) => Err(SessionError::DecryptFailure {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Remove the counterpart of a deleted file.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn delete_file(&self, path: &Path) -> Result<(), SessionError> {
        let delete = || match self.direction {
            Direction::Encrypting => self.context.provider.delete_plaintext_counterpart(
                self.identity.did(),
                path,
                &self.source,
                &self.destination,
            ),
            Direction::Decrypting => {
                self.context
                    .provider
                    .delete_ciphertext_counterpart(path, &self.source, &self.destination)
            }
        };

        if self.context.config.gate_deletes {
            self.context.gate.run_exclusive(delete)?;
        } else {
            delete()?;
        }
        Ok(())
    }
}
