//! Watch registration: one non-recursive subscription per directory.
//!
//! Raw `notify` callbacks are forwarded into an mpsc channel. The session
//! thread blocks on that channel in [`WatchHandle::take`], and an
//! [`Interrupter`] can post into the same channel to wake it for shutdown.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::notification::{ChangeKind, ChangeNotification, WatchedDirectory, classify_event};

/// Errors from registering or reading a watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The target is missing, a regular file, or a symbolic link.
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The blocking wait was interrupted for shutdown.
    #[error("Watch interrupted")]
    Interrupted,

    /// The handle can no longer deliver notifications.
    #[error("Watch on {} is no longer valid", .0.display())]
    Invalidated(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

enum WatchMessage {
    Event(notify::Result<notify::Event>),
    Interrupt,
}

/// Wakes a thread blocked in [`WatchHandle::take`].
///
/// Holds the watcher's sender weakly, so the channel disconnects as soon as
/// the watcher's event handler is gone.
#[derive(Clone)]
pub struct Interrupter {
    tx: Weak<Sender<WatchMessage>>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        // Nothing to wake once the watcher is gone
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(WatchMessage::Interrupt);
        }
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Interrupter")
    }
}

/// A live subscription bound to exactly one directory.
pub struct WatchHandle {
    directory: WatchedDirectory,
    // Dropping the watcher ends the subscription, so it lives as long as the handle.
    // Its event handler owns the only strong sender.
    watcher: RecommendedWatcher,
    rx: Receiver<WatchMessage>,
    tx: Weak<Sender<WatchMessage>>,
    /// Names of direct subdirectories, so their removal is recognised after
    /// they are gone from disk.
    subdirectories: HashSet<String>,
    pending_interrupt: bool,
    invalidated: bool,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("directory", &self.directory.path())
            .field("invalidated", &self.invalidated)
            .finish_non_exhaustive()
    }
}

/// Register a watch on `directory` with the default poll interval.
pub fn register(directory: &Path) -> Result<WatchHandle, WatchError> {
    register_with_interval(directory, DEFAULT_POLL_INTERVAL)
}

/// Register a watch on `directory`.
///
/// Symbolic links are not followed: a link to a directory is rejected with
/// [`WatchError::NotADirectory`]. Subdirectories are never watched.
pub fn register_with_interval(
    directory: &Path,
    poll_interval: Duration,
) -> Result<WatchHandle, WatchError> {
    match directory.symlink_metadata() {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(WatchError::NotADirectory(directory.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(WatchError::NotADirectory(directory.to_path_buf()));
        }
        Err(source) => {
            return Err(WatchError::Io {
                source,
                path: directory.to_path_buf(),
            });
        }
    }

    let (tx, rx) = mpsc::channel();
    let event_tx = Arc::new(tx);
    let tx = Arc::downgrade(&event_tx);
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let _ = event_tx.send(WatchMessage::Event(res));
        },
        Config::default().with_poll_interval(poll_interval),
    )?;
    watcher.watch(directory, RecursiveMode::NonRecursive)?;
    info!(directory = %directory.display(), "Watching directory");

    Ok(WatchHandle {
        directory: WatchedDirectory::new(directory),
        watcher,
        rx,
        tx,
        subdirectories: list_subdirectories(directory)?,
        pending_interrupt: false,
        invalidated: false,
    })
}

fn list_subdirectories(directory: &Path) -> Result<HashSet<String>, WatchError> {
    let io_error = |source| WatchError::Io {
        source,
        path: directory.to_path_buf(),
    };
    let mut names = HashSet::new();
    for entry in fs::read_dir(directory).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_type().is_ok_and(|t| t.is_dir())
            && let Some(name) = entry.file_name().to_str()
        {
            names.insert(name.to_owned());
        }
    }
    Ok(names)
}

impl WatchHandle {
    pub fn directory(&self) -> &Path {
        self.directory.path()
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            tx: Weak::clone(&self.tx),
        }
    }

    /// Block until at least one raw event arrives, then drain everything
    /// already queued and return it as one batch in delivery order.
    ///
    /// The batch may be empty when every queued event was irrelevant (access
    /// events, paths outside the directory). Watcher errors are reported as
    /// overflow notifications since events may have been lost.
    pub fn take(&mut self) -> Result<Vec<ChangeNotification>, WatchError> {
        if self.pending_interrupt {
            return Err(WatchError::Interrupted);
        }

        // Disconnected once the watcher's event handler has been dropped
        let Ok(first) = self.rx.recv() else {
            self.invalidated = true;
            return Err(WatchError::Invalidated(self.directory.path().to_path_buf()));
        };

        let mut batch = Vec::new();
        let mut message = Some(first);
        while let Some(current) = message.take() {
            match current {
                WatchMessage::Interrupt => {
                    if batch.is_empty() {
                        return Err(WatchError::Interrupted);
                    }
                    // Deliver what we have; the next take reports the interrupt.
                    self.pending_interrupt = true;
                    break;
                }
                WatchMessage::Event(Ok(event)) => {
                    let classified = classify_event(&event, &self.directory);
                    if classified.root_removed {
                        warn!(
                            directory = %self.directory.path().display(),
                            "Watched directory was removed"
                        );
                        self.invalidated = true;
                    }
                    batch.extend(
                        classified
                            .notifications
                            .into_iter()
                            .map(|n| self.track_directory(n)),
                    );
                }
                WatchMessage::Event(Err(e)) => {
                    warn!(error = %e, "Watcher reported an error, treating as overflow");
                    batch.push(ChangeNotification::overflow(self.directory.path()));
                }
            }

            message = match self.rx.try_recv() {
                Ok(next) => Some(next),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
            };
        }

        debug!(count = batch.len(), "Drained notification batch");
        Ok(batch)
    }

    /// Keep the set of known subdirectories current and mark notifications
    /// about any of them as directory notifications.
    fn track_directory(&mut self, notification: ChangeNotification) -> ChangeNotification {
        let name = &notification.relative_name;
        let known = match notification.kind {
            ChangeKind::Deleted => self.subdirectories.remove(name),
            ChangeKind::Created | ChangeKind::Modified => {
                if notification.is_directory || notification.full_path().is_dir() {
                    self.subdirectories.insert(name.clone());
                    true
                } else {
                    // A directory replaced by a file under the same name
                    self.subdirectories.remove(name);
                    false
                }
            }
            ChangeKind::Overflow => false,
        };
        if known && !notification.is_directory {
            notification.directory()
        } else {
            notification
        }
    }

    /// Re-arm the handle after a batch. Returns false once the handle can no
    /// longer deliver notifications (the directory was removed or replaced).
    pub fn reset(&mut self) -> bool {
        if self.invalidated {
            return false;
        }
        let still_directory = self
            .directory
            .path()
            .symlink_metadata()
            .is_ok_and(|meta| meta.is_dir());
        if !still_directory {
            self.invalidated = true;
        }
        still_directory
    }
}
