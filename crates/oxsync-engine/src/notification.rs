//! Change notifications and their classification from raw watcher events.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{CreateKind, EventKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use tracing::trace;

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Deleted,
    Modified,
    /// Notifications were dropped by the OS. Nothing is known about which
    /// files changed.
    Overflow,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Created => "created",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Modified => "modified",
            ChangeKind::Overflow => "overflow",
        })
    }
}

/// One change in a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    /// Base name of the changed entry (empty for overflow)
    pub relative_name: String,
    pub containing_directory: PathBuf,
    /// The entry is known to be a directory, even if it no longer exists.
    pub is_directory: bool,
}

impl ChangeNotification {
    pub fn new(
        kind: ChangeKind,
        relative_name: impl Into<String>,
        containing_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            relative_name: relative_name.into(),
            containing_directory: containing_directory.into(),
            is_directory: false,
        }
    }

    /// Mark the entry as a directory.
    #[must_use]
    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    pub fn overflow(containing_directory: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Overflow, String::new(), containing_directory)
    }

    /// Absolute path of the changed entry.
    pub fn full_path(&self) -> PathBuf {
        self.containing_directory.join(&self.relative_name)
    }
}

/// A watched directory as given by the caller and as the OS may report it.
///
/// Some backends report canonical paths (e.g. `/private/var` on macOS) even
/// when the watch was registered through a symlinked parent.
#[derive(Debug, Clone)]
pub struct WatchedDirectory {
    path: PathBuf,
    canonical: PathBuf,
}

impl WatchedDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        Self { path, canonical }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_root(&self, candidate: &Path) -> bool {
        candidate == self.path || candidate == self.canonical
    }

    /// Base name of `candidate` if it is a direct child of this directory.
    fn child_name(&self, candidate: &Path) -> Option<String> {
        let parent = candidate.parent()?;
        if !self.is_root(parent) {
            return None;
        }
        candidate.file_name()?.to_str().map(str::to_owned)
    }
}

/// Result of classifying one raw event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Classified {
    pub notifications: Vec<ChangeNotification>,
    /// The watched directory itself was removed or moved away.
    pub root_removed: bool,
}

/// Map a raw watcher event onto change notifications for `directory`.
///
/// Renames become a delete of the old name and a create of the new one.
/// Access events and metadata-only changes other than a new write time are
/// ignored, as are paths outside the directory.
pub fn classify_event(event: &notify::Event, directory: &WatchedDirectory) -> Classified {
    let mut classified = Classified::default();

    if event.need_rescan() {
        classified
            .notifications
            .push(ChangeNotification::overflow(directory.path()));
        return classified;
    }

    let all = |kind: ChangeKind| event.paths.iter().map(move |p| (kind, p)).collect();
    let per_path: Vec<(ChangeKind, &PathBuf)> = match event.kind {
        EventKind::Create(_) => all(ChangeKind::Created),
        EventKind::Remove(_) => all(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => rename_changes(mode, &event.paths),
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime))
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
            all(ChangeKind::Modified)
        }
        EventKind::Modify(ModifyKind::Metadata(_))
        | EventKind::Access(_)
        | EventKind::Any
        | EventKind::Other => {
            trace!(kind = ?event.kind, "Ignoring event kind");
            Vec::new()
        }
    };
    let folder = matches!(
        event.kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    );

    for (kind, path) in per_path {
        if directory.is_root(path) {
            if kind == ChangeKind::Deleted {
                classified.root_removed = true;
            }
            continue;
        }
        match directory.child_name(path) {
            Some(name) => {
                let notification = ChangeNotification::new(kind, name, directory.path());
                classified.notifications.push(if folder {
                    notification.directory()
                } else {
                    notification
                });
            }
            None => trace!(path = %path.display(), "Ignoring path outside the watched directory"),
        }
    }
    classified
}

fn rename_changes(mode: RenameMode, paths: &[PathBuf]) -> Vec<(ChangeKind, &PathBuf)> {
    match mode {
        RenameMode::From => paths.iter().map(|p| (ChangeKind::Deleted, p)).collect(),
        RenameMode::To => paths.iter().map(|p| (ChangeKind::Created, p)).collect(),
        RenameMode::Both => {
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = paths.first() {
                changes.push((ChangeKind::Deleted, from));
            }
            if let Some(to) = paths.get(1) {
                changes.push((ChangeKind::Created, to));
            }
            changes
        }
        // The backend could not tell which side this is; look at the disk.
        RenameMode::Any | RenameMode::Other => paths
            .iter()
            .map(|p| {
                let kind = if p.symlink_metadata().is_ok() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Deleted
                };
                (kind, p)
            })
            .collect(),
    }
}
