//! Concurrent cache of file system snapshots.
//!
//! Readers check the current immutable hierarchy. On a miss one thread per
//! location scans the disk while the others wait, and the result is only
//! stored when no invalidation touched the location during the scan.

use crate::config::{ProducerGuardConfig, VfsConfig};
use crate::path_util::{AbsolutePath, CaseSensitivity};
use crate::producer_guard::{AdaptiveProducerGuard, ProducerGuard, StripedProducerGuard, VfsProducerGuard};
use crate::snapshot::{FileSystemLocationSnapshot, MetadataSnapshot};
use crate::snapshot_hierarchy::{HierarchyStatistics, SnapshotDiffListener, SnapshotHierarchy};
use crate::vfs_root::VfsRootReference;
use anyhow::Result;
use crossbeam::channel::Receiver;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileChangeType {
    Created,
    Modified,
    Removed,
    Invalidated,
    /// The watcher dropped events below `path`; nothing can be trusted.
    Overflow,
}

/// A change reported by a file watcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub change_type: FileChangeType,
    pub path: AbsolutePath,
}

impl FileChangeEvent {
    pub fn new(change_type: FileChangeType, path: AbsolutePath) -> Self {
        FileChangeEvent { change_type, path }
    }
}

pub struct VirtualFileSystem {
    root: VfsRootReference,
    producer_guard: VfsProducerGuard,
    case_sensitivity: CaseSensitivity,
}

impl VirtualFileSystem {
    pub fn new(config: &VfsConfig) -> Self {
        let case_sensitivity = config.case_sensitivity;
        let producer_guard = match config.producer_guard {
            ProducerGuardConfig::Striped { stripes } => {
                VfsProducerGuard::Striped(StripedProducerGuard::new(stripes, case_sensitivity))
            }
            ProducerGuardConfig::Adaptive => VfsProducerGuard::Adaptive(AdaptiveProducerGuard::new(case_sensitivity)),
        };
        VirtualFileSystem {
            root: VfsRootReference::new(case_sensitivity),
            producer_guard,
            case_sensitivity,
        }
    }

    /// Default configuration with the given case sensitivity.
    pub fn with_case_sensitivity(case_sensitivity: CaseSensitivity) -> Self {
        Self::new(&VfsConfig {
            case_sensitivity,
            ..VfsConfig::default()
        })
    }

    pub fn with_diff_listener(mut self, listener: Box<dyn SnapshotDiffListener>) -> Self {
        self.root = self.root.with_diff_listener(listener);
        self
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    /// The current hierarchy.
    pub fn root(&self) -> SnapshotHierarchy {
        self.root.root()
    }

    pub fn find_metadata(&self, path: &AbsolutePath) -> Option<MetadataSnapshot> {
        self.root().find_metadata(path)
    }

    pub fn find_snapshot(&self, path: &AbsolutePath) -> Option<FileSystemLocationSnapshot> {
        self.root().find_snapshot(path)
    }

    /// Version a scan of `path` has to match when its result is stored.
    pub fn version_for(&self, path: &AbsolutePath) -> u64 {
        self.root.versions().get_subtree_version(path)
    }

    pub fn statistics(&self) -> HierarchyStatistics {
        self.root().statistics()
    }

    /// Stores `snapshot` unconditionally.
    pub fn store(&self, snapshot: &FileSystemLocationSnapshot) {
        tracing::debug!("Storing [{}]", snapshot.absolute_path());
        self.root
            .update(|hierarchy, _versions, listener| hierarchy.store(snapshot, listener));
    }

    /// Stores complete metadata. Partially known directories carry nothing
    /// to store.
    pub fn store_metadata(&self, metadata: &MetadataSnapshot) {
        if let Some(snapshot) = metadata.as_location() {
            self.store(snapshot);
        }
    }

    /// Runs `action` and stores the snapshot it produces, unless `base` or
    /// anything below it was invalidated while it ran. A discarded result is
    /// still returned to the caller.
    pub fn store_with_action<F>(&self, base: &AbsolutePath, action: F) -> Result<FileSystemLocationSnapshot>
    where
        F: FnOnce() -> Result<FileSystemLocationSnapshot>,
    {
        let version_before = self.version_for(base);
        let snapshot = action()?;
        self.root.update(|hierarchy, versions, listener| {
            if versions.get_subtree_version(base) == version_before {
                hierarchy.store(&snapshot, listener)
            } else {
                tracing::trace!("Discarding snapshot of [{}], invalidated while scanning", base);
                hierarchy.clone()
            }
        });
        Ok(snapshot)
    }

    /// Cached snapshot of `path`, scanning with `scan` on a miss. Concurrent
    /// reads of the same location scan once. `scan` may read other locations
    /// through this file system, but not `path` itself.
    pub fn read<F>(&self, path: &AbsolutePath, scan: F) -> Result<FileSystemLocationSnapshot>
    where
        F: FnOnce(&AbsolutePath) -> Result<FileSystemLocationSnapshot>,
    {
        if let Some(snapshot) = self.find_snapshot(path) {
            return Ok(snapshot);
        }
        self.producer_guard.guard_by_key(path, || {
            if let Some(snapshot) = self.find_snapshot(path) {
                return Ok(snapshot);
            }
            self.store_with_action(path, || scan(path))
        })
    }

    /// Forgets everything known at or below each location.
    pub fn invalidate<'a, I>(&self, locations: I)
    where
        I: IntoIterator<Item = &'a AbsolutePath>,
    {
        self.root.update_with_versions(|hierarchy, versions, listener| {
            let mut hierarchy = hierarchy.clone();
            let mut versions = versions.clone();
            for location in locations {
                tracing::debug!("Invalidating [{}]", location);
                hierarchy = hierarchy.invalidate(location, listener);
                versions = versions.update_version(location);
            }
            (hierarchy, versions)
        });
    }

    /// Forgets everything. Every root snapshot is reported as removed.
    pub fn invalidate_all(&self) {
        tracing::debug!("Invalidating the whole virtual file system");
        self.root.update_with_versions(|hierarchy, versions, listener| {
            if !hierarchy.is_empty() {
                listener.node_removed(hierarchy.root_node());
            }
            (hierarchy.empty_like(), versions.invalidate_all())
        });
    }

    /// Applies watcher events. An overflow invalidates everything.
    pub fn update<I>(&self, events: I)
    where
        I: IntoIterator<Item = FileChangeEvent>,
    {
        let mut paths = Vec::new();
        for event in events {
            if event.change_type == FileChangeType::Overflow {
                tracing::warn!("File watcher overflowed at [{}], dropping all file system state", event.path);
                self.invalidate_all();
                return;
            }
            paths.push(event.path);
        }
        if !paths.is_empty() {
            self.invalidate(paths.iter());
        }
    }

    /// Applies every event currently queued on `events` and returns how many
    /// there were.
    pub fn drain_events(&self, events: &Receiver<FileChangeEvent>) -> usize {
        let pending: Vec<FileChangeEvent> = events.try_iter().collect();
        let count = pending.len();
        self.update(pending);
        count
    }
}
