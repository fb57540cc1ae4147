//! Immutable, point-in-time view of everything known about the file system.

use crate::file_system_node::FileSystemNode;
use crate::path_util::{AbsolutePath, CaseSensitivity};
use crate::snapshot::{FileSystemLocationSnapshot, MetadataSnapshot};
use std::sync::{Arc, OnceLock};

// ----------------------------------------------------------------------------
// Diff listeners
// ----------------------------------------------------------------------------

/// Notified about the nodes a store or invalidate structurally replaced.
pub trait NodeDiffListener {
    fn node_removed(&mut self, node: &Arc<FileSystemNode>);
    fn node_added(&mut self, node: &Arc<FileSystemNode>);
}

pub struct NoopDiffListener;

impl NodeDiffListener for NoopDiffListener {
    fn node_removed(&mut self, _node: &Arc<FileSystemNode>) {}
    fn node_added(&mut self, _node: &Arc<FileSystemNode>) {}
}

/// Receives the snapshots that left and entered the hierarchy during one update.
pub trait SnapshotDiffListener: Send + Sync {
    fn changed(&self, removed: &[FileSystemLocationSnapshot], added: &[FileSystemLocationSnapshot]);
}

/// Collects the root snapshots of every removed and added node.
#[derive(Default)]
pub struct SnapshotCollectingDiffListener {
    removed: Vec<FileSystemLocationSnapshot>,
    added: Vec<FileSystemLocationSnapshot>,
}

impl SnapshotCollectingDiffListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn removed(&self) -> &[FileSystemLocationSnapshot] {
        &self.removed
    }

    pub fn added(&self) -> &[FileSystemLocationSnapshot] {
        &self.added
    }

    /// Hands the collected diff to `listener`, unless nothing changed.
    pub fn publish_snapshot_diff(&self, listener: &dyn SnapshotDiffListener) {
        if !self.removed.is_empty() || !self.added.is_empty() {
            listener.changed(&self.removed, &self.added);
        }
    }
}

impl NodeDiffListener for SnapshotCollectingDiffListener {
    fn node_removed(&mut self, node: &Arc<FileSystemNode>) {
        node.visit_snapshot_roots(&mut |snapshot| self.removed.push(snapshot.clone()));
    }

    fn node_added(&mut self, node: &Arc<FileSystemNode>) {
        node.visit_snapshot_roots(&mut |snapshot| self.added.push(snapshot.clone()));
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Number of locations retained in a hierarchy, counting the entries of
/// complete directories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HierarchyStatistics {
    pub retained_regular_files: usize,
    pub retained_directories: usize,
    pub retained_missing_files: usize,
}

impl HierarchyStatistics {
    pub fn total(&self) -> usize {
        self.retained_regular_files + self.retained_directories + self.retained_missing_files
    }
}

// ----------------------------------------------------------------------------
// SnapshotHierarchy
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct SnapshotHierarchy {
    root: Arc<FileSystemNode>,
    case_sensitivity: CaseSensitivity,
}

impl SnapshotHierarchy {
    /// The empty hierarchy. Shared per case sensitivity.
    pub fn empty(case_sensitivity: CaseSensitivity) -> Self {
        static CASE_SENSITIVE: OnceLock<Arc<FileSystemNode>> = OnceLock::new();
        static CASE_INSENSITIVE: OnceLock<Arc<FileSystemNode>> = OnceLock::new();
        let cell = match case_sensitivity {
            CaseSensitivity::CaseSensitive => &CASE_SENSITIVE,
            CaseSensitivity::CaseInsensitive => &CASE_INSENSITIVE,
        };
        let root = cell.get_or_init(|| Arc::new(FileSystemNode::empty())).clone();
        SnapshotHierarchy {
            root,
            case_sensitivity,
        }
    }

    /// An empty hierarchy with the same case sensitivity.
    pub fn empty_like(&self) -> Self {
        Self::empty(self.case_sensitivity)
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    pub fn root_node(&self) -> &Arc<FileSystemNode> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn find_metadata(&self, path: &AbsolutePath) -> Option<MetadataSnapshot> {
        self.root.get_snapshot(path.relative(), self.case_sensitivity)
    }

    /// Complete snapshot at `path`. Partially known directories yield `None`.
    pub fn find_snapshot(&self, path: &AbsolutePath) -> Option<FileSystemLocationSnapshot> {
        self.find_metadata(path).and_then(MetadataSnapshot::into_location)
    }

    pub fn has_descendants_under(&self, path: &AbsolutePath) -> bool {
        self.root.has_descendants_under(path.relative(), self.case_sensitivity)
    }

    /// Records `snapshot` at its own absolute path. Storing information that
    /// is already known returns a hierarchy sharing the same root node.
    pub fn store(&self, snapshot: &FileSystemLocationSnapshot, listener: &mut dyn NodeDiffListener) -> Self {
        let path = snapshot.absolute_path();
        let root = self
            .root
            .store(path.relative(), snapshot, self.case_sensitivity, listener);
        self.with_root(root)
    }

    pub fn invalidate(&self, path: &AbsolutePath, listener: &mut dyn NodeDiffListener) -> Self {
        match self.root.invalidate(path.relative(), self.case_sensitivity, listener) {
            Some(root) => self.with_root(root),
            None => self.empty_like(),
        }
    }

    pub fn visit_snapshot_roots(&self, visitor: &mut dyn FnMut(&FileSystemLocationSnapshot)) {
        self.root.visit_snapshot_roots(visitor);
    }

    /// Visits the stored snapshots at or below `path`.
    pub fn visit_snapshot_roots_under(
        &self,
        path: &AbsolutePath,
        visitor: &mut dyn FnMut(&FileSystemLocationSnapshot),
    ) {
        self.root
            .visit_snapshot_roots_under(path.relative(), self.case_sensitivity, visitor);
    }

    pub fn root_snapshots(&self) -> Vec<FileSystemLocationSnapshot> {
        let mut roots = Vec::new();
        self.visit_snapshot_roots(&mut |snapshot| roots.push(snapshot.clone()));
        roots
    }

    pub fn statistics(&self) -> HierarchyStatistics {
        let mut stats = HierarchyStatistics::default();
        self.visit_snapshot_roots(&mut |root| {
            root.visit_tree(&mut |snapshot| match snapshot {
                FileSystemLocationSnapshot::RegularFile(_) => stats.retained_regular_files += 1,
                FileSystemLocationSnapshot::Directory(_) => stats.retained_directories += 1,
                FileSystemLocationSnapshot::Missing(_) => stats.retained_missing_files += 1,
            });
        });
        stats
    }

    fn with_root(&self, root: Arc<FileSystemNode>) -> Self {
        if Arc::ptr_eq(&root, &self.root) {
            return self.clone();
        }
        SnapshotHierarchy {
            root,
            case_sensitivity: self.case_sensitivity,
        }
    }
}
