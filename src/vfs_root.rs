//! The only mutable state of the virtual file system: the current hierarchy
//! and version trie, swapped as one unit.

use crate::path_util::CaseSensitivity;
use crate::snapshot_hierarchy::{
    NodeDiffListener, NoopDiffListener, SnapshotCollectingDiffListener, SnapshotDiffListener, SnapshotHierarchy,
};
use crate::version_hierarchy::VersionHierarchyRoot;
use std::sync::RwLock;

struct RootState {
    hierarchy: SnapshotHierarchy,
    versions: VersionHierarchyRoot,
}

pub struct VfsRootReference {
    state: RwLock<RootState>,
    diff_listener: Option<Box<dyn SnapshotDiffListener>>,
}

impl VfsRootReference {
    pub fn new(case_sensitivity: CaseSensitivity) -> Self {
        VfsRootReference {
            state: RwLock::new(RootState {
                hierarchy: SnapshotHierarchy::empty(case_sensitivity),
                versions: VersionHierarchyRoot::empty(case_sensitivity),
            }),
            diff_listener: None,
        }
    }

    /// Reports the snapshots every update removes and adds. The listener runs
    /// while the update still holds the root exclusively.
    pub fn with_diff_listener(mut self, listener: Box<dyn SnapshotDiffListener>) -> Self {
        self.diff_listener = Some(listener);
        self
    }

    /// The current hierarchy. Stays valid and unchanged after later updates.
    pub fn root(&self) -> SnapshotHierarchy {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .hierarchy
            .clone()
    }

    pub fn versions(&self) -> VersionHierarchyRoot {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .versions
            .clone()
    }

    /// Replaces the hierarchy with `update(current, listener)`. Updates are
    /// serialized, so none is lost.
    pub fn update<F>(&self, update: F) -> SnapshotHierarchy
    where
        F: FnOnce(&SnapshotHierarchy, &VersionHierarchyRoot, &mut dyn NodeDiffListener) -> SnapshotHierarchy,
    {
        self.update_with_versions(|hierarchy, versions, listener| {
            (update(hierarchy, versions, listener), versions.clone())
        })
    }

    /// Like [`update`](Self::update), replacing the version trie as well.
    pub fn update_with_versions<F>(&self, update: F) -> SnapshotHierarchy
    where
        F: FnOnce(
            &SnapshotHierarchy,
            &VersionHierarchyRoot,
            &mut dyn NodeDiffListener,
        ) -> (SnapshotHierarchy, VersionHierarchyRoot),
    {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let (hierarchy, versions) = match &self.diff_listener {
            None => update(&state.hierarchy, &state.versions, &mut NoopDiffListener),
            Some(listener) => {
                let mut collector = SnapshotCollectingDiffListener::new();
                let result = update(&state.hierarchy, &state.versions, &mut collector);
                collector.publish_snapshot_diff(listener.as_ref());
                result
            }
        };
        state.hierarchy = hierarchy.clone();
        state.versions = versions;
        hierarchy
    }
}
