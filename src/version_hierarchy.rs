//! Version overlay used to detect invalidations that happen while a location
//! is being scanned.
//!
//! A second persistent trie next to the snapshot hierarchy. Each invalidation
//! of a path records a fresh, strictly increasing version at that path and
//! drops the versions recorded below it. A scan reads the version of its
//! location before touching the disk and stores its result only if the
//! version is unchanged afterwards.

use crate::child_map::{ChildEntry, ChildLookup, ChildMap};
use crate::path_util::{AbsolutePath, CaseSensitivity, VfsRelativePath};
use std::sync::Arc;

#[derive(Debug)]
pub struct VersionHierarchy {
    children: ChildMap<VersionHierarchy>,
    version: u64,
    max_version_in_hierarchy: u64,
}

impl VersionHierarchy {
    fn leaf(version: u64) -> Arc<Self> {
        Arc::new(VersionHierarchy {
            children: ChildMap::empty(),
            version,
            max_version_in_hierarchy: version,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn max_version_in_hierarchy(&self) -> u64 {
        self.max_version_in_hierarchy
    }

    /// Version recorded at the most specific node at or above `target`.
    pub fn get_version(&self, target: VfsRelativePath<'_>, case_sensitivity: CaseSensitivity) -> u64 {
        if target.is_empty() {
            return self.version;
        }
        match self.children.lookup(target, case_sensitivity) {
            ChildLookup::ExactMatch(index) | ChildLookup::DescendantOfChild(index) => {
                let entry = self.children.get(index);
                entry.node().get_version(target.from_child(entry.path()), case_sensitivity)
            }
            _ => self.version,
        }
    }

    /// Highest version recorded at, above or below `target`.
    pub fn get_subtree_version(&self, target: VfsRelativePath<'_>, case_sensitivity: CaseSensitivity) -> u64 {
        if target.is_empty() {
            return self.max_version_in_hierarchy;
        }
        match self.children.lookup(target, case_sensitivity) {
            ChildLookup::ExactMatch(index) | ChildLookup::DescendantOfChild(index) => {
                let entry = self.children.get(index);
                entry
                    .node()
                    .get_subtree_version(target.from_child(entry.path()), case_sensitivity)
            }
            ChildLookup::AncestorOfChild(index) => {
                self.version.max(self.children.get(index).node().max_version_in_hierarchy)
            }
            ChildLookup::SiblingOfChild { .. } | ChildLookup::Unrelated { .. } => self.version,
        }
    }

    fn update_version(
        &self,
        target: VfsRelativePath<'_>,
        new_version: u64,
        case_sensitivity: CaseSensitivity,
    ) -> Arc<Self> {
        debug_assert!(new_version > self.max_version_in_hierarchy);
        if target.is_empty() {
            return Self::leaf(new_version);
        }
        let children = match self.children.lookup(target, case_sensitivity) {
            ChildLookup::ExactMatch(index) | ChildLookup::DescendantOfChild(index) => {
                let entry = self.children.get(index);
                let child = entry
                    .node()
                    .update_version(target.from_child(entry.path()), new_version, case_sensitivity);
                self.children.with_replaced_child(index, child)
            }
            ChildLookup::AncestorOfChild(index) => {
                self.children
                    .with_replaced_entry(index, target.as_str(), Self::leaf(new_version))
            }
            ChildLookup::SiblingOfChild {
                index,
                common_prefix_length,
            } => {
                let entry = self.children.get(index);
                let branch_children = ChildMap::from_entries(
                    vec![
                        ChildEntry::new(&entry.path()[common_prefix_length + 1..], entry.node().clone()),
                        ChildEntry::new(&target.as_str()[common_prefix_length + 1..], Self::leaf(new_version)),
                    ],
                    case_sensitivity,
                );
                // The branch point itself was never invalidated, so it inherits
                // the version of this node.
                let branch = Arc::new(VersionHierarchy {
                    children: branch_children,
                    version: self.version,
                    max_version_in_hierarchy: new_version,
                });
                self.children
                    .with_replaced_entry(index, &entry.path()[..common_prefix_length], branch)
            }
            ChildLookup::Unrelated { insert_at } => {
                self.children
                    .with_new_child(insert_at, target.as_str(), Self::leaf(new_version))
            }
        };
        Arc::new(VersionHierarchy {
            children,
            version: self.version,
            max_version_in_hierarchy: new_version,
        })
    }
}

/// Root of the version trie. Immutable; updates return a new root.
#[derive(Clone, Debug)]
pub struct VersionHierarchyRoot {
    root: Arc<VersionHierarchy>,
    case_sensitivity: CaseSensitivity,
}

impl VersionHierarchyRoot {
    pub fn empty(case_sensitivity: CaseSensitivity) -> Self {
        VersionHierarchyRoot {
            root: VersionHierarchy::leaf(0),
            case_sensitivity,
        }
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    pub fn get_version(&self, path: &AbsolutePath) -> u64 {
        self.root.get_version(path.relative(), self.case_sensitivity)
    }

    pub fn get_subtree_version(&self, path: &AbsolutePath) -> u64 {
        self.root.get_subtree_version(path.relative(), self.case_sensitivity)
    }

    /// Highest version handed out so far.
    pub fn max_version(&self) -> u64 {
        self.root.max_version_in_hierarchy
    }

    /// Records an invalidation of `path` with the next version.
    pub fn update_version(&self, path: &AbsolutePath) -> Self {
        let new_version = self.max_version() + 1;
        VersionHierarchyRoot {
            root: self
                .root
                .update_version(path.relative(), new_version, self.case_sensitivity),
            case_sensitivity: self.case_sensitivity,
        }
    }

    /// Everything was invalidated: a single root node with the next version.
    pub fn invalidate_all(&self) -> Self {
        VersionHierarchyRoot {
            root: VersionHierarchy::leaf(self.max_version() + 1),
            case_sensitivity: self.case_sensitivity,
        }
    }
}
