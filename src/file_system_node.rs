//! Persistent trie node of the snapshot hierarchy.
//!
//! Nodes are immutable and `Arc`-shared. Every update returns a new node for
//! the path from the changed location up to the node it was called on; all
//! untouched subtrees are shared with the previous version. Paths passed to
//! node operations are relative to the node itself; the path a node covers is
//! stored in the [`ChildMap`] entry of its parent.

use crate::child_map::{ChildEntry, ChildLookup, ChildMap};
use crate::path_util::{CaseSensitivity, VfsRelativePath};
use crate::snapshot::{AccessType, DirectorySnapshot, FileSystemLocationSnapshot, MetadataSnapshot};
use crate::snapshot_hierarchy::{NodeDiffListener, NoopDiffListener};
use std::sync::Arc;

#[derive(Debug)]
pub enum FileSystemNode {
    /// Complete information about this location and everything below it.
    Snapshot(FileSystemLocationSnapshot),
    /// A directory known to exist. Only the listed children are known.
    PartialDirectory {
        access_type: AccessType,
        children: ChildMap<FileSystemNode>,
    },
    /// Nothing is known about this location itself, only about the children.
    Unknown { children: ChildMap<FileSystemNode> },
}

impl FileSystemNode {
    pub fn empty() -> Self {
        FileSystemNode::Unknown {
            children: ChildMap::empty(),
        }
    }

    pub fn from_snapshot(snapshot: &FileSystemLocationSnapshot) -> Arc<Self> {
        Arc::new(FileSystemNode::Snapshot(snapshot.clone()))
    }

    /// A node that carries no information at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, FileSystemNode::Unknown { children } if children.is_empty())
    }

    pub fn as_snapshot(&self) -> Option<&FileSystemLocationSnapshot> {
        match self {
            FileSystemNode::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&ChildMap<FileSystemNode>> {
        match self {
            FileSystemNode::Snapshot(_) => None,
            FileSystemNode::PartialDirectory { children, .. } | FileSystemNode::Unknown { children } => {
                Some(children)
            }
        }
    }

    /// What is known about the location of this node itself.
    pub fn metadata(&self) -> Option<MetadataSnapshot> {
        match self {
            FileSystemNode::Snapshot(snapshot) => Some(MetadataSnapshot::Location(snapshot.clone())),
            FileSystemNode::PartialDirectory { access_type, .. } => {
                Some(MetadataSnapshot::Directory(*access_type))
            }
            FileSystemNode::Unknown { .. } => None,
        }
    }

    /// True if anything is known strictly below this node.
    pub fn has_descendants(&self) -> bool {
        match self {
            FileSystemNode::Snapshot(FileSystemLocationSnapshot::Directory(dir)) => !dir.children().is_empty(),
            FileSystemNode::Snapshot(_) => false,
            FileSystemNode::PartialDirectory { children, .. } | FileSystemNode::Unknown { children } => {
                !children.is_empty()
            }
        }
    }

    fn with_children(&self, children: ChildMap<FileSystemNode>) -> Self {
        match self {
            FileSystemNode::PartialDirectory { access_type, .. } => FileSystemNode::PartialDirectory {
                access_type: *access_type,
                children,
            },
            FileSystemNode::Unknown { .. } => FileSystemNode::Unknown { children },
            FileSystemNode::Snapshot(_) => {
                debug_assert!(false, "snapshot nodes have no child map");
                FileSystemNode::Unknown { children }
            }
        }
    }

    /// Breaks a complete directory up into a partial directory whose children
    /// are the directory's entries.
    pub fn partial_from_directory(dir: &DirectorySnapshot, case_sensitivity: CaseSensitivity) -> Self {
        FileSystemNode::PartialDirectory {
            access_type: dir.access_type(),
            children: Self::children_of_directory(dir, case_sensitivity),
        }
    }

    fn children_of_directory(dir: &DirectorySnapshot, case_sensitivity: CaseSensitivity) -> ChildMap<FileSystemNode> {
        let entries = dir
            .children()
            .iter()
            .map(|child| ChildEntry::new(child.name(), FileSystemNode::from_snapshot(child)))
            .collect();
        ChildMap::from_entries(entries, case_sensitivity)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Metadata at `target`. `None` means nothing is known, which is distinct
    /// from a stored missing snapshot.
    pub fn get_snapshot(
        &self,
        target: VfsRelativePath<'_>,
        case_sensitivity: CaseSensitivity,
    ) -> Option<MetadataSnapshot> {
        if target.is_empty() {
            return self.metadata();
        }
        match self {
            FileSystemNode::Snapshot(snapshot) => {
                Some(MetadataSnapshot::Location(snapshot.find_descendant(target, case_sensitivity)))
            }
            FileSystemNode::PartialDirectory { children, .. } | FileSystemNode::Unknown { children } => {
                match children.lookup(target, case_sensitivity) {
                    ChildLookup::ExactMatch(index) | ChildLookup::DescendantOfChild(index) => {
                        let entry = children.get(index);
                        entry
                            .node()
                            .get_snapshot(target.from_child(entry.path()), case_sensitivity)
                    }
                    _ => None,
                }
            }
        }
    }

    pub fn has_descendants_under(&self, target: VfsRelativePath<'_>, case_sensitivity: CaseSensitivity) -> bool {
        if target.is_empty() {
            return self.has_descendants();
        }
        match self {
            FileSystemNode::Snapshot(snapshot) => {
                match snapshot.find_descendant(target, case_sensitivity) {
                    FileSystemLocationSnapshot::Directory(dir) => !dir.children().is_empty(),
                    _ => false,
                }
            }
            FileSystemNode::PartialDirectory { children, .. } | FileSystemNode::Unknown { children } => {
                match children.lookup(target, case_sensitivity) {
                    ChildLookup::ExactMatch(index) | ChildLookup::DescendantOfChild(index) => {
                        let entry = children.get(index);
                        entry
                            .node()
                            .has_descendants_under(target.from_child(entry.path()), case_sensitivity)
                    }
                    ChildLookup::AncestorOfChild(_) => true,
                    ChildLookup::SiblingOfChild { .. } | ChildLookup::Unrelated { .. } => false,
                }
            }
        }
    }

    /// Calls `visitor` for every snapshot node in this subtree without
    /// descending into the snapshots themselves.
    pub fn visit_snapshot_roots(&self, visitor: &mut dyn FnMut(&FileSystemLocationSnapshot)) {
        match self {
            FileSystemNode::Snapshot(snapshot) => visitor(snapshot),
            FileSystemNode::PartialDirectory { children, .. } | FileSystemNode::Unknown { children } => {
                for entry in children.entries() {
                    entry.node().visit_snapshot_roots(visitor);
                }
            }
        }
    }

    /// Like [`visit_snapshot_roots`](Self::visit_snapshot_roots), restricted to
    /// stored snapshots at or below `target`.
    pub fn visit_snapshot_roots_under(
        &self,
        target: VfsRelativePath<'_>,
        case_sensitivity: CaseSensitivity,
        visitor: &mut dyn FnMut(&FileSystemLocationSnapshot),
    ) {
        if target.is_empty() {
            self.visit_snapshot_roots(visitor);
            return;
        }
        match self {
            FileSystemNode::Snapshot(FileSystemLocationSnapshot::Directory(dir)) => {
                if let Some(found) = dir.get_descendant(target, case_sensitivity) {
                    visitor(found);
                }
            }
            FileSystemNode::Snapshot(_) => {}
            FileSystemNode::PartialDirectory { children, .. } | FileSystemNode::Unknown { children } => {
                match children.lookup(target, case_sensitivity) {
                    ChildLookup::ExactMatch(index) | ChildLookup::DescendantOfChild(index) => {
                        let entry = children.get(index);
                        entry.node().visit_snapshot_roots_under(
                            target.from_child(entry.path()),
                            case_sensitivity,
                            visitor,
                        );
                    }
                    ChildLookup::AncestorOfChild(index) => children.get(index).node().visit_snapshot_roots(visitor),
                    ChildLookup::SiblingOfChild { .. } | ChildLookup::Unrelated { .. } => {}
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Store
    // ------------------------------------------------------------------------

    /// Records `snapshot` at `target`. Returns `self` (the same `Arc`) when
    /// nothing changed.
    pub fn store(
        self: &Arc<Self>,
        target: VfsRelativePath<'_>,
        snapshot: &FileSystemLocationSnapshot,
        case_sensitivity: CaseSensitivity,
        listener: &mut dyn NodeDiffListener,
    ) -> Arc<Self> {
        if target.is_empty() {
            return self.store_here(snapshot, listener);
        }
        match self.as_ref() {
            FileSystemNode::Snapshot(existing) => {
                self.store_below_snapshot(existing, target, snapshot, case_sensitivity, listener)
            }
            FileSystemNode::PartialDirectory { children, .. } | FileSystemNode::Unknown { children } => {
                match Self::store_in_children(children, target, snapshot, case_sensitivity, listener) {
                    Some(children) => Arc::new(self.with_children(children)),
                    None => self.clone(),
                }
            }
        }
    }

    fn store_here(self: &Arc<Self>, snapshot: &FileSystemLocationSnapshot, listener: &mut dyn NodeDiffListener) -> Arc<Self> {
        if let FileSystemNode::Snapshot(existing) = self.as_ref() {
            if existing.is_content_up_to_date(snapshot) {
                return self.clone();
            }
        }
        if !self.is_empty() {
            listener.node_removed(self);
        }
        let stored = FileSystemNode::from_snapshot(snapshot);
        listener.node_added(&stored);
        stored
    }

    fn store_below_snapshot(
        self: &Arc<Self>,
        existing: &FileSystemLocationSnapshot,
        target: VfsRelativePath<'_>,
        snapshot: &FileSystemLocationSnapshot,
        case_sensitivity: CaseSensitivity,
        listener: &mut dyn NodeDiffListener,
    ) -> Arc<Self> {
        if existing
            .find_descendant(target, case_sensitivity)
            .is_content_up_to_date(snapshot)
        {
            return self.clone();
        }

        let updated = match existing {
            FileSystemLocationSnapshot::Directory(dir) => {
                let children = Self::children_of_directory(dir, case_sensitivity);
                let children = Self::store_in_children(&children, target, snapshot, case_sensitivity, &mut NoopDiffListener)
                    .unwrap_or(children);
                FileSystemNode::PartialDirectory {
                    access_type: dir.access_type(),
                    children,
                }
            }
            // Something appeared below a file or missing location, so it is a
            // directory now.
            FileSystemLocationSnapshot::RegularFile(_) | FileSystemLocationSnapshot::Missing(_) => {
                FileSystemNode::PartialDirectory {
                    access_type: existing.access_type(),
                    children: ChildMap::single(target.as_str(), FileSystemNode::from_snapshot(snapshot)),
                }
            }
        };
        let updated = Arc::new(updated);
        listener.node_removed(self);
        listener.node_added(&updated);
        updated
    }

    /// `None` if the children are unchanged.
    fn store_in_children(
        children: &ChildMap<FileSystemNode>,
        target: VfsRelativePath<'_>,
        snapshot: &FileSystemLocationSnapshot,
        case_sensitivity: CaseSensitivity,
        listener: &mut dyn NodeDiffListener,
    ) -> Option<ChildMap<FileSystemNode>> {
        match children.lookup(target, case_sensitivity) {
            ChildLookup::ExactMatch(index) | ChildLookup::DescendantOfChild(index) => {
                let entry = children.get(index);
                let child = entry.node();
                let new_child = child.store(target.from_child(entry.path()), snapshot, case_sensitivity, listener);
                if Arc::ptr_eq(child, &new_child) {
                    None
                } else {
                    Some(children.with_replaced_child(index, new_child))
                }
            }
            ChildLookup::AncestorOfChild(index) => {
                let stored = FileSystemNode::from_snapshot(snapshot);
                listener.node_removed(children.get(index).node());
                listener.node_added(&stored);
                Some(children.with_replaced_entry(index, target.as_str(), stored))
            }
            ChildLookup::SiblingOfChild {
                index,
                common_prefix_length,
            } => {
                let entry = children.get(index);
                let stored = FileSystemNode::from_snapshot(snapshot);
                listener.node_added(&stored);

                let branch_children = ChildMap::from_entries(
                    vec![
                        ChildEntry::new(&entry.path()[common_prefix_length + 1..], entry.node().clone()),
                        ChildEntry::new(&target.as_str()[common_prefix_length + 1..], stored),
                    ],
                    case_sensitivity,
                );
                let branch = Arc::new(FileSystemNode::Unknown {
                    children: branch_children,
                });
                Some(children.with_replaced_entry(index, &entry.path()[..common_prefix_length], branch))
            }
            ChildLookup::Unrelated { insert_at } => {
                let stored = FileSystemNode::from_snapshot(snapshot);
                listener.node_added(&stored);
                Some(children.with_new_child(insert_at, target.as_str(), stored))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Invalidate
    // ------------------------------------------------------------------------

    /// Removes everything known at or below `target`. `None` means nothing is
    /// left of this node.
    pub fn invalidate(
        self: &Arc<Self>,
        target: VfsRelativePath<'_>,
        case_sensitivity: CaseSensitivity,
        listener: &mut dyn NodeDiffListener,
    ) -> Option<Arc<Self>> {
        if target.is_empty() {
            if !self.is_empty() {
                listener.node_removed(self);
            }
            return None;
        }
        match self.as_ref() {
            FileSystemNode::Snapshot(FileSystemLocationSnapshot::Directory(dir)) => {
                // The directory stays known to exist, its other entries stay known.
                let children = Self::children_of_directory(dir, case_sensitivity);
                let children = Self::invalidate_in_children(&children, target, case_sensitivity, &mut NoopDiffListener)
                    .unwrap_or(children);
                let updated = Arc::new(FileSystemNode::PartialDirectory {
                    access_type: dir.access_type(),
                    children,
                });
                listener.node_removed(self);
                listener.node_added(&updated);
                Some(updated)
            }
            FileSystemNode::Snapshot(_) => {
                listener.node_removed(self);
                None
            }
            FileSystemNode::PartialDirectory { children, .. } | FileSystemNode::Unknown { children } => {
                match Self::invalidate_in_children(children, target, case_sensitivity, listener) {
                    None => Some(self.clone()),
                    Some(remaining) => {
                        if remaining.is_empty() && matches!(self.as_ref(), FileSystemNode::Unknown { .. }) {
                            None
                        } else {
                            Some(Arc::new(self.with_children(remaining)))
                        }
                    }
                }
            }
        }
    }

    /// `None` if the children are unchanged.
    fn invalidate_in_children(
        children: &ChildMap<FileSystemNode>,
        target: VfsRelativePath<'_>,
        case_sensitivity: CaseSensitivity,
        listener: &mut dyn NodeDiffListener,
    ) -> Option<ChildMap<FileSystemNode>> {
        match children.lookup(target, case_sensitivity) {
            ChildLookup::ExactMatch(index) | ChildLookup::DescendantOfChild(index) => {
                let entry = children.get(index);
                let child = entry.node();
                match child.invalidate(target.from_child(entry.path()), case_sensitivity, listener) {
                    Some(new_child) if Arc::ptr_eq(child, &new_child) => None,
                    Some(new_child) => Some(children.with_replaced_child(index, new_child)),
                    None => Some(children.with_removed_child(index)),
                }
            }
            ChildLookup::AncestorOfChild(index) => {
                listener.node_removed(children.get(index).node());
                Some(children.with_removed_child(index))
            }
            ChildLookup::SiblingOfChild { .. } | ChildLookup::Unrelated { .. } => None,
        }
    }
}
