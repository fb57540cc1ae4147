//! Sorted, copy-on-write child collection shared by the snapshot trie and the
//! version trie.
//!
//! Every entry owns a path relative to the parent node (one or more segments)
//! and an `Arc`-shared child. Entries are ordered by their first segment and no
//! two entries share a first segment, so a lookup touches at most one entry.

use crate::path_util::{compare_segments, first_segment, CaseSensitivity, VfsRelativePath};
use std::cmp::Ordering;
use std::sync::Arc;

pub struct ChildEntry<T> {
    path: Arc<str>,
    node: Arc<T>,
}

impl<T> ChildEntry<T> {
    pub fn new(path: impl Into<Arc<str>>, node: Arc<T>) -> Self {
        ChildEntry {
            path: path.into(),
            node,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn node(&self) -> &Arc<T> {
        &self.node
    }
}

// Derive would require `T: Clone`.
impl<T> Clone for ChildEntry<T> {
    fn clone(&self) -> Self {
        ChildEntry {
            path: self.path.clone(),
            node: self.node.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ChildEntry<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ChildEntry").field(&self.path).field(&self.node).finish()
    }
}

/// How a target path relates to the entries of a [`ChildMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildLookup {
    /// The target is exactly the entry's path.
    ExactMatch(usize),
    /// The target lies below the entry.
    DescendantOfChild(usize),
    /// The entry lies below the target.
    AncestorOfChild(usize),
    /// Target and entry share the first `common_prefix_length` bytes (whole
    /// segments) and then diverge.
    SiblingOfChild {
        index: usize,
        common_prefix_length: usize,
    },
    /// No entry shares a first segment with the target.
    Unrelated { insert_at: usize },
}

pub struct ChildMap<T> {
    entries: Vec<ChildEntry<T>>,
}

impl<T> Clone for ChildMap<T> {
    fn clone(&self) -> Self {
        ChildMap {
            entries: self.entries.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ChildMap<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

impl<T> Default for ChildMap<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> ChildMap<T> {
    pub fn empty() -> Self {
        ChildMap { entries: Vec::new() }
    }

    pub fn single(path: impl Into<Arc<str>>, node: Arc<T>) -> Self {
        ChildMap {
            entries: vec![ChildEntry::new(path, node)],
        }
    }

    /// Builds a map from entries in any order. Entries whose first segments
    /// are equal under `case_sensitivity` (`a` and `A` when case is folded)
    /// collapse to the one that came first.
    pub fn from_entries(mut entries: Vec<ChildEntry<T>>, case_sensitivity: CaseSensitivity) -> Self {
        let by_segment = |a: &ChildEntry<T>, b: &ChildEntry<T>| {
            compare_segments(first_segment(&a.path), first_segment(&b.path), case_sensitivity)
        };
        entries.sort_by(by_segment);
        entries.dedup_by(|later, kept| by_segment(&*later, &*kept) == Ordering::Equal);
        let map = ChildMap { entries };
        debug_assert!(map.is_strictly_sorted(case_sensitivity));
        map
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChildEntry<T>] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> &ChildEntry<T> {
        &self.entries[index]
    }

    /// Classifies `target` against the entries. `target` must not be empty.
    pub fn lookup(&self, target: VfsRelativePath<'_>, case_sensitivity: CaseSensitivity) -> ChildLookup {
        debug_assert!(!target.is_empty());
        let index = match self
            .entries
            .binary_search_by(|entry| target.compare_to_first_segment(&entry.path, case_sensitivity))
        {
            Ok(index) => index,
            Err(insert_at) => return ChildLookup::Unrelated { insert_at },
        };

        let child_path = self.entries[index].path();
        let common = target.length_of_common_prefix(child_path, case_sensitivity);
        let covers_child = common == child_path.len();
        let covers_target = common == target.len();
        match (covers_child, covers_target) {
            (true, true) => ChildLookup::ExactMatch(index),
            (true, false) => ChildLookup::DescendantOfChild(index),
            (false, true) => ChildLookup::AncestorOfChild(index),
            (false, false) => {
                debug_assert!(common > 0);
                ChildLookup::SiblingOfChild {
                    index,
                    common_prefix_length: common,
                }
            }
        }
    }

    pub fn with_new_child(&self, insert_at: usize, path: impl Into<Arc<str>>, node: Arc<T>) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend_from_slice(&self.entries[..insert_at]);
        entries.push(ChildEntry::new(path, node));
        entries.extend_from_slice(&self.entries[insert_at..]);
        ChildMap { entries }
    }

    /// Replaces the node at `index`, keeping its path.
    pub fn with_replaced_child(&self, index: usize, node: Arc<T>) -> Self {
        let path = self.entries[index].path.clone();
        self.with_replaced_entry(index, path, node)
    }

    /// Replaces path and node at `index`. The new path must keep the first
    /// segment of the old one.
    pub fn with_replaced_entry(&self, index: usize, path: impl Into<Arc<str>>, node: Arc<T>) -> Self {
        let mut entries = self.entries.clone();
        entries[index] = ChildEntry::new(path, node);
        ChildMap { entries }
    }

    pub fn with_removed_child(&self, index: usize) -> Self {
        let mut entries = self.entries.clone();
        entries.remove(index);
        ChildMap { entries }
    }

    fn is_strictly_sorted(&self, case_sensitivity: CaseSensitivity) -> bool {
        self.entries.windows(2).all(|pair| {
            compare_segments(
                first_segment(&pair[0].path),
                first_segment(&pair[1].path),
                case_sensitivity,
            )
            .is_lt()
        })
    }
}
