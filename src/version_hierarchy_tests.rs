use crate::path_util::CaseSensitivity::*;
use crate::test_utils::path;
use crate::version_hierarchy::VersionHierarchyRoot;

fn invalidated(paths: &[&str]) -> VersionHierarchyRoot {
    paths
        .iter()
        .fold(VersionHierarchyRoot::empty(CaseSensitive), |versions, p| {
            versions.update_version(&path(p))
        })
}

#[test]
fn empty_hierarchy_is_at_version_zero() {
    let versions = VersionHierarchyRoot::empty(CaseSensitive);
    assert_eq!(versions.max_version(), 0);
    assert_eq!(versions.get_version(&path("/a/b")), 0);
    assert_eq!(versions.get_subtree_version(&path("/a/b")), 0);
}

#[test]
fn invalidation_covers_the_path_and_its_descendants() {
    let versions = invalidated(&["/a/b"]);
    assert_eq!(versions.max_version(), 1);
    assert_eq!(versions.get_version(&path("/a/b")), 1);
    assert_eq!(versions.get_version(&path("/a/b/c/d")), 1);
    assert_eq!(versions.get_version(&path("/a")), 0);
    assert_eq!(versions.get_version(&path("/a/c")), 0);
    assert_eq!(versions.get_version(&path("/x")), 0);
}

#[test]
fn subtree_version_sees_invalidations_below() {
    let versions = invalidated(&["/a/b/c"]);
    assert_eq!(versions.get_version(&path("/a")), 0);
    assert_eq!(versions.get_subtree_version(&path("/a")), 1);
    assert_eq!(versions.get_subtree_version(&path("/a/b")), 1);
    assert_eq!(versions.get_subtree_version(&path("/a/b/c/d")), 1);
    assert_eq!(versions.get_subtree_version(&path("/a/x")), 0);
    assert_eq!(versions.get_subtree_version(&path("/a/b/x")), 0);
}

#[test]
fn versions_increase_strictly() {
    let mut versions = VersionHierarchyRoot::empty(CaseSensitive);
    let mut last = versions.max_version();
    for p in ["/a", "/a/b", "/c", "/a", "/a/b/c/d"] {
        versions = versions.update_version(&path(p));
        assert!(versions.max_version() > last);
        assert_eq!(versions.get_version(&path(p)), versions.max_version());
        last = versions.max_version();
    }
    assert_eq!(last, 5);
}

#[test]
fn more_specific_invalidation_wins() {
    let versions = invalidated(&["/a", "/a/b"]);
    assert_eq!(versions.get_version(&path("/a/b")), 2);
    assert_eq!(versions.get_version(&path("/a/c")), 1);
    assert_eq!(versions.get_version(&path("/a")), 1);
}

#[test]
fn ancestor_invalidation_replaces_descendant_versions() {
    let versions = invalidated(&["/a/b", "/a/c", "/a"]);
    assert_eq!(versions.get_version(&path("/a/b")), 3);
    assert_eq!(versions.get_version(&path("/a/c")), 3);
    assert_eq!(versions.get_subtree_version(&path("/a")), 3);
}

#[test]
fn split_point_inherits_the_enclosing_version() {
    let versions = invalidated(&["/a/b/c", "/a/b/d"]);
    assert_eq!(versions.get_version(&path("/a/b")), 0);
    assert_eq!(versions.get_version(&path("/a/b/c")), 1);
    assert_eq!(versions.get_version(&path("/a/b/d")), 2);
    assert_eq!(versions.get_subtree_version(&path("/a/b")), 2);

    let versions = invalidated(&["/a", "/a/b/c", "/a/b/d"]);
    assert_eq!(versions.get_version(&path("/a/b")), 1);
    assert_eq!(versions.get_version(&path("/a/b/c")), 2);
    assert_eq!(versions.get_version(&path("/a/b/d")), 3);
}

#[test]
fn older_roots_are_unchanged() {
    let first = invalidated(&["/a"]);
    let second = first.update_version(&path("/a/b"));
    assert_eq!(first.get_version(&path("/a/b")), 1);
    assert_eq!(second.get_version(&path("/a/b")), 2);
}

#[test]
fn invalidate_all_moves_everything_to_a_new_version() {
    let versions = invalidated(&["/a", "/b/c"]).invalidate_all();
    assert_eq!(versions.max_version(), 3);
    for p in ["/a", "/b", "/b/c", "/never/seen"] {
        assert_eq!(versions.get_version(&path(p)), 3);
        assert_eq!(versions.get_subtree_version(&path(p)), 3);
    }
}

#[test]
fn case_insensitive_versions_fold_case() {
    let versions = VersionHierarchyRoot::empty(CaseInsensitive).update_version(&path("/Src/Main.rs"));
    assert_eq!(versions.get_version(&path("/src/main.rs")), 1);
    assert_eq!(versions.get_subtree_version(&path("/SRC")), 1);

    let versions = VersionHierarchyRoot::empty(CaseSensitive).update_version(&path("/Src/Main.rs"));
    assert_eq!(versions.get_version(&path("/src/main.rs")), 0);
}
