use crate::config::{ProducerGuardConfig, VfsConfig};
use crate::path_util::{AbsolutePath, CaseSensitivity::*};
use crate::snapshot::{AccessType, FileSystemLocationSnapshot, MetadataSnapshot};
use crate::snapshot_hierarchy::SnapshotDiffListener;
use crate::test_utils::{directory, missing, path, regular_file};
use crate::virtual_file_system::{FileChangeEvent, FileChangeType, VirtualFileSystem};
use crate::{anyhow_loc, assert_err};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn vfs() -> VirtualFileSystem {
    VirtualFileSystem::with_case_sensitivity(CaseSensitive)
}

fn vfs_with_guard(producer_guard: ProducerGuardConfig) -> VirtualFileSystem {
    VirtualFileSystem::new(&VfsConfig {
        case_sensitivity: CaseSensitive,
        producer_guard,
        ..VfsConfig::default()
    })
}

type RecordedDiff = (Vec<String>, Vec<String>);

/// Records every published diff as lists of paths.
#[derive(Clone, Default)]
struct RecordingListener {
    diffs: Arc<Mutex<Vec<RecordedDiff>>>,
}

impl RecordingListener {
    fn take(&self) -> Vec<RecordedDiff> {
        std::mem::take(&mut *self.diffs.lock().unwrap())
    }
}

impl SnapshotDiffListener for RecordingListener {
    fn changed(&self, removed: &[FileSystemLocationSnapshot], added: &[FileSystemLocationSnapshot]) {
        let names = |snapshots: &[FileSystemLocationSnapshot]| {
            snapshots
                .iter()
                .map(|s| s.absolute_path().as_str().to_owned())
                .collect::<Vec<_>>()
        };
        self.diffs.lock().unwrap().push((names(removed), names(added)));
    }
}

fn diff(removed: &[&str], added: &[&str]) -> RecordedDiff {
    (
        removed.iter().map(|s| s.to_string()).collect(),
        added.iter().map(|s| s.to_string()).collect(),
    )
}

// ---------------------------------------------------------------------------
// Read and store
// ---------------------------------------------------------------------------

#[test]
fn read_scans_once_then_serves_from_cache() {
    let vfs = vfs();
    let scans = AtomicUsize::new(0);
    let scan = |p: &AbsolutePath| {
        scans.fetch_add(1, Ordering::SeqCst);
        Ok(regular_file(p.as_str(), 9))
    };

    let first = vfs.read(&path("/f"), scan).unwrap();
    let second = vfs.read(&path("/f"), scan).unwrap();
    assert_eq!(first, second);
    assert_eq!(scans.load(Ordering::SeqCst), 1);
    assert_eq!(vfs.find_snapshot(&path("/f")), Some(regular_file("/f", 9)));
}

#[test]
fn read_resolves_children_of_cached_directories() {
    let vfs = vfs();
    vfs.store(&directory("/d", vec![regular_file("/d/x", 1)]));
    let x = vfs
        .read(&path("/d/x"), |p| Err(anyhow_loc!("unexpected scan of [{}]", p)))
        .unwrap();
    assert_eq!(x, regular_file("/d/x", 1));
}

#[test]
fn failed_scan_stores_nothing() {
    let vfs = vfs();
    assert_err!(vfs.read(&path("/f"), |p| Err(anyhow_loc!("cannot read [{}]", p))));
    assert_eq!(vfs.find_metadata(&path("/f")), None);
    assert!(vfs.root().is_empty());
}

#[test]
fn store_metadata_skips_partial_directories() {
    let vfs = vfs();
    vfs.store_metadata(&MetadataSnapshot::Directory(AccessType::Direct));
    assert!(vfs.root().is_empty());

    vfs.store_metadata(&MetadataSnapshot::Location(missing("/m")));
    assert_eq!(vfs.find_snapshot(&path("/m")), Some(missing("/m")));
}

#[test]
fn snapshots_taken_before_an_update_stay_valid() {
    let vfs = vfs();
    vfs.store(&regular_file("/a", 1));
    let before = vfs.root();
    vfs.invalidate([&path("/a")]);
    assert_eq!(before.find_snapshot(&path("/a")), Some(regular_file("/a", 1)));
    assert_eq!(vfs.find_snapshot(&path("/a")), None);
}

// ---------------------------------------------------------------------------
// Races between scans and invalidation
// ---------------------------------------------------------------------------

#[test]
fn invalidation_during_scan_discards_the_result() {
    let vfs = vfs();
    let f = path("/f");
    let result = vfs.store_with_action(&f, || {
        vfs.invalidate([&f]);
        Ok(regular_file("/f", 1))
    });
    // The caller still gets what it scanned.
    assert_eq!(result.unwrap(), regular_file("/f", 1));
    assert_eq!(vfs.find_metadata(&f), None);
}

#[test]
fn ancestor_or_descendant_invalidation_during_scan_discards_the_result() {
    for invalidated in ["/a", "/a/b/c"] {
        let vfs = vfs();
        let base = path("/a/b");
        vfs.store_with_action(&base, || {
            vfs.invalidate([&path(invalidated)]);
            Ok(directory("/a/b", vec![regular_file("/a/b/c", 1)]))
        })
        .unwrap();
        assert_eq!(vfs.find_metadata(&base), None, "{invalidated}");
    }
}

#[test]
fn unrelated_invalidation_during_scan_keeps_the_result() {
    let vfs = vfs();
    vfs.store_with_action(&path("/a/b"), || {
        vfs.invalidate([&path("/a/c")]);
        Ok(regular_file("/a/b", 1))
    })
    .unwrap();
    assert_eq!(vfs.find_snapshot(&path("/a/b")), Some(regular_file("/a/b", 1)));
}

#[test]
fn invalidation_from_another_thread_wins_over_slow_scan() {
    let vfs = vfs();
    let f = path("/f");
    let scan_started = Barrier::new(2);
    let invalidated = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|| {
            vfs.read(&f, |p| {
                scan_started.wait();
                invalidated.wait();
                Ok(regular_file(p.as_str(), 1))
            })
            .unwrap();
        });
        s.spawn(|| {
            scan_started.wait();
            vfs.invalidate([&f]);
            invalidated.wait();
        });
    });

    assert_eq!(vfs.find_metadata(&f), None);
    assert_eq!(vfs.version_for(&f), 1);
}

// ---------------------------------------------------------------------------
// Single flight
// ---------------------------------------------------------------------------

fn concurrent_reads_scan_once(vfs: VirtualFileSystem) {
    const THREADS: usize = 8;
    let scans = AtomicUsize::new(0);
    let start = Barrier::new(THREADS);
    let p = path("/never/seen");

    let results: Vec<FileSystemLocationSnapshot> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    vfs.read(&p, |p| {
                        scans.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(regular_file(p.as_str(), 3))
                    })
                    .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(scans.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| *r == regular_file("/never/seen", 3)));
}

#[test]
fn concurrent_reads_scan_once_striped() {
    concurrent_reads_scan_once(vfs_with_guard(ProducerGuardConfig::Striped { stripes: 4 }));
}

#[test]
fn concurrent_reads_scan_once_adaptive() {
    concurrent_reads_scan_once(vfs_with_guard(ProducerGuardConfig::Adaptive));
}

#[test]
fn scan_can_read_other_locations_on_the_same_stripe() {
    let vfs = vfs_with_guard(ProducerGuardConfig::Striped { stripes: 1 });
    let outer = vfs
        .read(&path("/outer"), |p| {
            let inner = vfs.read(&path("/inner"), |p| Ok(regular_file(p.as_str(), 1)))?;
            assert_eq!(inner, regular_file("/inner", 1));
            Ok(regular_file(p.as_str(), 2))
        })
        .unwrap();
    assert_eq!(outer, regular_file("/outer", 2));
    assert_eq!(vfs.find_snapshot(&path("/inner")), Some(regular_file("/inner", 1)));
    assert_eq!(vfs.find_snapshot(&path("/outer")), Some(regular_file("/outer", 2)));
}

#[test]
fn concurrent_reads_of_different_paths_all_land() {
    let vfs = vfs_with_guard(ProducerGuardConfig::Adaptive);
    let paths: Vec<AbsolutePath> = (0..16).map(|i| path(&format!("/dir/file{i}"))).collect();

    thread::scope(|s| {
        for p in &paths {
            let vfs = &vfs;
            s.spawn(move || vfs.read(p, |p| Ok(regular_file(p.as_str(), 1))).unwrap());
        }
    });

    for p in &paths {
        assert_eq!(vfs.find_snapshot(p), Some(regular_file(p.as_str(), 1)));
    }
    assert_eq!(vfs.statistics().retained_regular_files, 16);
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

#[test]
fn drained_events_invalidate_their_paths() {
    let vfs = vfs();
    vfs.store(&regular_file("/a/b", 1));
    vfs.store(&regular_file("/c", 2));

    let (tx, rx) = crossbeam::channel::unbounded();
    tx.send(FileChangeEvent::new(FileChangeType::Modified, path("/a/b"))).unwrap();
    tx.send(FileChangeEvent::new(FileChangeType::Created, path("/a/new"))).unwrap();

    assert_eq!(vfs.drain_events(&rx), 2);
    assert_eq!(vfs.find_metadata(&path("/a/b")), None);
    assert_eq!(vfs.find_snapshot(&path("/c")), Some(regular_file("/c", 2)));
    assert_eq!(vfs.drain_events(&rx), 0);
}

#[test]
fn overflow_invalidates_everything() {
    let vfs = vfs();
    vfs.store(&regular_file("/a", 1));
    vfs.store(&directory("/d", vec![regular_file("/d/x", 2)]));
    let version_before = vfs.version_for(&path("/a"));

    vfs.update([
        FileChangeEvent::new(FileChangeType::Removed, path("/a")),
        FileChangeEvent::new(FileChangeType::Overflow, path("/d")),
    ]);
    assert!(vfs.root().is_empty());
    assert!(vfs.version_for(&path("/elsewhere")) > version_before);
}

// ---------------------------------------------------------------------------
// Diff listener
// ---------------------------------------------------------------------------

#[test]
fn diff_listener_sees_each_update() {
    let listener = RecordingListener::default();
    let vfs = vfs().with_diff_listener(Box::new(listener.clone()));

    vfs.store(&regular_file("/a", 1));
    vfs.store(&regular_file("/a", 1));
    vfs.store(&regular_file("/b", 2));
    assert_eq!(listener.take(), vec![diff(&[], &["/a"]), diff(&[], &["/b"])]);

    vfs.store(&regular_file("/a", 3));
    assert_eq!(listener.take(), vec![diff(&["/a"], &["/a"])]);

    vfs.invalidate([&path("/b"), &path("/unknown")]);
    assert_eq!(listener.take(), vec![diff(&["/b"], &[])]);

    vfs.store(&regular_file("/c", 4));
    listener.take();
    vfs.invalidate_all();
    assert_eq!(listener.take(), vec![diff(&["/a", "/c"], &[])]);

    vfs.invalidate_all();
    assert!(listener.take().is_empty());
}
