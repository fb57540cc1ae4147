use std::time::{Duration, Instant, SystemTime};
use vfs_snapshot::snapshot::{AccessType, FileMetadata};
use vfs_snapshot::snapshot_hierarchy::NoopDiffListener;
use vfs_snapshot::util::format_duration;
use vfs_snapshot::{AbsolutePath, CaseSensitivity, ContentHash, FileSystemLocationSnapshot, SnapshotHierarchy};

const DIRS: usize = 64;
const FILES_PER_DIR: usize = 256;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn file_path(dir: usize, file: usize) -> AbsolutePath {
    AbsolutePath::new(format!("/workspace/module{dir}/src/file{file}.rs")).expect("valid path")
}

fn file(dir: usize, file: usize, hash: u128) -> FileSystemLocationSnapshot {
    FileSystemLocationSnapshot::regular_file(
        file_path(dir, file),
        ContentHash(hash),
        FileMetadata {
            length: hash as u64,
            last_modified: SystemTime::UNIX_EPOCH,
        },
        AccessType::Direct,
    )
}

fn source_dir(dir: usize) -> FileSystemLocationSnapshot {
    let path = AbsolutePath::new(format!("/workspace/module{dir}/src")).expect("valid path");
    let children = (0..FILES_PER_DIR).map(|f| file(dir, f, (dir * FILES_PER_DIR + f) as u128)).collect();
    FileSystemLocationSnapshot::directory(path, AccessType::Direct, children)
}

/// Run a closure for N iterations and print timing stats.
fn bench_run(name: &str, iterations: usize, mut f: impl FnMut() -> Duration) {
    println!("\n--- {name} ---");

    let mut timings = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        timings.push(f());
    }

    timings.sort();
    let total: Duration = timings.iter().sum();
    println!(
        "  Min: {} | Avg: {} | Median: {} | Max: {}",
        format_duration(timings[0]),
        format_duration(total / iterations as u32),
        format_duration(timings[iterations / 2]),
        format_duration(timings[iterations - 1]),
    );
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_store_files(case_sensitivity: CaseSensitivity) {
    let snapshots: Vec<_> = (0..DIRS)
        .flat_map(|d| (0..FILES_PER_DIR).map(move |f| file(d, f, 1)))
        .collect();
    bench_run(
        &format!("store {} single files [{:?}]", snapshots.len(), case_sensitivity),
        10,
        || {
            let start = Instant::now();
            let mut hierarchy = SnapshotHierarchy::empty(case_sensitivity);
            for snapshot in &snapshots {
                hierarchy = hierarchy.store(snapshot, &mut NoopDiffListener);
            }
            let elapsed = start.elapsed();
            assert_eq!(hierarchy.statistics().retained_regular_files, snapshots.len());
            elapsed
        },
    );
}

fn populated(case_sensitivity: CaseSensitivity) -> SnapshotHierarchy {
    (0..DIRS).fold(SnapshotHierarchy::empty(case_sensitivity), |hierarchy, d| {
        hierarchy.store(&source_dir(d), &mut NoopDiffListener)
    })
}

fn bench_lookup(case_sensitivity: CaseSensitivity) {
    let hierarchy = populated(case_sensitivity);
    let paths: Vec<_> = (0..DIRS)
        .flat_map(|d| (0..FILES_PER_DIR).map(move |f| file_path(d, f)))
        .collect();
    bench_run(
        &format!("find_snapshot x{} [{:?}]", paths.len(), case_sensitivity),
        10,
        || {
            let start = Instant::now();
            let found = paths.iter().filter(|p| hierarchy.find_snapshot(p).is_some()).count();
            let elapsed = start.elapsed();
            assert_eq!(found, paths.len());
            elapsed
        },
    );
}

fn bench_invalidate(case_sensitivity: CaseSensitivity) {
    let hierarchy = populated(case_sensitivity);
    bench_run(
        &format!("invalidate one file in each of {DIRS} directories [{:?}]", case_sensitivity),
        10,
        || {
            let start = Instant::now();
            let mut current = hierarchy.clone();
            for d in 0..DIRS {
                current = current.invalidate(&file_path(d, FILES_PER_DIR / 2), &mut NoopDiffListener);
            }
            let elapsed = start.elapsed();
            assert_eq!(
                current.statistics().retained_regular_files,
                DIRS * (FILES_PER_DIR - 1)
            );
            elapsed
        },
    );
}

fn main() {
    for case_sensitivity in [CaseSensitivity::CaseSensitive, CaseSensitivity::CaseInsensitive] {
        bench_store_files(case_sensitivity);
        bench_lookup(case_sensitivity);
        bench_invalidate(case_sensitivity);
    }
}
