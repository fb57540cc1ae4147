//! Disk scanner producing [`FileSystemLocationSnapshot`]s.
//!
//! Regular files are hashed according to the [`HashMode`]. Directories are
//! walked in parallel with `jwalk` and assembled bottom-up into nested
//! [`DirectorySnapshot`](crate::snapshot::DirectorySnapshot)s. Symbolic links
//! are followed; everything reached through a link is marked
//! [`AccessType::ViaSymlink`]. A broken link is a missing file, and a link
//! back to a directory already being walked is skipped. Anything that is
//! neither a file nor a directory (sockets, fifos, devices) is an error.

use crate::config::VfsConfig;
use crate::path_util::AbsolutePath;
use crate::snapshot::{AccessType, ContentHash, FileMetadata, FileSystemLocationSnapshot};
use crate::{anyhow_loc, bail_loc, timed_span};
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Hashing strategy for regular files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// mtime + size. One `stat` per file, but can miss same-size writes
    /// within the same filesystem timestamp quantum.
    Fast,
    /// xxh3-128 of the file content.
    Full,
}

// ---------------------------------------------------------------------------
// Default excludes
// ---------------------------------------------------------------------------

/// Names skipped while walking directories.
///
/// Patterns follow the usual ant style restricted to single names: a leading
/// `**/` is ignored, a trailing `/**` excludes directories with that name, and
/// a single `*` matches any run of characters in a file name.
#[derive(Clone, Debug, Default)]
pub struct DefaultExcludes {
    file_names: HashSet<String>,
    dir_names: HashSet<String>,
    file_patterns: Vec<(String, String)>,
}

impl DefaultExcludes {
    pub const DEFAULT_PATTERNS: &'static [&'static str] = &[
        "**/%*%",
        "**/.#*",
        "**/._*",
        "**/#*#",
        "**/*~",
        "**/.DS_Store",
        "**/CVS",
        "**/CVS/**",
        "**/.cvsignore",
        "**/SCCS",
        "**/SCCS/**",
        "**/vssver.scc",
        "**/.svn",
        "**/.svn/**",
        "**/.git",
        "**/.git/**",
        "**/.gitattributes",
        "**/.gitignore",
        "**/.gitmodules",
        "**/.hg",
        "**/.hg/**",
        "**/.hgignore",
        "**/.hgsub",
        "**/.hgsubstate",
        "**/.hgtags",
        "**/.bzr",
        "**/.bzr/**",
        "**/.bzrignore",
    ];

    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut excludes = DefaultExcludes::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let pattern = pattern.strip_prefix("**/").unwrap_or(pattern);
            if let Some(dir) = pattern.strip_suffix("/**") {
                excludes.dir_names.insert(dir.to_owned());
            } else if let Some((start, end)) = pattern.split_once('*') {
                excludes.file_patterns.push((start.to_owned(), end.to_owned()));
            } else {
                excludes.file_names.insert(pattern.to_owned());
            }
        }
        excludes
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn exclude_dir(&self, name: &str) -> bool {
        self.dir_names.contains(name)
    }

    pub fn exclude_file(&self, name: &str) -> bool {
        self.file_names.contains(name)
            || self.file_patterns.iter().any(|(start, end)| {
                name.len() >= start.len() + end.len() && name.starts_with(start.as_str()) && name.ends_with(end.as_str())
            })
    }
}

// ---------------------------------------------------------------------------
// DirectorySnapshotter
// ---------------------------------------------------------------------------

pub struct DirectorySnapshotter {
    hash_mode: HashMode,
    excludes: Arc<DefaultExcludes>,
}

/// A directory whose children are still being collected.
struct PendingDirectory {
    path: AbsolutePath,
    access_type: AccessType,
    children: Vec<FileSystemLocationSnapshot>,
}

impl PendingDirectory {
    fn finish(self) -> FileSystemLocationSnapshot {
        FileSystemLocationSnapshot::directory(self.path, self.access_type, self.children)
    }
}

impl DirectorySnapshotter {
    pub fn new(hash_mode: HashMode, excludes: DefaultExcludes) -> Self {
        DirectorySnapshotter {
            hash_mode,
            excludes: Arc::new(excludes),
        }
    }

    pub fn from_config(config: &VfsConfig) -> Self {
        Self::new(config.hash_mode, DefaultExcludes::new(&config.default_excludes))
    }

    pub fn hash_mode(&self) -> HashMode {
        self.hash_mode
    }

    /// Snapshots whatever is at `path` right now.
    pub fn snapshot(&self, path: &AbsolutePath) -> Result<FileSystemLocationSnapshot> {
        let std_path = path.as_utf8_path().as_std_path();
        let link_meta = match std::fs::symlink_metadata(std_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(FileSystemLocationSnapshot::missing(path.clone(), AccessType::Direct));
            }
            Err(e) => bail_loc!("Failed to stat [{}]: {}", path, e),
        };

        let (meta, access_type) = if link_meta.file_type().is_symlink() {
            match std::fs::metadata(std_path) {
                Ok(meta) => (meta, AccessType::ViaSymlink),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(FileSystemLocationSnapshot::missing(path.clone(), AccessType::ViaSymlink));
                }
                Err(e) => bail_loc!("Failed to resolve symlink [{}]: {}", path, e),
            }
        } else {
            (link_meta, AccessType::Direct)
        };

        if meta.is_dir() {
            self.snapshot_directory(path, access_type)
        } else if meta.is_file() {
            self.snapshot_file(path.clone(), std_path, &meta, access_type)
        } else {
            bail_loc!("Cannot snapshot [{}]: not a regular file", path)
        }
    }

    fn snapshot_file(
        &self,
        path: AbsolutePath,
        std_path: &Path,
        meta: &Metadata,
        access_type: AccessType,
    ) -> Result<FileSystemLocationSnapshot> {
        let metadata = FileMetadata {
            length: meta.len(),
            last_modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        };
        let hash = match self.hash_mode {
            HashMode::Fast => hash_metadata(&metadata),
            HashMode::Full => {
                let content =
                    std::fs::read(std_path).map_err(|e| anyhow_loc!("Failed to read [{}]: {}", path, e))?;
                ContentHash(xxhash_rust::xxh3::xxh3_128(&content))
            }
        };
        Ok(FileSystemLocationSnapshot::regular_file(path, hash, metadata, access_type))
    }

    fn snapshot_directory(&self, root: &AbsolutePath, access_type: AccessType) -> Result<FileSystemLocationSnapshot> {
        let _span = timed_span!(tracing::Level::DEBUG, "snapshot_directory", path = %root);
        let root_std = root.as_utf8_path().as_std_path();

        let excludes = self.excludes.clone();
        // The read dir state carries the canonical paths of the directories
        // above the one being read.
        let walk = jwalk::WalkDirGeneric::<(Vec<PathBuf>, ())>::new(root_std)
            .sort(true)
            .follow_links(true)
            .skip_hidden(false)
            .process_read_dir(move |depth, dir, ancestors, children| {
                if depth.is_some() {
                    ancestors.push(canonical(dir));
                }
                let ancestors: &[PathBuf] = ancestors;
                children.retain(|entry| match entry {
                    Ok(entry) => {
                        let name = entry.file_name().to_string_lossy();
                        if !entry.file_type().is_dir() {
                            !excludes.exclude_file(&name)
                        } else if excludes.exclude_dir(&name) {
                            false
                        } else {
                            !(entry.path_is_symlink() && links_to_ancestor(&entry.path(), ancestors))
                        }
                    }
                    Err(e) => match e.loop_ancestor() {
                        Some(ancestor) => {
                            tracing::debug!("Skipping symlink loop [{:?}] -> [{:?}]", e.path(), ancestor);
                            false
                        }
                        None => true,
                    },
                });
            });

        // Entries arrive depth first, so `stack[d]` is the open directory at
        // depth `d` below the root.
        let mut stack: Vec<PendingDirectory> = Vec::new();
        let mut file_count = 0usize;
        for entry in walk {
            let (depth, child) = match entry {
                Ok(entry) if entry.depth() == 0 => {
                    stack.push(PendingDirectory {
                        path: root.clone(),
                        access_type,
                        children: Vec::new(),
                    });
                    continue;
                }
                Ok(entry) => {
                    close_directories(&mut stack, entry.depth());
                    let parent = stack
                        .last()
                        .ok_or_else(|| anyhow_loc!("Walk of [{}] yielded an entry outside the root", root))?;
                    let name = entry
                        .file_name()
                        .to_str()
                        .ok_or_else(|| anyhow_loc!("Non UTF-8 file name below [{}]: {:?}", parent.path, entry.file_name()))?;
                    let child_path = parent.path.join(name)?;
                    let child_access = if parent.access_type == AccessType::ViaSymlink || entry.path_is_symlink() {
                        AccessType::ViaSymlink
                    } else {
                        AccessType::Direct
                    };

                    if entry.file_type().is_dir() {
                        stack.push(PendingDirectory {
                            path: child_path,
                            access_type: child_access,
                            children: Vec::new(),
                        });
                        continue;
                    }

                    let entry_path = entry.path();
                    let child = match std::fs::metadata(&entry_path) {
                        Ok(meta) if meta.is_file() => {
                            file_count += 1;
                            self.snapshot_file(child_path, &entry_path, &meta, child_access)?
                        }
                        Ok(_) => bail_loc!("Cannot snapshot [{}]: not a regular file", child_path),
                        // Dangling symlink
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {
                            FileSystemLocationSnapshot::missing(child_path, AccessType::ViaSymlink)
                        }
                        Err(e) => bail_loc!("Failed to stat [{}]: {}", child_path, e),
                    };
                    (entry.depth(), child)
                }
                Err(e) => {
                    let Some(child) = self.missing_from_walk_error(root, &e) else {
                        bail_loc!("Directory walk error in [{}]: {}", root, e);
                    };
                    let depth = e.path().map_or(0, |p| relative_depth(root_std, p));
                    close_directories(&mut stack, depth);
                    (depth, child)
                }
            };

            debug_assert_eq!(stack.len(), depth);
            match stack.last_mut() {
                Some(parent) => parent.children.push(child),
                None => bail_loc!("Walk of [{}] yielded [{}] before the root", root, child.absolute_path()),
            }
        }

        close_directories(&mut stack, 1);
        let snapshot = stack
            .pop()
            .map(PendingDirectory::finish)
            .ok_or_else(|| anyhow_loc!("Walk of [{}] yielded nothing", root))?;

        tracing::debug!("Snapshotted [{}]: {} files, hash {}", root, file_count, snapshot.hash());
        Ok(snapshot)
    }

    /// Dangling symlinks surface as walk errors when links are followed.
    fn missing_from_walk_error(&self, root: &AbsolutePath, error: &jwalk::Error) -> Option<FileSystemLocationSnapshot> {
        let not_found = error.io_error().is_some_and(|e| e.kind() == io::ErrorKind::NotFound);
        let path = error.path()?;
        let is_link = std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink());
        if !not_found || !is_link {
            return None;
        }
        let path = camino::Utf8Path::from_path(path)?;
        let absolute = AbsolutePath::from_utf8_path(path).ok()?;
        if !root.is_ancestor_of(&absolute, crate::path_util::CaseSensitivity::CaseSensitive) {
            return None;
        }
        Some(FileSystemLocationSnapshot::missing(absolute, AccessType::ViaSymlink))
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// A followed link whose target is one of the directories being walked would
/// recurse forever. Such entries are left out of the snapshot.
fn links_to_ancestor(link: &Path, ancestors: &[PathBuf]) -> bool {
    let target = canonical(link);
    let is_loop = ancestors.contains(&target);
    if is_loop {
        tracing::debug!("Skipping symlink loop [{}] -> [{}]", link.display(), target.display());
    }
    is_loop
}

/// Finishes open directories until only `depth` remain, attaching each to its
/// parent.
fn close_directories(stack: &mut Vec<PendingDirectory>, depth: usize) {
    while stack.len() > depth.max(1) {
        if let Some(done) = stack.pop() {
            let snapshot = done.finish();
            if let Some(parent) = stack.last_mut() {
                parent.children.push(snapshot);
            }
        }
    }
}

fn relative_depth(root: &Path, path: &Path) -> usize {
    path.strip_prefix(root).map_or(0, |rel| rel.components().count())
}

/// Fingerprint of a file from its size and modification time.
fn hash_metadata(metadata: &FileMetadata) -> ContentHash {
    let mut hasher = xxhash_rust::xxh3::Xxh3::new();
    hash_mtime(&mut hasher, &metadata.last_modified);
    hasher.update(&metadata.length.to_le_bytes());
    ContentHash(hasher.digest128())
}

fn hash_mtime(hasher: &mut xxhash_rust::xxh3::Xxh3, mtime: &SystemTime) {
    match mtime.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(dur) => {
            hasher.update(&dur.as_secs().to_le_bytes());
            hasher.update(&dur.subsec_nanos().to_le_bytes());
        }
        Err(_) => {
            hasher.update(&[0xFF; 12]);
        }
    }
}
