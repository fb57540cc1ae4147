use crate::path_util::{compare_segments, first_segment, AbsolutePath, CaseSensitivity, VfsRelativePath};
use std::sync::Arc;
use std::time::SystemTime;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A 128-bit non-cryptographic hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentHash(pub u128);

impl ContentHash {
    /// Signature shared by every missing location.
    pub const MISSING: ContentHash =
        ContentHash(xxhash_rust::const_xxh3::xxh3_128(b"vfs-snapshot:missing-file"));

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    RegularFile,
    Directory,
    Missing,
}

/// Whether a location was reached directly or through a symbolic link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AccessType {
    #[default]
    Direct,
    ViaSymlink,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    pub length: u64,
    pub last_modified: SystemTime,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RegularFileSnapshot {
    absolute_path: AbsolutePath,
    hash: ContentHash,
    metadata: FileMetadata,
    access_type: AccessType,
}

/// A completely scanned directory. Children are sorted by name.
#[derive(Debug, PartialEq, Eq)]
pub struct DirectorySnapshot {
    absolute_path: AbsolutePath,
    hash: ContentHash,
    children: Vec<FileSystemLocationSnapshot>,
    access_type: AccessType,
}

#[derive(Debug, PartialEq, Eq)]
pub struct MissingFileSnapshot {
    absolute_path: AbsolutePath,
    access_type: AccessType,
}

/// Immutable description of one file system location, cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSystemLocationSnapshot {
    RegularFile(Arc<RegularFileSnapshot>),
    Directory(Arc<DirectorySnapshot>),
    Missing(Arc<MissingFileSnapshot>),
}

/// What the hierarchy knows about a location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataSnapshot {
    /// Complete information.
    Location(FileSystemLocationSnapshot),
    /// A directory that exists, with only some (or none) of its children known.
    Directory(AccessType),
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl RegularFileSnapshot {
    pub fn new(
        absolute_path: AbsolutePath,
        hash: ContentHash,
        metadata: FileMetadata,
        access_type: AccessType,
    ) -> Self {
        Self {
            absolute_path,
            hash,
            metadata,
            access_type,
        }
    }

    pub fn absolute_path(&self) -> &AbsolutePath {
        &self.absolute_path
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn metadata(&self) -> FileMetadata {
        self.metadata
    }

    pub fn access_type(&self) -> AccessType {
        self.access_type
    }
}

impl DirectorySnapshot {
    /// Builds a directory snapshot from its direct children. The hash is
    /// derived from the sorted child names and child hashes.
    pub fn new(
        absolute_path: AbsolutePath,
        access_type: AccessType,
        mut children: Vec<FileSystemLocationSnapshot>,
    ) -> Self {
        children.sort_by(|a, b| compare_segments(a.name(), b.name(), CaseSensitivity::CaseSensitive));
        debug_assert!(children
            .iter()
            .all(|c| c.absolute_path().parent().as_ref() == Some(&absolute_path)));

        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        hasher.update(&children.len().to_le_bytes());
        for child in &children {
            let name = child.name().as_bytes();
            hasher.update(&name.len().to_le_bytes());
            hasher.update(name);
            hasher.update(&[child.type_tag()]);
            hasher.update(&child.hash().0.to_le_bytes());
        }

        Self {
            absolute_path,
            hash: ContentHash(hasher.digest128()),
            children,
            access_type,
        }
    }

    pub fn absolute_path(&self) -> &AbsolutePath {
        &self.absolute_path
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn access_type(&self) -> AccessType {
        self.access_type
    }

    pub fn children(&self) -> &[FileSystemLocationSnapshot] {
        &self.children
    }

    pub fn child(&self, name: &str, case_sensitivity: CaseSensitivity) -> Option<&FileSystemLocationSnapshot> {
        self.children
            .binary_search_by(|c| compare_segments(c.name(), name, case_sensitivity))
            .ok()
            .map(|idx| &self.children[idx])
    }

    /// The stored snapshot at `target`, relative to this directory.
    pub fn get_descendant(
        &self,
        target: VfsRelativePath<'_>,
        case_sensitivity: CaseSensitivity,
    ) -> Option<&FileSystemLocationSnapshot> {
        let mut current = self;
        let mut remaining = target;
        loop {
            let segment = first_segment(remaining.as_str());
            let child = current.child(segment, case_sensitivity)?;
            remaining = remaining.from_child(segment);
            if remaining.is_empty() {
                return Some(child);
            }
            match child {
                FileSystemLocationSnapshot::Directory(dir) => current = dir,
                _ => return None,
            }
        }
    }

    /// Resolves `target` within this complete directory. Anything not among
    /// the scanned children is known to be missing.
    pub fn find_descendant(
        &self,
        target: VfsRelativePath<'_>,
        case_sensitivity: CaseSensitivity,
    ) -> FileSystemLocationSnapshot {
        match self.get_descendant(target, case_sensitivity) {
            Some(found) => found.clone(),
            None => FileSystemLocationSnapshot::missing_at(target, self.access_type),
        }
    }
}

impl MissingFileSnapshot {
    pub fn new(absolute_path: AbsolutePath, access_type: AccessType) -> Self {
        Self {
            absolute_path,
            access_type,
        }
    }

    pub fn absolute_path(&self) -> &AbsolutePath {
        &self.absolute_path
    }

    pub fn access_type(&self) -> AccessType {
        self.access_type
    }
}

impl FileSystemLocationSnapshot {
    pub fn regular_file(
        absolute_path: AbsolutePath,
        hash: ContentHash,
        metadata: FileMetadata,
        access_type: AccessType,
    ) -> Self {
        FileSystemLocationSnapshot::RegularFile(Arc::new(RegularFileSnapshot::new(
            absolute_path,
            hash,
            metadata,
            access_type,
        )))
    }

    pub fn directory(
        absolute_path: AbsolutePath,
        access_type: AccessType,
        children: Vec<FileSystemLocationSnapshot>,
    ) -> Self {
        FileSystemLocationSnapshot::Directory(Arc::new(DirectorySnapshot::new(
            absolute_path,
            access_type,
            children,
        )))
    }

    pub fn missing(absolute_path: AbsolutePath, access_type: AccessType) -> Self {
        FileSystemLocationSnapshot::Missing(Arc::new(MissingFileSnapshot::new(absolute_path, access_type)))
    }

    fn missing_at(target: VfsRelativePath<'_>, access_type: AccessType) -> Self {
        Self::missing(
            AbsolutePath::from_normalized(target.absolute_path().to_owned()),
            access_type,
        )
    }

    pub fn absolute_path(&self) -> &AbsolutePath {
        match self {
            FileSystemLocationSnapshot::RegularFile(s) => &s.absolute_path,
            FileSystemLocationSnapshot::Directory(s) => &s.absolute_path,
            FileSystemLocationSnapshot::Missing(s) => &s.absolute_path,
        }
    }

    pub fn name(&self) -> &str {
        self.absolute_path().name()
    }

    pub fn hash(&self) -> ContentHash {
        match self {
            FileSystemLocationSnapshot::RegularFile(s) => s.hash,
            FileSystemLocationSnapshot::Directory(s) => s.hash,
            FileSystemLocationSnapshot::Missing(_) => ContentHash::MISSING,
        }
    }

    pub fn file_type(&self) -> FileType {
        match self {
            FileSystemLocationSnapshot::RegularFile(_) => FileType::RegularFile,
            FileSystemLocationSnapshot::Directory(_) => FileType::Directory,
            FileSystemLocationSnapshot::Missing(_) => FileType::Missing,
        }
    }

    pub fn access_type(&self) -> AccessType {
        match self {
            FileSystemLocationSnapshot::RegularFile(s) => s.access_type,
            FileSystemLocationSnapshot::Directory(s) => s.access_type,
            FileSystemLocationSnapshot::Missing(s) => s.access_type,
        }
    }

    pub fn as_directory(&self) -> Option<&Arc<DirectorySnapshot>> {
        match self {
            FileSystemLocationSnapshot::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Same type and same hash: storing `other` over `self` changes nothing.
    pub fn is_content_up_to_date(&self, other: &FileSystemLocationSnapshot) -> bool {
        self.file_type() == other.file_type() && self.hash() == other.hash()
    }

    /// Resolves a location below this one. Files and missing locations cannot
    /// have children, so anything below them is missing.
    pub fn find_descendant(
        &self,
        target: VfsRelativePath<'_>,
        case_sensitivity: CaseSensitivity,
    ) -> FileSystemLocationSnapshot {
        debug_assert!(!target.is_empty());
        match self {
            FileSystemLocationSnapshot::Directory(dir) => dir.find_descendant(target, case_sensitivity),
            _ => Self::missing_at(target, self.access_type()),
        }
    }

    /// Calls `visitor` for this snapshot and, for directories, every
    /// snapshot below it.
    pub fn visit_tree(&self, visitor: &mut dyn FnMut(&FileSystemLocationSnapshot)) {
        visitor(self);
        if let FileSystemLocationSnapshot::Directory(dir) = self {
            for child in &dir.children {
                child.visit_tree(visitor);
            }
        }
    }

    fn type_tag(&self) -> u8 {
        match self {
            FileSystemLocationSnapshot::RegularFile(_) => 0x00,
            FileSystemLocationSnapshot::Directory(_) => 0x01,
            FileSystemLocationSnapshot::Missing(_) => 0x02,
        }
    }
}

impl MetadataSnapshot {
    pub fn file_type(&self) -> FileType {
        match self {
            MetadataSnapshot::Location(s) => s.file_type(),
            MetadataSnapshot::Directory(_) => FileType::Directory,
        }
    }

    pub fn access_type(&self) -> AccessType {
        match self {
            MetadataSnapshot::Location(s) => s.access_type(),
            MetadataSnapshot::Directory(access_type) => *access_type,
        }
    }

    pub fn as_location(&self) -> Option<&FileSystemLocationSnapshot> {
        match self {
            MetadataSnapshot::Location(s) => Some(s),
            MetadataSnapshot::Directory(_) => None,
        }
    }

    pub fn into_location(self) -> Option<FileSystemLocationSnapshot> {
        match self {
            MetadataSnapshot::Location(s) => Some(s),
            MetadataSnapshot::Directory(_) => None,
        }
    }
}

impl From<FileSystemLocationSnapshot> for MetadataSnapshot {
    fn from(snapshot: FileSystemLocationSnapshot) -> Self {
        MetadataSnapshot::Location(snapshot)
    }
}

impl From<&FileSystemLocationSnapshot> for MetadataSnapshot {
    fn from(snapshot: &FileSystemLocationSnapshot) -> Self {
        MetadataSnapshot::Location(snapshot.clone())
    }
}
