pub mod child_map;
pub mod config;
pub mod error;
pub mod file_system_node;
pub mod logging;
pub mod path_util;
pub mod producer_guard;
pub mod snapshot;
pub mod snapshot_hierarchy;
pub mod snapshotter;
pub mod util;
pub mod version_hierarchy;
pub mod vfs_root;
pub mod virtual_file_system;

pub use config::VfsConfig;
pub use path_util::{AbsolutePath, CaseSensitivity};
pub use snapshot::{ContentHash, FileSystemLocationSnapshot, MetadataSnapshot};
pub use snapshot_hierarchy::SnapshotHierarchy;
pub use snapshotter::{DirectorySnapshotter, HashMode};
pub use virtual_file_system::{FileChangeEvent, FileChangeType, VirtualFileSystem};

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod version_hierarchy_tests;
#[cfg(test)]
mod virtual_file_system_tests;
