//! Shared test utilities and macros.

use crate::path_util::AbsolutePath;
use crate::snapshot::{AccessType, ContentHash, FileMetadata, FileSystemLocationSnapshot};
use std::time::SystemTime;

/// Asserts that a Result is Ok, printing the error if not.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        assert!($result.is_ok(), "Expected Ok, got Err: {:#?}", $result);
    };
}

/// Asserts that a Result is Err, printing the value if not.
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        assert!($result.is_err(), "Expected Err, got Ok: {:#?}", $result);
    };
}

pub fn path(p: &str) -> AbsolutePath {
    AbsolutePath::new(p).unwrap()
}

pub fn regular_file(p: &str, hash: u128) -> FileSystemLocationSnapshot {
    FileSystemLocationSnapshot::regular_file(
        path(p),
        ContentHash(hash),
        FileMetadata {
            length: hash as u64,
            last_modified: SystemTime::UNIX_EPOCH,
        },
        AccessType::Direct,
    )
}

pub fn missing(p: &str) -> FileSystemLocationSnapshot {
    FileSystemLocationSnapshot::missing(path(p), AccessType::Direct)
}

pub fn directory(p: &str, children: Vec<FileSystemLocationSnapshot>) -> FileSystemLocationSnapshot {
    FileSystemLocationSnapshot::directory(path(p), AccessType::Direct, children)
}
