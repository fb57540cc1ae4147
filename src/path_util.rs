//! Segment-aware path comparison.
//!
//! All paths handled by the hierarchy are [`AbsolutePath`]s: normalized, `/`
//! separated, no trailing separator. Tree nodes never look at whole absolute
//! paths; they look at a [`VfsRelativePath`], a borrowed view of the absolute
//! path starting at some offset, which is compared against the path prefixes
//! stored in the tree.
//!
//! Case-insensitive comparison folds a character only when its lowercase form
//! is a single character with the same UTF-8 width. Equal characters therefore
//! always have equal byte lengths, and a common-prefix length is a valid byte
//! offset into both strings.

use crate::util::SlashFix;
use crate::{anyhow_loc, bail_loc, ensure_loc};
use anyhow::Result;
use camino::Utf8Path;
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub const SEPARATOR: char = '/';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    CaseSensitive,
    CaseInsensitive,
}

impl CaseSensitivity {
    /// Case sensitivity of the default file system on the current platform.
    pub fn platform_default() -> Self {
        if cfg!(any(target_os = "macos", windows)) {
            CaseSensitivity::CaseInsensitive
        } else {
            CaseSensitivity::CaseSensitive
        }
    }

    pub fn is_case_sensitive(self) -> bool {
        matches!(self, CaseSensitivity::CaseSensitive)
    }
}

// ----------------------------------------------------------------------------
// Character and segment comparison
// ----------------------------------------------------------------------------

pub(crate) fn fold_char(c: char) -> char {
    if c.is_ascii() {
        return c.to_ascii_lowercase();
    }
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) if l.len_utf8() == c.len_utf8() => l,
        _ => c,
    }
}

pub fn equal_chars(a: char, b: char, case_sensitivity: CaseSensitivity) -> bool {
    a == b || (!case_sensitivity.is_case_sensitive() && fold_char(a) == fold_char(b))
}

/// The first segment of a relative path (`"a"` for `"a/b/c"`).
pub fn first_segment(path: &str) -> &str {
    match path.find(SEPARATOR) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// The last segment of a path (`"c"` for `"a/b/c"`).
pub fn file_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Three-way comparison of two single path segments.
///
/// Folded characters are compared first. Case-sensitive comparison breaks ties
/// on the exact characters, so both modes agree on the coarse order and a list
/// sorted case-sensitively can be binary searched case-insensitively.
pub fn compare_segments(a: &str, b: &str, case_sensitivity: CaseSensitivity) -> Ordering {
    let folded = a.chars().map(fold_char).cmp(b.chars().map(fold_char));
    match case_sensitivity {
        CaseSensitivity::CaseInsensitive => folded,
        CaseSensitivity::CaseSensitive => folded.then_with(|| a.cmp(b)),
    }
}

/// Segment-aware three-way comparison of two paths.
///
/// Equivalent to a character comparison where the separator sorts before any
/// other character: `a` < `a/b` < `a-b`.
pub fn compare_paths(a: &str, b: &str, case_sensitivity: CaseSensitivity) -> Ordering {
    let mut segments_a = a.split(SEPARATOR);
    let mut segments_b = b.split(SEPARATOR);
    loop {
        match (segments_a.next(), segments_b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(sa), Some(sb)) => match compare_segments(sa, sb, case_sensitivity) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Length of the common prefix of `path1` and `path2[offset..]`, measured in
/// whole segments.
///
/// The result never ends inside a segment: it is either the full length of a
/// path that is a segment-aligned prefix of the other, or the position of the
/// last separator both paths share (0 when they share no segment).
pub fn length_of_common_prefix(
    path1: &str,
    path2: &str,
    offset: usize,
    case_sensitivity: CaseSensitivity,
) -> usize {
    let mut chars1 = path1.chars();
    let mut chars2 = path2[offset..].chars();
    let mut pos = 0;
    let mut last_separator = 0;
    loop {
        match (chars1.next(), chars2.next()) {
            (Some(c1), Some(c2)) => {
                if !equal_chars(c1, c2, case_sensitivity) {
                    return last_separator;
                }
                if c1 == SEPARATOR {
                    last_separator = pos;
                }
                pos += c1.len_utf8();
            }
            (None, None) => return pos,
            (None, Some(c)) | (Some(c), None) => {
                return if c == SEPARATOR { pos } else { last_separator };
            }
        }
    }
}

// ----------------------------------------------------------------------------
// AbsolutePath
// ----------------------------------------------------------------------------

/// A normalized absolute path: `/`-separated, no `.`/`..` segments, no
/// repeated or trailing separators. Either rooted at `/` or at a drive
/// (`C:/`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbsolutePath(String);

impl AbsolutePath {
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref();
        ensure_loc!(!raw.is_empty(), "absolute path must not be empty");

        let fixed = raw.to_owned().slash_fix();
        let (root, rest) = split_root(&fixed)
            .ok_or_else(|| anyhow_loc!("'{}' is not an absolute path", raw))?;

        let mut normalized = String::with_capacity(fixed.len());
        normalized.push_str(root);
        for segment in rest.split(SEPARATOR).filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                bail_loc!("'{}' contains a relative segment '{}'", raw, segment);
            }
            if !normalized.is_empty() && !normalized.ends_with(SEPARATOR) {
                normalized.push(SEPARATOR);
            }
            normalized.push_str(segment);
        }
        if !normalized.contains(SEPARATOR) {
            // Drive root
            normalized.push(SEPARATOR);
        }
        Ok(AbsolutePath(normalized))
    }

    pub fn from_utf8_path(path: &Utf8Path) -> Result<Self> {
        Self::new(path.as_str())
    }

    /// Wraps a string that is already known to be normalized.
    pub(crate) fn from_normalized(path: String) -> Self {
        debug_assert!(!path.is_empty());
        AbsolutePath(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_utf8_path(&self) -> &Utf8Path {
        Utf8Path::new(&self.0)
    }

    pub fn relative(&self) -> VfsRelativePath<'_> {
        VfsRelativePath::of(self)
    }

    pub fn is_root(&self) -> bool {
        self.relative().is_empty()
    }

    /// Last segment, empty for `/`.
    pub fn name(&self) -> &str {
        file_name(self.relative().as_str())
    }

    pub fn parent(&self) -> Option<AbsolutePath> {
        let relative = self.relative();
        if relative.is_empty() {
            return None;
        }
        match relative.as_str().rfind(SEPARATOR) {
            Some(idx) => {
                let mut parent = self.0[..relative.offset + idx].to_owned();
                if !parent.contains(SEPARATOR) {
                    // Drive root
                    parent.push(SEPARATOR);
                }
                Some(AbsolutePath(parent))
            }
            None if self.0.starts_with(SEPARATOR) => Some(AbsolutePath(SEPARATOR.to_string())),
            None => None,
        }
    }

    pub fn join(&self, segment: &str) -> Result<AbsolutePath> {
        ensure_loc!(
            !segment.is_empty() && !segment.starts_with(SEPARATOR),
            "cannot join '{}' onto '{}'",
            segment,
            self
        );
        if self.0.ends_with(SEPARATOR) {
            AbsolutePath::new(format!("{}{}", self.0, segment))
        } else {
            AbsolutePath::new(format!("{}{}{}", self.0, SEPARATOR, segment))
        }
    }

    pub fn equals(&self, other: &AbsolutePath, case_sensitivity: CaseSensitivity) -> bool {
        compare_paths(self.relative().as_str(), other.relative().as_str(), case_sensitivity)
            == Ordering::Equal
    }

    /// True if `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &AbsolutePath, case_sensitivity: CaseSensitivity) -> bool {
        let ancestor = self.relative();
        let descendant = other.relative();
        ancestor.len() < descendant.len() && descendant.is_prefix(ancestor.as_str(), case_sensitivity)
    }

    pub fn is_child_of(&self, parent: &AbsolutePath, case_sensitivity: CaseSensitivity) -> bool {
        self.parent()
            .is_some_and(|p| p.equals(parent, case_sensitivity))
    }

    /// True for two distinct paths with the same parent.
    pub fn is_sibling_of(&self, other: &AbsolutePath, case_sensitivity: CaseSensitivity) -> bool {
        match (self.parent(), other.parent()) {
            (Some(a), Some(b)) => {
                a.equals(&b, case_sensitivity) && !self.equals(other, case_sensitivity)
            }
            _ => false,
        }
    }
}

fn split_root(path: &str) -> Option<(&'static str, &str)> {
    if let Some(rest) = path.strip_prefix(SEPARATOR) {
        return Some(("/", rest));
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let rest = &path[2..];
        if rest.is_empty() || rest.starts_with(SEPARATOR) {
            // The drive letter becomes the first segment.
            return Some(("", path));
        }
    }
    None
}

impl fmt::Display for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl AsRef<str> for AbsolutePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AbsolutePath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        AbsolutePath::new(s)
    }
}

impl TryFrom<&str> for AbsolutePath {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> Result<Self> {
        AbsolutePath::new(s)
    }
}

// ----------------------------------------------------------------------------
// VfsRelativePath
// ----------------------------------------------------------------------------

/// A view of an absolute path starting at `offset`, as seen from some node in
/// the tree. The empty relative path denotes the node itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VfsRelativePath<'a> {
    absolute_path: &'a str,
    offset: usize,
}

impl<'a> VfsRelativePath<'a> {
    pub fn of(path: &'a AbsolutePath) -> Self {
        let s = path.as_str();
        if s.starts_with(SEPARATOR) {
            VfsRelativePath { absolute_path: s, offset: 1 }
        } else {
            // `C:/` becomes the segment `C:`.
            let trimmed = s.strip_suffix(SEPARATOR).unwrap_or(s);
            VfsRelativePath { absolute_path: trimmed, offset: 0 }
        }
    }

    pub fn as_str(&self) -> &'a str {
        &self.absolute_path[self.offset..]
    }

    pub fn absolute_path(&self) -> &'a str {
        self.absolute_path
    }

    pub fn len(&self) -> usize {
        self.absolute_path.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn suffix_starting_from(&self, start: usize) -> Self {
        debug_assert!(start <= self.len());
        VfsRelativePath {
            absolute_path: self.absolute_path,
            offset: self.offset + start,
        }
    }

    /// The remainder of this path below `child_path`, which must be a
    /// segment-aligned prefix of it.
    pub fn from_child(&self, child_path: &str) -> Self {
        debug_assert!(child_path.len() <= self.len());
        if child_path.is_empty() {
            *self
        } else if child_path.len() == self.len() {
            self.suffix_starting_from(child_path.len())
        } else {
            self.suffix_starting_from(child_path.len() + 1)
        }
    }

    pub fn length_of_common_prefix(&self, prefix: &str, case_sensitivity: CaseSensitivity) -> usize {
        length_of_common_prefix(prefix, self.absolute_path, self.offset, case_sensitivity)
    }

    /// Orders `path` relative to this path by first segment only.
    pub fn compare_to_first_segment(&self, path: &str, case_sensitivity: CaseSensitivity) -> Ordering {
        compare_segments(first_segment(path), first_segment(self.as_str()), case_sensitivity)
    }

    /// True if `prefix` is this path or a segment-aligned ancestor of it.
    pub fn is_prefix(&self, prefix: &str, case_sensitivity: CaseSensitivity) -> bool {
        prefix.is_empty() || self.length_of_common_prefix(prefix, case_sensitivity) == prefix.len()
    }
}
