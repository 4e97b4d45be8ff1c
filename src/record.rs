//! Catalog data model: managed directories, location bindings, file records
//!
//! The logical path of a file is `parent_path + name + suffix`, with
//! `parent_path` always starting and ending with `/`. That string is the
//! comparison key everywhere in the engine and is unique per directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CatalogError;

/// A logical directory replicated across one or more physical locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDirectory {
	/// Store-assigned id; None for a not-yet-persisted directory
	pub id: Option<u64>,

	/// Unique name, at most 255 characters
	pub name: String,

	/// Free-form description
	pub description: String,
}

/// Binds a managed directory to one physical location ("management" in
/// the catalog dump format)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationBinding {
	/// Globally unique tag naming the physical location
	pub tag: String,

	/// Directory this binding belongs to
	pub directory_id: u64,

	/// Current physical root; None means the location is currently
	/// known to be unreachable. Bindings are never deleted for that,
	/// only updated.
	pub physical_path: Option<PathBuf>,
}

/// Content digest of a file record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentHash {
	/// Not yet computed
	Unknown,

	/// BLAKE3 digest, lowercase hex
	Known(String),
}

impl ContentHash {
	pub fn is_known(&self) -> bool {
		matches!(self, ContentHash::Known(_))
	}

	/// Hex digest, or None when not yet computed
	pub fn digest(&self) -> Option<&str> {
		match self {
			ContentHash::Known(hex) => Some(hex),
			ContentHash::Unknown => None,
		}
	}
}

/// One file inside a managed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
	/// Store-assigned id; None for a freshly scanned, unpersisted record
	pub id: Option<u64>,

	/// Owning directory; None until the record is bound to one
	pub directory_id: Option<u64>,

	/// Logical parent path, `/`-wrapped (`/`, `/sub/dir/`, ...)
	pub parent_path: String,

	/// File name without suffix
	pub name: String,

	/// Empty, or the last dot-segment including its leading `.`
	pub suffix: String,

	/// Size in bytes
	pub size: u64,

	/// Modification time as an integer unix timestamp
	pub modified_time: i64,

	/// Content digest, Unknown until computed
	pub hash: ContentHash,
}

impl FileRecord {
	/// Build a record from a logical path relative to the managed root
	pub fn from_logical_path(
		path: &str,
		size: u64,
		modified_time: i64,
	) -> Result<Self, CatalogError> {
		let (parent_path, name, suffix) = split_logical_path(path)?;
		Ok(FileRecord {
			id: None,
			directory_id: None,
			parent_path,
			name,
			suffix,
			size,
			modified_time,
			hash: ContentHash::Unknown,
		})
	}

	/// Canonical logical path, the per-directory comparison key
	pub fn logical_path(&self) -> String {
		format!("{}{}{}", self.parent_path, self.name, self.suffix)
	}

	/// Physical location of this record under the given root
	pub fn physical_path(&self, root: &Path) -> PathBuf {
		physical_join(root, &self.logical_path())
	}
}

/// Resolve a logical path against a physical root
pub fn physical_join(root: &Path, logical_path: &str) -> PathBuf {
	let mut p = root.to_path_buf();
	for segment in logical_path.split('/').filter(|s| !s.is_empty()) {
		p.push(segment);
	}
	p
}

/// Split a normalized path into `(parent_path, name, suffix)`.
///
/// Separators are normalized to `/` (backslashes included); relative
/// segments (`.`, `..`) are rejected. The suffix is the last
/// dot-segment of the file name, kept with its leading `.`, and only
/// exists when the name has more than one dot-segment: `archive` has no
/// suffix, `a.tar.gz` splits into `a.tar` + `.gz`, and `.bashrc` splits
/// into `` + `.bashrc`.
pub fn split_logical_path(path: &str) -> Result<(String, String, String), CatalogError> {
	let normalized = path.replace('\\', "/");
	let mut segments: Vec<&str> = normalized.split('/').collect();
	if let Some(first) = segments.first() {
		if first.is_empty() {
			segments.remove(0);
		}
	}
	for segment in &segments {
		if *segment == "." || *segment == ".." {
			return Err(CatalogError::InvalidPath {
				path: path.to_string(),
				reason: format!("relative segment '{}' not allowed", segment),
			});
		}
	}
	let filename = match segments.pop() {
		Some(name) if !name.is_empty() => name,
		_ => {
			return Err(CatalogError::InvalidPath {
				path: path.to_string(),
				reason: "missing file name".to_string(),
			})
		}
	};
	let parent_path = if segments.is_empty() {
		"/".to_string()
	} else {
		format!("/{}/", segments.join("/"))
	};
	let dots: Vec<&str> = filename.split('.').collect();
	if dots.len() == 1 {
		return Ok((parent_path, filename.to_string(), String::new()));
	}
	let suffix = format!(".{}", dots[dots.len() - 1]);
	let name = dots[..dots.len() - 1].join(".");
	Ok((parent_path, name, suffix))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_split_simple_path() {
		let (parent, name, suffix) = split_logical_path("/docs/report.txt").unwrap();
		assert_eq!(parent, "/docs/");
		assert_eq!(name, "report");
		assert_eq!(suffix, ".txt");
	}

	#[test]
	fn test_split_root_file() {
		let (parent, name, suffix) = split_logical_path("/archive").unwrap();
		assert_eq!(parent, "/");
		assert_eq!(name, "archive");
		assert_eq!(suffix, "");
	}

	#[test]
	fn test_split_multi_dot_name() {
		let (parent, name, suffix) = split_logical_path("/a.tar.gz").unwrap();
		assert_eq!(parent, "/");
		assert_eq!(name, "a.tar");
		assert_eq!(suffix, ".gz");
	}

	#[test]
	fn test_split_hidden_file() {
		let (parent, name, suffix) = split_logical_path("/.bashrc").unwrap();
		assert_eq!(parent, "/");
		assert_eq!(name, "");
		assert_eq!(suffix, ".bashrc");
	}

	#[test]
	fn test_split_backslash_separators() {
		let (parent, name, suffix) = split_logical_path("\\docs\\report.txt").unwrap();
		assert_eq!(parent, "/docs/");
		assert_eq!(name, "report");
		assert_eq!(suffix, ".txt");
	}

	#[test]
	fn test_split_rejects_relative_segments() {
		assert!(matches!(
			split_logical_path("/a/./b.txt"),
			Err(CatalogError::InvalidPath { .. })
		));
		assert!(matches!(
			split_logical_path("/a/../b.txt"),
			Err(CatalogError::InvalidPath { .. })
		));
		assert!(matches!(split_logical_path("../b.txt"), Err(CatalogError::InvalidPath { .. })));
	}

	#[test]
	fn test_split_rejects_missing_file_name() {
		assert!(matches!(split_logical_path("/docs/"), Err(CatalogError::InvalidPath { .. })));
		assert!(matches!(split_logical_path(""), Err(CatalogError::InvalidPath { .. })));
	}

	#[test]
	fn test_logical_path_round_trip() {
		let record = FileRecord::from_logical_path("/sub/dir/data.bin", 10, 100).unwrap();
		assert_eq!(record.logical_path(), "/sub/dir/data.bin");
		assert_eq!(record.hash, ContentHash::Unknown);
	}

	#[test]
	fn test_physical_path() {
		let record = FileRecord::from_logical_path("/sub/data.bin", 10, 100).unwrap();
		let p = record.physical_path(Path::new("/backup1"));
		assert_eq!(p, PathBuf::from("/backup1/sub/data.bin"));
	}
}

// vim: ts=4
