//! Filesystem collaborator: scanning, marker files, copy and delete
//!
//! A managed physical root carries a `.replicat/info` marker naming the
//! directory and binding tag it belongs to. Scans enumerate every file
//! under the root except that metadata directory and produce pending
//! [`FileRecord`]s (unknown hash).

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::config::META_DIR_NAME;
use crate::error::CatalogError;
use crate::logging::warn;
use crate::record::FileRecord;

/// Contents of the `.replicat/info` marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerInfo {
	/// Managed directory name
	pub name: String,

	/// Binding tag of this physical location
	pub tag: String,
}

/// Recursively enumerate the files under `root`, excluding the
/// `.replicat` metadata directory. Records come back sorted by logical
/// path with hashes unknown; files whose names do not form a valid
/// logical path are skipped with a warning (the record is lost, the
/// scan is not).
pub fn scan_directory(root: &Path) -> Result<Vec<FileRecord>, CatalogError> {
	let walk = WalkBuilder::new(root)
		.standard_filters(false)
		.filter_entry(|entry| {
			entry.file_name().to_str().map(|name| name != META_DIR_NAME).unwrap_or(true)
		})
		.build();
	let mut records = Vec::new();
	for entry in walk {
		let entry = entry.map_err(|e| CatalogError::Other {
			message: format!("scan of {} failed: {}", root.display(), e),
		})?;
		let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
		if !is_file {
			continue;
		}
		let rel = entry.path().strip_prefix(root).map_err(|_| CatalogError::Other {
			message: format!("walker left the root: {}", entry.path().display()),
		})?;
		let logical = match rel.to_str() {
			Some(s) => format!("/{}", s),
			None => {
				warn!(path = %rel.display(), "skipping non-UTF-8 file name");
				continue;
			}
		};
		let meta = entry
			.metadata()
			.map_err(|e| CatalogError::Other { message: e.to_string() })?;
		match FileRecord::from_logical_path(&logical, meta.len(), unix_mtime(&meta)) {
			Ok(record) => records.push(record),
			Err(e) => warn!(path = %logical, error = %e, "skipping unrepresentable path"),
		}
	}
	records.sort_by_key(FileRecord::logical_path);
	Ok(records)
}

fn unix_mtime(meta: &fs::Metadata) -> i64 {
	match meta.modified().ok().and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
		Some(d) => d.as_secs() as i64,
		None => 0,
	}
}

/// Read the marker of a physical root; None when the root was never
/// managed. A present but unreadable marker is an error, not None.
pub fn read_marker(root: &Path) -> Result<Option<MarkerInfo>, CatalogError> {
	let path = root.join(META_DIR_NAME).join("info");
	let text = match fs::read_to_string(&path) {
		Ok(text) => text,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(e) => return Err(CatalogError::io(path.display().to_string(), e)),
	};
	serde_json::from_str(&text).map(Some).map_err(|e| CatalogError::Other {
		message: format!("unreadable marker {}: {} (remove the {} directory to re-manage)",
			path.display(), e, META_DIR_NAME),
	})
}

/// Write the marker of a freshly managed root
pub fn write_marker(root: &Path, info: &MarkerInfo) -> Result<(), CatalogError> {
	let dir = root.join(META_DIR_NAME);
	fs::create_dir_all(&dir).map_err(|e| CatalogError::io(dir.display().to_string(), e))?;
	let path = dir.join("info");
	let text = serde_json::to_string_pretty(info)
		.map_err(|e| CatalogError::Other { message: e.to_string() })?;
	fs::write(&path, text).map_err(|e| CatalogError::io(path.display().to_string(), e))
}

/// Remove the marker directory; returns whether anything was removed
pub fn remove_marker(root: &Path) -> Result<bool, CatalogError> {
	let dir = root.join(META_DIR_NAME);
	match fs::remove_dir_all(&dir) {
		Ok(()) => Ok(true),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
		Err(e) => Err(CatalogError::io(dir.display().to_string(), e)),
	}
}

/// Copy a file, creating parent directories and preserving the source
/// modification time. Fails loudly when the destination exists: that
/// means the catalog and the local tree disagree and the caller must
/// investigate.
pub fn copy_with_metadata(src: &Path, dst: &Path) -> Result<(), CatalogError> {
	if dst.exists() {
		return Err(CatalogError::DestinationExists { path: dst.display().to_string() });
	}
	if let Some(parent) = dst.parent() {
		fs::create_dir_all(parent)
			.map_err(|e| CatalogError::io(parent.display().to_string(), e))?;
	}
	fs::copy(src, dst).map_err(|e| CatalogError::io(src.display().to_string(), e))?;
	let mtime = fs::metadata(src)
		.and_then(|m| m.modified())
		.map_err(|e| CatalogError::io(src.display().to_string(), e))?;
	let file = fs::File::options()
		.write(true)
		.open(dst)
		.map_err(|e| CatalogError::io(dst.display().to_string(), e))?;
	file.set_modified(mtime).map_err(|e| CatalogError::io(dst.display().to_string(), e))
}

/// Delete a single file, then remove its parent directories as far up
/// as they become empty, stopping below `root`
pub fn remove_file(root: &Path, path: &Path) -> Result<(), CatalogError> {
	fs::remove_file(path).map_err(|e| CatalogError::io(path.display().to_string(), e))?;
	let mut parent = path.parent();
	while let Some(dir) = parent {
		if dir == root || !dir.starts_with(root) || !dir_is_empty(dir)? {
			break;
		}
		fs::remove_dir(dir).map_err(|e| CatalogError::io(dir.display().to_string(), e))?;
		parent = dir.parent();
	}
	Ok(())
}

/// Does the root contain any empty subdirectory? The root itself and
/// the metadata directory do not count. Pure predicate, no side effects.
pub fn has_empty_subdir(root: &Path) -> Result<bool, CatalogError> {
	for child in child_dirs(root)? {
		if dir_is_empty(&child)? || has_empty_subdir(&child)? {
			return Ok(true);
		}
	}
	Ok(false)
}

/// Remove every empty subdirectory under the root, bottom-up. The root
/// itself is kept. Returns the number of directories removed.
pub fn remove_empty_dirs(root: &Path) -> Result<usize, CatalogError> {
	let mut removed = 0;
	for child in child_dirs(root)? {
		removed += remove_empty_dirs(&child)?;
		if dir_is_empty(&child)? {
			fs::remove_dir(&child)
				.map_err(|e| CatalogError::io(child.display().to_string(), e))?;
			removed += 1;
		}
	}
	Ok(removed)
}

fn child_dirs(dir: &Path) -> Result<Vec<std::path::PathBuf>, CatalogError> {
	let io_err = |e| CatalogError::io(dir.display().to_string(), e);
	let mut dirs = Vec::new();
	for entry in fs::read_dir(dir).map_err(io_err)? {
		let entry = entry.map_err(io_err)?;
		if entry.file_name() == META_DIR_NAME {
			continue;
		}
		if entry.file_type().map_err(io_err)?.is_dir() {
			dirs.push(entry.path());
		}
	}
	dirs.sort();
	Ok(dirs)
}

fn dir_is_empty(dir: &Path) -> Result<bool, CatalogError> {
	let mut entries =
		fs::read_dir(dir).map_err(|e| CatalogError::io(dir.display().to_string(), e))?;
	Ok(entries.next().is_none())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::TempDir;

	fn write_file(root: &Path, rel: &str, content: &[u8]) {
		let path = root.join(rel);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		let mut file = fs::File::create(&path).unwrap();
		file.write_all(content).unwrap();
	}

	#[test]
	fn test_scan_excludes_metadata_dir() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "a.txt", b"aa");
		write_file(tmp.path(), "sub/b.txt", b"bbb");
		write_file(tmp.path(), ".replicat/info", b"{}");

		let records = scan_directory(tmp.path()).unwrap();
		let paths: Vec<String> = records.iter().map(FileRecord::logical_path).collect();
		assert_eq!(paths, vec!["/a.txt", "/sub/b.txt"]);
		assert_eq!(records[0].size, 2);
		assert_eq!(records[1].size, 3);
	}

	#[test]
	fn test_scan_empty_root() {
		let tmp = TempDir::new().unwrap();
		assert!(scan_directory(tmp.path()).unwrap().is_empty());
	}

	#[test]
	fn test_marker_round_trip() {
		let tmp = TempDir::new().unwrap();
		assert_eq!(read_marker(tmp.path()).unwrap(), None);

		let info = MarkerInfo { name: "photos".to_string(), tag: "laptop".to_string() };
		write_marker(tmp.path(), &info).unwrap();
		assert_eq!(read_marker(tmp.path()).unwrap(), Some(info));

		assert!(remove_marker(tmp.path()).unwrap());
		assert_eq!(read_marker(tmp.path()).unwrap(), None);
		assert!(!remove_marker(tmp.path()).unwrap());
	}

	#[test]
	fn test_corrupt_marker_is_an_error() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), ".replicat/info", b"not json");
		assert!(read_marker(tmp.path()).is_err());
	}

	#[test]
	fn test_copy_with_metadata_preserves_mtime() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "src.bin", b"payload");
		let src = tmp.path().join("src.bin");
		filetime::set_file_mtime(&src, filetime::FileTime::from_unix_time(1_000_000, 0))
			.unwrap();

		let dst = tmp.path().join("nested/dst.bin");
		copy_with_metadata(&src, &dst).unwrap();

		assert_eq!(fs::read(&dst).unwrap(), b"payload");
		let mtime = fs::metadata(&dst)
			.unwrap()
			.modified()
			.unwrap()
			.duration_since(UNIX_EPOCH)
			.unwrap()
			.as_secs();
		assert_eq!(mtime, 1_000_000);
	}

	#[test]
	fn test_copy_refuses_existing_destination() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "src.bin", b"a");
		write_file(tmp.path(), "dst.bin", b"b");

		let result =
			copy_with_metadata(&tmp.path().join("src.bin"), &tmp.path().join("dst.bin"));
		assert!(matches!(result, Err(CatalogError::DestinationExists { .. })));
	}

	#[test]
	fn test_remove_file_cleans_empty_parents() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "a/b/file.txt", b"x");
		write_file(tmp.path(), "a/keep.txt", b"y");

		remove_file(tmp.path(), &tmp.path().join("a/b/file.txt")).unwrap();
		// "a/b" became empty and went away; "a" still holds keep.txt
		assert!(!tmp.path().join("a/b").exists());
		assert!(tmp.path().join("a/keep.txt").exists());

		remove_file(tmp.path(), &tmp.path().join("a/keep.txt")).unwrap();
		assert!(!tmp.path().join("a").exists());
		// The root itself is never removed
		assert!(tmp.path().exists());
	}

	#[test]
	fn test_empty_dir_sweep() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "keep/file.txt", b"x");
		fs::create_dir_all(tmp.path().join("empty/nested")).unwrap();

		assert!(has_empty_subdir(tmp.path()).unwrap());
		let removed = remove_empty_dirs(tmp.path()).unwrap();
		// "empty/nested" first, then "empty" itself
		assert_eq!(removed, 2);
		assert!(!tmp.path().join("empty").exists());
		assert!(tmp.path().join("keep/file.txt").exists());
		assert!(!has_empty_subdir(tmp.path()).unwrap());
	}
}

// vim: ts=4
