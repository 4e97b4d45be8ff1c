//! Cross-location recovery of missing files
//!
//! When a stored record has no local file, the same content may still
//! exist at another physical location bound to the same directory. The
//! resolver enumerates those candidates, probes them in the store's
//! stable binding order, and copies the first hit back into place.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CatalogError;
use crate::logging::{info, warn};
use crate::record::physical_join;
use crate::scan;
use crate::store::{in_transaction, Store};

/// One located copy, ready to be materialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCopy {
	pub logical_path: String,
	pub source: PathBuf,
	pub destination: PathBuf,
}

pub struct CrossLocationResolver<'a> {
	directory_id: u64,

	/// Physical root currently being reconciled; never a candidate
	root: &'a Path,
}

impl<'a> CrossLocationResolver<'a> {
	pub fn new(directory_id: u64, root: &'a Path) -> Self {
		CrossLocationResolver { directory_id, root }
	}

	/// Other reachable roots of the same directory, in the store's
	/// stable binding order. Bindings whose recorded path no longer
	/// exists are reported back to the store, which marks their path
	/// unknown. That side effect runs in its own transaction, separate
	/// from any search.
	pub fn candidate_roots(&self, store: &mut dyn Store) -> Result<Vec<PathBuf>, CatalogError> {
		let own = canonical_or_plain(self.root);
		let mut roots = Vec::new();
		let mut stale_tags = Vec::new();
		for binding in store.bindings_for_directory(self.directory_id)? {
			let path = match binding.physical_path {
				Some(path) => path,
				None => continue,
			};
			if !path.exists() {
				stale_tags.push(binding.tag);
				continue;
			}
			if canonical_or_plain(&path) == own {
				continue;
			}
			roots.push(path);
		}
		if !stale_tags.is_empty() {
			warn!(tags = ?stale_tags, "marking unreachable binding paths unknown");
			in_transaction(store, |s| {
				s.reset_binding_paths(&stale_tags)?;
				Ok(())
			})?;
		}
		Ok(roots)
	}

	/// For each missing logical path, probe the candidate roots in
	/// order and take the first one holding a file there. Returns the
	/// located copies and the paths found nowhere.
	pub fn locate(
		&self,
		candidate_roots: &[PathBuf],
		logical_paths: &[String],
	) -> (Vec<ResolvedCopy>, Vec<String>) {
		let mut found = Vec::new();
		let mut missing = Vec::new();
		for logical_path in logical_paths {
			let hit = candidate_roots
				.iter()
				.map(|root| physical_join(root, logical_path))
				.find(|source| source.is_file());
			match hit {
				Some(source) => found.push(ResolvedCopy {
					logical_path: logical_path.clone(),
					source,
					destination: physical_join(self.root, logical_path),
				}),
				None => missing.push(logical_path.clone()),
			}
		}
		(found, missing)
	}

	/// Materialize located copies. Every copy preserves the source
	/// mtime and fails loudly if its destination already exists.
	pub fn copy_all(&self, copies: &[ResolvedCopy]) -> Result<usize, CatalogError> {
		for copy in copies {
			scan::copy_with_metadata(&copy.source, &copy.destination)?;
			info!(
				from = %copy.source.display(),
				to = %copy.destination.display(),
				"restored missing file"
			);
		}
		Ok(copies.len())
	}
}

/// "Same physical location" check: canonicalize when possible so two
/// spellings of one directory are not treated as replicas of each other
fn canonical_or_plain(path: &Path) -> PathBuf {
	fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::LocationBinding;
	use crate::store::MemoryStore;
	use std::io::Write;
	use tempfile::TempDir;

	fn bind(store: &mut MemoryStore, tag: &str, dir_id: u64, path: Option<&Path>) {
		in_transaction(store, |s| {
			s.create_binding(&LocationBinding {
				tag: tag.to_string(),
				directory_id: dir_id,
				physical_path: path.map(Path::to_path_buf),
			})?;
			Ok(())
		})
		.unwrap();
	}

	fn write_file(root: &Path, rel: &str, content: &[u8]) {
		let path = root.join(rel);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		let mut file = fs::File::create(&path).unwrap();
		file.write_all(content).unwrap();
	}

	#[test]
	fn test_candidates_skip_own_null_and_stale() {
		let own = TempDir::new().unwrap();
		let other = TempDir::new().unwrap();
		let mut store = MemoryStore::new();
		let dir_id =
			in_transaction(&mut store, |s| Ok(s.create_directory("d", "")?)).unwrap();
		bind(&mut store, "own", dir_id, Some(own.path()));
		bind(&mut store, "other", dir_id, Some(other.path()));
		bind(&mut store, "unknown", dir_id, None);
		bind(&mut store, "stale", dir_id, Some(Path::new("/definitely/not/there")));

		let resolver = CrossLocationResolver::new(dir_id, own.path());
		let roots = resolver.candidate_roots(&mut store).unwrap();
		assert_eq!(roots, vec![other.path().to_path_buf()]);

		// The stale binding path got reset to unknown
		let stale = store.binding_by_tag("stale").unwrap().unwrap();
		assert_eq!(stale.physical_path, None);
	}

	#[test]
	fn test_locate_first_hit_in_order() {
		let own = TempDir::new().unwrap();
		let a = TempDir::new().unwrap();
		let b = TempDir::new().unwrap();
		write_file(b.path(), "x.txt", b"from b");
		write_file(a.path(), "y.txt", b"from a");
		write_file(b.path(), "y.txt", b"from b");

		let resolver = CrossLocationResolver::new(1, own.path());
		let roots = vec![a.path().to_path_buf(), b.path().to_path_buf()];
		let (found, missing) = resolver.locate(
			&roots,
			&["/x.txt".to_string(), "/y.txt".to_string(), "/z.txt".to_string()],
		);

		assert_eq!(missing, vec!["/z.txt"]);
		assert_eq!(found.len(), 2);
		// /x.txt only exists at b; /y.txt resolves to the first root
		assert_eq!(found[0].source, b.path().join("x.txt"));
		assert_eq!(found[1].source, a.path().join("y.txt"));
	}

	#[test]
	fn test_copy_all_materializes_and_fails_on_existing() {
		let own = TempDir::new().unwrap();
		let other = TempDir::new().unwrap();
		write_file(other.path(), "sub/x.txt", b"payload");

		let resolver = CrossLocationResolver::new(1, own.path());
		let (found, _) =
			resolver.locate(&[other.path().to_path_buf()], &["/sub/x.txt".to_string()]);
		assert_eq!(resolver.copy_all(&found).unwrap(), 1);
		assert_eq!(fs::read(own.path().join("sub/x.txt")).unwrap(), b"payload");

		// A second copy of the same file must fail loudly
		assert!(matches!(
			resolver.copy_all(&found),
			Err(CatalogError::DestinationExists { .. })
		));
	}
}

// vim: ts=4
