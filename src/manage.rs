//! Managing and unmanaging physical locations
//!
//! Managing a root means: validate or write its `.replicat/info` marker,
//! create or re-point the location binding, then reconcile the root
//! against the directory's stored records. A root managed for the first
//! time while the directory has no records yet takes a bulk-insert fast
//! path instead of a full reconciliation. Unmanaging removes the marker
//! and the binding; the directory and its records stay.

use std::path::Path;

use crate::committer::BatchedHashCommitter;
use crate::error::{CatalogError, StoreError};
use crate::logging::{info, warn};
use crate::policy::{Confirmation, DecisionPolicy, LocalOnlyAction};
use crate::reconcile::{ReconcileReport, ReconciliationEngine};
use crate::record::{FileRecord, LocationBinding};
use crate::scan::{self, MarkerInfo};
use crate::store::{in_transaction, Store};

/// What managing a root did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManageOutcome {
	/// The directory had no records, so the scan was bulk-inserted
	pub first_management: bool,

	pub report: ReconcileReport,

	/// Empty subdirectories swept after reconciliation
	pub empty_dirs_removed: usize,
}

/// Bind `root` to the managed directory `name` under binding tag `tag`
/// and bring it in line with the catalog.
pub fn manage(
	store: &mut dyn Store,
	policy: &mut dyn DecisionPolicy,
	committer: &BatchedHashCommitter,
	name: &str,
	tag: &str,
	root: &Path,
) -> Result<ManageOutcome, CatalogError> {
	let directory = store
		.directory_by_name(name)?
		.ok_or(StoreError::DirectoryNotFound { name: name.to_string() })?;
	let directory_id = match directory.id {
		Some(id) => id,
		None => {
			return Err(CatalogError::Other {
				message: format!("directory {} has no persisted id", name),
			})
		}
	};

	check_marker(root, name, tag)?;
	bind(store, directory_id, tag, root)?;
	scan::write_marker(root, &MarkerInfo { name: name.to_string(), tag: tag.to_string() })?;

	let records = scan::scan_directory(root)?;
	let mut outcome = ManageOutcome::default();
	if store.file_records(directory_id)?.is_empty() {
		outcome.first_management = true;
		outcome.report = first_management(store, policy, committer, directory_id, root, records)?;
	} else {
		let engine = ReconciliationEngine::new(directory_id, root, committer);
		outcome.report = engine.run(store, policy, records)?;
	}

	if scan::has_empty_subdir(root)?
		&& policy.confirm(&Confirmation::RemoveEmptyDirectories { root: root.to_path_buf() })
	{
		outcome.empty_dirs_removed = scan::remove_empty_dirs(root)?;
	}
	Ok(outcome)
}

/// A marker from an earlier management must agree with the requested
/// name and tag; a disagreeing marker means the root belongs to some
/// other directory and must not be silently rebound.
fn check_marker(root: &Path, name: &str, tag: &str) -> Result<(), CatalogError> {
	match scan::read_marker(root)? {
		None => Ok(()),
		Some(marker) if marker.name == name && marker.tag == tag => {
			info!(root = %root.display(), tag, "re-managing a known location");
			Ok(())
		}
		Some(marker) => Err(CatalogError::Other {
			message: format!(
				"{} is already managed as directory '{}' tag '{}'; unmanage it first",
				root.display(),
				marker.name,
				marker.tag
			),
		}),
	}
}

/// Create the binding, or re-point an existing one at this root. A tag
/// bound to a different directory is an error.
fn bind(
	store: &mut dyn Store,
	directory_id: u64,
	tag: &str,
	root: &Path,
) -> Result<(), CatalogError> {
	match store.binding_by_tag(tag)? {
		Some(binding) if binding.directory_id != directory_id => {
			Err(CatalogError::Other {
				message: format!("tag {} is bound to another directory", tag),
			})
		}
		Some(binding) => {
			if binding.physical_path.as_deref() != Some(root) {
				info!(tag, root = %root.display(), "location moved, updating binding path");
				in_transaction(store, |s| {
					s.update_binding_path(tag, Some(root))?;
					Ok(())
				})?;
			}
			Ok(())
		}
		None => in_transaction(store, |s| {
			s.create_binding(&LocationBinding {
				tag: tag.to_string(),
				directory_id,
				physical_path: Some(root.to_path_buf()),
			})?;
			Ok(())
		}),
	}
}

/// Bulk-insert the scan of a directory that has no records yet. The
/// policy still chooses whether to hash, but there is nothing to
/// classify against and nothing to delete.
fn first_management(
	store: &mut dyn Store,
	policy: &mut dyn DecisionPolicy,
	committer: &BatchedHashCommitter,
	directory_id: u64,
	root: &Path,
	mut records: Vec<FileRecord>,
) -> Result<ReconcileReport, CatalogError> {
	let mut report = ReconcileReport::default();
	if records.is_empty() {
		return Ok(report);
	}
	let hash = match policy.on_local_only(&records) {
		LocalOnlyAction::Skip => return Ok(report),
		LocalOnlyAction::DeleteLocal => {
			warn!("refusing to delete local files during first management");
			return Ok(report);
		}
		LocalOnlyAction::Insert => false,
		LocalOnlyAction::InsertAndHash => {
			let total_bytes = records.iter().map(|r| r.size).sum();
			policy.confirm(&Confirmation::HashCost { files: records.len(), total_bytes })
		}
	};
	in_transaction(store, |s| {
		let inserted = s.insert_file_records(directory_id, &mut records)?;
		if inserted != records.len() {
			return Err(CatalogError::Inconsistency {
				expected: records.len(),
				actual: inserted,
				context: "first management insert".to_string(),
			});
		}
		Ok(())
	})?;
	report.records_inserted = records.len();
	if hash {
		committer.hash_and_commit(
			&mut records,
			|record| Ok(record.physical_path(root)),
			|batch| in_transaction(store, |s| Ok(s.update_file_records(batch)?)),
		)?;
		report.hashes_stored = records.len();
	}
	info!(directory_id, inserted = report.records_inserted, "first management done");
	Ok(report)
}

/// Drop the binding behind `tag` and the marker at its physical root.
/// The directory and its file records are untouched.
pub fn unmanage(store: &mut dyn Store, tag: &str) -> Result<(), CatalogError> {
	let binding = store
		.binding_by_tag(tag)?
		.ok_or(StoreError::TagNotFound { tag: tag.to_string() })?;
	if let Some(root) = &binding.physical_path {
		if root.exists() {
			scan::remove_marker(root)?;
		} else {
			warn!(tag, root = %root.display(), "location unreachable, leaving marker behind");
		}
	}
	in_transaction(store, |s| {
		s.remove_binding(tag)?;
		Ok(())
	})?;
	info!(tag, "location unmanaged");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::policy::SkipAll;
	use crate::record::{ContentHash, FileRecord};
	use crate::store::{MemoryStore, Store};
	use std::fs;
	use std::io::Write;
	use tempfile::TempDir;

	struct InsertOnly;
	impl DecisionPolicy for InsertOnly {
		fn on_local_only(&mut self, _records: &[FileRecord]) -> LocalOnlyAction {
			LocalOnlyAction::Insert
		}
	}

	struct InsertAndHashAll;
	impl DecisionPolicy for InsertAndHashAll {
		fn on_local_only(&mut self, _records: &[FileRecord]) -> LocalOnlyAction {
			LocalOnlyAction::InsertAndHash
		}
		fn confirm(&mut self, _what: &Confirmation) -> bool {
			true
		}
	}

	fn write_file(root: &Path, rel: &str, content: &[u8]) {
		let path = root.join(rel);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		let mut file = fs::File::create(&path).unwrap();
		file.write_all(content).unwrap();
	}

	fn store_with_dir(name: &str) -> MemoryStore {
		let mut store = MemoryStore::new();
		in_transaction(&mut store, |s| Ok(s.create_directory(name, "")?)).unwrap();
		store
	}

	#[test]
	fn test_first_management_inserts_everything() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "a.txt", b"aa");
		write_file(tmp.path(), "sub/b.txt", b"bbb");
		let mut store = store_with_dir("docs");
		let committer = BatchedHashCommitter::default();

		let outcome =
			manage(&mut store, &mut InsertOnly, &committer, "docs", "main", tmp.path()).unwrap();

		assert!(outcome.first_management);
		assert_eq!(outcome.report.records_inserted, 2);
		assert_eq!(outcome.report.hashes_stored, 0);
		assert_eq!(store.all_file_records().unwrap().len(), 2);

		// Marker written, binding created
		let marker = scan::read_marker(tmp.path()).unwrap().unwrap();
		assert_eq!(marker, MarkerInfo { name: "docs".to_string(), tag: "main".to_string() });
		let binding = store.binding_by_tag("main").unwrap().unwrap();
		assert_eq!(binding.physical_path.as_deref(), Some(tmp.path()));
	}

	#[test]
	fn test_first_management_with_hashing() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "a.txt", b"aa");
		let mut store = store_with_dir("docs");
		let committer = BatchedHashCommitter::default();

		let outcome =
			manage(&mut store, &mut InsertAndHashAll, &committer, "docs", "main", tmp.path())
				.unwrap();
		assert_eq!(outcome.report.hashes_stored, 1);
		let records = store.all_file_records().unwrap();
		assert!(records[0].hash.is_known());
	}

	#[test]
	fn test_remanaging_matching_marker_reconciles() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "a.txt", b"aa");
		let mut store = store_with_dir("docs");
		let committer = BatchedHashCommitter::default();
		manage(&mut store, &mut InsertOnly, &committer, "docs", "main", tmp.path()).unwrap();

		// Second run: nothing changed, reconciliation is a no-op
		let outcome =
			manage(&mut store, &mut InsertOnly, &committer, "docs", "main", tmp.path()).unwrap();
		assert!(!outcome.first_management);
		assert!(outcome.report.is_noop());
	}

	#[test]
	fn test_marker_of_other_directory_is_rejected() {
		let tmp = TempDir::new().unwrap();
		scan::write_marker(
			tmp.path(),
			&MarkerInfo { name: "other".to_string(), tag: "x".to_string() },
		)
		.unwrap();
		let mut store = store_with_dir("docs");
		let committer = BatchedHashCommitter::default();

		let result =
			manage(&mut store, &mut SkipAll, &committer, "docs", "main", tmp.path());
		assert!(result.is_err());
		assert!(store.binding_by_tag("main").unwrap().is_none());
	}

	#[test]
	fn test_tag_bound_elsewhere_is_rejected() {
		let tmp = TempDir::new().unwrap();
		let mut store = store_with_dir("docs");
		let other_id =
			in_transaction(&mut store, |s| Ok(s.create_directory("other", "")?)).unwrap();
		in_transaction(&mut store, |s| {
			s.create_binding(&LocationBinding {
				tag: "main".to_string(),
				directory_id: other_id,
				physical_path: None,
			})?;
			Ok(())
		})
		.unwrap();
		let committer = BatchedHashCommitter::default();

		let result =
			manage(&mut store, &mut SkipAll, &committer, "docs", "main", tmp.path());
		assert!(result.is_err());
	}

	#[test]
	fn test_moved_location_updates_binding_path() {
		let old = TempDir::new().unwrap();
		let new = TempDir::new().unwrap();
		write_file(old.path(), "a.txt", b"aa");
		let mut store = store_with_dir("docs");
		let committer = BatchedHashCommitter::default();
		manage(&mut store, &mut InsertOnly, &committer, "docs", "main", old.path()).unwrap();

		// The same content reappears under a new root with the old marker
		write_file(new.path(), "a.txt", b"aa");
		let mtime = fs::metadata(old.path().join("a.txt")).unwrap().modified().unwrap();
		let dst = fs::File::options().write(true).open(new.path().join("a.txt")).unwrap();
		dst.set_modified(mtime).unwrap();
		scan::write_marker(
			new.path(),
			&MarkerInfo { name: "docs".to_string(), tag: "main".to_string() },
		)
		.unwrap();

		manage(&mut store, &mut SkipAll, &committer, "docs", "main", new.path()).unwrap();
		let binding = store.binding_by_tag("main").unwrap().unwrap();
		assert_eq!(binding.physical_path.as_deref(), Some(new.path()));
	}

	#[test]
	fn test_unmanage_removes_binding_and_marker_keeps_records() {
		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "a.txt", b"aa");
		let mut store = store_with_dir("docs");
		let committer = BatchedHashCommitter::default();
		manage(&mut store, &mut InsertOnly, &committer, "docs", "main", tmp.path()).unwrap();

		unmanage(&mut store, "main").unwrap();

		assert!(store.binding_by_tag("main").unwrap().is_none());
		assert_eq!(scan::read_marker(tmp.path()).unwrap(), None);
		assert_eq!(store.all_file_records().unwrap().len(), 1);
	}

	#[test]
	fn test_unmanage_unknown_tag_fails() {
		let mut store = MemoryStore::new();
		assert!(unmanage(&mut store, "nope").is_err());
	}

	#[test]
	fn test_empty_dir_sweep_behind_confirmation() {
		struct SweepOnly;
		impl DecisionPolicy for SweepOnly {
			fn on_local_only(&mut self, _records: &[FileRecord]) -> LocalOnlyAction {
				LocalOnlyAction::Insert
			}
			fn confirm(&mut self, what: &Confirmation) -> bool {
				matches!(what, Confirmation::RemoveEmptyDirectories { .. })
			}
		}

		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "a.txt", b"aa");
		fs::create_dir_all(tmp.path().join("empty")).unwrap();
		let mut store = store_with_dir("docs");
		let committer = BatchedHashCommitter::default();

		let outcome =
			manage(&mut store, &mut SweepOnly, &committer, "docs", "main", tmp.path()).unwrap();
		assert_eq!(outcome.empty_dirs_removed, 1);
		assert!(!tmp.path().join("empty").exists());
	}

	#[test]
	fn test_unknown_directory_fails_before_touching_disk() {
		let tmp = TempDir::new().unwrap();
		let mut store = MemoryStore::new();
		let committer = BatchedHashCommitter::default();

		let result =
			manage(&mut store, &mut SkipAll, &committer, "nope", "main", tmp.path());
		assert!(result.is_err());
		assert_eq!(scan::read_marker(tmp.path()).unwrap(), None);
	}

	// Reconciliation after a record was hashed: unchanged files verify
	// clean, a rewritten file with preserved metadata surfaces as diverged
	#[test]
	fn test_verified_match_detects_silent_divergence() {
		struct VerifyAll;
		impl DecisionPolicy for VerifyAll {
			fn on_verified_match(
				&mut self,
				_pairs: &[crate::policy::RecordPair],
			) -> crate::policy::VerifiedMatchAction {
				crate::policy::VerifiedMatchAction::Recompute
			}
		}

		let tmp = TempDir::new().unwrap();
		write_file(tmp.path(), "a.txt", b"aa");
		let mut store = store_with_dir("docs");
		let committer = BatchedHashCommitter::default();
		manage(&mut store, &mut InsertAndHashAll, &committer, "docs", "main", tmp.path())
			.unwrap();

		// Rewrite the content, then restore size and mtime
		let meta = fs::metadata(tmp.path().join("a.txt")).unwrap();
		let mtime = meta.modified().unwrap();
		write_file(tmp.path(), "a.txt", b"XX");
		let f = fs::File::options().write(true).open(tmp.path().join("a.txt")).unwrap();
		f.set_modified(mtime).unwrap();

		let outcome =
			manage(&mut store, &mut VerifyAll, &committer, "docs", "main", tmp.path()).unwrap();
		assert_eq!(outcome.report.verified_diverged, 1);
		assert_eq!(outcome.report.verified_ok, 0);
		// VerifyAll skips conflicts, so the stored hash is untouched
		let records = store.all_file_records().unwrap();
		assert_ne!(records[0].hash, ContentHash::Unknown);
	}
}

// vim: ts=4
