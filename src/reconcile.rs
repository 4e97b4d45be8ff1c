//! Reconciliation of one physical location against the catalog
//!
//! A scan of the physical root is classified against the stored records
//! of the directory by logical path: pairs sharing a path are matches or
//! conflicts depending on size and mtime, the rest is local-only or
//! store-only. Every class is handed to the policy as a group; each
//! chosen action runs in its own transaction with its affected-row count
//! verified, so one failed group never poisons the others.

use std::path::Path;

use crate::committer::BatchedHashCommitter;
use crate::error::CatalogError;
use crate::guard::SafeDeletionGuard;
use crate::hasher;
use crate::logging::{info, warn};
use crate::policy::{
	Confirmation, ConflictAction, DecisionPolicy, HashlessMatchAction, LocalOnlyAction,
	RecordPair, StoreOnlyAction, VerifiedMatchAction,
};
use crate::record::{ContentHash, FileRecord};
use crate::resolver::CrossLocationResolver;
use crate::scan;
use crate::store::{in_transaction, Store};

/// Mutation counts of one reconciliation run. A run against a location
/// that already agrees with the catalog reports all zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
	/// Verified matches whose recomputed hash still agreed
	pub verified_ok: usize,

	/// Verified matches whose content silently diverged (handled as
	/// conflicts in the same run)
	pub verified_diverged: usize,

	/// Stored records that received a freshly computed hash
	pub hashes_stored: usize,

	/// Stored records overwritten from local metadata
	pub records_overwritten: usize,

	/// New records inserted
	pub records_inserted: usize,

	/// Stored records deleted
	pub records_deleted: usize,

	/// Local files deleted from disk
	pub local_files_deleted: usize,

	/// Files copied back from other locations
	pub files_restored: usize,
}

impl ReconcileReport {
	/// True when the run changed neither the store nor the disk
	pub fn is_noop(&self) -> bool {
		self.hashes_stored == 0
			&& self.records_overwritten == 0
			&& self.records_inserted == 0
			&& self.records_deleted == 0
			&& self.local_files_deleted == 0
			&& self.files_restored == 0
	}
}

/// Path-keyed classification of a scan against the stored records
#[derive(Debug, Default)]
struct Classification {
	verified: Vec<RecordPair>,
	hashless: Vec<RecordPair>,
	conflicts: Vec<RecordPair>,
	local_only: Vec<FileRecord>,
	store_only: Vec<FileRecord>,
}

pub struct ReconciliationEngine<'a> {
	directory_id: u64,
	root: &'a Path,
	committer: &'a BatchedHashCommitter,
}

impl<'a> ReconciliationEngine<'a> {
	pub fn new(directory_id: u64, root: &'a Path, committer: &'a BatchedHashCommitter) -> Self {
		ReconciliationEngine { directory_id, root, committer }
	}

	/// Reconcile the scanned records against the directory's stored
	/// records. `local` comes from [`scan::scan_directory`] of the root.
	pub fn run(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
		local: Vec<FileRecord>,
	) -> Result<ReconcileReport, CatalogError> {
		let stored = store.file_records(self.directory_id)?;
		let mut classes = classify(local, stored);
		let mut report = ReconcileReport::default();

		self.handle_verified(policy, &mut classes, &mut report)?;
		self.handle_hashless(store, policy, &mut classes, &mut report)?;
		self.handle_conflicts(store, policy, &mut classes, &mut report)?;
		self.handle_local_only(store, policy, &classes.local_only, &mut report)?;
		self.handle_store_only(store, policy, &classes.store_only, &mut report)?;

		info!(
			directory_id = self.directory_id,
			root = %self.root.display(),
			?report,
			"reconciliation finished"
		);
		Ok(report)
	}

	/// Size/mtime matches with a known stored hash. Recomputing compares
	/// the local content against the stored digest; the store is never
	/// written here, divergent pairs join the conflict class instead.
	fn handle_verified(
		&self,
		policy: &mut dyn DecisionPolicy,
		classes: &mut Classification,
		report: &mut ReconcileReport,
	) -> Result<(), CatalogError> {
		if classes.verified.is_empty() {
			return Ok(());
		}
		if policy.on_verified_match(&classes.verified) != VerifiedMatchAction::Recompute {
			return Ok(());
		}
		for mut pair in classes.verified.drain(..) {
			let path = pair.local.physical_path(self.root);
			pair.local.hash = hasher::hash_file(&path)?;
			if pair.local.hash == pair.stored.hash {
				report.verified_ok += 1;
			} else {
				warn!(path = %pair.local.logical_path(), "content diverged under unchanged metadata");
				report.verified_diverged += 1;
				classes.conflicts.push(pair);
			}
		}
		Ok(())
	}

	/// Size/mtime matches whose stored hash was never computed: hash the
	/// local files and store the digests on the existing records
	fn handle_hashless(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
		classes: &mut Classification,
		report: &mut ReconcileReport,
	) -> Result<(), CatalogError> {
		if classes.hashless.is_empty() {
			return Ok(());
		}
		if policy.on_match_without_hash(&classes.hashless) != HashlessMatchAction::ComputeAndStore
		{
			return Ok(());
		}
		let mut records: Vec<FileRecord> =
			classes.hashless.iter().map(|p| p.local.clone()).collect();
		let total_bytes = records.iter().map(|r| r.size).sum();
		if !policy.confirm(&Confirmation::HashCost { files: records.len(), total_bytes }) {
			return Ok(());
		}
		self.committer.hash_and_commit(
			&mut records,
			|record| Ok(record.physical_path(self.root)),
			|batch| in_transaction(store, |s| Ok(s.update_file_records(batch)?)),
		)?;
		report.hashes_stored += records.len();
		Ok(())
	}

	/// Pairs disagreeing on size or mtime (plus divergent verified
	/// matches). One policy choice applies to the whole group.
	fn handle_conflicts(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
		classes: &mut Classification,
		report: &mut ReconcileReport,
	) -> Result<(), CatalogError> {
		if classes.conflicts.is_empty() {
			return Ok(());
		}
		match policy.on_conflict(&classes.conflicts) {
			ConflictAction::Skip => Ok(()),
			ConflictAction::OverwriteAndRehash => {
				let count = classes.conflicts.len();
				if !policy.confirm(&Confirmation::OverwriteRecords { count }) {
					return Ok(());
				}
				let mut records: Vec<FileRecord> =
					classes.conflicts.iter().map(|p| p.local.clone()).collect();
				self.committer.hash_and_commit(
					&mut records,
					|record| Ok(record.physical_path(self.root)),
					|batch| in_transaction(store, |s| Ok(s.update_file_records(batch)?)),
				)?;
				report.records_overwritten += count;
				Ok(())
			}
			ConflictAction::Overwrite => {
				let count = classes.conflicts.len();
				if !policy.confirm(&Confirmation::OverwriteRecords { count }) {
					return Ok(());
				}
				let records: Vec<FileRecord> = classes
					.conflicts
					.iter()
					.map(|p| {
						let mut r = p.local.clone();
						r.hash = ContentHash::Unknown;
						r
					})
					.collect();
				let updated = in_transaction(store, |s| {
					let updated = s.update_file_records(&records)?;
					if updated != records.len() {
						return Err(CatalogError::Inconsistency {
							expected: records.len(),
							actual: updated,
							context: "conflict overwrite".to_string(),
						});
					}
					Ok(updated)
				})?;
				report.records_overwritten += updated;
				Ok(())
			}
			ConflictAction::DeleteLocalAndRestore => {
				let count = classes.conflicts.len();
				if !policy.confirm(&Confirmation::DeleteLocalFiles { count }) {
					return Ok(());
				}
				let mut paths = Vec::new();
				for pair in &classes.conflicts {
					scan::remove_file(self.root, &pair.local.physical_path(self.root))?;
					report.local_files_deleted += 1;
					paths.push(pair.local.logical_path());
				}
				report.files_restored += self.restore(store, policy, &paths)?;
				Ok(())
			}
		}
	}

	/// Files on disk with no stored record
	fn handle_local_only(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
		records: &[FileRecord],
		report: &mut ReconcileReport,
	) -> Result<(), CatalogError> {
		if records.is_empty() {
			return Ok(());
		}
		match policy.on_local_only(records) {
			LocalOnlyAction::Skip => Ok(()),
			LocalOnlyAction::Insert => {
				report.records_inserted += self.insert(store, records.to_vec())?.len();
				Ok(())
			}
			LocalOnlyAction::InsertAndHash => {
				let total_bytes = records.iter().map(|r| r.size).sum();
				let cost = Confirmation::HashCost { files: records.len(), total_bytes };
				if !policy.confirm(&cost) {
					// Still insert; the hashes can be computed later
					report.records_inserted += self.insert(store, records.to_vec())?.len();
					return Ok(());
				}
				let mut inserted = self.insert(store, records.to_vec())?;
				report.records_inserted += inserted.len();
				self.committer.hash_and_commit(
					&mut inserted,
					|record| Ok(record.physical_path(self.root)),
					|batch| in_transaction(store, |s| Ok(s.update_file_records(batch)?)),
				)?;
				report.hashes_stored += inserted.len();
				Ok(())
			}
			LocalOnlyAction::DeleteLocal => {
				if !policy.confirm(&Confirmation::DeleteLocalFiles { count: records.len() }) {
					return Ok(());
				}
				for record in records {
					scan::remove_file(self.root, &record.physical_path(self.root))?;
					report.local_files_deleted += 1;
				}
				Ok(())
			}
		}
	}

	/// Stored records with no file on disk
	fn handle_store_only(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
		records: &[FileRecord],
		report: &mut ReconcileReport,
	) -> Result<(), CatalogError> {
		if records.is_empty() {
			return Ok(());
		}
		match policy.on_store_only(records) {
			StoreOnlyAction::Skip => Ok(()),
			StoreOnlyAction::DeleteRecords => {
				let deletable = SafeDeletionGuard::filter_deletable(store, records, policy)?;
				if deletable.is_empty() {
					return Ok(());
				}
				let unknown = deletable.iter().filter(|r| !r.hash.is_known()).count();
				let confirmation = if unknown > 0 {
					Confirmation::DeleteUnverifiedRecords { count: deletable.len(), unknown }
				} else {
					Confirmation::DeleteRecords { count: deletable.len() }
				};
				if !policy.confirm(&confirmation) {
					return Ok(());
				}
				report.records_deleted += SafeDeletionGuard::execute(store, &deletable)?;
				Ok(())
			}
			StoreOnlyAction::Restore => {
				let paths: Vec<String> =
					records.iter().map(FileRecord::logical_path).collect();
				report.files_restored += self.restore(store, policy, &paths)?;
				Ok(())
			}
		}
	}

	/// Copy the given logical paths back from other reachable locations
	fn restore(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
		paths: &[String],
	) -> Result<usize, CatalogError> {
		let resolver = CrossLocationResolver::new(self.directory_id, self.root);
		let roots = resolver.candidate_roots(store)?;
		let (found, missing) = resolver.locate(&roots, paths);
		if !missing.is_empty() {
			warn!(count = missing.len(), paths = ?missing, "content reachable nowhere");
		}
		if found.is_empty() {
			return Ok(0);
		}
		if !policy.confirm(&Confirmation::CopyFiles { count: found.len() }) {
			return Ok(0);
		}
		resolver.copy_all(&found)
	}

	/// Insert pending records in one count-verified transaction,
	/// returning them with their assigned ids
	fn insert(
		&self,
		store: &mut dyn Store,
		mut records: Vec<FileRecord>,
	) -> Result<Vec<FileRecord>, CatalogError> {
		let directory_id = self.directory_id;
		in_transaction(store, |s| {
			let inserted = s.insert_file_records(directory_id, &mut records)?;
			if inserted != records.len() {
				return Err(CatalogError::Inconsistency {
					expected: records.len(),
					actual: inserted,
					context: "record insert".to_string(),
				});
			}
			Ok(())
		})?;
		Ok(records)
	}
}

/// Pair local and stored records by logical path. Both sides get sorted
/// by logical path first, then a single merge pass classifies everything.
fn classify(local: Vec<FileRecord>, stored: Vec<FileRecord>) -> Classification {
	let mut stored_sorted = stored;
	stored_sorted.sort_by_key(FileRecord::logical_path);
	let mut local_sorted = local;
	local_sorted.sort_by_key(FileRecord::logical_path);
	let mut classes = Classification::default();
	let mut stored_iter = stored_sorted.into_iter().peekable();
	let mut local_iter = local_sorted.into_iter().peekable();
	loop {
		let order = match (local_iter.peek(), stored_iter.peek()) {
			(None, None) => break,
			(Some(_), None) => std::cmp::Ordering::Less,
			(None, Some(_)) => std::cmp::Ordering::Greater,
			(Some(l), Some(s)) => l.logical_path().cmp(&s.logical_path()),
		};
		match order {
			std::cmp::Ordering::Less => {
				if let Some(l) = local_iter.next() {
					classes.local_only.push(l);
				}
			}
			std::cmp::Ordering::Greater => {
				if let Some(s) = stored_iter.next() {
					classes.store_only.push(s);
				}
			}
			std::cmp::Ordering::Equal => {
				if let (Some(mut l), Some(s)) = (local_iter.next(), stored_iter.next()) {
					// The pair inherits the persisted identity
					l.id = s.id;
					l.directory_id = s.directory_id;
					let pair = RecordPair { local: l, stored: s };
					if pair.local.size == pair.stored.size
						&& pair.local.modified_time == pair.stored.modified_time
					{
						if pair.stored.hash.is_known() {
							classes.verified.push(pair);
						} else {
							classes.hashless.push(pair);
						}
					} else {
						classes.conflicts.push(pair);
					}
				}
			}
		}
	}
	classes
}


// vim: ts=4
