//! Two-phase duplicate detection across the whole catalog
//!
//! Phase 1 finds records that share a size but have no hash yet, locates
//! their content at any reachable location and hashes it in batches.
//! Phase 2 walks the confirmed duplicate-content groups (same size, same
//! digest) and lets the policy pick which records to retain; everything
//! else becomes a deletion candidate, subject to the safe-deletion
//! guard. Only records are deleted, never files on disk.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::committer::BatchedHashCommitter;
use crate::error::CatalogError;
use crate::guard::SafeDeletionGuard;
use crate::logging::{info, warn};
use crate::policy::{
	Confirmation, DecisionPolicy, DuplicateAction, DuplicateGroup, HashCandidatesAction,
	SizeGroup,
};
use crate::record::{physical_join, FileRecord};
use crate::store::{in_transaction, Store};

/// What a dedup run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
	/// Records hashed in phase 1
	pub hashed: usize,

	/// Phase-1 candidates whose content was reachable nowhere
	pub unreachable: usize,

	/// Duplicate-content groups presented in phase 2
	pub groups: usize,

	/// Records deleted in phase 2
	pub records_deleted: usize,
}

pub struct DuplicateDetector<'a> {
	committer: &'a BatchedHashCommitter,
}

impl<'a> DuplicateDetector<'a> {
	pub fn new(committer: &'a BatchedHashCommitter) -> Self {
		DuplicateDetector { committer }
	}

	/// Run both phases. Every destructive step goes through the policy;
	/// under a skip-everything policy the run mutates nothing.
	pub fn run(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
	) -> Result<DedupReport, CatalogError> {
		let mut report = DedupReport::default();
		self.hash_candidates(store, policy, &mut report)?;
		self.resolve_duplicates(store, policy, &mut report)?;
		Ok(report)
	}

	/// Phase 1: hash same-size records that lack a hash, so phase 2 can
	/// tell true duplicates from size coincidences
	fn hash_candidates(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
		report: &mut DedupReport,
	) -> Result<(), CatalogError> {
		let mut groups = Vec::new();
		for (size, ids) in store.sizes_lacking_hash()? {
			let records = store.file_records_by_id(&ids)?;
			if records.len() >= 2 {
				groups.push(SizeGroup { size, records });
			}
		}
		if groups.is_empty() {
			return Ok(());
		}
		if policy.on_hash_candidates(&groups) != HashCandidatesAction::ComputeHashes {
			return Ok(());
		}

		let mut paths: HashMap<u64, PathBuf> = HashMap::new();
		let mut hashable: Vec<FileRecord> = Vec::new();
		let mut roots_cache: HashMap<u64, Vec<PathBuf>> = HashMap::new();
		for group in &groups {
			for record in &group.records {
				match self.locate_content(store, record, &mut roots_cache)? {
					Some(path) => {
						// Unpersisted records never reach this point
						if let Some(id) = record.id {
							paths.insert(id, path);
							hashable.push(record.clone());
						}
					}
					None => {
						warn!(path = %record.logical_path(), "content reachable nowhere, skipping");
						report.unreachable += 1;
					}
				}
			}
		}
		if hashable.is_empty() {
			return Ok(());
		}

		let total_bytes: u64 = hashable.iter().map(|r| r.size).sum();
		let cost = Confirmation::HashCost { files: hashable.len(), total_bytes };
		if !policy.confirm(&cost) {
			return Ok(());
		}

		self.committer.hash_and_commit(
			&mut hashable,
			|record| {
				record
					.id
					.and_then(|id| paths.get(&id).cloned())
					.ok_or_else(|| CatalogError::Other {
						message: format!("no located content for {}", record.logical_path()),
					})
			},
			|batch| in_transaction(store, |s| Ok(s.update_file_records(batch)?)),
		)?;
		report.hashed = hashable.len();
		info!(hashed = report.hashed, unreachable = report.unreachable, "dedup phase 1 done");
		Ok(())
	}

	/// Find a physical file holding this record's content, probing the
	/// reachable locations of its directory in stable binding order
	fn locate_content(
		&self,
		store: &dyn Store,
		record: &FileRecord,
		roots_cache: &mut HashMap<u64, Vec<PathBuf>>,
	) -> Result<Option<PathBuf>, CatalogError> {
		let directory_id = match record.directory_id {
			Some(id) => id,
			None => return Ok(None),
		};
		if !roots_cache.contains_key(&directory_id) {
			let roots = store
				.bindings_for_directory(directory_id)?
				.into_iter()
				.filter_map(|b| b.physical_path)
				.filter(|p| p.exists())
				.collect();
			roots_cache.insert(directory_id, roots);
		}
		let logical = record.logical_path();
		Ok(roots_cache[&directory_id]
			.iter()
			.map(|root| physical_join(root, &logical))
			.find(|p| p.is_file()))
	}

	/// Phase 2: present each confirmed duplicate-content group, collect
	/// deletion candidates from the retain choices, then delete behind
	/// the guard and one final confirmation
	fn resolve_duplicates(
		&self,
		store: &mut dyn Store,
		policy: &mut dyn DecisionPolicy,
		report: &mut DedupReport,
	) -> Result<(), CatalogError> {
		let mut candidates: Vec<FileRecord> = Vec::new();
		for (size, digest, ids) in store.duplicate_content_groups()? {
			let records = store.file_records_by_id(&ids)?;
			if records.len() < 2 {
				continue;
			}
			report.groups += 1;
			let group = DuplicateGroup { size, digest, records };
			match policy.on_duplicate_group(&group) {
				DuplicateAction::Skip => {}
				DuplicateAction::Retain(keep) => {
					if keep.iter().any(|i| *i >= group.records.len()) {
						warn!(size = group.size, digest = %group.digest,
							"retain choice out of range, skipping group");
						continue;
					}
					for (i, record) in group.records.iter().enumerate() {
						if !keep.contains(&i) {
							candidates.push(record.clone());
						}
					}
				}
			}
		}
		if candidates.is_empty() {
			return Ok(());
		}

		let deletable = SafeDeletionGuard::filter_deletable(store, &candidates, policy)?;
		if deletable.is_empty() {
			return Ok(());
		}
		if !policy.confirm(&Confirmation::DeleteRecords { count: deletable.len() }) {
			return Ok(());
		}
		report.records_deleted = SafeDeletionGuard::execute(store, &deletable)?;
		info!(groups = report.groups, deleted = report.records_deleted, "dedup phase 2 done");
		Ok(())
	}
}


// vim: ts=4
