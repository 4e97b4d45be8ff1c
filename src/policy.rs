//! Decision policy surface
//!
//! The engine never mutates anything on its own authority: every action
//! with side effects is chosen by a [`DecisionPolicy`], and every
//! destructive or cost-estimated action additionally goes through
//! [`DecisionPolicy::confirm`]. The default answer for everything is
//! "skip"/"no", so the engine is a no-op under the [`SkipAll`] policy.
//! The interactive terminal implementation lives in `prompt.rs`.

use std::path::PathBuf;

use crate::record::FileRecord;

/// A (local, stored) record pair sharing one logical path
#[derive(Debug, Clone)]
pub struct RecordPair {
	/// Freshly scanned record, carries the persisted id
	pub local: FileRecord,

	/// Persisted record
	pub stored: FileRecord,
}

/// Size/mtime match where the stored hash is already known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedMatchAction {
	/// Recompute local hashes to detect silent divergence
	Recompute,

	/// Leave the group alone
	Skip,
}

/// Size/mtime match where the stored hash was never computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashlessMatchAction {
	/// Hash the local files and update the stored records
	ComputeAndStore,

	/// Leave the group alone
	Skip,
}

/// Size or mtime disagree between local file and stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
	/// Overwrite stored metadata from local, rehashing the files
	OverwriteAndRehash,

	/// Overwrite stored metadata from local, keeping hashes unknown
	Overwrite,

	/// Delete the local files and pull replacements from another
	/// reachable location of the same directory
	DeleteLocalAndRestore,

	/// Leave the group alone
	Skip,
}

/// File present locally with no stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOnlyAction {
	/// Hash the files, then insert new records
	InsertAndHash,

	/// Insert new records with unknown hashes
	Insert,

	/// Delete the local files
	DeleteLocal,

	/// Leave the group alone
	Skip,
}

/// Stored record with no local file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOnlyAction {
	/// Delete the stored records
	DeleteRecords,

	/// Copy the files back from another reachable location of the
	/// same directory
	Restore,

	/// Leave the group alone
	Skip,
}

/// Records sharing a size but lacking hashes (duplicate candidates)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCandidatesAction {
	/// Hash the candidates so duplication can be assessed
	ComputeHashes,

	/// Leave the groups alone
	Skip,
}

/// Confirmed duplicate-content group (same size and hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateAction {
	/// Retain the records at these indices into the group; all others
	/// become deletion candidates
	Retain(Vec<usize>),

	/// Leave the group alone
	Skip,
}

/// Records with one size and no hash, phase-1 duplicate candidates
#[derive(Debug, Clone)]
pub struct SizeGroup {
	pub size: u64,
	pub records: Vec<FileRecord>,
}

/// Records sharing size and hash, a confirmed duplicate-content set
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
	pub size: u64,
	pub digest: String,
	pub records: Vec<FileRecord>,
}

/// A yes/no question the policy must answer before the engine acts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
	/// Hashing `files` files totalling `total_bytes` is about to start
	HashCost { files: usize, total_bytes: u64 },

	/// Stored records are about to be deleted; all hashes known
	DeleteRecords { count: usize },

	/// Stored records are about to be deleted and at least `unknown`
	/// of them have no hash, so their content can never be proven
	/// unique afterwards
	DeleteUnverifiedRecords { count: usize, unknown: usize },

	/// Local files are about to be deleted from disk
	DeleteLocalFiles { count: usize },

	/// Files are about to be copied between physical locations
	CopyFiles { count: usize },

	/// Stored metadata is about to be overwritten from local records
	OverwriteRecords { count: usize },

	/// Deleting this record would destroy the last known copy of its
	/// content (or its content was never hashed); a distinct unsafe
	/// override is required
	UnsafeDeletion { path: String, reason: String },

	/// Empty subdirectories were found under the root
	RemoveEmptyDirectories { root: PathBuf },
}

/// Maps each classification case to one chosen option.
///
/// Defaults choose the non-mutating option everywhere; implement only
/// what a given surface needs.
pub trait DecisionPolicy {
	/// Size/mtime matches whose stored hash is known
	fn on_verified_match(&mut self, _pairs: &[RecordPair]) -> VerifiedMatchAction {
		VerifiedMatchAction::Skip
	}

	/// Size/mtime matches whose stored hash was never computed
	fn on_match_without_hash(&mut self, _pairs: &[RecordPair]) -> HashlessMatchAction {
		HashlessMatchAction::Skip
	}

	/// Local file and stored record disagree on size or mtime
	fn on_conflict(&mut self, _pairs: &[RecordPair]) -> ConflictAction {
		ConflictAction::Skip
	}

	/// Files present locally with no stored record
	fn on_local_only(&mut self, _records: &[FileRecord]) -> LocalOnlyAction {
		LocalOnlyAction::Skip
	}

	/// Stored records with no local file
	fn on_store_only(&mut self, _records: &[FileRecord]) -> StoreOnlyAction {
		StoreOnlyAction::Skip
	}

	/// Same-size groups lacking hashes (duplicate candidates)
	fn on_hash_candidates(&mut self, _groups: &[SizeGroup]) -> HashCandidatesAction {
		HashCandidatesAction::Skip
	}

	/// One confirmed duplicate-content group
	fn on_duplicate_group(&mut self, _group: &DuplicateGroup) -> DuplicateAction {
		DuplicateAction::Skip
	}

	/// Yes/no gate before destructive or cost-estimated actions.
	/// Nothing destructive may ever be inferred from silence.
	fn confirm(&mut self, _what: &Confirmation) -> bool {
		false
	}
}

/// Policy that skips every case and denies every confirmation
pub struct SkipAll;

impl DecisionPolicy for SkipAll {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::FileRecord;

	#[test]
	fn test_skip_all_defaults() {
		let mut policy = SkipAll;
		let record = FileRecord::from_logical_path("/a.txt", 1, 1).unwrap();
		assert_eq!(policy.on_local_only(&[record.clone()]), LocalOnlyAction::Skip);
		assert_eq!(policy.on_store_only(&[record]), StoreOnlyAction::Skip);
		assert_eq!(policy.on_conflict(&[]), ConflictAction::Skip);
		assert!(!policy.confirm(&Confirmation::DeleteRecords { count: 1 }));
	}
}

// vim: ts=4
