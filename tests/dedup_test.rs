//! Integration tests for catalog-wide duplicate detection
//!
//! Builds real directory trees, catalogs them through `manage`, then
//! runs the two-phase duplicate detector with scripted policies.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use replicat::committer::BatchedHashCommitter;
use replicat::dedup::DuplicateDetector;
use replicat::manage::manage;
use replicat::policy::{
	Confirmation, DecisionPolicy, DuplicateAction, DuplicateGroup, HashCandidatesAction,
	LocalOnlyAction, SizeGroup,
};
use replicat::record::FileRecord;
use replicat::store::redb_store::RedbStore;
use replicat::store::{in_transaction, MemoryStore, Store};
use replicat::SkipAll;

// ============================================================================
// Helper Functions
// ============================================================================

fn write_file(root: &Path, rel: &str, content: &[u8]) {
	let path = root.join(rel);
	fs::create_dir_all(path.parent().unwrap()).unwrap();
	let mut file = fs::File::create(&path).unwrap();
	file.write_all(content).unwrap();
}

/// Catalogs files without hashing, so phase 1 has work to do
struct InsertOnly;

impl DecisionPolicy for InsertOnly {
	fn on_local_only(&mut self, _records: &[FileRecord]) -> LocalOnlyAction {
		LocalOnlyAction::Insert
	}
}

/// Hashes every candidate group and keeps the first record of every
/// duplicate group
struct KeepFirst {
	confirmations: Vec<Confirmation>,
}

impl KeepFirst {
	fn new() -> Self {
		KeepFirst { confirmations: Vec::new() }
	}
}

impl DecisionPolicy for KeepFirst {
	fn on_hash_candidates(&mut self, _groups: &[SizeGroup]) -> HashCandidatesAction {
		HashCandidatesAction::ComputeHashes
	}
	fn on_duplicate_group(&mut self, _group: &DuplicateGroup) -> DuplicateAction {
		DuplicateAction::Retain(vec![0])
	}
	fn confirm(&mut self, what: &Confirmation) -> bool {
		self.confirmations.push(what.clone());
		!matches!(what, Confirmation::UnsafeDeletion { .. })
	}
}

// ============================================================================
// Part 1: End-to-end dedup across directories
// ============================================================================

#[test]
fn test_dedup_across_two_directories() {
	let docs = TempDir::new().unwrap();
	let media = TempDir::new().unwrap();
	// The same payload appears in both managed directories
	write_file(docs.path(), "report.pdf", b"shared twelve");
	write_file(media.path(), "copy/report.pdf", b"shared twelve");
	write_file(docs.path(), "notes.txt", b"unique one xx");
	write_file(media.path(), "song.mp3", b"unique two xx");

	let mut store = MemoryStore::new();
	in_transaction(&mut store, |s| {
		s.create_directory("docs", "")?;
		s.create_directory("media", "")?;
		Ok(())
	})
	.unwrap();
	let committer = BatchedHashCommitter::default();
	manage(&mut store, &mut InsertOnly, &committer, "docs", "d1", docs.path()).unwrap();
	manage(&mut store, &mut InsertOnly, &committer, "media", "m1", media.path()).unwrap();

	// All four files share one size, so all four are phase-1 candidates
	let detector = DuplicateDetector::new(&committer);
	let mut policy = KeepFirst::new();
	let report = detector.run(&mut store, &mut policy).unwrap();

	assert_eq!(report.hashed, 4);
	assert_eq!(report.groups, 1);
	assert_eq!(report.records_deleted, 1);

	// The surviving records: both uniques plus one copy of the shared file
	let remaining = store.all_file_records().unwrap();
	assert_eq!(remaining.len(), 3);
	let shared: Vec<&FileRecord> =
		remaining.iter().filter(|r| r.logical_path().contains("report")).collect();
	assert_eq!(shared.len(), 1);

	// No file was touched on disk, only records
	assert!(docs.path().join("report.pdf").exists());
	assert!(media.path().join("copy/report.pdf").exists());
}

#[test]
fn test_dedup_is_idempotent() {
	let docs = TempDir::new().unwrap();
	write_file(docs.path(), "a.bin", b"dup");
	write_file(docs.path(), "b.bin", b"dup");
	let mut store = MemoryStore::new();
	in_transaction(&mut store, |s| Ok(s.create_directory("docs", "")?)).unwrap();
	let committer = BatchedHashCommitter::default();
	manage(&mut store, &mut InsertOnly, &committer, "docs", "d1", docs.path()).unwrap();

	let detector = DuplicateDetector::new(&committer);
	let report = detector.run(&mut store, &mut KeepFirst::new()).unwrap();
	assert_eq!(report.records_deleted, 1);

	// A second run finds nothing left to hash or delete
	let report = detector.run(&mut store, &mut KeepFirst::new()).unwrap();
	assert_eq!(report.hashed, 0);
	assert_eq!(report.groups, 0);
	assert_eq!(report.records_deleted, 0);
}

#[test]
fn test_dedup_under_skip_policy_is_a_dry_run() {
	let docs = TempDir::new().unwrap();
	write_file(docs.path(), "a.bin", b"dup");
	write_file(docs.path(), "b.bin", b"dup");
	let mut store = MemoryStore::new();
	in_transaction(&mut store, |s| Ok(s.create_directory("docs", "")?)).unwrap();
	let committer = BatchedHashCommitter::default();
	manage(&mut store, &mut InsertOnly, &committer, "docs", "d1", docs.path()).unwrap();
	let before = store.all_file_records().unwrap();

	let detector = DuplicateDetector::new(&committer);
	detector.run(&mut store, &mut SkipAll).unwrap();
	assert_eq!(store.all_file_records().unwrap(), before);
}

// ============================================================================
// Part 2: Deletion safety inside dedup
// ============================================================================

#[test]
fn test_retaining_none_keeps_last_copy_without_override() {
	let docs = TempDir::new().unwrap();
	write_file(docs.path(), "a.bin", b"dup");
	write_file(docs.path(), "b.bin", b"dup");
	let mut store = MemoryStore::new();
	in_transaction(&mut store, |s| Ok(s.create_directory("docs", "")?)).unwrap();
	let committer = BatchedHashCommitter::default();
	manage(&mut store, &mut InsertOnly, &committer, "docs", "d1", docs.path()).unwrap();

	// Retains nothing: both records become deletion candidates, which
	// would destroy the content's last catalog entry
	struct RetainNone;
	impl DecisionPolicy for RetainNone {
		fn on_hash_candidates(&mut self, _groups: &[SizeGroup]) -> HashCandidatesAction {
			HashCandidatesAction::ComputeHashes
		}
		fn on_duplicate_group(&mut self, _group: &DuplicateGroup) -> DuplicateAction {
			DuplicateAction::Retain(Vec::new())
		}
		fn confirm(&mut self, what: &Confirmation) -> bool {
			// Grants everything except the unsafe override
			!matches!(what, Confirmation::UnsafeDeletion { .. })
		}
	}

	let detector = DuplicateDetector::new(&committer);
	let report = detector.run(&mut store, &mut RetainNone).unwrap();

	// The guard shrinks the batch: one record survives as last holder
	assert_eq!(report.records_deleted, 1);
	assert_eq!(store.all_file_records().unwrap().len(), 1);
}

#[test]
fn test_hash_cost_denied_stops_before_hashing() {
	let docs = TempDir::new().unwrap();
	write_file(docs.path(), "a.bin", b"dup");
	write_file(docs.path(), "b.bin", b"dup");
	let mut store = MemoryStore::new();
	in_transaction(&mut store, |s| Ok(s.create_directory("docs", "")?)).unwrap();
	let committer = BatchedHashCommitter::default();
	manage(&mut store, &mut InsertOnly, &committer, "docs", "d1", docs.path()).unwrap();

	struct DenyCost;
	impl DecisionPolicy for DenyCost {
		fn on_hash_candidates(&mut self, _groups: &[SizeGroup]) -> HashCandidatesAction {
			HashCandidatesAction::ComputeHashes
		}
	}

	let detector = DuplicateDetector::new(&committer);
	let report = detector.run(&mut store, &mut DenyCost).unwrap();
	assert_eq!(report.hashed, 0);
	assert!(store.all_file_records().unwrap().iter().all(|r| !r.hash.is_known()));
}

// ============================================================================
// Part 3: Durable store
// ============================================================================

#[test]
fn test_dedup_against_redb_survives_reopen() {
	let docs = TempDir::new().unwrap();
	let db_dir = TempDir::new().unwrap();
	let db_path = db_dir.path().join("catalog.redb");
	write_file(docs.path(), "a.bin", b"dup payload");
	write_file(docs.path(), "b.bin", b"dup payload");
	write_file(docs.path(), "c.bin", b"loneunique!");

	// Frequent flushing exercises the partial-commit path
	let committer = BatchedHashCommitter::new(Duration::ZERO);
	{
		let mut store = RedbStore::open(&db_path).unwrap();
		in_transaction(&mut store, |s| Ok(s.create_directory("docs", "")?)).unwrap();
		manage(&mut store, &mut InsertOnly, &committer, "docs", "d1", docs.path()).unwrap();
		let detector = DuplicateDetector::new(&committer);
		let report = detector.run(&mut store, &mut KeepFirst::new()).unwrap();
		assert_eq!(report.hashed, 3);
		assert_eq!(report.records_deleted, 1);
	}

	// Reopen: the hashes and the deletion are durable
	let store = RedbStore::open(&db_path).unwrap();
	let records = store.all_file_records().unwrap();
	assert_eq!(records.len(), 2);
	assert!(records.iter().all(|r| r.hash.is_known()));
}

// vim: ts=4
