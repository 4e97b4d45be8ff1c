//! Interactive terminal decision policy
//!
//! Presents each classification group on stdout and reads single-letter
//! choices from stdin. Anything unreadable (EOF, closed pipe) resolves
//! to the non-mutating default, so a run driven by a broken terminal
//! degrades to a dry run instead of guessing.

use std::io::{self, BufRead, BufReader, Stdin, Write};

use crate::policy::{
	Confirmation, ConflictAction, DecisionPolicy, DuplicateAction, DuplicateGroup,
	HashCandidatesAction, HashlessMatchAction, LocalOnlyAction, RecordPair, SizeGroup,
	StoreOnlyAction, VerifiedMatchAction,
};
use crate::record::FileRecord;
use crate::util::human_readable_size;

/// How many paths of a group to print before eliding the rest
const PREVIEW_LINES: usize = 20;

pub struct TerminalPolicy<R: BufRead> {
	input: R,
}

impl TerminalPolicy<BufReader<Stdin>> {
	pub fn new() -> Self {
		TerminalPolicy { input: BufReader::new(io::stdin()) }
	}
}

impl Default for TerminalPolicy<BufReader<Stdin>> {
	fn default() -> Self {
		Self::new()
	}
}

impl<R: BufRead> TerminalPolicy<R> {
	pub fn from_reader(input: R) -> Self {
		TerminalPolicy { input }
	}

	/// Read one choice, repeating the menu until a listed key comes in.
	/// EOF or a read failure resolves to the first option, which is the
	/// non-mutating one by convention.
	fn choose(&mut self, options: &[(&str, &str)]) -> String {
		loop {
			for (key, text) in options {
				println!("  [{}] {}", key, text);
			}
			print!("> ");
			let _ = io::stdout().flush();
			let mut line = String::new();
			match self.input.read_line(&mut line) {
				Ok(0) | Err(_) => return options[0].0.to_string(),
				Ok(_) => {}
			}
			let answer = line.trim();
			if options.iter().any(|(key, _)| *key == answer) {
				return answer.to_string();
			}
			println!("unrecognized choice {:?}", answer);
		}
	}

	fn yes_no(&mut self, question: &str) -> bool {
		println!("{}", question);
		self.choose(&[("n", "no"), ("y", "yes")]) == "y"
	}

	fn print_pairs(&self, title: &str, pairs: &[RecordPair]) {
		println!("{} ({}):", title, pairs.len());
		for pair in pairs.iter().take(PREVIEW_LINES) {
			println!(
				"  {}  local {} @{}  stored {} @{}",
				pair.local.logical_path(),
				human_readable_size(pair.local.size),
				pair.local.modified_time,
				human_readable_size(pair.stored.size),
				pair.stored.modified_time
			);
		}
		elide(pairs.len());
	}

	fn print_records(&self, title: &str, records: &[FileRecord]) {
		println!("{} ({}):", title, records.len());
		for record in records.iter().take(PREVIEW_LINES) {
			println!("  {}  {}", record.logical_path(), human_readable_size(record.size));
		}
		elide(records.len());
	}
}

fn elide(total: usize) {
	if total > PREVIEW_LINES {
		println!("  ... and {} more", total - PREVIEW_LINES);
	}
}

impl<R: BufRead> DecisionPolicy for TerminalPolicy<R> {
	fn on_verified_match(&mut self, pairs: &[RecordPair]) -> VerifiedMatchAction {
		self.print_pairs("Matches with known hashes", pairs);
		match self.choose(&[("s", "skip"), ("r", "recompute hashes to verify content")]).as_str()
		{
			"r" => VerifiedMatchAction::Recompute,
			_ => VerifiedMatchAction::Skip,
		}
	}

	fn on_match_without_hash(&mut self, pairs: &[RecordPair]) -> HashlessMatchAction {
		self.print_pairs("Matches without stored hashes", pairs);
		match self.choose(&[("s", "skip"), ("c", "compute and store hashes")]).as_str() {
			"c" => HashlessMatchAction::ComputeAndStore,
			_ => HashlessMatchAction::Skip,
		}
	}

	fn on_conflict(&mut self, pairs: &[RecordPair]) -> ConflictAction {
		self.print_pairs("Conflicts (size or mtime differ)", pairs);
		let choice = self.choose(&[
			("s", "skip"),
			("o", "overwrite records from local files, rehash"),
			("m", "overwrite records from local files, drop hashes"),
			("r", "delete local files and restore from another location"),
		]);
		match choice.as_str() {
			"o" => ConflictAction::OverwriteAndRehash,
			"m" => ConflictAction::Overwrite,
			"r" => ConflictAction::DeleteLocalAndRestore,
			_ => ConflictAction::Skip,
		}
	}

	fn on_local_only(&mut self, records: &[FileRecord]) -> LocalOnlyAction {
		self.print_records("Local files without records", records);
		let choice = self.choose(&[
			("s", "skip"),
			("a", "add records and hash the files"),
			("n", "add records without hashing"),
			("d", "delete the local files"),
		]);
		match choice.as_str() {
			"a" => LocalOnlyAction::InsertAndHash,
			"n" => LocalOnlyAction::Insert,
			"d" => LocalOnlyAction::DeleteLocal,
			_ => LocalOnlyAction::Skip,
		}
	}

	fn on_store_only(&mut self, records: &[FileRecord]) -> StoreOnlyAction {
		self.print_records("Records without local files", records);
		let choice = self.choose(&[
			("s", "skip"),
			("d", "delete the records"),
			("r", "restore the files from another location"),
		]);
		match choice.as_str() {
			"d" => StoreOnlyAction::DeleteRecords,
			"r" => StoreOnlyAction::Restore,
			_ => StoreOnlyAction::Skip,
		}
	}

	fn on_hash_candidates(&mut self, groups: &[SizeGroup]) -> HashCandidatesAction {
		let files: usize = groups.iter().map(|g| g.records.len()).sum();
		println!("{} same-size groups ({} files) lack hashes", groups.len(), files);
		match self.choose(&[("s", "skip"), ("c", "compute the hashes")]).as_str() {
			"c" => HashCandidatesAction::ComputeHashes,
			_ => HashCandidatesAction::Skip,
		}
	}

	fn on_duplicate_group(&mut self, group: &DuplicateGroup) -> DuplicateAction {
		println!(
			"Duplicate content, {} per copy, {} copies (hash {}):",
			human_readable_size(group.size),
			group.records.len(),
			group.digest
		);
		for (i, record) in group.records.iter().enumerate() {
			println!("  [{}] {}", i, record.logical_path());
		}
		println!("indices to KEEP, comma-separated (empty line skips the group)");
		print!("> ");
		let _ = io::stdout().flush();
		let mut line = String::new();
		match self.input.read_line(&mut line) {
			Ok(0) | Err(_) => return DuplicateAction::Skip,
			Ok(_) => {}
		}
		let trimmed = line.trim();
		if trimmed.is_empty() {
			return DuplicateAction::Skip;
		}
		let mut keep = Vec::new();
		for part in trimmed.split(',') {
			match part.trim().parse::<usize>() {
				Ok(i) if i < group.records.len() => keep.push(i),
				_ => {
					println!("invalid index {:?}, skipping the group", part.trim());
					return DuplicateAction::Skip;
				}
			}
		}
		DuplicateAction::Retain(keep)
	}

	fn confirm(&mut self, what: &Confirmation) -> bool {
		match what {
			Confirmation::HashCost { files, total_bytes } => self.yes_no(&format!(
				"About to hash {} files, {} total. Continue?",
				files,
				human_readable_size(*total_bytes)
			)),
			Confirmation::DeleteRecords { count } => {
				self.yes_no(&format!("Delete {} records from the catalog?", count))
			}
			Confirmation::DeleteUnverifiedRecords { count, unknown } => self.yes_no(&format!(
				"Delete {} records, {} of which have NO hash (their content cannot \
				 be proven to exist elsewhere)?",
				count, unknown
			)),
			Confirmation::DeleteLocalFiles { count } => {
				self.yes_no(&format!("Delete {} files from disk?", count))
			}
			Confirmation::CopyFiles { count } => {
				self.yes_no(&format!("Copy {} files from other locations?", count))
			}
			Confirmation::OverwriteRecords { count } => {
				self.yes_no(&format!("Overwrite {} records from local metadata?", count))
			}
			Confirmation::UnsafeDeletion { path, reason } => {
				self.yes_no(&format!("UNSAFE: delete record {} anyway? ({})", path, reason))
			}
			Confirmation::RemoveEmptyDirectories { root } => self.yes_no(&format!(
				"Remove empty subdirectories under {}?",
				root.display()
			)),
		}
	}
}


// vim: ts=4
