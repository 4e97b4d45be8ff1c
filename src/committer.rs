//! Time-boxed batched hashing
//!
//! Hashing a large record set can run for hours. The committer flushes
//! the hashes computed so far to the store whenever a flush interval
//! elapses, so an interrupted run wastes at most one interval's worth
//! of work. Each flush is one transaction owned by the commit function;
//! a failed flush aborts the run, previously committed flushes stay.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::DEFAULT_FLUSH_INTERVAL_SECS;
use crate::error::CatalogError;
use crate::hasher;
use crate::logging::debug;
use crate::record::FileRecord;

pub struct BatchedHashCommitter {
	flush_interval: Duration,
}

impl BatchedHashCommitter {
	pub fn new(flush_interval: Duration) -> Self {
		BatchedHashCommitter { flush_interval }
	}

	/// Hash `records` in order, assigning each hash in place, and flush
	/// accumulated records through `commit` whenever the flush interval
	/// has elapsed, plus once at the end.
	///
	/// `path_of` maps a record to the physical file holding its
	/// content and may fail, which aborts the run like a hashing
	/// failure would; `commit` must wrap its store mutation in a fresh
	/// transaction and report the affected-row count, which is
	/// verified against the batch size. Returns per-flush counts.
	pub fn hash_and_commit<P, F>(
		&self,
		records: &mut [FileRecord],
		mut path_of: P,
		mut commit: F,
	) -> Result<Vec<usize>, CatalogError>
	where
		P: FnMut(&FileRecord) -> Result<PathBuf, CatalogError>,
		F: FnMut(&[FileRecord]) -> Result<usize, CatalogError>,
	{
		let mut counts = Vec::new();
		let mut batch: Vec<FileRecord> = Vec::new();
		let mut last_flush = Instant::now();
		for record in records.iter_mut() {
			let path = path_of(record)?;
			record.hash = hasher::hash_file(&path)?;
			batch.push(record.clone());
			if last_flush.elapsed() > self.flush_interval {
				counts.push(Self::flush(&mut batch, &mut commit)?);
				last_flush = Instant::now();
			}
		}
		if !batch.is_empty() {
			counts.push(Self::flush(&mut batch, &mut commit)?);
		}
		debug!(flushes = counts.len(), records = records.len(), "hashing run committed");
		Ok(counts)
	}

	fn flush<F>(batch: &mut Vec<FileRecord>, commit: &mut F) -> Result<usize, CatalogError>
	where
		F: FnMut(&[FileRecord]) -> Result<usize, CatalogError>,
	{
		let expected = batch.len();
		let committed = commit(batch)?;
		if committed != expected {
			return Err(CatalogError::Inconsistency {
				expected,
				actual: committed,
				context: "hash batch flush".to_string(),
			});
		}
		batch.clear();
		Ok(committed)
	}
}

impl Default for BatchedHashCommitter {
	fn default() -> Self {
		Self::new(Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS))
	}
}


// vim: ts=4
