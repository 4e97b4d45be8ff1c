//! Safe deletion of file records
//!
//! The catalog must never silently lose the last surviving record of
//! some content. Before deletion, every candidate is checked against
//! the records sharing its (size, hash) that are not themselves slated
//! for deletion in the same batch; a record that would be the last
//! holder, or whose hash was never computed (so uniqueness can never be
//! proven), is only deleted after a distinct unsafe confirmation.

use std::collections::HashSet;

use crate::error::CatalogError;
use crate::logging::{info, warn};
use crate::policy::{Confirmation, DecisionPolicy};
use crate::record::{ContentHash, FileRecord};
use crate::store::{in_transaction, Store};

pub struct SafeDeletionGuard;

impl SafeDeletionGuard {
	/// Split candidates into the records that may be deleted. Unsafe
	/// candidates (unknown hash, or last surviving copy) are kept only
	/// when the policy grants the explicit unsafe override; otherwise
	/// they are skipped, which is a recoverable outcome, not an error.
	pub fn filter_deletable(
		store: &dyn Store,
		candidates: &[FileRecord],
		policy: &mut dyn DecisionPolicy,
	) -> Result<Vec<FileRecord>, CatalogError> {
		let batch_ids: HashSet<u64> = candidates.iter().filter_map(|r| r.id).collect();
		let mut deletable = Vec::new();
		for record in candidates {
			let reason = match &record.hash {
				ContentHash::Unknown => {
					Some("content hash never computed, uniqueness cannot be proven".to_string())
				}
				ContentHash::Known(digest) => {
					let survivors = store
						.records_with_content(record.size, digest)?
						.into_iter()
						.filter(|id| !batch_ids.contains(id))
						.count();
					if survivors == 0 {
						Some("last remaining record of this content".to_string())
					} else {
						None
					}
				}
			};
			match reason {
				None => deletable.push(record.clone()),
				Some(reason) => {
					let confirmation = Confirmation::UnsafeDeletion {
						path: record.logical_path(),
						reason: reason.clone(),
					};
					if policy.confirm(&confirmation) {
						warn!(path = %record.logical_path(), %reason, "unsafe deletion overridden");
						deletable.push(record.clone());
					} else {
						info!(path = %record.logical_path(), %reason, "unsafe deletion skipped");
					}
				}
			}
		}
		Ok(deletable)
	}

	/// Delete the records in one transaction, asserting that exactly
	/// the requested number of rows disappeared. A mismatch means the
	/// store and the engine's view have diverged: fatal, no retry.
	pub fn execute(
		store: &mut dyn Store,
		records: &[FileRecord],
	) -> Result<usize, CatalogError> {
		let ids: Vec<u64> = records.iter().filter_map(|r| r.id).collect();
		if ids.len() != records.len() {
			return Err(CatalogError::Inconsistency {
				expected: records.len(),
				actual: ids.len(),
				context: "deletion batch contains unpersisted records".to_string(),
			});
		}
		if ids.is_empty() {
			return Ok(0);
		}
		in_transaction(store, |s| {
			let deleted = s.delete_file_records(&ids)?;
			if deleted != ids.len() {
				return Err(CatalogError::Inconsistency {
					expected: ids.len(),
					actual: deleted,
					context: "record deletion".to_string(),
				});
			}
			Ok(deleted)
		})
	}
}


// vim: ts=4
