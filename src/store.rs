//! Persistent record store interface
//!
//! The engine talks to durable storage only through the [`Store`] trait:
//! directory and binding lookup, file-record CRUD, the grouping queries
//! the duplicate detector needs, and explicit transaction boundaries.
//! Mutations are only legal inside an open transaction; every multi-row
//! mutation reports the number of rows affected so callers can verify it
//! against their expectation.
//!
//! Two implementations ship: [`MemoryStore`] (snapshot transactions, the
//! test vehicle) and [`RedbStore`](redb_store::RedbStore) (durable).

pub mod redb_store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, StoreError};
use crate::record::{ContentHash, FileRecord, LocationBinding, ManagedDirectory};

/// Which path component a substring search runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathField {
	ParentPath,
	Name,
	Suffix,
}

/// Catalog store contract.
///
/// Reads are allowed at any time; every method that mutates state fails
/// with [`StoreError::NoTransaction`] unless a transaction is open.
/// List-returning queries use a stable order (ids or tags ascending) so
/// repeated runs against unchanged data behave identically.
pub trait Store {
	// --- directories ---

	fn directory_by_name(&self, name: &str) -> Result<Option<ManagedDirectory>, StoreError>;
	fn directories(&self) -> Result<Vec<ManagedDirectory>, StoreError>;
	fn directories_by_id(&self, ids: &[u64]) -> Result<Vec<ManagedDirectory>, StoreError>;
	fn create_directory(&mut self, name: &str, description: &str) -> Result<u64, StoreError>;

	/// Remove a directory; fails while it still has bindings or records
	fn remove_directory(&mut self, name: &str) -> Result<usize, StoreError>;

	// --- location bindings ---

	fn binding_by_tag(&self, tag: &str) -> Result<Option<LocationBinding>, StoreError>;

	/// Bindings of one directory, tags ascending (the resolver's
	/// deterministic candidate order)
	fn bindings_for_directory(&self, directory_id: u64)
		-> Result<Vec<LocationBinding>, StoreError>;
	fn all_bindings(&self) -> Result<Vec<LocationBinding>, StoreError>;
	fn create_binding(&mut self, binding: &LocationBinding) -> Result<usize, StoreError>;
	fn update_binding_path(&mut self, tag: &str, path: Option<&Path>)
		-> Result<usize, StoreError>;

	/// Mark the locations behind these tags unreachable (path -> None)
	fn reset_binding_paths(&mut self, tags: &[String]) -> Result<usize, StoreError>;
	fn remove_binding(&mut self, tag: &str) -> Result<usize, StoreError>;

	// --- file records ---

	fn file_records(&self, directory_id: u64) -> Result<Vec<FileRecord>, StoreError>;
	fn file_records_by_id(&self, ids: &[u64]) -> Result<Vec<FileRecord>, StoreError>;
	fn all_file_records(&self) -> Result<Vec<FileRecord>, StoreError>;

	/// Insert pending records, assigning their ids in place
	fn insert_file_records(
		&mut self,
		directory_id: u64,
		records: &mut [FileRecord],
	) -> Result<usize, StoreError>;
	fn update_file_records(&mut self, records: &[FileRecord]) -> Result<usize, StoreError>;
	fn delete_file_records(&mut self, ids: &[u64]) -> Result<usize, StoreError>;

	// --- grouping queries ---

	/// Unknown-hash records grouped by size; only groups with at least
	/// two members, sizes ascending, member ids ascending
	fn sizes_lacking_hash(&self) -> Result<Vec<(u64, Vec<u64>)>, StoreError>;

	/// Known-hash records grouped by (size, digest); only groups with
	/// at least two members, ordered by size then digest, member ids
	/// ascending
	fn duplicate_content_groups(&self) -> Result<Vec<(u64, String, Vec<u64>)>, StoreError>;

	/// Ids of known-hash records with exactly this (size, digest)
	fn records_with_content(&self, size: u64, digest: &str) -> Result<Vec<u64>, StoreError>;

	/// Substring search over one path component, across all directories
	fn search_records(&self, field: PathField, needle: &str)
		-> Result<Vec<FileRecord>, StoreError>;

	/// Total byte size of one directory's records
	fn directory_size(&self, directory_id: u64) -> Result<u64, StoreError>;

	/// True when the store holds no rows at all
	fn is_empty(&self) -> Result<bool, StoreError>;

	// --- snapshot import (ids preserved, empty store only) ---

	fn import_directories(&mut self, dirs: &[ManagedDirectory]) -> Result<usize, StoreError>;
	fn import_bindings(&mut self, bindings: &[LocationBinding]) -> Result<usize, StoreError>;
	fn import_file_records(&mut self, records: &[FileRecord]) -> Result<usize, StoreError>;

	// --- transactions ---

	fn begin_transaction(&mut self) -> Result<(), StoreError>;
	fn commit(&mut self) -> Result<(), StoreError>;
	fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Directory names and binding tags are capped at 255 characters
pub(crate) fn check_name(name: &str) -> Result<(), StoreError> {
	if name.chars().count() > 255 {
		return Err(StoreError::NameTooLong { name: name.to_string() });
	}
	Ok(())
}

/// Run `f` inside one transaction: begin, then commit on success or
/// roll back on any error, including error exits
pub fn in_transaction<S, T, F>(store: &mut S, f: F) -> Result<T, CatalogError>
where
	S: Store + ?Sized,
	F: FnOnce(&mut S) -> Result<T, CatalogError>,
{
	store.begin_transaction()?;
	match f(store) {
		Ok(value) => {
			store.commit()?;
			Ok(value)
		}
		Err(e) => {
			let _ = store.rollback();
			Err(e)
		}
	}
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
	directories: BTreeMap<u64, (String, String)>,
	bindings: BTreeMap<String, (u64, Option<PathBuf>)>,
	files: BTreeMap<u64, FileRecord>,
	next_directory_id: u64,
	next_file_id: u64,
}

/// Transactional in-memory store: begin snapshots the whole state,
/// rollback restores the snapshot
#[derive(Debug, Default)]
pub struct MemoryStore {
	state: MemoryState,
	snapshot: Option<MemoryState>,
}

impl MemoryStore {
	pub fn new() -> Self {
		MemoryStore {
			state: MemoryState { next_directory_id: 1, next_file_id: 1, ..Default::default() },
			snapshot: None,
		}
	}

	fn writable(&mut self) -> Result<&mut MemoryState, StoreError> {
		if self.snapshot.is_none() {
			return Err(StoreError::NoTransaction);
		}
		Ok(&mut self.state)
	}

	fn directory_record(&self, id: u64, name: &str, description: &str) -> ManagedDirectory {
		ManagedDirectory {
			id: Some(id),
			name: name.to_string(),
			description: description.to_string(),
		}
	}
}

impl Store for MemoryStore {
	fn directory_by_name(&self, name: &str) -> Result<Option<ManagedDirectory>, StoreError> {
		Ok(self
			.state
			.directories
			.iter()
			.find(|(_, (n, _))| n == name)
			.map(|(id, (n, d))| self.directory_record(*id, n, d)))
	}

	fn directories(&self) -> Result<Vec<ManagedDirectory>, StoreError> {
		Ok(self
			.state
			.directories
			.iter()
			.map(|(id, (n, d))| self.directory_record(*id, n, d))
			.collect())
	}

	fn directories_by_id(&self, ids: &[u64]) -> Result<Vec<ManagedDirectory>, StoreError> {
		Ok(ids
			.iter()
			.filter_map(|id| {
				self.state.directories.get(id).map(|(n, d)| self.directory_record(*id, n, d))
			})
			.collect())
	}

	fn create_directory(&mut self, name: &str, description: &str) -> Result<u64, StoreError> {
		check_name(name)?;
		if self.state.directories.values().any(|(n, _)| n == name) {
			return Err(StoreError::DuplicateDirectory { name: name.to_string() });
		}
		let state = self.writable()?;
		let id = state.next_directory_id;
		state.next_directory_id += 1;
		state.directories.insert(id, (name.to_string(), description.to_string()));
		Ok(id)
	}

	fn remove_directory(&mut self, name: &str) -> Result<usize, StoreError> {
		let id = match self.directory_by_name(name)?.and_then(|d| d.id) {
			Some(id) => id,
			None => return Ok(0),
		};
		let has_bindings = self.state.bindings.values().any(|(dir, _)| *dir == id);
		let has_files = self.state.files.values().any(|r| r.directory_id == Some(id));
		if has_bindings || has_files {
			return Err(StoreError::DirectoryNotEmpty { name: name.to_string() });
		}
		let state = self.writable()?;
		state.directories.remove(&id);
		Ok(1)
	}

	fn binding_by_tag(&self, tag: &str) -> Result<Option<LocationBinding>, StoreError> {
		Ok(self.state.bindings.get(tag).map(|(dir, path)| LocationBinding {
			tag: tag.to_string(),
			directory_id: *dir,
			physical_path: path.clone(),
		}))
	}

	fn bindings_for_directory(
		&self,
		directory_id: u64,
	) -> Result<Vec<LocationBinding>, StoreError> {
		Ok(self
			.state
			.bindings
			.iter()
			.filter(|(_, (dir, _))| *dir == directory_id)
			.map(|(tag, (dir, path))| LocationBinding {
				tag: tag.clone(),
				directory_id: *dir,
				physical_path: path.clone(),
			})
			.collect())
	}

	fn all_bindings(&self) -> Result<Vec<LocationBinding>, StoreError> {
		Ok(self
			.state
			.bindings
			.iter()
			.map(|(tag, (dir, path))| LocationBinding {
				tag: tag.clone(),
				directory_id: *dir,
				physical_path: path.clone(),
			})
			.collect())
	}

	fn create_binding(&mut self, binding: &LocationBinding) -> Result<usize, StoreError> {
		check_name(&binding.tag)?;
		if self.state.bindings.contains_key(&binding.tag) {
			return Err(StoreError::DuplicateTag { tag: binding.tag.clone() });
		}
		let state = self.writable()?;
		state
			.bindings
			.insert(binding.tag.clone(), (binding.directory_id, binding.physical_path.clone()));
		Ok(1)
	}

	fn update_binding_path(
		&mut self,
		tag: &str,
		path: Option<&Path>,
	) -> Result<usize, StoreError> {
		let state = self.writable()?;
		match state.bindings.get_mut(tag) {
			Some((_, p)) => {
				*p = path.map(Path::to_path_buf);
				Ok(1)
			}
			None => Ok(0),
		}
	}

	fn reset_binding_paths(&mut self, tags: &[String]) -> Result<usize, StoreError> {
		let state = self.writable()?;
		let mut count = 0;
		for tag in tags {
			if let Some((_, p)) = state.bindings.get_mut(tag) {
				*p = None;
				count += 1;
			}
		}
		Ok(count)
	}

	fn remove_binding(&mut self, tag: &str) -> Result<usize, StoreError> {
		let state = self.writable()?;
		Ok(state.bindings.remove(tag).map(|_| 1).unwrap_or(0))
	}

	fn file_records(&self, directory_id: u64) -> Result<Vec<FileRecord>, StoreError> {
		Ok(self
			.state
			.files
			.values()
			.filter(|r| r.directory_id == Some(directory_id))
			.cloned()
			.collect())
	}

	fn file_records_by_id(&self, ids: &[u64]) -> Result<Vec<FileRecord>, StoreError> {
		Ok(ids.iter().filter_map(|id| self.state.files.get(id).cloned()).collect())
	}

	fn all_file_records(&self) -> Result<Vec<FileRecord>, StoreError> {
		Ok(self.state.files.values().cloned().collect())
	}

	fn insert_file_records(
		&mut self,
		directory_id: u64,
		records: &mut [FileRecord],
	) -> Result<usize, StoreError> {
		// Per-directory logical path uniqueness
		let mut existing: std::collections::HashSet<String> = self
			.state
			.files
			.values()
			.filter(|r| r.directory_id == Some(directory_id))
			.map(|r| r.logical_path())
			.collect();
		for record in records.iter() {
			if !existing.insert(record.logical_path()) {
				return Err(StoreError::DuplicatePath { path: record.logical_path() });
			}
		}
		let state = self.writable()?;
		let mut count = 0;
		for record in records.iter_mut() {
			let id = state.next_file_id;
			state.next_file_id += 1;
			record.id = Some(id);
			record.directory_id = Some(directory_id);
			state.files.insert(id, record.clone());
			count += 1;
		}
		Ok(count)
	}

	fn update_file_records(&mut self, records: &[FileRecord]) -> Result<usize, StoreError> {
		let state = self.writable()?;
		let mut count = 0;
		for record in records {
			if let Some(id) = record.id {
				if let Some(slot) = state.files.get_mut(&id) {
					*slot = record.clone();
					count += 1;
				}
			}
		}
		Ok(count)
	}

	fn delete_file_records(&mut self, ids: &[u64]) -> Result<usize, StoreError> {
		let state = self.writable()?;
		let mut count = 0;
		for id in ids {
			if state.files.remove(id).is_some() {
				count += 1;
			}
		}
		Ok(count)
	}

	fn sizes_lacking_hash(&self) -> Result<Vec<(u64, Vec<u64>)>, StoreError> {
		let mut by_size: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
		for (id, record) in &self.state.files {
			if record.hash == ContentHash::Unknown {
				by_size.entry(record.size).or_default().push(*id);
			}
		}
		Ok(by_size.into_iter().filter(|(_, ids)| ids.len() >= 2).collect())
	}

	fn duplicate_content_groups(&self) -> Result<Vec<(u64, String, Vec<u64>)>, StoreError> {
		let mut by_content: BTreeMap<(u64, String), Vec<u64>> = BTreeMap::new();
		for (id, record) in &self.state.files {
			if let ContentHash::Known(digest) = &record.hash {
				by_content.entry((record.size, digest.clone())).or_default().push(*id);
			}
		}
		Ok(by_content
			.into_iter()
			.filter(|(_, ids)| ids.len() >= 2)
			.map(|((size, digest), ids)| (size, digest, ids))
			.collect())
	}

	fn records_with_content(&self, size: u64, digest: &str) -> Result<Vec<u64>, StoreError> {
		Ok(self
			.state
			.files
			.iter()
			.filter(|(_, r)| r.size == size && r.hash.digest() == Some(digest))
			.map(|(id, _)| *id)
			.collect())
	}

	fn search_records(
		&self,
		field: PathField,
		needle: &str,
	) -> Result<Vec<FileRecord>, StoreError> {
		Ok(self
			.state
			.files
			.values()
			.filter(|r| {
				let haystack = match field {
					PathField::ParentPath => &r.parent_path,
					PathField::Name => &r.name,
					PathField::Suffix => &r.suffix,
				};
				haystack.contains(needle)
			})
			.cloned()
			.collect())
	}

	fn directory_size(&self, directory_id: u64) -> Result<u64, StoreError> {
		Ok(self
			.state
			.files
			.values()
			.filter(|r| r.directory_id == Some(directory_id))
			.map(|r| r.size)
			.sum())
	}

	fn is_empty(&self) -> Result<bool, StoreError> {
		Ok(self.state.directories.is_empty()
			&& self.state.bindings.is_empty()
			&& self.state.files.is_empty())
	}

	fn import_directories(&mut self, dirs: &[ManagedDirectory]) -> Result<usize, StoreError> {
		let state = self.writable()?;
		let mut count = 0;
		for dir in dirs {
			if let Some(id) = dir.id {
				state.directories.insert(id, (dir.name.clone(), dir.description.clone()));
				state.next_directory_id = state.next_directory_id.max(id + 1);
				count += 1;
			}
		}
		Ok(count)
	}

	fn import_bindings(&mut self, bindings: &[LocationBinding]) -> Result<usize, StoreError> {
		let state = self.writable()?;
		let mut count = 0;
		for binding in bindings {
			state
				.bindings
				.insert(binding.tag.clone(), (binding.directory_id, binding.physical_path.clone()));
			count += 1;
		}
		Ok(count)
	}

	fn import_file_records(&mut self, records: &[FileRecord]) -> Result<usize, StoreError> {
		let state = self.writable()?;
		let mut count = 0;
		for record in records {
			if let Some(id) = record.id {
				state.files.insert(id, record.clone());
				state.next_file_id = state.next_file_id.max(id + 1);
				count += 1;
			}
		}
		Ok(count)
	}

	fn begin_transaction(&mut self) -> Result<(), StoreError> {
		if self.snapshot.is_some() {
			return Err(StoreError::backend("transaction already open"));
		}
		self.snapshot = Some(self.state.clone());
		Ok(())
	}

	fn commit(&mut self) -> Result<(), StoreError> {
		if self.snapshot.take().is_none() {
			return Err(StoreError::NoTransaction);
		}
		Ok(())
	}

	fn rollback(&mut self) -> Result<(), StoreError> {
		match self.snapshot.take() {
			Some(snapshot) => {
				self.state = snapshot;
				Ok(())
			}
			None => Err(StoreError::NoTransaction),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(path: &str, size: u64, mtime: i64) -> FileRecord {
		FileRecord::from_logical_path(path, size, mtime).unwrap()
	}

	fn seeded() -> (MemoryStore, u64) {
		let mut store = MemoryStore::new();
		let id = in_transaction(&mut store, |s| {
			Ok(s.create_directory("photos", "family photos")?)
		})
		.unwrap();
		(store, id)
	}

	#[test]
	fn test_mutation_requires_transaction() {
		let mut store = MemoryStore::new();
		assert!(matches!(
			store.create_directory("x", "y"),
			Err(StoreError::NoTransaction)
		));
	}

	#[test]
	fn test_directory_name_unique() {
		let (mut store, _) = seeded();
		let result = in_transaction(&mut store, |s| {
			s.create_directory("photos", "again")?;
			Ok(())
		});
		assert!(result.is_err());
	}

	#[test]
	fn test_overlong_names_rejected() {
		let mut store = MemoryStore::new();
		let long = "x".repeat(256);
		let result = in_transaction(&mut store, |s| {
			s.create_directory(&long, "")?;
			Ok(())
		});
		assert!(matches!(result, Err(CatalogError::Store(StoreError::NameTooLong { .. }))));
	}

	#[test]
	fn test_rollback_restores_state() {
		let (mut store, dir_id) = seeded();
		store.begin_transaction().unwrap();
		let mut records = vec![record("/a.txt", 1, 1)];
		store.insert_file_records(dir_id, &mut records).unwrap();
		store.rollback().unwrap();
		assert!(store.file_records(dir_id).unwrap().is_empty());
	}

	#[test]
	fn test_insert_assigns_ids_and_round_trips() {
		let (mut store, dir_id) = seeded();
		let mut records = vec![record("/sub/a.txt", 10, 100), record("/b.bin", 5, 200)];
		let count = in_transaction(&mut store, |s| {
			Ok(s.insert_file_records(dir_id, &mut records)?)
		})
		.unwrap();
		assert_eq!(count, 2);
		assert!(records.iter().all(|r| r.id.is_some()));

		let read = store.file_records_by_id(&[records[0].id.unwrap()]).unwrap();
		assert_eq!(read[0].logical_path(), "/sub/a.txt");
		assert_eq!(read[0].size, 10);
		assert_eq!(read[0].modified_time, 100);
		assert_eq!(read[0].hash, ContentHash::Unknown);
	}

	#[test]
	fn test_insert_rejects_duplicate_logical_path() {
		let (mut store, dir_id) = seeded();
		in_transaction(&mut store, |s| {
			Ok(s.insert_file_records(dir_id, &mut [record("/a.txt", 1, 1)])?)
		})
		.unwrap();
		let result = in_transaction(&mut store, |s| {
			Ok(s.insert_file_records(dir_id, &mut [record("/a.txt", 2, 2)])?)
		});
		assert!(result.is_err());
	}

	#[test]
	fn test_remove_directory_refuses_non_empty() {
		let (mut store, dir_id) = seeded();
		in_transaction(&mut store, |s| {
			Ok(s.insert_file_records(dir_id, &mut [record("/a.txt", 1, 1)])?)
		})
		.unwrap();
		let result = in_transaction(&mut store, |s| Ok(s.remove_directory("photos")?));
		assert!(result.is_err());
	}

	#[test]
	fn test_grouping_queries() {
		let (mut store, dir_id) = seeded();
		let mut records = vec![
			record("/a.bin", 10, 1),
			record("/b.bin", 10, 2),
			record("/c.bin", 20, 3),
			record("/d.bin", 30, 4),
			record("/e.bin", 30, 5),
		];
		records[3].hash = ContentHash::Known("h1".to_string());
		records[4].hash = ContentHash::Known("h1".to_string());
		in_transaction(&mut store, |s| Ok(s.insert_file_records(dir_id, &mut records)?))
			.unwrap();

		let sizes = store.sizes_lacking_hash().unwrap();
		assert_eq!(sizes.len(), 1);
		assert_eq!(sizes[0].0, 10);
		assert_eq!(sizes[0].1.len(), 2);

		let groups = store.duplicate_content_groups().unwrap();
		assert_eq!(groups.len(), 1);
		assert_eq!(groups[0].0, 30);
		assert_eq!(groups[0].1, "h1");
		assert_eq!(groups[0].2.len(), 2);

		assert_eq!(store.records_with_content(30, "h1").unwrap().len(), 2);
		assert_eq!(store.directory_size(dir_id).unwrap(), 100);
	}

	#[test]
	fn test_search_records() {
		let (mut store, dir_id) = seeded();
		in_transaction(&mut store, |s| {
			Ok(s.insert_file_records(
				dir_id,
				&mut [record("/docs/report.txt", 1, 1), record("/music/song.mp3", 1, 1)],
			)?)
		})
		.unwrap();

		let hits = store.search_records(PathField::Suffix, "txt").unwrap();
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].logical_path(), "/docs/report.txt");

		let hits = store.search_records(PathField::ParentPath, "mus").unwrap();
		assert_eq!(hits.len(), 1);
	}

	#[test]
	fn test_bindings() {
		let (mut store, dir_id) = seeded();
		in_transaction(&mut store, |s| {
			s.create_binding(&LocationBinding {
				tag: "laptop-ssd".to_string(),
				directory_id: dir_id,
				physical_path: Some(PathBuf::from("/mnt/a")),
			})?;
			s.create_binding(&LocationBinding {
				tag: "nas".to_string(),
				directory_id: dir_id,
				physical_path: Some(PathBuf::from("/mnt/b")),
			})?;
			Ok(())
		})
		.unwrap();

		let bindings = store.bindings_for_directory(dir_id).unwrap();
		assert_eq!(bindings.len(), 2);
		// Tags ascending
		assert_eq!(bindings[0].tag, "laptop-ssd");

		in_transaction(&mut store, |s| {
			Ok(s.reset_binding_paths(&["nas".to_string()])?)
		})
		.unwrap();
		let nas = store.binding_by_tag("nas").unwrap().unwrap();
		assert_eq!(nas.physical_path, None);
	}
}

// vim: ts=4
