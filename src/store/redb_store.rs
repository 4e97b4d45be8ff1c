//! Durable catalog store on redb
//!
//! Rows are serde_json payloads keyed by id (directories, files) or tag
//! (bindings); a meta table carries the id counters. One open write
//! transaction at a time backs the engine's begin/commit/rollback
//! protocol; while it is open, reads go through it so a mutating group
//! sees its own uncommitted writes.

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::record::{ContentHash, FileRecord, LocationBinding, ManagedDirectory};
use crate::store::{PathField, Store};

/// Key: directory id. Value: serialized DirectoryRow
const DIRECTORIES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("directories");

/// Key: binding tag. Value: serialized BindingRow
const BINDINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("bindings");

/// Key: file record id. Value: serialized FileRow
const FILES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("files");

/// Id counters ("next_directory_id", "next_file_id")
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

#[derive(Debug, Serialize, Deserialize)]
struct DirectoryRow {
	#[serde(rename = "n")]
	name: String,
	#[serde(rename = "d")]
	description: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct BindingRow {
	#[serde(rename = "dir")]
	directory_id: u64,
	#[serde(rename = "p")]
	path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileRow {
	#[serde(rename = "dir")]
	directory_id: u64,
	#[serde(rename = "pp")]
	parent_path: String,
	#[serde(rename = "n")]
	name: String,
	#[serde(rename = "sx")]
	suffix: String,
	#[serde(rename = "sz")]
	size: u64,
	#[serde(rename = "mt")]
	modified_time: i64,
	#[serde(rename = "h")]
	hash: Option<String>,
}

impl FileRow {
	fn from_record(record: &FileRecord, directory_id: u64) -> Self {
		FileRow {
			directory_id,
			parent_path: record.parent_path.clone(),
			name: record.name.clone(),
			suffix: record.suffix.clone(),
			size: record.size,
			modified_time: record.modified_time,
			hash: record.hash.digest().map(str::to_string),
		}
	}

	fn into_record(self, id: u64) -> FileRecord {
		FileRecord {
			id: Some(id),
			directory_id: Some(self.directory_id),
			parent_path: self.parent_path,
			name: self.name,
			suffix: self.suffix,
			size: self.size,
			modified_time: self.modified_time,
			hash: match self.hash {
				Some(digest) => ContentHash::Known(digest),
				None => ContentHash::Unknown,
			},
		}
	}
}

fn to_bytes<T: Serialize>(row: &T) -> Result<Vec<u8>, StoreError> {
	serde_json::to_vec(row).map_err(StoreError::backend)
}

fn from_bytes<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
	serde_json::from_slice(bytes).map_err(StoreError::backend)
}

fn collect_u64_rows<T, R>(table: &T) -> Result<Vec<(u64, R)>, StoreError>
where
	T: ReadableTable<u64, &'static [u8]>,
	R: for<'de> Deserialize<'de>,
{
	let mut rows = Vec::new();
	for item in table.iter().map_err(StoreError::backend)? {
		let (key, value) = item.map_err(StoreError::backend)?;
		rows.push((key.value(), from_bytes(value.value())?));
	}
	Ok(rows)
}

fn collect_str_rows<T, R>(table: &T) -> Result<Vec<(String, R)>, StoreError>
where
	T: ReadableTable<&'static str, &'static [u8]>,
	R: for<'de> Deserialize<'de>,
{
	let mut rows = Vec::new();
	for item in table.iter().map_err(StoreError::backend)? {
		let (key, value) = item.map_err(StoreError::backend)?;
		rows.push((key.value().to_string(), from_bytes(value.value())?));
	}
	Ok(rows)
}

/// Catalog store backed by a redb database file
pub struct RedbStore {
	db: redb::Database,
	txn: Option<redb::WriteTransaction>,
}

impl RedbStore {
	/// Open or create the catalog database, ensuring all tables exist
	pub fn open(path: &Path) -> Result<Self, StoreError> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
			}
		}
		let db = redb::Database::create(path).map_err(StoreError::backend)?;
		{
			let txn = db.begin_write().map_err(StoreError::backend)?;
			txn.open_table(DIRECTORIES_TABLE).map_err(StoreError::backend)?;
			txn.open_table(BINDINGS_TABLE).map_err(StoreError::backend)?;
			txn.open_table(FILES_TABLE).map_err(StoreError::backend)?;
			txn.open_table(META_TABLE).map_err(StoreError::backend)?;
			txn.commit().map_err(StoreError::backend)?;
		}
		Ok(RedbStore { db, txn: None })
	}

	fn write_txn(&self) -> Result<&redb::WriteTransaction, StoreError> {
		self.txn.as_ref().ok_or(StoreError::NoTransaction)
	}

	fn load_directories(&self) -> Result<Vec<(u64, DirectoryRow)>, StoreError> {
		match &self.txn {
			Some(txn) => {
				let table = txn.open_table(DIRECTORIES_TABLE).map_err(StoreError::backend)?;
				collect_u64_rows(&table)
			}
			None => {
				let read = self.db.begin_read().map_err(StoreError::backend)?;
				let table = read.open_table(DIRECTORIES_TABLE).map_err(StoreError::backend)?;
				collect_u64_rows(&table)
			}
		}
	}

	fn load_bindings(&self) -> Result<Vec<(String, BindingRow)>, StoreError> {
		match &self.txn {
			Some(txn) => {
				let table = txn.open_table(BINDINGS_TABLE).map_err(StoreError::backend)?;
				collect_str_rows(&table)
			}
			None => {
				let read = self.db.begin_read().map_err(StoreError::backend)?;
				let table = read.open_table(BINDINGS_TABLE).map_err(StoreError::backend)?;
				collect_str_rows(&table)
			}
		}
	}

	fn load_files(&self) -> Result<Vec<(u64, FileRow)>, StoreError> {
		match &self.txn {
			Some(txn) => {
				let table = txn.open_table(FILES_TABLE).map_err(StoreError::backend)?;
				collect_u64_rows(&table)
			}
			None => {
				let read = self.db.begin_read().map_err(StoreError::backend)?;
				let table = read.open_table(FILES_TABLE).map_err(StoreError::backend)?;
				collect_u64_rows(&table)
			}
		}
	}

	fn next_id(&mut self, key: &str) -> Result<u64, StoreError> {
		let txn = self.write_txn()?;
		let mut table = txn.open_table(META_TABLE).map_err(StoreError::backend)?;
		let next = table.get(key).map_err(StoreError::backend)?.map(|v| v.value()).unwrap_or(1);
		table.insert(key, next + 1).map_err(StoreError::backend)?;
		Ok(next)
	}

	fn bump_id_floor(&mut self, key: &str, floor: u64) -> Result<(), StoreError> {
		let txn = self.write_txn()?;
		let mut table = txn.open_table(META_TABLE).map_err(StoreError::backend)?;
		let next = table.get(key).map_err(StoreError::backend)?.map(|v| v.value()).unwrap_or(1);
		if floor > next {
			table.insert(key, floor).map_err(StoreError::backend)?;
		}
		Ok(())
	}

	fn binding_from_row(tag: String, row: BindingRow) -> LocationBinding {
		LocationBinding {
			tag,
			directory_id: row.directory_id,
			physical_path: row.path.map(PathBuf::from),
		}
	}
}

impl Store for RedbStore {
	fn directory_by_name(&self, name: &str) -> Result<Option<ManagedDirectory>, StoreError> {
		Ok(self.load_directories()?.into_iter().find(|(_, row)| row.name == name).map(
			|(id, row)| ManagedDirectory {
				id: Some(id),
				name: row.name,
				description: row.description,
			},
		))
	}

	fn directories(&self) -> Result<Vec<ManagedDirectory>, StoreError> {
		Ok(self
			.load_directories()?
			.into_iter()
			.map(|(id, row)| ManagedDirectory {
				id: Some(id),
				name: row.name,
				description: row.description,
			})
			.collect())
	}

	fn directories_by_id(&self, ids: &[u64]) -> Result<Vec<ManagedDirectory>, StoreError> {
		Ok(self
			.load_directories()?
			.into_iter()
			.filter(|(id, _)| ids.contains(id))
			.map(|(id, row)| ManagedDirectory {
				id: Some(id),
				name: row.name,
				description: row.description,
			})
			.collect())
	}

	fn create_directory(&mut self, name: &str, description: &str) -> Result<u64, StoreError> {
		crate::store::check_name(name)?;
		if self.directory_by_name(name)?.is_some() {
			return Err(StoreError::DuplicateDirectory { name: name.to_string() });
		}
		let id = self.next_id("next_directory_id")?;
		let bytes = to_bytes(&DirectoryRow {
			name: name.to_string(),
			description: description.to_string(),
		})?;
		let txn = self.write_txn()?;
		let mut table = txn.open_table(DIRECTORIES_TABLE).map_err(StoreError::backend)?;
		table.insert(id, bytes.as_slice()).map_err(StoreError::backend)?;
		Ok(id)
	}

	fn remove_directory(&mut self, name: &str) -> Result<usize, StoreError> {
		let id = match self.directory_by_name(name)?.and_then(|d| d.id) {
			Some(id) => id,
			None => return Ok(0),
		};
		let has_bindings = self.load_bindings()?.iter().any(|(_, b)| b.directory_id == id);
		let has_files = self.load_files()?.iter().any(|(_, f)| f.directory_id == id);
		if has_bindings || has_files {
			return Err(StoreError::DirectoryNotEmpty { name: name.to_string() });
		}
		let txn = self.write_txn()?;
		let mut table = txn.open_table(DIRECTORIES_TABLE).map_err(StoreError::backend)?;
		let removed = table.remove(id).map_err(StoreError::backend)?.is_some();
		Ok(removed as usize)
	}

	fn binding_by_tag(&self, tag: &str) -> Result<Option<LocationBinding>, StoreError> {
		Ok(self
			.load_bindings()?
			.into_iter()
			.find(|(t, _)| t == tag)
			.map(|(t, row)| Self::binding_from_row(t, row)))
	}

	fn bindings_for_directory(
		&self,
		directory_id: u64,
	) -> Result<Vec<LocationBinding>, StoreError> {
		Ok(self
			.load_bindings()?
			.into_iter()
			.filter(|(_, row)| row.directory_id == directory_id)
			.map(|(tag, row)| Self::binding_from_row(tag, row))
			.collect())
	}

	fn all_bindings(&self) -> Result<Vec<LocationBinding>, StoreError> {
		Ok(self
			.load_bindings()?
			.into_iter()
			.map(|(tag, row)| Self::binding_from_row(tag, row))
			.collect())
	}

	fn create_binding(&mut self, binding: &LocationBinding) -> Result<usize, StoreError> {
		crate::store::check_name(&binding.tag)?;
		if self.binding_by_tag(&binding.tag)?.is_some() {
			return Err(StoreError::DuplicateTag { tag: binding.tag.clone() });
		}
		let bytes = to_bytes(&BindingRow {
			directory_id: binding.directory_id,
			path: binding.physical_path.as_ref().map(|p| p.display().to_string()),
		})?;
		let txn = self.write_txn()?;
		let mut table = txn.open_table(BINDINGS_TABLE).map_err(StoreError::backend)?;
		table.insert(binding.tag.as_str(), bytes.as_slice()).map_err(StoreError::backend)?;
		Ok(1)
	}

	fn update_binding_path(
		&mut self,
		tag: &str,
		path: Option<&Path>,
	) -> Result<usize, StoreError> {
		let row = match self.binding_by_tag(tag)? {
			Some(binding) => BindingRow {
				directory_id: binding.directory_id,
				path: path.map(|p| p.display().to_string()),
			},
			None => return Ok(0),
		};
		let bytes = to_bytes(&row)?;
		let txn = self.write_txn()?;
		let mut table = txn.open_table(BINDINGS_TABLE).map_err(StoreError::backend)?;
		table.insert(tag, bytes.as_slice()).map_err(StoreError::backend)?;
		Ok(1)
	}

	fn reset_binding_paths(&mut self, tags: &[String]) -> Result<usize, StoreError> {
		let mut count = 0;
		for tag in tags {
			count += self.update_binding_path(tag, None)?;
		}
		Ok(count)
	}

	fn remove_binding(&mut self, tag: &str) -> Result<usize, StoreError> {
		let txn = self.write_txn()?;
		let mut table = txn.open_table(BINDINGS_TABLE).map_err(StoreError::backend)?;
		let removed = table.remove(tag).map_err(StoreError::backend)?.is_some();
		Ok(removed as usize)
	}

	fn file_records(&self, directory_id: u64) -> Result<Vec<FileRecord>, StoreError> {
		Ok(self
			.load_files()?
			.into_iter()
			.filter(|(_, row)| row.directory_id == directory_id)
			.map(|(id, row)| row.into_record(id))
			.collect())
	}

	fn file_records_by_id(&self, ids: &[u64]) -> Result<Vec<FileRecord>, StoreError> {
		Ok(self
			.load_files()?
			.into_iter()
			.filter(|(id, _)| ids.contains(id))
			.map(|(id, row)| row.into_record(id))
			.collect())
	}

	fn all_file_records(&self) -> Result<Vec<FileRecord>, StoreError> {
		Ok(self.load_files()?.into_iter().map(|(id, row)| row.into_record(id)).collect())
	}

	fn insert_file_records(
		&mut self,
		directory_id: u64,
		records: &mut [FileRecord],
	) -> Result<usize, StoreError> {
		let mut existing: std::collections::HashSet<String> = self
			.file_records(directory_id)?
			.iter()
			.map(FileRecord::logical_path)
			.collect();
		for record in records.iter() {
			if !existing.insert(record.logical_path()) {
				return Err(StoreError::DuplicatePath { path: record.logical_path() });
			}
		}
		let mut count = 0;
		for record in records.iter_mut() {
			let id = self.next_id("next_file_id")?;
			record.id = Some(id);
			record.directory_id = Some(directory_id);
			let bytes = to_bytes(&FileRow::from_record(record, directory_id))?;
			let txn = self.write_txn()?;
			let mut table = txn.open_table(FILES_TABLE).map_err(StoreError::backend)?;
			table.insert(id, bytes.as_slice()).map_err(StoreError::backend)?;
			count += 1;
		}
		Ok(count)
	}

	fn update_file_records(&mut self, records: &[FileRecord]) -> Result<usize, StoreError> {
		let mut count = 0;
		for record in records {
			let (id, directory_id) = match (record.id, record.directory_id) {
				(Some(id), Some(dir)) => (id, dir),
				_ => continue,
			};
			let bytes = to_bytes(&FileRow::from_record(record, directory_id))?;
			let txn = self.write_txn()?;
			let mut table = txn.open_table(FILES_TABLE).map_err(StoreError::backend)?;
			if table.get(id).map_err(StoreError::backend)?.is_none() {
				continue;
			}
			table.insert(id, bytes.as_slice()).map_err(StoreError::backend)?;
			count += 1;
		}
		Ok(count)
	}

	fn delete_file_records(&mut self, ids: &[u64]) -> Result<usize, StoreError> {
		let txn = self.write_txn()?;
		let mut table = txn.open_table(FILES_TABLE).map_err(StoreError::backend)?;
		let mut count = 0;
		for id in ids {
			if table.remove(*id).map_err(StoreError::backend)?.is_some() {
				count += 1;
			}
		}
		Ok(count)
	}

	fn sizes_lacking_hash(&self) -> Result<Vec<(u64, Vec<u64>)>, StoreError> {
		let mut by_size: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
		for (id, row) in self.load_files()? {
			if row.hash.is_none() {
				by_size.entry(row.size).or_default().push(id);
			}
		}
		Ok(by_size.into_iter().filter(|(_, ids)| ids.len() >= 2).collect())
	}

	fn duplicate_content_groups(&self) -> Result<Vec<(u64, String, Vec<u64>)>, StoreError> {
		let mut by_content: BTreeMap<(u64, String), Vec<u64>> = BTreeMap::new();
		for (id, row) in self.load_files()? {
			if let Some(digest) = row.hash {
				by_content.entry((row.size, digest)).or_default().push(id);
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
			.load_files()?
			.into_iter()
			.filter(|(_, row)| row.size == size && row.hash.as_deref() == Some(digest))
			.map(|(id, _)| id)
			.collect())
	}

	fn search_records(
		&self,
		field: PathField,
		needle: &str,
	) -> Result<Vec<FileRecord>, StoreError> {
		Ok(self
			.load_files()?
			.into_iter()
			.filter(|(_, row)| {
				let haystack = match field {
					PathField::ParentPath => &row.parent_path,
					PathField::Name => &row.name,
					PathField::Suffix => &row.suffix,
				};
				haystack.contains(needle)
			})
			.map(|(id, row)| row.into_record(id))
			.collect())
	}

	fn directory_size(&self, directory_id: u64) -> Result<u64, StoreError> {
		Ok(self
			.load_files()?
			.iter()
			.filter(|(_, row)| row.directory_id == directory_id)
			.map(|(_, row)| row.size)
			.sum())
	}

	fn is_empty(&self) -> Result<bool, StoreError> {
		Ok(self.load_directories()?.is_empty()
			&& self.load_bindings()?.is_empty()
			&& self.load_files()?.is_empty())
	}

	fn import_directories(&mut self, dirs: &[ManagedDirectory]) -> Result<usize, StoreError> {
		let mut count = 0;
		let mut max_id = 0;
		for dir in dirs {
			let id = match dir.id {
				Some(id) => id,
				None => continue,
			};
			let bytes = to_bytes(&DirectoryRow {
				name: dir.name.clone(),
				description: dir.description.clone(),
			})?;
			let txn = self.write_txn()?;
			let mut table = txn.open_table(DIRECTORIES_TABLE).map_err(StoreError::backend)?;
			table.insert(id, bytes.as_slice()).map_err(StoreError::backend)?;
			max_id = max_id.max(id);
			count += 1;
		}
		self.bump_id_floor("next_directory_id", max_id + 1)?;
		Ok(count)
	}

	fn import_bindings(&mut self, bindings: &[LocationBinding]) -> Result<usize, StoreError> {
		let mut count = 0;
		for binding in bindings {
			let bytes = to_bytes(&BindingRow {
				directory_id: binding.directory_id,
				path: binding.physical_path.as_ref().map(|p| p.display().to_string()),
			})?;
			let txn = self.write_txn()?;
			let mut table = txn.open_table(BINDINGS_TABLE).map_err(StoreError::backend)?;
			table.insert(binding.tag.as_str(), bytes.as_slice()).map_err(StoreError::backend)?;
			count += 1;
		}
		Ok(count)
	}

	fn import_file_records(&mut self, records: &[FileRecord]) -> Result<usize, StoreError> {
		let mut count = 0;
		let mut max_id = 0;
		for record in records {
			let (id, directory_id) = match (record.id, record.directory_id) {
				(Some(id), Some(dir)) => (id, dir),
				_ => continue,
			};
			let bytes = to_bytes(&FileRow::from_record(record, directory_id))?;
			let txn = self.write_txn()?;
			let mut table = txn.open_table(FILES_TABLE).map_err(StoreError::backend)?;
			table.insert(id, bytes.as_slice()).map_err(StoreError::backend)?;
			max_id = max_id.max(id);
			count += 1;
		}
		self.bump_id_floor("next_file_id", max_id + 1)?;
		Ok(count)
	}

	fn begin_transaction(&mut self) -> Result<(), StoreError> {
		if self.txn.is_some() {
			return Err(StoreError::backend("transaction already open"));
		}
		self.txn = Some(self.db.begin_write().map_err(StoreError::backend)?);
		Ok(())
	}

	fn commit(&mut self) -> Result<(), StoreError> {
		match self.txn.take() {
			Some(txn) => txn.commit().map_err(StoreError::backend),
			None => Err(StoreError::NoTransaction),
		}
	}

	fn rollback(&mut self) -> Result<(), StoreError> {
		match self.txn.take() {
			Some(txn) => txn.abort().map_err(StoreError::backend),
			None => Err(StoreError::NoTransaction),
		}
	}
}


// vim: ts=4
