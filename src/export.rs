//! Catalog snapshot dump and restore
//!
//! A dump is three CSV files (`directories.csv`, `bindings.csv`,
//! `files.csv`) written into one target directory, with ids preserved so
//! a restored catalog is row-identical to the dumped one. The format is
//! deliberately dumb: no quoting, so any field containing a comma or a
//! line break is rejected at export time rather than written ambiguously.
//! Import only ever runs into an empty store.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, StoreError};
use crate::logging::info;
use crate::record::{ContentHash, FileRecord, LocationBinding, ManagedDirectory};
use crate::store::{in_transaction, Store};

const DIRECTORIES_CSV: &str = "directories.csv";
const BINDINGS_CSV: &str = "bindings.csv";
const FILES_CSV: &str = "files.csv";

const DIRECTORIES_HEADER: &str = "id,name,description";
const BINDINGS_HEADER: &str = "tag,directory_id,physical_path";
const FILES_HEADER: &str = "id,directory_id,parent_path,name,suffix,size,modified_time,hash";

/// Dump the whole catalog into `target`, which is created if missing
pub fn export(store: &dyn Store, target: &Path) -> Result<(), CatalogError> {
	fs::create_dir_all(target).map_err(|e| CatalogError::io(target.display().to_string(), e))?;

	let mut out = String::from(DIRECTORIES_HEADER);
	out.push('\n');
	let directories = store.directories()?;
	for dir in &directories {
		let id = require_id(dir.id, &dir.name)?;
		let _ = writeln!(out, "{},{},{}", id, field(&dir.name)?, field(&dir.description)?);
	}
	write_csv(target, DIRECTORIES_CSV, &out)?;

	let mut out = String::from(BINDINGS_HEADER);
	out.push('\n');
	let bindings = store.all_bindings()?;
	for binding in &bindings {
		let path = match &binding.physical_path {
			Some(p) => match p.to_str() {
				Some(s) => field(s)?,
				None => {
					return Err(CatalogError::Other {
						message: format!("binding {}: path is not valid UTF-8", binding.tag),
					})
				}
			},
			None => "",
		};
		let _ = writeln!(out, "{},{},{}", field(&binding.tag)?, binding.directory_id, path);
	}
	write_csv(target, BINDINGS_CSV, &out)?;

	let mut out = String::from(FILES_HEADER);
	out.push('\n');
	let records = store.all_file_records()?;
	for record in &records {
		let id = require_id(record.id, &record.logical_path())?;
		let directory_id = require_id(record.directory_id, &record.logical_path())?;
		let _ = writeln!(
			out,
			"{},{},{},{},{},{},{},{}",
			id,
			directory_id,
			field(&record.parent_path)?,
			field(&record.name)?,
			field(&record.suffix)?,
			record.size,
			record.modified_time,
			record.hash.digest().unwrap_or("")
		);
	}
	write_csv(target, FILES_CSV, &out)?;

	info!(
		target = %target.display(),
		directories = directories.len(),
		bindings = bindings.len(),
		files = records.len(),
		"catalog exported"
	);
	Ok(())
}

/// Restore a dump into an empty store. The whole restore is one
/// transaction; each table's imported row count is verified against the
/// parsed count, so a partial restore can never be committed.
pub fn import(store: &mut dyn Store, source: &Path) -> Result<(), CatalogError> {
	if !store.is_empty()? {
		return Err(StoreError::NotEmpty.into());
	}
	let directories = parse_directories(&read_csv(source, DIRECTORIES_CSV)?)?;
	let bindings = parse_bindings(&read_csv(source, BINDINGS_CSV)?)?;
	let records = parse_files(&read_csv(source, FILES_CSV)?)?;

	in_transaction(store, |s| {
		verify(s.import_directories(&directories)?, directories.len(), "directories")?;
		verify(s.import_bindings(&bindings)?, bindings.len(), "bindings")?;
		verify(s.import_file_records(&records)?, records.len(), "files")?;
		Ok(())
	})?;
	info!(
		source = %source.display(),
		directories = directories.len(),
		bindings = bindings.len(),
		files = records.len(),
		"catalog imported"
	);
	Ok(())
}

fn verify(actual: usize, expected: usize, context: &str) -> Result<(), CatalogError> {
	if actual != expected {
		return Err(CatalogError::Inconsistency {
			expected,
			actual,
			context: format!("import of {}", context),
		});
	}
	Ok(())
}

fn field(value: &str) -> Result<&str, CatalogError> {
	if value.contains(',') || value.contains('\n') || value.contains('\r') {
		return Err(CatalogError::Other {
			message: format!("field contains a comma or line break, cannot dump: {:?}", value),
		});
	}
	Ok(value)
}

fn require_id(id: Option<u64>, what: &str) -> Result<u64, CatalogError> {
	id.ok_or_else(|| CatalogError::Other {
		message: format!("{}: row without a persisted id", what),
	})
}

fn write_csv(target: &Path, file: &str, content: &str) -> Result<(), CatalogError> {
	let path = target.join(file);
	fs::write(&path, content).map_err(|e| CatalogError::io(path.display().to_string(), e))
}

fn read_csv(source: &Path, file: &str) -> Result<String, CatalogError> {
	let path = source.join(file);
	fs::read_to_string(&path).map_err(|e| CatalogError::io(path.display().to_string(), e))
}

/// Split a dump file into rows, checking the header and column count
fn rows<'a>(
	text: &'a str,
	header: &str,
	columns: usize,
	file: &str,
) -> Result<Vec<Vec<&'a str>>, CatalogError> {
	let mut lines = text.lines();
	match lines.next() {
		Some(first) if first == header => {}
		_ => {
			return Err(CatalogError::Other {
				message: format!("{}: missing or wrong header", file),
			})
		}
	}
	let mut out = Vec::new();
	for (i, line) in lines.enumerate() {
		if line.is_empty() {
			continue;
		}
		let fields: Vec<&str> = line.split(',').collect();
		if fields.len() != columns {
			return Err(CatalogError::Other {
				message: format!(
					"{} line {}: expected {} columns, got {}",
					file,
					i + 2,
					columns,
					fields.len()
				),
			});
		}
		out.push(fields);
	}
	Ok(out)
}

fn parse_u64(value: &str, file: &str) -> Result<u64, CatalogError> {
	value.parse().map_err(|_| CatalogError::Other {
		message: format!("{}: invalid number {:?}", file, value),
	})
}

fn parse_i64(value: &str, file: &str) -> Result<i64, CatalogError> {
	value.parse().map_err(|_| CatalogError::Other {
		message: format!("{}: invalid number {:?}", file, value),
	})
}

fn parse_directories(text: &str) -> Result<Vec<ManagedDirectory>, CatalogError> {
	rows(text, DIRECTORIES_HEADER, 3, DIRECTORIES_CSV)?
		.into_iter()
		.map(|f| {
			Ok(ManagedDirectory {
				id: Some(parse_u64(f[0], DIRECTORIES_CSV)?),
				name: f[1].to_string(),
				description: f[2].to_string(),
			})
		})
		.collect()
}

fn parse_bindings(text: &str) -> Result<Vec<LocationBinding>, CatalogError> {
	rows(text, BINDINGS_HEADER, 3, BINDINGS_CSV)?
		.into_iter()
		.map(|f| {
			Ok(LocationBinding {
				tag: f[0].to_string(),
				directory_id: parse_u64(f[1], BINDINGS_CSV)?,
				physical_path: if f[2].is_empty() { None } else { Some(PathBuf::from(f[2])) },
			})
		})
		.collect()
}

fn parse_files(text: &str) -> Result<Vec<FileRecord>, CatalogError> {
	rows(text, FILES_HEADER, 8, FILES_CSV)?
		.into_iter()
		.map(|f| {
			Ok(FileRecord {
				id: Some(parse_u64(f[0], FILES_CSV)?),
				directory_id: Some(parse_u64(f[1], FILES_CSV)?),
				parent_path: f[2].to_string(),
				name: f[3].to_string(),
				suffix: f[4].to_string(),
				size: parse_u64(f[5], FILES_CSV)?,
				modified_time: parse_i64(f[6], FILES_CSV)?,
				hash: if f[7].is_empty() {
					ContentHash::Unknown
				} else {
					ContentHash::Known(f[7].to_string())
				},
			})
		})
		.collect()
}


// vim: ts=4
