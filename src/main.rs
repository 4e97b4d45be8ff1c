use clap::{Arg, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::{env, fs};

use replicat::committer::BatchedHashCommitter;
use replicat::config::{replicat_dir, Config};
use replicat::dedup::DuplicateDetector;
use replicat::export;
use replicat::logging::init_tracing;
use replicat::manage;
use replicat::prompt::TerminalPolicy;
use replicat::record::FileRecord;
use replicat::store::redb_store::RedbStore;
use replicat::store::{in_transaction, PathField, Store};
use replicat::util::human_readable_size;

///////////////////////
// Utility functions //
///////////////////////

fn init_replicat_dir() -> Result<PathBuf, Box<dyn Error>> {
	env::var("HOME").map_err(|_| "Could not determine HOME directory!")?;
	let dir = replicat_dir();
	match fs::metadata(&dir) {
		Ok(meta) => {
			if meta.is_dir() {
				Ok(dir)
			} else {
				Err(format!("{} exists, but it is not a directory!", dir.display()).into())
			}
		}
		Err(_err) => {
			// Not exists
			fs::create_dir(&dir).map_err(|err| format!("Cannot create directory: {}", err))?;
			Ok(dir)
		}
	}
}

fn open_store(config: &Config) -> Result<RedbStore, Box<dyn Error>> {
	init_replicat_dir()?;
	Ok(RedbStore::open(&config.store_path)?)
}

fn print_records(records: &[FileRecord]) {
	for record in records {
		let digest = record.hash.digest().unwrap_or("-");
		println!(
			"{}\t{}\t{}\t{}",
			record.logical_path(),
			human_readable_size(record.size),
			record.modified_time,
			digest
		);
	}
}

fn main() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let matches = Command::new("replicat")
		.version("0.2.0")
		.about("File catalog reconciliation and deduplication across replicated locations")
		.subcommand_required(true)
		.subcommand(
			Command::new("mkdir")
				.about("Register a managed directory")
				.arg(Arg::new("name").required(true))
				.arg(Arg::new("description")),
		)
		.subcommand(
			Command::new("rmdir")
				.about("Remove a managed directory (must have no bindings or records)")
				.arg(Arg::new("name").required(true)),
		)
		.subcommand(Command::new("ls").about("List managed directories and their locations"))
		.subcommand(
			Command::new("manage")
				.about("Bind a physical location to a directory and reconcile it")
				.arg(Arg::new("path").required(true))
				.arg(
					Arg::new("name")
						.short('n')
						.long("name")
						.help("Directory name (read from the marker if omitted)"),
				)
				.arg(
					Arg::new("tag")
						.short('t')
						.long("tag")
						.help("Location tag (read from the marker if omitted)"),
				),
		)
		.subcommand(
			Command::new("unmanage")
				.about("Remove a location binding and its on-disk marker")
				.arg(Arg::new("tag").required(true)),
		)
		.subcommand(
			Command::new("records")
				.about("List the file records of a directory")
				.arg(Arg::new("name").required(true)),
		)
		.subcommand(
			Command::new("size")
				.about("Total recorded size of a directory")
				.arg(Arg::new("name").required(true)),
		)
		.subcommand(
			Command::new("find")
				.about("Substring search over one path component")
				.arg(
					Arg::new("field")
						.required(true)
						.value_parser(["parent", "name", "suffix"]),
				)
				.arg(Arg::new("needle").required(true)),
		)
		.subcommand(Command::new("dedup").about("Find and resolve duplicate content"))
		.subcommand(
			Command::new("export")
				.about("Dump the catalog as CSV files")
				.arg(Arg::new("dir").required(true)),
		)
		.subcommand(
			Command::new("import")
				.about("Restore a CSV dump into an empty catalog")
				.arg(Arg::new("dir").required(true)),
		)
		.get_matches();

	let config = Config::load()?;

	if let Some(matches) = matches.subcommand_matches("mkdir") {
		let name = matches.get_one::<String>("name").ok_or("mkdir: name required")?;
		let description =
			matches.get_one::<String>("description").map(|s| s.as_str()).unwrap_or("");
		let mut store = open_store(&config)?;
		let id = in_transaction(&mut store, |s| Ok(s.create_directory(name, description)?))?;
		println!("created directory {} (id {})", name, id);
	} else if let Some(matches) = matches.subcommand_matches("rmdir") {
		let name = matches.get_one::<String>("name").ok_or("rmdir: name required")?;
		let mut store = open_store(&config)?;
		let removed = in_transaction(&mut store, |s| Ok(s.remove_directory(name)?))?;
		if removed == 0 {
			return Err(format!("no such directory: {}", name).into());
		}
		println!("removed directory {}", name);
	} else if matches.subcommand_matches("ls").is_some() {
		let store = open_store(&config)?;
		for dir in store.directories()? {
			let id = dir.id.ok_or("directory without id")?;
			println!("{}\t{}", dir.name, dir.description);
			for binding in store.bindings_for_directory(id)? {
				let path = match &binding.physical_path {
					Some(p) => p.display().to_string(),
					None => "(unreachable)".to_string(),
				};
				println!("  {}\t{}", binding.tag, path);
			}
		}
	} else if let Some(matches) = matches.subcommand_matches("manage") {
		let path = matches.get_one::<String>("path").ok_or("manage: path required")?;
		let root = fs::canonicalize(Path::new(path))
			.map_err(|e| format!("cannot resolve {}: {}", path, e))?;
		// Name and tag can come from the marker of a previously managed root
		let marker = replicat::scan::read_marker(&root)?;
		let name = match (matches.get_one::<String>("name"), &marker) {
			(Some(name), _) => name.clone(),
			(None, Some(marker)) => marker.name.clone(),
			(None, None) => return Err("manage: --name required (no marker present)".into()),
		};
		let tag = match (matches.get_one::<String>("tag"), &marker) {
			(Some(tag), _) => tag.clone(),
			(None, Some(marker)) => marker.tag.clone(),
			(None, None) => return Err("manage: --tag required (no marker present)".into()),
		};
		let mut store = open_store(&config)?;
		let mut policy = TerminalPolicy::new();
		let committer = BatchedHashCommitter::new(config.flush_interval());
		let outcome = manage::manage(&mut store, &mut policy, &committer, &name, &tag, &root)?;
		if outcome.first_management {
			println!("first management: {} records added", outcome.report.records_inserted);
		} else {
			println!("{:?}", outcome.report);
		}
		if outcome.empty_dirs_removed > 0 {
			println!("removed {} empty directories", outcome.empty_dirs_removed);
		}
	} else if let Some(matches) = matches.subcommand_matches("unmanage") {
		let tag = matches.get_one::<String>("tag").ok_or("unmanage: tag required")?;
		let mut store = open_store(&config)?;
		manage::unmanage(&mut store, tag)?;
		println!("unmanaged {}", tag);
	} else if let Some(matches) = matches.subcommand_matches("records") {
		let name = matches.get_one::<String>("name").ok_or("records: name required")?;
		let store = open_store(&config)?;
		let dir = store.directory_by_name(name)?.ok_or(format!("no such directory: {}", name))?;
		let id = dir.id.ok_or("directory without id")?;
		print_records(&store.file_records(id)?);
	} else if let Some(matches) = matches.subcommand_matches("size") {
		let name = matches.get_one::<String>("name").ok_or("size: name required")?;
		let store = open_store(&config)?;
		let dir = store.directory_by_name(name)?.ok_or(format!("no such directory: {}", name))?;
		let id = dir.id.ok_or("directory without id")?;
		println!("{}", human_readable_size(store.directory_size(id)?));
	} else if let Some(matches) = matches.subcommand_matches("find") {
		let field = match matches.get_one::<String>("field").map(|s| s.as_str()) {
			Some("parent") => PathField::ParentPath,
			Some("suffix") => PathField::Suffix,
			_ => PathField::Name,
		};
		let needle = matches.get_one::<String>("needle").ok_or("find: needle required")?;
		let store = open_store(&config)?;
		print_records(&store.search_records(field, needle)?);
	} else if matches.subcommand_matches("dedup").is_some() {
		let mut store = open_store(&config)?;
		let mut policy = TerminalPolicy::new();
		let committer = BatchedHashCommitter::new(config.flush_interval());
		let detector = DuplicateDetector::new(&committer);
		let report = detector.run(&mut store, &mut policy)?;
		println!(
			"hashed {} files, {} duplicate groups, {} records deleted",
			report.hashed, report.groups, report.records_deleted
		);
	} else if let Some(matches) = matches.subcommand_matches("export") {
		let dir = matches.get_one::<String>("dir").ok_or("export: directory required")?;
		let store = open_store(&config)?;
		export::export(&store, Path::new(dir))?;
		println!("exported to {}", dir);
	} else if let Some(matches) = matches.subcommand_matches("import") {
		let dir = matches.get_one::<String>("dir").ok_or("import: directory required")?;
		let mut store = open_store(&config)?;
		export::import(&mut store, Path::new(dir))?;
		println!("imported from {}", dir);
	}

	Ok(())
}

// vim: ts=4
