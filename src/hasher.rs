//! Streaming content hashing
//!
//! Files are read through a bounded buffer into a BLAKE3 accumulator, so
//! hashing never loads a whole file into memory. The digest depends only
//! on the file bytes, not on the buffer size.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::CatalogError;
use crate::record::ContentHash;

/// Default read buffer size: 128 MiB
pub const READ_BUFFER_SIZE: usize = 128 * 1024 * 1024;

/// Hash a file with the default buffer size
pub fn hash_file(path: &Path) -> Result<ContentHash, CatalogError> {
	hash_file_with_buffer(path, READ_BUFFER_SIZE)
}

/// Hash a file reading at most `buffer_size` bytes at a time
pub fn hash_file_with_buffer(
	path: &Path,
	buffer_size: usize,
) -> Result<ContentHash, CatalogError> {
	let io_err = |e| CatalogError::io(path.display().to_string(), e);
	let mut file = fs::File::open(path).map_err(io_err)?;
	// Never allocate more than the file can fill
	let file_len = file.metadata().map_err(io_err)?.len();
	let buffer_size = buffer_size.min(file_len.max(1) as usize);
	let mut buffer = vec![0u8; buffer_size];
	let mut hasher = blake3::Hasher::new();
	loop {
		let n = file.read(&mut buffer).map_err(io_err)?;
		if n == 0 {
			break;
		}
		hasher.update(&buffer[..n]);
	}
	Ok(ContentHash::Known(hasher.finalize().to_hex().to_string()))
}


// vim: ts=4
