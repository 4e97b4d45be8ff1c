//! Error types for catalog operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for catalog operations
#[derive(Debug)]
pub enum CatalogError {
	/// A path contained a `.` or `..` segment or had no file name
	InvalidPath { path: String, reason: String },

	/// I/O failure while reading, copying or deleting a file
	Io { path: String, source: io::Error },

	/// A multi-row store mutation affected a different number of rows
	/// than the caller expected. Fatal: the persisted state and the
	/// engine's view have diverged and need manual inspection.
	Inconsistency { expected: usize, actual: usize, context: String },

	/// A copy destination already exists; the catalog and the local
	/// tree disagree about what is on disk
	DestinationExists { path: String },

	/// Store error (nested)
	Store(StoreError),

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for CatalogError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CatalogError::InvalidPath { path, reason } => {
				write!(f, "Invalid path {}: {}", path, reason)
			}
			CatalogError::Io { path, source } => write!(f, "I/O error on {}: {}", path, source),
			CatalogError::Inconsistency { expected, actual, context } => {
				write!(
					f,
					"Store inconsistency: {} expected {} rows, got {} (manual inspection required)",
					context, expected, actual
				)
			}
			CatalogError::DestinationExists { path } => {
				write!(f, "Copy destination already exists: {}", path)
			}
			CatalogError::Store(e) => write!(f, "Store error: {}", e),
			CatalogError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for CatalogError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			CatalogError::Io { source, .. } => Some(source),
			CatalogError::Store(e) => Some(e),
			_ => None,
		}
	}
}

impl From<StoreError> for CatalogError {
	fn from(e: StoreError) -> Self {
		CatalogError::Store(e)
	}
}

impl CatalogError {
	/// Attach a path to a bare I/O error
	pub fn io(path: impl Into<String>, source: io::Error) -> Self {
		CatalogError::Io { path: path.into(), source }
	}

	/// Whether the error must abort the whole run rather than the
	/// current group. Store inconsistencies and store transport
	/// failures are never retried.
	pub fn is_fatal(&self) -> bool {
		matches!(self, CatalogError::Inconsistency { .. } | CatalogError::Store(_))
	}
}

/// Store-specific errors
#[derive(Debug)]
pub enum StoreError {
	/// Backend failure (redb, serialization, ...)
	Backend { message: String },

	/// Directory name already registered
	DuplicateDirectory { name: String },

	/// Binding tag already in use
	DuplicateTag { tag: String },

	/// Directory name or binding tag exceeds 255 characters
	NameTooLong { name: String },

	/// Directory does not exist
	DirectoryNotFound { name: String },

	/// Directory still has bindings or file records
	DirectoryNotEmpty { name: String },

	/// Binding tag does not exist
	TagNotFound { tag: String },

	/// Logical path already present in the directory
	DuplicatePath { path: String },

	/// A mutating call was made with no open transaction
	NoTransaction,

	/// Import requires an empty store
	NotEmpty,
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::Backend { message } => write!(f, "backend: {}", message),
			StoreError::DuplicateDirectory { name } => {
				write!(f, "directory name already exists: {}", name)
			}
			StoreError::DuplicateTag { tag } => write!(f, "binding tag already exists: {}", tag),
			StoreError::NameTooLong { name } => {
				write!(f, "name exceeds 255 characters: {}", name)
			}
			StoreError::DirectoryNotFound { name } => write!(f, "no such directory: {}", name),
			StoreError::DirectoryNotEmpty { name } => {
				write!(f, "directory not empty: {}", name)
			}
			StoreError::TagNotFound { tag } => write!(f, "no such binding tag: {}", tag),
			StoreError::DuplicatePath { path } => {
				write!(f, "logical path already recorded: {}", path)
			}
			StoreError::NoTransaction => write!(f, "mutation outside of a transaction"),
			StoreError::NotEmpty => write!(f, "store is not empty"),
		}
	}
}

impl Error for StoreError {}

impl StoreError {
	/// Wrap any backend error
	pub fn backend(e: impl fmt::Display) -> Self {
		StoreError::Backend { message: e.to_string() }
	}
}

// vim: ts=4
