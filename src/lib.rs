//! # Replicat - File Catalog Reconciliation and Deduplication
//!
//! Replicat tracks directories that are replicated across several
//! physical locations (disks, USB drives, remote mounts) in one durable
//! catalog, reconciles each location against the catalog, pulls missing
//! files back from sibling locations, and finds duplicate content across
//! the whole catalog by size grouping and content hashing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use replicat::committer::BatchedHashCommitter;
//! use replicat::prompt::TerminalPolicy;
//! use replicat::store::redb_store::RedbStore;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = RedbStore::open("catalog.redb".as_ref())?;
//!     let mut policy = TerminalPolicy::new();
//!     let committer = BatchedHashCommitter::default();
//!     let outcome = replicat::manage::manage(
//!         &mut store, &mut policy, &committer,
//!         "photos", "laptop", "/home/me/photos".as_ref(),
//!     )?;
//!     println!("{:?}", outcome.report);
//!     Ok(())
//! }
//! ```

pub mod committer;
pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod guard;
pub mod hasher;
pub mod logging;
pub mod manage;
pub mod policy;
pub mod prompt;
pub mod reconcile;
pub mod record;
pub mod resolver;
pub mod scan;
pub mod store;
pub mod util;

// Re-export commonly used types and functions
pub use error::{CatalogError, StoreError};
pub use policy::{DecisionPolicy, SkipAll};
pub use record::{ContentHash, FileRecord, LocationBinding, ManagedDirectory};
pub use store::{in_transaction, MemoryStore, Store};

// vim: ts=4
