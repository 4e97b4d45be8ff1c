//! Tool configuration
//!
//! Configuration lives in `~/.replicat/config.toml`; every field has a
//! default so a missing file just means defaults.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CatalogError;

/// Name of the per-root metadata directory (excluded from scans)
pub const META_DIR_NAME: &str = ".replicat";

/// How often hashing runs flush partial results by default (seconds)
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Path of the catalog database file
	pub store_path: PathBuf,

	/// Seconds between partial commits during long hashing runs
	pub flush_interval_secs: u64,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			store_path: replicat_dir().join("catalog.redb"),
			flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
		}
	}
}

impl Config {
	/// Load `~/.replicat/config.toml`, falling back to defaults when the
	/// file does not exist
	pub fn load() -> Result<Self, CatalogError> {
		let path = replicat_dir().join("config.toml");
		match fs::read_to_string(&path) {
			Ok(text) => toml::from_str(&text).map_err(|e| CatalogError::Other {
				message: format!("cannot parse {}: {}", path.display(), e),
			}),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
			Err(e) => Err(CatalogError::io(path.display().to_string(), e)),
		}
	}

	pub fn flush_interval(&self) -> Duration {
		Duration::from_secs(self.flush_interval_secs)
	}
}

/// The tool's home directory, `~/.replicat`
pub fn replicat_dir() -> PathBuf {
	match env::var("HOME") {
		Ok(home) => PathBuf::from(home).join(".replicat"),
		Err(_) => PathBuf::from(".replicat"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = Config::default();
		assert_eq!(config.flush_interval_secs, DEFAULT_FLUSH_INTERVAL_SECS);
		assert!(config.store_path.ends_with("catalog.redb"));
	}

	#[test]
	fn test_parse_partial_config() {
		let config: Config = toml::from_str("flush_interval_secs = 10").unwrap();
		assert_eq!(config.flush_interval_secs, 10);
		assert!(config.store_path.ends_with("catalog.redb"));
	}
}

// vim: ts=4
