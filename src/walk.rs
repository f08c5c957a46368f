//! Resolves a sprite filename named in a manifest against the asset root directory. A thin
//! wrapper over `std::fs::read_dir`; the asset trees this tool compiles are small and flat
//! enough that a crate like `walkdir` buys nothing.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalkError {
	#[error("asset file {0:?} was not found under {1:?}")]
	NotFound(String, PathBuf),

	#[error("failed to read directory {0:?}: {1}")]
	Io(PathBuf, #[source] std::io::Error),
}

/// Finds `filename` somewhere under `root`, searching subdirectories breadth-first. Manifests
/// name assets by their bare filename, not a path, so the first match wins.
pub fn find_asset(root: &Path, filename: &str) -> Result<PathBuf, WalkError> {
	let mut pending = vec![root.to_path_buf()];

	while let Some(dir) = pending.pop() {
		let entries = std::fs::read_dir(&dir).map_err(|e| WalkError::Io(dir.clone(), e))?;
		for entry in entries {
			let entry = entry.map_err(|e| WalkError::Io(dir.clone(), e))?;
			let path = entry.path();
			if path.is_dir() {
				pending.push(path);
			} else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
				return Ok(path);
			}
		}
	}

	Err(WalkError::NotFound(filename.to_string(), root.to_path_buf()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_a_file_directly_under_the_root() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("hero.gif"), b"dummy").unwrap();

		let found = find_asset(dir.path(), "hero.gif").unwrap();
		assert_eq!(found, dir.path().join("hero.gif"));
	}

	#[test]
	fn finds_a_file_nested_in_a_subdirectory() {
		let dir = tempfile::tempdir().unwrap();
		let nested = dir.path().join("sprites");
		std::fs::create_dir(&nested).unwrap();
		std::fs::write(nested.join("walk.gif"), b"dummy").unwrap();

		let found = find_asset(dir.path(), "walk.gif").unwrap();
		assert_eq!(found, nested.join("walk.gif"));
	}

	#[test]
	fn reports_a_clear_error_when_the_file_is_missing() {
		let dir = tempfile::tempdir().unwrap();
		let result = find_asset(dir.path(), "missing.gif");
		assert!(matches!(result, Err(WalkError::NotFound(_, _))));
	}
}
