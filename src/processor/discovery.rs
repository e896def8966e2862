//! Input discovery for power-log batches.
//!
//! Inputs may be files, directories (walked recursively) or glob patterns.
//! Previously written `processed-*` files and hidden files are never picked
//! up from directories.

use crate::constants::PROCESSED_FILE_PREFIX;
use crate::error::{PwrLogError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Expands command-line inputs into a sorted, de-duplicated file list
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    inputs: Vec<String>,
    missing: usize,
}

impl FileDiscovery {
    pub fn new(inputs: Vec<String>) -> Self {
        Self { inputs, missing: 0 }
    }

    /// Inputs that matched nothing during the last discovery
    pub fn missing_count(&self) -> usize {
        self.missing
    }

    pub fn discover(&mut self) -> Result<Vec<PathBuf>> {
        let mut files = BTreeSet::new();
        self.missing = 0;

        for input in &self.inputs {
            let before = files.len();
            if is_glob_pattern(input) {
                expand_glob(input, &mut files)?;
            } else {
                let path = Path::new(input);
                if path.is_dir() {
                    walk_directory(path, &mut files);
                } else if path.is_file() {
                    files.insert(path.to_path_buf());
                }
            }

            if files.len() == before {
                warn!("No power logs found for input: {}", input);
                self.missing += 1;
            }
        }

        debug!(
            "Discovered {} files from {} inputs",
            files.len(),
            self.inputs.len()
        );
        Ok(files.into_iter().collect())
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

fn expand_glob(pattern: &str, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    let paths = glob::glob(pattern).map_err(|e| {
        PwrLogError::configuration(format!("Invalid glob pattern '{}': {}", pattern, e))
    })?;

    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => {
                files.insert(path);
            }
            Ok(path) if path.is_dir() => walk_directory(&path, files),
            Ok(_) => {}
            Err(e) => warn!("Unreadable glob match: {}", e),
        }
    }
    Ok(())
}

fn walk_directory(dir: &Path, files: &mut BTreeSet<PathBuf>) {
    for entry in WalkDir::new(dir).follow_links(true) {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_candidate(entry.path()) => {
                files.insert(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry under {}: {}", dir.display(), e),
        }
    }
}

/// Directory members considered power logs
fn is_candidate(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| !name.starts_with('.') && !name.starts_with(PROCESSED_FILE_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree(temp_dir: &TempDir) -> PathBuf {
        let root = temp_dir.path().join("logs");
        let nested = root.join("xo-1.5").join("march");
        fs::create_dir_all(&nested).unwrap();

        fs::write(root.join("pwr-001.csv"), "XOVER:1\n").unwrap();
        fs::write(root.join("processed-pwr-001.csv"), "line,kind\n").unwrap();
        fs::write(root.join(".hidden"), "").unwrap();
        fs::write(nested.join("pwr-002"), "XOVER:1.5\n").unwrap();
        fs::write(nested.join("pwr-003.csv"), "XOVER:1.5\n").unwrap();
        root
    }

    #[test]
    fn test_directory_walk_skips_outputs_and_hidden() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_test_tree(&temp_dir);

        let mut discovery = FileDiscovery::new(vec![root.display().to_string()]);
        let files = discovery.discover().unwrap();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| {
            let name = f.file_name().unwrap().to_string_lossy();
            !name.starts_with("processed-") && !name.starts_with('.')
        }));
        assert_eq!(discovery.missing_count(), 0);
    }

    #[test]
    fn test_glob_and_explicit_file_are_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_test_tree(&temp_dir);
        let explicit = root.join("pwr-001.csv");

        let mut discovery = FileDiscovery::new(vec![
            format!("{}/pwr-*.csv", root.display()),
            explicit.display().to_string(),
        ]);
        let files = discovery.discover().unwrap();

        assert_eq!(files, vec![explicit]);
    }

    #[test]
    fn test_missing_input_is_counted_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut discovery = FileDiscovery::new(vec![
            temp_dir.path().join("nope.csv").display().to_string(),
        ]);
        let files = discovery.discover().unwrap();
        assert!(files.is_empty());
        assert_eq!(discovery.missing_count(), 1);
    }

    #[test]
    fn test_invalid_glob_is_configuration_error() {
        let mut discovery = FileDiscovery::new(vec!["logs/[".to_string()]);
        assert!(matches!(
            discovery.discover(),
            Err(PwrLogError::Configuration { .. })
        ));
    }
}
