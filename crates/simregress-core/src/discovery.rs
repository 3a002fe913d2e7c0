//! Test discovery: enumerate ISA test binaries below the test directory.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::domain::TestCase;
use crate::error::{RegressError, Result};

/// File-name filters applied during discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    /// Keep only names containing one of these prefixes. Empty keeps all.
    pub families: Vec<String>,

    /// Extensions (without dot) that are skipped.
    pub exclude_extensions: Vec<String>,

    pub max_depth: usize,
}

impl DiscoveryFilter {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            families: config.families.clone(),
            exclude_extensions: config.exclude_extensions.clone(),
            max_depth: config.max_depth,
        }
    }

    /// Whether a regular file with this name is a test binary.
    pub fn accepts(&self, file_name: &str) -> bool {
        if file_name.starts_with('.') {
            return false;
        }

        if let Some(ext) = Path::new(file_name).extension().and_then(|e| e.to_str()) {
            if self
                .exclude_extensions
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(ext))
            {
                return false;
            }
        }

        self.families.is_empty() || self.families.iter().any(|f| file_name.contains(f.as_str()))
    }
}

/// Discover test cases below `test_dir`, ordered by name.
///
/// Zero matching files is a configuration error, as is a missing directory.
pub fn discover(test_dir: &Path, filter: &DiscoveryFilter) -> Result<Vec<TestCase>> {
    if !test_dir.is_dir() {
        return Err(RegressError::config(format!(
            "test directory does not exist: {}",
            test_dir.display()
        )));
    }

    let mut cases = Vec::new();
    walk(test_dir, "", 0, filter, &mut cases)?;
    cases.sort_by(|a, b| a.name.cmp(&b.name));

    if cases.is_empty() {
        return Err(RegressError::config(format!(
            "no test binaries found in {}",
            test_dir.display()
        )));
    }

    info!(count = cases.len(), dir = %test_dir.display(), "Discovered tests");
    Ok(cases)
}

fn walk(
    dir: &Path,
    prefix: &str,
    depth: usize,
    filter: &DiscoveryFilter,
    cases: &mut Vec<TestCase>,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };

        let name = if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if file_name.starts_with('.') {
                continue;
            }
            if depth < filter.max_depth {
                walk(&entry.path(), &name, depth + 1, filter, cases)?;
            }
            continue;
        }

        // Symlinks count when they resolve to a regular file.
        let is_file = file_type.is_file()
            || (file_type.is_symlink()
                && fs::metadata(entry.path())
                    .map(|m| m.is_file())
                    .unwrap_or(false));
        if !is_file {
            debug!(name = %name, "Skipping non-regular file");
            continue;
        }

        if filter.accepts(file_name) {
            cases.push(TestCase::new(name, entry.path()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> DiscoveryFilter {
        DiscoveryFilter {
            families: Vec::new(),
            exclude_extensions: vec!["dump".to_string()],
            max_depth: 20,
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"\x7fELF").unwrap();
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sub.bin");
        touch(dir.path(), "add.bin");
        touch(dir.path(), "add.dump");
        touch(dir.path(), ".hidden");
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let cases = discover(dir.path(), &filter()).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["add.bin", "sub.bin"]);
        assert_eq!(cases[0].path, dir.path().join("add.bin"));
    }

    #[test]
    fn test_discover_recurses_with_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("rv32ui")).unwrap();
        touch(&dir.path().join("rv32ui"), "rv32ui-p-add");
        touch(dir.path(), "top");

        let cases = discover(dir.path(), &filter()).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["rv32ui/rv32ui-p-add", "top"]);
    }

    #[test]
    fn test_discover_respects_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "deep");
        touch(dir.path(), "shallow");

        let mut f = filter();
        f.max_depth = 0;
        let cases = discover(dir.path(), &f).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "shallow");
    }

    #[test]
    fn test_discover_family_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rv32ui-p-add");
        touch(dir.path(), "rv32ui-p-add.dump");
        touch(dir.path(), "rv64ui-p-add");
        touch(dir.path(), "rv32um-p-mul");

        let mut f = filter();
        f.families = vec!["rv32ui-p".to_string(), "rv32um-p".to_string()];
        let cases = discover(dir.path(), &f).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["rv32ui-p-add", "rv32um-p-mul"]);
    }

    #[test]
    fn test_discover_empty_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "only.dump");
        let err = discover(dir.path(), &filter()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_discover_missing_dir_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&dir.path().join("missing"), &filter()).unwrap_err();
        assert!(err.is_config());
    }
}
