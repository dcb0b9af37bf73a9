use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glob::Pattern;
use walkdir::WalkDir;

/// KOReader side-car file names, e.g. `metadata.epub.lua`
pub const SIDECAR_PATTERN: &str = "metadata.*.lua";

/// Expand files and folders into the side-car files to convert, sorted
/// and without duplicates. Files given directly are taken as they are.
pub fn find_documents(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(SIDECAR_PATTERN).context("Invalid side-car pattern")?;
    let mut found = BTreeSet::new();

    for input in inputs {
        if input.is_file() {
            found.insert(input.clone());
        } else if input.is_dir() {
            walk(input, &pattern, &mut found);
        } else {
            bail!("Input {} does not exist", input.display());
        }
    }

    Ok(found.into_iter().collect())
}

fn walk(root: &Path, pattern: &Pattern, found: &mut BTreeSet<PathBuf>) {
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable path under {}: {}", root.display(), e);
                continue;
            }
        };
        let is_sidecar = entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| pattern.matches(name));
        if is_sidecar {
            found.insert(entry.into_path());
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_finds_sidecars_recursively_in_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/Dune.sdr")).unwrap();
        fs::create_dir_all(root.join("a/Emma.sdr")).unwrap();
        fs::write(root.join("b/Dune.sdr/metadata.epub.lua"), "return {}").unwrap();
        fs::write(root.join("a/Emma.sdr/metadata.pdf.lua"), "return {}").unwrap();
        fs::write(root.join("a/Emma.sdr/metadata.epub.lua.old"), "").unwrap();
        fs::write(root.join("a/notes.lua"), "").unwrap();

        let found = find_documents(&[root.to_path_buf()]).unwrap();
        assert_eq!(
            found,
            vec![
                root.join("a/Emma.sdr/metadata.pdf.lua"),
                root.join("b/Dune.sdr/metadata.epub.lua"),
            ]
        );
    }

    #[test]
    fn test_explicit_files_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("custom.lua");
        fs::write(&file, "return {}").unwrap();

        let found = find_documents(&[file.clone(), file.clone()]).unwrap();
        assert_eq!(found, vec![file]);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(find_documents(&[dir.path().join("nowhere")]).is_err());
    }
}
