//! Directory listing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// List the visible regular files of a directory, sorted by file name.
///
/// Hidden entries (leading `.`) and directories are excluded. Sorting is
/// lexicographic on the name, which is timestamp order for the supported
/// camera grammars.
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn skips_hidden_and_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.MP4"), b"b").unwrap();
        fs::write(dir.path().join("a.MP4"), b"a").unwrap();
        fs::write(dir.path().join(".partial.c.MP4"), b"c").unwrap();
        fs::create_dir(dir.path().join("completed")).unwrap();

        let names: Vec<String> = list_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.MP4", "b.MP4"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(list_files(&dir.path().join("nope")).is_err());
    }
}
