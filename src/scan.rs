//! Lists the asset files of a directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Returns the files directly inside `dir` whose extension matches one of `extensions`
/// (case-insensitively), sorted by file name so batch reports are reproducible.
pub fn scan(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let source_error = |source| Error::SourceDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(source_error)? {
        let path = entry.map_err(source_error)?.path();
        if !path.is_file() {
            continue;
        }

        let supported = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map_or(false, |extension| {
                extensions
                    .iter()
                    .any(|supported| supported.eq_ignore_ascii_case(extension))
            });
        if supported {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(files)
}
