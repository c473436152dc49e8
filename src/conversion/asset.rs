use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// The bytes of an asset file, along with the path they were read from.
pub struct Asset {
    pub bytes: Vec<u8>,
    path: PathBuf,
}

impl Asset {
    pub fn new(bytes: Vec<u8>, path: impl Into<PathBuf>) -> Self {
        Self {
            bytes,
            path: path.into(),
        }
    }

    /// Reads the asset file at the given path.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        Ok(Self::new(fs::read(path)?, path))
    }

    /// Get a reference to the asset's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default()
    }
}
