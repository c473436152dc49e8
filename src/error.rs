use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that stop a run before any file is processed.
#[derive(Error, Debug)]
pub enum Error {
    /// The host version has no entry in the version table
    #[error("Unsupported host version \"{0}\"")]
    UnsupportedHostVersion(String),

    /// A version table entry is not a valid FBX file version tag
    #[error("Invalid FBX file version tag \"{0}\" (expected e.g. \"FBX201900\")")]
    InvalidFileVersion(String),

    #[error("Failed to read the version table \"{path}\": {source}")]
    VersionTableIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse the version table \"{path}\": {source}")]
    VersionTableParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot read the source directory \"{path}\": {source}")]
    SourceDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot create the destination directory \"{path}\": {source}")]
    DestinationDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors that fail a single file. The batch records them and moves on.
#[derive(Error, Debug)]
pub enum FileError {
    /// The scene already has a joint with the synthetic root name
    #[error("A joint named \"{0}\" already exists in the scene")]
    NamingCollision(String),

    #[error("Import failed: {0:#}")]
    Import(anyhow::Error),

    #[error("Export failed: {0:#}")]
    Export(anyhow::Error),
}

/// Result type using the fatal [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
