//! Host version to FBX file version lookup.

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    profile::FileVersion,
};

/// The host versions known out of the box, with the FBX file version each one writes.
pub const DEFAULT_VERSIONS: [(&str, &str); 6] = [
    ("2013", "FBX201300"),
    ("2014", "FBX201400"),
    ("2016", "FBX201600"),
    ("2017", "FBX201700"),
    ("2018", "FBX201800"),
    ("2019", "FBX201900"),
];

/// Maps host application versions to FBX file version tags.
///
/// The table can be extended without rebuilding through a TOML file:
///
/// ```toml
/// [versions]
/// "2020" = "FBX202000"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTable {
    versions: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct VersionFile {
    #[serde(default)]
    versions: BTreeMap<String, String>,
}

impl VersionTable {
    /// Returns the built-in table extended with the entries of a TOML file. Entries of the
    /// file replace built-in entries for the same host version.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::VersionTableIo {
            path: path.to_path_buf(),
            source,
        })?;
        let file: VersionFile =
            toml::from_str(&content).map_err(|source| Error::VersionTableParse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut table = Self::default();
        table.versions.extend(file.versions);
        log::debug!(
            "Loaded {} host versions from \"{}\"",
            table.versions.len(),
            path.display()
        );

        Ok(table)
    }

    /// Returns the file version tag of a host version, if the host version is known.
    pub fn get(&self, host_version: &str) -> Option<&str> {
        self.versions.get(host_version.trim()).map(String::as_str)
    }

    /// Resolves the file version for a run. Unknown host versions are an error; there is no
    /// fallback version.
    pub fn resolve(&self, host_version: &str) -> Result<FileVersion> {
        let tag = self
            .get(host_version)
            .ok_or_else(|| Error::UnsupportedHostVersion(host_version.to_string()))?;

        FileVersion::parse(tag)
    }

    pub fn host_versions(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }
}

impl Default for VersionTable {
    fn default() -> Self {
        Self {
            versions: DEFAULT_VERSIONS
                .iter()
                .map(|&(host, tag)| (host.to_string(), tag.to_string()))
                .collect(),
        }
    }
}
