//! The export options applied to every file of a run.

use std::fmt;

use crate::error::{Error, Result};

/// An FBX file version tag, such as "FBX201900".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVersion {
    tag: String,
    year: u16,
}

impl FileVersion {
    /// Parses a tag of the form `FBX<year><revision>` (e.g. "FBX201400").
    pub fn parse(tag: &str) -> Result<Self> {
        let invalid = || Error::InvalidFileVersion(tag.to_string());

        let digits = tag.strip_prefix("FBX").ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year = digits[..4].parse().map_err(|_| invalid())?;

        Ok(Self {
            tag: tag.to_string(),
            year,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The version number written in the header of binary files of this version.
    pub fn binary_version(&self) -> u32 {
        match self.year {
            0..=2013 => 7300,
            2014..=2015 => 7400,
            2016..=2018 => 7500,
            _ => 7700,
        }
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationRepresentation {
    Euler,
    Quaternion,
    Resample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpAxis {
    Y,
    Z,
}

/// The full set of export options. A profile is built once per run and passed to every
/// export; no option varies between files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportProfile {
    pub smoothing_groups: bool,
    pub hard_edges: bool,
    pub tangents: bool,
    pub smooth_mesh: bool,
    pub instances: bool,
    pub referenced_assets_content: bool,
    pub bake_complex_animation: bool,
    /// The sampling step of baked animation, in frames.
    pub bake_complex_step: u32,
    pub use_scene_name: bool,
    pub rotation: RotationRepresentation,
    pub shapes: bool,
    pub skins: bool,
    pub constraints: bool,
    pub cameras: bool,
    pub lights: bool,
    pub embedded_textures: bool,
    pub input_connections: bool,
    pub up_axis: UpAxis,
    pub file_version: FileVersion,
}

impl ExportProfile {
    pub fn new(file_version: FileVersion) -> Self {
        Self {
            smoothing_groups: true,
            hard_edges: false,
            tangents: false,
            smooth_mesh: true,
            instances: false,
            referenced_assets_content: false,
            bake_complex_animation: true,
            bake_complex_step: 1,
            use_scene_name: false,
            rotation: RotationRepresentation::Euler,
            shapes: true,
            skins: true,
            constraints: false,
            cameras: true,
            lights: true,
            embedded_textures: true,
            input_connections: true,
            up_axis: UpAxis::Y,
            file_version,
        }
    }
}
