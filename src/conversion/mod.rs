use anyhow::Result;

use crate::profile::ExportProfile;

pub use self::{
    asset::Asset,
    scene::{Node, NodeId, NodeKind, Scene, Transform},
};

mod asset;
mod scene;

/// Defines a type that can import asset files into a scene.
pub trait Importer {
    /// Imports an asset file into an empty scene. Node names are taken as they are, without
    /// any namespace prefix.
    fn import(&self, asset: &Asset, scene: &mut Scene) -> Result<()>;
    /// Returns the file extensions supported by the importer. These extensions are used to
    /// select the asset files of a directory.
    ///
    /// The extension should not include the period (e.g "zip", not ".zip").
    fn extensions(&self) -> &[&str];
}

/// Defines a type that can export a scene into an asset file.
pub trait Exporter {
    /// Exports the hierarchy under `selection` into the bytes of an asset file. Every option
    /// comes from `profile`; nothing carries over from earlier exports.
    fn export(&self, scene: &Scene, selection: NodeId, profile: &ExportProfile)
        -> Result<Vec<u8>>;
}
