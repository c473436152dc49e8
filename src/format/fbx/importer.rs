use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use glam::DVec3;

use crate::conversion::{Asset, Importer, Node, NodeKind, Scene, Transform};

use super::{
    connections,
    internal::{Document, Property, Record},
};

#[derive(Default)]
pub struct FbxImporter {}

impl Importer for FbxImporter {
    fn import(&self, asset: &Asset, scene: &mut Scene) -> Result<()> {
        if !scene.is_empty() {
            bail!("The scene already holds a document");
        }

        let document = Document::from_bytes(&asset.bytes)
            .context("Failed to deserialize the bytes of the FBX asset")?;
        let nodes = convert_models(&document)?;
        log::debug!(
            "Imported {} nodes ({} joints) from FBX {}",
            nodes.len(),
            nodes.iter().filter(|n| n.kind == NodeKind::Joint).count(),
            document.version
        );

        scene.nodes = nodes;
        scene.document = Some(document);

        Ok(())
    }

    fn extensions(&self) -> &[&str] {
        &["fbx"]
    }
}

fn convert_models(document: &Document) -> Result<Vec<Node>> {
    let mut nodes: Vec<Node> = Vec::new();
    let mut indices = HashMap::new();

    let models = document
        .find("Objects")
        .into_iter()
        .flat_map(|objects| &objects.children)
        .filter(|record| record.name == "Model");
    for record in models {
        let id = record.object_id().context("A model has no object id")?;
        if indices.insert(id, nodes.len()).is_some() {
            bail!("The object id {} is used by more than one model", id);
        }

        nodes.push(Node {
            id,
            name: record.object_name().unwrap_or_default().to_string(),
            kind: NodeKind::from_fbx(record.object_kind().unwrap_or_default()),
            parent: None,
            transform: convert_transform(record),
        });
    }

    // Only model-to-model links form the hierarchy. A link to id 0 is the scene root.
    for connection in connections(document).filter(|c| c.property.is_none()) {
        let (Some(&child), Some(&parent)) = (
            indices.get(&connection.source),
            indices.get(&connection.destination),
        ) else {
            continue;
        };

        if let Some(existing) = nodes[child].parent {
            bail!(
                "The model \"{}\" is parented to both \"{}\" and \"{}\"",
                nodes[child].name,
                nodes[existing].name,
                nodes[parent].name
            );
        }
        nodes[child].parent = Some(parent);
    }

    check_acyclic(&nodes)?;

    Ok(nodes)
}

fn check_acyclic(nodes: &[Node]) -> Result<()> {
    for node in nodes {
        let mut parent = node.parent;
        let mut depth = 0;
        while let Some(current) = parent {
            depth += 1;
            if depth > nodes.len() {
                bail!("The hierarchy above \"{}\" contains a cycle", node.name);
            }
            parent = nodes[current].parent;
        }
    }

    Ok(())
}

fn convert_transform(record: &Record) -> Transform {
    // The pre-rotation only applies when the rotation settings are active.
    let rotation_active = record
        .property70("RotationActive")
        .and_then(|p| p.properties.get(4))
        .and_then(Property::as_i64)
        .unwrap_or(0)
        != 0;

    Transform {
        translation: vector_property(record, "Lcl Translation").unwrap_or(DVec3::ZERO),
        rotation: vector_property(record, "Lcl Rotation").unwrap_or(DVec3::ZERO),
        pre_rotation: if rotation_active {
            vector_property(record, "PreRotation").unwrap_or(DVec3::ZERO)
        } else {
            DVec3::ZERO
        },
        scale: vector_property(record, "Lcl Scaling").unwrap_or(DVec3::ONE),
    }
}

/// Reads the three components of a vector `P` entry. Values start after the name, the type,
/// the label and the flags.
fn vector_property(record: &Record, name: &str) -> Option<DVec3> {
    let values = &record.property70(name)?.properties;
    let component = |index: usize| values.get(4 + index).and_then(Property::as_f64);

    Some(DVec3::new(component(0)?, component(1)?, component(2)?))
}
