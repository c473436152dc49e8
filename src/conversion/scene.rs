use anyhow::{bail, Result};
use glam::{DMat4, DQuat, DVec3, EulerRot};

use crate::format::fbx::internal::Document;

/// Tolerance used when comparing world matrices.
const EPSILON: f64 = 1e-9;

/// The index of a node in the [`Scene`] node list.
pub type NodeId = usize;

/// Represents the single live document of the pipeline: the node hierarchy of one imported
/// file plus everything the pipeline does not interpret, kept for the export.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// The transform nodes of the scene, in the order they were discovered.
    pub nodes: Vec<Node>,
    /// The source document, carried through to the exporter.
    pub document: Option<Document>,
}

impl Scene {
    /// Returns whether the scene holds no document and no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.document.is_none()
    }

    /// Discards everything in the scene.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.document = None;
    }

    /// Returns the joints of the scene, in discovery order.
    pub fn joints(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.kind == NodeKind::Joint)
            .map(|(index, _)| index)
    }

    /// Returns the first node with the given name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.name == name)
    }

    /// Returns the transform of the node with the given index, relative to the origin of
    /// the scene.
    pub fn world_matrix(&self, index: NodeId) -> DMat4 {
        let mut node = &self.nodes[index];
        let mut matrix = node.transform.matrix();
        while let Some(parent) = node.parent {
            node = &self.nodes[parent];
            matrix = node.transform.matrix() * matrix;
        }

        matrix
    }

    /// Returns whether `ancestor` is above `index` in the hierarchy.
    pub fn is_ancestor(&self, ancestor: NodeId, index: NodeId) -> bool {
        let mut parent = self.nodes[index].parent;
        while let Some(current) = parent {
            if current == ancestor {
                return true;
            }
            parent = self.nodes[current].parent;
        }

        false
    }

    /// Returns the node and all its descendants, in scene order.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&index| index == root || self.is_ancestor(root, index))
            .collect()
    }

    /// Returns an object id that no node or source object uses yet.
    pub fn next_object_id(&self) -> i64 {
        let nodes = self.nodes.iter().map(|node| node.id).max();
        let objects = self.document.as_ref().and_then(Document::max_object_id);
        nodes.max(objects).map_or(1, |id| id + 1)
    }

    /// Creates a joint at the origin, under the scene root.
    pub fn create_joint(&mut self, name: &str) -> NodeId {
        let node = Node {
            id: self.next_object_id(),
            name: name.to_string(),
            kind: NodeKind::Joint,
            parent: None,
            transform: Transform::IDENTITY,
        };
        self.nodes.push(node);

        self.nodes.len() - 1
    }

    /// Changes the parent of a node while keeping its world transform. The local transform is
    /// only recomputed when the new parent frame differs from the old one.
    pub fn reparent(&mut self, index: NodeId, parent: Option<NodeId>) -> Result<()> {
        if let Some(parent) = parent {
            if parent == index || self.is_ancestor(index, parent) {
                bail!(
                    "Cannot parent \"{}\" under its own descendant \"{}\"",
                    self.nodes[index].name,
                    self.nodes[parent].name
                );
            }
        }

        let frame = |scene: &Self, parent: Option<NodeId>| {
            parent.map_or(DMat4::IDENTITY, |parent| scene.world_matrix(parent))
        };
        let old_frame = frame(self, self.nodes[index].parent);
        let new_frame = frame(self, parent);

        if !old_frame.abs_diff_eq(new_frame, EPSILON) {
            let world = self.world_matrix(index);
            let node = &mut self.nodes[index];
            node.transform =
                Transform::from_matrix(new_frame.inverse() * world, node.transform.pre_rotation);
        }
        self.nodes[index].parent = parent;

        Ok(())
    }
}

/// Represents a transform node of the [`Scene`].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The object id, unique within the scene.
    pub id: i64,
    pub name: String,
    pub kind: NodeKind,
    /// The index of the parent node, or `None` when the node sits under the scene root.
    pub parent: Option<NodeId>,
    /// The transform relative to the parent.
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Joint,
    Mesh,
    Camera,
    Light,
    Null,
    Other(String),
}

impl NodeKind {
    pub fn from_fbx(kind: &str) -> Self {
        match kind {
            "LimbNode" | "Limb" | "Root" => Self::Joint,
            "Mesh" => Self::Mesh,
            "Camera" => Self::Camera,
            "Light" => Self::Light,
            "Null" => Self::Null,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn to_fbx(&self) -> &str {
        match self {
            Self::Joint => "LimbNode",
            Self::Mesh => "Mesh",
            Self::Camera => "Camera",
            Self::Light => "Light",
            Self::Null => "Null",
            Self::Other(kind) => kind,
        }
    }
}

/// A local transform. Rotations are Euler angles in degrees, applied in XYZ order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: DVec3,
    pub rotation: DVec3,
    /// The joint orient, applied before `rotation`.
    pub pre_rotation: DVec3,
    pub scale: DVec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: DVec3::ZERO,
        rotation: DVec3::ZERO,
        pre_rotation: DVec3::ZERO,
        scale: DVec3::ONE,
    };

    pub fn matrix(&self) -> DMat4 {
        let rotation = euler_to_quat(self.pre_rotation) * euler_to_quat(self.rotation);
        DMat4::from_scale_rotation_translation(self.scale, rotation, self.translation)
    }

    /// Returns the transform that reproduces `matrix` on top of the given pre-rotation.
    pub fn from_matrix(matrix: DMat4, pre_rotation: DVec3) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        let rotation = euler_to_quat(pre_rotation).inverse() * rotation;

        Self {
            translation,
            rotation: quat_to_euler(rotation),
            pre_rotation,
            scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn euler_to_quat(degrees: DVec3) -> DQuat {
    DQuat::from_euler(
        EulerRot::ZYX,
        degrees.z.to_radians(),
        degrees.y.to_radians(),
        degrees.x.to_radians(),
    )
}

fn quat_to_euler(rotation: DQuat) -> DVec3 {
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
    DVec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}
