//! Gathers every top-level joint of a scene under a single root joint.

use crate::{
    conversion::{NodeId, Scene},
    error::FileError,
};

/// The name of the root joint added to every processed scene.
pub const SYNTHETIC_ROOT_NAME: &str = "World";

/// The outcome of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// The synthetic root joint, used as the export selection.
    pub root: NodeId,
    /// The joints moved under the root, in discovery order.
    pub reparented: Vec<NodeId>,
}

/// Moves every joint without a parent under a new root joint named "World".
///
/// Joints are enumerated before the root is created, so the root never ends up in its own
/// list. Reparenting keeps world transforms. A scene that already has a "World" joint is left
/// untouched and reported as a naming collision.
pub fn normalize(scene: &mut Scene) -> Result<Normalized, FileError> {
    let joints: Vec<NodeId> = scene.joints().collect();

    if joints
        .iter()
        .any(|&joint| scene.nodes[joint].name == SYNTHETIC_ROOT_NAME)
    {
        return Err(FileError::NamingCollision(SYNTHETIC_ROOT_NAME.to_string()));
    }

    let rootless: Vec<NodeId> = joints
        .into_iter()
        .filter(|&joint| scene.nodes[joint].parent.is_none())
        .collect();

    let root = scene.create_joint(SYNTHETIC_ROOT_NAME);
    for &joint in &rootless {
        log::debug!(
            "Parenting \"{}\" under \"{}\"",
            scene.nodes[joint].name,
            SYNTHETIC_ROOT_NAME
        );
        // The root is fresh, so this only fails on a malformed imported hierarchy.
        scene
            .reparent(joint, Some(root))
            .map_err(FileError::Import)?;
    }

    Ok(Normalized {
        root,
        reparented: rootless,
    })
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use pretty_assertions::assert_eq;

    use crate::conversion::{Node, NodeKind, Transform};

    use super::*;

    fn node(id: i64, name: &str, kind: NodeKind, parent: Option<NodeId>) -> Node {
        Node {
            id,
            name: name.to_string(),
            kind,
            parent,
            transform: Transform {
                translation: DVec3::new(id as f64, 0.5, -1.),
                rotation: DVec3::new(0., 15. * id as f64, 0.),
                ..Transform::IDENTITY
            },
        }
    }

    fn scene() -> Scene {
        Scene {
            nodes: vec![
                node(10, "hip", NodeKind::Joint, None),
                node(11, "spine", NodeKind::Joint, Some(0)),
                node(12, "body", NodeKind::Mesh, None),
                node(13, "prop_root", NodeKind::Joint, None),
                node(14, "armature", NodeKind::Null, None),
                node(15, "tail", NodeKind::Joint, Some(4)),
            ],
            document: None,
        }
    }

    #[test]
    fn reparents_rootless_joints() {
        let mut scene = scene();
        let before = scene.clone();

        let normalized = normalize(&mut scene).unwrap();

        assert_eq!(vec![0, 3], normalized.reparented);
        assert_eq!(7, scene.nodes.len());
        assert_eq!(1, scene.joints().filter(|&j| scene.nodes[j].name == "World").count());

        let root = &scene.nodes[normalized.root];
        assert_eq!("World", root.name);
        assert_eq!(NodeKind::Joint, root.kind);
        assert_eq!(None, root.parent);
        assert_eq!(Transform::IDENTITY, root.transform);

        for (index, old) in before.nodes.iter().enumerate() {
            let expected = if normalized.reparented.contains(&index) {
                Some(normalized.root)
            } else {
                old.parent
            };
            assert_eq!(expected, scene.nodes[index].parent, "parent of {}", old.name);
        }
    }

    #[test]
    fn keeps_world_transforms() {
        let mut scene = scene();
        let before: Vec<_> = (0..scene.nodes.len())
            .map(|index| scene.world_matrix(index))
            .collect();

        normalize(&mut scene).unwrap();

        for (index, matrix) in before.iter().enumerate() {
            assert!(scene.world_matrix(index).abs_diff_eq(*matrix, 1e-9));
        }
    }

    #[test]
    fn collision_changes_nothing() {
        let mut scene = scene();
        scene.nodes[3].name = "World".to_string();
        let before = scene.clone();

        let result = normalize(&mut scene);

        assert!(matches!(result, Err(FileError::NamingCollision(name)) if name == "World"));
        assert_eq!(before.nodes, scene.nodes);
    }

    #[test]
    fn non_joint_named_world_is_not_a_collision() {
        let mut scene = scene();
        scene.nodes[2].name = "World".to_string();

        assert!(normalize(&mut scene).is_ok());
    }

    #[test]
    fn empty_scene_still_gets_a_root() {
        let mut scene = Scene::default();

        let normalized = normalize(&mut scene).unwrap();

        assert_eq!(Vec::<NodeId>::new(), normalized.reparented);
        assert_eq!(1, scene.nodes.len());
        assert_eq!("World", scene.nodes[normalized.root].name);
    }

    #[test]
    fn parented_joints_only() {
        let mut scene = Scene {
            nodes: vec![
                node(1, "armature", NodeKind::Null, None),
                node(2, "hip", NodeKind::Joint, Some(0)),
            ],
            document: None,
        };

        let normalized = normalize(&mut scene).unwrap();

        assert!(normalized.reparented.is_empty());
        assert_eq!(Some(0), scene.nodes[1].parent);
    }
}
