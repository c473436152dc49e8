use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use glam::DVec3;

use crate::{
    conversion::{Exporter, Node, NodeId, NodeKind, Scene, Transform},
    profile::{ExportProfile, UpAxis},
};

use super::{
    connections,
    internal::{class_name, Document, Property, Record},
    Connection,
};

#[derive(Default)]
pub struct FbxExporter {}

impl Exporter for FbxExporter {
    fn export(&self, scene: &Scene, selection: NodeId, profile: &ExportProfile) -> Result<Vec<u8>> {
        let mut document = match &scene.document {
            Some(document) => document.clone(),
            None => empty_document(),
        };

        let exported = exported_nodes(scene, selection, profile);
        let mut removed: HashSet<i64> = scene
            .nodes
            .iter()
            .zip(&exported)
            .filter(|(_, exported)| !**exported)
            .map(|(node, _)| node.id)
            .collect();
        if let Some(objects) = document.find("Objects") {
            removed.extend(
                objects
                    .children
                    .iter()
                    .filter(|record| !keep_object(record, profile))
                    .filter_map(Record::object_id),
            );
        }
        let removed = with_dependents(&document, removed);
        log::debug!("Leaving {} objects out of the export", removed.len());

        let mut next_id = scene.next_object_id();
        let mut links = Vec::new();
        let objects = document.find_or_insert("Objects");
        objects
            .children
            .retain(|record| record.object_id().map_or(true, |id| !removed.contains(&id)));

        let nodes: HashMap<i64, &Node> = scene.nodes.iter().map(|node| (node.id, node)).collect();
        let mut written = HashSet::new();
        for record in &mut objects.children {
            if !profile.embedded_textures && record.name == "Video" {
                record.children.retain(|child| child.name != "Content");
            }
            if record.name != "Model" {
                continue;
            }
            if let Some(node) = record.object_id().and_then(|id| nodes.get(&id)) {
                write_transform(record, &node.transform);
                written.insert(node.id);
            }
        }

        // Nodes created after the import, such as the synthetic root.
        let created = scene
            .nodes
            .iter()
            .zip(&exported)
            .filter(|(node, exported)| **exported && !written.contains(&node.id));
        for (node, _) in created {
            objects.children.push(model_record(node));
            if node.kind == NodeKind::Joint {
                objects.children.push(joint_attribute_record(next_id, node));
                links.push(Connection {
                    source: next_id,
                    destination: node.id,
                    property: None,
                });
                next_id += 1;
            }
        }

        links.extend(hierarchy(scene, &exported));
        rewrite_connections(&mut document, scene, &removed, links, profile);
        apply_settings(&mut document, profile);
        update_definitions(&mut document);

        document.to_bytes()
    }
}

/// Decides which scene nodes get exported: the selection and its descendants, plus nodes
/// outside of it whose whole parent chain is made of non-joint nodes the profile allows.
fn exported_nodes(scene: &Scene, selection: NodeId, profile: &ExportProfile) -> Vec<bool> {
    let selected: HashSet<NodeId> = scene.subtree(selection).into_iter().collect();
    let allowed = |node: &Node| match node.kind {
        NodeKind::Joint => false,
        NodeKind::Camera => profile.cameras,
        NodeKind::Light => profile.lights,
        _ => true,
    };

    (0..scene.nodes.len())
        .map(|index| {
            if selected.contains(&index) {
                return true;
            }

            let mut current = Some(index);
            while let Some(node) = current.map(|index| &scene.nodes[index]) {
                if !allowed(node) {
                    return false;
                }
                current = node.parent;
            }
            true
        })
        .collect()
}

/// Returns whether the profile keeps a record of the `Objects` section.
fn keep_object(record: &Record, profile: &ExportProfile) -> bool {
    match (record.name.as_str(), record.object_kind().unwrap_or_default()) {
        ("Constraint", _) => profile.constraints,
        ("Deformer", "Skin" | "Cluster") => profile.skins,
        ("Deformer", "BlendShape" | "BlendShapeChannel") | ("Geometry", "Shape") => {
            profile.shapes
        }
        _ => true,
    }
}

/// Extends a set of removed objects with the objects that depend on them: those bound to a
/// property of a removed object, and those whose every destination is removed. Models are
/// never removed this way.
fn with_dependents(document: &Document, mut removed: HashSet<i64>) -> HashSet<i64> {
    let connections: Vec<Connection> = connections(document).collect();
    let candidates: Vec<i64> = document
        .find("Objects")
        .into_iter()
        .flat_map(|objects| &objects.children)
        .filter(|record| record.name != "Model")
        .filter_map(Record::object_id)
        .collect();

    loop {
        let mut changed = false;
        for &id in &candidates {
            if removed.contains(&id) {
                continue;
            }

            let destinations: Vec<&Connection> = connections
                .iter()
                .filter(|c| c.source == id && c.destination != 0)
                .collect();
            if destinations.is_empty() {
                continue;
            }

            let bound_to_removed = destinations
                .iter()
                .any(|c| c.property.is_some() && removed.contains(&c.destination));
            let orphaned = destinations
                .iter()
                .all(|c| removed.contains(&c.destination));
            if bound_to_removed || orphaned {
                removed.insert(id);
                changed = true;
            }
        }

        if !changed {
            return removed;
        }
    }
}

/// Returns the parent links of every exported node. Nodes whose parent isn't exported are
/// linked to the scene root.
fn hierarchy<'a>(scene: &'a Scene, exported: &'a [bool]) -> impl Iterator<Item = Connection> + 'a {
    scene
        .nodes
        .iter()
        .enumerate()
        .filter(|&(index, _)| exported[index])
        .map(|(_, node)| Connection {
            source: node.id,
            destination: node
                .parent
                .filter(|&parent| exported[parent])
                .map_or(0, |parent| scene.nodes[parent].id),
            property: None,
        })
}

/// Drops the connections of removed objects and the old model hierarchy, then appends the
/// given links.
fn rewrite_connections(
    document: &mut Document,
    scene: &Scene,
    removed: &HashSet<i64>,
    links: Vec<Connection>,
    profile: &ExportProfile,
) {
    let models: HashSet<i64> = scene.nodes.iter().map(|node| node.id).collect();
    let is_model_link = |c: &Connection| {
        c.property.is_none()
            && models.contains(&c.source)
            && (c.destination == 0 || models.contains(&c.destination))
    };

    let connections = document.find_or_insert("Connections");
    connections
        .children
        .retain(|record| match Connection::parse(record) {
            Some(c) => {
                !removed.contains(&c.source)
                    && !removed.contains(&c.destination)
                    && !is_model_link(&c)
                    && (profile.input_connections || c.property.is_none())
            }
            None => true,
        });
    connections
        .children
        .extend(links.iter().map(Connection::to_record));
}

fn apply_settings(document: &mut Document, profile: &ExportProfile) {
    let version = profile.file_version.binary_version();
    document.version = version;
    if let Some(header) = document.find_mut("FBXHeaderExtension") {
        if let Some(record) = header.find_mut("FBXVersion") {
            record.properties = vec![Property::I32(version as i32)];
        }
    }

    let (up, front, front_sign) = match profile.up_axis {
        UpAxis::Y => (1, 2, 1),
        UpAxis::Z => (2, 1, -1),
    };
    let settings = document.find_or_insert("GlobalSettings");
    for (name, value) in [
        ("UpAxis", up),
        ("UpAxisSign", 1),
        ("FrontAxis", front),
        ("FrontAxisSign", front_sign),
        ("CoordAxis", 0),
        ("CoordAxisSign", 1),
    ] {
        settings.set_property70(vec![
            Property::string(name),
            Property::string("int"),
            Property::string("Integer"),
            Property::string(""),
            Property::I32(value),
        ]);
    }
}

/// Recounts the objects of each class in the `Definitions` section.
fn update_definitions(document: &mut Document) {
    let mut counts: BTreeMap<String, i32> = BTreeMap::new();
    for record in document
        .find("Objects")
        .into_iter()
        .flat_map(|objects| &objects.children)
    {
        *counts.entry(record.name.clone()).or_default() += 1;
    }
    if document.find("GlobalSettings").is_some() {
        counts.insert(String::from("GlobalSettings"), 1);
    }

    let definitions = document.find_or_insert("Definitions");
    let mut total = 0;
    for object_type in definitions
        .children
        .iter_mut()
        .filter(|child| child.name == "ObjectType")
    {
        let class = object_type
            .properties
            .first()
            .and_then(Property::as_str)
            .unwrap_or_default();
        let count = counts.remove(class).unwrap_or(0);
        set_count(object_type, count);
        total += count;
    }
    for (class, count) in counts {
        let mut object_type = Record::new("ObjectType", vec![Property::String(class)], Vec::new());
        set_count(&mut object_type, count);
        definitions.children.push(object_type);
        total += count;
    }
    set_count(definitions, total);
}

fn set_count(record: &mut Record, count: i32) {
    match record.find_mut("Count") {
        Some(child) => child.properties = vec![Property::I32(count)],
        None => record
            .children
            .push(Record::new("Count", vec![Property::I32(count)], Vec::new())),
    }
}

/// Writes the local transform into the `Lcl` entries of a model. Existing entries only get
/// their values replaced, and only when they changed; their type, label and flags (e.g. "A+"
/// for animated properties) stay. Missing entries are only added for non-default values.
fn write_transform(record: &mut Record, transform: &Transform) {
    for (name, value, default) in [
        ("Lcl Translation", transform.translation, DVec3::ZERO),
        ("Lcl Rotation", transform.rotation, DVec3::ZERO),
        ("Lcl Scaling", transform.scale, DVec3::ONE),
    ] {
        let values = [
            Property::F64(value.x),
            Property::F64(value.y),
            Property::F64(value.z),
        ];
        match record.property70_mut(name) {
            Some(entry) => {
                let current: Vec<f64> = entry
                    .properties
                    .iter()
                    .skip(4)
                    .filter_map(Property::as_f64)
                    .collect();
                if current != [value.x, value.y, value.z] {
                    entry.properties.truncate(4);
                    entry.properties.extend(values);
                }
            }
            None if value != default => {
                let mut entry = vec![
                    Property::string(name),
                    Property::string(name),
                    Property::string(""),
                    Property::string("A"),
                ];
                entry.extend(values);
                record.set_property70(entry);
            }
            None => {}
        }
    }
}

fn model_record(node: &Node) -> Record {
    let mut record = Record::new(
        "Model",
        vec![
            Property::I64(node.id),
            Property::String(class_name(&node.name, "Model")),
            Property::string(node.kind.to_fbx()),
        ],
        vec![
            Record::new("Version", vec![Property::I32(232)], Vec::new()),
            Record::new("Properties70", Vec::new(), Vec::new()),
            Record::new("Shading", vec![Property::Bool(true)], Vec::new()),
            Record::new("Culling", vec![Property::string("CullingOff")], Vec::new()),
        ],
    );
    write_transform(&mut record, &node.transform);

    record
}

fn joint_attribute_record(id: i64, node: &Node) -> Record {
    Record::new(
        "NodeAttribute",
        vec![
            Property::I64(id),
            Property::String(class_name(&node.name, "NodeAttribute")),
            Property::string("LimbNode"),
        ],
        vec![Record::new(
            "TypeFlags",
            vec![Property::string("Skeleton")],
            Vec::new(),
        )],
    )
}

/// The skeleton of a document for scenes that weren't imported from a file.
fn empty_document() -> Document {
    let mut document = Document::new(0);
    document.records = vec![
        Record::new(
            "FBXHeaderExtension",
            Vec::new(),
            vec![
                Record::new("FBXHeaderVersion", vec![Property::I32(1003)], Vec::new()),
                Record::new("FBXVersion", vec![Property::I32(0)], Vec::new()),
            ],
        ),
        Record::new(
            "GlobalSettings",
            Vec::new(),
            vec![Record::new("Version", vec![Property::I32(1000)], Vec::new())],
        ),
        Record::new(
            "Definitions",
            Vec::new(),
            vec![Record::new("Version", vec![Property::I32(100)], Vec::new())],
        ),
        Record::new("Objects", Vec::new(), Vec::new()),
        Record::new("Connections", Vec::new(), Vec::new()),
    ];

    document
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        conversion::{Asset, Importer},
        format::fbx::{fixture, FbxImporter},
        normalize::normalize,
        profile::FileVersion,
    };

    use super::*;

    fn profile() -> ExportProfile {
        ExportProfile::new(FileVersion::parse("FBX201900").unwrap())
    }

    fn import(document: &Document) -> Scene {
        let mut scene = Scene::default();
        let asset = Asset::new(document.to_bytes().unwrap(), "a.fbx");
        FbxImporter::default().import(&asset, &mut scene).unwrap();
        scene
    }

    fn export(scene: &Scene, selection: NodeId, profile: &ExportProfile) -> Document {
        let bytes = FbxExporter::default()
            .export(scene, selection, profile)
            .unwrap();
        Document::from_bytes(&bytes).unwrap()
    }

    fn object_names(document: &Document, record_name: &str) -> Vec<String> {
        document
            .find("Objects")
            .unwrap()
            .children
            .iter()
            .filter(|r| r.name == record_name)
            .map(|r| r.object_name().unwrap_or_default().to_string())
            .collect()
    }

    fn count(document: &Document, class: &str) -> Option<i64> {
        document
            .find("Definitions")?
            .children
            .iter()
            .find(|r| r.name == "ObjectType" && r.properties[0].as_str() == Some(class))?
            .find("Count")?
            .properties[0]
            .as_i64()
    }

    #[test]
    fn normalized_skeleton() {
        let mut scene = import(&fixture::skeleton(&[
            ("hip", None),
            ("spine", Some(0)),
            ("head", Some(1)),
        ]));
        let normalized = normalize(&mut scene).unwrap();

        let document = export(&scene, normalized.root, &profile());
        let reimported = import(&document);

        let names: Vec<_> = reimported.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(vec!["hip", "spine", "head", "World"], names);
        let parents: Vec<_> = reimported.nodes.iter().map(|n| n.parent).collect();
        assert_eq!(vec![Some(3), Some(0), Some(1), None], parents);
        assert_eq!(NodeKind::Joint, reimported.nodes[3].kind);
        assert_eq!(DVec3::new(0., 1., 0.), reimported.nodes[0].transform.translation);
        assert_eq!(Transform::IDENTITY, reimported.nodes[3].transform);

        assert_eq!(
            vec!["hip", "spine", "head", "World"],
            object_names(&document, "NodeAttribute")
        );
        assert_eq!(Some(4), count(&document, "Model"));
        assert_eq!(Some(4), count(&document, "NodeAttribute"));
    }

    #[test]
    fn transform_entries_keep_their_flags() {
        let mut document = fixture::skeleton(&[("hip", None), ("spine", Some(0))]);
        let objects = document.find_mut("Objects").unwrap();
        for model in objects.children.iter_mut().filter(|r| r.name == "Model") {
            let entry = model.property70_mut("Lcl Translation").unwrap();
            entry.properties[3] = Property::string("A+");
        }
        let mut scene = import(&document);
        // Moves the spine, so only the hip keeps its imported values.
        scene.nodes[1].transform.translation = DVec3::new(0., 5., 0.);
        let normalized = normalize(&mut scene).unwrap();

        let exported = export(&scene, normalized.root, &profile());

        let entries: Vec<_> = exported
            .find("Objects")
            .unwrap()
            .children
            .iter()
            .filter_map(|r| r.property70("Lcl Translation"))
            .map(|p| p.properties.clone())
            .collect();
        let flags: Vec<_> = entries.iter().map(|p| p[3].as_str()).collect();
        assert_eq!(vec![Some("A+"), Some("A+")], flags);
        assert_eq!(
            vec![Some(0.), Some(5.), Some(0.)],
            entries[1][4..].iter().map(Property::as_f64).collect::<Vec<_>>()
        );
        assert_eq!(
            vec![Some(0.), Some(1.), Some(0.)],
            entries[0][4..].iter().map(Property::as_f64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn settings() {
        let mut scene = import(&fixture::skeleton(&[("hip", None)]));
        let normalized = normalize(&mut scene).unwrap();

        let document = export(&scene, normalized.root, &profile());

        assert_eq!(7700, document.version);
        let version = document
            .find("FBXHeaderExtension")
            .and_then(|r| r.find("FBXVersion"))
            .unwrap();
        assert_eq!(Some(7700), version.properties[0].as_i64());

        let settings = document.find("GlobalSettings").unwrap();
        let setting = |name| settings.property70(name).unwrap().properties[4].as_i64();
        assert_eq!(Some(1), setting("UpAxis"));
        assert_eq!(Some(2), setting("FrontAxis"));
        assert_eq!(Some(0), setting("CoordAxis"));
    }

    #[test]
    fn narrow_versions() {
        let mut scene = import(&fixture::skeleton(&[("hip", None)]));
        let normalized = normalize(&mut scene).unwrap();
        let profile = ExportProfile::new(FileVersion::parse("FBX201400").unwrap());

        let document = export(&scene, normalized.root, &profile);

        assert_eq!(7400, document.version);
        assert_eq!(2, import(&document).nodes.len());
    }

    #[test]
    fn constraints_are_dropped() {
        let mut document = fixture::skeleton(&[("hip", None)]);
        fixture::add_object(
            &mut document,
            Record::new(
                "Constraint",
                vec![
                    Property::I64(70),
                    Property::String(class_name("aim", "Constraint")),
                    Property::string("Aim"),
                ],
                Vec::new(),
            ),
        );
        fixture::connect(&mut document, 70, fixture::model_id(0), None);
        let mut scene = import(&document);
        let normalized = normalize(&mut scene).unwrap();

        let document = export(&scene, normalized.root, &profile());

        assert!(object_names(&document, "Constraint").is_empty());
        let dangling = document
            .find("Connections")
            .unwrap()
            .children
            .iter()
            .any(|c| c.properties[1].as_i64() == Some(70));
        assert!(!dangling);
    }

    #[test]
    fn cameras_follow_the_profile() {
        let mut document = fixture::skeleton(&[("hip", None)]);
        fixture::add_model(&mut document, 80, "cam", "Camera", 0);
        fixture::add_object(
            &mut document,
            Record::new(
                "NodeAttribute",
                vec![
                    Property::I64(81),
                    Property::String(class_name("cam", "NodeAttribute")),
                    Property::string("Camera"),
                ],
                Vec::new(),
            ),
        );
        fixture::connect(&mut document, 81, 80, None);
        let mut scene = import(&document);
        let normalized = normalize(&mut scene).unwrap();

        let kept = export(&scene, normalized.root, &profile());
        assert_eq!(vec!["hip", "cam", "World"], object_names(&kept, "Model"));

        let mut without_cameras = profile();
        without_cameras.cameras = false;
        let dropped = export(&scene, normalized.root, &without_cameras);
        assert_eq!(vec!["hip", "World"], object_names(&dropped, "Model"));
        assert_eq!(vec!["hip", "World"], object_names(&dropped, "NodeAttribute"));
    }

    #[test]
    fn joints_outside_the_selection_are_dropped() {
        let mut scene = import(&fixture::skeleton(&[("hip", None), ("spine", Some(0))]));
        scene.create_joint("other_root");
        let normalized = normalize(&mut scene).unwrap();
        let hip_only = import(&fixture::skeleton(&[("hip", None), ("spine", Some(0))]));

        let document = export(&hip_only, 0, &profile());
        assert_eq!(vec!["hip", "spine"], object_names(&document, "Model"));

        let document = export(&scene, normalized.root, &profile());
        assert_eq!(
            vec!["hip", "spine", "other_root", "World"],
            object_names(&document, "Model")
        );
    }

    #[test]
    fn input_connections_off_drops_property_links() {
        let mut document = fixture::skeleton(&[("hip", None)]);
        fixture::add_object(
            &mut document,
            Record::new(
                "AnimationCurveNode",
                vec![
                    Property::I64(90),
                    Property::String(class_name("T", "AnimCurveNode")),
                    Property::string(""),
                ],
                Vec::new(),
            ),
        );
        fixture::connect(&mut document, 90, fixture::model_id(0), Some("Lcl Translation"));
        let mut scene = import(&document);
        let normalized = normalize(&mut scene).unwrap();
        let has_property_link = |document: &Document| {
            document
                .find("Connections")
                .unwrap()
                .children
                .iter()
                .any(|c| c.properties[0].as_str() == Some("OP"))
        };

        assert!(has_property_link(&export(&scene, normalized.root, &profile())));

        let mut without_inputs = profile();
        without_inputs.input_connections = false;
        assert!(!has_property_link(&export(
            &scene,
            normalized.root,
            &without_inputs
        )));
    }

    #[test]
    fn empty_scene() {
        let mut scene = Scene::default();
        let normalized = normalize(&mut scene).unwrap();

        let document = export(&scene, normalized.root, &profile());

        assert_eq!(vec!["World"], object_names(&document, "Model"));
        assert_eq!(Some(1), count(&document, "Model"));
    }
}
