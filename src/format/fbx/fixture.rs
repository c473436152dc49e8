//! Builders for small FBX documents used by the tests.

use super::{
    internal::{class_name, Document, Property, Record},
    Connection,
};

pub(crate) fn model_id(index: usize) -> i64 {
    1000 + index as i64
}

fn attribute_id(index: usize) -> i64 {
    2000 + index as i64
}

/// Builds a document with one joint per entry. Each entry holds the joint name and the index
/// of its parent joint. Joint `i` sits at (0, i + 1, 0) relative to its parent.
pub(crate) fn skeleton(joints: &[(&str, Option<usize>)]) -> Document {
    let mut document = Document::new(7400);
    document.records = vec![
        Record::new(
            "FBXHeaderExtension",
            Vec::new(),
            vec![
                Record::new("FBXHeaderVersion", vec![Property::I32(1003)], Vec::new()),
                Record::new("FBXVersion", vec![Property::I32(7400)], Vec::new()),
            ],
        ),
        Record::new(
            "GlobalSettings",
            Vec::new(),
            vec![
                Record::new("Version", vec![Property::I32(1000)], Vec::new()),
                Record::new(
                    "Properties70",
                    Vec::new(),
                    vec![Record::new(
                        "P",
                        vec![
                            Property::string("UpAxis"),
                            Property::string("int"),
                            Property::string("Integer"),
                            Property::string(""),
                            Property::I32(2),
                        ],
                        Vec::new(),
                    )],
                ),
            ],
        ),
        Record::new(
            "Definitions",
            Vec::new(),
            vec![
                Record::new("Version", vec![Property::I32(100)], Vec::new()),
                Record::new("Count", vec![Property::I32(0)], Vec::new()),
                Record::new(
                    "ObjectType",
                    vec![Property::string("Model")],
                    vec![Record::new("Count", vec![Property::I32(0)], Vec::new())],
                ),
            ],
        ),
        Record::new("Objects", Vec::new(), Vec::new()),
        Record::new("Connections", Vec::new(), Vec::new()),
    ];

    for (index, &(name, parent)) in joints.iter().enumerate() {
        let parent = parent.map_or(0, model_id);
        add_model(&mut document, model_id(index), name, "LimbNode", parent);

        let objects = document.find_or_insert("Objects");
        let model = objects.children.last_mut().unwrap();
        model.set_property70(vec![
            Property::string("Lcl Translation"),
            Property::string("Lcl Translation"),
            Property::string(""),
            Property::string("A"),
            Property::F64(0.),
            Property::F64(index as f64 + 1.),
            Property::F64(0.),
        ]);

        add_object(
            &mut document,
            Record::new(
                "NodeAttribute",
                vec![
                    Property::I64(attribute_id(index)),
                    Property::string(&class_name(name, "NodeAttribute")),
                    Property::string("LimbNode"),
                ],
                vec![Record::new("TypeFlags", vec![Property::string("Skeleton")], Vec::new())],
            ),
        );
        connect(&mut document, attribute_id(index), model_id(index), None);
    }

    document
}

pub(crate) fn add_object(document: &mut Document, record: Record) {
    document.find_or_insert("Objects").children.push(record);
}

/// Adds a model of the given kind, linked to `parent` (0 for the scene root).
pub(crate) fn add_model(document: &mut Document, id: i64, name: &str, kind: &str, parent: i64) {
    add_object(
        document,
        Record::new(
            "Model",
            vec![
                Property::I64(id),
                Property::string(&class_name(name, "Model")),
                Property::string(kind),
            ],
            vec![Record::new("Version", vec![Property::I32(232)], Vec::new())],
        ),
    );
    connect(document, id, parent, None);
}

pub(crate) fn connect(
    document: &mut Document,
    source: i64,
    destination: i64,
    property: Option<&str>,
) {
    let connection = Connection {
        source,
        destination,
        property: property.map(str::to_string),
    };
    document
        .find_or_insert("Connections")
        .children
        .push(connection.to_record());
}
