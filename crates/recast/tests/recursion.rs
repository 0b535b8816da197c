//! Self-referential and mutually recursive record graphs.
//!
//! Generation of these graphs breaks the cycle by falling back to the
//! general converter for the recursive fields, so the round trips here cover
//! both the specialized and the general paths at once.

use std::sync::Arc;

use recast::{ConvertError, Converter, RecordDef, StructureFn, TypeExpr, UnstructureFn, Value};

fn timestamp_to_int() -> UnstructureFn {
    Arc::new(|_conv: &Converter, value: &Value| match value.as_timestamp() {
        Some(micros) => Ok(Value::Int(micros)),
        None => Err(ConvertError::mismatch("timestamp", value)),
    })
}

fn int_to_timestamp() -> StructureFn {
    Arc::new(
        |_conv: &Converter, value: &Value, _ty: &TypeExpr| match value.as_int() {
            Some(micros) => Ok(Value::Timestamp(micros)),
            None => Err(ConvertError::mismatch("int", value)),
        },
    )
}

fn tree_converter() -> Converter {
    let conv = Converter::new();
    conv.register_record(
        RecordDef::builder("Node")
            .field("at", TypeExpr::Timestamp)
            .field("children", TypeExpr::list(TypeExpr::record("Node")))
            .optional_field("next", TypeExpr::optional(TypeExpr::record("Node")))
            .build(),
    )
    .unwrap();
    conv.register_unstructure_hook(TypeExpr::Timestamp, timestamp_to_int());
    conv.register_structure_hook(TypeExpr::Timestamp, int_to_timestamp());
    conv
}

fn node(at: i64, children: Vec<Value>) -> Value {
    Value::map_of([
        ("at", Value::Timestamp(at)),
        ("children", Value::List(children)),
        ("next", Value::Null),
    ])
}

#[test_log::test]
fn test_self_referential_record_round_trips() {
    let conv = tree_converter();
    let ty = TypeExpr::record("Node");
    let root = node(1, vec![node(2, vec![node(3, vec![])])]);

    let plain = conv.unstructure_as(&root, &ty).unwrap();
    let level1 = plain.as_map().unwrap()["children"].as_list().unwrap()[0]
        .as_map()
        .unwrap()
        .clone();
    assert_eq!(level1["at"], Value::Int(2));
    let level2 = level1["children"].as_list().unwrap()[0].as_map().unwrap().clone();
    assert_eq!(level2["at"], Value::Int(3));

    assert_eq!(conv.structure(&plain, &ty).unwrap(), root);
}

#[test_log::test]
fn test_mutually_recursive_records_round_trip() {
    let conv = Converter::new();
    conv.register_record(
        RecordDef::builder("Author")
            .field("name", TypeExpr::String)
            .field("joined", TypeExpr::Timestamp)
            .field("posts", TypeExpr::list(TypeExpr::record("Post")))
            .build(),
    )
    .unwrap();
    conv.register_record(
        RecordDef::builder("Post")
            .field("title", TypeExpr::String)
            .field("author", TypeExpr::optional(TypeExpr::record("Author")))
            .build(),
    )
    .unwrap();
    conv.register_unstructure_hook(TypeExpr::Timestamp, timestamp_to_int());
    conv.register_structure_hook(TypeExpr::Timestamp, int_to_timestamp());

    let ty = TypeExpr::record("Author");
    let author = Value::map_of([
        ("name", Value::from("ada")),
        ("joined", Value::Timestamp(42)),
        (
            "posts",
            Value::List(vec![Value::map_of([
                ("title", Value::from("hello")),
                ("author", Value::Null),
            ])]),
        ),
    ]);

    let plain = conv.unstructure_as(&author, &ty).unwrap();
    assert_eq!(plain.as_map().unwrap()["joined"], Value::Int(42));
    assert_eq!(conv.structure(&plain, &ty).unwrap(), author);
}

#[test_log::test]
fn test_generated_functions_are_cached() {
    let conv = tree_converter();
    let ty = TypeExpr::record("Node");

    let first = conv.dispatch_unstructure(&ty).unwrap();
    let second = conv.dispatch_unstructure(&ty).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let first = conv.dispatch_structure(&ty).unwrap();
    let second = conv.dispatch_structure(&ty).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
