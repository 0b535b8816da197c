//! End-to-end conversion through the public converter API.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use recast::{
    ConvertError, Converter, GenerateError, RecordDef, StructureFn, TypeExpr, UnstructureFn, Value,
};

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

/// An `Event` record whose `at` field needs a wire conversion in both
/// directions, next to fields that pass through untouched.
fn event_converter() -> Converter {
    let conv = Converter::new();
    conv.register_record(
        RecordDef::builder("Event")
            .field("name", TypeExpr::String)
            .field("at", TypeExpr::Timestamp)
            .optional_field("note", TypeExpr::String)
            .build(),
    )
    .unwrap();
    conv.register_unstructure_hook(TypeExpr::Timestamp, timestamp_to_int());
    conv.register_structure_hook(TypeExpr::Timestamp, int_to_timestamp());
    conv
}

fn sample_event() -> Value {
    Value::map_of([
        ("name", Value::from("deploy")),
        ("at", Value::Timestamp(1_700_000_000_000_000)),
        ("note", Value::from("went fine")),
    ])
}

#[test]
fn test_round_trip_event() {
    let conv = event_converter();
    let ty = TypeExpr::record("Event");
    let original = sample_event();

    let plain = conv.unstructure_as(&original, &ty).unwrap();
    let back = conv.structure(&plain, &ty).unwrap();

    assert_eq!(back, original);
}

#[test]
fn test_unstructure_converts_only_non_identity_fields() {
    let conv = event_converter();
    let plain = conv
        .unstructure_as(&sample_event(), &TypeExpr::record("Event"))
        .unwrap();

    let map = plain.as_map().unwrap();
    assert_eq!(map["name"], Value::from("deploy"));
    assert_eq!(map["at"], Value::Int(1_700_000_000_000_000));
    assert_eq!(map["note"], Value::from("went fine"));

    // Converted in place: the field keeps its position in the mapping.
    let keys: Vec<_> = map.keys().map(String::as_str).collect();
    assert_eq!(keys, ["name", "at", "note"]);
}

#[test]
fn test_all_identity_record_unstructures_unchanged() {
    let conv = Converter::new();
    conv.register_record(
        RecordDef::builder("Plain")
            .field("id", TypeExpr::Int)
            .field("label", TypeExpr::String)
            .optional_field("score", TypeExpr::Float)
            .build(),
    )
    .unwrap();

    let ty = TypeExpr::record("Plain");
    let handler = conv.dispatch_unstructure(&ty).unwrap();
    assert!(conv.is_identity(&handler));

    let input = Value::map_of([("id", Value::Int(7)), ("label", Value::from("x"))]);
    assert_eq!(conv.unstructure_as(&input, &ty).unwrap(), input);
}

#[test]
fn test_extra_keys_pass_through_unstructure() {
    let conv = event_converter();
    let mut input = sample_event().as_map().unwrap().clone();
    input.insert("trace_id".to_string(), Value::from("abc-123"));

    let plain = conv
        .unstructure_as(&Value::Map(input), &TypeExpr::record("Event"))
        .unwrap();
    assert_eq!(plain.as_map().unwrap()["trace_id"], Value::from("abc-123"));
}

#[test]
fn test_extra_keys_pass_through_structure() {
    let conv = event_converter();
    let plain = Value::map_of([
        ("name", Value::from("deploy")),
        ("at", Value::Int(12)),
        ("trace_id", Value::from("abc-123")),
    ]);

    let back = conv.structure(&plain, &TypeExpr::record("Event")).unwrap();
    let map = back.as_map().unwrap();
    assert_eq!(map["at"], Value::Timestamp(12));
    assert_eq!(map["trace_id"], Value::from("abc-123"));
}

#[test]
fn test_missing_required_key_fails_unstructure() {
    let conv = event_converter();
    let input = Value::map_of([("name", Value::from("deploy"))]);

    let err = conv
        .unstructure_as(&input, &TypeExpr::record("Event"))
        .unwrap_err();
    assert_eq!(err.to_string(), "Missing key: at");
}

#[test]
fn test_missing_optional_key_is_skipped() {
    let conv = event_converter();
    let ty = TypeExpr::record("Event");
    let input = Value::map_of([("name", Value::from("deploy")), ("at", Value::Timestamp(5))]);

    let plain = conv.unstructure_as(&input, &ty).unwrap();
    assert!(!plain.as_map().unwrap().contains_key("note"));

    let back = conv.structure(&plain, &ty).unwrap();
    assert_eq!(back, input);
}

#[test]
fn test_structure_type_checks_fields() {
    let conv = event_converter();
    let plain = Value::map_of([("name", Value::Int(5)), ("at", Value::Int(0))]);

    let err = conv.structure(&plain, &TypeExpr::record("Event")).unwrap_err();
    match err {
        ConvertError::Validation { message, errors } => {
            assert_eq!(message, "While structuring Event");
            assert_eq!(errors.len(), 1);
            assert_eq!(
                errors[0].to_string(),
                "Structuring record Event @ field name"
            );
        }
        other => panic!("expected a validation error, got {other}"),
    }
}

#[test]
fn test_structure_rejects_non_map_input() {
    let conv = event_converter();
    let err = conv
        .structure(&Value::Int(3), &TypeExpr::record("Event"))
        .unwrap_err();
    assert_eq!(err.to_string(), "Type mismatch: expected map, got int");
}

#[test]
fn test_nested_record_fields_convert_recursively() {
    let conv = event_converter();
    conv.register_record(
        RecordDef::builder("Span")
            .field("start", TypeExpr::Timestamp)
            .field("end", TypeExpr::Timestamp)
            .build(),
    )
    .unwrap();
    conv.register_record(
        RecordDef::builder("Job")
            .field("id", TypeExpr::Int)
            .field("span", TypeExpr::record("Span"))
            .build(),
    )
    .unwrap();

    let ty = TypeExpr::record("Job");
    let original = Value::map_of([
        ("id", Value::Int(1)),
        (
            "span",
            Value::map_of([("start", Value::Timestamp(10)), ("end", Value::Timestamp(20))]),
        ),
    ]);

    let plain = conv.unstructure_as(&original, &ty).unwrap();
    let span = plain.as_map().unwrap()["span"].as_map().unwrap().clone();
    assert_eq!(span["start"], Value::Int(10));
    assert_eq!(span["end"], Value::Int(20));

    assert_eq!(conv.structure(&plain, &ty).unwrap(), original);
}

#[test]
fn test_list_of_records_round_trips() {
    let conv = event_converter();
    conv.register_record(
        RecordDef::builder("Batch")
            .field("events", TypeExpr::list(TypeExpr::record("Event")))
            .build(),
    )
    .unwrap();

    let ty = TypeExpr::record("Batch");
    let original = Value::map_of([(
        "events",
        Value::List(vec![
            Value::map_of([("name", Value::from("a")), ("at", Value::Timestamp(1))]),
            Value::map_of([("name", Value::from("b")), ("at", Value::Timestamp(2))]),
        ]),
    )]);

    let plain = conv.unstructure_as(&original, &ty).unwrap();
    let events = plain.as_map().unwrap()["events"].as_list().unwrap();
    assert_eq!(events[1].as_map().unwrap()["at"], Value::Int(2));

    assert_eq!(conv.structure(&plain, &ty).unwrap(), original);
}

#[test]
fn test_unknown_record_name_fails_dispatch() {
    let conv = Converter::new();
    let err = conv
        .unstructure_as(&Value::map_of([("x", Value::Int(1))]), &TypeExpr::record("Ghost"))
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown record type: Ghost");
    assert!(matches!(
        err,
        ConvertError::Generate(GenerateError::UnknownRecord(_))
    ));
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let conv = event_converter();
    let err = conv
        .register_record(RecordDef::builder("Event").build())
        .unwrap_err();
    assert_eq!(err, GenerateError::AlreadyDefined("Event".into()));
}

#[test]
fn test_hook_registration_invalidates_derived_handlers() {
    let conv = Converter::new();
    conv.register_record(
        RecordDef::builder("Stamp")
            .field("at", TypeExpr::Timestamp)
            .build(),
    )
    .unwrap();

    let ty = TypeExpr::record("Stamp");
    let before = conv.dispatch_unstructure(&ty).unwrap();
    assert!(conv.is_identity(&before));

    conv.register_unstructure_hook(TypeExpr::Timestamp, timestamp_to_int());
    let after = conv.dispatch_unstructure(&ty).unwrap();
    assert!(!conv.is_identity(&after));

    let out = after(&conv, &Value::map_of([("at", Value::Timestamp(4))])).unwrap();
    assert_eq!(out, Value::map_of([("at", Value::Int(4))]));
}

#[test]
fn test_base_fields_merge_into_the_subclass() {
    let conv = event_converter();
    conv.register_record(
        RecordDef::builder("Stamped")
            .field("id", TypeExpr::Int)
            .field("created", TypeExpr::Timestamp)
            .build(),
    )
    .unwrap();
    conv.register_record(
        RecordDef::builder("Audit")
            .base(TypeExpr::record("Stamped"))
            .field("who", TypeExpr::String)
            .build(),
    )
    .unwrap();

    let ty = TypeExpr::record("Audit");
    let original = Value::map_of([
        ("id", Value::Int(9)),
        ("created", Value::Timestamp(77)),
        ("who", Value::from("ada")),
    ]);

    let plain = conv.unstructure_as(&original, &ty).unwrap();
    let map = plain.as_map().unwrap();
    assert_eq!(map["created"], Value::Int(77));

    // Base fields come first, own fields after, conversion in place.
    let keys: Vec<_> = map.keys().map(String::as_str).collect();
    assert_eq!(keys, ["id", "created", "who"]);

    assert_eq!(conv.structure(&plain, &ty).unwrap(), original);
}
