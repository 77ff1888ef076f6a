//! serde integration tests, run through serde_json.

use serde_json::json;
use small::String;

/// Test: serializes as a plain JSON string on both representations
#[test]
fn test_serialize_as_string() {
    let inline = String::from("inline");
    let heap = String::from("this one is long enough to spill over");

    assert_eq!(serde_json::to_string(&inline).unwrap(), "\"inline\"");
    assert_eq!(
        serde_json::to_value(&heap).unwrap(),
        json!("this one is long enough to spill over")
    );
}

/// Test: deserializes from JSON, short values land inline
#[test]
fn test_deserialize_from_json() {
    let short: String = serde_json::from_str("\"short\"").expect("deserialize");
    assert_eq!(short, "short");
    assert!(!short.overflowed());

    let escaped: String = serde_json::from_str(r#""line\nbreak""#).expect("deserialize");
    assert_eq!(escaped, "line\nbreak");
}

/// Test: non-string input is rejected with a type error
#[test]
fn test_deserialize_rejects_numbers() {
    let err = serde_json::from_str::<String>("42").unwrap_err();
    assert!(err.to_string().contains("a string"), "unexpected error: {err}");
}

/// Test: works as a field type inside derived structs
#[test]
fn test_nested_in_struct() {
    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct Record {
        name: String,
        tags: Vec<String>,
    }

    let record = Record {
        name: String::from("matrix"),
        tags: vec![String::from("std"), String::from("no_std")],
    };

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value, json!({ "name": "matrix", "tags": ["std", "no_std"] }));

    let back: Record = serde_json::from_value(value).unwrap();
    assert_eq!(back, record);
}
