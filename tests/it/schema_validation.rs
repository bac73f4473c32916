use persistence_core::schema::FunctionMap;
use persistence_core::validator::{Code, Validator};
use persistence_core::value::Value;

use crate::support::{document, union_schema, user_schema};

#[test]
fn strict_validate_success_test() {
    let schema = user_schema();
    let functions = FunctionMap::new();
    let validator = Validator::new(&schema, &functions);

    let data = document(&[("id", Value::String("u1".into())), ("age", Value::Number(33.into()))]);
    let (ok, issues) = validator.validate(&data, false);
    assert!(ok);
    assert!(issues.is_empty());
}

#[test]
fn coercion_test() {
    let schema = user_schema();
    let functions = FunctionMap::new();
    let validator = Validator::new(&schema, &functions);

    let coercible = document(&[("id", Value::String("u1".into())), ("age", Value::String("33".into()))]);
    let (ok, issues) = validator.validate(&coercible, false);
    assert!(ok, "issues: {issues:?}");

    let non_roundtripping = document(&[("id", Value::String("u1".into())), ("age", Value::String("007".into()))]);
    let (ok, issues) = validator.validate(&non_roundtripping, false);
    assert!(!ok);
    assert!(issues
        .iter()
        .any(|issue| issue.code == Code::TypeMismatch.as_str() && issue.path == "age"));
}

#[test]
fn unexpected_field_test() {
    let schema = user_schema();
    let functions = FunctionMap::new();
    let validator = Validator::new(&schema, &functions);

    let data = document(&[
        ("id", Value::String("u1".into())),
        ("age", Value::Number(33.into())),
        ("extra", Value::Number(1.into())),
    ]);
    let (ok, issues) = validator.validate(&data, false);
    assert!(!ok);
    assert!(issues
        .iter()
        .any(|issue| issue.code == Code::UnexpectedField.as_str() && issue.path == "extra"));
}

#[test]
fn union_match_test() {
    let schema = union_schema();
    let functions = FunctionMap::new();
    let validator = Validator::new(&schema, &functions);

    let mut payload_b = persistence_core::value::Document::new();
    payload_b.insert("kind".to_string(), Value::String("b".into()));
    payload_b.insert("y".to_string(), Value::String("hi".into()));
    let matching = document(&[("payload", Value::Mapping(payload_b))]);
    let (ok, issues) = validator.validate(&matching, false);
    assert!(ok, "issues: {issues:?}");

    let mut payload_c = persistence_core::value::Document::new();
    payload_c.insert("kind".to_string(), Value::String("c".into()));
    let non_matching = document(&[("payload", Value::Mapping(payload_c))]);
    let (ok, issues) = validator.validate(&non_matching, false);
    assert!(!ok);
    assert!(issues.iter().any(|issue| issue.code == Code::UnionNoMatch.as_str()));
}
