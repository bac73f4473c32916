//! The constraint-driven validator (component B): coercion, type checks,
//! constraint tree evaluation, and nested/conditional/union descent.

use std::collections::HashMap;

use crate::schema::{
    ConstraintRule, FieldDefinition, FieldType, FunctionMap, GroupOperator, NestedSchema,
    SchemaDefinition, StructuredSchema,
};
use crate::util::{self, Pointer};
use crate::value::{Document, Value};

use super::issue::{Code, Issue};

pub struct Validator<'a> {
    schema: &'a SchemaDefinition,
    functions: &'a FunctionMap,
    strict_unknown_fields: bool,
}

impl<'a> Validator<'a> {
    /// Uses `strict_unknown_fields` from [`crate::config::settings`] (spec
    /// §4.1 step 2; strict by default, overridable via `with_options`).
    pub fn new(schema: &'a SchemaDefinition, functions: &'a FunctionMap) -> Self {
        Self::with_options(schema, functions, crate::config::settings().strict_unknown_fields)
    }

    pub fn with_options(
        schema: &'a SchemaDefinition,
        functions: &'a FunctionMap,
        strict_unknown_fields: bool,
    ) -> Self {
        Self {
            schema,
            functions,
            strict_unknown_fields,
        }
    }

    /// `loose=true` suppresses `REQUIRED_FIELD_MISSING` (partial updates).
    pub fn validate(&self, data: &Document, loose: bool) -> (bool, Vec<Issue>) {
        let mut issues = Vec::new();
        let root = Pointer::root();

        let fields: HashMap<String, &FieldDefinition> = self
            .schema
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field))
            .collect();
        self.validate_fields(data, &fields, &root, loose, &mut issues);

        let whole = Value::Mapping(data.clone());
        self.evaluate_rules(&self.schema.constraints, &whole, &root, &mut issues);

        let ok = !issues.iter().any(|i| i.severity == super::issue::Severity::Error);
        (ok, issues)
    }

    fn validate_fields(
        &self,
        data: &Document,
        fields: &HashMap<String, &FieldDefinition>,
        path: &Pointer,
        loose: bool,
        issues: &mut Vec<Issue>,
    ) {
        for (name, field) in fields {
            let field_path = path.field(name);
            match data.get(name) {
                None => {
                    if field.required && !loose {
                        issues.push(Issue::new(
                            Code::RequiredFieldMissing,
                            format!("field `{name}` is required"),
                            field_path.to_string(),
                        ));
                    }
                }
                Some(value) => self.validate_value(value, field, &field_path, loose, issues),
            }
        }

        if self.strict_unknown_fields {
            for key in data.keys() {
                if !fields.contains_key(key) {
                    issues.push(Issue::new(
                        Code::UnexpectedField,
                        format!("field `{key}` is not defined in the schema"),
                        path.field(key).to_string(),
                    ));
                }
            }
        }
    }

    fn validate_value(
        &self,
        value: &Value,
        field: &FieldDefinition,
        path: &Pointer,
        loose: bool,
        issues: &mut Vec<Issue>,
    ) {
        let coerced = coerce(value);

        if coerced.is_null() {
            if field.required {
                issues.push(Issue::new(
                    Code::NullValue,
                    format!("field `{path}` must not be null"),
                    path.to_string(),
                ));
            }
            return;
        }

        if !matches!(field.type_, FieldType::Enum | FieldType::Union)
            && !type_matches(&coerced, field.type_)
        {
            issues.push(Issue::new(
                Code::TypeMismatch,
                format!("expected type `{}`", field.type_.as_str()),
                path.to_string(),
            ));
            return;
        }

        self.evaluate_rules(&field.constraints, &coerced, path, issues);

        match field.type_ {
            FieldType::Enum => self.validate_enum(&coerced, field, path, issues),
            FieldType::Object => self.validate_object(&coerced, field, path, loose, issues),
            FieldType::Union => self.validate_union(&coerced, field, path, loose, issues),
            FieldType::Array | FieldType::Set => {
                self.validate_sequence(&coerced, field, path, loose, issues)
            }
            _ => {}
        }
    }

    fn validate_enum(
        &self,
        value: &Value,
        field: &FieldDefinition,
        path: &Pointer,
        issues: &mut Vec<Issue>,
    ) {
        let allowed = field.values.as_deref().unwrap_or(&[]);
        if !allowed.iter().any(|candidate| candidate == value) {
            issues.push(Issue::new(
                Code::EnumViolation,
                "value is not one of the allowed enum values",
                path.to_string(),
            ));
        }
    }

    fn validate_object(
        &self,
        value: &Value,
        field: &FieldDefinition,
        path: &Pointer,
        loose: bool,
        issues: &mut Vec<Issue>,
    ) {
        let Some(schema_ref) = &field.schema else {
            // No nested schema attached: the object is opaque, already
            // type-checked as key-value above. Nothing further to descend.
            return;
        };
        let Some(id) = schema_ref.ids().into_iter().next() else {
            return;
        };
        self.validate_against_nested(value, id, path, loose, issues);
    }

    fn validate_union(
        &self,
        value: &Value,
        field: &FieldDefinition,
        path: &Pointer,
        loose: bool,
        issues: &mut Vec<Issue>,
    ) {
        let Some(schema_ref) = &field.schema else {
            issues.push(Issue::new(
                Code::InvalidUnionSchema,
                "union field is missing a `schema` reference",
                path.to_string(),
            ));
            return;
        };

        let mut matched = false;
        for (i, id) in schema_ref.ids().into_iter().enumerate() {
            let snapshot = issues.len();
            let attempt_path = path.schema_attempt(i);
            self.validate_against_nested(value, id, &attempt_path, loose, issues);
            if issues.len() == snapshot {
                matched = true;
                break;
            }
            issues.truncate(snapshot);
        }

        if !matched {
            issues.push(Issue::new(
                Code::UnionNoMatch,
                "value did not match any candidate schema",
                path.to_string(),
            ));
        }
    }

    fn validate_sequence(
        &self,
        value: &Value,
        field: &FieldDefinition,
        path: &Pointer,
        loose: bool,
        issues: &mut Vec<Issue>,
    ) {
        let Value::Sequence(items) = value else {
            return;
        };
        let item_field = field.synthetic_item();
        for (i, item) in items.iter().enumerate() {
            self.validate_value(item, &item_field, &path.index(i), loose, issues);
        }

        if field.type_ == FieldType::Set {
            let mut seen = std::collections::HashSet::new();
            for item in items {
                if !seen.insert(item.render()) {
                    issues.push(Issue::new(
                        Code::SetDuplicate,
                        "set contains duplicate items",
                        path.to_string(),
                    ));
                }
            }
        }
    }

    fn validate_against_nested(
        &self,
        value: &Value,
        nested_id: &str,
        path: &Pointer,
        loose: bool,
        issues: &mut Vec<Issue>,
    ) {
        let Some(nested) = self.schema.nested.get(nested_id) else {
            issues.push(Issue::new(
                Code::MissingNestedSchema,
                format!("nested schema `{nested_id}` is not defined"),
                path.to_string(),
            ));
            return;
        };

        match nested {
            NestedSchema::Literal(field_def) => {
                self.validate_value(value, field_def, path, loose, issues);
            }
            NestedSchema::Structured(structured) => match value.as_mapping() {
                Some(map) => {
                    let fields = effective_fields(structured, map);
                    self.validate_fields(map, &fields, path, loose, issues);
                }
                None => {
                    issues.push(Issue::new(
                        Code::TypeMismatch,
                        "expected an object",
                        path.to_string(),
                    ));
                }
            },
        }
    }

    /// Evaluates all rules (no short-circuit, per spec — recording every
    /// child issue aids debugging) and returns whether all passed.
    fn evaluate_rules(
        &self,
        rules: &[ConstraintRule],
        value: &Value,
        path: &Pointer,
        issues: &mut Vec<Issue>,
    ) -> bool {
        let mut all_ok = true;
        for rule in rules {
            if !self.evaluate_rule(rule, value, path, issues) {
                all_ok = false;
            }
        }
        all_ok
    }

    fn evaluate_rule(
        &self,
        rule: &ConstraintRule,
        value: &Value,
        path: &Pointer,
        issues: &mut Vec<Issue>,
    ) -> bool {
        match rule {
            ConstraintRule::Constraint(constraint) => {
                let Some(predicate) = self.functions.get(&constraint.predicate) else {
                    issues.push(Issue::new(
                        Code::MissingPredicate,
                        format!("predicate `{}` is not registered", constraint.predicate),
                        path.to_string(),
                    ));
                    return false;
                };

                let field_arg = constraint.field.clone().unwrap_or_default();
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    predicate(value, &field_arg, &constraint.parameters)
                }));

                let passed = match outcome {
                    Ok(passed) => passed,
                    Err(_) => {
                        issues.push(Issue::new(
                            Code::InvalidPredicateType,
                            format!("predicate `{}` could not be invoked", constraint.predicate),
                            path.to_string(),
                        ));
                        return false;
                    }
                };

                if !passed {
                    let message = constraint
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("constraint `{}` failed", constraint.name));
                    issues.push(Issue::new(Code::ConstraintViolation, message, path.to_string()));
                }
                passed
            }
            ConstraintRule::Group(group) => {
                let results: Vec<bool> = group
                    .rules
                    .iter()
                    .map(|child| self.evaluate_rule(child, value, path, issues))
                    .collect();

                let group_ok = match group.operator {
                    GroupOperator::And => results.iter().all(|&r| r),
                    GroupOperator::Or => results.iter().any(|&r| r),
                    GroupOperator::Not => results.len() == 1 && !results[0],
                    GroupOperator::Nor => results.iter().all(|&r| !r),
                    GroupOperator::Xor => results.iter().filter(|&&r| r).count() == 1,
                };

                if !group_ok {
                    issues.push(Issue::new(
                        Code::ConstraintGroupViolation,
                        format!("constraint group `{}` failed", group.name),
                        path.to_string(),
                    ));
                }
                group_ok
            }
        }
    }
}

/// Resolves the effective field map for a structured nested schema, merging
/// every conditional group whose `when` clause holds (or that has none).
fn effective_fields<'a>(
    structured: &'a StructuredSchema,
    data: &Document,
) -> HashMap<String, &'a FieldDefinition> {
    match structured {
        StructuredSchema::Flat(fields) => {
            fields.iter().map(|(name, field)| (name.clone(), field)).collect()
        }
        StructuredSchema::Grouped(groups) => {
            let mut merged = HashMap::new();
            for group in groups {
                let included = match &group.when {
                    None => true,
                    Some(when) => util::lookup(data, &when.field) == Some(&when.value),
                };
                if included {
                    for (name, field) in &group.fields {
                        merged.insert(name.clone(), field);
                    }
                }
            }
            merged
        }
    }
}

/// String values attempt coercion (bool/null/integer/number); anything else
/// passes through unchanged.
fn coerce(value: &Value) -> Value {
    match value {
        Value::String(s) => util::coerce_string_literal(s),
        other => other.clone(),
    }
}

fn type_matches(value: &Value, type_: FieldType) -> bool {
    match type_ {
        FieldType::String => matches!(value, Value::String(_)),
        FieldType::Integer => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        FieldType::Number | FieldType::Decimal => matches!(value, Value::Number(_)),
        FieldType::Boolean => matches!(value, Value::Bool(_)),
        FieldType::Array | FieldType::Set => matches!(value, Value::Sequence(_)),
        FieldType::Object | FieldType::Record => matches!(value, Value::Mapping(_)),
        FieldType::Enum | FieldType::Union => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Constraint, FieldDefinition, SchemaRef};

    fn user_schema() -> SchemaDefinition {
        SchemaDefinition::new("user", "1")
            .with_field("id", FieldDefinition::new(FieldType::String).required())
            .with_field("age", FieldDefinition::new(FieldType::Integer))
    }

    fn doc(pairs: Vec<(&str, Value)>) -> Document {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn s1_strict_validate_success() {
        let schema = user_schema();
        let functions = FunctionMap::new();
        let validator = Validator::new(&schema, &functions);
        let (ok, issues) = validator.validate(&doc(vec![
            ("id", Value::String("u1".into())),
            ("age", Value::Number(33.into())),
        ]), false);
        assert!(ok);
        assert!(issues.is_empty());
    }

    #[test]
    fn s2_coercion_and_leading_zero_rejection() {
        let schema = user_schema();
        let functions = FunctionMap::new();
        let validator = Validator::new(&schema, &functions);

        let (ok, issues) = validator.validate(&doc(vec![
            ("id", Value::String("u1".into())),
            ("age", Value::String("33".into())),
        ]), false);
        assert!(ok, "{issues:?}");

        let (ok, issues) = validator.validate(&doc(vec![
            ("id", Value::String("u1".into())),
            ("age", Value::String("007".into())),
        ]), false);
        assert!(!ok);
        assert_eq!(issues[0].code, "TYPE_MISMATCH");
        assert_eq!(issues[0].path, "age");
    }

    #[test]
    fn s3_unexpected_field() {
        let schema = user_schema();
        let functions = FunctionMap::new();
        let validator = Validator::new(&schema, &functions);
        let (ok, issues) = validator.validate(&doc(vec![
            ("id", Value::String("u1".into())),
            ("age", Value::Number(33.into())),
            ("extra", Value::Number(1.into())),
        ]), false);
        assert!(!ok);
        assert!(issues.iter().any(|i| i.code == "UNEXPECTED_FIELD" && i.path == "extra"));
    }

    #[test]
    fn s4_union_match_and_no_match() {
        let schema = SchemaDefinition::new("event", "1")
            .with_nested(
                "A",
                NestedSchema::Structured(StructuredSchema::Flat(
                    [
                        ("kind".to_string(), FieldDefinition::new(FieldType::String).required()),
                        ("x".to_string(), FieldDefinition::new(FieldType::Integer).required()),
                    ]
                    .into_iter()
                    .collect(),
                )),
            )
            .with_nested(
                "B",
                NestedSchema::Structured(StructuredSchema::Flat(
                    [
                        ("kind".to_string(), FieldDefinition::new(FieldType::String).required()),
                        ("y".to_string(), FieldDefinition::new(FieldType::String).required()),
                    ]
                    .into_iter()
                    .collect(),
                )),
            )
            .with_field(
                "payload",
                FieldDefinition::new(FieldType::Union)
                    .required()
                    .with_schema(SchemaRef::Many(vec!["A".to_string(), "B".to_string()])),
            );
        let functions = FunctionMap::new();
        let validator = Validator::new(&schema, &functions);

        let (ok, issues) = validator.validate(
            &doc(vec![(
                "payload",
                Value::Mapping(doc(vec![
                    ("kind", Value::String("b".into())),
                    ("y", Value::String("hi".into())),
                ])),
            )]),
            false,
        );
        assert!(ok, "{issues:?}");

        let (ok, issues) = validator.validate(
            &doc(vec![(
                "payload",
                Value::Mapping(doc(vec![("kind", Value::String("c".into()))])),
            )]),
            false,
        );
        assert!(!ok);
        assert!(issues.iter().any(|i| i.code == "UNION_NO_MATCH"));
    }

    #[test]
    fn constraint_group_xor_requires_exactly_one() {
        let mut functions = FunctionMap::new();
        functions.register("isTrue", |v, _f, _a| v.as_bool().unwrap_or(false));
        functions.register("isFalse", |v, _f, _a| !v.as_bool().unwrap_or(true));

        let schema = SchemaDefinition::new("flag", "1").with_field(
            "value",
            FieldDefinition::new(FieldType::Boolean).with_constraint(ConstraintRule::Group(
                crate::schema::ConstraintGroup {
                    name: "xor-check".into(),
                    operator: GroupOperator::Xor,
                    rules: vec![
                        ConstraintRule::Constraint(Constraint {
                            name: "is-true".into(),
                            predicate: "isTrue".into(),
                            field: None,
                            parameters: Value::Null,
                            error_message: None,
                        }),
                        ConstraintRule::Constraint(Constraint {
                            name: "is-false".into(),
                            predicate: "isFalse".into(),
                            field: None,
                            parameters: Value::Null,
                            error_message: None,
                        }),
                    ],
                },
            )),
        );
        let validator = Validator::new(&schema, &functions);
        let (ok, _issues) = validator.validate(&doc(vec![("value", Value::Bool(true))]), false);
        assert!(ok);
    }

    #[test]
    fn loose_suppresses_required_field_missing() {
        let schema = user_schema();
        let functions = FunctionMap::new();
        let validator = Validator::new(&schema, &functions);
        let (ok, issues) = validator.validate(&doc(vec![]), true);
        assert!(ok, "{issues:?}");
    }

    #[test]
    fn missing_predicate_is_reported() {
        let schema = SchemaDefinition::new("thing", "1").with_field(
            "x",
            FieldDefinition::new(FieldType::Integer).with_constraint(ConstraintRule::Constraint(
                Constraint {
                    name: "c".into(),
                    predicate: "nonexistent".into(),
                    field: None,
                    parameters: Value::Null,
                    error_message: None,
                },
            )),
        );
        let functions = FunctionMap::new();
        let validator = Validator::new(&schema, &functions);
        let (ok, issues) = validator.validate(&doc(vec![("x", Value::Number(1.into()))]), false);
        assert!(!ok);
        assert_eq!(issues[0].code, "MISSING_PREDICATE");
    }
}
