//! Validation issue codes and the `Issue` record returned by `Validate`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    RequiredFieldMissing,
    UnexpectedField,
    NullValue,
    TypeMismatch,
    EnumViolation,
    SetDuplicate,
    UnionNoMatch,
    MissingPredicate,
    InvalidPredicateType,
    ConstraintViolation,
    ConstraintGroupViolation,
    InvalidUnionSchema,
    MissingNestedSchema,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::RequiredFieldMissing => "REQUIRED_FIELD_MISSING",
            Code::UnexpectedField => "UNEXPECTED_FIELD",
            Code::NullValue => "NULL_VALUE",
            Code::TypeMismatch => "TYPE_MISMATCH",
            Code::EnumViolation => "ENUM_VIOLATION",
            Code::SetDuplicate => "SET_DUPLICATE",
            Code::UnionNoMatch => "UNION_NO_MATCH",
            Code::MissingPredicate => "MISSING_PREDICATE",
            Code::InvalidPredicateType => "INVALID_PREDICATE_TYPE",
            Code::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Code::ConstraintGroupViolation => "CONSTRAINT_GROUP_VIOLATION",
            Code::InvalidUnionSchema => "INVALID_UNION_SCHEMA",
            Code::MissingNestedSchema => "MISSING_NESTED_SCHEMA",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Issue {
    pub code: String,
    pub message: String,
    pub path: String,
    pub severity: Severity,
}

impl Issue {
    pub fn new(code: Code, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            path: path.into(),
            severity: Severity::Error,
        }
    }
}
