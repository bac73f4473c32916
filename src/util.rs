//! Pointer helpers, numeric coercion, and struct/map marshalling.
//!
//! Grounded on the `doc` crate's `ptr.rs` (dot/index addressing into a
//! document) and the `models` newtype pattern in `control/src/models`
//! (marshal helpers around `serde_json`).

use serde::{de::DeserializeOwned, Serialize};

use crate::value::{Document, Value};

/// A dot-path into a document, with `[idx]` suffixes for sequence elements.
///
/// `user.addresses[0].city` addresses the `city` field of the first item of
/// `user.addresses`. Construction never fails; resolution against a concrete
/// document can.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pointer(String);

impl Pointer {
    pub fn root() -> Self {
        Pointer(String::new())
    }

    pub fn field(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Pointer(name.to_owned())
        } else {
            Pointer(format!("{}.{}", self.0, name))
        }
    }

    pub fn index(&self, idx: usize) -> Self {
        Pointer(format!("{}[{}]", self.0, idx))
    }

    pub fn schema_attempt(&self, idx: usize) -> Self {
        Pointer(format!("{}[schema:{}]", self.0, idx))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves a plain dot-path (no index syntax) against a document, used by
/// conditional field-group `when` clauses.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = match current {
            Value::Mapping(map) => map.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Attempts to coerce a string literal into boolean/integer/number/null,
/// mirroring the validator's coercion pass (kept here since the logic is
/// also useful for query-parameter decoding at the boundary).
///
/// A literal that *looks* like a bare integer but doesn't round-trip
/// (`"007"`) is deliberately left as a string rather than falling through
/// to float parsing — `"007".parse::<f64>()` would happily succeed, which
/// would mask the round-trip violation the spec calls out explicitly.
pub fn coerce_string_literal(s: &str) -> Value {
    let lower = s.to_ascii_lowercase();
    if lower == "true" {
        return Value::Bool(true);
    }
    if lower == "false" {
        return Value::Bool(false);
    }
    if lower == "null" {
        return Value::Null;
    }
    if is_integer_shaped(s) {
        return if is_bare_integer_literal(s) {
            s.parse::<i64>().map(|n| Value::Number(n.into())).unwrap_or_else(|_| Value::String(s.to_owned()))
        } else {
            Value::String(s.to_owned())
        };
    }
    if let Ok(f) = s.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(s.to_owned())
}

fn is_integer_shaped(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Rejects literals like `"007"` where round-tripping through `i64` would
/// lose the leading zero: `format(parse(s)) != s`.
fn is_bare_integer_literal(s: &str) -> bool {
    let Ok(n) = s.parse::<i64>() else {
        return false;
    };
    n.to_string() == s
}

/// Marshals a `Serialize` struct into a [`Document`], the inverse of
/// [`unmarshal`]. Used to move schema records and other typed structs across
/// the driver boundary, which only understands documents.
pub fn marshal<T: Serialize>(value: &T) -> Result<Document, serde_json::Error> {
    let json = serde_json::to_value(value)?;
    match crate::value::json_to_document(json) {
        Some(doc) => Ok(doc),
        None => Err(serde::ser::Error::custom("value did not marshal to an object")),
    }
}

pub fn unmarshal<T: DeserializeOwned>(doc: &Document) -> Result<T, serde_json::Error> {
    let json = crate::value::document_to_json(doc);
    serde_json::from_value(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_renders_dot_and_index_paths() {
        let p = Pointer::root().field("addresses").index(0).field("city");
        assert_eq!(p.as_str(), "addresses[0].city");
    }

    #[test]
    fn rejects_leading_zero_integers() {
        assert!(!is_bare_integer_literal("007"));
        assert!(is_bare_integer_literal("7"));
        assert!(is_bare_integer_literal("-7"));
    }

    #[test]
    fn coerces_bool_and_null_literals() {
        assert_eq!(coerce_string_literal("TRUE"), Value::Bool(true));
        assert_eq!(coerce_string_literal("False"), Value::Bool(false));
        assert_eq!(coerce_string_literal("Null"), Value::Null);
    }
}
