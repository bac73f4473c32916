//! The predicate registry consumed by the validator's constraint evaluator.
//!
//! Grounded on `control`'s service-layer pattern of a small `HashMap` of
//! named callables (`services/builds_root/mod.rs`'s `PutBuilds`/`FetchBuilds`
//! function pointers wired up at `startup`), generalized here to a
//! late-bound, string-keyed registry per spec §3/§9.

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::Value;

/// `(data, field, args) -> bool`. `field` is the constraint's own `field`
/// attribute (may be empty for whole-value constraints), not a document
/// path — the predicate receives the value already resolved.
pub type PredicateFn = Arc<dyn Fn(&Value, &str, &Value) -> bool + Send + Sync>;

/// A late-bound registry of named predicates, supplied by the embedding
/// application. The core never mutates it after construction.
#[derive(Clone, Default)]
pub struct FunctionMap {
    functions: HashMap<String, PredicateFn>,
}

impl FunctionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Value, &str, &Value) -> bool + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PredicateFn> {
        self.functions.get(name)
    }

    /// A starter set of predicates so a freshly constructed facade is
    /// testable end-to-end without requiring the embedder to register
    /// anything first (SPEC_FULL §4.1). Callers may override any of these
    /// by registering a predicate under the same name afterwards. Returns an
    /// empty map when [`crate::config::settings`]'s `default_predicates` is
    /// disabled.
    pub fn with_builtins() -> Self {
        if !crate::config::settings().default_predicates {
            return Self::new();
        }
        let mut map = Self::new();
        map.register("min", |value, _field, args| match (value.as_f64(), args.as_f64()) {
            (Some(v), Some(min)) => v >= min,
            _ => false,
        });
        map.register("max", |value, _field, args| match (value.as_f64(), args.as_f64()) {
            (Some(v), Some(max)) => v <= max,
            _ => false,
        });
        map.register("minLength", |value, _field, args| {
            match (value.as_str(), args.as_i64()) {
                (Some(s), Some(min)) => s.chars().count() as i64 >= min,
                _ => false,
            }
        });
        map.register("maxLength", |value, _field, args| {
            match (value.as_str(), args.as_i64()) {
                (Some(s), Some(max)) => s.chars().count() as i64 <= max,
                _ => false,
            }
        });
        map.register("pattern", |value, _field, args| {
            match (value.as_str(), args.as_str()) {
                (Some(s), Some(pattern)) => regex_lite_match(pattern, s),
                _ => false,
            }
        });
        map
    }
}

/// A dependency-free subset of regex matching (literal substring or `^...$`
/// anchors) sufficient for the built-in `pattern` predicate. Applications
/// needing full regex semantics should register their own `pattern`
/// predicate backed by a real regex engine.
fn regex_lite_match(pattern: &str, value: &str) -> bool {
    if let Some(inner) = pattern.strip_prefix('^').and_then(|p| p.strip_suffix('$')) {
        return value == inner;
    }
    value.contains(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_min_max_predicates() {
        let map = FunctionMap::with_builtins();
        let min = map.get("min").unwrap();
        assert!(min(&Value::Number(5.into()), "age", &Value::Number(3.into())));
        assert!(!min(&Value::Number(2.into()), "age", &Value::Number(3.into())));
    }

    #[test]
    fn custom_predicate_overrides_builtin() {
        let mut map = FunctionMap::with_builtins();
        map.register("min", |_v, _f, _a| false);
        let min = map.get("min").unwrap();
        assert!(!min(&Value::Number(5.into()), "age", &Value::Number(3.into())));
    }
}
