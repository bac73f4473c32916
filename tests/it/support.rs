use std::sync::Arc;

use persistence_core::driver::memory::MemoryDriver;
use persistence_core::driver::Driver;
use persistence_core::schema::{FieldDefinition, FieldType, FunctionMap, NestedSchema, SchemaDefinition, SchemaRef, StructuredSchema};
use persistence_core::value::{Document, Value};
use persistence_core::Persistence;

/// A fresh facade over an empty in-memory driver, seeded with the built-in
/// predicates (mirrors how an embedder wires up a facade with no persisted
/// state yet).
pub async fn bootstrap() -> Persistence {
    let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
    Persistence::new(driver, FunctionMap::with_builtins())
        .await
        .expect("facade bootstraps against a fresh memory driver")
}

/// The schema used throughout spec scenario S1/S2/S3:
/// `{name:"user", version:"1", fields:{id:{type:"string", required:true}, age:{type:"integer"}}}`.
pub fn user_schema() -> SchemaDefinition {
    SchemaDefinition::new("user", "1")
        .with_field("id", FieldDefinition::new(FieldType::String).required())
        .with_field("age", FieldDefinition::new(FieldType::Integer))
}

/// S4's union schema: `payload` is a union of `A{kind:"a", x:integer}` and
/// `B{kind:"b", y:string}`.
pub fn union_schema() -> SchemaDefinition {
    let schema_a = StructuredSchema::Flat(
        [
            ("kind".to_string(), FieldDefinition::new(FieldType::String).required()),
            ("x".to_string(), FieldDefinition::new(FieldType::Integer).required()),
        ]
        .into_iter()
        .collect(),
    );
    let schema_b = StructuredSchema::Flat(
        [
            ("kind".to_string(), FieldDefinition::new(FieldType::String).required()),
            ("y".to_string(), FieldDefinition::new(FieldType::String).required()),
        ]
        .into_iter()
        .collect(),
    );

    SchemaDefinition::new("envelope", "1")
        .with_nested("A", NestedSchema::Structured(schema_a))
        .with_nested("B", NestedSchema::Structured(schema_b))
        .with_field(
            "payload",
            FieldDefinition::new(FieldType::Union)
                .required()
                .with_schema(SchemaRef::Many(vec!["A".to_string(), "B".to_string()])),
        )
}

pub fn posts_schema() -> SchemaDefinition {
    SchemaDefinition::new("posts", "1")
        .with_field("title", FieldDefinition::new(FieldType::String).required())
}

pub fn document(pairs: &[(&str, Value)]) -> Document {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
