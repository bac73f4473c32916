//! The schemas-of-schemas meta-collection: one record per user collection,
//! plus the embedded schema used to validate the records themselves
//! (spec §6, bit-exact).

use serde::{Deserialize, Serialize};

use super::model::{FieldDefinition, FieldType, NestedSchema, SchemaDefinition, StructuredSchema};

pub const META_COLLECTION_LOGICAL: &str = "__schemas";
pub const META_SCHEMA_VERSION: &str = "1";

/// `{name: {logical, physical}, description, version, schema}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionName {
    pub logical: String,
    pub physical: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub name: CollectionName,
    #[serde(default)]
    pub description: Option<String>,
    pub version: String,
    pub schema: SchemaDefinition,
    #[serde(default)]
    pub history: Vec<SchemaHistoryEntry>,
}

/// Appended on every successful (non-dry-run) migrate/rollback
/// (SPEC_FULL §3, filling a gap the distilled spec left unnamed).
///
/// `schema` is the pre-migration snapshot (the `from_version` shape) rather
/// than the new one — it's what `Rollback` restores, since the actual data
/// back-transform is out of scope (spec §1) and the only thing rollback can
/// faithfully reconstruct is the schema definition itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaHistoryEntry {
    pub from_version: String,
    pub to_version: String,
    pub description: String,
    pub applied_at_ms: i64,
    pub schema: SchemaDefinition,
}

/// The schema describing schema records, embedded at build time. Every
/// facade validates writes to the meta-collection against this definition.
pub fn meta_schema() -> SchemaDefinition {
    let name_schema = StructuredSchema::Flat(
        [
            ("logical".to_string(), FieldDefinition::new(FieldType::String).required()),
            ("physical".to_string(), FieldDefinition::new(FieldType::String).required()),
        ]
        .into_iter()
        .collect(),
    );

    SchemaDefinition::new("__schemas", META_SCHEMA_VERSION)
        .with_nested("name", NestedSchema::Structured(name_schema))
        .with_field(
            "name",
            FieldDefinition::new(FieldType::Object)
                .required()
                .with_schema(super::model::SchemaRef::Single("name".to_string())),
        )
        .with_field("description", FieldDefinition::new(FieldType::String))
        .with_field("version", FieldDefinition::new(FieldType::String).required())
        .with_field("schema", FieldDefinition::new(FieldType::Object).required())
        .with_field(
            "history",
            FieldDefinition::new(FieldType::Array).with_items_type(FieldType::Object),
        )
}
