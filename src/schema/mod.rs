pub mod constraint;
pub mod meta;
pub mod model;

pub use constraint::{FunctionMap, PredicateFn};
pub use meta::{meta_schema, CollectionName, SchemaHistoryEntry, SchemaRecord, META_COLLECTION_LOGICAL};
pub use model::{
    Constraint, ConstraintGroup, ConstraintRule, FieldDefinition, FieldGroup, FieldType,
    GroupOperator, NestedSchema, SchemaDefinition, SchemaRef, StructuredSchema, WhenClause,
};
