//! Schema, field, and constraint type definitions (component A).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A collection's type description. Immutable once registered; a new
/// version is minted via the migration path rather than edited in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, FieldDefinition>,
    #[serde(default)]
    pub nested: HashMap<String, NestedSchema>,
    #[serde(default)]
    pub constraints: Vec<ConstraintRule>,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            fields: HashMap::new(),
            nested: HashMap::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field: FieldDefinition) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn with_nested(mut self, id: impl Into<String>, schema: NestedSchema) -> Self {
        self.nested.insert(id.into(), schema);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Decimal,
    Boolean,
    Array,
    Set,
    Object,
    Record,
    Enum,
    Union,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Set => "set",
            FieldType::Object => "object",
            FieldType::Record => "record",
            FieldType::Enum => "enum",
            FieldType::Union => "union",
        }
    }
}

/// A field's description: type, presence, defaults, and its own constraint
/// rules. `schema` carries a nested-schema reference for `object`/`union`
/// fields; `items_type`/nested item schema cover `array`/`set`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Reserved: validation is a no-op for this flag (spec §9 Open Questions).
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub constraints: Vec<ConstraintRule>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    #[serde(default, rename = "itemsType")]
    pub items_type: Option<FieldType>,
    #[serde(default)]
    pub schema: Option<SchemaRef>,
}

impl FieldDefinition {
    pub fn new(type_: FieldType) -> Self {
        Self {
            type_,
            required: false,
            unique: false,
            default: None,
            constraints: Vec::new(),
            values: None,
            items_type: None,
            schema: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_items_type(mut self, items_type: FieldType) -> Self {
        self.items_type = Some(items_type);
        self
    }

    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_constraint(mut self, rule: ConstraintRule) -> Self {
        self.constraints.push(rule);
        self
    }

    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = Some(values);
        self
    }

    /// Builds the synthetic per-item field definition used to validate
    /// `array`/`set` members (spec §4.1 step 3, type-specific descent).
    /// The item reuses the container's nested-schema reference and allowed
    /// `values`, since a field carries only one `schema`/`values` slot.
    pub fn synthetic_item(&self) -> FieldDefinition {
        let mut item = FieldDefinition::new(self.items_type.unwrap_or(FieldType::String));
        item.required = true;
        item.schema = self.schema.clone();
        item.values = self.values.clone();
        item
    }
}

/// Either a single nested-schema id (`object`) or an ordered list of
/// candidate ids (`union`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaRef {
    Single(String),
    Many(Vec<String>),
}

impl SchemaRef {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            SchemaRef::Single(id) => vec![id.as_str()],
            SchemaRef::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// A nested schema referenced by id from a field's `schema` slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NestedSchema {
    Structured(StructuredSchema),
    Literal(Box<FieldDefinition>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredSchema {
    Flat(HashMap<String, FieldDefinition>),
    Grouped(Vec<FieldGroup>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldGroup {
    #[serde(default)]
    pub when: Option<WhenClause>,
    pub fields: HashMap<String, FieldDefinition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WhenClause {
    pub field: String,
    pub value: Value,
}

/// A single Constraint or a nested ConstraintGroup (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintRule {
    Constraint(Constraint),
    Group(ConstraintGroup),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub predicate: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstraintGroup {
    pub name: String,
    pub operator: GroupOperator,
    pub rules: Vec<ConstraintRule>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    And,
    Or,
    Not,
    Xor,
    Nor,
}
