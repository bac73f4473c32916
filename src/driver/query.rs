//! Query DSL surface consumed (not defined) by the core (spec §6). The
//! builder that produces these objects lives outside this crate; the core
//! only carries the AST through to the driver.

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filters: Filter,
    #[serde(default)]
    pub projection: Option<Vec<String>>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub sort: Option<Vec<SortField>>,
}

impl Query {
    pub fn matching(filter: Filter) -> Self {
        Self {
            filters: filter,
            ..Default::default()
        }
    }
}

/// Opaque filter criteria; the core neither parses nor optimizes it, it is
/// handed to the driver verbatim.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Filter(pub Value);

impl Filter {
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Mapping(map) => map.is_empty(),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}
