//! Resource definitions: the per-type configuration the validators and
//! adapters are built from.
//!
//! ```json
//! {
//!     "type": "posts",
//!     "attributes": {
//!         "title": { "type": "string", "required": true }
//!     },
//!     "relationships": {
//!         "author": { "type": "users", "kind": "belongs-to", "foreign_key": "author_id" }
//!     },
//!     "include_paths": ["author"],
//!     "sort_fields": ["title", "published_at"],
//!     "filters": ["title"]
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DefinitionError;
use crate::relations::{Relation, RelationKind};

/// Whether later validation stages run after an earlier one failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationPolicy {
    /// Skip relationship validation when attributes are invalid.
    #[default]
    FailFast,
    /// Run every stage and report the union of errors.
    CollectAll,
}

/// Status reported for linkage that does not resolve to a stored row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotFoundPolicy {
    /// 404 Not Found.
    #[default]
    NotFound,
    /// 422 Unprocessable Entity.
    Unprocessable,
}

impl NotFoundPolicy {
    pub fn status(&self) -> u16 {
        match self {
            NotFoundPolicy::NotFound => 404,
            NotFoundPolicy::Unprocessable => 422,
        }
    }
}

/// Everything declared about one resource type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceDefinition {
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Store table; defaults to the resource type.
    #[serde(default)]
    pub table: Option<String>,
    /// Attribute rules, in the rule engine's format.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Message overrides for the rule engine.
    #[serde(default)]
    pub messages: BTreeMap<String, String>,
    /// Display names for attributes.
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Relation>,
    /// Include paths clients may request.
    #[serde(default)]
    pub include_paths: Vec<String>,
    /// Columns clients may sort a collection of this type by.
    #[serde(default)]
    pub sort_fields: Vec<String>,
    /// Filter keys clients may use on a collection of this type.
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub policy: ValidationPolicy,
    #[serde(default)]
    pub not_found: NotFoundPolicy,
}

impl ResourceDefinition {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            table: None,
            attributes: Map::new(),
            messages: BTreeMap::new(),
            custom_attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            include_paths: Vec::new(),
            sort_fields: Vec::new(),
            filters: Vec::new(),
            policy: ValidationPolicy::default(),
            not_found: NotFoundPolicy::default(),
        }
    }

    pub fn attribute(mut self, field: impl Into<String>, rule: Value) -> Self {
        self.attributes.insert(field.into(), rule);
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relationships.insert(name.into(), relation);
        self
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn sort_field(mut self, field: impl Into<String>) -> Self {
        self.sort_fields.push(field.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>) -> Self {
        self.filters.push(key.into());
        self
    }

    pub fn policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn not_found(mut self, not_found: NotFoundPolicy) -> Self {
        self.not_found = not_found;
        self
    }

    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.resource_type)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relationships.get(name)
    }

    /// Check the definition is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::Invalid` for an empty type, a relationship
    /// with no related types, a polymorphic relationship of a kind that
    /// stores a bare key, or an include path whose first segment is not a
    /// declared relationship.
    pub fn check(&self) -> Result<(), DefinitionError> {
        let invalid = |message: String| DefinitionError::Invalid {
            resource_type: self.resource_type.clone(),
            message,
        };

        if self.resource_type.is_empty() {
            return Err(invalid("type must not be empty".to_string()));
        }

        for (name, relation) in &self.relationships {
            if relation.related_types.is_empty() {
                return Err(invalid(format!("relationship {} declares no types", name)));
            }
            let keyed_by_table = matches!(relation.kind, RelationKind::HasMany { .. });
            if relation.is_polymorphic() && !keyed_by_table {
                return Err(invalid(format!(
                    "relationship {} is {} and cannot hold more than one type",
                    name,
                    relation.kind.name()
                )));
            }
        }

        for path in &self.include_paths {
            let first = path.split('.').next().unwrap_or_default();
            if !self.relationships.contains_key(first) {
                return Err(invalid(format!(
                    "include path {} does not start with a declared relationship",
                    path
                )));
            }
        }

        Ok(())
    }
}
