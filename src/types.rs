//! Core types for JSON:API resources and relationship linkage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DocumentError, LinkageError};

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

impl Cardinality {
    /// Human-readable name used in error details.
    pub fn describe(&self) -> &'static str {
        match self {
            Cardinality::ToOne => "to-one",
            Cardinality::ToMany => "to-many",
        }
    }
}

/// The `{type, id}` pair identifying a related resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Parse an identifier object, requiring string `type` and `id` members.
    pub fn parse(value: &Value) -> Result<Self, LinkageError> {
        let Some(object) = value.as_object() else {
            return Err(LinkageError::NotAnObject {
                actual: json_type_name(value).to_string(),
            });
        };

        let member = |name: &'static str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or(LinkageError::InvalidMember { member: name })
        };

        Ok(Self::new(member("type")?, member("id")?))
    }
}

impl std::fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

/// Relationship linkage: the `data` member of a relationship object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Linkage {
    /// Empty to-one relationship.
    Null,
    One(ResourceIdentifier),
    Many(Vec<ResourceIdentifier>),
}

impl Linkage {
    /// Parse raw linkage data.
    ///
    /// # Errors
    ///
    /// Returns `LinkageError` if the value is not null, an identifier object
    /// or an array of identifier objects.
    pub fn parse(value: &Value) -> Result<Self, LinkageError> {
        match value {
            Value::Null => Ok(Linkage::Null),
            Value::Object(_) => ResourceIdentifier::parse(value).map(Linkage::One),
            Value::Array(items) => items
                .iter()
                .map(ResourceIdentifier::parse)
                .collect::<Result<Vec<_>, _>>()
                .map(Linkage::Many),
            other => Err(LinkageError::InvalidShape {
                actual: json_type_name(other).to_string(),
            }),
        }
    }

    /// Cardinality implied by the shape of the linkage.
    pub fn cardinality(&self) -> Cardinality {
        match self {
            Linkage::Null | Linkage::One(_) => Cardinality::ToOne,
            Linkage::Many(_) => Cardinality::ToMany,
        }
    }

    pub fn identifiers(&self) -> &[ResourceIdentifier] {
        match self {
            Linkage::Null => &[],
            Linkage::One(identifier) => std::slice::from_ref(identifier),
            Linkage::Many(identifiers) => identifiers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers().is_empty()
    }
}

/// An inbound resource object.
///
/// The resource type is fixed at construction; there is no setter for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    resource_type: String,
    id: Option<String>,
    attributes: Map<String, Value>,
    relationships: Map<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            attributes: Map::new(),
            relationships: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Add a relationship object with the given `data` member.
    pub fn with_relationship(mut self, name: impl Into<String>, data: Value) -> Self {
        let mut object = Map::new();
        object.insert("data".to_string(), data);
        self.relationships.insert(name.into(), Value::Object(object));
        self
    }

    /// Decode a resource from a document.
    ///
    /// Accepts either `{"data": {...}}` or a bare resource object.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError` if a member has the wrong JSON type or the
    /// resource has no `type`.
    pub fn from_document(document: &Value) -> Result<Self, DocumentError> {
        let (data, base) = match document.get("data") {
            Some(data) => (data, "/data"),
            None => (document, ""),
        };

        let Some(object) = data.as_object() else {
            return Err(invalid_member(base, "object", data));
        };

        let resource_type = match object.get("type") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(other) => return Err(invalid_member(&format!("{}/type", base), "string", other)),
            None => {
                return Err(invalid_member(
                    &format!("{}/type", base),
                    "string",
                    &Value::Null,
                ))
            }
        };

        let id = match object.get("id") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => return Err(invalid_member(&format!("{}/id", base), "string", other)),
        };

        let attributes = optional_object(object, "attributes", base)?;
        let relationships = optional_object(object, "relationships", base)?;

        for (name, relationship) in &relationships {
            if !relationship.is_object() {
                let pointer = format!("{}/relationships/{}", base, name);
                return Err(invalid_member(&pointer, "object", relationship));
            }
        }

        Ok(Self {
            resource_type,
            id,
            attributes,
            relationships,
        })
    }

    /// Parse a JSON string into a resource.
    pub fn from_json(content: &str) -> Result<Self, DocumentError> {
        let document: Value = serde_json::from_str(content)
            .map_err(|source| DocumentError::InvalidJson { source })?;
        Self::from_document(&document)
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn relationships(&self) -> &Map<String, Value> {
        &self.relationships
    }

    pub fn has_relationship(&self, name: &str) -> bool {
        self.relationships.contains_key(name)
    }

    /// The `data` member of the named relationship object.
    ///
    /// `None` if the relationship is absent or has no `data` member.
    pub fn relationship_data(&self, name: &str) -> Option<&Value> {
        self.relationships.get(name).and_then(|r| r.get("data"))
    }
}

/// Extract the `data` member of a relationship-endpoint document.
///
/// # Errors
///
/// Returns `DocumentError::MissingData` if the document has no `data` member.
pub fn relationship_document_data(document: &Value) -> Result<&Value, DocumentError> {
    document.get("data").ok_or(DocumentError::MissingData)
}

fn optional_object(
    object: &Map<String, Value>,
    member: &str,
    base: &str,
) -> Result<Map<String, Value>, DocumentError> {
    match object.get(member) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(invalid_member(
            &format!("{}/{}", base, member),
            "object",
            other,
        )),
    }
}

fn invalid_member(pointer: &str, expected: &'static str, actual: &Value) -> DocumentError {
    DocumentError::InvalidMember {
        pointer: pointer.to_string(),
        expected,
        actual: json_type_name(actual).to_string(),
    }
}
