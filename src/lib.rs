//! JSON:API Resource Validation
//!
//! Validation and mutation of JSON:API resources backed by relational models.
//!
//! This library checks inbound resource documents against a per-type
//! [`ResourceDefinition`], translates failures into JSON:API error objects,
//! applies relationship mutations (replace, add-to, remove-from) onto a
//! [`RelationStore`], and reads relationship linkage and related resources
//! back out of it.
//!
//! # Example
//!
//! ```
//! use jsonapi_schema::{
//!     load_definition_str, MemoryStore, RelationStore, RelationshipMutation, Verb,
//! };
//! use serde_json::json;
//!
//! let definition = load_definition_str(r#"{
//!     "type": "posts",
//!     "relationships": {
//!         "author": { "type": "users", "kind": "belongs-to", "foreign_key": "author_id" }
//!     }
//! }"#).unwrap();
//!
//! let mut store = MemoryStore::new()
//!     .with_row("posts", "1", json!({ "author_id": null }))
//!     .with_row("users", "7", json!({ "name": "Ann" }));
//!
//! let mut mutation = RelationshipMutation::new(&definition, "author", Verb::Replace);
//! let outcome = mutation
//!     .execute(&mut store, "1", &json!({ "type": "users", "id": "7" }))
//!     .unwrap();
//!
//! assert_eq!(outcome.status(), 204);
//! assert_eq!(store.column("posts", "1", "author_id").unwrap().as_deref(), Some("7"));
//! ```
//!
//! # Relationship Verbs
//!
//! | Verb | To-one | To-many |
//! |------|--------|---------|
//! | replace | Set or clear the key | Detach `current - new`, attach `new - current` |
//! | add | 403 | Attach `new - current` |
//! | remove | 403 | Detach `new ∩ current` |
//!
//! # Sparse Fieldsets
//!
//! ```
//! use jsonapi_schema::SchemaFields;
//!
//! let fields = SchemaFields::new(["author.country"], [("posts", "title,author")]);
//!
//! assert!(fields.is_relationship_requested("", "author"));
//! assert!(fields.is_relationship_requested("author", "country"));
//! assert!(fields.is_field_requested("posts", "title"));
//! assert!(!fields.is_field_requested("posts", "content"));
//! assert!(fields.is_field_requested("users", "name"));
//! ```

mod attributes;
mod definition;
mod error;
mod factory;
mod fields;
mod linkage;
mod loader;
mod pipeline;
mod query;
mod read;
mod relations;
mod rules;
mod store;
mod types;

pub use attributes::{
    AttributesValidator, MessageBag, RuleEngine, Session, SessionHook, ValidationOutcome,
};
pub use definition::{NotFoundPolicy, ResourceDefinition, ValidationPolicy};
pub use error::{
    DefinitionError, DocumentError, ErrorDocument, ErrorObject, ErrorSource, LinkageError,
    MutationError, QueryError, RuleError, StoreError,
};
pub use factory::{attribute_pointer, relationship_pointer, DefaultErrorFactory, ErrorFactory};
pub use fields::SchemaFields;
pub use linkage::RelationshipValidator;
pub use loader::{is_url, load_definition, load_definition_auto, load_definition_str, load_json};
pub use pipeline::{
    merge_stored_attributes, resolve_fields, save_resource, MutationOutcome, MutationState,
    Operation, RelationshipMutation, ResourceOutcome, ResourceValidator,
};
pub use query::{Page, QueryParameters, SortField};
pub use read::{read_related, read_relationship, RelatedResource};
pub use relations::{Delta, DetachPolicy, Owner, Relation, RelationKind, Verb};
pub use rules::{compile_rules, JsonSchemaEngine};
pub use store::{key_string, MemoryStore, RelationStore, Row};
pub use types::{
    json_type_name, relationship_document_data, Cardinality, Linkage, Resource,
    ResourceIdentifier,
};

#[cfg(feature = "remote")]
pub use loader::load_definition_url;
