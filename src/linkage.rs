//! Validation of relationship linkage against declared relations.

use serde_json::Value;
use tracing::debug;

use crate::definition::ResourceDefinition;
use crate::error::ErrorObject;
use crate::factory::{relationship_pointer, DefaultErrorFactory, ErrorFactory};
use crate::relations::Relation;
use crate::types::{Linkage, Resource};

/// Checks linkage shape, cardinality and related types.
///
/// Like [`AttributesValidator`](crate::attributes::AttributesValidator),
/// errors accumulate until [`reset`](Self::reset) or
/// [`take_errors`](Self::take_errors).
#[derive(Debug, Clone, Default)]
pub struct RelationshipValidator<F = DefaultErrorFactory> {
    factory: F,
    errors: Vec<ErrorObject>,
}

impl RelationshipValidator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: ErrorFactory> RelationshipValidator<F> {
    pub fn with_factory<G: ErrorFactory>(self, factory: G) -> RelationshipValidator<G> {
        RelationshipValidator {
            factory,
            errors: self.errors,
        }
    }

    /// Parse and check the `data` of one relationship.
    ///
    /// Returns the linkage when it is well formed, has the relation's
    /// cardinality and only references accepted types. Otherwise a single
    /// error at `pointer` is recorded and `None` returned.
    pub fn linkage(
        &mut self,
        name: &str,
        relation: &Relation,
        data: &Value,
        pointer: &str,
    ) -> Option<Linkage> {
        let cardinality = relation.cardinality();
        let types = &relation.related_types;

        let linkage = match Linkage::parse(data) {
            Ok(linkage) => linkage,
            Err(error) => {
                let error = self
                    .factory
                    .malformed_linkage(name, cardinality, types, &error, pointer);
                self.errors.push(error);
                return None;
            }
        };

        let accepted = linkage
            .identifiers()
            .iter()
            .all(|identifier| relation.accepts(&identifier.resource_type));

        if linkage.cardinality() != cardinality || !accepted {
            let error = self
                .factory
                .relationship_mismatch(name, cardinality, types, pointer);
            self.errors.push(error);
            return None;
        }

        Some(linkage)
    }

    /// Are the relationships on `resource` valid for `definition`?
    ///
    /// When `creating`, relationships declared `required` must be present.
    pub fn is_valid(
        &mut self,
        definition: &ResourceDefinition,
        resource: &Resource,
        creating: bool,
    ) -> bool {
        let before = self.errors.len();

        for (name, object) in resource.relationships() {
            let pointer = relationship_pointer(name);

            let Some(relation) = definition.relation(name) else {
                let error = self.factory.relationship_unknown(name, &pointer);
                self.errors.push(error);
                continue;
            };

            if relation.kind.is_read_only() {
                let error = self.factory.relationship_read_only(name, &pointer);
                self.errors.push(error);
                continue;
            }

            let Some(data) = object.get("data") else {
                let error = self.factory.relationship_mismatch(
                    name,
                    relation.cardinality(),
                    &relation.related_types,
                    &pointer,
                );
                self.errors.push(error);
                continue;
            };

            if let Some(linkage) = self.linkage(name, relation, data, &pointer) {
                if relation.required && linkage.is_empty() {
                    let error = self.factory.relationship_required(name);
                    self.errors.push(error);
                }
            }
        }

        if creating {
            for (name, relation) in &definition.relationships {
                if relation.required && !resource.has_relationship(name) {
                    let error = self.factory.relationship_required(name);
                    self.errors.push(error);
                }
            }
        }

        let failures = self.errors.len() - before;
        if failures > 0 {
            debug!(
                resource_type = resource.resource_type(),
                failures, "relationship validation failed"
            );
        }
        failures == 0
    }

    pub fn errors(&self) -> &[ErrorObject] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<ErrorObject> {
        std::mem::take(&mut self.errors)
    }

    pub fn reset(&mut self) {
        self.errors.clear();
    }
}
