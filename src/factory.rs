//! Translation of validation failures into JSON:API error objects.

use crate::attributes::MessageBag;
use crate::error::{ErrorObject, LinkageError};
use crate::types::{Cardinality, ResourceIdentifier};

/// Builds the error objects reported by the validators.
///
/// Every method has a default; implementors override only the wording they
/// need to change.
pub trait ErrorFactory {
    /// One 422 error per message, pointing at `/data/attributes/{field}`.
    fn invalid_attributes(&self, messages: &MessageBag) -> Vec<ErrorObject> {
        messages
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |message| {
                    ErrorObject::new(422, message.clone())
                        .with_title("Unprocessable Entity")
                        .with_pointer(attribute_pointer(field))
                })
            })
            .collect()
    }

    /// An attribute the definition does not declare.
    fn attribute_unknown(&self, field: &str) -> ErrorObject {
        ErrorObject::new(422, format!("The {} attribute is not recognised.", field))
            .with_title("Unprocessable Entity")
            .with_pointer(attribute_pointer(field))
    }

    /// Linkage with the wrong shape or type for the relationship.
    fn relationship_mismatch(
        &self,
        name: &str,
        cardinality: Cardinality,
        types: &[String],
        pointer: &str,
    ) -> ErrorObject {
        ErrorObject::new(
            422,
            format!(
                "The {} field must be a {} relationship containing {} resources.",
                name,
                cardinality.describe(),
                join_types(types)
            ),
        )
        .with_pointer(pointer)
    }

    /// Linkage that is not valid JSON:API at all.
    fn malformed_linkage(
        &self,
        name: &str,
        cardinality: Cardinality,
        types: &[String],
        _error: &LinkageError,
        pointer: &str,
    ) -> ErrorObject {
        self.relationship_mismatch(name, cardinality, types, pointer)
    }

    fn relationship_required(&self, name: &str) -> ErrorObject {
        ErrorObject::new(422, format!("The {} field is required.", name))
            .with_pointer("/data/relationships")
    }

    fn relationship_unknown(&self, name: &str, pointer: &str) -> ErrorObject {
        ErrorObject::new(422, format!("The {} relationship is not recognised.", name))
            .with_pointer(pointer)
    }

    fn relationship_read_only(&self, name: &str, pointer: &str) -> ErrorObject {
        ErrorObject::new(403, format!("The {} relationship cannot be modified.", name))
            .with_title("Forbidden")
            .with_pointer(pointer)
    }

    /// Add-to or remove-from requested on a to-one relationship.
    fn relationship_not_to_many(&self, name: &str) -> ErrorObject {
        ErrorObject::new(
            403,
            format!(
                "The {} relationship is a to-one relationship and can only be replaced.",
                name
            ),
        )
        .with_title("Forbidden")
        .with_pointer("/data")
    }

    fn related_not_found(
        &self,
        identifier: &ResourceIdentifier,
        status: u16,
        pointer: &str,
    ) -> ErrorObject {
        ErrorObject::new(
            status,
            format!("The related resource {} does not exist.", identifier),
        )
        .with_title("Related Resource Not Found")
        .with_pointer(pointer)
    }

    fn resource_not_found(&self, resource_type: &str, id: &str) -> ErrorObject {
        ErrorObject::new(404, format!("Resource {}:{} does not exist.", resource_type, id))
            .with_title("Not Found")
    }

    /// A read of a relationship the resource type does not have.
    fn relationship_not_found(&self, resource_type: &str, name: &str) -> ErrorObject {
        ErrorObject::new(
            404,
            format!("Resource type {} has no {} relationship.", resource_type, name),
        )
        .with_title("Not Found")
    }

    /// A create that supplies an id already in use.
    fn resource_id_taken(&self, resource_type: &str, id: &str) -> ErrorObject {
        ErrorObject::new(409, format!("Resource {}:{} already exists.", resource_type, id))
            .with_title("Conflict")
            .with_pointer("/data/id")
    }

    fn resource_type_conflict(&self, expected: &str, actual: &str) -> ErrorObject {
        ErrorObject::new(
            409,
            format!(
                "Resource type {} is not supported by this endpoint, expected {}.",
                actual, expected
            ),
        )
        .with_title("Conflict")
        .with_pointer("/data/type")
    }

    fn resource_id_conflict(&self, expected: &str, actual: &str) -> ErrorObject {
        ErrorObject::new(
            409,
            format!("Resource id {} does not match the endpoint id {}.", actual, expected),
        )
        .with_title("Conflict")
        .with_pointer("/data/id")
    }
}

/// The stock wording.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorFactory;

impl ErrorFactory for DefaultErrorFactory {}

/// Pointer to an attribute, escaped per RFC 6901.
pub fn attribute_pointer(field: &str) -> String {
    format!("/data/attributes/{}", escape_pointer(field))
}

/// Pointer to a relationship on a full resource document.
pub fn relationship_pointer(name: &str) -> String {
    format!("/data/relationships/{}", escape_pointer(name))
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// `users`, `users or admins`, `users, admins or guests`.
fn join_types(types: &[String]) -> String {
    match types {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}
