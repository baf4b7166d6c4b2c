//! Relationship reads: the linkage served by a relationship endpoint and the
//! related resources served by a related-resource endpoint.

use std::cmp::Ordering;

use serde_json::Value;
use tracing::debug;

use crate::definition::ResourceDefinition;
use crate::error::{MutationError, StoreError};
use crate::factory::{DefaultErrorFactory, ErrorFactory};
use crate::pipeline::{check_query, rejected};
use crate::query::{QueryParameters, SortField};
use crate::relations::{Owner, Relation};
use crate::store::{key_string, RelationStore, Row};
use crate::types::{Cardinality, Linkage, ResourceIdentifier};

/// A related resource and its stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedResource {
    pub identifier: ResourceIdentifier,
    pub row: Row,
}

/// The linkage of relationship `name` on the resource `owner_id`.
///
/// A to-one relationship reads as [`Linkage::Null`] or [`Linkage::One`], a
/// to-many relationship as [`Linkage::Many`], possibly empty.
///
/// # Errors
///
/// Returns `MutationError::Rejected` with a 404 if the relationship or the
/// owner does not exist, or `MutationError::Store` if the store fails.
pub fn read_relationship<S: RelationStore>(
    definition: &ResourceDefinition,
    store: &S,
    owner_id: &str,
    name: &str,
) -> Result<Linkage, MutationError> {
    let relation = find(definition, store, owner_id, name)?;
    let targets = relation.current_targets(store, Owner::new(definition.table(), owner_id))?;

    let linkage = match relation.cardinality() {
        Cardinality::ToOne => targets.into_iter().next().map_or(Linkage::Null, Linkage::One),
        Cardinality::ToMany => Linkage::Many(targets),
    };
    debug!(
        resource_type = %definition.resource_type,
        relationship = name,
        owner = owner_id,
        related = linkage.identifiers().len(),
        "relationship read"
    );
    Ok(linkage)
}

/// The resources related to `owner_id` through `name`, filtered, sorted and
/// paged by `query`.
///
/// `related` is the definition of the related resource type; the query's
/// include paths, sort fields and filter keys are checked against it.
/// Filters match a case-insensitive substring of the column. Pagination
/// applies only when `page[size]` is given.
///
/// # Errors
///
/// Returns `MutationError::Rejected` with a 404 if the relationship or the
/// owner does not exist, or a 400 for a query parameter `related` does not
/// allow; `MutationError::Store` if the store fails.
pub fn read_related<S: RelationStore>(
    definition: &ResourceDefinition,
    related: &ResourceDefinition,
    store: &S,
    owner_id: &str,
    name: &str,
    query: &QueryParameters,
) -> Result<Vec<RelatedResource>, MutationError> {
    let relation = find(definition, store, owner_id, name)?;
    check_query(related, query).map_err(|error| rejected(error.to_error_object()))?;

    let targets = relation.current_targets(store, Owner::new(definition.table(), owner_id))?;
    let mut resources = targets
        .into_iter()
        .map(|identifier| {
            let table = relation.table_for(&identifier.resource_type);
            let row = store.fetch(table, &identifier.id)?;
            Ok(RelatedResource { identifier, row })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    resources.retain(|resource| matches_filters(&resource.row, query));
    sort_resources(&mut resources, query.sort());
    if let Some((skip, take)) = query.page().window() {
        resources = resources.into_iter().skip(skip).take(take).collect();
    }

    debug!(
        resource_type = %definition.resource_type,
        relationship = name,
        owner = owner_id,
        related = resources.len(),
        "related resources read"
    );
    Ok(resources)
}

fn find<'d, S: RelationStore>(
    definition: &'d ResourceDefinition,
    store: &S,
    owner_id: &str,
    name: &str,
) -> Result<&'d Relation, MutationError> {
    let factory = DefaultErrorFactory;
    let Some(relation) = definition.relation(name) else {
        return Err(rejected(
            factory.relationship_not_found(&definition.resource_type, name),
        ));
    };
    if !store.exists(definition.table(), owner_id)? {
        return Err(rejected(
            factory.resource_not_found(&definition.resource_type, owner_id),
        ));
    }
    Ok(relation)
}

fn matches_filters(row: &Row, query: &QueryParameters) -> bool {
    query.filters().iter().all(|(key, needle)| {
        row.get(key)
            .and_then(key_string)
            .is_some_and(|value| value.to_lowercase().contains(&needle.to_lowercase()))
    })
}

fn sort_resources(resources: &mut [RelatedResource], sort: &[SortField]) {
    if sort.is_empty() {
        return;
    }
    resources.sort_by(|a, b| {
        sort.iter()
            .map(|field| {
                let order = compare(a.row.get(&field.field), b.row.get(&field.field));
                if field.descending {
                    order.reverse()
                } else {
                    order
                }
            })
            .find(|order| order.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Numbers compare numerically, everything else by its string form; a
/// missing or null column sorts first.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => a.and_then(key_string).cmp(&b.and_then(key_string)),
    }
}
