//! Request pipelines: resource validation, relationship endpoint mutation
//! and resource saves.
//!
//! Every write runs inside [`RelationStore::transaction`], so a rejected or
//! failed request leaves the store untouched.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::attributes::{AttributesValidator, RuleEngine, Session};
use crate::definition::{NotFoundPolicy, ResourceDefinition, ValidationPolicy};
use crate::error::{ErrorObject, MutationError, QueryError, RuleError};
use crate::factory::{relationship_pointer, DefaultErrorFactory, ErrorFactory};
use crate::fields::SchemaFields;
use crate::linkage::RelationshipValidator;
use crate::query::QueryParameters;
use crate::relations::{Delta, Owner, Relation, Verb};
use crate::store::{RelationStore, Row};
use crate::types::{Cardinality, Linkage, Resource, ResourceIdentifier};

/// What a resource document is being validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    Create,
    /// Update of the resource with this id.
    Update(&'a str),
}

/// Validates a whole resource document against its definition.
pub struct ResourceValidator<'d, E, F = DefaultErrorFactory> {
    definition: &'d ResourceDefinition,
    factory: F,
    attributes: AttributesValidator<E, F>,
    relationships: RelationshipValidator<F>,
    policy: ValidationPolicy,
    conflicts: Vec<ErrorObject>,
    undeclared: Vec<ErrorObject>,
}

impl<'d, E: RuleEngine> ResourceValidator<'d, E> {
    pub fn new(definition: &'d ResourceDefinition, engine: E) -> Self {
        let attributes = AttributesValidator::new(engine, definition.attributes.clone())
            .messages(definition.messages.clone())
            .custom_attributes(definition.custom_attributes.clone());

        Self {
            definition,
            factory: DefaultErrorFactory,
            attributes,
            relationships: RelationshipValidator::new(),
            policy: definition.policy,
            conflicts: Vec::new(),
            undeclared: Vec::new(),
        }
    }
}

impl<'d, E: RuleEngine, F: ErrorFactory + Clone> ResourceValidator<'d, E, F> {
    pub fn with_factory<G: ErrorFactory + Clone>(self, factory: G) -> ResourceValidator<'d, E, G> {
        ResourceValidator {
            definition: self.definition,
            attributes: self.attributes.with_factory(factory.clone()),
            relationships: self.relationships.with_factory(factory.clone()),
            factory,
            policy: self.policy,
            conflicts: self.conflicts,
            undeclared: self.undeclared,
        }
    }

    /// Override the definition's validation policy.
    pub fn policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Customize each attribute session before it is evaluated.
    pub fn hook(mut self, hook: impl FnMut(&mut Session) + 'static) -> Self {
        self.attributes = self.attributes.hook(hook);
        self
    }

    /// Is `resource` acceptable for `operation`?
    ///
    /// A type or id conflict stops validation immediately. An attribute the
    /// definition does not declare is an attribute failure. Relationships
    /// are skipped after an attribute failure unless the policy is
    /// [`ValidationPolicy::CollectAll`].
    ///
    /// # Errors
    ///
    /// Returns `RuleError` if the attribute rules cannot be evaluated.
    pub fn validate(
        &mut self,
        resource: &Resource,
        operation: Operation<'_>,
    ) -> Result<bool, RuleError> {
        let expected = self.definition.resource_type.as_str();
        if resource.resource_type() != expected {
            let error = self
                .factory
                .resource_type_conflict(expected, resource.resource_type());
            debug!(detail = %error.detail, "resource conflict");
            self.conflicts.push(error);
            return Ok(false);
        }

        if let (Operation::Update(id), Some(actual)) = (operation, resource.id()) {
            if actual != id {
                let error = self.factory.resource_id_conflict(id, actual);
                debug!(detail = %error.detail, "resource conflict");
                self.conflicts.push(error);
                return Ok(false);
            }
        }

        let unknown: Vec<_> = resource
            .attributes()
            .keys()
            .filter(|field| !self.definition.attributes.contains_key(*field))
            .map(|field| self.factory.attribute_unknown(field))
            .collect();
        let declared_only = unknown.is_empty();
        self.undeclared.extend(unknown);

        let attributes_valid = self.attributes.is_valid(resource)? && declared_only;
        if !attributes_valid && self.policy == ValidationPolicy::FailFast {
            return Ok(false);
        }

        let creating = operation == Operation::Create;
        let relationships_valid = self.relationships.is_valid(self.definition, resource, creating);

        Ok(attributes_valid && relationships_valid)
    }

    /// Conflicts first, then attribute errors, then relationship errors.
    pub fn errors(&self) -> Vec<ErrorObject> {
        self.conflicts
            .iter()
            .chain(&self.undeclared)
            .chain(self.attributes.errors())
            .chain(self.relationships.errors())
            .cloned()
            .collect()
    }

    pub fn take_errors(&mut self) -> Vec<ErrorObject> {
        let mut errors = std::mem::take(&mut self.conflicts);
        errors.append(&mut self.undeclared);
        errors.extend(self.attributes.take_errors());
        errors.extend(self.relationships.take_errors());
        errors
    }

    pub fn reset(&mut self) {
        self.conflicts.clear();
        self.undeclared.clear();
        self.attributes.reset();
        self.relationships.reset();
    }
}

/// Check the query parameters against `definition` and build the response
/// projection.
///
/// # Errors
///
/// Returns `QueryError` for an include path, sort field or filter key the
/// definition does not allow.
pub fn resolve_fields(
    definition: &ResourceDefinition,
    query: &QueryParameters,
) -> Result<SchemaFields, QueryError> {
    check_query(definition, query)?;
    Ok(query.schema_fields())
}

pub(crate) fn check_query(
    definition: &ResourceDefinition,
    query: &QueryParameters,
) -> Result<(), QueryError> {
    query.check_include(&definition.include_paths)?;
    query.check_sort(&definition.sort_fields)?;
    query.check_filters(&definition.filters)
}

/// Progress of a relationship mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Received,
    /// Linkage is well formed and of the right types.
    Validated,
    /// Every referenced resource exists.
    Resolved,
    Applied,
    Rejected,
}

/// A completed relationship mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub state: MutationState,
    pub delta: Delta,
}

impl MutationOutcome {
    /// Relationship endpoints answer 204 No Content.
    pub fn status(&self) -> u16 {
        204
    }
}

/// A replace, add-to or remove-from request on a relationship endpoint.
#[derive(Debug)]
pub struct RelationshipMutation<'d, F = DefaultErrorFactory> {
    definition: &'d ResourceDefinition,
    name: String,
    verb: Verb,
    factory: F,
    state: MutationState,
}

impl<'d> RelationshipMutation<'d> {
    pub fn new(definition: &'d ResourceDefinition, name: impl Into<String>, verb: Verb) -> Self {
        Self {
            definition,
            name: name.into(),
            verb,
            factory: DefaultErrorFactory,
            state: MutationState::Received,
        }
    }
}

impl<'d, F: ErrorFactory + Clone> RelationshipMutation<'d, F> {
    pub fn with_factory<G: ErrorFactory + Clone>(self, factory: G) -> RelationshipMutation<'d, G> {
        RelationshipMutation {
            definition: self.definition,
            name: self.name,
            verb: self.verb,
            factory,
            state: self.state,
        }
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    /// Apply the linkage in `data` to the relationship of `owner_id`.
    ///
    /// `data` is the `data` member of the request document.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Rejected` with the error objects to report,
    /// or `MutationError::Store` if the store fails. Either way nothing is
    /// written.
    pub fn execute<S: RelationStore>(
        &mut self,
        store: &mut S,
        owner_id: &str,
        data: &Value,
    ) -> Result<MutationOutcome, MutationError> {
        self.state = MutationState::Received;
        let result = store.transaction(|store| self.run(store, owner_id, data));

        match result {
            Ok(delta) => {
                info!(
                    resource_type = %self.definition.resource_type,
                    relationship = %self.name,
                    owner = owner_id,
                    verb = ?self.verb,
                    associated = delta.associated.len(),
                    disassociated = delta.disassociated.len(),
                    "relationship mutated"
                );
                Ok(MutationOutcome {
                    state: self.state,
                    delta,
                })
            }
            Err(error) => {
                warn!(
                    resource_type = %self.definition.resource_type,
                    relationship = %self.name,
                    owner = owner_id,
                    after = ?self.state,
                    %error,
                    "relationship mutation rejected"
                );
                self.state = MutationState::Rejected;
                Err(error)
            }
        }
    }

    fn run<S: RelationStore>(
        &mut self,
        store: &mut S,
        owner_id: &str,
        data: &Value,
    ) -> Result<Delta, MutationError> {
        let definition = self.definition;
        let name = self.name.as_str();

        let Some(relation) = definition.relation(name) else {
            return Err(rejected(self.factory.relationship_unknown(name, "/data")));
        };

        if relation.kind.is_read_only() {
            return Err(rejected(self.factory.relationship_read_only(name, "/data")));
        }

        if relation.cardinality() == Cardinality::ToOne && self.verb != Verb::Replace {
            return Err(rejected(self.factory.relationship_not_to_many(name)));
        }

        let mut validator = RelationshipValidator::new().with_factory(self.factory.clone());
        let Some(linkage) = validator.linkage(name, relation, data, "/data") else {
            return Err(MutationError::Rejected {
                errors: validator.take_errors(),
            });
        };
        self.state = MutationState::Validated;

        if !store.exists(definition.table(), owner_id)? {
            let error = self
                .factory
                .resource_not_found(&definition.resource_type, owner_id);
            return Err(rejected(error));
        }

        let targets = resolve(
            store,
            relation,
            &linkage,
            definition.not_found,
            &self.factory,
            "/data",
        )?;
        self.state = MutationState::Resolved;

        let owner = Owner::new(definition.table(), owner_id);
        let delta = relation.apply(store, owner, self.verb, &targets)?;
        self.state = MutationState::Applied;

        Ok(delta)
    }
}

/// A saved resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub id: String,
    pub created: bool,
}

impl ResourceOutcome {
    /// 201 Created or 200 OK.
    pub fn status(&self) -> u16 {
        if self.created {
            201
        } else {
            200
        }
    }
}

/// Validate `resource` and write its attributes and relationships.
///
/// On update, stored values of declared attributes the document omits are
/// validated along with the submitted ones, and every relationship in the
/// document is replaced. Only declared attributes are written.
///
/// # Errors
///
/// Returns `MutationError::Rejected` for validation failures, a missing
/// resource, a client id already in use or unresolvable linkage; `MutationError::Rule` if the rules
/// cannot be evaluated; `MutationError::Store` if the store fails.
pub fn save_resource<E: RuleEngine, S: RelationStore>(
    definition: &ResourceDefinition,
    engine: E,
    store: &mut S,
    resource: &Resource,
    operation: Operation<'_>,
) -> Result<ResourceOutcome, MutationError> {
    let factory = DefaultErrorFactory;
    let table = definition.table();

    let candidate = match operation {
        Operation::Create => {
            if let Some(id) = resource.id() {
                if store.exists(table, id)? {
                    let error = factory.resource_id_taken(&definition.resource_type, id);
                    return Err(rejected(error));
                }
            }
            resource.clone()
        }
        Operation::Update(id) => {
            if !store.exists(table, id)? {
                let error = factory.resource_not_found(&definition.resource_type, id);
                return Err(rejected(error));
            }
            merge_stored_attributes(definition, store, resource, id)?
        }
    };

    let mut validator = ResourceValidator::new(definition, engine);
    if !validator.validate(&candidate, operation)? {
        let errors = validator.take_errors();
        warn!(
            resource_type = %definition.resource_type,
            errors = errors.len(),
            "resource rejected"
        );
        return Err(MutationError::Rejected { errors });
    }

    let outcome = store.transaction(|store| {
        let row: Row = resource
            .attributes()
            .iter()
            .filter(|(field, _)| definition.attributes.contains_key(*field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        let (id, created) = match operation {
            Operation::Create => {
                let mut row = row;
                if let Some(id) = resource.id() {
                    row.insert("id".to_string(), Value::String(id.to_string()));
                }
                (store.insert(table, row)?, true)
            }
            Operation::Update(id) => {
                store.update(table, id, &row)?;
                (id.to_string(), false)
            }
        };

        let owner = Owner::new(table, &id);
        for (name, object) in resource.relationships() {
            let Some(relation) = definition.relation(name) else {
                continue;
            };
            let pointer = relationship_pointer(name);
            let data = object.get("data").unwrap_or(&Value::Null);
            let linkage = Linkage::parse(data).map_err(|e| {
                rejected(factory.malformed_linkage(
                    name,
                    relation.cardinality(),
                    &relation.related_types,
                    &e,
                    &pointer,
                ))
            })?;
            let targets = resolve(
                store,
                relation,
                &linkage,
                definition.not_found,
                &factory,
                &pointer,
            )?;
            relation.apply(store, owner, Verb::Replace, &targets)?;
        }

        Ok::<_, MutationError>(ResourceOutcome { id, created })
    })?;

    info!(
        resource_type = %definition.resource_type,
        id = %outcome.id,
        created = outcome.created,
        "resource saved"
    );
    Ok(outcome)
}

/// Check every identifier in `linkage` exists and return them.
fn resolve<S: RelationStore, F: ErrorFactory>(
    store: &S,
    relation: &Relation,
    linkage: &Linkage,
    not_found: NotFoundPolicy,
    factory: &F,
    pointer: &str,
) -> Result<Vec<ResourceIdentifier>, MutationError> {
    let mut targets = Vec::with_capacity(linkage.identifiers().len());
    let mut errors = Vec::new();

    for identifier in linkage.identifiers() {
        let table = relation.table_for(&identifier.resource_type);
        if store.exists(table, &identifier.id)? {
            targets.push(identifier.clone());
        } else {
            errors.push(factory.related_not_found(identifier, not_found.status(), pointer));
        }
    }

    if errors.is_empty() {
        Ok(targets)
    } else {
        Err(MutationError::Rejected { errors })
    }
}

/// `resource` with stored values filled in for omitted declared attributes.
///
/// # Errors
///
/// Returns `MutationError::Store` if the stored row cannot be read.
pub fn merge_stored_attributes<S: RelationStore>(
    definition: &ResourceDefinition,
    store: &S,
    resource: &Resource,
    id: &str,
) -> Result<Resource, MutationError> {
    let stored = store.fetch(definition.table(), id)?;
    let mut merged = resource.clone();
    for field in definition.attributes.keys() {
        if resource.attributes().contains_key(field) {
            continue;
        }
        if let Some(value) = stored.get(field) {
            merged = merged.with_attribute(field.clone(), value.clone());
        }
    }
    Ok(merged)
}

pub(crate) fn rejected(error: ErrorObject) -> MutationError {
    MutationError::Rejected {
        errors: vec![error],
    }
}
