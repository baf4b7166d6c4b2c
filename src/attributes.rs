//! Attribute validation through a pluggable rule engine.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ErrorObject, RuleError};
use crate::factory::{DefaultErrorFactory, ErrorFactory};
use crate::types::Resource;

/// Field name to the ordered messages reported for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageBag(BTreeMap<String, Vec<String>>);

impl MessageBag {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of messages across all fields.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

/// Everything a rule engine needs for one evaluation.
///
/// The customization hook receives the session mutably before evaluation and
/// may add or remove rules.
#[derive(Debug, Clone, Default)]
pub struct Session {
    data: Map<String, Value>,
    rules: Map<String, Value>,
    messages: BTreeMap<String, String>,
    custom_attributes: BTreeMap<String, String>,
}

impl Session {
    pub fn new(
        data: Map<String, Value>,
        rules: Map<String, Value>,
        messages: BTreeMap<String, String>,
        custom_attributes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            data,
            rules,
            messages,
            custom_attributes,
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn rules(&self) -> &Map<String, Value> {
        &self.rules
    }

    pub fn messages(&self) -> &BTreeMap<String, String> {
        &self.messages
    }

    pub fn custom_attributes(&self) -> &BTreeMap<String, String> {
        &self.custom_attributes
    }

    /// Whether the submitted data contains `field`.
    pub fn has(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    /// Set or replace the rule for `field`.
    pub fn add_rule(&mut self, field: impl Into<String>, rule: Value) {
        self.rules.insert(field.into(), rule);
    }

    pub fn remove_rule(&mut self, field: &str) -> Option<Value> {
        self.rules.remove(field)
    }

    /// Display name for `field` in messages.
    pub fn attribute_name(&self, field: &str) -> String {
        self.custom_attributes
            .get(field)
            .cloned()
            .unwrap_or_else(|| field.replace('_', " "))
    }
}

/// Result of a rule evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    messages: MessageBag,
}

impl ValidationOutcome {
    pub fn new(messages: MessageBag) -> Self {
        Self { messages }
    }

    pub fn passes(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn fails(&self) -> bool {
        !self.passes()
    }

    pub fn messages(&self) -> &MessageBag {
        &self.messages
    }

    pub fn into_messages(self) -> MessageBag {
        self.messages
    }
}

/// Evaluates a session's rules against its data.
///
/// Implementations must report every failing field, not just the first.
pub trait RuleEngine {
    /// # Errors
    ///
    /// Returns `RuleError` if the rules themselves cannot be used.
    fn evaluate(&self, session: &Session) -> Result<ValidationOutcome, RuleError>;
}

impl<E: RuleEngine + ?Sized> RuleEngine for &E {
    fn evaluate(&self, session: &Session) -> Result<ValidationOutcome, RuleError> {
        (**self).evaluate(session)
    }
}

/// Hook run against the session before evaluation.
pub type SessionHook = Box<dyn FnMut(&mut Session)>;

/// Validates the attributes of a resource.
///
/// Errors accumulate across calls until [`reset`](Self::reset) or
/// [`take_errors`](Self::take_errors).
pub struct AttributesValidator<E, F = DefaultErrorFactory> {
    engine: E,
    factory: F,
    rules: Map<String, Value>,
    messages: BTreeMap<String, String>,
    custom_attributes: BTreeMap<String, String>,
    hook: Option<SessionHook>,
    errors: Vec<ErrorObject>,
}

impl<E: RuleEngine> AttributesValidator<E> {
    pub fn new(engine: E, rules: Map<String, Value>) -> Self {
        Self {
            engine,
            factory: DefaultErrorFactory,
            rules,
            messages: BTreeMap::new(),
            custom_attributes: BTreeMap::new(),
            hook: None,
            errors: Vec::new(),
        }
    }
}

impl<E: RuleEngine, F: ErrorFactory> AttributesValidator<E, F> {
    /// Use a different error factory.
    pub fn with_factory<G: ErrorFactory>(self, factory: G) -> AttributesValidator<E, G> {
        AttributesValidator {
            engine: self.engine,
            factory,
            rules: self.rules,
            messages: self.messages,
            custom_attributes: self.custom_attributes,
            hook: self.hook,
            errors: self.errors,
        }
    }

    /// Message overrides, keyed by `{field}.{rule}` or `{rule}`.
    pub fn messages(mut self, messages: BTreeMap<String, String>) -> Self {
        self.messages = messages;
        self
    }

    /// Display names for fields.
    pub fn custom_attributes(mut self, custom_attributes: BTreeMap<String, String>) -> Self {
        self.custom_attributes = custom_attributes;
        self
    }

    /// Customize each session before it is evaluated.
    pub fn hook(mut self, hook: impl FnMut(&mut Session) + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Are the attributes on `resource` valid?
    ///
    /// On failure the translated errors are appended to [`errors`](Self::errors).
    ///
    /// # Errors
    ///
    /// Returns `RuleError` if the engine rejects the rule set.
    pub fn is_valid(&mut self, resource: &Resource) -> Result<bool, RuleError> {
        let session = self.make(resource.attributes().clone());
        let outcome = self.engine.evaluate(&session)?;

        if outcome.fails() {
            debug!(
                resource_type = resource.resource_type(),
                failures = outcome.messages().len(),
                "attribute validation failed"
            );
            let errors = self.factory.invalid_attributes(outcome.messages());
            self.errors.extend(errors);
            return Ok(false);
        }

        Ok(true)
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

    fn make(&mut self, data: Map<String, Value>) -> Session {
        let mut session = Session::new(
            data,
            self.rules.clone(),
            self.messages.clone(),
            self.custom_attributes.clone(),
        );

        if let Some(hook) = self.hook.as_mut() {
            hook(&mut session);
        }

        session
    }
}

impl<E, F> std::fmt::Debug for AttributesValidator<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributesValidator")
            .field("rules", &self.rules)
            .field("hook", &self.hook.is_some())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
