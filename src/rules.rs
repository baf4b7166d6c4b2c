//! Rule engine backed by JSON Schema.
//!
//! Rules map each attribute to a JSON Schema fragment. A fragment may carry
//! `"required": true`, which is hoisted into the object's `required` list:
//!
//! ```json
//! {
//!     "title": { "type": "string", "maxLength": 255, "required": true },
//!     "tags": { "type": "array", "items": { "type": "string" } }
//! }
//! ```

use jsonschema::error::ValidationErrorKind;
use serde_json::{json, Map, Value};

use crate::attributes::{MessageBag, RuleEngine, Session, ValidationOutcome};
use crate::error::RuleError;

/// Evaluates attribute rules with the `jsonschema` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaEngine;

impl RuleEngine for JsonSchemaEngine {
    fn evaluate(&self, session: &Session) -> Result<ValidationOutcome, RuleError> {
        let schema = compile_rules(session.rules());
        let validator = jsonschema::validator_for(&schema).map_err(|e| RuleError::InvalidRules {
            message: e.to_string(),
        })?;

        let instance = Value::Object(session.data().clone());
        let mut bag = MessageBag::default();

        for error in validator.iter_errors(&instance) {
            let field = match &error.kind {
                ValidationErrorKind::Required { property } => property
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| property.to_string()),
                _ => first_segment(&error.instance_path.to_string()),
            };
            let keyword = last_segment(&error.schema_path.to_string());
            let message = render_message(session, &field, &keyword, &error.to_string());
            bag.add(field, message);
        }

        Ok(ValidationOutcome::new(bag))
    }
}

/// Build the object schema for a rule map.
pub fn compile_rules(rules: &Map<String, Value>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for (field, rule) in rules {
        let mut rule = rule.clone();
        if let Value::Object(map) = &mut rule {
            // Only the boolean form is ours; an array is left for jsonschema.
            if let Some(Value::Bool(flag)) = map.get("required") {
                if *flag {
                    required.push(Value::String(field.clone()));
                }
                map.remove("required");
            }
        }
        properties.insert(field.clone(), rule);
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn render_message(session: &Session, field: &str, keyword: &str, detail: &str) -> String {
    let attribute = session.attribute_name(field);
    let template = session
        .messages()
        .get(&format!("{}.{}", field, keyword))
        .or_else(|| session.messages().get(keyword));

    match template {
        Some(template) => template.replace(":attribute", &attribute),
        None if keyword == "required" => format!("The {} field is required.", attribute),
        None => format!("The {} field is invalid: {}.", attribute, detail),
    }
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn first_segment(pointer: &str) -> String {
    pointer
        .trim_start_matches('/')
        .split('/')
        .next()
        .map(unescape)
        .unwrap_or_default()
}

fn last_segment(pointer: &str) -> String {
    pointer.rsplit('/').next().map(unescape).unwrap_or_default()
}
