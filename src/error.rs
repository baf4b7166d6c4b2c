//! Error types for JSON:API resource validation and relationship mutation.
//!
//! Validation failures are values ([`ErrorObject`]) that accumulate and are
//! rendered into an error document. Everything else is a fatal error enum.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Location of the offending part of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSource {
    /// JSON Pointer (RFC 6901) into the request document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// Name of the offending query parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl ErrorSource {
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: Some(pointer.into()),
            parameter: None,
        }
    }

    pub fn parameter(parameter: impl Into<String>) -> Self {
        Self {
            pointer: None,
            parameter: Some(parameter.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pointer.is_none() && self.parameter.is_none()
    }
}

/// A JSON:API error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorObject {
    /// HTTP status code, as a string per JSON:API.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub detail: String,
    #[serde(skip_serializing_if = "ErrorSource::is_empty")]
    pub source: ErrorSource,
}

impl ErrorObject {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            title: None,
            code: None,
            detail: detail.into(),
            source: ErrorSource::default(),
        }
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.source = ErrorSource::pointer(pointer);
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.source = ErrorSource::parameter(parameter);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Numeric status; malformed status strings count as 500.
    pub fn status_code(&self) -> u16 {
        self.status.parse().unwrap_or(500)
    }

    /// The pointer or parameter this error refers to, if any.
    pub fn location(&self) -> Option<&str> {
        self.source
            .pointer
            .as_deref()
            .or(self.source.parameter.as_deref())
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.location() {
            Some(location) => write!(f, "[{}] {}: {}", self.status, location, self.detail),
            None => write!(f, "[{}] {}", self.status, self.detail),
        }
    }
}

/// The `errors` member of a JSON:API error document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

impl ErrorDocument {
    pub fn new(errors: Vec<ErrorObject>) -> Self {
        Self { errors }
    }

    /// HTTP status for the whole document.
    ///
    /// A single shared status is used as-is. Mixed 4xx statuses collapse to
    /// 400, anything involving a 5xx collapses to 500.
    pub fn status(&self) -> u16 {
        let mut codes = self.errors.iter().map(ErrorObject::status_code);
        let Some(first) = codes.next() else {
            return 500;
        };

        let mut mixed = false;
        let mut server = first >= 500;
        for code in codes {
            mixed |= code != first;
            server |= code >= 500;
        }

        match (mixed, server) {
            (false, _) => first,
            (true, false) => 400,
            (true, true) => 500,
        }
    }
}

impl From<Vec<ErrorObject>> for ErrorDocument {
    fn from(errors: Vec<ErrorObject>) -> Self {
        Self::new(errors)
    }
}

/// Errors decoding an inbound request document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("document must contain a top-level data member")]
    MissingData,

    #[error("invalid member at {pointer}: expected {expected}, got {actual}")]
    InvalidMember {
        pointer: String,
        expected: &'static str,
        actual: String,
    },
}

impl DocumentError {
    pub fn pointer(&self) -> &str {
        match self {
            Self::InvalidJson { .. } => "",
            Self::MissingData => "/",
            Self::InvalidMember { pointer, .. } => pointer,
        }
    }

    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject::new(400, self.to_string())
            .with_title("Invalid Document")
            .with_pointer(self.pointer())
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors in the `include`, `fields`, `sort`, `filter` or `page` query
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("include path \"{path}\" is not allowed")]
    IncludeNotAllowed { path: String },

    #[error("include path \"{path}\" is malformed")]
    MalformedInclude { path: String },

    #[error("fields parameter \"{key}\" is malformed")]
    MalformedFields { key: String },

    #[error("fields parameter for \"{resource_type}\" must be a string, got {actual}")]
    InvalidFieldsValue {
        resource_type: String,
        actual: String,
    },

    #[error("include parameter must be a string, got {actual}")]
    InvalidIncludeValue { actual: String },

    #[error("Sort parameter {field} is not allowed.")]
    SortNotAllowed { field: String },

    #[error("sort parameter \"{value}\" is malformed")]
    MalformedSort { value: String },

    #[error("Filter parameter {key} is not allowed.")]
    FilterNotAllowed { key: String },

    #[error("filter parameter \"{key}\" is malformed")]
    MalformedFilter { key: String },

    #[error("The filter.{key} field must have a value.")]
    EmptyFilter { key: String },

    #[error("page parameter \"{key}\" is malformed")]
    MalformedPage { key: String },

    #[error("The page.{member} field must be a positive integer.")]
    InvalidPageValue { member: String, value: String },
}

impl QueryError {
    /// Name of the query parameter at fault, dotted for a member of a
    /// family such as `filter.name` or `page.number`.
    pub fn parameter(&self) -> String {
        match self {
            Self::IncludeNotAllowed { .. }
            | Self::MalformedInclude { .. }
            | Self::InvalidIncludeValue { .. } => "include".to_string(),
            Self::MalformedFields { .. } | Self::InvalidFieldsValue { .. } => "fields".to_string(),
            Self::SortNotAllowed { .. } | Self::MalformedSort { .. } => "sort".to_string(),
            Self::FilterNotAllowed { .. } | Self::MalformedFilter { .. } => "filter".to_string(),
            Self::EmptyFilter { key } => format!("filter.{}", key),
            Self::MalformedPage { .. } => "page".to_string(),
            Self::InvalidPageValue { member, .. } => format!("page.{}", member),
        }
    }

    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject::new(400, self.to_string())
            .with_title("Invalid Query Parameter")
            .with_parameter(self.parameter())
    }
}

/// Malformed relationship linkage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkageError {
    #[error("expected null, an object or an array, got {actual}")]
    InvalidShape { actual: String },

    #[error("resource identifier must be an object, got {actual}")]
    NotAnObject { actual: String },

    #[error("resource identifier must have a non-empty string \"{member}\" member")]
    InvalidMember { member: &'static str },
}

/// The rule set handed to a rule engine could not be used.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid rules: {message}")]
    InvalidRules { message: String },
}

/// Failures raised by a relation store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no table named {table}")]
    UnknownTable { table: String },

    #[error("no row {id} in {table}")]
    MissingRow { table: String, id: String },

    #[error("{operation} is not supported by {kind} relations")]
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },

    #[error("store failure: {message}")]
    Backend { message: String },
}

/// Errors from resource saves, relationship mutations and relationship reads.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("request rejected with {} error(s)", errors.len())]
    Rejected { errors: Vec<ErrorObject> },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rule(#[from] RuleError),
}

impl MutationError {
    /// HTTP status for the response.
    pub fn status(&self) -> u16 {
        match self {
            Self::Rejected { errors } => ErrorDocument::new(errors.clone()).status(),
            Self::Store(_) | Self::Rule(_) => 500,
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Rejected { .. } => 1,
            Self::Rule(_) => 2,
            Self::Store(_) => 3,
        }
    }
}

/// Errors loading a resource definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid definition: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid definition for {resource_type}: {message}")]
    Invalid {
        resource_type: String,
        message: String,
    },
}

impl DefinitionError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DefinitionError::FileNotFound { .. } | DefinitionError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            DefinitionError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}
