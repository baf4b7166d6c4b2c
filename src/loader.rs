//! Loading resource definitions and request documents.
//!
//! Handles loading from files, strings, and HTTP URLs.

use std::path::Path;

use serde_json::Value;

use crate::definition::ResourceDefinition;
use crate::error::DefinitionError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a JSON file.
///
/// # Errors
///
/// Returns `DefinitionError::FileNotFound` if the file doesn't exist,
/// or `DefinitionError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, DefinitionError> {
    if !path.exists() {
        return Err(DefinitionError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| DefinitionError::InvalidJson { source })
}

/// Load and check a resource definition from a file path.
///
/// # Errors
///
/// Returns `DefinitionError` if the file can't be read, isn't a valid
/// definition, or fails [`ResourceDefinition::check`].
pub fn load_definition(path: &Path) -> Result<ResourceDefinition, DefinitionError> {
    from_value(load_json(path)?)
}

/// Load and check a resource definition from a JSON string.
///
/// # Errors
///
/// Returns `DefinitionError::InvalidJson` if the string isn't a valid
/// definition, or `DefinitionError::Invalid` if it fails its checks.
pub fn load_definition_str(content: &str) -> Result<ResourceDefinition, DefinitionError> {
    let definition: ResourceDefinition =
        serde_json::from_str(content).map_err(|source| DefinitionError::InvalidJson { source })?;
    definition.check()?;
    Ok(definition)
}

/// Load a resource definition from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `DefinitionError::NetworkError` if the request fails,
/// or a parse error if the body isn't a valid definition.
#[cfg(feature = "remote")]
pub fn load_definition_url(url: &str) -> Result<ResourceDefinition, DefinitionError> {
    let network = |source| DefinitionError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    // Check for HTTP errors before parsing
    let value: Value = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network)?;

    from_value(value)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a resource definition from a file path or URL.
///
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_definition_auto(source: &str) -> Result<ResourceDefinition, DefinitionError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_definition_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(DefinitionError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_definition(Path::new(source))
    }
}

fn from_value(value: Value) -> Result<ResourceDefinition, DefinitionError> {
    let definition: ResourceDefinition =
        serde_json::from_value(value).map_err(|source| DefinitionError::InvalidJson { source })?;
    definition.check()?;
    Ok(definition)
}
