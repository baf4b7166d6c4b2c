//! Parsing of the `include`, `fields[type]`, `sort`, `filter[key]` and
//! `page[member]` query parameters.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::QueryError;
use crate::fields::SchemaFields;
use crate::types::json_type_name;

/// One `sort` field, `-` prefixed for descending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

/// The `page[number]` and `page[size]` members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub number: Option<u64>,
    pub size: Option<u64>,
}

impl Page {
    /// Rows to skip and keep, or `None` when no page size was requested.
    pub fn window(&self) -> Option<(usize, usize)> {
        let size = usize::try_from(self.size?).ok()?;
        let number = usize::try_from(self.number.unwrap_or(1)).ok()?;
        Some((number.saturating_sub(1).saturating_mul(size), size))
    }
}

/// The query parameters requested by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    include: Vec<String>,
    fieldsets: BTreeMap<String, String>,
    sort: Vec<SortField>,
    filters: BTreeMap<String, String>,
    page: Page,
}

impl QueryParameters {
    /// Parse decoded query-string pairs.
    ///
    /// Recognises `include`, `fields[{type}]`, `sort`, `filter[{key}]` and
    /// `page[number|size]`; any other key is left to other handlers.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` for a malformed key or value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            if key == "include" {
                params.include = parse_include(value)?;
            } else if key == "sort" {
                params.sort = parse_sort(value)?;
            } else if in_family(key, "fields") {
                let resource_type =
                    member(key, "fields").ok_or_else(|| QueryError::MalformedFields {
                        key: key.to_string(),
                    })?;
                params
                    .fieldsets
                    .insert(resource_type.to_string(), value.to_string());
            } else if in_family(key, "filter") {
                let name = member(key, "filter").ok_or_else(|| QueryError::MalformedFilter {
                    key: key.to_string(),
                })?;
                params.add_filter(name, value)?;
            } else if in_family(key, "page") {
                let name = member(key, "page").ok_or_else(|| QueryError::MalformedPage {
                    key: key.to_string(),
                })?;
                params.set_page(name, value)?;
            }
        }

        Ok(params)
    }

    /// Parse query parameters already decoded into nested JSON, e.g.
    /// `{"include": "author", "fields": {"posts": "title"}, "page": {"size": 2}}`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if a parameter has the wrong JSON shape or an
    /// invalid value.
    pub fn from_value(query: &Value) -> Result<Self, QueryError> {
        let mut params = Self::default();

        match query.get("include") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => params.include = parse_include(s)?,
            Some(other) => {
                return Err(QueryError::InvalidIncludeValue {
                    actual: json_type_name(other).to_string(),
                })
            }
        }

        match query.get("fields") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (resource_type, list) in map {
                    let Some(list) = list.as_str() else {
                        return Err(QueryError::InvalidFieldsValue {
                            resource_type: resource_type.clone(),
                            actual: json_type_name(list).to_string(),
                        });
                    };
                    params
                        .fieldsets
                        .insert(resource_type.clone(), list.to_string());
                }
            }
            Some(_) => {
                return Err(QueryError::MalformedFields {
                    key: "fields".to_string(),
                })
            }
        }

        match query.get("sort") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => params.sort = parse_sort(s)?,
            Some(other) => {
                return Err(QueryError::MalformedSort {
                    value: other.to_string(),
                })
            }
        }

        for (family, key_error) in [
            ("filter", QueryError::MalformedFilter { key: "filter".into() }),
            ("page", QueryError::MalformedPage { key: "page".into() }),
        ] {
            match query.get(family) {
                None | Some(Value::Null) => {}
                Some(Value::Object(map)) => {
                    for (name, value) in map {
                        let text = scalar_string(value).ok_or_else(|| key_error.clone())?;
                        if family == "filter" {
                            params.add_filter(name, &text)?;
                        } else {
                            params.set_page(name, &text)?;
                        }
                    }
                }
                Some(_) => return Err(key_error),
            }
        }

        Ok(params)
    }

    pub fn include_paths(&self) -> &[String] {
        &self.include
    }

    pub fn fieldsets(&self) -> &BTreeMap<String, String> {
        &self.fieldsets
    }

    pub fn sort(&self) -> &[SortField] {
        &self.sort
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    pub fn page(&self) -> Page {
        self.page
    }

    /// Reject include paths not listed in `allowed`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::IncludeNotAllowed` for the first offending path.
    pub fn check_include(&self, allowed: &[String]) -> Result<(), QueryError> {
        match self.include.iter().find(|path| !allowed.contains(path)) {
            Some(path) => Err(QueryError::IncludeNotAllowed { path: path.clone() }),
            None => Ok(()),
        }
    }

    /// Reject sort fields not listed in `allowed`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::SortNotAllowed` for the first offending field.
    pub fn check_sort(&self, allowed: &[String]) -> Result<(), QueryError> {
        match self.sort.iter().find(|sort| !allowed.contains(&sort.field)) {
            Some(sort) => Err(QueryError::SortNotAllowed {
                field: sort.field.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Reject filter keys not listed in `allowed`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::FilterNotAllowed` for the first offending key.
    pub fn check_filters(&self, allowed: &[String]) -> Result<(), QueryError> {
        match self.filters.keys().find(|key| !allowed.contains(key)) {
            Some(key) => Err(QueryError::FilterNotAllowed { key: key.clone() }),
            None => Ok(()),
        }
    }

    /// Build the response projection for these parameters.
    pub fn schema_fields(&self) -> SchemaFields {
        SchemaFields::new(
            &self.include,
            self.fieldsets.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }

    fn add_filter(&mut self, key: &str, value: &str) -> Result<(), QueryError> {
        if value.trim().is_empty() {
            return Err(QueryError::EmptyFilter {
                key: key.to_string(),
            });
        }
        self.filters.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_page(&mut self, name: &str, value: &str) -> Result<(), QueryError> {
        let slot = match name {
            "number" => &mut self.page.number,
            "size" => &mut self.page.size,
            _ => {
                return Err(QueryError::MalformedPage {
                    key: format!("page[{}]", name),
                })
            }
        };
        let parsed = value
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| QueryError::InvalidPageValue {
                member: name.to_string(),
                value: value.to_string(),
            })?;
        *slot = Some(parsed);
        Ok(())
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `family` itself or any `family[...]` key.
fn in_family(key: &str, family: &str) -> bool {
    key.strip_prefix(family)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('['))
}

/// The `name` in `{family}[name]`.
fn member<'k>(key: &'k str, family: &str) -> Option<&'k str> {
    key.strip_prefix(family)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .filter(|name| !name.is_empty() && !name.contains(['[', ']']))
}

fn parse_sort(value: &str) -> Result<Vec<SortField>, QueryError> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }

    value
        .split(',')
        .map(str::trim)
        .map(|item| {
            let (field, descending) = match item.strip_prefix('-') {
                Some(field) => (field, true),
                None => (item, false),
            };
            if field.is_empty() || field.starts_with(['-', '+']) {
                return Err(QueryError::MalformedSort {
                    value: item.to_string(),
                });
            }
            Ok(SortField {
                field: field.to_string(),
                descending,
            })
        })
        .collect()
}

fn parse_include(value: &str) -> Result<Vec<String>, QueryError> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }

    value
        .split(',')
        .map(str::trim)
        .map(|path| {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                Err(QueryError::MalformedInclude {
                    path: path.to_string(),
                })
            } else {
                Ok(path.to_string())
            }
        })
        .collect()
}
