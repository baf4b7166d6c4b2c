//! Sparse fieldsets and requested relationship paths.

use std::collections::{BTreeSet, HashMap};

static NO_RELATIONSHIPS: BTreeSet<String> = BTreeSet::new();

/// Requested include paths and fieldsets for one request.
///
/// Built once from the declared dotted relationship paths (e.g. `a2.b2.c2`)
/// and the `fields[type]` lists, then queried during response projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaFields {
    /// Parent prefix (`""` for top level) to immediate child names.
    relationships: HashMap<String, BTreeSet<String>>,
    /// Resource type to requested field names.
    fieldsets: HashMap<String, BTreeSet<String>>,
}

impl SchemaFields {
    pub fn new<P, T, F>(paths: P, fieldsets: F) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        F: IntoIterator<Item = (T, T)>,
        T: AsRef<str>,
    {
        let mut relationships: HashMap<String, BTreeSet<String>> = HashMap::new();

        for path in paths {
            let segments: Vec<&str> = path.as_ref().split('.').collect();
            if segments.iter().any(|s| s.is_empty()) {
                continue;
            }

            // Each path also declares every prefix along the way.
            for depth in 0..segments.len() {
                relationships
                    .entry(segments[..depth].join("."))
                    .or_default()
                    .insert(segments[depth].to_string());
            }
        }

        let fieldsets = fieldsets
            .into_iter()
            .map(|(resource_type, list)| {
                let fields = list
                    .as_ref()
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect();
                (resource_type.as_ref().to_string(), fields)
            })
            .collect();

        Self {
            relationships,
            fieldsets,
        }
    }

    /// Immediate child relationships requested below `prefix`.
    ///
    /// Use `""` for top-level relationships. Unknown prefixes and leaves
    /// yield an empty set.
    pub fn requested_relationships(&self, prefix: &str) -> &BTreeSet<String> {
        self.relationships.get(prefix).unwrap_or(&NO_RELATIONSHIPS)
    }

    pub fn is_relationship_requested(&self, prefix: &str, name: &str) -> bool {
        self.requested_relationships(prefix).contains(name)
    }

    /// The fieldset requested for `resource_type`.
    ///
    /// `None` means no fieldset was given, i.e. the type is unrestricted.
    /// `Some` of an empty set means the type is restricted to no fields.
    pub fn requested_fields(&self, resource_type: &str) -> Option<&BTreeSet<String>> {
        self.fieldsets.get(resource_type)
    }

    /// Whether `field` should be rendered for `resource_type`.
    ///
    /// An unrestricted type renders every field.
    pub fn is_field_requested(&self, resource_type: &str, field: &str) -> bool {
        self.requested_fields(resource_type)
            .map_or(true, |fields| fields.contains(field))
    }

    /// Like [`is_field_requested`](Self::is_field_requested), but an
    /// unrestricted type reports no field as requested.
    pub fn is_field_requested_strict(&self, resource_type: &str, field: &str) -> bool {
        self.requested_fields(resource_type)
            .is_some_and(|fields| fields.contains(field))
    }

    /// Child relationships of `prefix` that are both included and allowed
    /// by the fieldset of `resource_type`.
    pub fn projected_relationships<'a>(
        &'a self,
        prefix: &str,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.requested_relationships(prefix)
            .iter()
            .map(String::as_str)
            .filter(move |name| self.is_field_requested(resource_type, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    fn fixture() -> SchemaFields {
        SchemaFields::new(
            ["a1", "a2", "a1.b1", "a2.b2.c2"],
            [("articles", "title,body,a1"), ("people", "name")],
        )
    }

    #[test]
    fn top_level_relationships() {
        let fields = fixture();
        assert_eq!(names(fields.requested_relationships("")), ["a1", "a2"]);
        assert!(fields.is_relationship_requested("", "a2"));
        assert!(!fields.is_relationship_requested("", "blah"));
    }

    #[test]
    fn nested_relationships() {
        let fields = fixture();
        assert_eq!(names(fields.requested_relationships("a2.b2")), ["c2"]);
        assert_eq!(names(fields.requested_relationships("a1")), ["b1"]);
        assert!(fields.is_relationship_requested("a2.b2", "c2"));
        assert!(!fields.is_relationship_requested("a2.b2", "blah"));
        assert!(!fields.is_relationship_requested("a2", "c2"));
    }

    #[test]
    fn leaves_and_unknown_prefixes_are_empty() {
        let fields = fixture();
        assert!(fields.requested_relationships("a2.b2.c2").is_empty());
        assert!(fields.requested_relationships("foo").is_empty());
    }

    #[test]
    fn intermediate_prefixes_are_implied() {
        let fields = SchemaFields::new(["a2.b2.c2"], Vec::<(&str, &str)>::new());
        assert_eq!(names(fields.requested_relationships("")), ["a2"]);
        assert_eq!(names(fields.requested_relationships("a2")), ["b2"]);
    }

    #[test]
    fn malformed_paths_are_skipped() {
        let fields = SchemaFields::new(["", "a..b", "ok"], Vec::<(&str, &str)>::new());
        assert_eq!(names(fields.requested_relationships("")), ["ok"]);
    }

    #[test]
    fn requested_fields_parsed() {
        let fields = fixture();
        let articles = fields.requested_fields("articles").unwrap();
        assert_eq!(names(articles), ["a1", "body", "title"]);
        assert!(fields.requested_fields("blah").is_none());
    }

    #[test]
    fn empty_fieldset_is_not_absent() {
        let fields =
            SchemaFields::new(Vec::<&str>::new(), [("articles", ""), ("people", " name ,, ")]);
        assert_eq!(fields.requested_fields("articles"), Some(&BTreeSet::new()));
        assert_eq!(names(fields.requested_fields("people").unwrap()), ["name"]);
        assert!(!fields.is_field_requested("articles", "title"));
    }

    #[test]
    fn field_requested_when_restricted() {
        let fields = fixture();
        assert!(fields.is_field_requested("articles", "title"));
        assert!(!fields.is_field_requested("articles", "blah"));
        assert!(fields.is_field_requested_strict("articles", "title"));
        assert!(!fields.is_field_requested_strict("articles", "blah"));
    }

    #[test]
    fn field_requested_when_unrestricted() {
        let fields = fixture();
        assert!(fields.is_field_requested("comments", "content"));
        assert!(!fields.is_field_requested_strict("comments", "content"));
    }

    #[test]
    fn projected_relationships_respect_fieldsets() {
        let fields = fixture();
        let projected: Vec<&str> = fields.projected_relationships("", "articles").collect();
        assert_eq!(projected, ["a1"]);

        let projected: Vec<&str> = fields.projected_relationships("", "comments").collect();
        assert_eq!(projected, ["a1", "a2"]);
    }
}
