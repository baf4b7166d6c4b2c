//! Relationship adapters.
//!
//! A [`Relation`] maps the JSON:API verbs (replace, add, remove) onto the
//! store operations of its [`RelationKind`]. Every kind exposes the same
//! three primitives, `current_targets`, `associate` and `disassociate`; the
//! verbs are set arithmetic over them.

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::StoreError;
use crate::store::{RelationStore, Row};
use crate::types::{Cardinality, ResourceIdentifier};

/// What happens to a has-many row that leaves the relationship.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetachPolicy {
    /// Null the foreign key on the related row.
    #[default]
    Nullify,
    /// Delete the related row.
    Delete,
}

/// How a relationship is stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RelationKind {
    /// The owner row holds `foreign_key`.
    BelongsTo { foreign_key: String },
    /// Each related row holds `foreign_key` pointing at the owner.
    HasMany {
        foreign_key: String,
        #[serde(default)]
        on_detach: DetachPolicy,
    },
    /// Rows in `pivot` join `owner_key` to `related_key`.
    BelongsToMany {
        pivot: String,
        owner_key: String,
        related_key: String,
    },
    /// Read-only: `through.first_key` points at the owner and
    /// `related.second_key` points at the intermediate row.
    HasOneThrough {
        through: String,
        first_key: String,
        second_key: String,
    },
}

impl RelationKind {
    pub fn name(&self) -> &'static str {
        match self {
            RelationKind::BelongsTo { .. } => "belongs-to",
            RelationKind::HasMany { .. } => "has-many",
            RelationKind::BelongsToMany { .. } => "belongs-to-many",
            RelationKind::HasOneThrough { .. } => "has-one-through",
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            RelationKind::BelongsTo { .. } | RelationKind::HasOneThrough { .. } => {
                Cardinality::ToOne
            }
            RelationKind::HasMany { .. } | RelationKind::BelongsToMany { .. } => {
                Cardinality::ToMany
            }
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, RelationKind::HasOneThrough { .. })
    }
}

/// JSON:API relationship mutation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// PATCH: make the relationship exactly the submitted set.
    Replace,
    /// POST: add the submitted members.
    Add,
    /// DELETE: remove the submitted members.
    Remove,
}

impl Verb {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "replace" | "patch" => Some(Verb::Replace),
            "add" | "post" => Some(Verb::Add),
            "remove" | "delete" => Some(Verb::Remove),
            _ => None,
        }
    }
}

/// The row that owns a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner<'a> {
    pub table: &'a str,
    pub id: &'a str,
}

impl<'a> Owner<'a> {
    pub fn new(table: &'a str, id: &'a str) -> Self {
        Self { table, id }
    }
}

/// Related resources associated and disassociated by one mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub associated: Vec<ResourceIdentifier>,
    pub disassociated: Vec<ResourceIdentifier>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.associated.is_empty() && self.disassociated.is_empty()
    }
}

/// A declared relationship on a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Relation {
    /// Accepted related resource type(s).
    #[serde(rename = "type", deserialize_with = "one_or_many")]
    pub related_types: Vec<String>,
    /// Related table; defaults to the first related type.
    #[serde(default)]
    pub table: Option<String>,
    /// Must be present when the owner is created.
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub kind: RelationKind,
}

impl Relation {
    pub fn new(related_type: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            related_types: vec![related_type.into()],
            table: None,
            required: false,
            kind,
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        self.kind.cardinality()
    }

    pub fn accepts(&self, resource_type: &str) -> bool {
        self.related_types.iter().any(|t| t == resource_type)
    }

    /// The first declared type.
    pub fn primary_type(&self) -> &str {
        self.related_types.first().map(String::as_str).unwrap_or_default()
    }

    /// Whether more than one related type is accepted.
    ///
    /// Only has-many relations can be polymorphic: every other kind stores
    /// a bare key and could not tell the types apart when reading back.
    pub fn is_polymorphic(&self) -> bool {
        self.related_types.len() > 1
    }

    pub fn related_table(&self) -> &str {
        self.table.as_deref().unwrap_or(self.primary_type())
    }

    /// Table holding resources of `resource_type`.
    ///
    /// An explicit table applies to the primary type only; other types of
    /// a polymorphic relation use their own name.
    pub fn table_for<'a>(&'a self, resource_type: &'a str) -> &'a str {
        if resource_type == self.primary_type() {
            self.related_table()
        } else {
            resource_type
        }
    }

    /// The related resources currently associated with `owner`.
    pub fn current_targets<S: RelationStore>(
        &self,
        store: &S,
        owner: Owner<'_>,
    ) -> Result<Vec<ResourceIdentifier>, StoreError> {
        let ids = match &self.kind {
            RelationKind::BelongsTo { foreign_key } => store
                .column(owner.table, owner.id, foreign_key)?
                .into_iter()
                .collect(),
            RelationKind::HasMany { foreign_key, .. } => {
                let mut targets = Vec::new();
                for resource_type in &self.related_types {
                    let table = self.table_for(resource_type);
                    for id in store.select_where(table, foreign_key, owner.id, "id")? {
                        targets.push(ResourceIdentifier::new(resource_type.as_str(), id));
                    }
                }
                return Ok(targets);
            }
            RelationKind::BelongsToMany {
                pivot,
                owner_key,
                related_key,
            } => store.select_where(pivot, owner_key, owner.id, related_key)?,
            RelationKind::HasOneThrough {
                through,
                first_key,
                second_key,
            } => {
                let mut found = Vec::new();
                for intermediate in store.select_where(through, first_key, owner.id, "id")? {
                    let related =
                        store.select_where(self.related_table(), second_key, &intermediate, "id")?;
                    if let Some(first) = related.into_iter().next() {
                        found.push(first);
                        break;
                    }
                }
                found
            }
        };

        let primary = self.primary_type();
        Ok(ids
            .into_iter()
            .map(|id| ResourceIdentifier::new(primary, id))
            .collect())
    }

    /// Link `targets` to `owner`. Already-linked targets are left alone.
    pub fn associate<S: RelationStore>(
        &self,
        store: &mut S,
        owner: Owner<'_>,
        targets: &[ResourceIdentifier],
    ) -> Result<(), StoreError> {
        match &self.kind {
            RelationKind::BelongsTo { foreign_key } => {
                // A to-one relation holds at most one key; the last one wins.
                if let Some(target) = targets.last() {
                    let key = Some(target.id.as_str());
                    store.set_column(owner.table, owner.id, foreign_key, key)?;
                }
                Ok(())
            }
            RelationKind::HasMany { foreign_key, .. } => {
                for target in targets {
                    let table = self.table_for(&target.resource_type);
                    store.set_column(table, &target.id, foreign_key, Some(owner.id))?;
                }
                Ok(())
            }
            RelationKind::BelongsToMany {
                pivot,
                owner_key,
                related_key,
            } => {
                let existing = store.select_where(pivot, owner_key, owner.id, related_key)?;
                for target in targets.iter().filter(|t| !existing.contains(&t.id)) {
                    let mut row = Row::new();
                    row.insert(owner_key.clone(), owner.id.into());
                    row.insert(related_key.clone(), target.id.as_str().into());
                    store.insert(pivot, row)?;
                }
                Ok(())
            }
            RelationKind::HasOneThrough { .. } => Err(StoreError::Unsupported {
                operation: "associate",
                kind: self.kind.name(),
            }),
        }
    }

    /// Unlink `targets` from `owner`.
    pub fn disassociate<S: RelationStore>(
        &self,
        store: &mut S,
        owner: Owner<'_>,
        targets: &[ResourceIdentifier],
    ) -> Result<(), StoreError> {
        match &self.kind {
            RelationKind::BelongsTo { foreign_key } => {
                let current = store.column(owner.table, owner.id, foreign_key)?;
                if current.is_some_and(|c| targets.iter().any(|t| t.id == c)) {
                    store.set_column(owner.table, owner.id, foreign_key, None)?;
                }
                Ok(())
            }
            RelationKind::HasMany {
                foreign_key,
                on_detach,
            } => {
                for target in targets {
                    let table = self.table_for(&target.resource_type);
                    match on_detach {
                        DetachPolicy::Nullify => {
                            store.set_column(table, &target.id, foreign_key, None)?
                        }
                        DetachPolicy::Delete => store.delete(table, &target.id)?,
                    }
                }
                Ok(())
            }
            RelationKind::BelongsToMany {
                pivot,
                owner_key,
                related_key,
            } => {
                for target in targets {
                    let conditions = [
                        (owner_key.as_str(), owner.id),
                        (related_key.as_str(), target.id.as_str()),
                    ];
                    store.delete_where(pivot, &conditions)?;
                }
                Ok(())
            }
            RelationKind::HasOneThrough { .. } => Err(StoreError::Unsupported {
                operation: "disassociate",
                kind: self.kind.name(),
            }),
        }
    }

    /// Apply `verb` with the resolved targets.
    ///
    /// Replace disassociates `current - targets` then associates
    /// `targets - current`; add associates `targets - current`; remove
    /// disassociates `targets ∩ current`. Members outside the delta are never
    /// touched.
    pub fn apply<S: RelationStore>(
        &self,
        store: &mut S,
        owner: Owner<'_>,
        verb: Verb,
        targets: &[ResourceIdentifier],
    ) -> Result<Delta, StoreError> {
        let current = self.current_targets(store, owner)?;
        let targets = dedup(targets);

        let delta = match verb {
            Verb::Replace => Delta {
                associated: difference(&targets, &current),
                disassociated: difference(&current, &targets),
            },
            Verb::Add => Delta {
                associated: difference(&targets, &current),
                disassociated: Vec::new(),
            },
            Verb::Remove => Delta {
                associated: Vec::new(),
                disassociated: targets
                    .iter()
                    .filter(|t| current.contains(t))
                    .cloned()
                    .collect(),
            },
        };

        if !delta.disassociated.is_empty() {
            self.disassociate(store, owner, &delta.disassociated)?;
        }
        if !delta.associated.is_empty() {
            self.associate(store, owner, &delta.associated)?;
        }

        debug!(
            kind = self.kind.name(),
            owner = owner.id,
            ?verb,
            associated = delta.associated.len(),
            disassociated = delta.disassociated.len(),
            "relation updated"
        );

        Ok(delta)
    }
}

/// Items of `a` not in `b`, in `a`'s order.
fn difference<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    a.iter().filter(|x| !b.contains(x)).cloned().collect()
}

fn dedup<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(item) {
            seen.push(item.clone());
        }
    }
    seen
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(one) => vec![one],
        OneOrMany::Many(many) => many,
    })
}
