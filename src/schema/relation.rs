use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// Source row holds a foreign key to one target row.
    BelongsTo,
    /// Target row holds a foreign key to the source row, at most one target per source.
    HasOne,
    /// Target rows hold a foreign key to the source row.
    HasMany,
    /// Junction rows pair source keys with target keys.
    BelongsToMany,
    /// Junction rows pair source keys with `(collection, item)` references to any of
    /// several target collections.
    ManyToAny,
}

impl RelationKind {
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            RelationKind::HasMany | RelationKind::BelongsToMany | RelationKind::ManyToAny
        )
    }
}

/// Relation from one collection to another.
///
/// Column roles per kind:
///
/// | kind            | `foreign_key` lives on | `target_key` lives on (default: its primary key) |
/// |-----------------|------------------------|--------------------------------------------------|
/// | `BelongsTo`     | source                 | target                                           |
/// | `HasOne/HasMany`| target                 | source                                           |
/// | `BelongsToMany` | junction               | source (`junction_target_key` on the junction)   |
/// | `ManyToAny`     | junction               | source (`discriminator`/`item_key` on junction)  |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Filled from the key of the collection's relation map.
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Target collection (all kinds except `ManyToAny`).
    #[serde(default)]
    pub related: Option<String>,
    /// Possible target collections of a `ManyToAny` relation.
    #[serde(default)]
    pub related_collections: Vec<String>,
    pub foreign_key: String,
    #[serde(default)]
    pub target_key: Option<String>,
    /// Junction collection of `BelongsToMany` and `ManyToAny` relations.
    #[serde(default)]
    pub junction: Option<String>,
    /// Junction column referencing the target of a `BelongsToMany` relation.
    #[serde(default)]
    pub junction_target_key: Option<String>,
    /// Junction column naming the target collection of a `ManyToAny` row.
    #[serde(default = "default_discriminator")]
    pub discriminator: String,
    /// Junction column holding the target's primary key of a `ManyToAny` row.
    #[serde(default = "default_item_key")]
    pub item_key: String,
}

fn default_discriminator() -> String {
    "collection".to_string()
}

fn default_item_key() -> String {
    "item".to_string()
}

impl Relation {
    /// Target collection for single-target relations.
    pub fn related(&self) -> Option<&str> {
        self.related.as_deref()
    }

    pub fn junction(&self) -> Option<&str> {
        self.junction.as_deref()
    }
}
