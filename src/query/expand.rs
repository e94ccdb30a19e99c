//! Field list expansion into an include tree.
//!
//! `["id", "author.name", "tags.*"]` becomes the root selection `id` plus one include
//! node per relation on the way to each field. Nodes are shared between paths, so
//! `author.name` and `author.email` select two columns of one `author` node.

use std::collections::BTreeMap;

use crate::{
    error::{AccessError, Error, QueryError},
    model::{
        filter::Filter,
        include::{IncludeKind, IncludeNode, IncludeTree, JunctionLink, Link, NodeId, Selection},
        permission::Action,
        query::SortTerm,
    },
    permission::Access,
    query::{
        join::{child_alias, junction_alias},
        sort::PseudoField,
    },
    schema::{collection::SORT, Collection, FieldType, RelationKind},
};

const WILDCARD: &str = "*";
const ITEM_PREFIX: &str = "item:";

pub struct Expander<'c, 'a> {
    access: &'c Access<'a>,
    rel_conditions: &'c BTreeMap<String, Filter>,
    wildcard_depth: usize,
    tree: IncludeTree,
}

impl<'c, 'a> Expander<'c, 'a> {
    /// Creates a new instance of [`Expander`] rooted at `collection`.
    pub fn new(
        access: &'c Access<'a>,
        collection: &str,
        rel_conditions: &'c BTreeMap<String, Filter>,
        wildcard_depth: usize,
    ) -> Self {
        Self {
            access,
            rel_conditions,
            wildcard_depth,
            tree: IncludeTree::new(collection, collection),
        }
    }

    /// Expands `fields` (default `["*"]`) and finalises the tree: wildcards resolved,
    /// key helpers added, required paths marked and loading strategy chosen per node.
    pub fn expand(mut self, fields: Option<&[String]>, required: &[String]) -> Result<IncludeTree, Error> {
        let default = [WILDCARD.to_string()];
        let fields = fields.filter(|f| !f.is_empty()).unwrap_or(&default);

        for field in fields {
            self.add_path(field.trim())?;
        }

        self.default_wildcards();
        self.resolve_wildcards()?;
        self.add_helpers()?;
        self.mark_required(required)?;
        self.choose_separate()?;

        Ok(self.tree)
    }

    fn collection(&self, node: Option<NodeId>) -> Result<&'a Collection, Error> {
        let name = self.tree.collection_of(node);
        Ok(self.access.catalog().get_schema_definition(name)?)
    }

    fn path_of(&self, parent: Option<NodeId>, segment: &str) -> String {
        match parent {
            Some(id) => format!("{}.{}", self.tree.node(id).path, segment),
            None => segment.to_string(),
        }
    }

    fn alias_of(&self, parent: Option<NodeId>) -> &str {
        match parent {
            Some(id) => &self.tree.node(id).alias,
            None => &self.tree.alias,
        }
    }

    fn add_path(&mut self, field: &str) -> Result<(), Error> {
        if PseudoField::is_pseudo(field) || field.contains(".date:") {
            return Err(QueryError::PseudoFieldInSelect(field.to_string()).into());
        }
        let segments: Vec<&str> = field.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(QueryError::InvalidFieldPath(field.to_string()).into());
        }

        let stars = segments.iter().rev().take_while(|s| **s == WILDCARD).count();
        if stars >= 2 {
            let anchor = self.walk_relations(field, &segments[..segments.len() - stars])?;
            self.tree.selection_mut(anchor).wildcard = true;
            let depth = stars.min(self.wildcard_depth.max(1)) - 1;
            return self.expand_recursive(anchor, depth);
        }

        let mut current: Option<NodeId> = None;
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let collection = self.collection(current)?;

            if *segment == WILDCARD {
                if !last {
                    return Err(QueryError::InvalidFieldPath(field.to_string()).into());
                }
                self.tree.selection_mut(current).wildcard = true;
                return Ok(());
            }

            if let Some(column) = collection.field(segment) {
                // JSON documents are selected whole, sub-keys are pruned on output
                if !last && column.field_type != FieldType::Json {
                    return Err(QueryError::InvalidFieldPath(field.to_string()).into());
                }
                if !self.access.field_allowed(&collection.name, Action::Read, segment) {
                    return Err(AccessError::FieldDenied {
                        collection: collection.name.clone(),
                        field: segment.to_string(),
                        action: Action::Read,
                    }
                    .into());
                }
                self.tree.selection_mut(current).add_attribute(segment);
                return Ok(());
            }

            let node = self.relation_node(current, segment, false)?;
            if last {
                let pk = self.collection(Some(node))?.primary_key.clone();
                self.tree.selection_mut(Some(node)).add_attribute(&pk);
            }
            current = Some(node);
        }
        Ok(())
    }

    /// Follows a chain of relation names, creating nodes as needed.
    fn walk_relations(&mut self, field: &str, segments: &[&str]) -> Result<Option<NodeId>, Error> {
        let mut current = None;
        for segment in segments {
            if self.collection(current)?.has_field(segment) {
                return Err(QueryError::InvalidFieldPath(field.to_string()).into());
            }
            current = Some(self.relation_node(current, segment, false)?);
        }
        Ok(current)
    }

    /// Existing or new node for relation `segment` below `parent`.
    ///
    /// Fails on relations the caller may not read; recursive wildcards skip those through
    /// [`Self::implicit_node`]. `implicit` only applies to newly created nodes.
    fn relation_node(&mut self, parent: Option<NodeId>, segment: &str, implicit: bool) -> Result<NodeId, Error> {
        if let Some(existing) = self.tree.find_child(parent, segment) {
            return Ok(existing);
        }

        let source = self.collection(parent)?;
        let catalog = self.access.catalog();

        if let Some(target) = segment.strip_prefix(ITEM_PREFIX) {
            let parent_node = parent
                .map(|id| self.tree.node(id))
                .filter(|n| n.kind == IncludeKind::ManyToAny)
                .ok_or_else(|| QueryError::InvalidFieldPath(self.path_of(parent, segment)))?;
            let owner = match parent_node.parent {
                Some(id) => self.tree.node(id).collection.clone(),
                None => self.tree.collection.clone(),
            };
            let relation = catalog.get_relation(&owner, &parent_node.relation)?;
            if !relation.related_collections.iter().any(|c| c == target) {
                return Err(QueryError::UnknownRelation {
                    collection: owner,
                    relation: segment.to_string(),
                }
                .into());
            }
            self.access.check_read(target)?;
            let target_pk = catalog.get_primary_key(target)?.to_string();
            let link = Link {
                parent_key: relation.item_key.clone(),
                child_key: target_pk,
                junction: None,
                discriminator: Some((relation.discriminator.clone(), target.to_string())),
            };
            let key = relation.item_key.clone();
            return Ok(self.push_node(parent, segment, IncludeKind::AnyItem, target, key, link, implicit));
        }

        let relation = catalog.get_relation(&source.name, segment)?;
        let allowed = self.access.field_allowed(&source.name, Action::Read, segment)
            || (relation.kind == RelationKind::BelongsTo
                && self
                    .access
                    .field_allowed(&source.name, Action::Read, &relation.foreign_key));
        if !allowed {
            return Err(AccessError::FieldDenied {
                collection: source.name.clone(),
                field: segment.to_string(),
                action: Action::Read,
            }
            .into());
        }

        let source_key = relation
            .target_key
            .clone()
            .unwrap_or_else(|| source.primary_key.clone());

        let (collection, link) = match relation.kind {
            RelationKind::BelongsTo => {
                let target = relation.related().unwrap_or_default();
                self.access.check_read(target)?;
                let target_key = match &relation.target_key {
                    Some(key) => key.clone(),
                    None => catalog.get_primary_key(target)?.to_string(),
                };
                (target.to_string(), Link::direct(relation.foreign_key.clone(), target_key))
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                let target = relation.related().unwrap_or_default();
                self.access.check_read(target)?;
                (target.to_string(), Link::direct(source_key, relation.foreign_key.clone()))
            }
            RelationKind::BelongsToMany => {
                let target = relation.related().unwrap_or_default();
                let junction = relation.junction().unwrap_or_default();
                self.access.check_read(junction)?;
                self.access.check_read(target)?;
                let alias = child_alias(self.alias_of(parent), segment);
                let link = Link {
                    parent_key: source_key,
                    child_key: catalog.get_primary_key(target)?.to_string(),
                    junction: Some(JunctionLink {
                        collection: junction.to_string(),
                        alias: junction_alias(&alias),
                        source_key: relation.foreign_key.clone(),
                        target_key: relation.junction_target_key.clone().unwrap_or_default(),
                    }),
                    discriminator: None,
                };
                (target.to_string(), link)
            }
            RelationKind::ManyToAny => {
                let junction = relation.junction().unwrap_or_default();
                self.access.check_read(junction)?;
                (junction.to_string(), Link::direct(source_key, relation.foreign_key.clone()))
            }
        };

        let kind = IncludeKind::from(relation.kind);
        Ok(self.push_node(parent, segment, kind, &collection, segment.to_string(), link, implicit))
    }

    #[allow(clippy::too_many_arguments)]
    fn push_node(
        &mut self,
        parent: Option<NodeId>,
        segment: &str,
        kind: IncludeKind,
        collection: &str,
        key: String,
        link: Link,
        implicit: bool,
    ) -> NodeId {
        let path = self.path_of(parent, segment);
        let alias = child_alias(self.alias_of(parent), segment);
        let sort = match self.access.catalog().get_schema_definition(collection) {
            Ok(schema) if schema.sort_enabled => vec![SortTerm::asc(SORT)],
            _ => Vec::new(),
        };

        self.tree.push(IncludeNode {
            id: 0,
            parent,
            relation: segment.to_string(),
            kind,
            collection: collection.to_string(),
            key,
            filter: self.rel_conditions.get(&path).cloned(),
            path,
            alias,
            selection: Selection::default(),
            link,
            children: Vec::new(),
            sort,
            separate: kind.is_multi_valued() || kind == IncludeKind::AnyItem,
            required: false,
            implicit,
        })
    }

    /// Wildcard expansion of every readable relation below `anchor`, `depth` levels deep.
    fn expand_recursive(&mut self, anchor: Option<NodeId>, depth: usize) -> Result<(), Error> {
        if depth == 0 {
            return Ok(());
        }
        let segments: Vec<String> = self.collection(anchor)?.relations.keys().cloned().collect();

        for segment in segments {
            let Some(node) = self.implicit_node(anchor, &segment)? else {
                continue;
            };
            // polymorphic targets belong to the same level as their junction rows
            if self.tree.node(node).kind == IncludeKind::ManyToAny {
                self.expand_items(node, depth - 1)?;
            }
            self.expand_recursive(Some(node), depth - 1)?;
        }
        Ok(())
    }

    fn expand_items(&mut self, junction: NodeId, depth: usize) -> Result<(), Error> {
        let node = self.tree.node(junction);
        let owner = self.tree.collection_of(node.parent);
        let relation = self.access.catalog().get_relation(owner, &node.relation)?;

        for target in &relation.related_collections {
            let segment = format!("{}{}", ITEM_PREFIX, target);
            if let Some(item) = self.implicit_node(Some(junction), &segment)? {
                self.expand_recursive(Some(item), depth)?;
            }
        }
        Ok(())
    }

    /// Node for `segment` selecting every readable field, `None` when the caller may not
    /// read the relation.
    fn implicit_node(&mut self, parent: Option<NodeId>, segment: &str) -> Result<Option<NodeId>, Error> {
        match self.relation_node(parent, segment, true) {
            Ok(node) => {
                self.tree.node_mut(node).selection.wildcard = true;
                Ok(Some(node))
            }
            Err(Error::AccessError(_)) => {
                tracing::trace!(relation = %segment, "skipping unreadable relation in wildcard");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn default_wildcards(&mut self) {
        for node in self.tree.nodes.iter_mut() {
            if !node.children.is_empty() && !node.selection.has_any() {
                node.selection.wildcard = true;
            }
        }
    }

    fn resolve_wildcards(&mut self) -> Result<(), Error> {
        let targets: Vec<Option<NodeId>> = std::iter::once(None)
            .chain(self.tree.walk().into_iter().map(Some))
            .collect();
        for target in targets {
            if !self.tree.selection(target).wildcard {
                continue;
            }
            let fields = self.access.readable_fields(self.tree.collection_of(target))?;
            let selection = self.tree.selection_mut(target);
            for field in fields {
                selection.add_attribute(&field);
            }
        }
        Ok(())
    }

    fn add_helpers(&mut self) -> Result<(), Error> {
        let root_pk = self.collection(None)?.primary_key.clone();
        self.tree.selection.add_helper(&root_pk);

        for id in self.tree.walk() {
            let pk = self.collection(Some(id))?.primary_key.clone();
            let node = self.tree.node(id);
            let parent = node.parent;
            let link = node.link.clone();

            let selection = &mut self.tree.node_mut(id).selection;
            selection.add_helper(&pk);
            selection.add_helper(&link.child_key);

            let parent_selection = self.tree.selection_mut(parent);
            parent_selection.add_helper(&link.parent_key);
            if let Some((column, _)) = &link.discriminator {
                parent_selection.add_helper(column);
            }
        }
        Ok(())
    }

    fn mark_required(&mut self, required: &[String]) -> Result<(), Error> {
        for path in required {
            let mut current = None;
            let mut chain = Vec::new();
            for segment in path.split('.') {
                let node = self
                    .tree
                    .find_child(current, segment)
                    .ok_or_else(|| QueryError::InvalidFieldPath(path.clone()))?;
                if self.tree.node(node).separate {
                    return Err(QueryError::InvalidFieldPath(format!(
                        "{} (only single-valued relations can be required)",
                        path
                    ))
                    .into());
                }
                chain.push(node);
                current = Some(node);
            }
            for id in chain {
                self.tree.node_mut(id).required = true;
            }
        }
        Ok(())
    }

    /// Single-valued nodes whose conditions reach across further relations are loaded
    /// through their own query so those joins never run inside the parent's SELECT.
    fn choose_separate(&mut self) -> Result<(), Error> {
        for id in self.tree.walk() {
            let node = self.tree.node(id);
            if node.separate || node.required {
                continue;
            }
            let relation_filter = node
                .filter
                .as_ref()
                .map(Filter::has_relation_paths)
                .unwrap_or(false);
            let scope_filter = self
                .access
                .scope_filter(&node.collection, Action::Read)?
                .map(|f| f.has_relation_paths())
                .unwrap_or(false);
            if relation_filter || scope_filter {
                self.tree.node_mut(id).separate = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        model::{accountability::Accountability, permission::Permission},
        permission::{StaticPermissionProvider, TenantScope},
        query::tests::blog_catalog,
    };

    fn expand_as(
        provider: &StaticPermissionProvider,
        caller: &Accountability,
        collection: &str,
        fields: &[&str],
    ) -> Result<IncludeTree, Error> {
        let catalog = blog_catalog();
        let access = Access::new(&catalog, provider, caller, TenantScope::Unrestricted);
        let conditions = BTreeMap::new();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        Expander::new(&access, collection, &conditions, 7).expand(Some(&fields), &[])
    }

    fn expand(collection: &str, fields: &[&str]) -> Result<IncludeTree, Error> {
        expand_as(
            &StaticPermissionProvider::default(),
            &Accountability::admin("1"),
            collection,
            fields,
        )
    }

    #[test]
    fn shares_nodes_between_paths() {
        let tree = expand("posts", &["title", "author.name", "author.role"]).unwrap();
        assert_eq!(tree.roots.len(), 1);
        let author = tree.node(tree.roots[0]);
        assert_eq!(author.alias, "posts__author");
        assert_eq!(author.selection.attributes, vec!["name", "role"]);
        assert!(!author.separate);
        // keys needed for merging are selected but stripped later
        assert!(tree.selection.helpers.contains(&"id".to_string()));
        assert!(tree.selection.helpers.contains(&"author_id".to_string()));
        assert!(author.selection.helpers.contains(&"id".to_string()));
    }

    #[test]
    fn multi_valued_relations_are_separate() {
        let tree = expand("posts", &["id", "comments.body", "tags.name"]).unwrap();
        let comments = tree.find_child(None, "comments").unwrap();
        let tags = tree.find_child(None, "tags").unwrap();
        assert!(tree.node(comments).separate);
        assert_eq!(tree.node(comments).link, Link::direct("id", "post_id"));
        assert!(tree.node(comments).selection.helpers.contains(&"post_id".to_string()));

        let junction = tree.node(tags).link.junction.clone().unwrap();
        assert_eq!(junction.collection, "post_tags");
        assert_eq!(junction.alias, "posts__tags$junction");
        assert_eq!(junction.target_key, "tag_id");
    }

    #[test]
    fn nodes_without_attributes_select_everything() {
        let tree = expand("posts", &["comments.post.title"]).unwrap();
        let comments = tree.find_child(None, "comments").unwrap();
        assert_eq!(
            tree.node(comments).selection.attributes,
            vec!["id", "post_id", "body", "approved"]
        );
        assert!(tree.selection.attributes.is_empty());
    }

    #[test]
    fn recursive_wildcards_stop_at_the_cap() {
        let tree = expand("comments", &["post.*.*"]).unwrap();
        let post = tree.find_child(None, "post").unwrap();
        let author = tree.find_child(Some(post), "author").unwrap();
        assert!(tree.node(author).implicit);
        assert!(tree.node(author).selection.wildcard);
        // depth 1 below "post": no grandchildren
        assert!(tree.node(author).children.is_empty());

        let attachments = tree.find_child(Some(post), "attachments").unwrap();
        assert!(tree.find_child(Some(attachments), "item:images").is_some());
    }

    #[test]
    fn polymorphic_targets_are_keyed_by_item() {
        let tree = expand("posts", &["attachments.item:images.url"]).unwrap();
        let attachments = tree.find_child(None, "attachments").unwrap();
        let images = tree.find_child(Some(attachments), "item:images").unwrap();
        let node = tree.node(images);
        assert_eq!(node.kind, IncludeKind::AnyItem);
        assert_eq!(node.key, "item");
        assert_eq!(
            node.link.discriminator,
            Some(("collection".to_string(), "images".to_string()))
        );
        let junction = &tree.node(attachments).selection;
        assert!(junction.columns().any(|c| c == "collection"));
        assert!(junction.columns().any(|c| c == "item"));

        let wrong = expand("posts", &["tags.item:images.url"]);
        assert!(matches!(wrong, Err(Error::QueryError(QueryError::InvalidFieldPath(_)))));
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(matches!(
            expand("posts", &["date:day:created_at"]),
            Err(Error::QueryError(QueryError::PseudoFieldInSelect(_)))
        ));
        assert!(matches!(
            expand("posts", &["author..name"]),
            Err(Error::QueryError(QueryError::InvalidFieldPath(_)))
        ));
        assert!(matches!(
            expand("posts", &["title.length"]),
            Err(Error::QueryError(QueryError::InvalidFieldPath(_)))
        ));
        assert!(matches!(
            expand("posts", &["editor.name"]),
            Err(Error::QueryError(QueryError::UnknownRelation { .. }))
        ));
    }

    #[test]
    fn field_permissions_limit_wildcards_and_reject_explicit_fields() {
        let provider = StaticPermissionProvider::from_json(json!([
            {"role": "reader", "collection": "users", "action": "read", "fields": ["id", "name"]},
            {"role": "reader", "collection": "posts", "action": "read"}
        ]))
        .unwrap();
        let caller = Accountability::user("9", "reader");

        let tree = expand_as(&provider, &caller, "users", &["*"]).unwrap();
        assert_eq!(tree.selection.attributes, vec!["id", "name"]);

        let denied = expand_as(&provider, &caller, "users", &["role"]);
        assert!(matches!(
            denied,
            Err(Error::AccessError(AccessError::FieldDenied { .. }))
        ));

        let hidden = expand_as(&provider, &caller, "posts", &["comments.body"]);
        assert!(matches!(
            hidden,
            Err(Error::AccessError(AccessError::NotFoundOrForbidden { .. }))
        ));
    }

    #[test]
    fn unreadable_relations_are_skipped_by_recursive_wildcards() {
        let provider = StaticPermissionProvider::new(vec![
            Permission::new("reader", "comments", Action::Read),
            Permission::new("reader", "posts", Action::Read),
        ])
        .unwrap();
        let caller = Accountability::user("9", "reader");

        let tree = expand_as(&provider, &caller, "comments", &["*.*"]).unwrap();
        let post = tree.find_child(None, "post").unwrap();
        assert!(tree.node(post).implicit);
        assert_eq!(tree.roots.len(), 1);
    }
}
