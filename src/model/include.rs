//! Include tree produced by the field expander.
//!
//! Nodes live in a flat arena and refer to each other by [`NodeId`], so a collection that
//! includes itself (`department.parent.parent`) never forms an ownership cycle.

use serde::Serialize;

use crate::{
    model::{filter::Filter, query::SortTerm},
    schema::RelationKind,
};

pub type NodeId = usize;

/// How an include node is related to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IncludeKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
    /// Junction rows of a polymorphic relation.
    ManyToAny,
    /// Resolved target of one polymorphic junction row, for a single target collection.
    AnyItem,
}

impl IncludeKind {
    /// Whether a parent row can relate to more than one row of this node.
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            IncludeKind::HasMany | IncludeKind::BelongsToMany | IncludeKind::ManyToAny
        )
    }
}

impl From<RelationKind> for IncludeKind {
    fn from(kind: RelationKind) -> Self {
        match kind {
            RelationKind::BelongsTo => IncludeKind::BelongsTo,
            RelationKind::HasOne => IncludeKind::HasOne,
            RelationKind::HasMany => IncludeKind::HasMany,
            RelationKind::BelongsToMany => IncludeKind::BelongsToMany,
            RelationKind::ManyToAny => IncludeKind::ManyToAny,
        }
    }
}

/// Columns selected for one collection in a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Requested columns, in request order. These are returned to the caller.
    pub attributes: Vec<String>,
    /// Columns selected for keying and merging only, stripped from the output.
    pub helpers: Vec<String>,
    /// `*` was requested; resolved against the catalog and field permissions.
    pub wildcard: bool,
}

impl Selection {
    pub fn add_attribute(&mut self, field: &str) {
        if !self.attributes.iter().any(|a| a == field) {
            self.attributes.push(field.to_string());
        }
        self.helpers.retain(|h| h != field);
    }

    pub fn add_helper(&mut self, field: &str) {
        if !self.attributes.iter().any(|a| a == field) && !self.helpers.iter().any(|h| h == field) {
            self.helpers.push(field.to_string());
        }
    }

    pub fn has_any(&self) -> bool {
        self.wildcard || !self.attributes.is_empty()
    }

    /// Every selected column: attributes first, then helpers.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .chain(self.helpers.iter())
            .map(String::as_str)
    }
}

/// Junction step of a `BelongsToMany` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionLink {
    pub collection: String,
    pub alias: String,
    /// Junction column matching the parent's link key.
    pub source_key: String,
    /// Junction column matching the target's primary key.
    pub target_key: String,
}

/// Columns connecting a node's rows to its parent's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Column on the parent row.
    pub parent_key: String,
    /// Column on the node's rows (on the target for `BelongsToMany`).
    pub child_key: String,
    pub junction: Option<JunctionLink>,
    /// `(column, value)` on the parent junction row selecting this polymorphic target.
    pub discriminator: Option<(String, String)>,
}

impl Link {
    pub fn direct(parent_key: impl Into<String>, child_key: impl Into<String>) -> Self {
        Self {
            parent_key: parent_key.into(),
            child_key: child_key.into(),
            junction: None,
            discriminator: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IncludeNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Relation name on the parent collection, `item:<collection>` for polymorphic targets.
    pub relation: String,
    pub kind: IncludeKind,
    /// Collection the node's rows come from (the junction for [`IncludeKind::ManyToAny`]).
    pub collection: String,
    /// Key the node's data is attached under in the parent object.
    pub key: String,
    /// Dotted relation path from the root collection.
    pub path: String,
    /// Request-unique SQL alias, derived from the path.
    pub alias: String,
    pub selection: Selection,
    pub link: Link,
    pub children: Vec<NodeId>,
    /// Row condition for the related rows: relation conditions and the role's read filter.
    pub filter: Option<Filter>,
    pub sort: Vec<SortTerm>,
    /// Loaded through its own keyed query instead of a JOIN.
    pub separate: bool,
    /// Parents without a related row are dropped (INNER JOIN).
    pub required: bool,
    /// Created by a recursive wildcard rather than an explicit path.
    pub implicit: bool,
}

/// Arena of include nodes hanging off the root collection.
#[derive(Debug, Clone)]
pub struct IncludeTree {
    pub collection: String,
    pub alias: String,
    pub selection: Selection,
    pub roots: Vec<NodeId>,
    pub nodes: Vec<IncludeNode>,
}

impl IncludeTree {
    pub fn new(collection: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            alias: alias.into(),
            selection: Selection::default(),
            roots: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &IncludeNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut IncludeNode {
        &mut self.nodes[id]
    }

    /// Children of `parent`, or the top-level nodes for `None`.
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => &self.nodes[id].children,
            None => &self.roots,
        }
    }

    /// Existing child of `parent` for `relation`.
    pub fn find_child(&self, parent: Option<NodeId>, relation: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| self.nodes[*id].relation == relation)
    }

    /// Appends a node below `node.parent` and returns its id.
    pub fn push(&mut self, mut node: IncludeNode) -> NodeId {
        let id = self.nodes.len();
        node.id = id;
        match node.parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        id
    }

    /// Selection of `node`, or of the root for `None`.
    pub fn selection(&self, node: Option<NodeId>) -> &Selection {
        match node {
            Some(id) => &self.nodes[id].selection,
            None => &self.selection,
        }
    }

    pub fn selection_mut(&mut self, node: Option<NodeId>) -> &mut Selection {
        match node {
            Some(id) => &mut self.nodes[id].selection,
            None => &mut self.selection,
        }
    }

    /// Collection of `node`, or the root collection.
    pub fn collection_of(&self, node: Option<NodeId>) -> &str {
        match node {
            Some(id) => &self.nodes[id].collection,
            None => &self.collection,
        }
    }

    /// Relation path of `node` relative to the nearest ancestor `level` (exclusive).
    pub fn relative_path(&self, level: Option<NodeId>, node: NodeId) -> Vec<&str> {
        let mut segments = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            if Some(id) == level {
                break;
            }
            segments.push(self.nodes[id].key.as_str());
            current = self.nodes[id].parent;
        }
        segments.reverse();
        segments
    }

    /// Separately loaded nodes reachable from `level` through joined nodes only.
    pub fn separate_children(&self, level: Option<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(level).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.separate {
                out.push(id);
            } else {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Joined (non-separate) nodes of `level`, in depth-first pre-order.
    pub fn joined_nodes(&self, level: Option<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(level).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !node.separate {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Node ids in depth-first pre-order.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }
        out
    }
}
