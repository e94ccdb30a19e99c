//! Executable read plans.

use std::collections::{BTreeSet, HashMap};

use crate::{
    model::include::{IncludeTree, NodeId},
    permission::pattern::FieldPatterns,
    query::join::JoinAccumulator,
    schema::FieldType,
    sql::{ColumnKind, Fragment},
};

#[derive(Debug, Clone)]
pub struct OrderTerm {
    pub expr: Fragment,
    pub descending: bool,
}

impl OrderTerm {
    /// `expr ASC|DESC`
    pub fn render(&self) -> Fragment {
        let mut out = self.expr.clone();
        out.push_sql(if self.descending { " DESC" } else { " ASC" });
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// One paginated SELECT with single-valued joins.
    Single,
    /// Distinct, ordered ids first, then hydration by id. Used whenever a filter or sort
    /// joins a multi-valued relation.
    TwoPhase,
}

/// One selected column of a level query.
#[derive(Debug, Clone)]
pub struct LevelColumn {
    /// Positional select alias (`c0`, `c1`, ...).
    pub alias: String,
    /// Joined node the column belongs to, `None` for the level's own rows.
    pub node: Option<NodeId>,
    pub field: String,
    pub kind: ColumnKind,
    pub expr: Fragment,
    /// Allow-list pruning the keys of a JSON column.
    pub mask: Option<FieldPatterns>,
}

/// Junction lookup of a many-to-many level.
#[derive(Debug, Clone)]
pub struct JunctionPlan {
    pub table: String,
    pub alias: String,
    /// Junction column matched against parent keys.
    pub source_key: String,
    /// Junction column holding target keys.
    pub target_key: String,
    pub source_type: FieldType,
    pub target_type: FieldType,
    pub condition: Option<Fragment>,
    pub order_by: Vec<OrderTerm>,
}

/// SELECT for one level: the root rows, or the rows of a separately loaded include
/// together with the includes joined onto them.
#[derive(Debug, Clone)]
pub struct LevelPlan {
    /// Separate node the level loads, `None` for the root.
    pub anchor: Option<NodeId>,
    pub collection: String,
    pub table: String,
    pub alias: String,
    pub primary_key: String,
    pub columns: Vec<LevelColumn>,
    pub joins: JoinAccumulator,
    pub condition: Option<Fragment>,
    pub order_by: Vec<OrderTerm>,
    /// Column matched against parent keys, with its type. `None` for the root.
    pub key: Option<(Fragment, FieldType)>,
    pub junction: Option<JunctionPlan>,
}

impl LevelPlan {
    /// Position of the level's own primary key column.
    pub fn primary_key_column(&self) -> Option<&LevelColumn> {
        self.columns
            .iter()
            .find(|c| c.node.is_none() && c.field == self.primary_key)
    }
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub collection: String,
    pub table: String,
    pub alias: String,
    pub primary_key: String,
    pub pk_type: FieldType,
    pub tree: IncludeTree,
    /// Root level; its condition is the WHERE clause of the read.
    pub root: LevelPlan,
    pub limit: Option<u64>,
    pub offset: u64,
    pub strategy: ReadStrategy,
    pub levels: HashMap<NodeId, LevelPlan>,
    /// Every table the read touches, used as cache tags.
    pub tables_involved: BTreeSet<String>,
}

impl QueryPlan {
    pub fn level(&self, anchor: Option<NodeId>) -> Option<&LevelPlan> {
        match anchor {
            Some(id) => self.levels.get(&id),
            None => Some(&self.root),
        }
    }

    /// Whether the total count needs its own query.
    pub fn needs_count(&self) -> bool {
        self.limit.is_some() || self.offset > 0
    }
}
