//! Relation loader: executes a [`QueryPlan`] and assembles the nested result.
//!
//! Every level of the plan (the root, and each separately loaded include) is one keyed
//! SELECT whose flat rows carry the columns of the includes joined onto it. Rows are
//! nested bottom-up, then separately loaded children are fetched by the keys of the
//! rows just read and attached, recursively.

use std::collections::{HashMap, HashSet};

use futures::future::{BoxFuture, FutureExt};
use sea_orm::{ConnectionTrait, QueryResult, Value};
use serde_json::Value as JsonValue;

use crate::{
    error::Error,
    model::{
        include::{IncludeNode, IncludeTree, NodeId},
        item::{Item, ReadResult},
    },
    query::{
        plan::{LevelPlan, QueryPlan, ReadStrategy},
        select::{self, COUNT_COLUMN, ID_COLUMN, JUNCTION_SOURCE, JUNCTION_TARGET},
    },
    schema::FieldType,
    sql::{value::decode, value::to_db_value, ColumnKind, Dialect, Fragment},
    util::key_string,
};

pub struct RelationLoader<'a, C: ConnectionTrait> {
    db: &'a C,
    dialect: Dialect,
    batch_size: usize,
}

impl<'a, C: ConnectionTrait> RelationLoader<'a, C> {
    /// Creates a new instance of [`RelationLoader`]
    pub fn new(db: &'a C, dialect: Dialect, batch_size: usize) -> Self {
        Self {
            db,
            dialect,
            batch_size: batch_size.max(1),
        }
    }

    /// Executes `plan`.
    ///
    /// # Returns
    /// - `Ok(ReadResult)` - Nested items in query order with the unpaginated total
    /// - `Err(Error)` - Database failure
    pub async fn load(&self, plan: &QueryPlan) -> Result<ReadResult, Error> {
        let (mut items, total_count) = match plan.strategy {
            ReadStrategy::Single => {
                let rows = self.query_all(select::root_rows(plan, self.dialect)).await?;
                let items = self.assemble(&plan.tree, &plan.root, &rows)?;
                let total = if plan.needs_count() {
                    self.count(select::root_count(plan)).await?
                } else {
                    items.len() as u64
                };
                (items, total)
            }
            ReadStrategy::TwoPhase => {
                let id_rows = self.query_all(select::distinct_ids(plan, self.dialect)).await?;
                let ids = id_rows
                    .iter()
                    .map(|row| decode(row, ID_COLUMN, ColumnKind::Field(plan.pk_type)))
                    .collect::<Result<Vec<_>, _>>()?;
                let total = if plan.needs_count() {
                    self.count(select::distinct_count(plan)).await?
                } else {
                    ids.len() as u64
                };
                (self.hydrate(plan, &ids).await?, total)
            }
        };

        self.load_separate(plan, None, &mut items).await?;
        for item in &mut items {
            strip_helpers(&plan.tree, None, item);
        }

        tracing::debug!(
            collection = %plan.collection,
            strategy = ?plan.strategy,
            rows = items.len(),
            total_count,
            "loaded read"
        );

        Ok(ReadResult {
            data: items,
            total_count,
        })
    }

    /// Root rows for `ids`, in the order of `ids`.
    async fn hydrate(&self, plan: &QueryPlan, ids: &[JsonValue]) -> Result<Vec<Item>, Error> {
        let mut by_id: HashMap<String, Item> = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(self.batch_size) {
            let values = self.bind_keys(chunk.iter(), plan.pk_type);
            if values.is_empty() {
                continue;
            }
            let rows = self.query_all(select::root_rows_by_ids(plan, values)).await?;
            for item in self.assemble(&plan.tree, &plan.root, &rows)? {
                if let Some(key) = item.get(&plan.primary_key).and_then(key_string) {
                    by_id.insert(key, item);
                }
            }
        }

        Ok(ids
            .iter()
            .filter_map(key_string)
            .filter_map(|key| by_id.remove(&key))
            .collect())
    }

    async fn query_all(&self, statement: Fragment) -> Result<Vec<QueryResult>, Error> {
        Ok(self.db.query_all_raw(statement.render(self.dialect)).await?)
    }

    async fn count(&self, statement: Fragment) -> Result<u64, Error> {
        let row = self.db.query_one_raw(statement.render(self.dialect)).await?;
        let count = match row {
            Some(row) => decode(&row, COUNT_COLUMN, ColumnKind::Count)?
                .as_u64()
                .unwrap_or(0),
            None => 0,
        };
        Ok(count)
    }

    /// Distinct, bindable keys. Keys that do not fit `field_type` cannot match anything
    /// and are dropped.
    fn bind_keys<'k>(&self, keys: impl Iterator<Item = &'k JsonValue>, field_type: FieldType) -> Vec<Value> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for key in keys {
            let Some(text) = key_string(key) else {
                continue;
            };
            if !seen.insert(text) {
                continue;
            }
            match to_db_value(field_type, key, self.dialect) {
                Ok(value) => out.push(value),
                Err(reason) => tracing::debug!(%key, reason, "skipping unbindable relation key"),
            }
        }
        out
    }

    /// Nests the flat rows of `level` into items: joined includes become sub-objects,
    /// or `null` when the related row does not exist.
    fn assemble(&self, tree: &IncludeTree, level: &LevelPlan, rows: &[QueryResult]) -> Result<Vec<Item>, Error> {
        let joined = tree.joined_nodes(level.anchor);
        let mut items = Vec::with_capacity(rows.len());

        for row in rows {
            let mut own = Item::new();
            let mut nested: HashMap<NodeId, Item> = HashMap::new();
            for column in &level.columns {
                let mut value = decode(row, &column.alias, column.kind)?;
                if let Some(mask) = &column.mask {
                    value = mask.prune(&column.field, &value);
                }
                match column.node {
                    None => own.insert(column.field.clone(), value),
                    Some(node) => nested.entry(node).or_default().insert(column.field.clone(), value),
                };
            }

            // children come after their parents in pre-order
            for id in joined.iter().rev() {
                let node = tree.node(*id);
                let object = nested.remove(id).unwrap_or_default();
                // the link column is non-null on every joined row
                let exists = match object.get(&node.link.child_key) {
                    Some(value) => !value.is_null(),
                    None => object.values().any(|v| !v.is_null()),
                };
                let value = if exists {
                    JsonValue::Object(object)
                } else {
                    JsonValue::Null
                };

                let parent = match node.parent {
                    Some(parent) if Some(parent) != level.anchor => nested.entry(parent).or_default(),
                    _ => &mut own,
                };
                parent.insert(node.key.clone(), value);
            }
            items.push(own);
        }
        Ok(items)
    }

    /// Loads every separately loaded include reachable from `level` into `items`.
    fn load_separate<'s>(
        &'s self,
        plan: &'s QueryPlan,
        level: Option<NodeId>,
        items: &'s mut Vec<Item>,
    ) -> BoxFuture<'s, Result<(), Error>> {
        async move {
            if items.is_empty() {
                return Ok(());
            }
            for id in plan.tree.separate_children(level) {
                self.load_node(plan, level, id, items).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn load_node(
        &self,
        plan: &QueryPlan,
        level: Option<NodeId>,
        id: NodeId,
        items: &mut [Item],
    ) -> Result<(), Error> {
        let tree = &plan.tree;
        let node = tree.node(id);
        let Some(level_plan) = plan.levels.get(&id) else {
            return Err(Error::InternalError(format!(
                "include \"{}\" has no planned level",
                node.path
            )));
        };
        let path: Vec<&str> = match node.parent {
            Some(parent) if Some(parent) != level => tree.relative_path(level, parent),
            _ => Vec::new(),
        };

        let mut parent_keys = Vec::new();
        for item in items.iter() {
            visit_parents(item, &path, &mut |parent| {
                if matches_discriminator(parent, node.link.discriminator.as_ref()) {
                    if let Some(key) = parent.get(&node.link.parent_key) {
                        parent_keys.push(key.clone());
                    }
                }
            });
        }
        if parent_keys.is_empty() {
            attach(items, &path, node, &HashMap::new());
            return Ok(());
        }

        let groups = match &level_plan.junction {
            None => self.load_direct(plan, id, level_plan, &parent_keys).await?,
            Some(_) => self.load_through_junction(plan, id, level_plan, &parent_keys).await?,
        };
        attach(items, &path, node, &groups);
        Ok(())
    }

    /// Child rows keyed by the column that references the parent.
    async fn load_direct(
        &self,
        plan: &QueryPlan,
        id: NodeId,
        level: &LevelPlan,
        parent_keys: &[JsonValue],
    ) -> Result<HashMap<String, Vec<JsonValue>>, Error> {
        let node = plan.tree.node(id);
        let key_type = level
            .key
            .as_ref()
            .map(|(_, field_type)| *field_type)
            .unwrap_or(FieldType::String);

        let mut children = Vec::new();
        let keys = self.bind_keys(parent_keys.iter(), key_type);
        for chunk in keys.chunks(self.batch_size) {
            let rows = self
                .query_all(select::level_rows(level, chunk.to_vec()))
                .await?;
            children.extend(self.assemble(&plan.tree, level, &rows)?);
        }
        self.load_separate(plan, Some(id), &mut children).await?;

        let mut groups: HashMap<String, Vec<JsonValue>> = HashMap::new();
        for child in children {
            let Some(key) = child.get(&node.link.child_key).and_then(key_string) else {
                continue;
            };
            groups.entry(key).or_default().push(JsonValue::Object(child));
        }
        Ok(groups)
    }

    /// Many-to-many targets keyed by the junction's source column, in link order.
    async fn load_through_junction(
        &self,
        plan: &QueryPlan,
        id: NodeId,
        level: &LevelPlan,
        parent_keys: &[JsonValue],
    ) -> Result<HashMap<String, Vec<JsonValue>>, Error> {
        let node = plan.tree.node(id);
        let Some(junction) = &level.junction else {
            return Ok(HashMap::new());
        };

        let mut links: Vec<(String, JsonValue)> = Vec::new();
        let sources = self.bind_keys(parent_keys.iter(), junction.source_type);
        for chunk in sources.chunks(self.batch_size) {
            let rows = self
                .query_all(select::junction_rows(junction, chunk.to_vec()))
                .await?;
            for row in &rows {
                let source = decode(row, JUNCTION_SOURCE, ColumnKind::Field(junction.source_type))?;
                let target = decode(row, JUNCTION_TARGET, ColumnKind::Field(junction.target_type))?;
                if let Some(source) = key_string(&source) {
                    if !target.is_null() {
                        links.push((source, target));
                    }
                }
            }
        }
        if links.is_empty() {
            return Ok(HashMap::new());
        }

        let key_type = level
            .key
            .as_ref()
            .map(|(_, field_type)| *field_type)
            .unwrap_or(junction.target_type);
        let mut targets = Vec::new();
        let keys = self.bind_keys(links.iter().map(|(_, target)| target), key_type);
        for chunk in keys.chunks(self.batch_size) {
            let rows = self
                .query_all(select::level_rows(level, chunk.to_vec()))
                .await?;
            targets.extend(self.assemble(&plan.tree, level, &rows)?);
        }
        self.load_separate(plan, Some(id), &mut targets).await?;

        let mut by_key: HashMap<String, Item> = HashMap::new();
        for target in targets {
            if let Some(key) = target.get(&node.link.child_key).and_then(key_string) {
                by_key.insert(key, target);
            }
        }

        // targets hidden by a filter drop out of the link list
        let mut groups: HashMap<String, Vec<JsonValue>> = HashMap::new();
        for (source, target) in links {
            let Some(target) = key_string(&target).and_then(|key| by_key.get(&key)) else {
                continue;
            };
            groups
                .entry(source)
                .or_default()
                .push(JsonValue::Object(target.clone()));
        }
        Ok(groups)
    }
}

fn matches_discriminator(parent: &Item, discriminator: Option<&(String, String)>) -> bool {
    match discriminator {
        Some((column, target)) => parent.get(column).and_then(|v| v.as_str()) == Some(target.as_str()),
        None => true,
    }
}

/// Calls `f` for every object found by following `path` from `item`. Missing or null
/// relations end the walk.
fn visit_parents<F: FnMut(&Item)>(item: &Item, path: &[&str], f: &mut F) {
    match path.split_first() {
        None => f(item),
        Some((head, rest)) => match item.get(*head) {
            Some(JsonValue::Object(child)) => visit_parents(child, rest, f),
            Some(JsonValue::Array(children)) => {
                for child in children {
                    if let JsonValue::Object(child) = child {
                        visit_parents(child, rest, f);
                    }
                }
            }
            _ => {}
        },
    }
}

fn visit_parents_mut<F: FnMut(&mut Item)>(item: &mut Item, path: &[&str], f: &mut F) {
    match path.split_first() {
        None => f(item),
        Some((head, rest)) => match item.get_mut(*head) {
            Some(JsonValue::Object(child)) => visit_parents_mut(child, rest, f),
            Some(JsonValue::Array(children)) => {
                for child in children {
                    if let JsonValue::Object(child) = child {
                        visit_parents_mut(child, rest, f);
                    }
                }
            }
            _ => {}
        },
    }
}

/// Attaches loaded rows of `node` to every parent object below `path`.
fn attach(
    items: &mut [Item],
    path: &[&str],
    node: &IncludeNode,
    groups: &HashMap<String, Vec<JsonValue>>,
) {
    let multi_valued = node.kind.is_multi_valued();
    for item in items.iter_mut() {
        visit_parents_mut(item, path, &mut |parent| {
            if !matches_discriminator(parent, node.link.discriminator.as_ref()) {
                return;
            }
            let matched = parent
                .get(&node.link.parent_key)
                .and_then(key_string)
                .and_then(|key| groups.get(&key));
            let value = match (matched, multi_valued) {
                (Some(rows), true) => JsonValue::Array(rows.clone()),
                (None, true) => JsonValue::Array(Vec::new()),
                (Some(rows), false) => rows.first().cloned().unwrap_or(JsonValue::Null),
                (None, false) => JsonValue::Null,
            };
            parent.insert(node.key.clone(), value);
        });
    }
}

/// Removes key and link columns nobody asked for, at every level of `item`.
fn strip_helpers(tree: &IncludeTree, node: Option<NodeId>, item: &mut Item) {
    let selection = tree.selection(node);
    let children = tree.children(node);
    for helper in &selection.helpers {
        let is_child_key = children.iter().any(|id| tree.node(*id).key == *helper);
        if !is_child_key && !selection.attributes.contains(helper) {
            item.remove(helper);
        }
    }

    for id in children {
        match item.get_mut(&tree.node(*id).key) {
            Some(JsonValue::Object(child)) => strip_helpers(tree, Some(*id), child),
            Some(JsonValue::Array(rows)) => {
                for row in rows {
                    if let JsonValue::Object(child) = row {
                        strip_helpers(tree, Some(*id), child);
                    }
                }
            }
            _ => {}
        }
    }
}
