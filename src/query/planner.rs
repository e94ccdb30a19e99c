//! Read planning: field expansion, filter/sort compilation and level layout.

use std::collections::{BTreeSet, HashMap};

use crate::{
    error::{Error, QueryError},
    model::{
        app::EngineSettings,
        include::{IncludeKind, IncludeTree, NodeId},
        permission::Action,
        query::{Query, SortTerm},
    },
    permission::Access,
    query::{
        expand::Expander,
        join::JoinKind,
        plan::{JunctionPlan, LevelColumn, LevelPlan, OrderTerm, QueryPlan, ReadStrategy},
        SqlCompiler, TableRef,
    },
    schema::{collection::SORT, FieldType},
    sql::{ColumnKind, Dialect, Fragment},
};

pub struct Planner<'c, 'a> {
    pub(super) access: &'c Access<'a>,
    pub(super) dialect: Dialect,
    pub(super) settings: &'c EngineSettings,
}

impl<'c, 'a> Planner<'c, 'a> {
    /// Creates a new instance of [`Planner`]
    pub fn new(access: &'c Access<'a>, dialect: Dialect, settings: &'c EngineSettings) -> Self {
        Self {
            access,
            dialect,
            settings,
        }
    }

    /// Plans a read of `collection`.
    ///
    /// # Returns
    /// - `Ok(QueryPlan)` - Root SELECT, one level per separately loaded include, cache tags
    /// - `Err(Error)` - Unknown names, malformed query, or missing read permission
    pub fn plan(&self, collection: &str, query: &Query) -> Result<QueryPlan, Error> {
        self.access.check_read(collection)?;
        let catalog = self.access.catalog();
        let schema = catalog.get_schema_definition(collection)?;

        let tree = Expander::new(
            self.access,
            collection,
            &query.rel_conditions,
            self.settings.wildcard_depth,
        )
        .expand(query.fields.as_deref(), &query.required)?;

        let paranoid = query.is_paranoid();
        let mut compiler =
            SqlCompiler::new(self.access, self.dialect, paranoid).with_rel_conditions(&query.rel_conditions);
        let base = TableRef::new(collection, tree.alias.clone(), "");
        compiler.note_collection(collection)?;

        self.join_includes(&mut compiler, &tree, None, &base)?;

        let mut parts = Vec::new();
        if let Some(filter) = &query.filter {
            if let Some(compiled) = compiler.compile_filter(&base, filter)? {
                parts.push(compiled);
            }
        }
        if let Some(term) = &query.search {
            if let Some(compiled) = compiler.compile_search(&base, term, query.search_fields.as_deref())? {
                parts.push(compiled);
            }
        }
        if let Some(scope) = compiler.scope_condition(&base, true)? {
            parts.push(scope);
        }
        let condition = Fragment::and(parts);

        let mut terms = query.sort_terms()?;
        if terms.is_empty() {
            terms.push(SortTerm::asc(schema.default_sort_field()));
        }
        if !terms.iter().any(|t| t.field == schema.primary_key) {
            terms.push(SortTerm::asc(schema.primary_key.clone()));
        }
        let order_by = compiler.compile_sort(&base, &terms)?;

        let (limit, offset) = self.pagination(query)?;
        let strategy = if compiler.joins().has_multi_valued() {
            ReadStrategy::TwoPhase
        } else {
            ReadStrategy::Single
        };

        let columns = self.level_columns(&tree, None)?;
        let (joins, mut tables) = compiler.into_parts();
        let root = LevelPlan {
            anchor: None,
            collection: collection.to_string(),
            table: schema.table.clone(),
            alias: tree.alias.clone(),
            primary_key: schema.primary_key.clone(),
            columns,
            joins,
            condition,
            order_by,
            key: None,
            junction: None,
        };

        let mut levels = HashMap::new();
        for id in tree.walk() {
            if tree.node(id).separate {
                let (level, level_tables) = self.plan_level(&tree, id, query)?;
                tables.extend(level_tables);
                levels.insert(id, level);
            }
        }

        let pk_type = schema
            .primary_key_field()
            .map(|f| f.field_type)
            .unwrap_or(FieldType::Integer);

        tracing::debug!(
            collection,
            ?strategy,
            joins = root.joins.len(),
            levels = levels.len(),
            tables = ?tables,
            "planned read"
        );

        Ok(QueryPlan {
            collection: collection.to_string(),
            table: schema.table.clone(),
            alias: tree.alias.clone(),
            primary_key: schema.primary_key.clone(),
            pk_type,
            tree,
            root,
            limit,
            offset,
            strategy,
            levels,
            tables_involved: tables,
        })
    }

    /// Resolves `limit`, `offset` and `page` against the configured defaults.
    ///
    /// A limit of `-1`, requested or configured as the default, means every row.
    pub fn pagination(&self, query: &Query) -> Result<(Option<u64>, u64), Error> {
        let requested = match query.limit.unwrap_or(self.settings.limit_default) {
            -1 => None,
            n if n < 0 => {
                return Err(QueryError::InvalidPagination(format!(
                    "limit must be -1 or a non-negative number, found {}",
                    n
                ))
                .into())
            }
            n => Some(n),
        };
        let limit = match (requested, self.settings.limit_max) {
            (limit, max) if max < 0 => limit,
            (Some(n), max) => Some(n.min(max)),
            (None, max) => Some(max),
        };
        let limit = limit.map(|n| n.max(0) as u64);

        let offset = match query.page {
            Some(page) => page
                .saturating_sub(1)
                .checked_mul(limit.unwrap_or(0))
                .ok_or_else(|| QueryError::InvalidPagination(format!("page {} is out of range", page)))?,
            None => query.offset.unwrap_or(0),
        };
        Ok((limit, offset))
    }

    /// Joins the non-separate includes of `level` onto `base`.
    fn join_includes(
        &self,
        compiler: &mut SqlCompiler<'_>,
        tree: &IncludeTree,
        level: Option<NodeId>,
        base: &TableRef,
    ) -> Result<(), Error> {
        let mut refs: HashMap<NodeId, TableRef> = HashMap::new();
        for id in tree.joined_nodes(level) {
            let node = tree.node(id);
            let parent = match node.parent {
                Some(parent) if Some(parent) != level => refs
                    .get(&parent)
                    .cloned()
                    .ok_or_else(|| Error::InternalError(format!("include \"{}\" joined before its parent", node.path)))?,
                _ => base.clone(),
            };
            let kind = if node.required {
                JoinKind::Inner
            } else {
                JoinKind::Left
            };
            let joined = compiler.join_relation(&parent, &node.relation, kind, true)?;
            refs.insert(id, joined);
        }
        Ok(())
    }

    /// Positional columns of `level` and of every include joined onto it.
    fn level_columns(&self, tree: &IncludeTree, level: Option<NodeId>) -> Result<Vec<LevelColumn>, Error> {
        let catalog = self.access.catalog();
        let nodes = std::iter::once(level).chain(tree.joined_nodes(level).into_iter().map(Some));

        let mut columns = Vec::new();
        for node in nodes {
            let collection = tree.collection_of(node);
            let alias = match node {
                Some(id) => tree.node(id).alias.as_str(),
                None => tree.alias.as_str(),
            };
            let patterns = self.access.field_patterns(collection, Action::Read);

            for field in tree.selection(node).columns() {
                let field_type = catalog.get_field(collection, field)?.field_type;
                let mask = match &patterns {
                    Some(p) if field_type == FieldType::Json && p.addresses_nested(field) => Some(p.clone()),
                    _ => None,
                };
                columns.push(LevelColumn {
                    alias: format!("c{}", columns.len()),
                    node: if node == level { None } else { node },
                    field: field.to_string(),
                    kind: ColumnKind::Field(field_type),
                    expr: Fragment::column(alias, field),
                    mask,
                });
            }
        }
        Ok(columns)
    }

    /// Level of the separately loaded node `id`.
    fn plan_level(
        &self,
        tree: &IncludeTree,
        id: NodeId,
        query: &Query,
    ) -> Result<(LevelPlan, BTreeSet<String>), Error> {
        let catalog = self.access.catalog();
        let node = tree.node(id);
        let schema = catalog.get_schema_definition(&node.collection)?;

        let mut compiler = SqlCompiler::new(self.access, self.dialect, query.is_paranoid())
            .with_rel_conditions(&query.rel_conditions);
        let base = TableRef::new(node.collection.clone(), node.alias.clone(), node.path.clone());
        compiler.note_collection(&node.collection)?;

        self.join_includes(&mut compiler, tree, Some(id), &base)?;

        let mut parts = Vec::new();
        if let Some(scope) = compiler.scope_condition(&base, false)? {
            parts.push(scope);
        }
        if let Some(filter) = &node.filter {
            if let Some(compiled) = compiler.relation_condition(&base, filter)? {
                parts.push(compiled);
            }
        }
        if node.kind == IncludeKind::ManyToAny {
            if let Some(targets) = self.requested_targets(tree, id)? {
                parts.push(targets);
            }
        }

        let mut terms = node.sort.clone();
        terms.push(SortTerm::asc(schema.primary_key.clone()));
        let order_by = compiler.compile_sort(&base, &terms)?;

        let key_type = catalog.get_field(&node.collection, &node.link.child_key)?.field_type;
        let key = (Fragment::column(&node.alias, &node.link.child_key), key_type);

        let junction = match &node.link.junction {
            Some(link) => {
                compiler.note_collection(&link.collection)?;
                let junction_schema = catalog.get_schema_definition(&link.collection)?;
                let junction_ref = TableRef::new(link.collection.clone(), link.alias.clone(), node.path.clone());
                let condition = compiler.scope_condition(&junction_ref, false)?;

                let mut order_by = Vec::new();
                if junction_schema.sort_enabled {
                    order_by.push(OrderTerm {
                        expr: Fragment::column(&link.alias, SORT),
                        descending: false,
                    });
                }
                order_by.push(OrderTerm {
                    expr: Fragment::column(&link.alias, &junction_schema.primary_key),
                    descending: false,
                });

                Some(JunctionPlan {
                    table: junction_schema.table.clone(),
                    alias: link.alias.clone(),
                    source_key: link.source_key.clone(),
                    target_key: link.target_key.clone(),
                    source_type: catalog.get_field(&link.collection, &link.source_key)?.field_type,
                    target_type: catalog.get_field(&link.collection, &link.target_key)?.field_type,
                    condition,
                    order_by,
                })
            }
            None => None,
        };

        let columns = self.level_columns(tree, Some(id))?;
        let (joins, tables) = compiler.into_parts();
        let level = LevelPlan {
            anchor: Some(id),
            collection: node.collection.clone(),
            table: schema.table.clone(),
            alias: node.alias.clone(),
            primary_key: schema.primary_key.clone(),
            columns,
            joins,
            condition: Fragment::and(parts),
            order_by,
            key: Some(key),
            junction,
        };
        Ok((level, tables))
    }

    /// `discriminator IN (...)` restricting polymorphic junction rows to the requested
    /// target collections, `None` when no target was requested explicitly.
    fn requested_targets(&self, tree: &IncludeTree, id: NodeId) -> Result<Option<Fragment>, Error> {
        let node = tree.node(id);
        let mut column = None;
        let mut targets = Vec::new();
        for child in &node.children {
            let child = tree.node(*child);
            if let Some((discriminator, target)) = &child.link.discriminator {
                column = Some(discriminator.clone());
                targets.push(sea_orm::Value::from(target.clone()));
            }
        }
        Ok(column.map(|column| Fragment::column(&node.alias, &column).in_list(targets, false)))
    }
}
