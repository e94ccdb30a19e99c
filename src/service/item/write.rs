//! Per-item mutation pipeline: hooks, permissions, stamping, validation, relation writes.
//!
//! [`Writer`] runs inside one transaction. `create` and `update` recurse through nested
//! relation payloads, so both return boxed futures.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDateTime;
use futures::future::{BoxFuture, FutureExt};
use sea_orm::{ConnectionTrait, DatabaseTransaction};
use serde_json::{json, Value as JsonValue};

use crate::{
    data::item::ItemRepository,
    error::{AccessError, Error, FieldViolation, QueryError, ValidationError},
    hook::BeforeEvent,
    model::{app::AppState, filter::Filter, item::Item, permission::Action, query::Query},
    permission::{Access, TenantScope},
    query::{planner::Planner, select::ID_COLUMN},
    schema::{
        collection::{CREATED_AT, CREATED_BY, DELETED_AT, SORT, TENANT_ID, UPDATED_AT, UPDATED_BY},
        Collection, FieldType, Relation, RelationKind, SchemaCatalog,
    },
    service::item::{
        effects::{Change, Effects},
        payload::{decompose, AnyLink, ChildChange, Decomposed, RelationWrite},
        validate::{validate, Mode},
    },
    sql::value::{decode, format_date, format_datetime, to_db_value},
    sql::ColumnKind,
    util::{key_string, time::now},
};

/// Outcome of resolving a `BelongsTo` payload.
enum ParentLink {
    /// Value for the foreign key.
    Key(JsonValue),
    /// Object whose own `BelongsTo` points back at the item being created. It is created
    /// after the item so it can reference it.
    Circular(Item),
}

/// Prefixes validation failures of a nested payload with the relation name.
fn nested(relation: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |error| match error {
        Error::ValidationError(e) => e.nested_under(relation).into(),
        other => other,
    }
}

fn primary_key(object: &Item, schema: &Collection) -> Option<JsonValue> {
    object.get(&schema.primary_key).filter(|v| !v.is_null()).cloned()
}

/// Value the foreign keys of `relation` hold for `source`.
fn source_value(schema: &Collection, source: &Item, relation: &Relation) -> JsonValue {
    let column = relation.target_key.as_deref().unwrap_or(&schema.primary_key);
    source.get(column).cloned().unwrap_or(JsonValue::Null)
}

fn stamp_time(schema: &Collection, fields: &mut Item, column: &str, now: &NaiveDateTime) {
    if !schema.has_timestamp(column) {
        return;
    }
    let value = match schema.field(column).map(|f| f.field_type) {
        Some(FieldType::Date) => format_date(&now.date()),
        _ => format_datetime(now),
    };
    fields.insert(column.to_string(), JsonValue::String(value));
}

pub struct Writer<'s> {
    state: &'s AppState,
    db: &'s DatabaseTransaction,
    access: &'s Access<'s>,
    effects: &'s mut Effects,
    force: bool,
}

impl<'s> Writer<'s> {
    /// Creates a new instance of [`Writer`]
    ///
    /// `force` hard-deletes rows of soft-delete collections.
    pub fn new(
        state: &'s AppState,
        db: &'s DatabaseTransaction,
        access: &'s Access<'s>,
        effects: &'s mut Effects,
        force: bool,
    ) -> Self {
        Self {
            state,
            db,
            access,
            effects,
            force,
        }
    }

    fn catalog(&self) -> &'s SchemaCatalog {
        self.state.catalog.as_ref()
    }

    fn items(&self) -> ItemRepository<'s, DatabaseTransaction> {
        ItemRepository::new(self.db, self.state.catalog.as_ref(), self.state.dialect)
    }

    pub async fn create_many(&mut self, collection: &str, payloads: Vec<Item>) -> Result<Vec<JsonValue>, Error> {
        let mut keys = Vec::with_capacity(payloads.len());
        for payload in payloads {
            keys.push(self.create(collection, payload).await?);
        }
        Ok(keys)
    }

    /// Creates one item with its nested relation payloads and returns its primary key.
    pub fn create<'f>(&'f mut self, collection: &'f str, payload: Item) -> BoxFuture<'f, Result<JsonValue, Error>> {
        async move {
            let catalog = self.catalog();
            let schema = catalog.get_schema_definition(collection)?;
            self.access.check(collection, Action::Create)?;

            let mut payload = payload;
            let event = BeforeEvent {
                collection,
                action: Action::Create,
                key: None,
                accountability: self.access.accountability(),
            };
            self.state.hooks.run_before(event, &mut payload).await?;

            let Decomposed { mut fields, relations } = decompose(schema, payload)?;
            self.check_fields(schema, Action::Create, &fields, &relations)?;

            for (name, value) in self.access.presets(collection, Action::Create) {
                fields.entry(name).or_insert(value);
            }
            for field in schema.fields.values() {
                if let Some(default) = &field.default {
                    fields.entry(field.name.clone()).or_insert_with(|| default.clone());
                }
            }
            self.stamp_tenant(schema, &mut fields, Mode::Create)?;
            self.stamp_create(schema, &mut fields).await?;

            let mut tables = BTreeSet::from([schema.table.clone()]);
            for write in &relations {
                tables.extend(catalog.relation_tables(collection, &write.relation().name));
            }

            let mut deferred = HashSet::new();
            let mut circular = Vec::new();
            let mut later = Vec::new();
            for write in relations {
                match write {
                    RelationWrite::Parent { relation, value } => {
                        let link = self
                            .resolve_parent(schema, &relation, value, None)
                            .await
                            .map_err(nested(&relation.name))?;
                        match link {
                            ParentLink::Key(key) => {
                                fields.insert(relation.foreign_key.clone(), key);
                            }
                            ParentLink::Circular(object) => {
                                deferred.insert(relation.foreign_key.clone());
                                circular.push((relation, object));
                            }
                        }
                    }
                    other => later.push(other),
                }
            }

            validate(schema, &mut fields, Mode::Create, &deferred)?;
            let key = self.items().insert(collection, &fields).await?;
            fields.insert(schema.primary_key.clone(), key.clone());

            for write in later {
                let name = write.relation().name.clone();
                self.write_relation(schema, &fields, write).await.map_err(nested(&name))?;
            }

            for (relation, object) in circular {
                let target = self
                    .create_circular(schema, &fields, &relation, object)
                    .await
                    .map_err(nested(&relation.name))?;
                let mut link = Item::new();
                link.insert(relation.foreign_key.clone(), target.clone());
                self.items().update(collection, std::slice::from_ref(&key), &link).await?;
                fields.insert(relation.foreign_key.clone(), target);
            }

            tracing::debug!(collection, key = %key, "created item");
            self.effects.record(
                Change {
                    collection,
                    action: Action::Create,
                    key: key.clone(),
                    before: None,
                    after: Some(fields),
                    tables,
                },
                self.access.accountability(),
                self.state.settings.audit_enabled,
            );
            Ok(key)
        }
        .boxed()
    }

    /// Applies `payload` to every item in `keys`.
    ///
    /// Fails with `NotFoundOrForbidden` when any key is missing or outside the caller's
    /// update scope. Returns the keys as stored.
    pub fn update<'f>(
        &'f mut self,
        collection: &'f str,
        keys: Vec<JsonValue>,
        payload: Item,
    ) -> BoxFuture<'f, Result<Vec<JsonValue>, Error>> {
        async move {
            let schema = self.catalog().get_schema_definition(collection)?;
            self.access.check(collection, Action::Update)?;
            let keys = self.require_visible(collection, Action::Update, keys).await?;
            let mut before = self.rows_by_key(schema, &keys).await?;
            for key in &keys {
                let row = key_string(key).and_then(|k| before.remove(&k)).unwrap_or_default();
                self.update_item(schema, key, row, payload.clone()).await?;
            }
            Ok(keys)
        }
        .boxed()
    }

    async fn update_item(&mut self, schema: &Collection, key: &JsonValue, before: Item, mut payload: Item) -> Result<(), Error> {
        let collection = schema.name.as_str();
        let event = BeforeEvent {
            collection,
            action: Action::Update,
            key: Some(key),
            accountability: self.access.accountability(),
        };
        self.state.hooks.run_before(event, &mut payload).await?;

        let Decomposed { mut fields, relations } = decompose(schema, payload)?;
        self.check_fields(schema, Action::Update, &fields, &relations)?;
        fields.remove(&schema.primary_key);

        for (name, value) in self.access.presets(collection, Action::Update) {
            fields.entry(name).or_insert(value);
        }
        self.stamp_tenant(schema, &mut fields, Mode::Update)?;
        self.stamp_update(schema, &mut fields);

        let catalog = self.catalog();
        let mut tables = BTreeSet::from([schema.table.clone()]);
        for write in &relations {
            tables.extend(catalog.relation_tables(collection, &write.relation().name));
        }

        let mut later = Vec::new();
        for write in relations {
            match write {
                RelationWrite::Parent { relation, value } => {
                    let link = self
                        .resolve_parent(schema, &relation, value, Some(&before))
                        .await
                        .map_err(nested(&relation.name))?;
                    if let ParentLink::Key(target) = link {
                        fields.insert(relation.foreign_key.clone(), target);
                    }
                }
                other => later.push(other),
            }
        }

        validate(schema, &mut fields, Mode::Update, &HashSet::new())?;
        self.items().update(collection, std::slice::from_ref(key), &fields).await?;

        let mut after = before.clone();
        after.extend(fields);
        for write in later {
            let name = write.relation().name.clone();
            self.write_relation(schema, &after, write).await.map_err(nested(&name))?;
        }

        tracing::debug!(collection, key = %key, "updated item");
        self.effects.record(
            Change {
                collection,
                action: Action::Update,
                key: key.clone(),
                before: Some(before),
                after: Some(after),
                tables,
            },
            self.access.accountability(),
            self.state.settings.audit_enabled,
        );
        Ok(())
    }

    /// Updates every item matched by the filter of `query` within the caller's update
    /// scope. A positive `limit` caps the number of items.
    pub async fn update_by_query(&mut self, collection: &str, query: &Query, payload: Item) -> Result<Vec<JsonValue>, Error> {
        self.access.check(collection, Action::Update)?;
        let keys = self.keys_by_query(collection, Action::Update, query).await?;
        if keys.is_empty() {
            return Ok(keys);
        }
        self.update(collection, keys, payload).await
    }

    /// Deletes every item in `keys`, soft-deleting rows of soft-delete collections unless
    /// the writer was built with `force`.
    pub async fn delete(&mut self, collection: &str, keys: Vec<JsonValue>) -> Result<Vec<JsonValue>, Error> {
        let catalog = self.catalog();
        let schema = catalog.get_schema_definition(collection)?;
        self.access.check(collection, Action::Delete)?;
        let keys = self.require_visible(collection, Action::Delete, keys).await?;
        if keys.is_empty() {
            return Ok(keys);
        }
        let mut before = self.rows_by_key(schema, &keys).await?;

        let accountability = self.access.accountability();
        for key in &keys {
            let event = BeforeEvent {
                collection,
                action: Action::Delete,
                key: Some(key),
                accountability,
            };
            self.state.hooks.run_before(event, &mut Item::new()).await?;
        }

        let soft = schema.soft_delete && !self.force;
        let mut stamp = Item::new();
        if soft {
            stamp_time(schema, &mut stamp, DELETED_AT, &now());
            self.stamp_update(schema, &mut stamp);
            self.items().update(collection, &keys, &stamp).await?;
        } else {
            self.items().delete(collection, &keys).await?;
        }
        tracing::debug!(collection, count = keys.len(), soft, "deleted items");

        let mut tables = BTreeSet::from([schema.table.clone()]);
        for relation in schema.relations.keys() {
            tables.extend(catalog.relation_tables(collection, relation));
        }
        for key in &keys {
            let row = key_string(key).and_then(|k| before.remove(&k));
            let after = match (&row, soft) {
                (Some(row), true) => {
                    let mut after = row.clone();
                    after.extend(stamp.clone());
                    Some(after)
                }
                _ => None,
            };
            self.effects.record(
                Change {
                    collection,
                    action: Action::Delete,
                    key: key.clone(),
                    before: row,
                    after,
                    tables: tables.clone(),
                },
                accountability,
                self.state.settings.audit_enabled,
            );
        }
        Ok(keys)
    }

    /// Deletes every item matched by the filter of `query` within the caller's delete
    /// scope.
    pub async fn delete_by_query(&mut self, collection: &str, query: &Query) -> Result<Vec<JsonValue>, Error> {
        self.access.check(collection, Action::Delete)?;
        let keys = self.keys_by_query(collection, Action::Delete, query).await?;
        if keys.is_empty() {
            return Ok(keys);
        }
        self.delete(collection, keys).await
    }

    async fn keys_by_query(&self, collection: &str, action: Action, query: &Query) -> Result<Vec<JsonValue>, Error> {
        let mut keys = self
            .visible_keys(collection, action, query.filter.as_ref(), true, None)
            .await?;
        if let Some(limit) = query.limit.filter(|limit| *limit >= 0) {
            keys.truncate(limit as usize);
        }
        Ok(keys)
    }

    /// Primary keys of the live rows of `collection` within the caller's `action` scope,
    /// optionally narrowed by `filter` and `keys`.
    async fn visible_keys(
        &self,
        collection: &str,
        action: Action,
        filter: Option<&Filter>,
        enforce_fields: bool,
        keys: Option<&[JsonValue]>,
    ) -> Result<Vec<JsonValue>, Error> {
        let schema = self.catalog().get_schema_definition(collection)?;
        let pk_type = schema
            .primary_key_field()
            .map(|f| f.field_type)
            .unwrap_or(FieldType::Integer);
        let dialect = self.state.dialect;

        let batches: Vec<Option<&[JsonValue]>> = match keys {
            Some(keys) => keys.chunks(self.state.settings.batch_size.max(1)).map(Some).collect(),
            None => vec![None],
        };
        let mut out = Vec::new();
        for batch in batches {
            let bound = match batch {
                Some(batch) => Some(
                    batch
                        .iter()
                        .map(|key| {
                            to_db_value(pk_type, key, dialect).map_err(|reason| QueryError::InvalidValue {
                                field: schema.primary_key.clone(),
                                reason,
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                None => None,
            };
            let (statement, _) = Planner::new(self.access, dialect, &self.state.settings).plan_keys(
                collection,
                action,
                filter,
                enforce_fields,
                bound,
                true,
            )?;
            let rows = self.db.query_all_raw(statement.render(dialect)).await?;
            for row in &rows {
                out.push(decode(row, ID_COLUMN, ColumnKind::Field(pk_type))?);
            }
        }
        Ok(out)
    }

    /// `keys` without duplicates, as stored. Fails when any of them is missing or outside
    /// the caller's `action` scope.
    async fn require_visible(&self, collection: &str, action: Action, keys: Vec<JsonValue>) -> Result<Vec<JsonValue>, Error> {
        let mut seen = HashSet::new();
        let mut requested = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(id) = key_string(&key) else {
                return Err(Error::not_found_or_forbidden(collection));
            };
            if seen.insert(id.clone()) {
                requested.push((id, key));
            }
        }
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let lookup: Vec<JsonValue> = requested.iter().map(|(_, key)| key.clone()).collect();
        let visible: HashMap<String, JsonValue> = self
            .visible_keys(collection, action, None, false, Some(&lookup))
            .await?
            .into_iter()
            .filter_map(|key| Some((key_string(&key)?, key)))
            .collect();

        requested
            .into_iter()
            .map(|(id, _)| {
                visible
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| Error::not_found_or_forbidden(collection))
            })
            .collect()
    }

    async fn rows_by_key(&self, schema: &Collection, keys: &[JsonValue]) -> Result<HashMap<String, Item>, Error> {
        let mut rows = HashMap::with_capacity(keys.len());
        for batch in keys.chunks(self.state.settings.batch_size.max(1)) {
            for row in self.items().find_by_keys(&schema.name, batch).await? {
                if let Some(id) = row.get(&schema.primary_key).and_then(key_string) {
                    rows.insert(id, row);
                }
            }
        }
        Ok(rows)
    }

    /// Rejects submitted fields and relations outside the caller's field permissions. A
    /// `BelongsTo` relation is allowed when its name or its foreign key is.
    fn check_fields(&self, schema: &Collection, action: Action, fields: &Item, relations: &[RelationWrite]) -> Result<(), Error> {
        let Some(patterns) = self.access.field_patterns(&schema.name, action) else {
            return Ok(());
        };
        let denied = |field: &str| {
            Error::from(AccessError::FieldDenied {
                collection: schema.name.clone(),
                field: field.to_string(),
                action,
            })
        };

        if let Some(field) = fields.keys().find(|name| !patterns.allows_any_of(name)) {
            return Err(denied(field));
        }
        for write in relations {
            let relation = write.relation();
            let allowed = patterns.allows_any_of(&relation.name)
                || (relation.kind == RelationKind::BelongsTo && patterns.allows_any_of(&relation.foreign_key));
            if !allowed {
                return Err(denied(&relation.name));
            }
        }
        Ok(())
    }

    /// Stamps the caller's tenant onto created rows, and rejects payloads naming another
    /// tenant.
    fn stamp_tenant(&self, schema: &Collection, fields: &mut Item, mode: Mode) -> Result<(), Error> {
        if !schema.multi_tenant {
            return Ok(());
        }
        match self.access.tenant() {
            TenantScope::Unrestricted => Ok(()),
            TenantScope::Tenant(tenant) => {
                match fields.get(TENANT_ID) {
                    Some(JsonValue::String(given)) if given != tenant => {
                        return Err(AccessError::TenantForbidden { tenant: given.clone() }.into());
                    }
                    Some(JsonValue::Null) if mode == Mode::Update => {
                        return Err(AccessError::TenantForbidden { tenant: "null".to_string() }.into());
                    }
                    _ => {}
                }
                if mode == Mode::Create || fields.contains_key(TENANT_ID) {
                    fields.insert(TENANT_ID.to_string(), JsonValue::String(tenant.clone()));
                }
                Ok(())
            }
            TenantScope::Missing => Err(AccessError::TenantRequired {
                collection: schema.name.clone(),
            }
            .into()),
        }
    }

    async fn stamp_create(&self, schema: &Collection, fields: &mut Item) -> Result<(), Error> {
        if schema.usertrack {
            if let Some(user) = &self.access.accountability().user {
                for column in [CREATED_BY, UPDATED_BY] {
                    if schema.has_field(column) {
                        fields.insert(column.to_string(), JsonValue::String(user.clone()));
                    }
                }
            }
        }

        let now = now();
        stamp_time(schema, fields, CREATED_AT, &now);
        stamp_time(schema, fields, UPDATED_AT, &now);

        if schema.sort_enabled && schema.has_field(SORT) && fields.get(SORT).map_or(true, JsonValue::is_null) {
            let tenant = fields
                .get(TENANT_ID)
                .and_then(JsonValue::as_str)
                .filter(|_| schema.multi_tenant)
                .map(str::to_string);
            let max = self
                .items()
                .max_sort(&schema.name, tenant.as_deref().map(|t| (TENANT_ID, t)))
                .await?;
            fields.insert(SORT.to_string(), json!(max.unwrap_or(0) + 1));
        }
        Ok(())
    }

    fn stamp_update(&self, schema: &Collection, fields: &mut Item) {
        if schema.usertrack && schema.has_field(UPDATED_BY) {
            if let Some(user) = &self.access.accountability().user {
                fields.insert(UPDATED_BY.to_string(), JsonValue::String(user.clone()));
            }
        }
        stamp_time(schema, fields, UPDATED_AT, &now());
    }

    /// Resolves a `BelongsTo` payload to the foreign key value.
    ///
    /// Objects with a primary key update the parent first, objects without one create it.
    /// When the new parent belongs back to this collection it is created after the item
    /// (`source` is `None`) or pointed at the existing `source` row.
    async fn resolve_parent(
        &mut self,
        schema: &Collection,
        relation: &Relation,
        value: JsonValue,
        source: Option<&Item>,
    ) -> Result<ParentLink, Error> {
        let JsonValue::Object(mut object) = value else {
            return Ok(ParentLink::Key(value));
        };
        let catalog = self.catalog();
        let target = relation.related().unwrap_or_default();
        let target_schema = catalog.get_schema_definition(target)?;

        let key = match primary_key(&object, target_schema) {
            Some(key) => {
                object.remove(&target_schema.primary_key);
                if !object.is_empty() {
                    self.update(target, vec![key.clone()], object).await?;
                }
                key
            }
            None => {
                let back = catalog
                    .belongs_to_back(target, &schema.name)
                    .filter(|_| target != schema.name)
                    .filter(|back| !object.contains_key(&back.name) && !object.contains_key(&back.foreign_key));
                match (back, source) {
                    (Some(_), None) => return Ok(ParentLink::Circular(object)),
                    (Some(back), Some(source)) => {
                        object.insert(back.foreign_key.clone(), source_value(schema, source, back));
                    }
                    (None, _) => {}
                }
                self.create(target, object).await?
            }
        };
        Ok(ParentLink::Key(
            self.target_value(target_schema, key, relation.target_key.as_deref()).await?,
        ))
    }

    /// Creates the parent deferred by [`ParentLink::Circular`], pointing back at `source`.
    async fn create_circular(&mut self, schema: &Collection, source: &Item, relation: &Relation, mut object: Item) -> Result<JsonValue, Error> {
        let target = relation.related().unwrap_or_default();
        let target_schema = self.catalog().get_schema_definition(target)?;
        if let Some(back) = self.catalog().belongs_to_back(target, &schema.name) {
            object.insert(back.foreign_key.clone(), source_value(schema, source, back));
        }
        let key = self.create(target, object).await?;
        self.target_value(target_schema, key, relation.target_key.as_deref()).await
    }

    /// Value of `column` on the row `key`, the key itself when `column` is the primary key.
    async fn target_value(&self, schema: &Collection, key: JsonValue, column: Option<&str>) -> Result<JsonValue, Error> {
        let Some(column) = column.filter(|c| *c != schema.primary_key) else {
            return Ok(key);
        };
        let rows = self.items().find_by_keys(&schema.name, std::slice::from_ref(&key)).await?;
        rows.into_iter()
            .next()
            .and_then(|mut row| row.remove(column))
            .ok_or_else(|| Error::not_found_or_forbidden(&schema.name))
    }

    /// Writes the relations that reference the item, after its row exists.
    async fn write_relation(&mut self, schema: &Collection, source: &Item, write: RelationWrite) -> Result<(), Error> {
        match write {
            // resolved before the row is written
            RelationWrite::Parent { .. } => Ok(()),
            RelationWrite::Children { relation, change } => {
                self.write_children(schema, source, &relation, change).await
            }
            RelationWrite::Links { relation, targets } => {
                self.write_links(schema, source, &relation, targets).await
            }
            RelationWrite::AnyLinks { relation, targets } => {
                self.write_any_links(schema, source, &relation, targets).await
            }
        }
    }

    async fn write_children(&mut self, schema: &Collection, source: &Item, relation: &Relation, change: ChildChange) -> Result<(), Error> {
        let target = relation.related().unwrap_or_default();
        let target_schema = self.catalog().get_schema_definition(target)?;
        let parent = source_value(schema, source, relation);
        let fk = relation.foreign_key.as_str();
        let owned = Filter::eq(fk, parent.clone());

        match change {
            ChildChange::Replace(items) => {
                let mut kept = HashSet::with_capacity(items.len());
                for item in items {
                    let key = self.upsert_child(target_schema, fk, &parent, item).await?;
                    kept.extend(key_string(&key));
                }
                let stale: Vec<JsonValue> = self
                    .visible_keys(target, Action::Update, Some(&owned), false, None)
                    .await?
                    .into_iter()
                    .filter(|key| key_string(key).is_some_and(|id| !kept.contains(&id)))
                    .collect();
                self.detach_children(target_schema, fk, stale).await
            }
            ChildChange::Detailed { create, update, delete } => {
                for mut item in create {
                    item.insert(fk.to_string(), parent.clone());
                    self.create(target, item).await?;
                }
                for item in update {
                    if primary_key(&item, target_schema).is_none() {
                        return Err(ValidationError::new(
                            target,
                            vec![FieldViolation::new(
                                &target_schema.primary_key,
                                "required",
                                "updates of related items need their primary key",
                            )],
                        )
                        .into());
                    }
                    self.upsert_child(target_schema, fk, &parent, JsonValue::Object(item)).await?;
                }
                if !delete.is_empty() {
                    let requested = delete.len();
                    let keys = self
                        .visible_keys(target, Action::Update, Some(&owned), false, Some(&delete))
                        .await?;
                    if keys.len() < requested {
                        return Err(Error::not_found_or_forbidden(target));
                    }
                    self.detach_children(target_schema, fk, keys).await?;
                }
                Ok(())
            }
        }
    }

    /// Points one child at `parent`, creating or updating it as needed. Returns its key.
    async fn upsert_child(&mut self, target: &Collection, fk: &str, parent: &JsonValue, item: JsonValue) -> Result<JsonValue, Error> {
        match item {
            JsonValue::Object(mut object) => {
                object.insert(fk.to_string(), parent.clone());
                match primary_key(&object, target) {
                    Some(key) => {
                        object.remove(&target.primary_key);
                        self.update(&target.name, vec![key.clone()], object).await?;
                        Ok(key)
                    }
                    None => self.create(&target.name, object).await,
                }
            }
            key => {
                let mut link = Item::new();
                link.insert(fk.to_string(), parent.clone());
                let mut keys = self.update(&target.name, vec![key], link).await?;
                keys.pop().ok_or_else(|| Error::not_found_or_forbidden(&target.name))
            }
        }
    }

    /// Detaches children by clearing their foreign key, or deletes them when the foreign
    /// key is not nullable.
    async fn detach_children(&mut self, target: &Collection, fk: &str, keys: Vec<JsonValue>) -> Result<(), Error> {
        if keys.is_empty() {
            return Ok(());
        }
        if target.field(fk).is_some_and(|f| f.nullable) {
            let mut link = Item::new();
            link.insert(fk.to_string(), JsonValue::Null);
            self.update(&target.name, keys, link).await?;
        } else {
            self.delete(&target.name, keys).await?;
        }
        Ok(())
    }

    /// Key of a link target: objects with a primary key are updated, others created.
    async fn link_target(&mut self, target: &Collection, value: JsonValue) -> Result<JsonValue, Error> {
        let JsonValue::Object(mut object) = value else {
            return Ok(value);
        };
        match primary_key(&object, target) {
            Some(key) => {
                object.remove(&target.primary_key);
                if !object.is_empty() {
                    self.update(&target.name, vec![key.clone()], object).await?;
                }
                Ok(key)
            }
            None => self.create(&target.name, object).await,
        }
    }

    async fn write_links(&mut self, schema: &Collection, source: &Item, relation: &Relation, targets: Vec<JsonValue>) -> Result<(), Error> {
        let catalog = self.catalog();
        let target_schema = catalog.get_schema_definition(relation.related().unwrap_or_default())?;
        let junction = catalog.get_schema_definition(relation.junction().unwrap_or_default())?;
        let source_column = relation.foreign_key.as_str();
        let target_column = relation.junction_target_key.as_deref().unwrap_or_default();
        let parent = source_value(schema, source, relation);

        let mut desired = Vec::with_capacity(targets.len());
        for value in targets {
            let key = self.link_target(target_schema, value).await?;
            let Some(id) = key_string(&key) else {
                continue;
            };
            let mut row = Item::new();
            row.insert(source_column.to_string(), parent.clone());
            row.insert(target_column.to_string(), key);
            desired.push((id, row));
        }

        let existing = self
            .junction_rows(junction, source_column, &parent)
            .await?
            .into_iter()
            .map(|row| {
                let id = row.get(target_column).and_then(key_string);
                (id, row)
            })
            .collect();
        self.replace_links(junction, existing, desired).await
    }

    async fn write_any_links(&mut self, schema: &Collection, source: &Item, relation: &Relation, targets: Vec<AnyLink>) -> Result<(), Error> {
        let catalog = self.catalog();
        let junction = catalog.get_schema_definition(relation.junction().unwrap_or_default())?;
        let source_column = relation.foreign_key.as_str();
        let parent = source_value(schema, source, relation);
        let identity = |collection: &str, key: &JsonValue| key_string(key).map(|id| format!("{}\u{0}{}", collection, id));

        let mut desired = Vec::with_capacity(targets.len());
        for AnyLink { collection, item } in targets {
            let target_schema = catalog.get_schema_definition(&collection)?;
            let key = self.link_target(target_schema, item).await?;
            let Some(id) = identity(collection.as_str(), &key) else {
                continue;
            };
            let mut row = Item::new();
            row.insert(source_column.to_string(), parent.clone());
            row.insert(relation.discriminator.clone(), JsonValue::String(collection));
            row.insert(relation.item_key.clone(), key);
            desired.push((id, row));
        }

        let existing = self
            .junction_rows(junction, source_column, &parent)
            .await?
            .into_iter()
            .map(|row| {
                let id = match (row.get(&relation.discriminator), row.get(&relation.item_key)) {
                    (Some(JsonValue::String(collection)), Some(key)) => identity(collection.as_str(), key),
                    _ => None,
                };
                (id, row)
            })
            .collect();
        self.replace_links(junction, existing, desired).await
    }

    async fn junction_rows(&self, junction: &Collection, source_column: &str, parent: &JsonValue) -> Result<Vec<Item>, Error> {
        let live = JsonValue::Null;
        let mut conditions = vec![(source_column, parent)];
        if junction.soft_delete {
            conditions.push((DELETED_AT, &live));
        }
        self.items().find_where(&junction.name, &conditions).await
    }

    /// Deletes junction rows whose identity is not desired and creates the missing ones.
    async fn replace_links(
        &mut self,
        junction: &Collection,
        existing: Vec<(Option<String>, Item)>,
        desired: Vec<(String, Item)>,
    ) -> Result<(), Error> {
        let wanted: HashSet<String> = desired.iter().map(|(id, _)| id.clone()).collect();
        let mut present = HashSet::new();
        let mut stale = Vec::new();
        for (id, row) in existing {
            match id {
                Some(id) if wanted.contains(&id) && present.insert(id.clone()) => {}
                _ => stale.extend(primary_key(&row, junction)),
            }
        }
        if !stale.is_empty() {
            self.delete(&junction.name, stale).await?;
        }

        for (id, row) in desired {
            if present.insert(id) {
                self.create(&junction.name, row).await?;
            }
        }
        Ok(())
    }
}
