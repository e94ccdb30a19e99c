//! Item reads and mutations on behalf of one caller.

mod effects;
mod payload;
mod read;
mod scope;
mod validate;
mod write;

#[cfg(test)]
mod tests;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    cache::{
        key::{read_key, ReadKind},
        CacheLayer,
    },
    error::Error,
    model::{
        accountability::Accountability,
        app::AppState,
        item::{Item, ReadResult},
        mutation::MutationOptions,
        permission::Action,
        query::Query,
    },
    permission::{Access, TenantScope},
};

pub use scope::MutationScope;

pub struct ItemService<'a> {
    state: &'a AppState,
    accountability: &'a Accountability,
}

impl<'a> ItemService<'a> {
    /// Creates a new instance of [`ItemService`]
    pub fn new(state: &'a AppState, accountability: &'a Accountability) -> Self {
        Self {
            state,
            accountability,
        }
    }

    fn access(&self, explicit_tenant: Option<&str>) -> Result<Access<'a>, Error> {
        let tenant = TenantScope::resolve(
            self.accountability,
            explicit_tenant,
            self.state.settings.tenant_enforcement,
        )?;
        Ok(Access::new(
            self.state.catalog.as_ref(),
            self.state.permissions.as_ref(),
            self.accountability,
            tenant,
        ))
    }

    /// Reads the items of `collection` matching `query`, with the requested relations.
    ///
    /// Results are cached per query, caller and tenant until a mutation touches one of the
    /// tables the read involved.
    ///
    /// # Arguments
    /// - `collection` - Collection to read
    /// - `query` - Filter, sort, fields, pagination and search of the read
    ///
    /// # Returns
    /// - `Ok(ReadResult)` - Matching page of items and the total count before pagination
    /// - `Err(Error::AccessError)` - The caller may not read `collection`, or no tenant
    /// - `Err(Error::QueryError)` - Unknown names or a malformed query
    pub async fn read_by_query(&self, collection: &str, query: &Query) -> Result<ReadResult, Error> {
        let access = self.access(query.tenant.as_deref())?;
        access.check_read(collection)?;

        let key = read_key(ReadKind::Query, collection, query, self.accountability, access.tenant())?;
        let cache = self.state.cache.as_ref();
        if let Some(result) = cached::<ReadResult>(cache, &key).await {
            tracing::trace!(collection, "read served from cache");
            return Ok(result);
        }

        let epoch = cache.epoch();
        let (result, tables) = read::load(&self.state.db, self.state, &access, collection, query).await?;
        store(cache, &key, &result, tables, epoch).await;
        Ok(result)
    }

    /// Reads the item with primary key `key`.
    ///
    /// # Returns
    /// - `Ok(Item)` - The item with the fields and relations `query` selects
    /// - `Err(Error::AccessError)` - `NotFoundOrForbidden` when the item is missing or
    ///   outside the caller's read scope
    pub async fn read_one(&self, collection: &str, key: &JsonValue, query: &Query) -> Result<Item, Error> {
        let schema = self.state.catalog.get_schema_definition(collection)?;
        let keys = std::slice::from_ref(key);
        let (keyed, added_pk) = read::keyed_query(schema, query, keys);
        let result = self.read_by_query(collection, &keyed).await?;
        read::order_by_keys(result.data, &schema.primary_key, keys, added_pk)
            .pop()
            .ok_or_else(|| Error::not_found_or_forbidden(collection))
    }

    /// Reads the items with primary keys in `keys`, in the order of `keys`. Keys without a
    /// visible item are skipped.
    pub async fn read_many(&self, collection: &str, keys: &[JsonValue], query: &Query) -> Result<Vec<Item>, Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.state.catalog.get_schema_definition(collection)?;
        // one keyed read per chunk so the configured maximum limit never drops keys
        let mut items = Vec::with_capacity(keys.len());
        let mut added_pk = false;
        for chunk in read::key_chunks(keys, self.state.settings.limit_max) {
            let (keyed, added) = read::keyed_query(schema, query, chunk);
            added_pk = added;
            items.extend(self.read_by_query(collection, &keyed).await?.data);
        }
        Ok(read::order_by_keys(items, &schema.primary_key, keys, added_pk))
    }

    /// Runs the aggregate of `query` over `collection`, one item per group.
    ///
    /// # Returns
    /// - `Ok(Vec<Item>)` - One item per group with the group values and aggregate results
    /// - `Err(Error::QueryError)` - Missing or invalid aggregate, or unknown fields
    pub async fn aggregate(&self, collection: &str, query: &Query) -> Result<Vec<Item>, Error> {
        let access = self.access(query.tenant.as_deref())?;
        access.check_read(collection)?;

        let key = read_key(ReadKind::Aggregate, collection, query, self.accountability, access.tenant())?;
        let cache = self.state.cache.as_ref();
        if let Some(items) = cached::<Vec<Item>>(cache, &key).await {
            return Ok(items);
        }

        let epoch = cache.epoch();
        let (items, tables) = read::load_aggregate(&self.state.db, self.state, &access, collection, query).await?;
        store(cache, &key, &items, tables, epoch).await;
        Ok(items)
    }

    /// Opens a unit of work whose mutations commit or roll back together.
    pub async fn begin(&self) -> Result<MutationScope<'a>, Error> {
        MutationScope::begin(self.state, self.accountability).await
    }

    /// Fails before any transaction starts when the caller cannot `action` `collection` at
    /// all.
    fn precheck(&self, collection: &str, action: Action, options: MutationOptions) -> Result<(), Error> {
        self.state.catalog.get_schema_definition(collection)?;
        let access = self.access(None)?;
        if !options.bypass_permissions {
            access.check(collection, action)?;
        }
        access.tenant_filter(collection)?;
        Ok(())
    }

    /// Creates one item, with nested relation payloads, in its own transaction.
    ///
    /// # Arguments
    /// - `collection` - Collection to create the item in
    /// - `payload` - Field values and relation payloads
    /// - `options` - Permission bypass and hard-delete switches
    ///
    /// # Returns
    /// - `Ok(JsonValue)` - Primary key of the new item
    /// - `Err(Error::AccessError)` - `PermissionDenied`, `FieldDenied` or tenant failures
    /// - `Err(Error::ValidationError)` - Every rule violation of the payload
    pub async fn create_one(&self, collection: &str, payload: Item, options: MutationOptions) -> Result<JsonValue, Error> {
        self.precheck(collection, Action::Create, options)?;
        let mut scope = self.begin().await?;
        let result = scope.create_one(collection, payload, options).await;
        scope.finish(result).await
    }

    /// Creates every payload in one transaction. The first failing item fails the batch.
    pub async fn create_many(&self, collection: &str, payloads: Vec<Item>, options: MutationOptions) -> Result<Vec<JsonValue>, Error> {
        self.precheck(collection, Action::Create, options)?;
        let mut scope = self.begin().await?;
        let result = scope.create_many(collection, payloads, options).await;
        scope.finish(result).await
    }

    pub async fn update_one(&self, collection: &str, key: JsonValue, payload: Item, options: MutationOptions) -> Result<JsonValue, Error> {
        self.precheck(collection, Action::Update, options)?;
        let mut scope = self.begin().await?;
        let result = scope.update_one(collection, key, payload, options).await;
        scope.finish(result).await
    }

    /// Applies `payload` to every item in `keys`.
    ///
    /// # Returns
    /// - `Ok(Vec<JsonValue>)` - Updated keys
    /// - `Err(Error::AccessError)` - `NotFoundOrForbidden` when any key is missing or
    ///   outside the caller's update scope; nothing is written
    pub async fn update_many(
        &self,
        collection: &str,
        keys: Vec<JsonValue>,
        payload: Item,
        options: MutationOptions,
    ) -> Result<Vec<JsonValue>, Error> {
        self.precheck(collection, Action::Update, options)?;
        let mut scope = self.begin().await?;
        let result = scope.update_many(collection, keys, payload, options).await;
        scope.finish(result).await
    }

    /// Applies `payload` to every item the filter of `query` matches within the caller's
    /// update scope.
    pub async fn update_by_query(
        &self,
        collection: &str,
        query: &Query,
        payload: Item,
        options: MutationOptions,
    ) -> Result<Vec<JsonValue>, Error> {
        self.precheck(collection, Action::Update, options)?;
        let mut scope = self.begin().await?;
        let result = scope.update_by_query(collection, query, payload, options).await;
        scope.finish(result).await
    }

    pub async fn delete_one(&self, collection: &str, key: JsonValue, options: MutationOptions) -> Result<JsonValue, Error> {
        self.precheck(collection, Action::Delete, options)?;
        let mut scope = self.begin().await?;
        let result = scope.delete_one(collection, key, options).await;
        scope.finish(result).await
    }

    /// Deletes every item in `keys`. Soft-delete collections get `deleted_at` stamped
    /// unless `options.force` is set.
    pub async fn delete_many(&self, collection: &str, keys: Vec<JsonValue>, options: MutationOptions) -> Result<Vec<JsonValue>, Error> {
        self.precheck(collection, Action::Delete, options)?;
        let mut scope = self.begin().await?;
        let result = scope.delete_many(collection, keys, options).await;
        scope.finish(result).await
    }

    pub async fn delete_by_query(&self, collection: &str, query: &Query, options: MutationOptions) -> Result<Vec<JsonValue>, Error> {
        self.precheck(collection, Action::Delete, options)?;
        let mut scope = self.begin().await?;
        let result = scope.delete_by_query(collection, query, options).await;
        scope.finish(result).await
    }
}

async fn cached<T: DeserializeOwned>(cache: &CacheLayer, key: &str) -> Option<T> {
    let value = cache.get(key).await?;
    match serde_json::from_value(value) {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::warn!(key, "discarding unreadable cache entry: {}", e);
            None
        }
    }
}

async fn store<T: Serialize>(
    cache: &CacheLayer,
    key: &str,
    value: &T,
    tables: std::collections::BTreeSet<String>,
    epoch: u64,
) {
    match serde_json::to_value(value) {
        Ok(value) => {
            let tables: Vec<String> = tables.into_iter().collect();
            cache.put(key, &value, &tables, epoch).await;
        }
        Err(e) => tracing::warn!(key, "failed to serialize read for the cache: {}", e),
    }
}
