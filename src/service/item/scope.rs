//! Unit of work spanning several mutations.

use serde_json::Value as JsonValue;

use crate::{
    data::transaction::TrackedTransaction,
    error::Error,
    model::{
        accountability::Accountability,
        app::AppState,
        item::{Item, ReadResult},
        mutation::MutationOptions,
        query::Query,
    },
    permission::{Access, TenantScope},
    schema::SchemaCatalog,
    service::item::{effects::Effects, read, write::Writer},
};

/// Mutations sharing one transaction.
///
/// Audit entries, after hooks, cache invalidation and change notifications of every
/// operation are held back until [`commit`](MutationScope::commit) and dropped on
/// [`abort`](MutationScope::abort). Once an operation fails the scope can only roll back.
pub struct MutationScope<'a> {
    state: &'a AppState,
    accountability: &'a Accountability,
    txn: TrackedTransaction,
    effects: Effects,
    failed: bool,
}

impl<'a> MutationScope<'a> {
    pub(crate) async fn begin(state: &'a AppState, accountability: &'a Accountability) -> Result<Self, Error> {
        Ok(Self {
            state,
            accountability,
            txn: TrackedTransaction::begin(&state.db).await?,
            effects: Effects::default(),
            failed: false,
        })
    }

    /// Caller the operation runs as. Bypassing permissions keeps the tenant.
    fn caller(&self, options: MutationOptions) -> Accountability {
        let mut caller = self.accountability.clone();
        if options.bypass_permissions {
            caller.admin = true;
        }
        caller
    }

    fn tenant(&self, caller: &Accountability, explicit: Option<&str>) -> Result<TenantScope, Error> {
        Ok(TenantScope::resolve(
            caller,
            explicit,
            self.state.settings.tenant_enforcement,
        )?)
    }

    fn track<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &result {
            tracing::debug!(error = %e, "mutation scope operation failed");
            self.failed = true;
        }
        result
    }

    pub async fn create_one(&mut self, collection: &str, payload: Item, options: MutationOptions) -> Result<JsonValue, Error> {
        let mut keys = self.create_many(collection, vec![payload], options).await?;
        keys.pop()
            .ok_or_else(|| Error::InternalError(format!("create in \"{}\" returned no key", collection)))
    }

    pub async fn create_many(&mut self, collection: &str, payloads: Vec<Item>, options: MutationOptions) -> Result<Vec<JsonValue>, Error> {
        let caller = self.caller(options);
        let tenant = self.tenant(&caller, None)?;
        let result = {
            let access = Access::new(self.state.catalog.as_ref(), self.state.permissions.as_ref(), &caller, tenant);
            let mut writer = Writer::new(self.state, self.txn.as_ref(), &access, &mut self.effects, options.force);
            writer.create_many(collection, payloads).await
        };
        self.track(result)
    }

    pub async fn update_one(&mut self, collection: &str, key: JsonValue, payload: Item, options: MutationOptions) -> Result<JsonValue, Error> {
        let mut keys = self.update_many(collection, vec![key], payload, options).await?;
        keys.pop().ok_or_else(|| Error::not_found_or_forbidden(collection))
    }

    pub async fn update_many(
        &mut self,
        collection: &str,
        keys: Vec<JsonValue>,
        payload: Item,
        options: MutationOptions,
    ) -> Result<Vec<JsonValue>, Error> {
        let caller = self.caller(options);
        let tenant = self.tenant(&caller, None)?;
        let result = {
            let access = Access::new(self.state.catalog.as_ref(), self.state.permissions.as_ref(), &caller, tenant);
            let mut writer = Writer::new(self.state, self.txn.as_ref(), &access, &mut self.effects, options.force);
            writer.update(collection, keys, payload).await
        };
        self.track(result)
    }

    pub async fn update_by_query(
        &mut self,
        collection: &str,
        query: &Query,
        payload: Item,
        options: MutationOptions,
    ) -> Result<Vec<JsonValue>, Error> {
        let caller = self.caller(options);
        let tenant = self.tenant(&caller, query.tenant.as_deref())?;
        let result = {
            let access = Access::new(self.state.catalog.as_ref(), self.state.permissions.as_ref(), &caller, tenant);
            let mut writer = Writer::new(self.state, self.txn.as_ref(), &access, &mut self.effects, options.force);
            writer.update_by_query(collection, query, payload).await
        };
        self.track(result)
    }

    pub async fn delete_one(&mut self, collection: &str, key: JsonValue, options: MutationOptions) -> Result<JsonValue, Error> {
        let mut keys = self.delete_many(collection, vec![key], options).await?;
        keys.pop().ok_or_else(|| Error::not_found_or_forbidden(collection))
    }

    pub async fn delete_many(&mut self, collection: &str, keys: Vec<JsonValue>, options: MutationOptions) -> Result<Vec<JsonValue>, Error> {
        let caller = self.caller(options);
        let tenant = self.tenant(&caller, None)?;
        let result = {
            let access = Access::new(self.state.catalog.as_ref(), self.state.permissions.as_ref(), &caller, tenant);
            let mut writer = Writer::new(self.state, self.txn.as_ref(), &access, &mut self.effects, options.force);
            writer.delete(collection, keys).await
        };
        self.track(result)
    }

    pub async fn delete_by_query(&mut self, collection: &str, query: &Query, options: MutationOptions) -> Result<Vec<JsonValue>, Error> {
        let caller = self.caller(options);
        let tenant = self.tenant(&caller, query.tenant.as_deref())?;
        let result = {
            let access = Access::new(self.state.catalog.as_ref(), self.state.permissions.as_ref(), &caller, tenant);
            let mut writer = Writer::new(self.state, self.txn.as_ref(), &access, &mut self.effects, options.force);
            writer.delete_by_query(collection, query).await
        };
        self.track(result)
    }

    /// Reads through the scope's transaction, seeing its uncommitted writes. Scope reads
    /// bypass the cache.
    pub async fn read_by_query(&self, collection: &str, query: &Query) -> Result<ReadResult, Error> {
        let tenant = self.tenant(self.accountability, query.tenant.as_deref())?;
        let access = self.access(tenant);
        access.check_read(collection)?;
        let (result, _) = read::load(self.txn.as_ref(), self.state, &access, collection, query).await?;
        Ok(result)
    }

    pub async fn read_one(&self, collection: &str, key: &JsonValue, query: &Query) -> Result<Item, Error> {
        let schema = self.catalog().get_schema_definition(collection)?;
        let (keyed, added_pk) = read::keyed_query(schema, query, std::slice::from_ref(key));
        let result = self.read_by_query(collection, &keyed).await?;
        read::order_by_keys(result.data, &schema.primary_key, std::slice::from_ref(key), added_pk)
            .pop()
            .ok_or_else(|| Error::not_found_or_forbidden(collection))
    }

    fn access(&self, tenant: TenantScope) -> Access<'a> {
        Access::new(
            self.state.catalog.as_ref(),
            self.state.permissions.as_ref(),
            self.accountability,
            tenant,
        )
    }

    fn catalog(&self) -> &'a SchemaCatalog {
        self.state.catalog.as_ref()
    }

    /// Whether an operation of this scope failed.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Commits every operation and releases their side effects.
    ///
    /// # Returns
    /// - `Ok(())` - Committed
    /// - `Err(Error::Aborted)` - An operation failed earlier; the scope was rolled back
    /// - `Err(Error::DbErr)` - The commit itself failed
    pub async fn commit(self) -> Result<(), Error> {
        let MutationScope {
            state,
            txn,
            effects,
            failed,
            ..
        } = self;

        if failed {
            if let Err(e) = txn.rollback().await {
                tracing::error!("failed to roll back failed mutation scope: {}", e);
            }
            return Err(Error::Aborted(
                "an operation of this mutation scope failed".to_string(),
            ));
        }

        let age = txn.commit().await?;
        tracing::debug!(elapsed_ms = age.as_millis() as u64, "committed mutation scope");
        effects.release(state).await;
        Ok(())
    }

    /// Rolls back every operation. Side effects are dropped.
    pub async fn abort(self) {
        let mut txn = self.txn;
        txn.mark_aborted();
        match txn.rollback().await {
            Ok(age) => tracing::debug!(elapsed_ms = age.as_millis() as u64, "aborted mutation scope"),
            Err(e) => tracing::error!("rollback of aborted mutation scope failed: {}", e),
        }
    }

    /// Commits on success, rolls back on failure and passes `result` through.
    pub(crate) async fn finish<T>(self, result: Result<T, Error>) -> Result<T, Error> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(e) = self.txn.rollback().await {
                    tracing::error!(error = %error, "failed to roll back mutation: {}", e);
                }
                Err(error)
            }
        }
    }
}
