//! Side effects collected while a mutation scope runs and released after it commits.

use std::collections::BTreeSet;

use serde_json::Value as JsonValue;

use crate::{
    model::{
        accountability::Accountability, app::AppState, audit::AuditEntry, change::ChangeEvent,
        item::Item, permission::Action,
    },
    schema::collection::TENANT_ID,
    util::{key_string, time::now},
};

/// One written item.
pub struct Change<'c> {
    pub collection: &'c str,
    pub action: Action,
    pub key: JsonValue,
    pub before: Option<Item>,
    pub after: Option<Item>,
    /// Tables whose cached reads the write invalidates.
    pub tables: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct Effects {
    audit: Vec<AuditEntry>,
    events: Vec<ChangeEvent>,
    tables: BTreeSet<String>,
}

impl Effects {
    /// Records `change` as one audit entry (when `audit` is on) and folds it into the
    /// change event of its collection and action.
    pub fn record(&mut self, change: Change<'_>, accountability: &Accountability, audit: bool) {
        let Change {
            collection,
            action,
            key,
            before,
            after,
            tables,
        } = change;

        if audit {
            let tenant = after
                .as_ref()
                .or(before.as_ref())
                .and_then(|row| row.get(TENANT_ID))
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .or_else(|| accountability.tenant.clone());
            self.audit.push(AuditEntry {
                collection: collection.to_string(),
                item: key_string(&key).unwrap_or_default(),
                action,
                before: before.map(JsonValue::Object),
                after: after.clone().map(JsonValue::Object),
                actor: accountability.user.clone(),
                tenant,
                created_at: now(),
            });
        }
        self.tables.extend(tables);

        let payload = match action {
            Action::Delete => None,
            _ => after.map(JsonValue::Object),
        };
        match self
            .events
            .iter_mut()
            .find(|event| event.collection == collection && event.action == action)
        {
            Some(event) => {
                event.keys.push(key);
                if let (JsonValue::Array(items), Some(payload)) = (&mut event.payload, payload) {
                    items.push(payload);
                }
            }
            None => self.events.push(ChangeEvent {
                collection: collection.to_string(),
                action,
                keys: vec![key],
                payload: payload.map_or(JsonValue::Null, |p| JsonValue::Array(vec![p])),
                accountability: Some(accountability.clone()),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Audit entries, then after hooks, cache invalidation and change notifications.
    /// Failures are logged and never reach the caller.
    pub async fn release(self, state: &AppState) {
        if !self.audit.is_empty() {
            if let Err(e) = state.audit.record(&self.audit).await {
                tracing::error!(entries = self.audit.len(), "failed to record audit entries: {}", e);
            }
        }

        for event in &self.events {
            state.hooks.run_after(event).await;
        }

        if !self.tables.is_empty() {
            let tables: Vec<String> = self.tables.into_iter().collect();
            state.cache.invalidate(&tables).await;
        }

        for event in self.events {
            let collection = event.collection.clone();
            if let Err(e) = state.notifier.broadcast_change(event).await {
                tracing::warn!(collection, "failed to broadcast change: {}", e);
            }
        }
    }
}
