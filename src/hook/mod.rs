//! Mutation hooks.
//!
//! `before` runs inside the mutation's transaction for every item and may rewrite the
//! payload or fail the whole call. `after` runs once the transaction has committed; its
//! failures are logged and never reach the caller.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::{
    error::Error,
    model::{accountability::Accountability, change::ChangeEvent, item::Item, permission::Action},
};

/// Item about to be written.
#[derive(Debug, Clone, Copy)]
pub struct BeforeEvent<'a> {
    pub collection: &'a str,
    pub action: Action,
    /// Primary key of the item, `None` for creates.
    pub key: Option<&'a JsonValue>,
    pub accountability: &'a Accountability,
}

#[async_trait]
pub trait Hook: Send + Sync {
    /// Called with the item's payload before it is persisted. Deletes pass an empty
    /// payload.
    async fn before(&self, _event: BeforeEvent<'_>, _payload: &mut Item) -> Result<(), Error> {
        Ok(())
    }

    async fn after(&self, _event: &ChangeEvent) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct HookRegistry {
    global: Vec<Arc<dyn Hook>>,
    collections: HashMap<String, Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` for mutations of `collection`.
    pub fn register(&mut self, collection: impl Into<String>, hook: Arc<dyn Hook>) -> &mut Self {
        self.collections.entry(collection.into()).or_default().push(hook);
        self
    }

    /// Registers `hook` for mutations of every collection.
    pub fn register_global(&mut self, hook: Arc<dyn Hook>) -> &mut Self {
        self.global.push(hook);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.collections.values().all(Vec::is_empty)
    }

    /// Global hooks first, then those registered for `collection`, each in registration
    /// order.
    fn hooks_for<'a>(&'a self, collection: &str) -> impl Iterator<Item = &'a Arc<dyn Hook>> + 'a {
        let scoped = self
            .collections
            .get(collection)
            .map(|hooks| hooks.as_slice())
            .unwrap_or_default();
        self.global.iter().chain(scoped.iter())
    }

    pub async fn run_before(&self, event: BeforeEvent<'_>, payload: &mut Item) -> Result<(), Error> {
        for hook in self.hooks_for(event.collection) {
            hook.before(event, payload).await?;
        }
        Ok(())
    }

    pub async fn run_after(&self, event: &ChangeEvent) {
        for hook in self.hooks_for(&event.collection) {
            if let Err(e) = hook.after(event).await {
                tracing::error!(
                    collection = %event.collection,
                    action = %event.action,
                    "after hook failed: {}",
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct Stamp(&'static str);

    #[async_trait]
    impl Hook for Stamp {
        async fn before(&self, _event: BeforeEvent<'_>, payload: &mut Item) -> Result<(), Error> {
            let trail = payload
                .get("trail")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            payload.insert("trail".to_string(), json!(format!("{}{}", trail, self.0)));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Failing {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Hook for Failing {
        async fn after(&self, _event: &ChangeEvent) -> Result<(), Error> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
            Err(Error::InternalError("webhook unreachable".to_string()))
        }
    }

    /// Expect global hooks to run before collection hooks, in registration order
    #[tokio::test]
    async fn runs_global_hooks_first() -> Result<(), Error> {
        let mut registry = HookRegistry::new();
        registry
            .register("posts", Arc::new(Stamp("b")))
            .register_global(Arc::new(Stamp("a")))
            .register("users", Arc::new(Stamp("x")));

        let caller = Accountability::system();
        let mut payload = Item::new();
        let event = BeforeEvent {
            collection: "posts",
            action: Action::Create,
            key: None,
            accountability: &caller,
        };
        registry.run_before(event, &mut payload).await?;

        assert_eq!(payload.get("trail"), Some(&json!("ab")));
        Ok(())
    }

    /// Expect after hook failures to be swallowed
    #[tokio::test]
    async fn after_failures_are_not_propagated() {
        let failing = Arc::new(Failing::default());
        let mut registry = HookRegistry::new();
        registry.register("posts", failing.clone());

        registry
            .run_after(&ChangeEvent {
                collection: "posts".to_string(),
                action: Action::Update,
                keys: vec![json!(1)],
                payload: json!(null),
                accountability: None,
            })
            .await;

        assert_eq!(*failing.calls.lock().unwrap(), 1);
    }
}
