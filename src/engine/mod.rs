//! Engine facade owning the shared state and provider lifecycle.

pub mod request;

use crate::{
    error::Error,
    model::{accountability::Accountability, app::AppState},
    service::item::ItemService,
};

pub use request::{Operation, Request};

pub struct Engine {
    state: AppState,
}

impl Engine {
    /// Creates a new instance of [`Engine`]
    ///
    /// Providers are not touched until [`Engine::init`].
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Initialises the permission and cache providers (permission preload, Redis
    /// connect).
    pub async fn init(&self) -> Result<(), Error> {
        self.state.permissions.init().await?;
        self.state.cache.provider().init().await?;

        tracing::info!(
            collections = self.state.catalog.collections().count(),
            dialect = ?self.state.dialect,
            "engine initialised"
        );
        Ok(())
    }

    /// Releases provider resources. Both providers are shut down even if the first fails.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let permissions = self.state.permissions.shutdown().await;
        let cache = self.state.cache.provider().shutdown().await;
        tracing::info!("engine shut down");
        permissions.and(cache)
    }

    /// Item service acting as `accountability`.
    pub fn items<'a>(&'a self, accountability: &'a Accountability) -> ItemService<'a> {
        ItemService::new(&self.state, accountability)
    }
}
