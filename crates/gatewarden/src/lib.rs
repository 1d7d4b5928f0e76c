//! gatewarden http server: the query surface over the resolution engine.
//!
//! - [`handlers`]: http request handlers for the permission query api
//! - [`cli`]: command-line interface implementation
//!
//! the server owns an in-memory directory, the resolution cache over it,
//! and the invalidation bus that keeps cached trees converging after
//! mutations.

#![warn(missing_docs)]

pub mod cli;
pub mod handlers;

use std::sync::Arc;

use axum::{Router, routing::get};
use gatewarden_engine::{InvalidationBus, ResolutionCache};
use gatewarden_store::MemStore;
use gatewarden_types::Config;

/// shared state for all http handlers.
#[derive(Clone)]
pub struct AppState {
    /// the directory of users, assets, nodes and grants.
    pub store: MemStore,
    /// per-user materialized tree cache.
    pub cache: Arc<ResolutionCache<MemStore>>,
    /// invalidation bus for directory mutations.
    pub bus: InvalidationBus<MemStore>,
    /// server configuration.
    pub config: Config,
}

impl AppState {
    /// wire up a cache and invalidation bus over `store`.
    pub fn new(store: MemStore, config: Config) -> Self {
        let cache = Arc::new(ResolutionCache::new(store.clone(), config.rebuild.clone()));
        let bus = InvalidationBus::spawn(Arc::clone(&cache), config.rebuild.clone());
        Self {
            store,
            cache,
            bus,
            config,
        }
    }
}

/// create the axum application with all routes.
pub fn create_app(store: MemStore, config: Config) -> Router {
    router(AppState::new(store, config))
}

/// build the route table over an existing state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/perms/users/{user_id}/nodes/children",
            get(handlers::node_children),
        )
        .route(
            "/api/v1/perms/users/{user_id}/nodes/{key}/assets",
            get(handlers::node_assets),
        )
        .route(
            "/api/v1/perms/users/{user_id}/assets",
            get(handlers::user_assets),
        )
        .route("/api/v1/perms/validate", get(handlers::validate))
        .route("/health", get(handlers::health))
        .with_state(state)
}
