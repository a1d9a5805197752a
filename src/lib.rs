pub mod api;
pub mod config;
pub mod context;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::MediaConfig;
use crate::context::MediaContext;
use crate::services::object_urls::PreviewHandle;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// An object URL staged over HTTP.
pub struct StagedLease {
    pub handle: PreviewHandle,
    pub staged_at: Instant,
}

impl StagedLease {
    pub fn new(handle: PreviewHandle) -> Self {
        Self {
            handle,
            staged_at: Instant::now(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub media: MediaContext,
    /// Held until the client revokes or persists them, or the TTL sweep
    /// drops them.
    pub leases: Arc<DashMap<Uuid, StagedLease>>,
    pub config: MediaConfig,
}

impl AppState {
    pub fn new(media: MediaContext, config: MediaConfig) -> Self {
        Self {
            media,
            leases: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Revokes the lease for `id`. Returns false when nothing was staged.
    pub fn release_lease(&self, id: &Uuid) -> bool {
        match self.leases.remove(id) {
            Some((_, mut lease)) => {
                self.media.urls.release(&mut lease.handle);
                true
            }
            None => false,
        }
    }

    /// Revokes every lease staged at least `ttl` ago.
    pub fn sweep_leases(&self, ttl: Duration) -> usize {
        let mut expired = 0;
        self.leases.retain(|id, lease| {
            let keep = lease.staged_at.elapsed() < ttl;
            if !keep {
                tracing::debug!("Lease {} expired", id);
                expired += 1;
            }
            keep
        });
        expired
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::handlers::health::health_check))
        .route("/objects", post(api::handlers::objects::stage_object))
        .route(
            "/objects/:id",
            get(api::handlers::objects::get_object).delete(api::handlers::objects::revoke_object),
        )
        .route(
            "/objects/:id/persist",
            post(api::handlers::objects::persist_object),
        )
        .route("/uploads/status", get(api::handlers::uploads::upload_status))
        .route(
            "/preview",
            get(api::handlers::preview::current_preview)
                .post(api::handlers::preview::open_preview)
                .delete(api::handlers::preview::close_preview),
        )
        .layer(from_fn_with_state(
            state.clone(),
            api::middleware::metrics::metrics_middleware,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size + 1024 * 1024, // multipart overhead
        ))
        .with_state(state)
}
