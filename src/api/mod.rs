mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{ServerConfig, TrackerConfig};
use crate::pipeline::Pipeline;
use crate::tracker::Reconciler;

use middleware::{cors_layer, rate_limit_middleware, RateLimiter};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub reconciler: Reconciler,
    /// Defaults merged into client-supplied tracker credentials.
    pub tracker_defaults: Arc<TrackerConfig>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, reconciler: Reconciler, tracker_defaults: TrackerConfig) -> Self {
        Self {
            pipeline,
            reconciler,
            tracker_defaults: Arc::new(tracker_defaults),
        }
    }
}

pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let api = Router::new()
        // Sessions
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}", delete(handlers::delete_session))
        // Pipeline stages
        .route("/sessions/{id}/key-results", post(handlers::suggest_key_results))
        .route("/sessions/{id}/epics", post(handlers::generate_epics))
        .route(
            "/sessions/{id}/features/{feature_id}/stories",
            post(handlers::generate_stories),
        )
        .route(
            "/sessions/{id}/stories/{story_id}/tasks",
            post(handlers::generate_tasks),
        )
        // Review
        .route("/sessions/{id}/validate", get(handlers::validate_session))
        .route("/sessions/{id}/export", get(handlers::export_session))
        .route("/sessions/{id}/outline", get(handlers::outline_session))
        // Tracker
        .route("/tracker/config", get(handlers::tracker_config))
        .route("/tracker/test", post(handlers::tracker_test))
        .route("/tracker/projects", post(handlers::tracker_projects))
        .route("/sessions/{id}/tracker/upload", post(handlers::tracker_upload))
        // Health
        .route("/health", get(handlers::health));

    let mut router = Router::new().nest("/api/v1", api).with_state(state);

    if let Some(limit) = server.rate_limit {
        router = router.layer(axum::middleware::from_fn_with_state(
            RateLimiter::per_minute(limit),
            rate_limit_middleware,
        ));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server.cors_origins))
}
