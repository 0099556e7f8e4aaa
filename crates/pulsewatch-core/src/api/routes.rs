//! API routes

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Delivery trigger, addressed by virtual host
        .route("/", post(handlers::trigger_notification))

        // Notification registry
        .route("/internal/notification/:id", post(handlers::register_notification))

        // Monitors
        .route("/internal/monitor", get(handlers::list_monitors))
        .route(
            "/internal/monitor/:name",
            put(handlers::put_monitor).delete(handlers::delete_monitor),
        )
        .route("/internal/monitor/:name/history", get(handlers::monitor_history))

        // Triggers
        .route(
            "/internal/monitor/:name/triggers/:trigger",
            put(handlers::put_trigger).delete(handlers::delete_trigger),
        )
        .route(
            "/internal/monitor/:name/triggers/:trigger/history",
            get(handlers::trigger_history),
        )

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
