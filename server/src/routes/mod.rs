//! HTTP route definitions.

mod comments;
mod health;
mod live;

use crate::AppState;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(comments::routes())
        .merge(live::routes())
}

/// The complete application: routes, request tracing and CORS.
pub fn app(state: AppState) -> Router {
    create_routes()
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
