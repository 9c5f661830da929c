pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handoff;
pub mod http;
pub mod push;
pub mod repo;
pub mod state;
pub mod throttle;

pub use state::AppState;

use axum::{
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use axum::http::StatusCode;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let signed_routes = Router::new()
        .route("/api/pairs/status", get(http::pairing::status))
        .route(
            "/api/entries",
            post(http::entries::upload).get(http::entries::fetch_undelivered),
        )
        .route("/api/entries/ack", post(http::entries::ack))
        .route("/api/push/subscribe", post(http::push::subscribe))
        .route("/api/account", delete(http::account::delete_account))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            throttle::enforce,
        ));

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/pairs/initiate", post(http::pairing::initiate))
        .route("/api/pairs/join", post(http::pairing::join))
        .route("/api/pairs/watch", get(handoff::handoff_handler))
        .merge(signed_routes)
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
}
