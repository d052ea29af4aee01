use crate::api::{chat_completions, health, messages, models};
use crate::core::state::SharedState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Creates the HTTP router with all API endpoints.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/v1/messages", post(messages::messages))
        .route("/v1/completions", post(chat_completions::completions))
        .route("/v1/chat/completions", post(chat_completions::chat_completions))
        .route("/v1/models", get(models::list_models))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
