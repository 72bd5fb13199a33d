//! tfgen-api: REST endpoints.

pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod state;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat", post(handlers::chat))
        .route("/v1/chat/stream", post(handlers::chat_stream))
        .route("/v1/sheets/parse", post(handlers::parse_sheet))
        .route("/v1/policies", get(handlers::list_policies))
        .route("/v1/policies", post(handlers::create_policy))
        .route("/v1/policies/:id", get(handlers::get_policy))
        .route("/v1/policies/:id", put(handlers::update_policy))
        .route("/v1/policies/:id", delete(handlers::delete_policy))
        .route("/v1/policies/:id/toggle", patch(handlers::toggle_policy))
        .route("/v1/environments", post(handlers::create_environment))
        .route("/v1/environments", get(handlers::list_environments))
        .route("/v1/deployments/plan", post(handlers::plan_deployment))
        .route("/v1/deployments/:id", get(handlers::get_deployment))
        .route("/v1/deployments/:id/apply", post(handlers::apply_deployment))
        .route(
            "/v1/deployments/:id/destroy",
            post(handlers::destroy_deployment),
        )
        .route(
            "/v1/deployments/:id/cancel",
            post(handlers::cancel_deployment),
        )
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .with_state(state)
}

pub async fn run(addr: &str, state: Arc<AppState>) {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    tracing::info!("tfgen API listening on {}", addr);
    axum::serve(listener, app).await.expect("server error");
}
