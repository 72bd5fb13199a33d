//! Binary entrypoint for the tfgen API server.

use tfgen_api::{run, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let database_url =
        std::env::var("TFGEN_DATABASE_URL").unwrap_or_else(|_| "sqlite://tfgen.db".to_string());
    let state = AppState::from_env(&database_url)
        .await
        .expect("failed to initialize application state");

    if let Some(executor) = &state.executor {
        match executor.sweep_stale() {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "swept stale deployment directories"),
            Err(e) => tracing::warn!(error = %e, "sweep of stale deployment directories failed"),
        }
    }

    let addr = std::env::var("TFGEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    run(&addr, state).await;
}
