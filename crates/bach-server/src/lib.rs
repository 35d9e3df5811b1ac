pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(routes::play::play))
        .route("/health", get(routes::health::health))
        .route(
            "/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/tasks/{id}",
            get(routes::tasks::get_task).delete(routes::tasks::delete_task),
        )
        .route("/tasks/{id}/run", post(routes::tasks::run_task))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Serve on `0.0.0.0:{port}` until the process is stopped.
pub async fn serve(app_state: state::AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(app_state, listener).await
}

/// Serve on a pre-bound listener, so callers can bind port 0 and read the
/// actual port first.
pub async fn serve_on(
    app_state: state::AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let app = build_router(app_state);
    tracing::info!("bach server listening on http://localhost:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}
