use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /health: liveness plus the registered plugin names.
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "areas": app.registry.area_names(),
        "actors": app.registry.actor_names(),
        "notifiers": app.registry.notifier_names(),
        "fetchers": app.registry.fetcher_names(),
    }))
}
