use axum::extract::State;
use axum::Json;
use bach_core::{Bach, BachRequest};

use crate::error::AppError;
use crate::state::AppState;

/// POST /: run a one-shot pipeline described by a `BachRequest`.
pub async fn play(
    State(app): State<AppState>,
    Json(request): Json<BachRequest>,
) -> Result<Json<&'static str>, AppError> {
    tracing::info!(area = %request.area, accounts = request.accounts.len(), "play request");
    let registry = app.registry.clone();
    tokio::task::spawn_blocking(move || {
        let mut bach = Bach::new(registry);
        bach.play(&request)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json("success"))
}
