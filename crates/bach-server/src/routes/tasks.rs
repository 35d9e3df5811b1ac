use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bach_core::pipeline::RunSummary;
use bach_core::task::Task;
use bach_core::Bach;

use crate::error::AppError;
use crate::state::AppState;

/// GET /tasks: every stored task, newest first.
pub async fn list_tasks(State(app): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    let store = app.store.clone();
    let tasks = tokio::task::spawn_blocking(move || store.list())
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(tasks))
}

/// POST /tasks: store a task. Its plugins must resolve against the registry.
pub async fn create_task(
    State(app): State<AppState>,
    Json(task): Json<Task>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let result = tokio::task::spawn_blocking(move || {
        task.validate()?;
        Bach::from_task(app.registry.clone(), &task)?;
        let id = app.store.save(&task)?;
        Ok::<_, bach_core::BachError>(serde_json::json!({ "id": id, "name": task.name }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /tasks/{id}
pub async fn get_task(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let store = app.store.clone();
    let task = tokio::task::spawn_blocking(move || store.load(&id))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(task))
}

/// DELETE /tasks/{id}
pub async fn delete_task(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        if !store.delete(&id)? {
            return Err(bach_core::BachError::TaskNotFound(id));
        }
        Ok(id)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// POST /tasks/{id}/run: replay a stored task.
pub async fn run_task(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunSummary>, AppError> {
    let summary = tokio::task::spawn_blocking(move || {
        let task = app.store.load(&id)?;
        Bach::run_task(app.registry.clone(), &task)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(summary))
}
