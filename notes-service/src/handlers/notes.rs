//! Notes CRUD handlers.
//!
//! Each handler awaits exactly one store call. Nothing is locked or versioned:
//! concurrent writes to one id resolve last-writer-wins in the database.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use std::collections::BTreeMap;

use crate::models::{Note, NotePayload};
use crate::services::record_operation;
use crate::startup::AppState;
use crate::utils::JsonBody;

fn note_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Note not found"))
}

/// A decoded `%2F` would address a nested node rather than a note, so such ids
/// are treated as unknown.
fn checked_id(operation: &'static str, id: String) -> Result<String, AppError> {
    if id.contains('/') {
        tracing::info!(note_id = %id, operation, "Rejected note id containing '/'");
        record_operation(operation, "not_found");
        return Err(note_not_found());
    }
    Ok(id)
}

fn rejected_body(operation: &'static str, err: AppError) -> AppError {
    tracing::warn!(error = %err, operation, "Rejected note body");
    record_operation(operation, "bad_request");
    err
}

/// Create a note under a freshly generated key. Any `id` in the body is ignored.
pub async fn create_note(
    State(state): State<AppState>,
    body: Result<JsonBody<NotePayload>, AppError>,
) -> Result<(StatusCode, Json<Note>), AppError> {
    let JsonBody(payload) = body.map_err(|e| rejected_body("create", e))?;

    let note = payload.into_note(state.store.generate_key());

    tracing::info!(note_id = %note.id, "Creating note");

    state.store.set(&note.id, &note).await.map_err(|e| {
        tracing::error!(note_id = %note.id, error = %e, "Failed to store note");
        record_operation("create", "error");
        e
    })?;

    record_operation("create", "ok");
    Ok((StatusCode::CREATED, Json(note)))
}

/// Return the whole collection keyed by id; `{}` when empty.
pub async fn list_notes(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Note>>, AppError> {
    let notes = state.store.list().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list notes");
        record_operation("list", "error");
        e
    })?;

    tracing::debug!(count = notes.len(), "Listed notes");
    record_operation("list", "ok");
    Ok(Json(notes))
}

/// Fetch one note.
///
/// A read failure answers 404 just like a missing key; only the logs tell
/// the two apart.
pub async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Note>, AppError> {
    let id = checked_id("get", id)?;

    match state.store.get(&id).await {
        Ok(Some(note)) => {
            record_operation("get", "ok");
            Ok(Json(note))
        }
        Ok(None) => {
            tracing::info!(note_id = %id, "Note not found");
            record_operation("get", "not_found");
            Err(note_not_found())
        }
        Err(e) => {
            tracing::error!(note_id = %id, error = %e, "Failed to read note");
            record_operation("get", "error");
            Err(note_not_found())
        }
    }
}

/// Replace the note at `id` wholesale, creating it if absent.
///
/// The stored `id` is always the path id; a body `id` is ignored.
pub async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<JsonBody<NotePayload>, AppError>,
) -> Result<Json<Note>, AppError> {
    let id = checked_id("update", id)?;
    let JsonBody(payload) = body.map_err(|e| rejected_body("update", e))?;

    let note = payload.into_note(id);

    tracing::info!(note_id = %note.id, "Replacing note");

    state.store.set(&note.id, &note).await.map_err(|e| {
        tracing::error!(note_id = %note.id, error = %e, "Failed to store note");
        record_operation("update", "error");
        e
    })?;

    record_operation("update", "ok");
    Ok(Json(note))
}

/// Remove the note at `id`. Deleting an absent id still answers 204.
pub async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = checked_id("delete", id)?;

    tracing::info!(note_id = %id, "Deleting note");

    state.store.delete(&id).await.map_err(|e| {
        tracing::error!(note_id = %id, error = %e, "Failed to delete note");
        record_operation("delete", "error");
        e
    })?;

    record_operation("delete", "ok");
    Ok(StatusCode::NO_CONTENT)
}
