use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::generate::GenerationRequest;
use crate::geometry::{profile, Staircase};
use crate::migration::migrate_value;
use crate::models::*;
use crate::progress::{done_count, ProgressReport};
use crate::store::StoreError;

type ApiError = (StatusCode, String);

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
/// The full error is logged server-side for debugging, but clients only
/// see a generic message to avoid leaking internal details.
fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Store errors are the client's to see: unknown ids and refused deletes.
fn store_error(e: StoreError) -> ApiError {
    let status = match e {
        StoreError::MountainNotFound(_) | StoreError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::LastMountain => StatusCode::CONFLICT,
    };
    tracing::warn!("Rejected request: {}", e);
    (status, e.to_string())
}

fn bad_request(msg: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, msg.to_string())
}

/// Release `user`'s stored photos behind references no task holds any more.
/// Callers filter with [`crate::store::StateStore::unreferenced_photos`].
/// Failures are logged; the photo row is orphaned but the operation stands.
fn release_photos(state: &AppState, user: &str, references: impl IntoIterator<Item = String>) {
    for reference in references {
        if let Err(e) = state.sessions.database().release_photo(user, &reference) {
            tracing::warn!("Failed to release photo {}: {:#}", reference, e);
        }
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Whole state
// ============================================================

pub async fn get_state(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<PersistedState>, ApiError> {
    state
        .sessions
        .read(&user, |store| store.snapshot())
        .map(Json)
        .map_err(internal_error)
}

/// Accept a document of any schema generation and make it the user's state.
pub async fn put_state(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(document): Json<serde_json::Value>,
) -> Result<Json<PersistedState>, ApiError> {
    let normalized = migrate_value(document);
    let dropped = state
        .sessions
        .update(&user, |store| {
            let outgoing: Vec<String> = store
                .photo_references()
                .into_iter()
                .map(str::to_string)
                .collect();
            store.replace(normalized.clone());
            store.unreferenced_photos(outgoing)
        })
        .map_err(internal_error)?;
    release_photos(&state, &user, dropped);
    Ok(Json(normalized))
}

/// Sign out: drop live state and cancel any pending write.
pub async fn sign_out(State(state): State<AppState>, Path(user): Path<String>) -> StatusCode {
    state.sessions.sign_out(&user);
    StatusCode::NO_CONTENT
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(input): Json<UpdatePreferencesInput>,
) -> Result<Json<PersistedState>, ApiError> {
    state
        .sessions
        .update(&user, |store| {
            if let Some(prompt) = &input.task_generation_prompt {
                store.set_task_generation_prompt(prompt);
            }
            if let Some(time_of_day) = input.time_of_day {
                store.set_time_of_day(time_of_day);
            }
            store.snapshot()
        })
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Mountains
// ============================================================

pub async fn list_mountains(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<MountainSummary>>, ApiError> {
    state
        .sessions
        .read(&user, |store| store.summaries())
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_mountain(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<(StatusCode, Json<Mountain>), ApiError> {
    state
        .sessions
        .update(&user, |store| store.create_mountain().clone())
        .map(|m| (StatusCode::CREATED, Json(m)))
        .map_err(internal_error)
}

pub async fn get_mountain(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<Mountain>, ApiError> {
    state
        .sessions
        .read(&user, |store| store.mountain(&id).cloned())
        .map_err(internal_error)?
        .map(Json)
        .map_err(store_error)
}

pub async fn update_mountain(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Json(input): Json<UpdateMountainInput>,
) -> Result<Json<Mountain>, ApiError> {
    state
        .sessions
        .update(&user, |store| store.set_goal(&id, &input.goal).cloned())
        .map_err(internal_error)?
        .map(Json)
        .map_err(store_error)
}

pub async fn delete_mountain(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let photos = state
        .sessions
        .update(&user, |store| {
            store
                .delete_mountain(&id)
                .map(|photos| store.unreferenced_photos(photos))
        })
        .map_err(internal_error)?
        .map_err(store_error)?;
    release_photos(&state, &user, photos);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_mountain(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<Mountain>, ApiError> {
    state
        .sessions
        .update(&user, |store| store.select_mountain(&id).cloned())
        .map_err(internal_error)?
        .map(Json)
        .map_err(store_error)
}

pub async fn select_next(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Mountain>, ApiError> {
    state
        .sessions
        .update(&user, |store| store.select_next().clone())
        .map(Json)
        .map_err(internal_error)
}

pub async fn select_previous(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Mountain>, ApiError> {
    state
        .sessions
        .update(&user, |store| store.select_previous().clone())
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Progress & geometry
// ============================================================

pub async fn get_progress(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<ProgressReport>, ApiError> {
    state
        .sessions
        .read(&user, |store| store.progress(&id))
        .map_err(internal_error)?
        .map(Json)
        .map_err(store_error)
}

/// The 3D staircase plus where the climber stands on it.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimbPath {
    #[serde(flatten)]
    pub staircase: Staircase,
    pub done: usize,
    pub climber_index: usize,
    pub next_checkpoint: Option<usize>,
}

pub async fn get_path(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<ClimbPath>, ApiError> {
    let (task_count, done) = state
        .sessions
        .read(&user, |store| {
            store
                .mountain(&id)
                .map(|m| (m.tasks.len(), done_count(&m.tasks)))
        })
        .map_err(internal_error)?
        .map_err(store_error)?;

    let staircase = state.paths.get_or_generate(&id, task_count);
    Ok(Json(ClimbPath {
        done,
        climber_index: staircase.climber_index(done),
        next_checkpoint: staircase.next_checkpoint(done),
        staircase: (*staircase).clone(),
    }))
}

/// The flat side view: silhouette, ledges and climber.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimbProfile {
    pub outline: String,
    pub summit_cap: String,
    pub ledges: Vec<profile::Ledge>,
    pub climber: profile::Point2,
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<ClimbProfile>, ApiError> {
    let (total, done) = state
        .sessions
        .read(&user, |store| {
            store
                .mountain(&id)
                .map(|m| (m.tasks.len(), done_count(&m.tasks)))
        })
        .map_err(internal_error)?
        .map_err(store_error)?;

    Ok(Json(ClimbProfile {
        outline: profile::mountain_outline(),
        summit_cap: profile::summit_cap(),
        ledges: profile::ledge_positions(total, done),
        climber: profile::climber_position(total, done),
    }))
}

// ============================================================
// Tasks
// ============================================================

pub async fn create_task(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    if input.text.trim().is_empty() {
        return Err(bad_request("Task text is required"));
    }
    state
        .sessions
        .update(&user, |store| {
            store
                .add_task(&id, &input.text)
                .map(|task| task.cloned())
        })
        .map_err(internal_error)?
        .map_err(store_error)?
        .map(|task| (StatusCode::CREATED, Json(task)))
        .ok_or_else(|| bad_request("Task text is required"))
}

pub async fn toggle_task(
    State(state): State<AppState>,
    Path((user, id, task_id)): Path<(String, String, String)>,
) -> Result<Json<Task>, ApiError> {
    state
        .sessions
        .update(&user, |store| store.toggle_task(&id, &task_id).cloned())
        .map_err(internal_error)?
        .map(Json)
        .map_err(store_error)
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path((user, id, task_id)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let photo = state
        .sessions
        .update(&user, |store| {
            store
                .remove_task(&id, &task_id)
                .map(|photo| store.unreferenced_photos(photo))
        })
        .map_err(internal_error)?
        .map_err(store_error)?;
    release_photos(&state, &user, photo);
    Ok(StatusCode::NO_CONTENT)
}

/// Attach, replace or clear a task photo.
///
/// Inline `data:` images are moved into the photo store and the task keeps a
/// URL to them; other references are stored as given.
pub async fn update_task_photo(
    State(state): State<AppState>,
    Path((user, id, task_id)): Path<(String, String, String)>,
    Json(input): Json<UpdatePhotoInput>,
) -> Result<Json<Task>, ApiError> {
    let db = state.sessions.database();
    let mut uploaded = false;
    let reference = match input.photo.filter(|p| !p.trim().is_empty()) {
        Some(data) if is_inline_photo(&data) => {
            uploaded = true;
            Some(db.create_photo(&user, &data).map_err(internal_error)?.url())
        }
        Some(url) if stored_photo_id(&url).is_some() => {
            // Stored photos can only be attached by their owner.
            if !db.owns_photo(&user, &url).map_err(internal_error)? {
                return Err(bad_request("Unknown photo reference"));
            }
            Some(url)
        }
        other => other,
    };

    let result = state
        .sessions
        .update(&user, |store| {
            let replaced = store.set_task_photo(&id, &task_id, reference.clone())?;
            let task = store
                .mountain(&id)?
                .task(&task_id)
                .cloned()
                .ok_or_else(|| StoreError::TaskNotFound(task_id.clone()))?;
            Ok::<_, StoreError>((task, store.unreferenced_photos(replaced)))
        })
        .map_err(internal_error)?;

    match result {
        Ok((task, released)) => {
            release_photos(&state, &user, released);
            Ok(Json(task))
        }
        Err(e) => {
            if uploaded {
                // The upload has no owner; drop it again.
                release_photos(&state, &user, reference);
            }
            Err(store_error(e))
        }
    }
}

pub async fn get_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Photo>, ApiError> {
    state
        .sessions
        .database()
        .get_photo(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Photo not found".to_string()))
}

// ============================================================
// Task generation
// ============================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerateInput {
    /// How many tasks to ask for. Clamped to the configured range.
    pub count: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub requested: usize,
    pub added: Vec<Task>,
}

pub async fn generate_tasks(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Json(input): Json<GenerateInput>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let count = state.config.generation_count(input.count);

    let request = state
        .sessions
        .read(&user, |store| {
            store.mountain(&id).map(|m| GenerationRequest {
                goal: m.goal.clone(),
                guidance: store.state().task_generation_prompt.clone(),
                existing: m.tasks.iter().map(|t| t.text.clone()).collect(),
                count,
            })
        })
        .map_err(internal_error)?
        .map_err(store_error)?;

    if request.goal.trim().is_empty() {
        return Err(bad_request("Set a goal before generating tasks"));
    }

    let texts = state.generator.generate(&request).await.map_err(|e| {
        tracing::warn!("Task generation failed: {}", e);
        (StatusCode::BAD_GATEWAY, e.user_message().to_string())
    })?;

    let added = state
        .sessions
        .update(&user, |store| store.merge_generated(&id, texts, count))
        .map_err(internal_error)?
        .map_err(store_error)?;

    tracing::info!("Generated {} new task(s) for mountain {}", added.len(), id);
    Ok(Json(GenerateResponse {
        requested: count,
        added,
    }))
}
