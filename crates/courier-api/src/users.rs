use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use courier_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::policy;

/// Basic info on every registered user. Any authenticated identity may
/// browse the directory.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let users = tokio::task::spawn_blocking(move || st.db.list_users().map_err(ApiError::from))
        .await
        .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    Ok(Json(users))
}

/// Full record for one user; only that user may fetch it.
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    policy::ensure_correct_user(&claims, &username)?;

    let st = state.clone();
    let user = tokio::task::spawn_blocking(move || st.db.get_user(&username).map_err(ApiError::from))
        .await
        .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    Ok(Json(user))
}

/// Messages this user sent, most recent first.
pub async fn messages_from(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    policy::ensure_correct_user(&claims, &username)?;

    let st = state.clone();
    let messages =
        tokio::task::spawn_blocking(move || st.db.messages_from(&username).map_err(ApiError::from))
            .await
            .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    Ok(Json(messages))
}

/// Messages this user received, most recent first.
pub async fn messages_to(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    policy::ensure_correct_user(&claims, &username)?;

    let st = state.clone();
    let messages =
        tokio::task::spawn_blocking(move || st.db.messages_to(&username).map_err(ApiError::from))
            .await
            .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    Ok(Json(messages))
}
