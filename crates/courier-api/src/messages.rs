use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use courier_types::api::{Claims, MessageCreated, ReadReceipt, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::policy;

/// Detail view of one message. The caller must be a party to it.
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let message = tokio::task::spawn_blocking(move || st.db.get_message(id).map_err(ApiError::from))
        .await
        .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    policy::ensure_message_party(&claims, &message)?;

    Ok(Json(message))
}

/// Send a message. The sender is always the token identity, never taken
/// from the request body.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.body.is_empty() {
        return Err(ApiError::Validation("message body must not be empty".into()));
    }

    let id = Uuid::new_v4();
    let sent_at = Utc::now();

    let st = state.clone();
    let from = claims.sub.clone();
    let to = req.to_username.clone();
    let body = req.body.clone();
    tokio::task::spawn_blocking(move || {
        st.db
            .create_message(id, &from, &to, &body, sent_at)
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    Ok((
        StatusCode::CREATED,
        Json(MessageCreated {
            id,
            from_username: claims.sub,
            to_username: req.to_username,
            body: req.body,
            sent_at,
        }),
    ))
}

/// One-time read mark, recipient only. A repeat mark surfaces as
/// `AlreadyRead` rather than silently succeeding.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let message = tokio::task::spawn_blocking(move || st.db.get_message(id).map_err(ApiError::from))
        .await
        .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    policy::ensure_recipient(&claims, &message)?;

    let st = state.clone();
    let read_at =
        tokio::task::spawn_blocking(move || st.db.mark_read(id, Utc::now()).map_err(ApiError::from))
            .await
            .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    Ok(Json(ReadReceipt { id, read_at }))
}
