use std::sync::Arc;

use anyhow::anyhow;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use courier_db::Database;
use courier_types::api::{LoginRequest, RegisterRequest, TokenResponse};

use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::tokens::TokenIssuer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub credentials: CredentialStore,
    pub tokens: TokenIssuer,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::Validation(
            "username must be between 3 and 32 characters".into(),
        ));
    }
    if req.password.len() < 6 {
        return Err(ApiError::Validation(
            "password must be at least 6 characters".into(),
        ));
    }

    // Hashing and the insert are blocking work; keep them off the runtime.
    let st = state.clone();
    let username = tokio::task::spawn_blocking(move || {
        let password_hash = st.credentials.hash_password(&req.password)?;
        // The insert also stamps the first login, so registration is a
        // single storage transaction.
        st.db.create_user(
            &req.username,
            &password_hash,
            &req.first_name,
            &req.last_name,
            &req.phone,
            Utc::now(),
        )?;
        Ok::<_, ApiError>(req.username)
    })
    .await
    .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    let token = state.tokens.issue(&username)?;

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let username = req.username.clone();

    let valid = tokio::task::spawn_blocking(move || {
        // Absence of the user is NotFound; a wrong password is a clean false.
        let stored = st.db.get_user_credentials(&req.username)?;
        let valid = st.credentials.verify_password(&req.password, &stored)?;
        if valid {
            st.db.update_login_timestamp(&req.username, Utc::now())?;
        }
        Ok::<_, ApiError>(valid)
    })
    .await
    .map_err(|e| anyhow!("blocking task failed: {e}"))??;

    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.tokens.issue(&username)?;

    Ok(Json(TokenResponse { token }))
}
